use crate::error::{AppError, Result};
use crate::model::{CumulativeMetric, WatershedUnit};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::OnceLock;

/// Directed drainage graph over watershed units.
///
/// Each node has at most one downstream edge (the basin is a forest
/// converging toward its outlets) and any number of upstream
/// contributors. Built once from the topology table, validated acyclic,
/// then shared read-only; all query-time traversal uses the drain order
/// captured at build time.
#[derive(Debug)]
pub struct FlowGraph {
    nodes: Vec<String>,
    index: HashMap<String, usize>,
    downstream: Vec<Option<usize>>,
    upstream: Vec<Vec<usize>>,
    /// Node indices ordered headwaters first: every node appears after
    /// all of its upstream contributors.
    drain_order: Vec<usize>,
}

impl FlowGraph {
    /// Builds and validates the graph. Fails fast on a duplicate unit,
    /// an edge to a unit absent from the table, or a cycle.
    pub fn build(units: &[WatershedUnit]) -> Result<Self> {
        let mut index = HashMap::with_capacity(units.len());
        let mut nodes = Vec::with_capacity(units.len());
        for unit in units {
            if index.insert(unit.unit_id.clone(), nodes.len()).is_some() {
                return Err(AppError::GraphConsistency(format!(
                    "Duplicate watershed unit '{}' in topology",
                    unit.unit_id
                )));
            }
            nodes.push(unit.unit_id.clone());
        }

        let mut downstream = vec![None; nodes.len()];
        let mut upstream = vec![Vec::new(); nodes.len()];
        for (i, unit) in units.iter().enumerate() {
            if let Some(down_id) = &unit.downstream_unit_id {
                let Some(&j) = index.get(down_id.as_str()) else {
                    return Err(AppError::GraphConsistency(format!(
                        "Unit '{}' drains to unknown unit '{}'",
                        unit.unit_id, down_id
                    )));
                };
                downstream[i] = Some(j);
                upstream[j].push(i);
            }
        }

        // Kahn's algorithm over contributor edges. Headwaters enter the
        // queue first; anything left unprocessed is on a cycle (or
        // downstream of one), which makes ancestor sums undefined.
        let mut pending: Vec<usize> = upstream.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> =
            (0..nodes.len()).filter(|&i| pending[i] == 0).collect();
        let mut drain_order = Vec::with_capacity(nodes.len());
        while let Some(i) = queue.pop_front() {
            drain_order.push(i);
            if let Some(j) = downstream[i] {
                pending[j] -= 1;
                if pending[j] == 0 {
                    queue.push_back(j);
                }
            }
        }
        if drain_order.len() != nodes.len() {
            let stuck: Vec<&str> = pending
                .iter()
                .enumerate()
                .filter(|(_, &n)| n > 0)
                .map(|(i, _)| nodes[i].as_str())
                .collect();
            return Err(AppError::GraphConsistency(format!(
                "Watershed topology contains a cycle involving: {}",
                stuck.join(", ")
            )));
        }

        Ok(Self {
            nodes,
            index,
            downstream,
            upstream,
            drain_order,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, unit_id: &str) -> bool {
        self.index.contains_key(unit_id)
    }

    pub fn downstream_of(&self, unit_id: &str) -> Option<&str> {
        let i = *self.index.get(unit_id)?;
        self.downstream[i].map(|j| self.nodes[j].as_str())
    }

    pub fn upstream_of(&self, unit_id: &str) -> Vec<&str> {
        match self.index.get(unit_id) {
            Some(&i) => self.upstream[i]
                .iter()
                .map(|&j| self.nodes[j].as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Cumulative upstream totals: for every unit U,
    /// `cumulative(U) = own(U) + sum of cumulative over direct upstream
    /// contributors`, which by induction over the DAG equals own(U) plus
    /// own(A) for every unit A that drains into U. One pass in drain
    /// order, O(nodes + edges). Units absent from `own` contribute 0.
    pub fn accumulate(&self, own: &HashMap<String, f64>) -> BTreeMap<String, f64> {
        let mut cumulative = vec![0.0_f64; self.nodes.len()];
        for &i in &self.drain_order {
            let mut total = own.get(&self.nodes[i]).copied().unwrap_or(0.0);
            for &child in &self.upstream[i] {
                total += cumulative[child];
            }
            cumulative[i] = total;
        }
        self.nodes.iter().cloned().zip(cumulative).collect()
    }

    /// `accumulate` flattened into boundary records, ordered by unit id.
    pub fn cumulative_metrics(&self, own: &HashMap<String, f64>) -> Vec<CumulativeMetric> {
        self.accumulate(own)
            .into_iter()
            .map(|(unit_id, cumulative_value)| CumulativeMetric {
                unit_id,
                cumulative_value,
            })
            .collect()
    }
}

/// Build-once-then-freeze cell for the flow graph.
///
/// Topology is loaded once per process; every query thereafter reads the
/// same immutable graph. Concurrent first callers may each run a build,
/// but exactly one result is published and the rest are dropped.
#[derive(Debug, Default)]
pub struct FlowGraphCache {
    cell: OnceLock<FlowGraph>,
}

impl FlowGraphCache {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    pub fn get(&self) -> Option<&FlowGraph> {
        self.cell.get()
    }

    pub fn get_or_build(&self, units: &[WatershedUnit]) -> Result<&FlowGraph> {
        if let Some(graph) = self.cell.get() {
            return Ok(graph);
        }
        let built = FlowGraph::build(units)?;
        Ok(self.cell.get_or_init(|| built))
    }
}
