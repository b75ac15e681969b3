use crate::error::{AppError, Result};
use crate::model::LocationSummary;
use std::collections::BTreeMap;
use tracing::warn;

/// Decimal places kept when coordinates must stand in for a missing
/// surrogate id. Fixed so the same point always rounds to the same key;
/// 4 places is roughly 11 m of latitude, well below station spacing.
pub const COORD_DECIMALS: usize = 4;

/// Join key for a coordinate pair at the documented rounding precision.
pub fn coord_key(lat: f64, lon: f64) -> String {
    format!(
        "{:.prec$},{:.prec$}",
        lat,
        lon,
        prec = COORD_DECIMALS
    )
}

/// Resolves a coordinate pair against aggregated summaries.
///
/// Zero candidates at the join precision is a `JoinMismatch`. Multiple
/// candidates resolve to the first in key order, with a warning naming
/// the ambiguity instead of silently pretending the match was unique.
/// Callers with a stable surrogate id should prefer it over this.
pub fn lookup_by_coordinates<'a>(
    summaries: &'a BTreeMap<String, LocationSummary>,
    lat: f64,
    lon: f64,
) -> Result<&'a LocationSummary> {
    let key = coord_key(lat, lon);
    let mut candidates = summaries
        .values()
        .filter(|s| coord_key(s.lat, s.lon) == key);
    let Some(first) = candidates.next() else {
        return Err(AppError::JoinMismatch(format!(
            "No location found at coordinates ({})",
            key
        )));
    };
    let extra = candidates.count();
    if extra > 0 {
        warn!(
            "Coordinate join at ({}) is ambiguous: {} additional candidate(s); using '{}'",
            key, extra, first.location_id
        );
    }
    Ok(first)
}
