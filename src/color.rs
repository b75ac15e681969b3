use std::collections::BTreeMap;

/// Blue-to-red ramp stops; intermediate values interpolate linearly
/// between adjacent stops.
const RAMP: [(u8, u8, u8); 2] = [(0, 0, 255), (255, 0, 0)];

fn ramp_color(t: f64) -> (u8, u8, u8) {
    let t = t.clamp(0.0, 1.0);
    let segments = (RAMP.len() - 1) as f64;
    let x = t * segments;
    let i = x.floor() as usize;
    if i >= RAMP.len() - 1 {
        return RAMP[RAMP.len() - 1];
    }
    let f = x - i as f64;
    let (r0, g0, b0) = RAMP[i];
    let (r1, g1, b1) = RAMP[i + 1];
    let lerp = |a: u8, b: u8| (a as f64 + f * (b as f64 - a as f64)).round() as u8;
    (lerp(r0, r1), lerp(g0, g1), lerp(b0, b1))
}

fn hex((r, g, b): (u8, u8, u8)) -> String {
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

/// (min, max) over the series values, `None` for an empty series.
pub fn series_bounds(series: &BTreeMap<String, f64>) -> Option<(f64, f64)> {
    let mut bounds: Option<(f64, f64)> = None;
    for &value in series.values() {
        bounds = Some(match bounds {
            None => (value, value),
            Some((lo, hi)) => (lo.min(value), hi.max(value)),
        });
    }
    bounds
}

/// Maps every entry of a named series to a hex color on the ramp.
///
/// Values are normalized linearly over the series (min, max) with
/// clamping; a uniform series (min == max) maps every key to the single
/// low-end color rather than dividing by zero. Same series in, same
/// colors out.
pub fn map_series(series: &BTreeMap<String, f64>) -> BTreeMap<String, String> {
    let Some((min, max)) = series_bounds(series) else {
        return BTreeMap::new();
    };
    series
        .iter()
        .map(|(key, &value)| {
            let t = if max > min { (value - min) / (max - min) } else { 0.0 };
            (key.clone(), hex(ramp_color(t)))
        })
        .collect()
}
