//! Bilinear spread of a coordinate onto grid anchors
//!
//! A coordinate is distributed across the (up to) four anchors of the grid
//! cell that contains it. The same function is used when merging an
//! observation and when answering a query, so both paths agree on which
//! anchors a point touches and with what weight.

use crate::grid::{AnchorKey, Coordinates, Precision};

/// Spread a coordinate onto its surrounding anchors
///
/// # Arguments
/// * `coords` - Point to spread
/// * `precision` - Grid resolution in cells per degree
///
/// # Returns
/// 1 to 4 distinct `(anchor, weight)` pairs whose weights sum to 1
///
/// # Algorithm
/// Candidates are `{floor, ceil}(lat * p) x {floor, ceil}(lon * p)` in the
/// order bottom-left, bottom-right, top-left, top-right. Each candidate gets
/// `(1 - |dlat| * p) * (1 - |dlon| * p)`: 1 on the anchor itself, 0.25 at a
/// cell center. When a coordinate lies on a grid line, floor and ceil
/// coincide and the collapsed candidates are summed into one anchor before
/// the weights are renormalized.
pub fn spread(coords: Coordinates, precision: Precision) -> Vec<(AnchorKey, f64)> {
    let p = precision.value();
    let lat_axis = axis_weights(coords.lat * p);
    let lon_axis = axis_weights(coords.lon * p);

    let mut anchors: Vec<(AnchorKey, f64)> = Vec::with_capacity(4);

    for &(lat_index, lat_weight) in &lat_axis {
        for &(lon_index, lon_weight) in &lon_axis {
            let key = AnchorKey::new(lat_index, lon_index, precision);
            let weight = lat_weight * lon_weight;

            match anchors.iter_mut().find(|(k, _)| *k == key) {
                Some((_, existing)) => *existing += weight,
                None => anchors.push((key, weight)),
            }
        }
    }

    // A zero-weight anchor would create a record with weight_acc == 0
    anchors.retain(|&(_, weight)| weight > 0.0);

    let total: f64 = anchors.iter().map(|&(_, weight)| weight).sum();
    for (_, weight) in &mut anchors {
        *weight /= total;
    }

    anchors
}

/// Lower and upper grid index along one axis with their 1D weights
///
/// Works in scaled (index) space: `|anchor - v| * p == |index - v * p|`.
fn axis_weights(scaled: f64) -> [(i64, f64); 2] {
    let lo = scaled.floor();
    let hi = scaled.ceil();
    [
        (lo as i64, (1.0 - (scaled - lo)).clamp(0.0, 1.0)),
        (hi as i64, (1.0 - (hi - scaled)).clamp(0.0, 1.0)),
    ]
}
