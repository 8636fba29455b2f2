// Row partitioning of a generation across workers

use std::ops::Range;

/// Split `[0, height)` into `nodes` contiguous bands.
///
/// Every band but the last is `height / nodes` rows tall; the last band runs
/// to `height` and absorbs the remainder. With more nodes than rows the
/// leading bands are empty. `nodes == 0` is treated as a single band.
pub fn partition_rows(height: usize, nodes: usize) -> Vec<Range<usize>> {
    let nodes = nodes.max(1);
    let band_height = height / nodes;
    let mut bands: Vec<Range<usize>> = (0..nodes - 1)
        .map(|i| i * band_height..(i + 1) * band_height)
        .collect();
    bands.push((nodes - 1) * band_height..height);
    bands
}
