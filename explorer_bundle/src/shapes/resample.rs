use itertools::Itertools;

use super::geometry::distance;
use super::Polygon;
use crate::ExplorerError;

/// The smallest vertex count of a resampled polygon, including the closing vertex.
pub const MIN_POLYGON_VERTICES: usize = 3;

/// Resample the boundary of `polygon` to a closed ring of exactly `n_vertices` vertices.
///
/// The last vertex repeats the first, so the ring has `n_vertices - 1` distinct positions.
/// If the polygon has no more distinct vertices than that, its edges are subdivided in proportion
/// to their length and the shape is kept exactly. Otherwise the boundary is sampled at uniform
/// arc length, starting from the first vertex.
///
/// # Errors
/// Returns [`ExplorerError::ConfigurationError`] if `n_vertices` is less than [`MIN_POLYGON_VERTICES`].
pub fn resample_polygon(
    polygon: &Polygon,
    n_vertices: usize,
) -> Result<Vec<[f64; 2]>, ExplorerError> {
    if n_vertices < MIN_POLYGON_VERTICES {
        return Err(ExplorerError::configuration(format!(
            "polygons need at least {MIN_POLYGON_VERTICES} vertices, got {n_vertices}"
        )));
    }
    let mut ring = polygon.exterior().iter().copied().dedup().collect::<Vec<_>>();
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    let positions = n_vertices - 1;
    let mut resampled = if ring.len() <= positions {
        subdivide_edges(&ring, positions - ring.len())
    } else {
        sample_arc_length(&ring, positions)
    };
    resampled.push(resampled[0]);
    Ok(resampled)
}

fn ring_edges(ring: &[[f64; 2]]) -> impl Iterator<Item = ([f64; 2], [f64; 2])> + '_ {
    ring.iter()
        .zip(ring.iter().cycle().skip(1))
        .map(|(a, b)| (*a, *b))
}

fn interpolate(a: [f64; 2], b: [f64; 2], t: f64) -> [f64; 2] {
    [a[0] + (b[0] - a[0]) * t, a[1] + (b[1] - a[1]) * t]
}

/// Insert `extra` vertices along the edges of `ring`, in proportion to edge length.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn subdivide_edges(ring: &[[f64; 2]], extra: usize) -> Vec<[f64; 2]> {
    let lengths = ring_edges(ring).map(|(a, b)| distance(a, b)).collect::<Vec<_>>();
    let total: f64 = lengths.iter().sum();

    let mut allocation = vec![0usize; ring.len()];
    if total > 0.0 {
        let quotas = lengths
            .iter()
            .map(|length| extra as f64 * length / total)
            .collect::<Vec<_>>();
        for (allocated, quota) in allocation.iter_mut().zip(&quotas) {
            *allocated = quota.floor() as usize;
        }
        let remainder = extra - allocation.iter().sum::<usize>();
        let by_fraction = (0..ring.len())
            .sorted_by(|&i, &j| {
                let fraction = |k: usize| quotas[k] - quotas[k].floor();
                fraction(j).total_cmp(&fraction(i)).then(i.cmp(&j))
            })
            .take(remainder)
            .collect::<Vec<_>>();
        for edge in by_fraction {
            allocation[edge] += 1;
        }
    } else {
        allocation[0] = extra;
    }

    let mut resampled = Vec::with_capacity(ring.len() + extra);
    for ((a, b), inserted) in ring_edges(ring).zip(allocation) {
        resampled.push(a);
        for step in 1..=inserted {
            resampled.push(interpolate(a, b, step as f64 / (inserted + 1) as f64));
        }
    }
    resampled
}

/// Sample `positions` points at uniform arc length along the closed `ring`.
#[allow(clippy::cast_precision_loss)]
fn sample_arc_length(ring: &[[f64; 2]], positions: usize) -> Vec<[f64; 2]> {
    let edges = ring_edges(ring)
        .map(|(a, b)| (a, b, distance(a, b)))
        .collect::<Vec<_>>();
    let perimeter: f64 = edges.iter().map(|(_, _, length)| length).sum();
    if perimeter <= 0.0 {
        return vec![ring[0]; positions];
    }

    let mut resampled = Vec::with_capacity(positions + 1);
    let mut edge = 0;
    let mut edge_start = 0.0;
    for position in 0..positions {
        let target = perimeter * position as f64 / positions as f64;
        while edge + 1 < edges.len() && edge_start + edges[edge].2 < target {
            edge_start += edges[edge].2;
            edge += 1;
        }
        let (a, b, length) = edges[edge];
        let t = if length > 0.0 {
            ((target - edge_start) / length).clamp(0.0, 1.0)
        } else {
            0.0
        };
        resampled.push(interpolate(a, b, t));
    }
    resampled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::geometry::ring_area;

    fn square() -> Polygon {
        Polygon::new(vec![[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0]]).unwrap()
    }

    #[test]
    fn resample_square_keeps_area() {
        let resampled = resample_polygon(&square(), 13).unwrap();
        assert_eq!(resampled.len(), 13);
        assert_eq!(resampled.first(), resampled.last());
        assert!((ring_area(&resampled) - 16.0).abs() < 1e-9);
        // three positions per edge
        assert_eq!(resampled[1], [4.0 / 3.0, 0.0]);
        assert_eq!(resampled[3], [4.0, 0.0]);
    }

    #[test]
    fn resample_uneven_edges() {
        let rectangle =
            Polygon::new(vec![[0.0, 0.0], [3.0, 0.0], [3.0, 1.0], [0.0, 1.0], [0.0, 0.0]]).unwrap();
        let resampled = resample_polygon(&rectangle, 9).unwrap();
        assert_eq!(resampled.len(), 9);
        assert!((ring_area(&resampled) - 3.0).abs() < 1e-9);
        // ties between equal remainders go to the earlier edge
        assert_eq!(resampled[1], [1.0, 0.0]);
        assert_eq!(resampled[2], [2.0, 0.0]);
        assert_eq!(resampled[3], [3.0, 0.0]);
    }

    #[test]
    fn resample_dense_polygon_uniform() {
        let circle = crate::shapes::buffer_point([0.0, 0.0], 10.0).unwrap();
        let resampled = resample_polygon(&circle, 13).unwrap();
        assert_eq!(resampled.len(), 13);
        assert_eq!(resampled.first(), resampled.last());
        assert!(resampled
            .iter()
            .all(|[x, y]| (x.hypot(*y) - 10.0).abs() < 0.02));
        let area = ring_area(&resampled);
        let circle_area = std::f64::consts::PI * 100.0;
        assert!(area < circle_area && area > 0.9 * circle_area);
    }

    #[test]
    fn resample_degenerate() {
        let point = Polygon::new(vec![[1.0, 2.0]]).unwrap();
        let resampled = resample_polygon(&point, 5).unwrap();
        assert_eq!(resampled, vec![[1.0, 2.0]; 5]);
        let line = Polygon::new(vec![[0.0, 0.0], [2.0, 0.0], [2.0, 0.0]]).unwrap();
        let resampled = resample_polygon(&line, 6).unwrap();
        assert_eq!(resampled.len(), 6);
        assert!(ring_area(&resampled).abs() < 1e-12);
        assert!(resample_polygon(&square(), 2).is_err());
    }
}
