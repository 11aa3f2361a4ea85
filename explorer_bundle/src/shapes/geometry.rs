use std::f64::consts::TAU;

use derive_more::Display;

use crate::ExplorerError;

/// The number of segments of the circle a point is buffered into.
pub const POINT_BUFFER_SEGMENTS: usize = 64;

/// The radius of a point without one.
pub const DEFAULT_POINT_RADIUS: f64 = 1.0;

/// A simple polygon, stored as its open exterior ring.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    exterior: Vec<[f64; 2]>,
}

impl Polygon {
    /// Create a polygon from its exterior ring, which may repeat its first vertex at the end.
    ///
    /// # Errors
    /// Returns [`ExplorerError::UnsupportedGeometryType`] if the ring is empty or has non-finite coordinates.
    pub fn new(mut exterior: Vec<[f64; 2]>) -> Result<Self, ExplorerError> {
        if exterior.len() > 1 && exterior.first() == exterior.last() {
            exterior.pop();
        }
        if exterior.is_empty() {
            return Err(ExplorerError::UnsupportedGeometryType(
                "empty polygon".to_string(),
            ));
        }
        if exterior.iter().flatten().any(|value| !value.is_finite()) {
            return Err(ExplorerError::UnsupportedGeometryType(
                "polygon with non-finite coordinates".to_string(),
            ));
        }
        Ok(Self { exterior })
    }

    /// The exterior ring, without the closing vertex.
    #[must_use]
    pub fn exterior(&self) -> &[[f64; 2]] {
        &self.exterior
    }

    /// The exterior ring, closed by repeating the first vertex.
    #[must_use]
    pub fn closed_exterior(&self) -> Vec<[f64; 2]> {
        let mut ring = self.exterior.clone();
        ring.push(self.exterior[0]);
        ring
    }

    /// The edges of the closed ring, as pairs of consecutive vertices.
    pub fn edges(&self) -> impl Iterator<Item = ([f64; 2], [f64; 2])> + '_ {
        self.exterior
            .iter()
            .zip(self.exterior.iter().cycle().skip(1))
            .map(|(a, b)| (*a, *b))
    }

    /// The unsigned area (shoelace formula).
    #[must_use]
    pub fn area(&self) -> f64 {
        ring_area(&self.exterior)
    }

    /// The perimeter of the closed ring.
    #[must_use]
    pub fn perimeter(&self) -> f64 {
        self.edges().map(|(a, b)| distance(a, b)).sum()
    }

    /// Scale every coordinate by `1 / divisor`.
    #[must_use]
    pub fn scaled_down(&self, divisor: f64) -> Self {
        Self {
            exterior: self
                .exterior
                .iter()
                .map(|[x, y]| [x / divisor, y / divisor])
                .collect(),
        }
    }
}

/// The unsigned area of a ring (shoelace formula). The ring may be open or closed.
#[must_use]
pub fn ring_area(ring: &[[f64; 2]]) -> f64 {
    if ring.is_empty() {
        return 0.0;
    }
    let twice_area: f64 = ring
        .iter()
        .zip(ring.iter().cycle().skip(1))
        .map(|([x0, y0], [x1, y1])| x0 * y1 - x1 * y0)
        .sum();
    twice_area.abs() / 2.0
}

pub(crate) fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    (b[0] - a[0]).hypot(b[1] - a[1])
}

/// The kind of a [`CellGeometry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum GeometryKind {
    /// A polygon.
    #[display("Polygon")]
    Polygon,
    /// A point.
    #[display("Point")]
    Point,
    /// A multi-polygon.
    #[display("MultiPolygon")]
    MultiPolygon,
}

/// The boundary of one cell, before normalization to a [`Polygon`].
#[derive(Clone, Debug, PartialEq)]
pub enum CellGeometry {
    /// A polygon.
    Polygon(Polygon),
    /// A point, buffered into a circle of `radius` (or [`DEFAULT_POINT_RADIUS`]).
    Point {
        /// The center.
        center: [f64; 2],
        /// The radius.
        radius: Option<f64>,
    },
    /// A multi-polygon, reduced to its largest member.
    MultiPolygon(Vec<Polygon>),
}

impl From<Polygon> for CellGeometry {
    fn from(polygon: Polygon) -> Self {
        Self::Polygon(polygon)
    }
}

impl CellGeometry {
    /// The geometry kind.
    #[must_use]
    pub fn kind(&self) -> GeometryKind {
        match self {
            Self::Polygon(_) => GeometryKind::Polygon,
            Self::Point { .. } => GeometryKind::Point,
            Self::MultiPolygon(_) => GeometryKind::MultiPolygon,
        }
    }

    /// Normalize to a single polygon.
    ///
    /// # Errors
    /// Returns an [`ExplorerError`] if a point radius is invalid or a multi-polygon is empty.
    pub fn to_polygon(&self) -> Result<Polygon, ExplorerError> {
        match self {
            Self::Polygon(polygon) => Ok(polygon.clone()),
            Self::Point { center, radius } => {
                buffer_point(*center, radius.unwrap_or(DEFAULT_POINT_RADIUS))
            }
            Self::MultiPolygon(polygons) => largest_polygon(polygons).cloned(),
        }
    }
}

/// Expand a point into a circle of `radius` with [`POINT_BUFFER_SEGMENTS`] vertices.
///
/// # Errors
/// Returns [`ExplorerError::ConfigurationError`] if `radius` is not positive and finite.
pub fn buffer_point(center: [f64; 2], radius: f64) -> Result<Polygon, ExplorerError> {
    if !radius.is_finite() || radius <= 0.0 {
        return Err(ExplorerError::configuration(format!(
            "point radius {radius} is not positive"
        )));
    }
    #[allow(clippy::cast_precision_loss)]
    let exterior = (0..POINT_BUFFER_SEGMENTS)
        .map(|segment| {
            let angle = TAU * segment as f64 / POINT_BUFFER_SEGMENTS as f64;
            [
                center[0] + radius * angle.cos(),
                center[1] + radius * angle.sin(),
            ]
        })
        .collect();
    Polygon::new(exterior)
}

/// The member of `polygons` with the largest area, the first one on ties.
///
/// # Errors
/// Returns [`ExplorerError::UnsupportedGeometryType`] if `polygons` is empty.
pub fn largest_polygon(polygons: &[Polygon]) -> Result<&Polygon, ExplorerError> {
    polygons
        .iter()
        .reduce(|largest, polygon| {
            if polygon.area() > largest.area() {
                polygon
            } else {
                largest
            }
        })
        .ok_or_else(|| ExplorerError::UnsupportedGeometryType("empty multi-polygon".to_string()))
}

/// Normalize a homogeneous collection of geometries into polygons.
///
/// # Errors
/// Returns [`ExplorerError::UnsupportedGeometryType`] if the collection mixes geometry kinds,
/// or any error of [`CellGeometry::to_polygon`].
pub fn standardize_geometries(geometries: &[CellGeometry]) -> Result<Vec<Polygon>, ExplorerError> {
    if let Some(first) = geometries.first() {
        let kind = first.kind();
        if let Some(other) = geometries.iter().find(|geometry| geometry.kind() != kind) {
            return Err(ExplorerError::UnsupportedGeometryType(format!(
                "mixed geometry types {kind} and {}",
                other.kind()
            )));
        }
        if kind != GeometryKind::Polygon {
            log::info!("Converting {} {kind} geometries to polygons", geometries.len());
        }
    }
    geometries.iter().map(CellGeometry::to_polygon).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(side: f64) -> Polygon {
        Polygon::new(vec![[0.0, 0.0], [side, 0.0], [side, side], [0.0, side], [0.0, 0.0]]).unwrap()
    }

    #[test]
    fn polygon_basics() {
        let polygon = square(2.0);
        assert_eq!(polygon.exterior().len(), 4);
        assert_eq!(polygon.closed_exterior().len(), 5);
        assert!((polygon.area() - 4.0).abs() < 1e-12);
        assert!((polygon.perimeter() - 8.0).abs() < 1e-12);
        assert!((polygon.scaled_down(2.0).area() - 1.0).abs() < 1e-12);
        assert!(Polygon::new(vec![]).is_err());
        assert!(Polygon::new(vec![[f64::NAN, 0.0]]).is_err());
    }

    #[test]
    fn point_buffer() {
        let polygon = buffer_point([10.0, 5.0], 2.0).unwrap();
        assert_eq!(polygon.exterior().len(), POINT_BUFFER_SEGMENTS);
        assert!((polygon.exterior()[0][0] - 12.0).abs() < 1e-12);
        // a 64-gon is within 0.2% of the circle area
        let circle = std::f64::consts::PI * 4.0;
        assert!((polygon.area() - circle).abs() / circle < 2e-3);
        assert!(buffer_point([0.0, 0.0], 0.0).is_err());
    }

    #[test]
    fn multi_polygon_largest() {
        let geometry = CellGeometry::MultiPolygon(vec![square(1.0), square(3.0), square(2.0)]);
        assert_eq!(geometry.to_polygon().unwrap(), square(3.0));
        assert!(CellGeometry::MultiPolygon(vec![]).to_polygon().is_err());
    }

    #[test]
    fn standardize_homogeneous() {
        let points = vec![
            CellGeometry::Point {
                center: [0.0, 0.0],
                radius: None,
            },
            CellGeometry::Point {
                center: [5.0, 5.0],
                radius: Some(3.0),
            },
        ];
        let polygons = standardize_geometries(&points).unwrap();
        assert_eq!(polygons.len(), 2);
        assert!(polygons[1].area() > polygons[0].area());

        let mixed = vec![CellGeometry::from(square(1.0)), points[0].clone()];
        assert!(matches!(
            standardize_geometries(&mixed),
            Err(ExplorerError::UnsupportedGeometryType(message)) if message.contains("Point")
        ));
        assert!(standardize_geometries(&[]).unwrap().is_empty());
    }
}
