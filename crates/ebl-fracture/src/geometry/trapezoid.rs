use super::{dedup_ring, remove_collinear, ring_points};
use geo::{BooleanOps, BoundingRect, Coord, LineString, MultiPolygon, Polygon, Rect};

/// Relative distance under which a vertex is snapped onto a band edge.
const SNAP_TOLERANCE: f64 = 1e-9;

/// Decompose a polygon into horizontal trapezoids.
///
/// The polygon is cut into bands at every distinct vertex height; inside a
/// band no vertex lies strictly between the cut lines, so every piece of the
/// band is bounded by two horizontal edges and two (possibly slanted) sides.
/// Pieces degenerate to triangles where a side meets a vertex. Pieces come out
/// bottom band first, left to right within a band.
pub fn decompose_trapezoids(polygon: &Polygon<f64>) -> Vec<Polygon<f64>> {
    let Some(bounds) = polygon.bounding_rect() else {
        return Vec::new();
    };

    let mut heights: Vec<f64> = polygon
        .exterior()
        .0
        .iter()
        .chain(polygon.interiors().iter().flat_map(|ring| ring.0.iter()))
        .map(|c| c.y)
        .collect();
    heights.sort_by(f64::total_cmp);
    heights.dedup();
    if heights.len() < 2 {
        return Vec::new();
    }

    let margin = (bounds.width() + bounds.height()).max(1.0);
    let left = bounds.min().x - margin;
    let right = bounds.max().x + margin;
    let subject = MultiPolygon::new(vec![polygon.clone()]);

    let mut trapezoids = Vec::new();
    for band in heights.windows(2) {
        let (low, high) = (band[0], band[1]);
        let strip = Rect::new(Coord { x: left, y: low }, Coord { x: right, y: high });
        let clip = MultiPolygon::new(vec![strip.to_polygon()]);

        let mut pieces: Vec<Polygon<f64>> = subject
            .intersection(&clip)
            .0
            .into_iter()
            .filter_map(|piece| clean_piece(&piece, low, high))
            .collect();
        pieces.sort_by(|a, b| min_x(a).total_cmp(&min_x(b)));
        trapezoids.extend(pieces);
    }
    trapezoids
}

/// Snap a band piece onto its cut lines and strip redundant vertices.
fn clean_piece(piece: &Polygon<f64>, low: f64, high: f64) -> Option<Polygon<f64>> {
    let snapped: Vec<(f64, f64)> = ring_points(piece)
        .into_iter()
        .map(|(x, y)| (x, snap(snap(y, low), high)))
        .collect();
    let ring = remove_collinear(&dedup_ring(&snapped));
    if ring.len() < 3 {
        return None;
    }
    Some(Polygon::new(
        LineString::from(ring),
        piece.interiors().to_vec(),
    ))
}

fn snap(value: f64, target: f64) -> f64 {
    if (value - target).abs() <= SNAP_TOLERANCE * target.abs().max(1.0) {
        target
    } else {
        value
    }
}

fn min_x(polygon: &Polygon<f64>) -> f64 {
    polygon
        .exterior()
        .0
        .iter()
        .map(|c| c.x)
        .fold(f64::INFINITY, f64::min)
}
