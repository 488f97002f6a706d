//! Pure 2D geometry used by the region validator, graph builder, and planner.
//!
//! All functions are stateless. Comparisons against zero use [`EPSILON`] so
//! that collinear and touching segments are classified consistently.

use wayfarer_types::{Point, Wall};

/// Tolerance for floating-point comparisons on map coordinates.
pub const EPSILON: f64 = 1e-9;

/// Upper bound on the number of interpolated steps for a single segment.
///
/// Longer segments are spaced evenly instead of at the requested step.
pub const MAX_INTERPOLATION_STEPS: u32 = 1_000_000;

/// Euclidean distance between two points.
pub fn distance(a: Point, b: Point) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}

/// Linear interpolation from `a` to `b` at parameter `t` in `[0, 1]`.
pub fn lerp(a: Point, b: Point, t: f64) -> Point {
    Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t)
}

/// Whether two points are the same within [`EPSILON`].
pub fn same_point(a: Point, b: Point) -> bool {
    distance(a, b) < EPSILON
}

/// Ray-casting containment test. Polygons may be concave; fewer than three
/// points never contain anything.
pub fn point_in_polygon(point: Point, polygon: &[Point]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let Some(&last) = polygon.last() else {
        return false;
    };

    let mut inside = false;
    let mut prev = last;
    for &cur in polygon {
        if (cur.y > point.y) != (prev.y > point.y) {
            let x_cross = (prev.x - cur.x) * (point.y - cur.y) / (prev.y - cur.y) + cur.x;
            if point.x < x_cross {
                inside = !inside;
            }
        }
        prev = cur;
    }
    inside
}

/// Unsigned polygon area (shoelace formula).
pub fn polygon_area(polygon: &[Point]) -> f64 {
    let Some(&last) = polygon.last() else {
        return 0.0;
    };
    let mut prev = last;
    let mut twice = 0.0;
    for &cur in polygon {
        twice += prev.x * cur.y - cur.x * prev.y;
        prev = cur;
    }
    (twice / 2.0).abs()
}

/// Sign of the turn `a -> b -> c`: 1 counter-clockwise, -1 clockwise,
/// 0 collinear.
fn orientation(a: Point, b: Point, c: Point) -> i8 {
    let cross = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
    if cross > EPSILON {
        1
    } else if cross < -EPSILON {
        -1
    } else {
        0
    }
}

/// Whether `q` lies within the bounding box of segment `p`-`r`
/// (callers guarantee the three points are collinear).
fn on_segment(p: Point, q: Point, r: Point) -> bool {
    q.x <= p.x.max(r.x) + EPSILON
        && q.x >= p.x.min(r.x) - EPSILON
        && q.y <= p.y.max(r.y) + EPSILON
        && q.y >= p.y.min(r.y) - EPSILON
}

/// Whether segment `p1`-`p2` intersects segment `q1`-`q2`.
///
/// Touching endpoints and collinear overlap count as intersections.
pub fn segments_intersect(p1: Point, p2: Point, q1: Point, q2: Point) -> bool {
    let o1 = orientation(p1, p2, q1);
    let o2 = orientation(p1, p2, q2);
    let o3 = orientation(q1, q2, p1);
    let o4 = orientation(q1, q2, p2);

    if o1 != o2 && o3 != o4 {
        return true;
    }

    (o1 == 0 && on_segment(p1, q1, p2))
        || (o2 == 0 && on_segment(p1, q2, p2))
        || (o3 == 0 && on_segment(q1, p1, q2))
        || (o4 == 0 && on_segment(q1, p2, q2))
}

/// Whether segment `a`-`b` crosses any segment of the polyline.
pub fn crosses_polyline(a: Point, b: Point, polyline: &[Point]) -> bool {
    polyline
        .windows(2)
        .any(|seg| matches!(seg, [p, q] if segments_intersect(a, b, *p, *q)))
}

/// Whether segment `a`-`b` crosses the wall.
pub fn crosses_wall(a: Point, b: Point, wall: &Wall) -> bool {
    crosses_polyline(a, b, &wall.points)
}

/// Index of the first wall (in snapshot order) crossed by segment `a`-`b`.
pub fn first_blocking_wall(a: Point, b: Point, walls: &[Wall]) -> Option<usize> {
    walls.iter().position(|wall| crosses_wall(a, b, wall))
}

/// Whether segment `a`-`b` crosses no wall at all.
pub fn is_clear(a: Point, b: Point, walls: &[Wall]) -> bool {
    first_blocking_wall(a, b, walls).is_none()
}

/// Whether two polylines cross each other anywhere.
pub fn polylines_cross(first: &[Point], second: &[Point]) -> bool {
    first
        .windows(2)
        .any(|seg| matches!(seg, [a, b] if crosses_polyline(*a, *b, second)))
}

/// Total length of a polyline.
pub fn polyline_length(points: &[Point]) -> f64 {
    points
        .windows(2)
        .map(|seg| match seg {
            [a, b] => distance(*a, *b),
            _ => 0.0,
        })
        .sum()
}

/// Intermediate points every `step` along `from` -> `to`, excluding `from`
/// and always ending with exactly `to`.
///
/// A segment shorter than `step` (or a non-positive `step`) yields the
/// single point `to`.
pub fn interpolate_steps(from: Point, to: Point, step: f64) -> Vec<Point> {
    let total = distance(from, to);
    if !(step.is_finite() && step > 0.0) || !total.is_finite() || total <= step {
        return vec![to];
    }

    let full = (total / step).floor();
    let (count, spacing) = if full >= f64::from(MAX_INTERPOLATION_STEPS) {
        (
            MAX_INTERPOLATION_STEPS,
            total / f64::from(MAX_INTERPOLATION_STEPS),
        )
    } else {
        // `full` is finite, non-negative and below MAX_INTERPOLATION_STEPS.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = full as u32;
        (count, step)
    };

    let mut steps = Vec::with_capacity(usize::try_from(count).unwrap_or(0).saturating_add(1));
    for k in 1..=count {
        let travelled = spacing * f64::from(k);
        if travelled >= total - EPSILON {
            break;
        }
        steps.push(lerp(from, to, travelled / total));
    }
    steps.push(to);
    steps
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use rand::Rng;
    use wayfarer_types::WallId;

    use super::*;

    fn square(size: f64) -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(size, 0.0),
            Point::new(size, size),
            Point::new(0.0, size),
        ]
    }

    fn wall(points: &[(f64, f64)]) -> Wall {
        Wall {
            id: WallId::from("w"),
            name: String::from("wall"),
            points: points.iter().map(|&(x, y)| Point::new(x, y)).collect(),
        }
    }

    #[test]
    fn distance_is_euclidean() {
        assert!((distance(Point::new(0.0, 0.0), Point::new(3.0, 4.0)) - 5.0).abs() < EPSILON);
    }

    #[test]
    fn square_contains_center_not_outside() {
        let poly = square(10.0);
        assert!(point_in_polygon(Point::new(5.0, 5.0), &poly));
        assert!(!point_in_polygon(Point::new(15.0, 5.0), &poly));
        assert!(!point_in_polygon(Point::new(-1.0, -1.0), &poly));
    }

    #[test]
    fn concave_polygon_notch_is_outside() {
        // U shape: the notch between the arms is not inside.
        let poly = vec![
            Point::new(0.0, 0.0),
            Point::new(30.0, 0.0),
            Point::new(30.0, 30.0),
            Point::new(20.0, 30.0),
            Point::new(20.0, 10.0),
            Point::new(10.0, 10.0),
            Point::new(10.0, 30.0),
            Point::new(0.0, 30.0),
        ];
        assert!(point_in_polygon(Point::new(5.0, 20.0), &poly));
        assert!(point_in_polygon(Point::new(25.0, 20.0), &poly));
        assert!(!point_in_polygon(Point::new(15.0, 20.0), &poly));
    }

    #[test]
    fn degenerate_polygon_contains_nothing() {
        let line = vec![Point::new(0.0, 0.0), Point::new(10.0, 10.0)];
        assert!(!point_in_polygon(Point::new(5.0, 5.0), &line));
    }

    #[test]
    fn area_of_square() {
        assert!((polygon_area(&square(10.0)) - 100.0).abs() < EPSILON);
    }

    #[test]
    fn crossing_segments_intersect() {
        assert!(segments_intersect(
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
            Point::new(10.0, 0.0),
        ));
    }

    #[test]
    fn parallel_segments_do_not_intersect() {
        assert!(!segments_intersect(
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 1.0),
            Point::new(10.0, 1.0),
        ));
    }

    #[test]
    fn touching_and_collinear_segments_intersect() {
        assert!(segments_intersect(
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.0),
            Point::new(5.0, 0.0),
            Point::new(5.0, 5.0),
        ));
        assert!(segments_intersect(
            Point::new(0.0, 0.0),
            Point::new(6.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(9.0, 0.0),
        ));
        assert!(!segments_intersect(
            Point::new(0.0, 0.0),
            Point::new(3.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(9.0, 0.0),
        ));
    }

    #[test]
    fn wall_blocks_only_crossing_segments() {
        let walls = vec![wall(&[(5.0, -10.0), (5.0, 10.0)])];
        assert_eq!(
            first_blocking_wall(Point::new(0.0, 0.0), Point::new(10.0, 0.0), &walls),
            Some(0)
        );
        assert!(is_clear(Point::new(0.0, 0.0), Point::new(4.0, 0.0), &walls));
        assert!(is_clear(Point::new(0.0, 20.0), Point::new(10.0, 20.0), &walls));
    }

    #[test]
    fn polyline_wall_uses_every_segment() {
        let w = wall(&[(0.0, 5.0), (10.0, 5.0), (10.0, 50.0)]);
        assert!(crosses_wall(Point::new(8.0, 30.0), Point::new(12.0, 30.0), &w));
        assert!(!crosses_wall(Point::new(20.0, 0.0), Point::new(20.0, 40.0), &w));
    }

    #[test]
    fn polyline_length_sums_segments() {
        let pts = vec![Point::new(0.0, 0.0), Point::new(3.0, 4.0), Point::new(3.0, 10.0)];
        assert!((polyline_length(&pts) - 11.0).abs() < EPSILON);
        assert!(polyline_length(&pts[..1]).abs() < EPSILON);
    }

    #[test]
    fn short_segment_yields_single_step() {
        let steps = interpolate_steps(Point::new(0.0, 0.0), Point::new(3.0, 0.0), 10.0);
        assert_eq!(steps, vec![Point::new(3.0, 0.0)]);
    }

    #[test]
    fn zero_length_segment_yields_endpoint() {
        let p = Point::new(7.0, 7.0);
        assert_eq!(interpolate_steps(p, p, 10.0), vec![p]);
    }

    #[test]
    fn steps_are_spaced_by_step_distance() {
        let steps = interpolate_steps(Point::new(0.0, 0.0), Point::new(25.0, 0.0), 10.0);
        assert_eq!(steps.len(), 3);
        assert!((steps[0].x - 10.0).abs() < EPSILON);
        assert!((steps[1].x - 20.0).abs() < EPSILON);
        assert_eq!(steps[2], Point::new(25.0, 0.0));
    }

    #[test]
    fn exact_multiple_does_not_duplicate_endpoint() {
        let steps = interpolate_steps(Point::new(0.0, 0.0), Point::new(30.0, 0.0), 10.0);
        assert_eq!(steps.len(), 3);
        assert_eq!(steps.last().copied(), Some(Point::new(30.0, 0.0)));
    }

    #[test]
    fn interpolation_ends_at_target_and_tracks_length() {
        let mut rng = rand::rng();
        for _ in 0..200 {
            let a = Point::new(rng.random_range(-5000.0..5000.0), rng.random_range(-5000.0..5000.0));
            let b = Point::new(rng.random_range(-5000.0..5000.0), rng.random_range(-5000.0..5000.0));
            let step = rng.random_range(1.0..100.0);

            let steps = interpolate_steps(a, b, step);
            assert!(!steps.is_empty());
            assert_eq!(steps.last().copied(), Some(b));

            let mut route = vec![a];
            route.extend(steps.iter().copied());
            let walked = polyline_length(&route);
            assert!((walked - distance(a, b)).abs() <= step);

            for seg in route.windows(2) {
                assert!(distance(seg[0], seg[1]) <= step + 1e-6);
            }
        }
    }
}
