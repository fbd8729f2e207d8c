//! Planar geometry helpers for deskew and dewarp: convex hull, minimum-area
//! rectangle, polygon simplification and quadrilateral corner ordering.

use imageproc::point::Point;

/// Rotated rectangle with its edge angle in degrees (image coordinates, y down).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    pub center: Point<f64>,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
}

/// Cross product of vectors OA and OB
#[inline]
fn cross(o: Point<f64>, a: Point<f64>, b: Point<f64>) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Compute convex hull using Andrew's monotone chain algorithm
pub fn convex_hull(points: &[Point<f64>]) -> Vec<Point<f64>> {
    let mut pts: Vec<Point<f64>> = points.to_vec();
    pts.sort_by(|a, b| {
        a.x.partial_cmp(&b.x)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal))
    });
    pts.dedup();

    if pts.len() < 3 {
        return pts;
    }

    let mut lower: Vec<Point<f64>> = Vec::new();
    for p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], *p) <= 0.0 {
            lower.pop();
        }
        lower.push(*p);
    }

    let mut upper: Vec<Point<f64>> = Vec::new();
    for p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], *p) <= 0.0 {
            upper.pop();
        }
        upper.push(*p);
    }

    // Last point of each half repeats the first of the other
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Minimum-area enclosing rectangle of a point set, or `None` for fewer than two
/// distinct points.
pub fn min_area_rect(points: &[Point<f64>]) -> Option<RotatedRect> {
    let hull = convex_hull(points);
    match hull.len() {
        0 | 1 => None,
        2 => {
            let (a, b) = (hull[0], hull[1]);
            let dx = b.x - a.x;
            let dy = b.y - a.y;
            Some(RotatedRect {
                center: Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0),
                width: dx.hypot(dy),
                height: 0.0,
                angle: dy.atan2(dx).to_degrees(),
            })
        }
        _ => rotating_calipers_min_rect(&hull),
    }
}

/// Rotating calipers over the hull edges; the best edge's direction is the rectangle angle.
fn rotating_calipers_min_rect(hull: &[Point<f64>]) -> Option<RotatedRect> {
    let n = hull.len();
    let mut best: Option<(f64, RotatedRect)> = None;

    for i in 0..n {
        let p1 = hull[i];
        let p2 = hull[(i + 1) % n];
        let edge_x = p2.x - p1.x;
        let edge_y = p2.y - p1.y;
        let edge_len = edge_x.hypot(edge_y);
        if edge_len < 1e-10 {
            continue;
        }

        let ux = edge_x / edge_len;
        let uy = edge_y / edge_len;
        let vx = -uy;
        let vy = ux;

        let mut min_u = f64::MAX;
        let mut max_u = f64::MIN;
        let mut min_v = f64::MAX;
        let mut max_v = f64::MIN;
        for p in hull {
            let dx = p.x - p1.x;
            let dy = p.y - p1.y;
            let u = dx * ux + dy * uy;
            let v = dx * vx + dy * vy;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let width = max_u - min_u;
        let height = max_v - min_v;
        let area = width * height;
        if best.as_ref().is_some_and(|(best_area, _)| area >= *best_area) {
            continue;
        }

        let center_u = (min_u + max_u) / 2.0;
        let center_v = (min_v + max_v) / 2.0;
        best = Some((
            area,
            RotatedRect {
                center: Point::new(
                    p1.x + center_u * ux + center_v * vx,
                    p1.y + center_u * uy + center_v * vy,
                ),
                width,
                height,
                angle: uy.atan2(ux).to_degrees(),
            },
        ));
    }

    best.map(|(_, rect)| rect)
}

/// Folds a rectangle edge angle into the skew range `[-45, 45)`.
///
/// The angle is first reduced into `[-90, 0)`; anything below -45 then gains 90.
pub fn normalize_skew_angle(angle: f64) -> f64 {
    let mut normalized = angle.rem_euclid(90.0) - 90.0;
    if normalized < -45.0 {
        normalized += 90.0;
    }
    normalized
}

/// Polygon area via the shoelace formula. Vertices must be in order (CW or CCW).
pub fn shoelace_area(points: &[Point<f64>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0f64;
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].x * points[j].y;
        area -= points[j].x * points[i].y;
    }
    area.abs() / 2.0
}

fn distance(a: Point<f64>, b: Point<f64>) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}

/// Distance from `p` to the line through `a` and `b` (to `a` when they coincide).
fn perpendicular_distance(p: Point<f64>, a: Point<f64>, b: Point<f64>) -> f64 {
    let length = distance(a, b);
    if length < 1e-12 {
        return distance(p, a);
    }
    cross(a, b, p).abs() / length
}

/// Douglas-Peucker simplification of an open chain; both endpoints are kept.
fn simplify_chain(chain: &[Point<f64>], epsilon: f64) -> Vec<Point<f64>> {
    if chain.len() < 3 {
        return chain.to_vec();
    }

    let mut keep = vec![false; chain.len()];
    keep[0] = true;
    keep[chain.len() - 1] = true;

    let mut stack = vec![(0usize, chain.len() - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let (index, max_distance) = (start + 1..end)
            .map(|i| (i, perpendicular_distance(chain[i], chain[start], chain[end])))
            .fold((start, 0.0f64), |best, candidate| {
                if candidate.1 > best.1 {
                    candidate
                } else {
                    best
                }
            });
        if max_distance > epsilon {
            keep[index] = true;
            stack.push((start, index));
            stack.push((index, end));
        }
    }

    chain
        .iter()
        .zip(keep)
        .filter_map(|(p, kept)| kept.then_some(*p))
        .collect()
}

/// Douglas-Peucker simplification of a closed contour.
///
/// The contour is split at its first point and the point farthest from it, each
/// half is simplified as an open chain and the halves are joined again.
pub fn approximate_polygon(contour: &[Point<f64>], epsilon: f64) -> Vec<Point<f64>> {
    if contour.len() < 3 {
        return contour.to_vec();
    }

    let origin = contour[0];
    let far = contour
        .iter()
        .enumerate()
        .skip(1)
        .fold((0usize, 0.0f64), |best, (i, p)| {
            let d = distance(origin, *p);
            if d > best.1 {
                (i, d)
            } else {
                best
            }
        })
        .0;
    if far == 0 {
        return vec![origin];
    }

    let first_half = simplify_chain(&contour[..=far], epsilon);
    let mut second: Vec<Point<f64>> = contour[far..].to_vec();
    second.push(origin);
    let second_half = simplify_chain(&second, epsilon);

    let mut polygon: Vec<Point<f64>> = first_half[..first_half.len() - 1].to_vec();
    polygon.extend_from_slice(&second_half[..second_half.len() - 1]);
    polygon
}

/// Orders four corners as top-left, top-right, bottom-left, bottom-right.
///
/// Corners are sorted by y; the upper pair and the lower pair are each split by x.
/// Strongly rotated quadrilaterals can be mis-paired by this rule.
pub fn order_corners(corners: [Point<f64>; 4]) -> [Point<f64>; 4] {
    let mut sorted = corners;
    sorted.sort_by(|a, b| {
        a.y.partial_cmp(&b.y)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
    });

    let (top_left, top_right) = if sorted[0].x <= sorted[1].x {
        (sorted[0], sorted[1])
    } else {
        (sorted[1], sorted[0])
    };
    let (bottom_left, bottom_right) = if sorted[2].x <= sorted[3].x {
        (sorted[2], sorted[3])
    } else {
        (sorted[3], sorted[2])
    };

    [top_left, top_right, bottom_left, bottom_right]
}

/// Output size for a perspective rectification of ordered corners: the longer of
/// each pair of opposite edges.
pub fn rectified_size(ordered: &[Point<f64>; 4]) -> (u32, u32) {
    let [tl, tr, bl, br] = *ordered;
    let width = distance(tl, tr).max(distance(bl, br));
    let height = distance(tl, bl).max(distance(tr, br));
    (width.round() as u32, height.round() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point<f64> {
        Point::new(x, y)
    }

    #[test]
    fn test_convex_hull_square() {
        let points = vec![p(0.0, 0.0), p(10.0, 0.0), p(10.0, 10.0), p(0.0, 10.0), p(5.0, 5.0)];
        let hull = convex_hull(&points);
        assert_eq!(hull.len(), 4);
        assert!(!hull.contains(&p(5.0, 5.0)));
    }

    #[test]
    fn test_min_area_rect_axis_aligned() {
        let points = vec![p(0.0, 0.0), p(20.0, 0.0), p(20.0, 10.0), p(0.0, 10.0)];
        let rect = min_area_rect(&points).expect("rectangle expected");
        assert!((rect.center.x - 10.0).abs() < 1e-6);
        assert!((rect.center.y - 5.0).abs() < 1e-6);
        assert!((rect.width * rect.height - 200.0).abs() < 1e-6);
        assert!(normalize_skew_angle(rect.angle).abs() < 1e-6);
    }

    #[test]
    fn test_min_area_rect_rotated() {
        let angle = 5f64.to_radians();
        let (s, c) = angle.sin_cos();
        let corners = [(0.0, 0.0), (100.0, 0.0), (100.0, 20.0), (0.0, 20.0)];
        let points: Vec<Point<f64>> = corners
            .iter()
            .map(|&(x, y)| p(x * c - y * s, x * s + y * c))
            .collect();
        let rect = min_area_rect(&points).expect("rectangle expected");
        assert!((normalize_skew_angle(rect.angle) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_min_area_rect_degenerate() {
        assert!(min_area_rect(&[]).is_none());
        assert!(min_area_rect(&[p(1.0, 1.0), p(1.0, 1.0)]).is_none());
    }

    #[test]
    fn test_normalize_skew_angle() {
        assert!((normalize_skew_angle(-88.0) - 2.0).abs() < 1e-9);
        assert!((normalize_skew_angle(-3.0) + 3.0).abs() < 1e-9);
        assert!((normalize_skew_angle(177.0) + 3.0).abs() < 1e-9);
        assert!((normalize_skew_angle(92.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_shoelace_area_rectangle() {
        let area = shoelace_area(&[p(0.0, 0.0), p(10.0, 0.0), p(10.0, 5.0), p(0.0, 5.0)]);
        assert!((area - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_approximate_polygon_recovers_rectangle() {
        let mut contour = Vec::new();
        for x in 0..=40 {
            contour.push(p(x as f64, 0.0));
        }
        for y in 1..=30 {
            contour.push(p(40.0, y as f64));
        }
        for x in (0..40).rev() {
            contour.push(p(x as f64, 30.0));
        }
        for y in (1..30).rev() {
            contour.push(p(0.0, y as f64));
        }

        let polygon = approximate_polygon(&contour, 2.0);
        assert_eq!(polygon.len(), 4);
        for corner in [p(0.0, 0.0), p(40.0, 0.0), p(40.0, 30.0), p(0.0, 30.0)] {
            assert!(polygon.contains(&corner));
        }
    }

    #[test]
    fn test_order_corners_and_size() {
        let ordered = order_corners([p(95.0, 90.0), p(5.0, 2.0), p(2.0, 88.0), p(98.0, 4.0)]);
        assert_eq!(ordered[0], p(5.0, 2.0));
        assert_eq!(ordered[1], p(98.0, 4.0));
        assert_eq!(ordered[2], p(2.0, 88.0));
        assert_eq!(ordered[3], p(95.0, 90.0));

        let (w, h) = rectified_size(&ordered);
        assert!(w >= 93);
        assert!(h >= 86);
    }
}
