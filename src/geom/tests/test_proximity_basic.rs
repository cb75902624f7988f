use crate::geom::{Point3, SurfaceIndex, VertexIndex, closest_point_on_triangle};

fn grid(n: usize) -> Vec<Point3> {
    let mut points = Vec::new();
    for j in 0..n {
        for i in 0..n {
            points.push(Point3::new(i as f64, j as f64, 0.0));
        }
    }
    points
}

#[test]
fn vertex_index_matches_brute_force() {
    let points = grid(7);
    let index = VertexIndex::build(&points).expect("index");
    assert_eq!(index.len(), 49);

    for query in [
        Point3::new(2.2, 3.9, 0.4),
        Point3::new(-3.0, 10.0, 1.0),
        Point3::new(5.49, 0.51, -2.0),
    ] {
        let hit = index.nearest(query).expect("hit");
        let brute = points
            .iter()
            .map(|p| p.distance_squared_to(query))
            .fold(f64::INFINITY, f64::min);
        assert!((hit.distance * hit.distance - brute).abs() < 1e-9);
        assert_eq!(hit.location, points[hit.index]);
    }
}

#[test]
fn vertex_index_tie_picks_lowest_index() {
    let points = vec![
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(-1.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
    ];
    let index = VertexIndex::build(&points).expect("index");
    let hit = index.nearest(Point3::new(0.0, 0.0, 0.0)).expect("hit");
    assert_eq!(hit.index, 0);
    assert!((hit.distance - 1.0).abs() < 1e-12);
}

#[test]
fn vertex_index_empty_is_none() {
    assert!(VertexIndex::build(&[]).is_none());
}

#[test]
fn surface_index_fans_quads_and_skips_bad_faces() {
    let points = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(2.0, 0.0, 0.0),
        Point3::new(2.0, 2.0, 0.0),
        Point3::new(0.0, 2.0, 0.0),
    ];
    let faces = vec![vec![0, 1, 2, 3], vec![0, 1], vec![0, 1, 9]];
    let index = SurfaceIndex::build(&points, &faces).expect("index");
    assert_eq!(index.triangle_count(), 2);

    let hit = index.nearest(Point3::new(0.5, 1.5, 3.0)).expect("hit");
    assert!((hit.distance - 3.0).abs() < 1e-12);
    assert!(hit.location.distance_squared_to(Point3::new(0.5, 1.5, 0.0)) < 1e-18);
}

#[test]
fn surface_index_without_triangles_is_none() {
    let points = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)];
    assert!(SurfaceIndex::build(&points, &[vec![0, 1, 2]]).is_none());
    assert!(SurfaceIndex::build(&points, &[]).is_none());
}

#[test]
fn closest_point_covers_vertex_edge_and_interior_regions() {
    let a = Point3::new(0.0, 0.0, 0.0);
    let b = Point3::new(1.0, 0.0, 0.0);
    let c = Point3::new(0.0, 1.0, 0.0);

    assert_eq!(closest_point_on_triangle(Point3::new(-1.0, -1.0, 0.0), a, b, c), a);
    assert_eq!(closest_point_on_triangle(Point3::new(3.0, -0.5, 0.0), a, b, c), b);

    let on_edge = closest_point_on_triangle(Point3::new(0.5, -2.0, 1.0), a, b, c);
    assert!(on_edge.distance_squared_to(Point3::new(0.5, 0.0, 0.0)) < 1e-18);

    let hyp = closest_point_on_triangle(Point3::new(1.0, 1.0, 0.0), a, b, c);
    assert!(hyp.distance_squared_to(Point3::new(0.5, 0.5, 0.0)) < 1e-18);

    let inside = closest_point_on_triangle(Point3::new(0.2, 0.3, -4.0), a, b, c);
    assert!(inside.distance_squared_to(Point3::new(0.2, 0.3, 0.0)) < 1e-18);
}
