use crate::geom::{BBox, Point3};
use crate::geom::bvh::Bvh;

fn unit_box_at(x: f64) -> BBox {
    BBox::new(Point3::new(x, 0.0, 0.0), Point3::new(x + 1.0, 1.0, 1.0))
}

#[test]
fn bvh_rejects_empty_and_non_finite_input() {
    assert!(Bvh::build(&[]).is_none());
    let bad = BBox::from_point(Point3::new(f64::NAN, 0.0, 0.0));
    assert!(Bvh::build(&[unit_box_at(0.0), bad]).is_none());
}

#[test]
fn bvh_nearest_finds_closest_primitive() {
    let bboxes = vec![unit_box_at(10.0), unit_box_at(1.0), unit_box_at(-5.0)];

    let bvh = Bvh::build_with_leaf_size(&bboxes, 1).expect("bvh build");
    assert_eq!(bvh.primitive_count(), 3);
    let point = Point3::new(0.0, 0.5, 0.5);

    let (idx, dist2) = bvh
        .nearest(point, f64::INFINITY, |prim_idx| {
            Some(bboxes[prim_idx].distance_squared_to_point(point))
        })
        .expect("nearest hit");

    assert_eq!(idx, 1);
    assert!((dist2 - 1.0).abs() < 1e-12);
}

#[test]
fn bvh_nearest_respects_initial_bound() {
    let bboxes = vec![unit_box_at(3.0), unit_box_at(6.0)];
    let bvh = Bvh::build(&bboxes).expect("bvh build");
    let point = Point3::new(0.0, 0.5, 0.5);

    let hit = bvh.nearest(point, 4.0, |i| Some(bboxes[i].distance_squared_to_point(point)));
    assert!(hit.is_none());

    let hit = bvh.nearest(point, 9.5, |i| Some(bboxes[i].distance_squared_to_point(point)));
    assert_eq!(hit.map(|(i, _)| i), Some(0));
}

#[test]
fn bvh_nearest_ties_resolve_to_lowest_index() {
    // Many identical boxes so leaves split the duplicates across nodes.
    let bboxes: Vec<BBox> = (0..40).map(|_| unit_box_at(2.0)).collect();
    let bvh = Bvh::build_with_leaf_size(&bboxes, 2).expect("bvh build");
    let point = Point3::new(0.0, 0.5, 0.5);

    let (idx, _) = bvh
        .nearest(point, f64::INFINITY, |i| Some(bboxes[i].distance_squared_to_point(point)))
        .expect("nearest hit");
    assert_eq!(idx, 0);
}

#[test]
fn bvh_nearest_skips_filtered_primitives() {
    let bboxes = vec![unit_box_at(1.0), unit_box_at(4.0)];
    let bvh = Bvh::build_with_leaf_size(&bboxes, 1).expect("bvh build");
    let point = Point3::new(0.0, 0.5, 0.5);

    let (idx, dist2) = bvh
        .nearest(point, f64::INFINITY, |i| {
            (i != 0).then(|| bboxes[i].distance_squared_to_point(point))
        })
        .expect("nearest hit");
    assert_eq!(idx, 1);
    assert!((dist2 - 16.0).abs() < 1e-12);
}
