use maplit::hashmap;
use nalgebra::Point3;
use sfm_data::sfm_camera::{Camera, KeyPoint, StandardCameraRadial};
use sfm_data::{Dataset, Pair};

const CAM_A: usize = 0;
const CAM_B: usize = 1;
const CAM_C: usize = 2;
const CAM_D: usize = 3;

fn dataset() -> Dataset {
    let _ = pretty_env_logger::try_init();
    let mut dataset = Dataset::new("scene");
    for i in 0..4 {
        let mut cam = StandardCameraRadial::with_dimensions(format!("{}.png", i), 1024, 768);
        for k in 0..4 {
            cam.features_mut()
                .add_feature(KeyPoint::new(10.0 * k as f64, 5.0, 2.0, 0.0), &[k as f32; 4])
                .unwrap();
        }
        dataset.add_camera(Box::new(cam));
    }
    dataset.points_mut().matches_to_reconstruct_mut().extend([
        hashmap! {CAM_A => 1, CAM_B => 2, CAM_C => 3},
        hashmap! {CAM_A => 0, CAM_B => 0, CAM_C => 1, CAM_D => 2},
        hashmap! {CAM_B => 3, CAM_D => 3},
        hashmap! {CAM_A => 2, CAM_B => 1, CAM_D => 0},
    ]);
    dataset
}

#[test]
fn incremental_registration() {
    let mut dataset = dataset();

    dataset.mark_cam_as_reconstructed(CAM_A).unwrap();
    dataset.mark_cam_as_reconstructed(CAM_B).unwrap();
    dataset
        .points_mut()
        .add_points_from_matches(
            Pair::new(CAM_A, CAM_B),
            &[0, 1, 3],
            &[
                Point3::new(0.0, 0.0, 5.0),
                Point3::new(1.0, 0.0, 5.0),
                Point3::new(0.0, 1.0, 5.0),
            ],
        )
        .unwrap();

    let points = dataset.points();
    assert_eq!(points.num_pts(), 3);
    assert_eq!(
        points.tracks()[0].reconstructed_match(),
        hashmap! {CAM_A => 1, CAM_B => 2}
    );
    assert_eq!(points.tracks()[0].to_reconstruct_match(), hashmap! {CAM_C => 3});
    assert_eq!(
        points.matches_to_reconstruct(),
        &[hashmap! {CAM_B => 3, CAM_D => 3}]
    );

    // Register C against the points it sees, the second one is an outlier.
    let candidates = dataset.points().pending_in(CAM_C);
    assert_eq!(candidates, vec![0, 1]);
    dataset
        .mark_cam_as_reconstructed_with_inliers(CAM_C, &candidates, &[0])
        .unwrap();
    let tracks = dataset.points().tracks();
    assert!(tracks[0].is_reconstructed_in(CAM_C));
    assert_eq!(tracks[1].observation(CAM_C), None);
    assert!(tracks[1].is_pending_in(CAM_D));

    // Drop the first point, D is then registered unconditionally.
    dataset.points_mut().remove_points(&[false, true, true]).unwrap();
    assert_eq!(dataset.mark_cam_as_reconstructed(CAM_D), Ok(2));

    for track in dataset.points().tracks() {
        assert_eq!(track.to_reconstruct().count(), 0);
        for (cam, _) in track.reconstructed() {
            assert!(dataset.is_reconstructed(cam));
        }
    }
    assert_eq!(
        dataset.points().tracks()[0].reconstructed_match(),
        hashmap! {CAM_A => 0, CAM_B => 0, CAM_D => 2}
    );
    assert_eq!(dataset.points().coords()[1], Point3::new(0.0, 1.0, 5.0));
    assert_eq!(dataset.reconstructed_cams().len(), 4);
}
