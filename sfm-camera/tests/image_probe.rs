use nalgebra::Vector2;
use sfm_camera::distortion_function::NoDistortion;
use sfm_camera::{Camera, CameraError, StandardCamera, StandardCameraRadial};

#[test]
fn dimensions_come_from_the_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    image::RgbImage::new(40, 30).save(&path).unwrap();

    let camera = StandardCameraRadial::new(&path).unwrap();
    assert_eq!(camera.image().path(), path.as_path());
    assert_eq!((camera.image().width(), camera.image().height()), (40, 30));
    assert_eq!(camera.principal_point(), Vector2::new(19.5, 14.5));
    assert_eq!(camera.num_params(), 9);
    assert!(camera.features().is_empty());
}

#[test]
fn missing_image_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.jpg");
    match StandardCamera::<NoDistortion>::new(&path) {
        Err(CameraError::Image { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected an image error, got {:?}", other),
    }
}
