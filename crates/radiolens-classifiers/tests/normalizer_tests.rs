//! Image normalizer integration tests against on-disk fixtures

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use proptest::prelude::*;
use radiolens_classifiers::{
    ImageNormalizer, ImageSource, PredictionBackend, RadiographPredictor, RadiolensConfig,
};
use radiolens_core::{PredictionReport, Provenance};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn chest_film(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let rib = if (y / 6) % 3 == 0 { 30 } else { 0 };
        let v = (70 + (x % 25) + rib) as u8;
        Rgb([v, v, v.saturating_add(4)])
    })
}

fn write_fixture(dir: &Path, name: &str, format: ImageFormat) -> PathBuf {
    let path = dir.join(name);
    DynamicImage::ImageRgb8(chest_film(120, 90))
        .save_with_format(&path, format)
        .unwrap();
    path
}

#[test]
fn test_common_formats_normalize_to_fixed_shape() {
    let dir = TempDir::new().unwrap();
    let normalizer = ImageNormalizer::default();

    for (name, format) in [
        ("film.png", ImageFormat::Png),
        ("film.jpg", ImageFormat::Jpeg),
        ("film.bmp", ImageFormat::Bmp),
        ("film.tiff", ImageFormat::Tiff),
    ] {
        let path = write_fixture(dir.path(), name, format);
        let tensor = normalizer.normalize(&ImageSource::path(&path)).unwrap();

        assert_eq!(tensor.shape(), [224, 224, 3], "{name}");
        assert!(tensor.data().iter().all(|v| (0.0..=1.0).contains(v)), "{name}");
        assert_eq!(tensor.source_format(), Some(format), "{name}");
    }
}

#[test]
fn test_text_file_renamed_jpg_is_decode_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("report.jpg");
    std::fs::write(&path, "Radiology report: no acute fracture identified.\n").unwrap();

    let predictor =
        RadiographPredictor::new(ImageNormalizer::default(), PredictionBackend::fallback());
    let outcome = predictor.predict_path(&path);
    let err = outcome.as_ref().unwrap_err();
    assert_eq!(err.kind(), "decode_error");

    let report = PredictionReport::from(outcome);
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error_kind"], "decode_error");
    assert!(json["error"].as_str().unwrap().contains("report.jpg"));
}

#[test]
fn test_empty_file_is_decode_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.png");
    std::fs::write(&path, b"").unwrap();

    let err = ImageNormalizer::default()
        .normalize(&ImageSource::path(&path))
        .unwrap_err();
    assert_eq!(err.kind(), "decode_error");
}

#[test]
fn test_path_identity_is_the_path_string() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(dir.path(), "patient_001.jpg", ImageFormat::Jpeg);

    let mut config = RadiolensConfig::default();
    config.model.enabled = false;
    let predictor = RadiographPredictor::from_config(&config).unwrap();

    let first = predictor.predict_path(&path).unwrap();
    let second = predictor.predict_path(&path).unwrap();
    assert_eq!(first.identity().as_str(), path.to_string_lossy());
    assert_eq!(first.provenance(), Provenance::Fallback);
    assert_eq!(first.predicted_class(), second.predicted_class());
    assert_eq!(first.confidence().to_bits(), second.confidence().to_bits());
}

#[test]
fn test_configured_resolution() {
    let yaml = "preprocessing:\n  \
                target_width: 64\n  \
                target_height: 48\n  \
                resize_filter: lanczos3\n";
    let config = RadiolensConfig::from_yaml(yaml).unwrap();
    let normalizer = ImageNormalizer::new(config.preprocessing).unwrap();

    let dir = TempDir::new().unwrap();
    let path = write_fixture(dir.path(), "film.png", ImageFormat::Png);
    let tensor = normalizer.normalize(&ImageSource::path(path)).unwrap();
    assert_eq!(tensor.shape(), [48, 64, 3]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn any_size_normalizes_to_target(width in 1u32..160, height in 1u32..160, seed in any::<u8>()) {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([seed.wrapping_add(x as u8), seed.wrapping_mul(3).wrapping_add(y as u8), seed])
        });
        let mut bytes = std::io::Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::Png).unwrap();

        let tensor = ImageNormalizer::default().normalize_bytes(&bytes.into_inner()).unwrap();
        prop_assert_eq!(tensor.shape(), [224, 224, 3]);
        prop_assert!(tensor.data().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        if let Err(err) = ImageNormalizer::default().normalize(&ImageSource::bytes(bytes)) {
            prop_assert_eq!(err.kind(), "decode_error");
        }
    }
}
