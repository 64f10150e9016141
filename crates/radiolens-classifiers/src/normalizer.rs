//! Radiograph normalization: decode, CLAHE on lightness, stretch, scale
//!
//! Order matters. Contrast enhancement runs on the full-resolution lightness
//! plane before resampling, and resizing always stretches to the target
//! resolution without preserving the aspect ratio.

use crate::clahe::Clahe;
use crate::color::LabImage;
use crate::config::PreprocessingConfig;
use image::{ImageFormat, RgbImage};
use radiolens_core::{Error, ImageIdentity, Result};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Channels in every normalized tensor
pub const CHANNELS: usize = 3;

/// Where the image bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Image file on the local file system
    Path(PathBuf),

    /// Encoded image already in memory
    Bytes(Vec<u8>),
}

impl ImageSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(bytes.into())
    }

    /// Identity derived from the source, available for path sources only
    pub fn default_identity(&self) -> Option<ImageIdentity> {
        match self {
            Self::Path(path) => Some(ImageIdentity::from_path(path)),
            Self::Bytes(_) => None,
        }
    }

    /// Human-readable description for error messages
    pub fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Bytes(bytes) => format!("<{} bytes in memory>", bytes.len()),
        }
    }

    fn read(&self, max_bytes: u64) -> Result<Cow<'_, [u8]>> {
        match self {
            Self::Path(path) => read_limited(path, max_bytes).map(Cow::Owned),
            Self::Bytes(bytes) => {
                check_size(bytes.len() as u64, max_bytes, &self.describe())?;
                Ok(Cow::Borrowed(bytes.as_slice()))
            }
        }
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

fn read_limited(path: &Path, max_bytes: u64) -> Result<Vec<u8>> {
    let unreadable = |e: std::io::Error| {
        Error::decode(format!("could not read image from {}: {e}", path.display()))
    };

    let len = std::fs::metadata(path).map_err(unreadable)?.len();
    check_size(len, max_bytes, &path.display().to_string())?;
    std::fs::read(path).map_err(unreadable)
}

fn check_size(len: u64, max_bytes: u64, what: &str) -> Result<()> {
    if len == 0 {
        return Err(Error::decode(format!("image source {what} is empty")));
    }
    if len > max_bytes {
        return Err(Error::decode(format!(
            "image source {what} is {len} bytes, limit is {max_bytes}"
        )));
    }
    Ok(())
}

/// Fixed-shape `H x W x 3` tensor with every value in `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
    data: Vec<f32>,
    height: usize,
    width: usize,
    source_format: Option<ImageFormat>,
}

impl NormalizedTensor {
    /// Wrap row-major HWC data, checking shape and value range
    pub fn from_hwc(data: Vec<f32>, height: usize, width: usize) -> Result<Self> {
        if data.len() != height * width * CHANNELS {
            return Err(Error::internal(format!(
                "tensor data has {} values, shape {height}x{width}x{CHANNELS} needs {}",
                data.len(),
                height * width * CHANNELS
            )));
        }
        if let Some(v) = data.iter().find(|v| !(0.0..=1.0).contains(*v)) {
            return Err(Error::internal(format!("tensor value {v} outside [0, 1]")));
        }
        Ok(Self {
            data,
            height,
            width,
            source_format: None,
        })
    }

    fn from_rgb(image: &RgbImage) -> Self {
        Self {
            data: image.as_raw().iter().map(|&v| f32::from(v) / 255.0).collect(),
            height: image.height() as usize,
            width: image.width() as usize,
            source_format: None,
        }
    }

    /// `[height, width, channels]`
    pub fn shape(&self) -> [usize; 3] {
        [self.height, self.width, CHANNELS]
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Row-major HWC values
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    pub fn get(&self, y: usize, x: usize, channel: usize) -> Option<f32> {
        if y >= self.height || x >= self.width || channel >= CHANNELS {
            return None;
        }
        self.data.get((y * self.width + x) * CHANNELS + channel).copied()
    }

    /// Container format detected while decoding, if any
    pub fn source_format(&self) -> Option<ImageFormat> {
        self.source_format
    }
}

/// Turns raw radiographs into classifier input tensors
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    config: PreprocessingConfig,
    clahe: Clahe,
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        let config = PreprocessingConfig::default();
        let clahe = Clahe::new(config.clip_limit, (config.tile_grid[0], config.tile_grid[1]));
        Self { config, clahe }
    }
}

impl ImageNormalizer {
    pub fn new(config: PreprocessingConfig) -> Result<Self> {
        config.validate()?;
        let clahe = Clahe::new(config.clip_limit, (config.tile_grid[0], config.tile_grid[1]));
        Ok(Self { config, clahe })
    }

    pub fn config(&self) -> &PreprocessingConfig {
        &self.config
    }

    /// Shape of every tensor this normalizer produces
    pub fn output_shape(&self) -> [usize; 3] {
        [
            self.config.target_height as usize,
            self.config.target_width as usize,
            CHANNELS,
        ]
    }

    /// Normalize an image from any source
    pub fn normalize(&self, source: &ImageSource) -> Result<NormalizedTensor> {
        let bytes = source.read(self.config.max_image_bytes)?;
        self.normalize_bytes(&bytes).map_err(|e| match e {
            Error::Decode(msg) => Error::decode(format!("{}: {msg}", source.describe())),
            other => other,
        })
    }

    /// Normalize an encoded image held in memory
    pub fn normalize_bytes(&self, bytes: &[u8]) -> Result<NormalizedTensor> {
        let (rgb, format) = self.decode(bytes)?;
        let enhanced = self.enhance_contrast(&rgb);
        let resized = self.resize(&enhanced);

        let mut tensor = NormalizedTensor::from_rgb(&resized);
        tensor.source_format = format;
        Ok(tensor)
    }

    /// Decode to a three-channel raster of at least 1x1 pixel
    pub fn decode(&self, bytes: &[u8]) -> Result<(RgbImage, Option<ImageFormat>)> {
        let format = image::guess_format(bytes).ok();
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| Error::decode(format!("not a decodable image: {e}")))?;

        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(Error::decode("image has no pixels"));
        }

        debug!(
            format = ?format,
            width = decoded.width(),
            height = decoded.height(),
            "decoded image"
        );
        Ok((decoded.to_rgb8(), format))
    }

    /// CLAHE on the lightness channel only; chroma passes through unchanged
    pub fn enhance_contrast(&self, image: &RgbImage) -> RgbImage {
        let mut lab = LabImage::from_rgb(image);
        let enhanced = self.clahe.apply(
            lab.lightness(),
            lab.width() as usize,
            lab.height() as usize,
        );
        lab.set_lightness(enhanced);
        lab.to_rgb()
    }

    /// Stretch to the target resolution
    pub fn resize(&self, image: &RgbImage) -> RgbImage {
        let (w, h) = (self.config.target_width, self.config.target_height);
        if image.dimensions() == (w, h) {
            return image.clone();
        }
        image::imageops::resize(image, w, h, self.config.resize_filter.to_filter_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::io::Cursor;

    fn encode(image: &RgbImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let v = (60 + (x + y) % 40) as u8;
            Rgb([v, v, v])
        })
    }

    #[test]
    fn test_output_shape_and_range() {
        let normalizer = ImageNormalizer::default();
        let bytes = encode(&gradient(300, 180), ImageFormat::Png);
        let tensor = normalizer.normalize_bytes(&bytes).unwrap();

        assert_eq!(tensor.shape(), [224, 224, 3]);
        assert_eq!(tensor.shape(), normalizer.output_shape());
        assert_eq!(tensor.data().len(), 224 * 224 * 3);
        assert!(tensor.data().iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(tensor.source_format(), Some(ImageFormat::Png));
    }

    #[test]
    fn test_single_pixel_image() {
        let normalizer = ImageNormalizer::default();
        let bytes = encode(&RgbImage::from_pixel(1, 1, Rgb([10, 200, 30])), ImageFormat::Bmp);
        let tensor = normalizer.normalize_bytes(&bytes).unwrap();
        assert_eq!(tensor.shape(), [224, 224, 3]);
        assert_eq!(tensor.source_format(), Some(ImageFormat::Bmp));
    }

    #[test]
    fn test_stretch_to_fit_ignores_aspect_ratio() {
        let config = PreprocessingConfig {
            target_width: 32,
            target_height: 16,
            ..Default::default()
        };
        let normalizer = ImageNormalizer::new(config).unwrap();
        let tall = encode(&gradient(10, 90), ImageFormat::Png);
        let tensor = normalizer.normalize_bytes(&tall).unwrap();
        assert_eq!(tensor.shape(), [16, 32, 3]);
    }

    #[test]
    fn test_non_image_bytes_fail_with_decode_error() {
        let normalizer = ImageNormalizer::default();
        let err = normalizer
            .normalize_bytes(b"Patient notes: no imaging attached.")
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "{err}");

        let err = normalizer
            .normalize(&ImageSource::bytes(Vec::new()))
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_missing_file_is_decode_error() {
        let normalizer = ImageNormalizer::default();
        let err = normalizer
            .normalize(&ImageSource::path("/nonexistent/xray.png"))
            .unwrap_err();
        assert_eq!(err.kind(), "decode_error");
        assert!(err.to_string().contains("/nonexistent/xray.png"));
    }

    #[test]
    fn test_oversized_source_rejected() {
        let config = PreprocessingConfig {
            max_image_bytes: 16,
            ..Default::default()
        };
        let normalizer = ImageNormalizer::new(config).unwrap();
        let bytes = encode(&gradient(8, 8), ImageFormat::Png);
        let err = normalizer.normalize(&ImageSource::bytes(bytes)).unwrap_err();
        assert!(err.to_string().contains("limit is 16"));
    }

    #[test]
    fn test_grayscale_input_becomes_three_channels() {
        let gray = image::GrayImage::from_fn(40, 40, |x, _| image::Luma([(x * 5) as u8]));
        let mut buf = Cursor::new(Vec::new());
        gray.write_to(&mut buf, ImageFormat::Png).unwrap();

        let tensor = ImageNormalizer::default()
            .normalize_bytes(&buf.into_inner())
            .unwrap();
        assert_eq!(tensor.shape()[2], 3);
        let (r, g, b) = (
            tensor.get(100, 100, 0).unwrap(),
            tensor.get(100, 100, 1).unwrap(),
            tensor.get(100, 100, 2).unwrap(),
        );
        assert!((r - g).abs() < 0.02 && (g - b).abs() < 0.02);
    }

    #[test]
    fn test_contrast_enhancement_widens_range() {
        let normalizer = ImageNormalizer::default();
        let flat = gradient(128, 128);
        let enhanced = normalizer.enhance_contrast(&flat);

        let spread = |img: &RgbImage| {
            let lo = img.pixels().map(|p| p[0]).min().unwrap();
            let hi = img.pixels().map(|p| p[0]).max().unwrap();
            hi - lo
        };
        assert!(spread(&enhanced) > spread(&flat));
    }

    #[test]
    fn test_from_hwc_validates() {
        assert!(NormalizedTensor::from_hwc(vec![0.5; 12], 2, 2).is_ok());
        assert!(NormalizedTensor::from_hwc(vec![0.5; 11], 2, 2).is_err());
        assert!(NormalizedTensor::from_hwc(vec![1.5; 12], 2, 2).is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PreprocessingConfig {
            tile_grid: [0, 8],
            ..Default::default()
        };
        assert!(ImageNormalizer::new(config).is_err());
    }
}
