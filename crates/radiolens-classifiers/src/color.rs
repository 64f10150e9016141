//! sRGB <-> CIE L*a*b* conversion (D65 white point)
//!
//! Lightness is quantized to the 8-bit range `L * 255 / 100` so it can be
//! histogram-equalized; the chroma planes stay in floating point and pass
//! through the contrast step untouched.

use image::{Rgb, RgbImage};

const WHITE_X: f32 = 0.950_456;
const WHITE_Z: f32 = 1.088_754;
const EPSILON: f32 = 0.008_856;
const KAPPA: f32 = 903.3;

/// Radiograph split into a quantized lightness plane and float chroma planes
#[derive(Debug, Clone)]
pub struct LabImage {
    width: u32,
    height: u32,
    lightness: Vec<u8>,
    a: Vec<f32>,
    b: Vec<f32>,
}

impl LabImage {
    pub fn from_rgb(image: &RgbImage) -> Self {
        let len = (image.width() * image.height()) as usize;
        let mut lightness = Vec::with_capacity(len);
        let mut a = Vec::with_capacity(len);
        let mut b = Vec::with_capacity(len);

        for pixel in image.pixels() {
            let (l, pa, pb) = rgb_to_lab(*pixel);
            lightness.push((l * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8);
            a.push(pa);
            b.push(pb);
        }

        Self {
            width: image.width(),
            height: image.height(),
            lightness,
            a,
            b,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major 8-bit lightness plane
    pub fn lightness(&self) -> &[u8] {
        &self.lightness
    }

    /// Replace the lightness plane, leaving chroma as is.
    ///
    /// A plane of the wrong length is ignored.
    pub fn set_lightness(&mut self, lightness: Vec<u8>) {
        if lightness.len() == self.lightness.len() {
            self.lightness = lightness;
        }
    }

    pub fn to_rgb(&self) -> RgbImage {
        let mut out = RgbImage::new(self.width, self.height);
        for (i, pixel) in out.pixels_mut().enumerate() {
            let l = f32::from(self.lightness[i]) * 100.0 / 255.0;
            *pixel = lab_to_rgb(l, self.a[i], self.b[i]);
        }
        out
    }
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn lab_f(t: f32) -> f32 {
    if t > EPSILON {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

fn lab_f_inv(f: f32) -> f32 {
    let cube = f * f * f;
    if cube > EPSILON {
        cube
    } else {
        (f - 16.0 / 116.0) / 7.787
    }
}

fn rgb_to_lab(pixel: Rgb<u8>) -> (f32, f32, f32) {
    let [r, g, b] = pixel.0.map(|c| srgb_to_linear(f32::from(c) / 255.0));

    let x = (0.412_453 * r + 0.357_580 * g + 0.180_423 * b) / WHITE_X;
    let y = 0.212_671 * r + 0.715_160 * g + 0.072_169 * b;
    let z = (0.019_334 * r + 0.119_193 * g + 0.950_227 * b) / WHITE_Z;

    let (fx, fy, fz) = (lab_f(x), lab_f(y), lab_f(z));
    let l = if y > EPSILON { 116.0 * fy - 16.0 } else { KAPPA * y };

    (l, 500.0 * (fx - fy), 200.0 * (fy - fz))
}

fn lab_to_rgb(l: f32, a: f32, b: f32) -> Rgb<u8> {
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;

    let x = lab_f_inv(fx) * WHITE_X;
    let y = if l > KAPPA * EPSILON {
        fy * fy * fy
    } else {
        l / KAPPA
    };
    let z = lab_f_inv(fz) * WHITE_Z;

    let r = 3.240_479 * x - 1.537_150 * y - 0.498_535 * z;
    let g = -0.969_256 * x + 1.875_992 * y + 0.041_556 * z;
    let bl = 0.055_648 * x - 0.204_043 * y + 1.057_311 * z;

    Rgb([r, g, bl].map(|c| {
        (linear_to_srgb(c.clamp(0.0, 1.0)) * 255.0)
            .round()
            .clamp(0.0, 255.0) as u8
    }))
}
