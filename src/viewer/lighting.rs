//! Equirect convention: texel `(u, v)` looks along azimuth `(u - 0.5) * 2π`
//! from +X towards +Z and polar angle `v * π` from +Y. The shaders in
//! `renderer` use the same mapping.

use std::f32::consts::PI;

use image::ImageFormat;
use nalgebra::Vector3;

const IRRADIANCE_SIZE: (usize, usize) = (128, 64);
const REFLECTION_SIZE: (usize, usize) = (128, 64);
const BACKGROUND_MAX_WIDTH: usize = 1024;
const REFLECTION_BLUR_PASSES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Direction *towards* the light.
    pub direction: Vector3<f32>,
    pub color: [f32; 3],
}

/// Ambient term plus key, fill and rim lights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightRig {
    pub ambient: [f32; 3],
    pub lights: [DirectionalLight; 3],
}

impl LightRig {
    pub fn three_point() -> Self {
        Self {
            ambient: [0.5, 0.5, 0.5],
            lights: [
                DirectionalLight {
                    direction: Vector3::new(1.0, 1.0, 1.0).normalize(),
                    color: [1.0, 1.0, 1.0],
                },
                DirectionalLight {
                    direction: Vector3::new(-1.0, 0.5, 0.5).normalize(),
                    color: [0.4, 0.4, 0.45],
                },
                DirectionalLight {
                    direction: Vector3::new(0.0, 0.8, -1.0).normalize(),
                    color: [0.5, 0.5, 0.5],
                },
            ],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("environment map is not a readable HDR image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("environment map is empty")]
    Empty,
}

/// 8-bit RGBA texture data, rows top (+Y) to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvTexture {
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<u8>,
}

/// Lighting resources derived from one environment map.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Irradiance SH coefficients, already multiplied by the cosine-lobe factors.
    pub irradiance: [[f32; 3]; 9],
    pub reflection: EnvTexture,
    pub background: EnvTexture,
}

/// HDR image in linear radiance.
struct Radiance {
    width: usize,
    height: usize,
    texels: Vec<[f32; 3]>,
}

impl Environment {
    /// Decodes a Radiance `.hdr` file and pre-filters it.
    pub fn from_hdr_bytes(bytes: &[u8]) -> Result<Self, EnvironmentError> {
        let image = image::load_from_memory_with_format(bytes, ImageFormat::Hdr)?.to_rgb32f();
        let (width, height) = (image.width() as usize, image.height() as usize);
        let texels = image.pixels().map(|p| p.0).collect();
        Self::from_texels(width, height, texels)
    }

    pub fn from_texels(width: usize, height: usize, texels: Vec<[f32; 3]>) -> Result<Self, EnvironmentError> {
        if width == 0 || height == 0 || texels.len() != width * height {
            return Err(EnvironmentError::Empty);
        }
        let source = Radiance {
            width,
            height,
            texels,
        };

        let small = source.downsample(IRRADIANCE_SIZE.0, IRRADIANCE_SIZE.1);
        let irradiance = small.irradiance_sh();

        let mut reflection = source.downsample(REFLECTION_SIZE.0, REFLECTION_SIZE.1);
        for _ in 0..REFLECTION_BLUR_PASSES {
            reflection.blur();
        }

        let bg_width = width.min(BACKGROUND_MAX_WIDTH);
        let bg_height = (bg_width / 2).max(1);
        let background = source.downsample(bg_width, bg_height);

        log::info!("environment map {width}x{height} pre-filtered");
        Ok(Self {
            irradiance,
            reflection: reflection.tonemapped(),
            background: background.tonemapped(),
        })
    }

    /// Diffuse irradiance arriving at a surface with unit normal `n`.
    pub fn irradiance(&self, n: &Vector3<f32>) -> [f32; 3] {
        let basis = sh_basis(n);
        let mut out = [0.0; 3];
        for (coeff, y) in self.irradiance.iter().zip(basis) {
            for c in 0..3 {
                out[c] += coeff[c] * y;
            }
        }
        out
    }

    /// Coefficients flattened for a `vec3[9]` uniform.
    pub fn irradiance_uniform(&self) -> [f32; 27] {
        let mut out = [0.0; 27];
        for (i, coeff) in self.irradiance.iter().enumerate() {
            out[i * 3..i * 3 + 3].copy_from_slice(coeff);
        }
        out
    }
}

/// What lights the currently displayed model.
#[derive(Debug, Clone)]
pub enum Lighting {
    Rig(LightRig),
    Image(std::sync::Arc<Environment>),
}

impl Default for Lighting {
    fn default() -> Self {
        Self::Rig(LightRig::three_point())
    }
}

/// Real SH basis up to band 2, evaluated at unit direction `n`.
fn sh_basis(n: &Vector3<f32>) -> [f32; 9] {
    let (x, y, z) = (n.x, n.y, n.z);
    [
        0.282_095,
        0.488_603 * y,
        0.488_603 * z,
        0.488_603 * x,
        1.092_548 * x * y,
        1.092_548 * y * z,
        0.315_392 * (3.0 * z * z - 1.0),
        1.092_548 * x * z,
        0.546_274 * (x * x - y * y),
    ]
}

/// Cosine-lobe convolution factor per coefficient (bands 0, 1, 1, 1, 2...).
const BAND_FACTORS: [f32; 9] = [
    PI,
    2.0 * PI / 3.0,
    2.0 * PI / 3.0,
    2.0 * PI / 3.0,
    PI / 4.0,
    PI / 4.0,
    PI / 4.0,
    PI / 4.0,
    PI / 4.0,
];

fn direction(u: f32, v: f32) -> Vector3<f32> {
    let azimuth = (u - 0.5) * 2.0 * PI;
    let polar = v * PI;
    let (sin_p, cos_p) = polar.sin_cos();
    Vector3::new(sin_p * azimuth.cos(), cos_p, sin_p * azimuth.sin())
}

impl Radiance {
    /// Box-filtered resize.
    fn downsample(&self, width: usize, height: usize) -> Self {
        let mut texels = Vec::with_capacity(width * height);
        for y in 0..height {
            let y0 = y * self.height / height;
            let y1 = ((y + 1) * self.height / height).max(y0 + 1);
            for x in 0..width {
                let x0 = x * self.width / width;
                let x1 = ((x + 1) * self.width / width).max(x0 + 1);
                let mut sum = [0.0f32; 3];
                for sy in y0..y1 {
                    for sx in x0..x1 {
                        let t = self.texels[sy * self.width + sx];
                        sum[0] += t[0];
                        sum[1] += t[1];
                        sum[2] += t[2];
                    }
                }
                let n = ((y1 - y0) * (x1 - x0)) as f32;
                texels.push([sum[0] / n, sum[1] / n, sum[2] / n]);
            }
        }
        Self {
            width,
            height,
            texels,
        }
    }

    /// One 3x3 box blur pass, wrapping horizontally.
    fn blur(&mut self) {
        let (w, h) = (self.width, self.height);
        let mut out = vec![[0.0f32; 3]; w * h];
        for y in 0..h {
            for x in 0..w {
                let mut sum = [0.0f32; 3];
                let mut n = 0.0;
                for dy in -1i64..=1 {
                    let sy = y as i64 + dy;
                    if sy < 0 || sy >= h as i64 {
                        continue;
                    }
                    for dx in -1i64..=1 {
                        let sx = (x as i64 + dx).rem_euclid(w as i64);
                        let t = self.texels[sy as usize * w + sx as usize];
                        sum[0] += t[0];
                        sum[1] += t[1];
                        sum[2] += t[2];
                        n += 1.0;
                    }
                }
                out[y * w + x] = [sum[0] / n, sum[1] / n, sum[2] / n];
            }
        }
        self.texels = out;
    }

    fn irradiance_sh(&self) -> [[f32; 3]; 9] {
        let mut coeffs = [[0.0f32; 3]; 9];
        let d_azimuth = 2.0 * PI / self.width as f32;
        let d_polar = PI / self.height as f32;
        for y in 0..self.height {
            let v = (y as f32 + 0.5) / self.height as f32;
            let solid_angle = d_azimuth * d_polar * (v * PI).sin();
            for x in 0..self.width {
                let u = (x as f32 + 0.5) / self.width as f32;
                let basis = sh_basis(&direction(u, v));
                let t = self.texels[y * self.width + x];
                for (coeff, b) in coeffs.iter_mut().zip(basis) {
                    let w = b * solid_angle;
                    coeff[0] += t[0] * w;
                    coeff[1] += t[1] * w;
                    coeff[2] += t[2] * w;
                }
            }
        }
        for (coeff, factor) in coeffs.iter_mut().zip(BAND_FACTORS) {
            for c in coeff.iter_mut() {
                *c *= factor;
            }
        }
        coeffs
    }

    /// Reinhard tone mapping plus display gamma, into RGBA8.
    fn tonemapped(&self) -> EnvTexture {
        let mut rgba = Vec::with_capacity(self.texels.len() * 4);
        for t in &self.texels {
            for c in t {
                let mapped = (c.max(0.0) / (1.0 + c.max(0.0))).powf(1.0 / 2.2);
                rgba.push((mapped * 255.0).round() as u8);
            }
            rgba.push(255);
        }
        EnvTexture {
            width: self.width,
            height: self.height,
            rgba,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn uniform(width: usize, height: usize, value: f32) -> Vec<[f32; 3]> {
        vec![[value; 3]; width * height]
    }

    #[test]
    fn uniform_sky_gives_pi_times_radiance() {
        let env = Environment::from_texels(64, 32, uniform(64, 32, 2.0)).unwrap();
        for n in [Vector3::x(), Vector3::y(), -Vector3::z(), Vector3::new(1.0, 1.0, 0.0).normalize()] {
            let e = env.irradiance(&n);
            assert_relative_eq!(e[0], 2.0 * PI, max_relative = 0.02);
            assert_relative_eq!(e[2], 2.0 * PI, max_relative = 0.02);
        }
    }

    #[test]
    fn bright_sky_lights_upward_faces_more() {
        let (w, h) = (64, 32);
        let texels = (0..w * h)
            .map(|i| if i / w < h / 2 { [4.0; 3] } else { [0.1; 3] })
            .collect();
        let env = Environment::from_texels(w, h, texels).unwrap();
        let up = env.irradiance(&Vector3::y())[1];
        let down = env.irradiance(&-Vector3::y())[1];
        assert!(up > 4.0 * down, "up {up} down {down}");
    }

    #[test]
    fn textures_have_expected_shapes() {
        let env = Environment::from_texels(256, 128, uniform(256, 128, 1.0)).unwrap();
        assert_eq!(env.reflection.width, REFLECTION_SIZE.0);
        assert_eq!(env.reflection.rgba.len(), REFLECTION_SIZE.0 * REFLECTION_SIZE.1 * 4);
        assert_eq!(env.background.width, 256);
        assert_eq!(env.background.height, 128);
        // radiance 1.0 maps to 0.5 before gamma
        let expected = (0.5f32.powf(1.0 / 2.2) * 255.0).round() as u8;
        assert_eq!(env.background.rgba[0], expected);
        assert_eq!(env.background.rgba[3], 255);
    }

    #[test]
    fn empty_or_mismatched_input_is_rejected() {
        assert!(matches!(Environment::from_texels(0, 0, vec![]), Err(EnvironmentError::Empty)));
        assert!(matches!(Environment::from_texels(4, 2, uniform(2, 2, 1.0)), Err(EnvironmentError::Empty)));
    }

    #[test]
    fn decodes_radiance_files() {
        let (w, h) = (32usize, 16usize);
        let pixels = vec![image::Rgb([1.5f32, 1.5, 1.5]); w * h];
        let mut bytes = Vec::new();
        image::codecs::hdr::HdrEncoder::new(&mut bytes)
            .encode(&pixels, w, h)
            .unwrap();

        let env = Environment::from_hdr_bytes(&bytes).unwrap();
        assert_relative_eq!(env.irradiance(&Vector3::y())[0], 1.5 * PI, max_relative = 0.05);
    }

    #[test]
    fn non_hdr_bytes_are_a_decode_error() {
        assert!(matches!(
            Environment::from_hdr_bytes(b"not an image"),
            Err(EnvironmentError::Decode(_))
        ));
    }

    #[test]
    fn uniform_layout_is_flat_rgb_triples() {
        let env = Environment::from_texels(8, 4, uniform(8, 4, 1.0)).unwrap();
        let flat = env.irradiance_uniform();
        assert_eq!(&flat[0..3], &env.irradiance[0]);
        assert_eq!(&flat[24..27], &env.irradiance[8]);
    }
}
