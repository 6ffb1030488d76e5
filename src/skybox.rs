use std::path::Path;

use anyhow::{anyhow, Context, Result};
use log::warn;

/// Face file names in cube-map layer order: +X, -X, +Y, -Y, +Z, -Z.
pub const FACE_FILES: [&str; 6] = [
    "right.tga",
    "left.tga",
    "top.tga",
    "bottom.tga",
    "back.tga",
    "front.tga",
];

/// Edge length of the generated fallback faces.
const GRADIENT_SIZE: u32 = 64;
const ZENITH: [u8; 3] = [70, 120, 190];
const HORIZON: [u8; 3] = [200, 215, 230];
const GROUND: [u8; 3] = [90, 90, 95];

/// Six square RGBA8 faces of a cube map.
#[derive(Debug, Clone, PartialEq)]
pub struct SkyboxImages {
    pub size: u32,
    /// One RGBA8 buffer per face, `size * size * 4` bytes each.
    pub faces: [Vec<u8>; 6],
}

impl SkyboxImages {
    /// Decodes the six faces stored in `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut size = None;
        let mut faces: [Vec<u8>; 6] = Default::default();
        for (slot, name) in faces.iter_mut().zip(FACE_FILES) {
            let path = dir.join(name);
            let image = image::open(&path)
                .with_context(|| format!("failed to decode sky-box face {}", path.display()))?
                .to_rgba8();
            let (width, height) = image.dimensions();
            if width != height {
                return Err(anyhow!("sky-box face {} is not square ({width}x{height})", path.display()));
            }
            match size {
                None => size = Some(width),
                Some(expected) if expected != width => {
                    return Err(anyhow!(
                        "sky-box face {} is {width}px but earlier faces are {expected}px",
                        path.display()
                    ));
                }
                Some(_) => {}
            }
            *slot = image.into_raw();
        }
        Ok(Self {
            size: size.unwrap_or(1),
            faces,
        })
    }

    /// Loads the faces from `dir`, or generates a gradient sky when that fails.
    pub fn load_or_gradient(dir: impl AsRef<Path>) -> Self {
        match Self::load(dir) {
            Ok(images) => images,
            Err(err) => {
                warn!("{err:#}; using a generated sky");
                Self::gradient(GRADIENT_SIZE)
            }
        }
    }

    /// Vertical zenith-to-horizon gradient with a flat ground colour below.
    pub fn gradient(size: u32) -> Self {
        let size = size.max(1);
        let side = (0..size * size)
            .flat_map(|i| {
                let row = i / size;
                let t = row as f32 / (size - 1).max(1) as f32;
                let color = if t < 0.5 {
                    lerp(ZENITH, HORIZON, t * 2.0)
                } else {
                    lerp(HORIZON, GROUND, ((t - 0.5) * 4.0).min(1.0))
                };
                [color[0], color[1], color[2], 255]
            })
            .collect::<Vec<u8>>();
        let solid = |c: [u8; 3]| {
            (0..size * size)
                .flat_map(|_| [c[0], c[1], c[2], 255])
                .collect::<Vec<u8>>()
        };
        Self {
            size,
            faces: [
                side.clone(),
                side.clone(),
                solid(ZENITH),
                solid(GROUND),
                side.clone(),
                side,
            ],
        }
    }
}

fn lerp(a: [u8; 3], b: [u8; 3], t: f32) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0);
    [0, 1, 2].map(|i| (a[i] as f32 + (b[i] as f32 - a[i] as f32) * t).round() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_faces_have_full_size() {
        let sky = SkyboxImages::gradient(8);
        for face in &sky.faces {
            assert_eq!(face.len(), 8 * 8 * 4);
        }
        assert_eq!(&sky.faces[2][..4], &[ZENITH[0], ZENITH[1], ZENITH[2], 255]);
    }

    #[test]
    fn missing_directory_falls_back_to_gradient() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SkyboxImages::load(dir.path()).is_err());
        let sky = SkyboxImages::load_or_gradient(dir.path());
        assert_eq!(sky.size, GRADIENT_SIZE);
    }

    #[test]
    fn loads_square_faces() {
        let dir = tempfile::tempdir().unwrap();
        for name in FACE_FILES {
            let face = image::RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 255]));
            face.save(dir.path().join(name)).unwrap();
        }
        let sky = SkyboxImages::load(dir.path()).unwrap();
        assert_eq!(sky.size, 4);
        assert_eq!(&sky.faces[5][..4], &[10, 20, 30, 255]);
    }
}
