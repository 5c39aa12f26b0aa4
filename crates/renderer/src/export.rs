//! Writers for the final frame.
//!
//! The raw array keeps the full float precision of the render target and is
//! written as a NumPy v1.0 `.npy` file of shape `(height, width, 3)`. The
//! PNG holds whatever the output shader produced.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use image::RgbImage;

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
const NPY_ALIGN: usize = 64;
/// Magic, two version bytes and the u16 header length.
const NPY_PREAMBLE: usize = 10;

/// Pixel data read back from a render target, rows bottom first.
pub(crate) enum FramePixels {
    Float(Vec<f32>),
    Byte(Vec<u8>),
}

/// Converts RGBA texels stored bottom row first into RGB floats listed top
/// row first, the orientation images are viewed in.
pub(crate) fn rgb_rows_top_down(pixels: &FramePixels, width: usize, height: usize) -> Vec<f32> {
    let texel = |index: usize| -> [f32; 3] {
        match pixels {
            FramePixels::Float(values) => {
                let base = index * 4;
                [values[base], values[base + 1], values[base + 2]]
            }
            FramePixels::Byte(values) => {
                let base = index * 4;
                [
                    f32::from(values[base]) / 255.0,
                    f32::from(values[base + 1]) / 255.0,
                    f32::from(values[base + 2]) / 255.0,
                ]
            }
        }
    };

    let mut rgb = Vec::with_capacity(width * height * 3);
    for row in (0..height).rev() {
        for column in 0..width {
            rgb.extend_from_slice(&texel(row * width + column));
        }
    }
    rgb
}

pub(crate) fn npy_header(shape: &[usize]) -> Vec<u8> {
    let dims: Vec<String> = shape.iter().map(usize::to_string).collect();
    let shape = if dims.len() == 1 {
        format!("({},)", dims[0])
    } else {
        format!("({})", dims.join(", "))
    };
    let mut dict = format!("{{'descr': '<f4', 'fortran_order': False, 'shape': {shape}, }}");
    let unpadded = NPY_PREAMBLE + dict.len() + 1;
    let padding = (NPY_ALIGN - unpadded % NPY_ALIGN) % NPY_ALIGN;
    dict.push_str(&" ".repeat(padding));
    dict.push('\n');

    let mut header = Vec::with_capacity(NPY_PREAMBLE + dict.len());
    header.extend_from_slice(NPY_MAGIC);
    header.extend_from_slice(&[1, 0]);
    header.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    header.extend_from_slice(dict.as_bytes());
    header
}

pub fn write_npy(path: &Path, width: usize, height: usize, rgb: &[f32]) -> Result<()> {
    let expected = width * height * 3;
    if rgb.len() != expected {
        anyhow::bail!(
            "raw output expects {expected} floats for {width}x{height}x3, got {}",
            rgb.len()
        );
    }
    let file = File::create(path)
        .with_context(|| format!("failed to create raw output {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&npy_header(&[height, width, 3]))?;
    for value in rgb {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to write raw output {}", path.display()))?;
    tracing::info!(path = %path.display(), width, height, "saved raw float output");
    Ok(())
}

/// Saves RGBA8 rows (top row first) as an RGB PNG.
pub fn write_png(path: &Path, width: u32, height: u32, rgba: &[u8]) -> Result<()> {
    let rgb: Vec<u8> = rgba
        .chunks_exact(4)
        .flat_map(|pixel| [pixel[0], pixel[1], pixel[2]])
        .collect();
    let image = RgbImage::from_raw(width, height, rgb).with_context(|| {
        format!("pixel buffer does not match {width}x{height} for {}", path.display())
    })?;
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write PNG to {}", path.display()))?;
    tracing::info!(path = %path.display(), width, height, "saved PNG output");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn npy_header_is_aligned_and_describes_shape() {
        let header = npy_header(&[2, 3, 3]);
        assert_eq!(header.len() % NPY_ALIGN, 0);
        assert_eq!(&header[..6], NPY_MAGIC);
        assert_eq!(&header[6..8], &[1, 0]);
        let dict_len = u16::from_le_bytes([header[8], header[9]]) as usize;
        assert_eq!(dict_len + NPY_PREAMBLE, header.len());
        let dict = std::str::from_utf8(&header[NPY_PREAMBLE..]).unwrap();
        assert!(dict.starts_with("{'descr': '<f4', 'fortran_order': False, 'shape': (2, 3, 3), }"));
        assert!(dict.ends_with('\n'));
    }

    #[test]
    fn single_dimension_shapes_keep_trailing_comma() {
        let header = npy_header(&[5]);
        let dict = std::str::from_utf8(&header[NPY_PREAMBLE..]).unwrap();
        assert!(dict.contains("'shape': (5,)"));
    }

    #[test]
    fn rows_are_flipped_and_alpha_dropped() {
        // 1x2 texture: bottom texel red, top texel green.
        let pixels = FramePixels::Float(vec![1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
        assert_eq!(
            rgb_rows_top_down(&pixels, 1, 2),
            vec![0.0, 1.0, 0.0, 1.0, 0.0, 0.0]
        );

        let bytes = FramePixels::Byte(vec![255, 0, 0, 255, 0, 51, 0, 255]);
        assert_eq!(
            rgb_rows_top_down(&bytes, 1, 2),
            vec![0.0, 0.2, 0.0, 1.0, 0.0, 0.0]
        );
    }

    #[test]
    fn write_npy_produces_header_plus_payload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.npy");
        let rgb = vec![0.5f32; 2 * 2 * 3];
        write_npy(&path, 2, 2, &rgb).unwrap();
        let bytes = fs::read(&path).unwrap();
        let header_len = npy_header(&[2, 2, 3]).len();
        assert_eq!(bytes.len(), header_len + rgb.len() * 4);
        assert_eq!(&bytes[header_len..header_len + 4], &0.5f32.to_le_bytes());

        assert!(write_npy(&path, 3, 2, &rgb).is_err());
    }

    #[test]
    fn write_png_round_trips_through_image() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.png");
        let rgba = [255u8, 0, 0, 255, 0, 0, 255, 128];
        write_png(&path, 2, 1, &rgba).unwrap();
        let image = image::open(&path).unwrap().to_rgb8();
        assert_eq!(image.dimensions(), (2, 1));
        assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(image.get_pixel(1, 0).0, [0, 0, 255]);
    }
}
