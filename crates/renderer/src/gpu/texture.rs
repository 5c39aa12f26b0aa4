use std::path::Path;

use anyhow::{Context, Result};
use descriptor::DataArray;
use image::imageops::flip_vertical_in_place;
use image::GenericImageView;
use wgpu::util::{DeviceExt, TextureDataOrder};

pub(crate) const FLOAT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
pub(crate) const BYTE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const FLOAT_TEXEL_BYTES: u32 = 16;
const BYTE_TEXEL_BYTES: u32 = 4;

/// A 2D texture with the view and sampler it is bound with.
///
/// Every texture is stored bottom row first, so `texture2D(tex, uv)` in a
/// user shader sees images upright with `uv = (0, 0)` in the lower left.
pub(crate) struct Texture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    filterable: bool,
}

impl Texture {
    /// Ping-pong target. Sampled with nearest filtering so reading the
    /// previous frame at a pixel centre returns that pixel exactly.
    pub fn render_target(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        float: bool,
    ) -> Self {
        let format = if float { FLOAT_FORMAT } else { BYTE_FORMAT };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let sampler = nearest_sampler(device, wgpu::AddressMode::ClampToEdge);
        Self::from_parts(texture, sampler, width, height, format, false)
    }

    /// RGBA8 target the output shader draws into when exporting a PNG.
    pub fn export_target(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("export target"),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: BYTE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let sampler = nearest_sampler(device, wgpu::AddressMode::ClampToEdge);
        Self::from_parts(texture, sampler, width, height, BYTE_FORMAT, false)
    }

    /// Loads an image file; alpha is forced to opaque and rows are flipped.
    pub fn from_image_file(device: &wgpu::Device, queue: &wgpu::Queue, path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("failed to open texture at {}", path.display()))?;
        let (width, height) = image.dimensions();
        let mut rgba = image.to_rgba8();
        for pixel in rgba.pixels_mut() {
            pixel.0[3] = u8::MAX;
        }
        flip_vertical_in_place(&mut rgba);

        let label = format!("image texture {}", path.display());
        let texture = device.create_texture_with_data(
            queue,
            &sampled_descriptor(&label, width, height, BYTE_FORMAT),
            TextureDataOrder::LayerMajor,
            &rgba,
        );
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        tracing::debug!(path = %path.display(), width, height, "loaded image texture");
        Ok(Self::from_parts(texture, sampler, width, height, BYTE_FORMAT, true))
    }

    /// Float texture holding inline descriptor data; the first listed row
    /// ends up at the top of the texture.
    pub fn from_data(device: &wgpu::Device, queue: &wgpu::Queue, label: &str, data: &DataArray) -> Self {
        let texels = flip_rows(&data.texels, data.width as usize);
        let texture = device.create_texture_with_data(
            queue,
            &sampled_descriptor(label, data.width, data.height, FLOAT_FORMAT),
            TextureDataOrder::LayerMajor,
            bytemuck::cast_slice(&texels),
        );
        let sampler = nearest_sampler(device, wgpu::AddressMode::ClampToEdge);
        Self::from_parts(texture, sampler, data.width, data.height, FLOAT_FORMAT, false)
    }

    /// Float texture of `width` x 1 texels refreshed through [`Texture::update`].
    pub fn random(device: &wgpu::Device, queue: &wgpu::Queue, label: &str, width: u32) -> Self {
        let zeros = vec![[0.0f32; 4]; width as usize];
        let texture = device.create_texture_with_data(
            queue,
            &sampled_descriptor(label, width, 1, FLOAT_FORMAT),
            TextureDataOrder::LayerMajor,
            bytemuck::cast_slice(&zeros),
        );
        let sampler = nearest_sampler(device, wgpu::AddressMode::ClampToEdge);
        Self::from_parts(texture, sampler, width, 1, FLOAT_FORMAT, false)
    }

    /// Bound to samplers the descriptor leaves unmapped.
    pub fn placeholder(device: &wgpu::Device, queue: &wgpu::Queue, label: &str) -> Self {
        let texture = device.create_texture_with_data(
            queue,
            &sampled_descriptor(label, 1, 1, BYTE_FORMAT),
            TextureDataOrder::LayerMajor,
            &[0u8, 0, 0, 255],
        );
        let sampler = nearest_sampler(device, wgpu::AddressMode::ClampToEdge);
        Self::from_parts(texture, sampler, 1, 1, BYTE_FORMAT, true)
    }

    fn from_parts(
        texture: wgpu::Texture,
        sampler: wgpu::Sampler,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        filterable: bool,
    ) -> Self {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            sampler,
            width,
            height,
            format,
            filterable,
        }
    }

    /// Replaces the contents of a float texture, rows bottom first.
    pub fn update(&self, queue: &wgpu::Queue, texels: &[[f32; 4]]) {
        let expected = (self.width * self.height) as usize;
        if self.format != FLOAT_FORMAT || texels.len() != expected {
            tracing::warn!(
                expected,
                actual = texels.len(),
                format = ?self.format,
                "texture update ignored due to mismatched payload"
            );
            return;
        }
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(texels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.width * FLOAT_TEXEL_BYTES),
                rows_per_image: Some(self.height),
            },
            extent(self.width, self.height),
        );
    }

    pub fn is_float(&self) -> bool {
        self.format == FLOAT_FORMAT
    }

    pub fn bytes_per_texel(&self) -> u32 {
        if self.is_float() {
            FLOAT_TEXEL_BYTES
        } else {
            BYTE_TEXEL_BYTES
        }
    }

    pub fn layout_entries(binding: u32, filterable: bool) -> [wgpu::BindGroupLayoutEntry; 2] {
        let sampler_type = if filterable {
            wgpu::SamplerBindingType::Filtering
        } else {
            wgpu::SamplerBindingType::NonFiltering
        };
        [
            wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: binding + 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(sampler_type),
                count: None,
            },
        ]
    }

    pub fn is_filterable(&self) -> bool {
        self.filterable
    }

    pub fn bind_entries(&self, binding: u32) -> [wgpu::BindGroupEntry<'_>; 2] {
        [
            wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::TextureView(&self.view),
            },
            wgpu::BindGroupEntry {
                binding: binding + 1,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ]
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn sampled_descriptor<'a>(
    label: &'a str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
) -> wgpu::TextureDescriptor<'a> {
    wgpu::TextureDescriptor {
        label: Some(label),
        size: extent(width, height),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    }
}

fn nearest_sampler(device: &wgpu::Device, address_mode: wgpu::AddressMode) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Nearest,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

/// Reverses row order of a tightly packed `width`-wide texel grid.
pub(crate) fn flip_rows<T: Copy>(texels: &[T], width: usize) -> Vec<T> {
    if width == 0 {
        return texels.to_vec();
    }
    texels
        .chunks(width)
        .rev()
        .flat_map(|row| row.iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_rows_reverses_row_order_only() {
        let texels = [1, 2, 3, 4, 5, 6];
        assert_eq!(flip_rows(&texels, 3), vec![4, 5, 6, 1, 2, 3]);
        assert_eq!(flip_rows(&texels, 6), texels.to_vec());
        assert_eq!(flip_rows(&texels, 2), vec![5, 6, 3, 4, 1, 2]);
    }

    #[test]
    fn layout_entries_match_filterability() {
        let [texture, sampler] = Texture::layout_entries(4, false);
        assert_eq!(texture.binding, 4);
        assert_eq!(sampler.binding, 5);
        assert!(matches!(
            texture.ty,
            wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                ..
            }
        ));
        assert!(matches!(
            sampler.ty,
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering)
        ));
    }
}
