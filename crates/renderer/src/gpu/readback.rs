use std::sync::mpsc;

use anyhow::{anyhow, Context, Result};

use super::texture::Texture;

/// Copies `texture` into host memory. Rows are returned in texture order
/// (row 0 first) without the 256-byte alignment padding.
pub(crate) fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &Texture,
) -> Result<Vec<u8>> {
    let tight_row = texture.width * texture.bytes_per_texel();
    let padded_row = padded_bytes_per_row(tight_row);
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback buffer"),
        size: u64::from(padded_row) * u64::from(texture.height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: &texture.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_row),
                rows_per_image: Some(texture.height),
            },
        },
        wgpu::Extent3d {
            width: texture.width,
            height: texture.height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = buffer.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device
        .poll(wgpu::PollType::Wait)
        .context("failed to wait for GPU readback")?;
    rx.recv()
        .map_err(|_| anyhow!("readback callback dropped before completion"))?
        .context("failed to map readback buffer")?;

    let data = slice.get_mapped_range();
    let pixels = copy_tight_rows(&data, padded_row as usize, tight_row as usize, texture.height as usize);
    drop(data);
    buffer.unmap();
    Ok(pixels)
}

pub(crate) fn padded_bytes_per_row(unpadded: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

pub(crate) fn copy_tight_rows(padded: &[u8], padded_row: usize, tight_row: usize, height: usize) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(tight_row * height);
    for row in padded.chunks(padded_row).take(height) {
        pixels.extend_from_slice(&row[..tight_row]);
    }
    pixels
}
