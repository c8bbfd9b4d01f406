//! Frame capture and export.

use std::path::{Path, PathBuf};
use std::sync::mpsc;

use crate::error::ExportError;

/// Receives a finished RGBA8 frame and writes it somewhere.
pub trait FrameExporter {
    fn export(&self, rgba: &[u8], width: u32, height: u32, path: &Path) -> Result<PathBuf, ExportError>;
}

/// Writes frames as PNG files, creating the parent directory as needed.
#[derive(Debug, Default, Clone, Copy)]
pub struct PngExporter;

impl FrameExporter for PngExporter {
    fn export(&self, rgba: &[u8], width: u32, height: u32, path: &Path) -> Result<PathBuf, ExportError> {
        if path.as_os_str().is_empty() {
            return Err(ExportError::EmptyPath);
        }
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(ExportError::BufferSize { width, height, expected, actual: rgba.len() });
        }
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| ExportError::Io { path: dir.to_path_buf(), source })?;
        }
        image::save_buffer(path, rgba, width, height, image::ExtendedColorType::Rgba8)?;
        tracing::info!("saved screenshot {:?} ({}x{})", path, width, height);
        Ok(path.to_path_buf())
    }
}

/// Row pitch of a texture-to-buffer copy.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Strip the per-row copy padding.
pub fn unpad_rows(data: &[u8], width: u32, height: u32, padded_row: u32) -> Vec<u8> {
    let row = width as usize * 4;
    let mut out = Vec::with_capacity(row * height as usize);
    for chunk in data.chunks(padded_row as usize).take(height as usize) {
        out.extend_from_slice(&chunk[..row.min(chunk.len())]);
    }
    out
}

/// Swap red and blue in place for BGRA surfaces.
pub fn bgra_to_rgba(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
}

fn is_bgra(format: wgpu::TextureFormat) -> bool {
    matches!(format, wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb)
}

/// Copy a rendered texture back to the CPU as tightly packed RGBA8.
pub fn capture_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    format: wgpu::TextureFormat,
) -> Result<(Vec<u8>, u32, u32), ExportError> {
    let width = texture.width();
    let height = texture.height();
    let padded_row = padded_bytes_per_row(width);

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("capture_buffer"),
        size: padded_row as u64 * height as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("capture_encoder") });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = buffer.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|e| ExportError::Map(e.to_string()))?;
    rx.recv()
        .map_err(|e| ExportError::Map(e.to_string()))?
        .map_err(|e| ExportError::Map(e.to_string()))?;

    let mut pixels = {
        let view = slice.get_mapped_range();
        unpad_rows(&view, width, height, padded_row)
    };
    buffer.unmap();

    if is_bgra(format) {
        bgra_to_rgba(&mut pixels);
    }
    Ok((pixels, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_padding() {
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(640), 2560);
    }

    #[test]
    fn test_unpad_and_swizzle() {
        let (width, height, padded) = (2u32, 2u32, 12u32);
        let data: Vec<u8> = vec![
            1, 2, 3, 4, 5, 6, 7, 8, 0, 0, 0, 0, //
            9, 10, 11, 12, 13, 14, 15, 16, 0, 0, 0, 0,
        ];
        let mut pixels = unpad_rows(&data, width, height, padded);
        assert_eq!(pixels, (1..=16).collect::<Vec<u8>>());
        bgra_to_rgba(&mut pixels);
        assert_eq!(&pixels[..8], &[3, 2, 1, 4, 7, 6, 5, 8]);
    }

    #[test]
    fn test_png_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shots").join("frame.png");
        let rgba = vec![255u8; 3 * 2 * 4];

        let saved = PngExporter.export(&rgba, 3, 2, &path).unwrap();
        assert_eq!(saved, path);
        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (3, 2));
    }

    #[test]
    fn test_export_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        assert!(matches!(
            PngExporter.export(&[0; 10], 3, 2, &path),
            Err(ExportError::BufferSize { expected: 24, actual: 10, .. })
        ));
        assert!(matches!(PngExporter.export(&[], 0, 0, Path::new("")), Err(ExportError::EmptyPath)));
    }
}
