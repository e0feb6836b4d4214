// SPDX-License-Identifier: MIT
// CPU helpers built on fast_image_resize (SIMD-accelerated).
// Packed 8-bit 4-channel frames and single-channel masks, tightly packed rows.

use fast_image_resize as fir;
use fir::images::{Image, ImageRef};
use fir::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};

use crate::geometry::{Size, block_grid};

#[derive(Debug)]
pub enum ScaleError {
    BufferTooSmall { needed: usize, got: usize },
    EmptyImage,
    Fir(fir::ResizeError),
    ImageBuf(fir::ImageBufferError),
}

impl From<fir::ResizeError> for ScaleError { fn from(e: fir::ResizeError) -> Self { Self::Fir(e) } }
impl From<fir::ImageBufferError> for ScaleError { fn from(e: fir::ImageBufferError) -> Self { Self::ImageBuf(e) } }

impl std::fmt::Display for ScaleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleError::BufferTooSmall { needed, got } => {
                write!(f, "Buffer too small: need {} bytes, got {}", needed, got)
            }
            ScaleError::EmptyImage => write!(f, "Image has a zero dimension"),
            ScaleError::Fir(e) => write!(f, "Fast image resize error: {}", e),
            ScaleError::ImageBuf(e) => write!(f, "Image buffer error: {}", e),
        }
    }
}

impl std::error::Error for ScaleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScaleError::Fir(e) => Some(e),
            ScaleError::ImageBuf(e) => Some(e),
            _ => None,
        }
    }
}

/// Stretch a per-pixel confidence mask onto a frame of size `dst`.
///
/// Confidences are clamped to `0.0..=1.0` and quantized to `0..=255`, then
/// resized with nearest-neighbour sampling. Scale factors are independent per
/// axis, matching a model whose internal resolution has a different aspect
/// ratio than the camera.
pub fn scale_mask(
    resizer: &mut Resizer,
    mask: &[f32],
    src: Size,
    dst: Size,
) -> Result<Vec<u8>, ScaleError> {
    if src.is_empty() || dst.is_empty() {
        return Err(ScaleError::EmptyImage);
    }
    let n = src.pixel_count();
    if mask.len() < n {
        return Err(ScaleError::BufferTooSmall { needed: n, got: mask.len() });
    }

    let quantized: Vec<u8> = mask[..n]
        .iter()
        .map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();

    if src == dst {
        return Ok(quantized);
    }

    let src_view = ImageRef::new(src.w, src.h, &quantized, PixelType::U8)?;
    let mut out = Image::new(dst.w, dst.h, PixelType::U8);
    let opts = ResizeOptions::new().resize_alg(ResizeAlg::Nearest);
    resizer.resize(&src_view, &mut out, &opts)?;

    Ok(out.into_vec())
}

/// Block-pixelate a packed 4-channel frame into `dst`.
///
/// The frame is averaged down onto a grid of `block`-sized cells (box filter)
/// and stretched back with nearest-neighbour sampling, so every block carries
/// its mean colour. Channel order is irrelevant: RGBA and BGRA both work.
/// `dst` must hold at least `size.w * size.h * 4` bytes.
pub fn pixelate_rgba(
    resizer: &mut Resizer,
    src: &[u8],
    size: Size,
    block: u32,
    dst: &mut [u8],
) -> Result<(), ScaleError> {
    if size.is_empty() {
        return Err(ScaleError::EmptyImage);
    }
    let len = size.pixel_count() * 4;
    if src.len() < len {
        return Err(ScaleError::BufferTooSmall { needed: len, got: src.len() });
    }
    if dst.len() < len {
        return Err(ScaleError::BufferTooSmall { needed: len, got: dst.len() });
    }

    let grid = block_grid(size, block);
    if grid == size {
        dst[..len].copy_from_slice(&src[..len]);
        return Ok(());
    }

    let src_view = ImageRef::new(size.w, size.h, &src[..len], PixelType::U8x4)?;
    let mut coarse = Image::new(grid.w, grid.h, PixelType::U8x4);
    let down = ResizeOptions::new()
        .resize_alg(ResizeAlg::Convolution(FilterType::Box))
        .use_alpha(false);
    resizer.resize(&src_view, &mut coarse, &down)?;

    let mut out = Image::from_slice_u8(size.w, size.h, &mut dst[..len], PixelType::U8x4)?;
    let up = ResizeOptions::new()
        .resize_alg(ResizeAlg::Nearest)
        .use_alpha(false);
    resizer.resize(&coarse, &mut out, &up)?;

    Ok(())
}
