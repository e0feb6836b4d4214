// SPDX-License-Identifier: MIT
//! # frame-scale: CPU Scaling Helpers for Camera Frame Filters
//!
//! Small, allocation-aware wrappers around `fast_image_resize` used by the
//! per-frame filter chain.
//!
//! ## Key Components
//!
//! - [`geometry`]: frame sizes and the block grid used for pixelation
//! - [`cpu`]: mask rescaling and block pixelation on packed 8-bit frames
//!
//! ## Usage Example
//!
//! ```rust
//! use frame_scale::cpu::{pixelate_rgba, scale_mask};
//! use frame_scale::geometry::Size;
//!
//! let mut resizer = fast_image_resize::Resizer::new();
//!
//! // A 2x1 segmentation mask stretched over a 4x2 frame.
//! let weights = scale_mask(&mut resizer, &[1.0, 0.0], Size::new(2, 1), Size::new(4, 2))?;
//! assert_eq!(weights.len(), 8);
//!
//! // Pixelate a 4x4 RGBA frame into 2x2 blocks.
//! let src = vec![200u8; 4 * 4 * 4];
//! let mut dst = vec![0u8; src.len()];
//! pixelate_rgba(&mut resizer, &src, Size::new(4, 4), 2, &mut dst)?;
//! assert_eq!(dst, src);
//! # Ok::<(), frame_scale::cpu::ScaleError>(())
//! ```

pub mod cpu;
pub mod geometry;
