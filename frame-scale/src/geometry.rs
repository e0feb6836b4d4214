// SPDX-License-Identifier: MIT
//! # Frame Geometry
//!
//! Sizes shared by the scaling helpers. Pixelation works by shrinking the
//! frame onto a coarse grid (one pixel per block) and stretching it back, so
//! the grid computation lives here next to the size type.

/// Represents a 2D size with width and height in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Size {
    pub w: u32,
    pub h: u32,
}

impl Size {
    pub const fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    /// Number of pixels covered by this size.
    pub fn pixel_count(&self) -> usize {
        self.w as usize * self.h as usize
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
}

/// Grid with one cell per `block`x`block` square of `input`.
///
/// Partial blocks on the right and bottom edges get their own cell, so the
/// grid never drops source pixels. Clamped to at least 1x1.
pub fn block_grid(input: Size, block: u32) -> Size {
    let block = block.max(1);
    Size {
        w: input.w.div_ceil(block).max(1),
        h: input.h.div_ceil(block).max(1),
    }
}
