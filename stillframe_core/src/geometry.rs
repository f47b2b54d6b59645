// Copyright 2026 the Stillframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pixel sizes and per-pass draw data.

use kurbo::{Affine, Rect};

use crate::frame::RenderPass;

/// Integer dimensions of a captured render pass output, in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PixelSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelSize {
    /// Creates a size from explicit dimensions.
    #[inline]
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns the pixel size covering `rect`.
    ///
    /// The rectangle is expanded outward to whole pixels first. Degenerate or
    /// inverted extents produce zero.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "float to int casts saturate; pass rects never approach u32::MAX"
    )]
    pub fn from_rect(rect: Rect) -> Self {
        let rect = rect.expand();
        Self {
            width: rect.width().max(0.0) as u32,
            height: rect.height().max(0.0) as u32,
        }
    }

    /// Returns `true` if either dimension is zero.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels covered.
    #[inline]
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Draw data recorded alongside each captured element.
///
/// Consumers replay the captured texture with this data when they build the
/// transition's pseudo-element content.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderPassDrawData {
    /// Size of the render pass output.
    pub size: PixelSize,
    /// Transform from the pass's space to the root render target.
    pub target_transform: Affine,
}

impl RenderPassDrawData {
    /// Derives draw data from a render pass.
    #[must_use]
    pub fn from_render_pass(pass: &RenderPass) -> Self {
        Self {
            size: PixelSize::from_rect(pass.output_rect),
            target_transform: pass.transform_to_root_target,
        }
    }
}
