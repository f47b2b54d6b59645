// Copyright 2026 the Stillframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Capture configuration.

use crate::gpu::ColorSpace;

/// Configuration for a [`SavedFrame`](crate::saved_frame::SavedFrame).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Pre-allocate a destination image per captured element and have the
    /// copy written straight into it. Requires a shared image allocator.
    pub use_blit_requests: bool,
    /// Color space requested for destination images.
    pub color_space: ColorSpace,
    /// Label attached to destination images for GPU debugging tools.
    pub debug_label: &'static str,
}

impl CaptureConfig {
    /// Blit requests on, sRGB destinations.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            use_blit_requests: true,
            color_space: ColorSpace::Srgb,
            debug_label: "SavedFrameCapture",
        }
    }

    /// Lets the copy allocate its own result texture instead of blitting.
    #[must_use]
    pub const fn without_blit() -> Self {
        Self {
            use_blit_requests: false,
            ..Self::new()
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self::new()
    }
}
