// Copyright 2026 the Stillframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The source-frame contract consumed by capture.
//!
//! A source frame is whatever owns the compositor output being captured: a
//! surface's active frame in a display compositor, or a set of textures in a
//! GPU backend. Capture only needs to list its render passes and hand it
//! [`CopyOutputRequest`]s.

use kurbo::{Affine, Rect};

use crate::copy_output::CopyOutputRequest;
use crate::gpu::SharedImageFormat;
use crate::id::RenderPassId;

/// One render pass of a source frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderPass {
    /// Identifier used by transition directives.
    pub id: RenderPassId,
    /// Output rectangle in the pass's own space.
    pub output_rect: Rect,
    /// Transform from the pass's space to the root render target.
    pub transform_to_root_target: Affine,
    /// Channel order of the pass's backing, used for texture blit
    /// destinations.
    pub format: SharedImageFormat,
}

impl RenderPass {
    /// An RGBA pass at the origin with an identity root transform.
    #[must_use]
    pub fn new(id: RenderPassId, width: f64, height: f64) -> Self {
        Self {
            id,
            output_rect: Rect::new(0.0, 0.0, width, height),
            transform_to_root_target: Affine::IDENTITY,
            format: SharedImageFormat::Rgba8,
        }
    }

    /// Sets the channel order of the pass's backing.
    #[must_use]
    pub fn with_format(mut self, format: SharedImageFormat) -> Self {
        self.format = format;
        self
    }
}

/// A frame whose render passes can be copied.
pub trait CopyOutputSource {
    /// Returns `true` if the source currently has a frame to copy from.
    fn has_active_frame(&self) -> bool;

    /// Render passes of the active frame, in draw order.
    fn render_passes(&self) -> &[RenderPass];

    /// Issues `request` against the pass named `render_pass_id`.
    ///
    /// The source must eventually complete the request. Dropping it counts
    /// as completion with an empty result.
    fn request_copy_of_output(&mut self, render_pass_id: RenderPassId, request: CopyOutputRequest);
}
