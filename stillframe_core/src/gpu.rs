// Copyright 2026 the Stillframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! GPU resource allocation contract.
//!
//! The capture core never touches a GPU API directly. When hardware
//! compositing is available it asks a [`SharedImageInterface`] for
//! destination images and hands them back for destruction once consumers
//! are done, ordered by [`SyncToken`]s.

use core::fmt;

use bitflags::bitflags;

use crate::geometry::PixelSize;
use crate::id::SharedImageId;

/// A GPU command-stream ordering marker.
///
/// Work that waits on a token runs after every command submitted before the
/// token was generated on its stream. Tokens from different namespaces are
/// independent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SyncToken {
    /// Command stream the token belongs to.
    pub namespace: u32,
    /// Release count on that stream.
    pub release_count: u64,
}

impl SyncToken {
    /// A token that orders nothing.
    pub const EMPTY: Self = Self {
        namespace: 0,
        release_count: 0,
    };

    /// Creates a token.
    #[inline]
    #[must_use]
    pub const fn new(namespace: u32, release_count: u64) -> Self {
        Self {
            namespace,
            release_count,
        }
    }

    /// Returns `true` if the token orders nothing.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.release_count == 0
    }
}

/// Color space tag carried by captured textures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    /// Standard sRGB.
    #[default]
    Srgb,
    /// Display P3 with the sRGB transfer function.
    DisplayP3,
    /// Linear extended-range sRGB.
    ExtendedSrgbLinear,
}

/// Pixel format of a shared image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SharedImageFormat {
    /// 8-bit RGBA.
    #[default]
    Rgba8,
    /// 8-bit BGRA.
    Bgra8,
}

bitflags! {
    /// How a shared image will be used.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct SharedImageUsage: u32 {
        /// Written by the CPU (software compositing).
        const CPU_WRITE = 1 << 0;
        /// Sampled by the GPU.
        const GPU_READ = 1 << 1;
        /// Written by the GPU (raster or copy destination).
        const GPU_WRITE = 1 << 2;
        /// Scanned out or composited by the display compositor.
        const DISPLAY_READ = 1 << 3;
    }
}

/// Parameters for [`SharedImageInterface::create_shared_image`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SharedImageDescriptor {
    /// Pixel format.
    pub format: SharedImageFormat,
    /// Dimensions.
    pub size: PixelSize,
    /// Color space tag.
    pub color_space: ColorSpace,
    /// Intended usage.
    pub usage: SharedImageUsage,
    /// Label for GPU debugging tools.
    pub debug_label: &'static str,
}

/// A freshly allocated shared image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocatedSharedImage {
    /// Handle naming the image.
    pub id: SharedImageId,
    /// Token that must be waited on before the image is first used.
    pub creation_sync_token: SyncToken,
}

/// Why a shared image could not be allocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationError {
    /// The requested size has a zero dimension.
    EmptySize,
    /// The size exceeds what the allocator supports.
    TooLarge(PixelSize),
    /// The allocator cannot produce this format/usage combination.
    UnsupportedFormat(SharedImageFormat),
    /// The allocator ran out of memory.
    OutOfMemory,
    /// The GPU context backing the allocator was lost.
    ContextLost,
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySize => write!(f, "shared image size has a zero dimension"),
            Self::TooLarge(size) => write!(
                f,
                "shared image size {}x{} exceeds the allocator limit",
                size.width, size.height
            ),
            Self::UnsupportedFormat(format) => {
                write!(f, "unsupported shared image format: {format:?}")
            }
            Self::OutOfMemory => write!(f, "out of memory allocating shared image"),
            Self::ContextLost => write!(f, "GPU context lost"),
        }
    }
}

impl core::error::Error for AllocationError {}

/// Allocates and destroys shared images on behalf of the capture core.
///
/// Methods take `&self` so one allocator can be shared by every session on a
/// sequence; implementations use interior mutability for their bookkeeping.
pub trait SharedImageInterface {
    /// Allocates a shared image.
    fn create_shared_image(
        &self,
        descriptor: &SharedImageDescriptor,
    ) -> Result<AllocatedSharedImage, AllocationError>;

    /// Destroys `id` once all work ordered before `sync_token` is done.
    fn destroy_shared_image(&self, id: SharedImageId, sync_token: SyncToken);

    /// Returns `true` if this allocator backs images with CPU memory.
    ///
    /// Capture uses the system-memory path when this is set.
    fn is_software(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn empty_token_is_default() {
        assert!(SyncToken::EMPTY.is_empty());
        assert_eq!(SyncToken::default(), SyncToken::EMPTY);
        assert!(!SyncToken::new(1, 4).is_empty());
    }

    #[test]
    fn allocation_error_messages() {
        assert_eq!(
            AllocationError::TooLarge(PixelSize::new(9000, 2)).to_string(),
            "shared image size 9000x2 exceeds the allocator limit"
        );
        assert_eq!(AllocationError::ContextLost.to_string(), "GPU context lost");
    }
}
