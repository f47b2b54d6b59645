// Copyright 2026 the Stillframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render pass, element resource, and shared image identity types.
//!
//! All of these are assigned outside the capture core (by the compositor,
//! the transition directive, or a GPU allocator). Core code compares and
//! passes them through without interpreting the value.

use core::fmt;

/// Identifies a render pass inside a source frame.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RenderPassId(pub u64);

impl fmt::Debug for RenderPassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RenderPassId({})", self.0)
    }
}

/// Identifies the consumer-visible resource slot of a shared element.
///
/// Consumers use these to report "no data" for elements that produced no
/// output, even when no copy was ever requested for them.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementResourceId(pub u64);

impl fmt::Debug for ElementResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementResourceId({})", self.0)
    }
}

/// Names a shared image allocated by a
/// [`SharedImageInterface`](crate::gpu::SharedImageInterface).
///
/// The handle is valid across process and context boundaries; the allocator
/// that issued it is the only party that may destroy the backing image.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SharedImageId(pub u64);

impl fmt::Debug for SharedImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedImageId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use alloc::format;

    use super::*;

    #[test]
    fn debug_formats_are_compact() {
        assert_eq!(format!("{:?}", RenderPassId(3)), "RenderPassId(3)");
        assert_eq!(
            format!("{:?}", ElementResourceId(9)),
            "ElementResourceId(9)"
        );
        assert_eq!(format!("{:?}", SharedImageId(1)), "SharedImageId(1)");
    }
}
