// Copyright 2026 the Stillframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Captured output handed to transition consumers.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use crate::copy_output::SoftwareBitmap;
use crate::geometry::{PixelSize, RenderPassDrawData};
use crate::gpu::{ColorSpace, SyncToken};
use crate::id::{ElementResourceId, SharedImageId};
use crate::release::ScopedRelease;

/// Pixels captured for one shared element.
#[derive(Debug)]
pub enum CapturedContent {
    /// CPU pixels from the software path.
    Software(SoftwareBitmap),
    /// A GPU texture from the hardware path.
    Hardware {
        /// Image holding the pixels.
        image: SharedImageId,
        /// Token to wait on before reading `image`.
        sync_token: SyncToken,
        /// Color space of the pixels.
        color_space: ColorSpace,
    },
}

/// One populated slot of a [`FrameResult`].
///
/// Owns the release obligation for any GPU resource it references: dropping
/// the element runs the release callback once with the latest sync token.
#[derive(Debug)]
pub struct CapturedElement {
    draw_data: RenderPassDrawData,
    content: CapturedContent,
    release: ScopedRelease,
}

impl CapturedElement {
    /// Bundles captured content with its draw data and release obligation.
    #[must_use]
    pub fn new(
        draw_data: RenderPassDrawData,
        content: CapturedContent,
        release: ScopedRelease,
    ) -> Self {
        Self {
            draw_data,
            content,
            release,
        }
    }

    /// Draw data of the source render pass.
    #[inline]
    #[must_use]
    pub fn draw_data(&self) -> &RenderPassDrawData {
        &self.draw_data
    }

    /// Size of the captured output.
    #[inline]
    #[must_use]
    pub fn size(&self) -> PixelSize {
        self.draw_data.size
    }

    /// The captured pixels.
    #[inline]
    #[must_use]
    pub fn content(&self) -> &CapturedContent {
        &self.content
    }

    /// Returns `true` for CPU pixels.
    #[inline]
    #[must_use]
    pub fn is_software(&self) -> bool {
        matches!(self.content, CapturedContent::Software(_))
    }

    /// Returns `true` if dropping this element will release a resource.
    #[inline]
    #[must_use]
    pub fn has_release_callback(&self) -> bool {
        self.release.is_armed()
    }

    /// Records that the consumer used the texture up to `sync_token`.
    ///
    /// The release callback runs with the latest recorded token.
    pub fn update_sync_token(&mut self, sync_token: SyncToken) {
        self.release.update_sync_token(sync_token);
        if let CapturedContent::Hardware { sync_token: t, .. } = &mut self.content {
            *t = sync_token;
        }
    }

    /// Splits the element, moving the release obligation to the caller.
    #[must_use]
    pub fn into_parts(self) -> (RenderPassDrawData, CapturedContent, ScopedRelease) {
        (self.draw_data, self.content, self.release)
    }
}

/// The assembled output of a saved-frame capture.
#[derive(Debug, Default)]
pub struct FrameResult {
    /// One slot per shared element, in directive order. `None` means nothing
    /// was captured for that element.
    pub shared_results: Vec<Option<CapturedElement>>,
    /// Resource ids of elements that had no render pass.
    pub empty_resource_ids: BTreeSet<ElementResourceId>,
}

impl FrameResult {
    /// A result with `slot_count` empty slots.
    #[must_use]
    pub fn with_empty_slots(
        slot_count: usize,
        empty_resource_ids: BTreeSet<ElementResourceId>,
    ) -> Self {
        let mut shared_results = Vec::with_capacity(slot_count);
        shared_results.resize_with(slot_count, || None);
        Self {
            shared_results,
            empty_resource_ids,
        }
    }

    /// Number of populated slots.
    #[must_use]
    pub fn populated_count(&self) -> usize {
        self.shared_results.iter().filter(|slot| slot.is_some()).count()
    }

    /// The element captured for `slot`, if any.
    #[must_use]
    pub fn slot(&self, slot: usize) -> Option<&CapturedElement> {
        self.shared_results.get(slot).and_then(Option::as_ref)
    }

    /// Removes and returns the element captured for `slot`.
    pub fn take_slot(&mut self, slot: usize) -> Option<CapturedElement> {
        self.shared_results.get_mut(slot).and_then(Option::take)
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use core::cell::Cell;

    use kurbo::Affine;

    use super::*;

    fn draw_data(width: u32, height: u32) -> RenderPassDrawData {
        RenderPassDrawData {
            size: PixelSize::new(width, height),
            target_transform: Affine::IDENTITY,
        }
    }

    #[test]
    fn dropping_element_releases_with_latest_token() {
        let released = Rc::new(Cell::new(None));
        let sink = Rc::clone(&released);
        let mut element = CapturedElement::new(
            draw_data(4, 4),
            CapturedContent::Hardware {
                image: SharedImageId(1),
                sync_token: SyncToken::new(1, 1),
                color_space: ColorSpace::Srgb,
            },
            ScopedRelease::from_fn(move |token, _| sink.set(Some(token)), SyncToken::new(1, 1)),
        );
        element.update_sync_token(SyncToken::new(1, 8));
        assert!(matches!(
            element.content(),
            CapturedContent::Hardware { sync_token, .. } if *sync_token == SyncToken::new(1, 8)
        ));
        drop(element);
        assert_eq!(released.get(), Some(SyncToken::new(1, 8)));
    }

    #[test]
    fn empty_slot_releases_nothing() {
        let mut result = FrameResult::with_empty_slots(2, BTreeSet::new());
        assert_eq!(result.populated_count(), 0);
        assert!(result.take_slot(0).is_none());
        assert!(result.slot(5).is_none());
    }

    #[test]
    fn software_element_reports_size() {
        let element = CapturedElement::new(
            draw_data(3, 2),
            CapturedContent::Software(SoftwareBitmap::filled(PixelSize::new(3, 2), [9; 4])),
            ScopedRelease::none(),
        );
        assert!(element.is_software());
        assert!(!element.has_release_callback());
        assert_eq!(element.size(), PixelSize::new(3, 2));
    }
}
