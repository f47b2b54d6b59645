// Copyright 2026 the Stillframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory stand-ins for a compositor frame and a shared image allocator.
//!
//! Available to this crate's tests and, with the `test-helpers` feature, to
//! downstream crates.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use crate::copy_output::{
    CopyOutputRequest, CopyOutputResult, ResultDestination, SoftwareBitmap, TextureResult,
};
use crate::frame::{CopyOutputSource, RenderPass};
use crate::gpu::{
    AllocatedSharedImage, AllocationError, ColorSpace, SharedImageDescriptor,
    SharedImageInterface, SyncToken,
};
use crate::id::{RenderPassId, SharedImageId};
use crate::release::ScopedRelease;

/// Fill color of bitmaps produced by [`FakeFrame::respond`].
pub const FAKE_PIXEL: [u8; 4] = [0x20, 0x40, 0x60, 0xff];

/// A copy request held by a [`FakeFrame`].
#[derive(Debug)]
pub struct PendingCopy {
    /// Render pass the request targets.
    pub render_pass_id: RenderPassId,
    /// Output size of that pass.
    pub pass: RenderPass,
    /// The request itself. Dropping it delivers an empty result.
    pub request: CopyOutputRequest,
}

/// A compositor frame that queues copy requests until a test answers them.
#[derive(Debug)]
pub struct FakeFrame {
    passes: Vec<RenderPass>,
    active: bool,
    pending: Vec<PendingCopy>,
    next_texture: u64,
}

impl FakeFrame {
    /// An active frame drawing `passes` in order.
    #[must_use]
    pub fn new(passes: Vec<RenderPass>) -> Self {
        Self {
            passes,
            active: true,
            pending: Vec::new(),
            next_texture: 1000,
        }
    }

    /// A surface with no active frame.
    #[must_use]
    pub fn inactive() -> Self {
        Self {
            active: false,
            ..Self::new(Vec::new())
        }
    }

    /// Number of unanswered requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Removes every unanswered request, in issue order.
    pub fn take_pending(&mut self) -> Vec<PendingCopy> {
        core::mem::take(&mut self.pending)
    }

    /// Answers every unanswered request with [`respond`](Self::respond).
    pub fn complete_all(&mut self) {
        for copy in self.take_pending() {
            self.respond(copy);
        }
    }

    /// Answers `copy` the way a compositor would.
    ///
    /// System-memory requests get a bitmap of the pass size filled with
    /// [`FAKE_PIXEL`]. Texture requests are written into their blit
    /// destination when one is set, otherwise into a fresh texture id.
    pub fn respond(&mut self, copy: PendingCopy) {
        let size = crate::geometry::PixelSize::from_rect(copy.pass.output_rect);
        let result = match copy.request.result_destination() {
            ResultDestination::SystemMemory => {
                CopyOutputResult::from_bitmap(SoftwareBitmap::filled(size, FAKE_PIXEL))
            }
            ResultDestination::NativeTextures => {
                let (image, sync_token) = match copy.request.blit_request() {
                    Some(blit) => (
                        blit.destination,
                        SyncToken::new(
                            blit.sync_token.namespace,
                            blit.sync_token.release_count + 1,
                        ),
                    ),
                    None => {
                        self.next_texture += 1;
                        (SharedImageId(self.next_texture), SyncToken::new(9, 1))
                    }
                };
                CopyOutputResult::from_texture(
                    size,
                    TextureResult {
                        image,
                        sync_token,
                        color_space: ColorSpace::Srgb,
                        release: ScopedRelease::none(),
                    },
                )
            }
        };
        copy.request.send_result(result);
    }
}

impl CopyOutputSource for FakeFrame {
    fn has_active_frame(&self) -> bool {
        self.active
    }

    fn render_passes(&self) -> &[RenderPass] {
        &self.passes
    }

    fn request_copy_of_output(&mut self, render_pass_id: RenderPassId, request: CopyOutputRequest) {
        let Some(pass) = self.passes.iter().find(|pass| pass.id == render_pass_id) else {
            // Unknown pass: the request is dropped and completes empty.
            return;
        };
        self.pending.push(PendingCopy {
            render_pass_id,
            pass: *pass,
            request,
        });
    }
}

/// A [`SharedImageInterface`] that records every allocation and release.
#[derive(Debug, Default)]
pub struct RecordingSharedImages {
    software: bool,
    fail_allocations: Cell<bool>,
    next_id: Cell<u64>,
    live: RefCell<BTreeMap<SharedImageId, SharedImageDescriptor>>,
    destroyed: RefCell<Vec<(SharedImageId, SyncToken)>>,
}

impl RecordingSharedImages {
    /// A GPU-backed allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A CPU-backed allocator.
    #[must_use]
    pub fn software() -> Self {
        Self {
            software: true,
            ..Self::default()
        }
    }

    /// Makes subsequent allocations fail with
    /// [`AllocationError::OutOfMemory`].
    pub fn set_fail_allocations(&self, fail: bool) {
        self.fail_allocations.set(fail);
    }

    /// Number of images allocated and not yet destroyed.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.borrow().len()
    }

    /// Descriptor of a live image.
    #[must_use]
    pub fn descriptor(&self, id: SharedImageId) -> Option<SharedImageDescriptor> {
        self.live.borrow().get(&id).copied()
    }

    /// Every destroyed image with the token it was destroyed at.
    #[must_use]
    pub fn destroyed(&self) -> Vec<(SharedImageId, SyncToken)> {
        self.destroyed.borrow().clone()
    }
}

impl SharedImageInterface for RecordingSharedImages {
    fn create_shared_image(
        &self,
        descriptor: &SharedImageDescriptor,
    ) -> Result<AllocatedSharedImage, AllocationError> {
        if self.fail_allocations.get() {
            return Err(AllocationError::OutOfMemory);
        }
        if descriptor.size.is_empty() {
            return Err(AllocationError::EmptySize);
        }
        let n = self.next_id.get() + 1;
        self.next_id.set(n);
        let id = SharedImageId(n);
        self.live.borrow_mut().insert(id, *descriptor);
        Ok(AllocatedSharedImage {
            id,
            creation_sync_token: SyncToken::new(1, n),
        })
    }

    fn destroy_shared_image(&self, id: SharedImageId, sync_token: SyncToken) {
        let removed = self.live.borrow_mut().remove(&id);
        assert!(removed.is_some(), "{id:?} destroyed twice or never created");
        self.destroyed.borrow_mut().push((id, sync_token));
    }

    fn is_software(&self) -> bool {
        self.software
    }
}
