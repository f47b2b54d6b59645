// Copyright 2026 the Stillframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Saved-frame capture: snapshotting shared elements for a transition.
//!
//! A [`SavedFrame`] fulfils one [`TransitionDirective`]. It issues one copy
//! request per (render pass, shared element) pair of a source frame, collects
//! the results as they arrive in any order, and assembles a [`FrameResult`]
//! with one slot per shared element.
//!
//! # Lifecycle
//!
//! ```text
//!   SavedFrame::new ──► begin_capture ──► (copy results posted, any order)
//!                           │                        │
//!                           │ zero requests          │ last result
//!                           ▼                        ▼
//!                  "directive finished" posted to the session's TaskRunner
//!
//!   take_result ──► FrameResult (once)      drop ──► finished fires now if
//!                                                    it has not been posted
//! ```
//!
//! # Completion ordering
//!
//! Each result touches only its own slot and a shared pending counter, so the
//! final [`FrameResult`] does not depend on arrival order. The finished
//! notification is posted once, after the last pending result, whether or
//! not the capture is valid: it releases upstream resources tied to the
//! directive, not to capture success.
//!
//! # Destruction
//!
//! Copy requests hold only a weak reference to the session. Results that
//! arrive after the session is gone are dropped without effect (their own
//! release callbacks still run). Destroying a session releases every
//! pre-allocated blit destination still waiting on a result, drops any
//! captured slots that were not taken, and fires the finished notification
//! synchronously if it was not already posted. Consumers that want a partial
//! capture call [`SavedFrame::take_result`] before dropping the session.

use alloc::boxed::Box;
use alloc::collections::BTreeSet;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use crate::config::CaptureConfig;
use crate::copy_output::{
    BlitRequest, CopyOutputContent, CopyOutputRequest, CopyOutputResult, ResultDestination,
    ResultFormat,
};
use crate::directive::TransitionDirective;
use crate::frame::CopyOutputSource;
use crate::geometry::RenderPassDrawData;
use crate::gpu::{
    SharedImageDescriptor, SharedImageFormat, SharedImageInterface, SharedImageUsage, SyncToken,
};
use crate::id::{ElementResourceId, RenderPassId, SharedImageId};
use crate::release::ScopedRelease;
use crate::result::{CapturedContent, CapturedElement, FrameResult};
use crate::task::TaskRunner;
use crate::trace::{
    BlitAllocationFailedEvent, CaptureBeginEvent, CopyOutcome, CopyRequestIssuedEvent,
    CopyResultEvent, DirectiveFinishedEvent, FinishReason, Tracer, count_u32,
};

/// One-shot notification that every copy request of a directive completed.
pub type DirectiveFinishedCallback = Box<dyn FnOnce()>;

/// One copy the session issues: a render pass copied into a slot.
#[derive(Clone, Copy, Debug)]
struct SlotCopy {
    render_pass_id: RenderPassId,
    slot: usize,
    draw_data: RenderPassDrawData,
    format: SharedImageFormat,
}

/// A destination image allocated for a slot, not yet owned by a result.
#[derive(Clone, Copy, Debug)]
struct BlitDestination {
    image: SharedImageId,
    creation_sync_token: SyncToken,
}

/// Session state shared with in-flight completions (weakly).
struct CaptureState {
    directive: Rc<TransitionDirective>,
    expected_result_count: usize,
    copy_request_count: usize,
    captured_passes: BTreeSet<RenderPassId>,
    failed_passes: BTreeSet<RenderPassId>,
    frame_result: Option<FrameResult>,
    finished_callback: Option<DirectiveFinishedCallback>,
    blit_destinations: Vec<Option<BlitDestination>>,
    runner: Rc<dyn TaskRunner>,
    shared_images: Option<Rc<dyn SharedImageInterface>>,
    tracer: Tracer,
}

impl CaptureState {
    /// Distinct render passes that produced pixels for every slot they were
    /// copied into.
    fn valid_result_count(&self) -> usize {
        self.captured_passes
            .difference(&self.failed_passes)
            .count()
    }

    fn finished_event(&self, reason: FinishReason) -> DirectiveFinishedEvent {
        DirectiveFinishedEvent {
            sequence_id: self.directive.sequence_id(),
            reason,
            valid_result_count: count_u32(self.valid_result_count()),
            expected_result_count: count_u32(self.expected_result_count),
        }
    }

    fn empty_frame_result(&self) -> FrameResult {
        FrameResult::with_empty_slots(
            self.directive.shared_elements().len(),
            self.directive.empty_resource_ids(),
        )
    }

    /// Posts the finished notification if it has not been posted yet.
    fn post_finished(&mut self, reason: FinishReason) {
        let Some(callback) = self.finished_callback.take() else {
            return;
        };
        let tracer = self.tracer.clone();
        let event = self.finished_event(reason);
        self.runner.post_task(Box::new(move || {
            tracer.directive_finished(&event);
            callback();
        }));
    }

    fn release_blit_destination(&self, blit: BlitDestination) {
        if let Some(images) = &self.shared_images {
            images.destroy_shared_image(blit.image, blit.creation_sync_token);
        }
    }

    fn on_copy_complete(&mut self, copy: SlotCopy, software: bool, result: CopyOutputResult) {
        assert!(
            self.copy_request_count > 0,
            "copy result arrived with no request pending"
        );
        self.copy_request_count -= 1;

        self.store_result(copy, software, result);

        if self.copy_request_count == 0 {
            self.post_finished(FinishReason::Completed);
        }
    }

    fn store_result(&mut self, copy: SlotCopy, software: bool, result: CopyOutputResult) {
        let SlotCopy {
            render_pass_id,
            slot,
            draw_data,
            ..
        } = copy;
        let blit = self
            .blit_destinations
            .get_mut(slot)
            .and_then(Option::take);
        let size = result.size();
        let captured = if result.is_empty() {
            None
        } else {
            extract_content(result, software)
        };

        let Some((content, result_release)) = captured else {
            self.tracer.copy_result(&CopyResultEvent {
                sequence_id: self.directive.sequence_id(),
                slot: count_u32(slot),
                outcome: CopyOutcome::Empty,
                size,
            });
            self.failed_passes.insert(render_pass_id);
            if let Some(blit) = blit {
                self.release_blit_destination(blit);
            }
            return;
        };

        let release = match (blit, &self.shared_images) {
            (Some(blit), Some(images)) => {
                // The destination belongs to this session, not to the copy.
                drop(result_release);
                let latest = match &content {
                    CapturedContent::Hardware { sync_token, .. } => *sync_token,
                    CapturedContent::Software(_) => blit.creation_sync_token,
                };
                let images = Rc::clone(images);
                ScopedRelease::from_fn(
                    move |sync_token, _is_lost| images.destroy_shared_image(blit.image, sync_token),
                    latest,
                )
            }
            _ => result_release,
        };

        self.captured_passes.insert(render_pass_id);
        let directive = &self.directive;
        let frame_result = self.frame_result.get_or_insert_with(|| {
            FrameResult::with_empty_slots(
                directive.shared_elements().len(),
                directive.empty_resource_ids(),
            )
        });
        let entry = &mut frame_result.shared_results[slot];
        assert!(entry.is_none(), "saved frame slot {slot} populated twice");
        *entry = Some(CapturedElement::new(draw_data, content, release));

        self.tracer.copy_result(&CopyResultEvent {
            sequence_id: self.directive.sequence_id(),
            slot: count_u32(slot),
            outcome: CopyOutcome::Captured,
            size,
        });
    }
}

/// Maps a non-empty copy result onto the slot representation for its path.
///
/// A result whose payload doesn't match the requested path is treated as
/// empty.
fn extract_content(
    result: CopyOutputResult,
    software: bool,
) -> Option<(CapturedContent, ScopedRelease)> {
    match (result.into_content()?, software) {
        (CopyOutputContent::Bitmap(bitmap), true) => {
            Some((CapturedContent::Software(bitmap), ScopedRelease::none()))
        }
        (CopyOutputContent::Texture(texture), false) => Some((
            CapturedContent::Hardware {
                image: texture.image,
                sync_token: texture.sync_token,
                color_space: texture.color_space,
            },
            texture.release,
        )),
        _ => None,
    }
}

/// A single-use capture of the shared elements named by a directive.
///
/// See the [module documentation](self) for the lifecycle.
pub struct SavedFrame {
    directive: Rc<TransitionDirective>,
    state: Rc<RefCell<CaptureState>>,
    config: CaptureConfig,
    started: bool,
}

impl fmt::Debug for SavedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("SavedFrame")
            .field("sequence_id", &self.directive.sequence_id())
            .field("started", &self.started)
            .field("expected_result_count", &state.expected_result_count)
            .field("pending_request_count", &state.copy_request_count)
            .field("valid_result_count", &state.valid_result_count())
            .finish_non_exhaustive()
    }
}

impl SavedFrame {
    /// Creates a session for `directive`.
    ///
    /// `finished` fires exactly once: posted to `runner` after the last copy
    /// result (or right after [`begin_capture`](Self::begin_capture) when
    /// nothing needs copying), or synchronously when the session is dropped
    /// before that. Without `shared_images` the session captures into system
    /// memory.
    #[must_use]
    pub fn new(
        directive: TransitionDirective,
        finished: DirectiveFinishedCallback,
        runner: Rc<dyn TaskRunner>,
        shared_images: Option<Rc<dyn SharedImageInterface>>,
        config: CaptureConfig,
    ) -> Self {
        let directive = Rc::new(directive);
        let slot_count = directive.shared_elements().len();
        let mut blit_destinations = Vec::with_capacity(slot_count);
        blit_destinations.resize_with(slot_count, || None);
        let state = CaptureState {
            directive: Rc::clone(&directive),
            expected_result_count: directive.expected_result_count(),
            copy_request_count: 0,
            captured_passes: BTreeSet::new(),
            failed_passes: BTreeSet::new(),
            frame_result: None,
            finished_callback: Some(finished),
            blit_destinations,
            runner,
            shared_images,
            tracer: Tracer::none(),
        };
        Self {
            directive,
            state: Rc::new(RefCell::new(state)),
            config,
            started: false,
        }
    }

    /// Attaches diagnostics.
    #[must_use]
    pub fn with_tracer(self, tracer: Tracer) -> Self {
        self.state.borrow_mut().tracer = tracer;
        self
    }

    /// The directive being fulfilled.
    #[inline]
    #[must_use]
    pub fn directive(&self) -> &TransitionDirective {
        &self.directive
    }

    /// Returns `true` if captures take the system-memory path.
    #[must_use]
    pub fn is_software(&self) -> bool {
        self.state
            .borrow()
            .shared_images
            .as_ref()
            .is_none_or(|images| images.is_software())
    }

    /// Issues copy requests for every shared element present in `source`.
    ///
    /// Render passes are visited in `source` order; a pass referenced by
    /// several elements gets one request per element. Elements whose pass is
    /// missing from `source` get no request and their slot stays empty.
    ///
    /// # Panics
    ///
    /// Panics if `source` has no active frame, or if this session already
    /// captured.
    pub fn begin_capture(&mut self, source: &mut dyn CopyOutputSource) {
        assert!(
            source.has_active_frame(),
            "saved frame capture requires an active source frame"
        );
        assert!(!self.started, "a saved frame captures exactly once");
        self.started = true;

        let software = self.is_software();
        {
            let state = self.state.borrow();
            state.tracer.capture_begin(&CaptureBeginEvent {
                sequence_id: self.directive.sequence_id(),
                element_count: count_u32(self.directive.shared_elements().len()),
                expected_result_count: count_u32(state.expected_result_count),
                software,
            });
        }

        let copies: Vec<SlotCopy> = source
            .render_passes()
            .iter()
            .flat_map(|pass| {
                let draw_data = RenderPassDrawData::from_render_pass(pass);
                self.directive
                    .slots_for_render_pass(pass.id)
                    .map(move |slot| SlotCopy {
                        render_pass_id: pass.id,
                        slot,
                        draw_data,
                        format: pass.format,
                    })
            })
            .collect();

        for copy in copies {
            let Some(request) = self.create_copy_request(copy, software) else {
                continue;
            };
            self.state.borrow_mut().copy_request_count += 1;
            source.request_copy_of_output(copy.render_pass_id, request);
        }

        let mut state = self.state.borrow_mut();
        if state.copy_request_count == 0 {
            let empty = state.empty_frame_result();
            state.frame_result = Some(empty);
            state.post_finished(FinishReason::NothingToCapture);
        }
    }

    fn create_copy_request(&self, copy: SlotCopy, software: bool) -> Option<CopyOutputRequest> {
        let blit = if self.config.use_blit_requests {
            let Some(blit) = self.allocate_blit_destination(copy, software) else {
                // The slot stays empty, so the pass can no longer be valid.
                self.state
                    .borrow_mut()
                    .failed_passes
                    .insert(copy.render_pass_id);
                return None;
            };
            blit
        } else {
            None
        };
        let SlotCopy {
            render_pass_id,
            slot,
            ..
        } = copy;

        let destination = if software {
            ResultDestination::SystemMemory
        } else {
            ResultDestination::NativeTextures
        };
        let weak: Weak<RefCell<CaptureState>> = Rc::downgrade(&self.state);
        let mut request = CopyOutputRequest::new(
            ResultFormat::Rgba,
            destination,
            Box::new(move |result| {
                if let Some(state) = weak.upgrade() {
                    state.borrow_mut().on_copy_complete(copy, software, result);
                }
            }),
        );

        let mut state = self.state.borrow_mut();
        request.set_result_task_runner(Rc::clone(&state.runner));
        if let Some(blit) = blit {
            request.set_blit_request(BlitRequest {
                destination: blit.image,
                sync_token: blit.creation_sync_token,
                offset: (0, 0),
            });
            state.blit_destinations[slot] = Some(blit);
        }
        state.tracer.copy_request_issued(&CopyRequestIssuedEvent {
            sequence_id: self.directive.sequence_id(),
            slot: count_u32(slot),
            render_pass: render_pass_id,
            destination,
            blit: blit.is_some(),
        });
        Some(request)
    }

    /// Returns `Some(None)` when no allocator is available, `None` when
    /// allocation failed and the slot must be skipped.
    fn allocate_blit_destination(
        &self,
        copy: SlotCopy,
        software: bool,
    ) -> Option<Option<BlitDestination>> {
        let state = self.state.borrow();
        let Some(images) = &state.shared_images else {
            return Some(None);
        };
        // Software results are RGBA bitmaps; texture blits keep the pass's
        // channel order.
        let (usage, format) = if software {
            (SharedImageUsage::CPU_WRITE, SharedImageFormat::Rgba8)
        } else {
            (
                SharedImageUsage::GPU_READ | SharedImageUsage::GPU_WRITE,
                copy.format,
            )
        };
        let descriptor = SharedImageDescriptor {
            format,
            size: copy.draw_data.size,
            color_space: self.config.color_space,
            usage,
            debug_label: self.config.debug_label,
        };
        match images.create_shared_image(&descriptor) {
            Ok(image) => Some(Some(BlitDestination {
                image: image.id,
                creation_sync_token: image.creation_sync_token,
            })),
            Err(error) => {
                state.tracer.blit_allocation_failed(&BlitAllocationFailedEvent {
                    sequence_id: self.directive.sequence_id(),
                    slot: count_u32(copy.slot),
                    render_pass: copy.render_pass_id,
                    error,
                });
                None
            }
        }
    }

    /// Returns `true` once every expected render pass produced pixels.
    ///
    /// A valid session has captured, has no request pending, and has filled
    /// every slot whose render pass was expected.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let state = self.state.borrow();
        self.started
            && state.copy_request_count == 0
            && state.valid_result_count() == state.expected_result_count
    }

    /// Moves the assembled result out of the session.
    ///
    /// Returns `None` before any result exists and on every call after the
    /// first successful one.
    pub fn take_result(&mut self) -> Option<FrameResult> {
        self.state.borrow_mut().frame_result.take()
    }

    /// Resource ids of elements that have no render pass.
    ///
    /// Available immediately; does not wait on any copy.
    #[must_use]
    pub fn empty_resource_ids(&self) -> BTreeSet<ElementResourceId> {
        self.directive.empty_resource_ids()
    }

    /// Distinct render passes the directive references.
    #[must_use]
    pub fn expected_result_count(&self) -> usize {
        self.state.borrow().expected_result_count
    }

    /// Copy requests issued but not yet answered.
    #[must_use]
    pub fn pending_request_count(&self) -> usize {
        self.state.borrow().copy_request_count
    }

    /// Distinct render passes whose copies all came back with pixels.
    ///
    /// A pass copied into several slots counts once, and only if none of its
    /// copies was empty or skipped.
    #[must_use]
    pub fn valid_result_count(&self) -> usize {
        self.state.borrow().valid_result_count()
    }

    /// Returns `true` once [`begin_capture`](Self::begin_capture) ran.
    #[inline]
    #[must_use]
    pub fn has_started(&self) -> bool {
        self.started
    }

    /// Fills every slot that has a render pass with a 1x1 placeholder bitmap
    /// and posts the finished notification, without copying anything.
    ///
    /// # Panics
    ///
    /// Panics if this session already captured.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn complete_with_placeholder_results(&mut self) {
        use crate::copy_output::SoftwareBitmap;
        use crate::geometry::PixelSize;

        assert!(!self.started, "a saved frame captures exactly once");
        self.started = true;

        let mut state = self.state.borrow_mut();
        let mut frame_result = state.empty_frame_result();
        for (slot, element) in self.directive.shared_elements().iter().enumerate() {
            let Some(render_pass_id) = element.render_pass_id else {
                continue;
            };
            state.captured_passes.insert(render_pass_id);
            let size = PixelSize::new(1, 1);
            frame_result.shared_results[slot] = Some(CapturedElement::new(
                RenderPassDrawData {
                    size,
                    target_transform: kurbo::Affine::IDENTITY,
                },
                CapturedContent::Software(SoftwareBitmap::filled(size, [255; 4])),
                ScopedRelease::none(),
            ));
        }
        state.frame_result = Some(frame_result);
        state.post_finished(FinishReason::Placeholder);
    }
}

impl Drop for SavedFrame {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        let pending: Vec<BlitDestination> = state
            .blit_destinations
            .iter_mut()
            .filter_map(Option::take)
            .collect();
        for blit in pending {
            state.release_blit_destination(blit);
        }
        let untaken = state.frame_result.take();
        let finished = state.finished_callback.take().map(|callback| {
            (
                callback,
                state.tracer.clone(),
                state.finished_event(FinishReason::SessionDestroyed),
            )
        });
        drop(state);

        // Release callbacks and the finished notification run outside the
        // state borrow.
        drop(untaken);
        if let Some((callback, tracer, event)) = finished {
            tracer.directive_finished(&event);
            callback();
        }
    }
}
