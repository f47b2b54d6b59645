// Copyright 2026 the Stillframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for saved-frame capture.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that the
//! capture pipeline calls as a session moves from issuing copy requests to
//! finishing its directive. All method bodies default to no-ops, so
//! implementing only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional shared sink. Capture completions arrive
//! asynchronously, so unlike a per-frame tracer it owns a reference-counted
//! handle rather than borrowing the sink. When the `trace` feature is
//! **off**, every `Tracer` method compiles to nothing (zero overhead). When
//! **on**, each method performs a single `Option` branch before dispatching.
//!
//! # Crate features
//!
//! - `trace`: enables the `Tracer` method bodies (one branch per call).
//! - `trace-rich` (implies `trace`): gates the per-slot
//!   [`CopyRequestIssuedEvent`] and [`CopyResultEvent`] dispatch.

use alloc::rc::Rc;
use core::cell::RefCell;

use crate::copy_output::ResultDestination;
use crate::geometry::PixelSize;
use crate::gpu::AllocationError;
use crate::id::RenderPassId;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// What a copy result contributed to its slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CopyOutcome {
    /// Pixels were captured into the slot.
    Captured,
    /// The copy produced no pixels; the slot stays empty.
    Empty,
}

/// Why the "directive finished" notification fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FinishReason {
    /// The last pending copy request completed.
    Completed,
    /// No copy request was issued.
    NothingToCapture,
    /// The session was destroyed with requests still pending.
    SessionDestroyed,
    /// Placeholder results were filled in without copying.
    Placeholder,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when a session starts issuing copy requests.
#[derive(Clone, Copy, Debug)]
pub struct CaptureBeginEvent {
    /// Directive sequence id.
    pub sequence_id: u32,
    /// Number of shared elements in the directive.
    pub element_count: u32,
    /// Distinct render passes the directive references.
    pub expected_result_count: u32,
    /// Whether captures take the system-memory path.
    pub software: bool,
}

/// Emitted for each copy request issued against a render pass.
#[derive(Clone, Copy, Debug)]
pub struct CopyRequestIssuedEvent {
    /// Directive sequence id.
    pub sequence_id: u32,
    /// Slot the result will populate.
    pub slot: u32,
    /// Render pass being copied.
    pub render_pass: RenderPassId,
    /// Requested result location.
    pub destination: ResultDestination,
    /// Whether the copy targets a pre-allocated image.
    pub blit: bool,
}

/// Emitted when a copy result reaches its session.
#[derive(Clone, Copy, Debug)]
pub struct CopyResultEvent {
    /// Directive sequence id.
    pub sequence_id: u32,
    /// Slot the result belongs to.
    pub slot: u32,
    /// Whether the slot was populated.
    pub outcome: CopyOutcome,
    /// Size of the copied output (zero for empty results).
    pub size: PixelSize,
}

/// Emitted when a blit destination could not be allocated.
#[derive(Clone, Copy, Debug)]
pub struct BlitAllocationFailedEvent {
    /// Directive sequence id.
    pub sequence_id: u32,
    /// Slot that will stay empty.
    pub slot: u32,
    /// Render pass that was not copied.
    pub render_pass: RenderPassId,
    /// Allocator error.
    pub error: AllocationError,
}

/// Emitted when the "directive finished" notification fires.
#[derive(Clone, Copy, Debug)]
pub struct DirectiveFinishedEvent {
    /// Directive sequence id.
    pub sequence_id: u32,
    /// Why the notification fired.
    pub reason: FinishReason,
    /// Non-empty results received so far.
    pub valid_result_count: u32,
    /// Results needed for a valid capture.
    pub expected_result_count: u32,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from capture sessions.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a session starts issuing copy requests.
    fn on_capture_begin(&mut self, e: &CaptureBeginEvent) {
        _ = e;
    }

    /// Called when a blit destination could not be allocated.
    fn on_blit_allocation_failed(&mut self, e: &BlitAllocationFailedEvent) {
        _ = e;
    }

    /// Called when the "directive finished" notification fires.
    fn on_directive_finished(&mut self, e: &DirectiveFinishedEvent) {
        _ = e;
    }

    /// Called for each issued copy request (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    fn on_copy_request_issued(&mut self, e: &CopyRequestIssuedEvent) {
        _ = e;
    }

    /// Called for each copy result (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    fn on_copy_result(&mut self, e: &CopyResultEvent) {
        _ = e;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Shared handle to a [`TraceSink`].
pub type SharedTraceSink = Rc<RefCell<dyn TraceSink>>;

/// Thin wrapper around an optional shared [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing.
/// When **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink. Sinks must not call back into the session that
/// is emitting.
#[derive(Clone, Default)]
pub struct Tracer {
    #[cfg(feature = "trace")]
    sink: Option<SharedTraceSink>,
}

impl core::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl Tracer {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: SharedTraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {}
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Emits a [`CaptureBeginEvent`].
    #[inline]
    pub fn capture_begin(&self, e: &CaptureBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &self.sink {
            s.borrow_mut().on_capture_begin(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`BlitAllocationFailedEvent`].
    #[inline]
    pub fn blit_allocation_failed(&self, e: &BlitAllocationFailedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &self.sink {
            s.borrow_mut().on_blit_allocation_failed(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`DirectiveFinishedEvent`].
    #[inline]
    pub fn directive_finished(&self, e: &DirectiveFinishedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &self.sink {
            s.borrow_mut().on_directive_finished(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`CopyRequestIssuedEvent`] (dispatched with `trace-rich`).
    #[inline]
    pub fn copy_request_issued(&self, e: &CopyRequestIssuedEvent) {
        #[cfg(feature = "trace-rich")]
        if let Some(s) = &self.sink {
            s.borrow_mut().on_copy_request_issued(e);
        }
        #[cfg(not(feature = "trace-rich"))]
        {
            _ = e;
        }
    }

    /// Emits a [`CopyResultEvent`] (dispatched with `trace-rich`).
    #[inline]
    pub fn copy_result(&self, e: &CopyResultEvent) {
        #[cfg(feature = "trace-rich")]
        if let Some(s) = &self.sink {
            s.borrow_mut().on_copy_result(e);
        }
        #[cfg(not(feature = "trace-rich"))]
        {
            _ = e;
        }
    }
}

/// Clamps a count into an event field.
pub(crate) fn count_u32(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
