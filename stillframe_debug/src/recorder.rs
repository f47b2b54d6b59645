// Copyright 2026 the Stillframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records, each stamped with the
//! nanoseconds elapsed since the recorder was created. [`decode`] reads them
//! back as an iterator of [`TimedEvent`].

use std::time::Instant;

use stillframe_core::copy_output::ResultDestination;
use stillframe_core::geometry::PixelSize;
use stillframe_core::gpu::{AllocationError, SharedImageFormat};
use stillframe_core::id::RenderPassId;
use stillframe_core::trace::{
    BlitAllocationFailedEvent, CaptureBeginEvent, CopyOutcome, CopyRequestIssuedEvent,
    CopyResultEvent, DirectiveFinishedEvent, FinishReason, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_CAPTURE_BEGIN: u8 = 1;
const TAG_COPY_REQUEST_ISSUED: u8 = 2;
const TAG_COPY_RESULT: u8 = 3;
const TAG_BLIT_ALLOCATION_FAILED: u8 = 4;
const TAG_DIRECTIVE_FINISHED: u8 = 5;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug)]
pub struct RecorderSink {
    buf: Vec<u8>,
    origin: Instant,
}

impl Default for RecorderSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecorderSink {
    /// Creates an empty recorder. Timestamps count from now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            origin: Instant::now(),
        }
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn begin_record(&mut self, tag: u8) {
        let elapsed = u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.write_u8(tag);
        self.write_u64(elapsed);
    }

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    fn write_size(&mut self, size: PixelSize) {
        self.write_u32(size.width);
        self.write_u32(size.height);
    }

    fn write_destination(&mut self, d: ResultDestination) {
        self.write_u8(match d {
            ResultDestination::SystemMemory => 0,
            ResultDestination::NativeTextures => 1,
        });
    }

    fn write_outcome(&mut self, o: CopyOutcome) {
        self.write_u8(match o {
            CopyOutcome::Captured => 0,
            CopyOutcome::Empty => 1,
        });
    }

    fn write_reason(&mut self, r: FinishReason) {
        self.write_u8(match r {
            FinishReason::Completed => 0,
            FinishReason::NothingToCapture => 1,
            FinishReason::SessionDestroyed => 2,
            FinishReason::Placeholder => 3,
        });
    }

    /// Errors are stored as a kind byte plus a size-shaped payload.
    fn write_allocation_error(&mut self, e: AllocationError) {
        let (kind, payload) = match e {
            AllocationError::EmptySize => (0, PixelSize::default()),
            AllocationError::TooLarge(size) => (1, size),
            AllocationError::UnsupportedFormat(format) => {
                let format = match format {
                    SharedImageFormat::Rgba8 => 0,
                    SharedImageFormat::Bgra8 => 1,
                };
                (2, PixelSize::new(format, 0))
            }
            AllocationError::OutOfMemory => (3, PixelSize::default()),
            AllocationError::ContextLost => (4, PixelSize::default()),
        };
        self.write_u8(kind);
        self.write_size(payload);
    }
}

impl TraceSink for RecorderSink {
    fn on_capture_begin(&mut self, e: &CaptureBeginEvent) {
        self.begin_record(TAG_CAPTURE_BEGIN);
        self.write_u32(e.sequence_id);
        self.write_u32(e.element_count);
        self.write_u32(e.expected_result_count);
        self.write_bool(e.software);
    }

    fn on_blit_allocation_failed(&mut self, e: &BlitAllocationFailedEvent) {
        self.begin_record(TAG_BLIT_ALLOCATION_FAILED);
        self.write_u32(e.sequence_id);
        self.write_u32(e.slot);
        self.write_u64(e.render_pass.0);
        self.write_allocation_error(e.error);
    }

    fn on_directive_finished(&mut self, e: &DirectiveFinishedEvent) {
        self.begin_record(TAG_DIRECTIVE_FINISHED);
        self.write_u32(e.sequence_id);
        self.write_reason(e.reason);
        self.write_u32(e.valid_result_count);
        self.write_u32(e.expected_result_count);
    }

    fn on_copy_request_issued(&mut self, e: &CopyRequestIssuedEvent) {
        self.begin_record(TAG_COPY_REQUEST_ISSUED);
        self.write_u32(e.sequence_id);
        self.write_u32(e.slot);
        self.write_u64(e.render_pass.0);
        self.write_destination(e.destination);
        self.write_bool(e.blit);
    }

    fn on_copy_result(&mut self, e: &CopyResultEvent) {
        self.begin_record(TAG_COPY_RESULT);
        self.write_u32(e.sequence_id);
        self.write_u32(e.slot);
        self.write_outcome(e.outcome);
        self.write_size(e.size);
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug)]
pub enum RecordedEvent {
    /// A [`CaptureBeginEvent`].
    CaptureBegin(CaptureBeginEvent),
    /// A [`CopyRequestIssuedEvent`].
    CopyRequestIssued(CopyRequestIssuedEvent),
    /// A [`CopyResultEvent`].
    CopyResult(CopyResultEvent),
    /// A [`BlitAllocationFailedEvent`].
    BlitAllocationFailed(BlitAllocationFailedEvent),
    /// A [`DirectiveFinishedEvent`].
    DirectiveFinished(DirectiveFinishedEvent),
}

impl RecordedEvent {
    /// Sequence id of the directive the event belongs to.
    #[must_use]
    pub fn sequence_id(&self) -> u32 {
        match self {
            Self::CaptureBegin(e) => e.sequence_id,
            Self::CopyRequestIssued(e) => e.sequence_id,
            Self::CopyResult(e) => e.sequence_id,
            Self::BlitAllocationFailed(e) => e.sequence_id,
            Self::DirectiveFinished(e) => e.sequence_id,
        }
    }
}

/// A decoded event and when it was recorded.
#[derive(Clone, Debug)]
pub struct TimedEvent {
    /// Nanoseconds since the recorder was created.
    pub at_nanos: u64,
    /// The event.
    pub event: RecordedEvent,
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`TimedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?;
        self.pos += N;
        bytes.try_into().ok()
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.read_array::<1>().map(|[v]| v)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    fn read_bool(&mut self) -> Option<bool> {
        Some(self.read_u8()? != 0)
    }

    fn read_size(&mut self) -> Option<PixelSize> {
        Some(PixelSize::new(self.read_u32()?, self.read_u32()?))
    }

    fn read_destination(&mut self) -> Option<ResultDestination> {
        Some(match self.read_u8()? {
            0 => ResultDestination::SystemMemory,
            _ => ResultDestination::NativeTextures,
        })
    }

    fn read_outcome(&mut self) -> Option<CopyOutcome> {
        Some(match self.read_u8()? {
            0 => CopyOutcome::Captured,
            _ => CopyOutcome::Empty,
        })
    }

    fn read_reason(&mut self) -> Option<FinishReason> {
        Some(match self.read_u8()? {
            0 => FinishReason::Completed,
            1 => FinishReason::NothingToCapture,
            2 => FinishReason::SessionDestroyed,
            _ => FinishReason::Placeholder,
        })
    }

    fn read_allocation_error(&mut self) -> Option<AllocationError> {
        let kind = self.read_u8()?;
        let payload = self.read_size()?;
        Some(match kind {
            0 => AllocationError::EmptySize,
            1 => AllocationError::TooLarge(payload),
            2 => AllocationError::UnsupportedFormat(if payload.width == 0 {
                SharedImageFormat::Rgba8
            } else {
                SharedImageFormat::Bgra8
            }),
            3 => AllocationError::OutOfMemory,
            _ => AllocationError::ContextLost,
        })
    }

    fn decode_capture_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::CaptureBegin(CaptureBeginEvent {
            sequence_id: self.read_u32()?,
            element_count: self.read_u32()?,
            expected_result_count: self.read_u32()?,
            software: self.read_bool()?,
        }))
    }

    fn decode_copy_request_issued(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::CopyRequestIssued(CopyRequestIssuedEvent {
            sequence_id: self.read_u32()?,
            slot: self.read_u32()?,
            render_pass: RenderPassId(self.read_u64()?),
            destination: self.read_destination()?,
            blit: self.read_bool()?,
        }))
    }

    fn decode_copy_result(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::CopyResult(CopyResultEvent {
            sequence_id: self.read_u32()?,
            slot: self.read_u32()?,
            outcome: self.read_outcome()?,
            size: self.read_size()?,
        }))
    }

    fn decode_blit_allocation_failed(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::BlitAllocationFailed(
            BlitAllocationFailedEvent {
                sequence_id: self.read_u32()?,
                slot: self.read_u32()?,
                render_pass: RenderPassId(self.read_u64()?),
                error: self.read_allocation_error()?,
            },
        ))
    }

    fn decode_directive_finished(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::DirectiveFinished(DirectiveFinishedEvent {
            sequence_id: self.read_u32()?,
            reason: self.read_reason()?,
            valid_result_count: self.read_u32()?,
            expected_result_count: self.read_u32()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = TimedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        let at_nanos = self.read_u64()?;
        let event = match tag {
            TAG_CAPTURE_BEGIN => self.decode_capture_begin(),
            TAG_COPY_REQUEST_ISSUED => self.decode_copy_request_issued(),
            TAG_COPY_RESULT => self.decode_copy_result(),
            TAG_BLIT_ALLOCATION_FAILED => self.decode_blit_allocation_failed(),
            TAG_DIRECTIVE_FINISHED => self.decode_directive_finished(),
            _ => None, // unknown tag → stop iteration
        }?;
        Some(TimedEvent { at_nanos, event })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use stillframe_core::config::CaptureConfig;
    use stillframe_core::directive::{SharedElement, TransitionDirective};
    use stillframe_core::frame::RenderPass;
    use stillframe_core::id::ElementResourceId;
    use stillframe_core::saved_frame::SavedFrame;
    use stillframe_core::task::ManualTaskRunner;
    use stillframe_core::testing::{FakeFrame, RecordingSharedImages};
    use stillframe_core::trace::Tracer;

    use super::*;

    #[test]
    fn records_a_software_capture() {
        let recorder = Rc::new(RefCell::new(RecorderSink::new()));
        let runner = Rc::new(ManualTaskRunner::new());
        let finished = Rc::new(Cell::new(false));
        let flag = Rc::clone(&finished);
        let directive = TransitionDirective::new(
            42,
            vec![
                SharedElement::new(RenderPassId(1), ElementResourceId(10)),
                SharedElement::empty(ElementResourceId(11)),
            ],
        );
        let mut session = SavedFrame::new(
            directive,
            Box::new(move || flag.set(true)),
            runner.clone(),
            None,
            CaptureConfig::new(),
        )
        .with_tracer(Tracer::new(recorder.clone()));

        let mut frame = FakeFrame::new(vec![RenderPass::new(RenderPassId(1), 6.0, 3.0)]);
        session.begin_capture(&mut frame);
        frame.complete_all();
        runner.run_until_idle();
        assert!(finished.get());
        drop(session);

        let bytes = recorder.borrow().as_bytes().to_vec();
        let events: Vec<_> = decode(&bytes).collect();
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|t| t.event.sequence_id() == 42));
        assert!(events.windows(2).all(|w| w[0].at_nanos <= w[1].at_nanos));

        match &events[0].event {
            RecordedEvent::CaptureBegin(e) => {
                assert_eq!(e.element_count, 2);
                assert_eq!(e.expected_result_count, 1);
                assert!(e.software);
            }
            other => panic!("expected CaptureBegin, got {other:?}"),
        }
        match &events[1].event {
            RecordedEvent::CopyRequestIssued(e) => {
                assert_eq!(e.slot, 0);
                assert_eq!(e.render_pass, RenderPassId(1));
                assert_eq!(e.destination, ResultDestination::SystemMemory);
                assert!(!e.blit);
            }
            other => panic!("expected CopyRequestIssued, got {other:?}"),
        }
        match &events[2].event {
            RecordedEvent::CopyResult(e) => {
                assert_eq!(e.outcome, CopyOutcome::Captured);
                assert_eq!(e.size, PixelSize::new(6, 3));
            }
            other => panic!("expected CopyResult, got {other:?}"),
        }
        match &events[3].event {
            RecordedEvent::DirectiveFinished(e) => {
                assert_eq!(e.reason, FinishReason::Completed);
                assert_eq!(e.valid_result_count, 1);
                assert_eq!(e.expected_result_count, 1);
            }
            other => panic!("expected DirectiveFinished, got {other:?}"),
        }
    }

    #[test]
    fn records_allocation_failure_and_early_finish() {
        let recorder = Rc::new(RefCell::new(RecorderSink::new()));
        let runner = Rc::new(ManualTaskRunner::new());
        let images = Rc::new(RecordingSharedImages::new());
        images.set_fail_allocations(true);
        let directive = TransitionDirective::new(
            7,
            vec![SharedElement::new(RenderPassId(3), ElementResourceId(1))],
        );
        let mut session = SavedFrame::new(
            directive,
            Box::new(|| {}),
            runner.clone(),
            Some(images),
            CaptureConfig::new(),
        )
        .with_tracer(Tracer::new(recorder.clone()));
        let mut frame = FakeFrame::new(vec![RenderPass::new(RenderPassId(3), 4.0, 4.0)]);
        session.begin_capture(&mut frame);
        runner.run_until_idle();

        let kinds: Vec<_> = decode(recorder.borrow().as_bytes())
            .map(|t| t.event)
            .collect();
        assert_eq!(kinds.len(), 3);
        assert!(matches!(
            kinds[1],
            RecordedEvent::BlitAllocationFailed(BlitAllocationFailedEvent {
                slot: 0,
                error: AllocationError::OutOfMemory,
                ..
            })
        ));
        assert!(matches!(
            kinds[2],
            RecordedEvent::DirectiveFinished(DirectiveFinishedEvent {
                reason: FinishReason::NothingToCapture,
                valid_result_count: 0,
                ..
            })
        ));
    }

    #[test]
    fn allocation_errors_survive_recording() {
        let mut rec = RecorderSink::new();
        for error in [
            AllocationError::TooLarge(PixelSize::new(20_000, 3)),
            AllocationError::UnsupportedFormat(SharedImageFormat::Bgra8),
            AllocationError::ContextLost,
        ] {
            rec.on_blit_allocation_failed(&BlitAllocationFailedEvent {
                sequence_id: 1,
                slot: 2,
                render_pass: RenderPassId(9),
                error,
            });
        }
        let errors: Vec<_> = decode(rec.as_bytes())
            .filter_map(|t| match t.event {
                RecordedEvent::BlitAllocationFailed(e) => Some(e.error),
                _ => None,
            })
            .collect();
        assert_eq!(
            errors,
            [
                AllocationError::TooLarge(PixelSize::new(20_000, 3)),
                AllocationError::UnsupportedFormat(SharedImageFormat::Bgra8),
                AllocationError::ContextLost,
            ]
        );
    }

    #[test]
    fn truncated_record_stops_decoding() {
        let mut rec = RecorderSink::new();
        rec.on_directive_finished(&DirectiveFinishedEvent {
            sequence_id: 1,
            reason: FinishReason::SessionDestroyed,
            valid_result_count: 0,
            expected_result_count: 2,
        });
        let bytes = rec.into_bytes();
        assert_eq!(decode(&bytes).count(), 1);
        assert_eq!(decode(&bytes[..bytes.len() - 1]).count(), 0);
    }

    #[test]
    fn empty_buffer_decodes_to_nothing() {
        let events: Vec<_> = decode(&[]).collect();
        assert!(events.is_empty());
    }
}
