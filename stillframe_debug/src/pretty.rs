// Copyright 2026 the Stillframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr).

use std::io::Write;

use stillframe_core::copy_output::ResultDestination;
use stillframe_core::trace::{
    BlitAllocationFailedEvent, CaptureBeginEvent, CopyOutcome, CopyRequestIssuedEvent,
    CopyResultEvent, DirectiveFinishedEvent, FinishReason, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self { writer }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the sink and returns its writer.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn destination_name(destination: ResultDestination) -> &'static str {
    match destination {
        ResultDestination::SystemMemory => "memory",
        ResultDestination::NativeTextures => "texture",
    }
}

fn reason_name(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Completed => "completed",
        FinishReason::NothingToCapture => "nothing-to-capture",
        FinishReason::SessionDestroyed => "destroyed",
        FinishReason::Placeholder => "placeholder",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_capture_begin(&mut self, e: &CaptureBeginEvent) {
        let path = if e.software { "software" } else { "hardware" };
        let _ = writeln!(
            self.writer,
            "[capture] seq={} elements={} expected={} path={path}",
            e.sequence_id, e.element_count, e.expected_result_count,
        );
    }

    fn on_blit_allocation_failed(&mut self, e: &BlitAllocationFailedEvent) {
        let _ = writeln!(
            self.writer,
            "[blit:failed] seq={} slot={} pass={} error=\"{}\"",
            e.sequence_id, e.slot, e.render_pass.0, e.error,
        );
    }

    fn on_directive_finished(&mut self, e: &DirectiveFinishedEvent) {
        let verdict = if e.valid_result_count == e.expected_result_count {
            "valid"
        } else {
            "INVALID"
        };
        let _ = writeln!(
            self.writer,
            "[finished] seq={} reason={} results={}/{} {verdict}",
            e.sequence_id,
            reason_name(e.reason),
            e.valid_result_count,
            e.expected_result_count,
        );
    }

    fn on_copy_request_issued(&mut self, e: &CopyRequestIssuedEvent) {
        let blit = if e.blit { " blit" } else { "" };
        let _ = writeln!(
            self.writer,
            "[copy:request] seq={} slot={} pass={} dest={}{blit}",
            e.sequence_id,
            e.slot,
            e.render_pass.0,
            destination_name(e.destination),
        );
    }

    fn on_copy_result(&mut self, e: &CopyResultEvent) {
        match e.outcome {
            CopyOutcome::Captured => {
                let _ = writeln!(
                    self.writer,
                    "[copy:result] seq={} slot={} captured {}x{}",
                    e.sequence_id, e.slot, e.size.width, e.size.height,
                );
            }
            CopyOutcome::Empty => {
                let _ = writeln!(
                    self.writer,
                    "[copy:result] seq={} slot={} EMPTY",
                    e.sequence_id, e.slot,
                );
            }
        }
    }
}
