// Copyright 2026 the Stillframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][format] JSON to the given writer.
//!
//! Each directive becomes an async slice keyed by its sequence id, from
//! capture begin to the finished notification. Per-slot events are instants
//! inside it.
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use crate::recorder::{RecordedEvent, decode};

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();

    for timed in decode(bytes) {
        let ts = nanos_to_us(timed.at_nanos);
        match timed.event {
            RecordedEvent::CaptureBegin(e) => {
                events.push(json!({
                    "ph": "b",
                    "name": "SavedFrame",
                    "cat": "Capture",
                    "id": e.sequence_id,
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "args": {
                        "element_count": e.element_count,
                        "expected_result_count": e.expected_result_count,
                        "software": e.software,
                    }
                }));
            }
            RecordedEvent::CopyRequestIssued(e) => {
                events.push(json!({
                    "ph": "n",
                    "name": "CopyRequest",
                    "cat": "Capture",
                    "id": e.sequence_id,
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "args": {
                        "slot": e.slot,
                        "render_pass": e.render_pass.0,
                        "destination": format!("{:?}", e.destination),
                        "blit": e.blit,
                    }
                }));
            }
            RecordedEvent::CopyResult(e) => {
                events.push(json!({
                    "ph": "n",
                    "name": "CopyResult",
                    "cat": "Capture",
                    "id": e.sequence_id,
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "args": {
                        "slot": e.slot,
                        "outcome": format!("{:?}", e.outcome),
                        "width": e.size.width,
                        "height": e.size.height,
                    }
                }));
            }
            RecordedEvent::BlitAllocationFailed(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "BlitAllocationFailed",
                    "cat": "Allocation",
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "s": "t",
                    "args": {
                        "sequence_id": e.sequence_id,
                        "slot": e.slot,
                        "render_pass": e.render_pass.0,
                        "error": e.error.to_string(),
                    }
                }));
            }
            RecordedEvent::DirectiveFinished(e) => {
                events.push(json!({
                    "ph": "e",
                    "name": "SavedFrame",
                    "cat": "Capture",
                    "id": e.sequence_id,
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "args": {
                        "reason": format!("{:?}", e.reason),
                        "valid_result_count": e.valid_result_count,
                        "expected_result_count": e.expected_result_count,
                    }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

#[expect(
    clippy::cast_precision_loss,
    reason = "trace timestamps stay far below 2^53 ns"
)]
fn nanos_to_us(nanos: u64) -> f64 {
    nanos as f64 / 1000.0
}
