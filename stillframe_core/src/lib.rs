// Copyright 2026 the Stillframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Saved-frame capture of compositor render passes for visual transitions.
//!
//! `stillframe_core` snapshots the render passes that draw a set of shared
//! elements so a transition can animate from the old frame's pixels. It is
//! `no_std` compatible (with `alloc`) and never touches a GPU API directly:
//! copies go through a [`CopyOutputSource`](frame::CopyOutputSource), images
//! through a [`SharedImageInterface`](gpu::SharedImageInterface), and
//! deferred work through a [`TaskRunner`](task::TaskRunner).
//!
//! # Architecture
//!
//! ```text
//!   TransitionDirective ──► SavedFrame::begin_capture(source)
//!                                   │
//!                                   │ one CopyOutputRequest per
//!                                   │ (render pass, shared element)
//!                                   ▼
//!   CopyOutputSource ──► CopyOutputResult ──► TaskRunner ──► slot N
//!                                                              │
//!                 ┌────────────────────────────────────────────┘
//!                 ▼
//!   FrameResult { shared_results, empty_resource_ids } ──► consumer
//! ```
//!
//! **[`directive`]**: What to capture: shared elements in slot order, each
//! naming the render pass that draws it (or none).
//!
//! **[`saved_frame`]**: The capture session. Issues requests, collects
//! results in any order, and fires a one-shot "directive finished"
//! notification.
//!
//! **[`copy_output`]**: The request/result channel. A request always
//! completes exactly once, empty if its owner drops it.
//!
//! **[`result`]**: Per-slot captured elements that own their GPU release
//! obligations.
//!
//! **[`gpu`]** and **[`release`]**: Shared image allocation, sync tokens,
//! and move-only release callbacks.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! capture instrumentation, with zero-overhead [`Tracer`](trace::Tracer)
//! wrapper.
//!
//! # Threading
//!
//! Everything here lives on one sequence. Shared state uses `Rc`/`RefCell`,
//! and completions hop through the injected [`TaskRunner`](task::TaskRunner)
//! rather than running inside the caller that produced them.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//! - `trace-rich` (disabled by default, implies `trace`): Gates per-slot copy
//!   request and result events.
//! - `test-helpers` (disabled by default): Exposes the [`testing`] fakes and
//!   [`SavedFrame::complete_with_placeholder_results`](saved_frame::SavedFrame::complete_with_placeholder_results).

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod config;
pub mod copy_output;
pub mod directive;
pub mod frame;
pub mod geometry;
pub mod gpu;
pub mod id;
pub mod release;
pub mod result;
pub mod saved_frame;
pub mod task;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;
pub mod trace;
