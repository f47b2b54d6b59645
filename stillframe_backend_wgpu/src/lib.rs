// Copyright 2026 the Stillframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! wgpu backend for stillframe capture.
//!
//! - [`WgpuSharedImages`] allocates shared images as wgpu textures and hands
//!   out sync tokens that advance with each queue submission.
//! - [`WgpuFrame`] exposes a set of textures as render passes. Copy requests
//!   issued against it are encoded and answered on [`WgpuFrame::flush`].
//!
//! ```text
//!   SavedFrame::begin_capture(&mut frame)
//!       │  requests queue on the frame
//!       ▼
//!   frame.flush() ──► copy_texture_to_texture / copy_texture_to_buffer
//!       │              queue.submit, device.poll
//!       ▼
//!   CopyOutputResult per request ──► result TaskRunner ──► SavedFrame slots
//! ```
//!
//! Everything runs on the thread that owns the device; `flush` blocks until
//! readbacks are mapped.

mod frame;
mod shared_images;
#[cfg(test)]
mod test_device;

pub use frame::WgpuFrame;
pub use shared_images::WgpuSharedImages;
