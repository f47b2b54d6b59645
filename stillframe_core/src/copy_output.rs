// Copyright 2026 the Stillframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Asynchronous copy-output requests and results.
//!
//! A [`CopyOutputRequest`] asks whoever owns a render pass to extract its
//! pixels; the answer comes back later as a [`CopyOutputResult`] through the
//! request's one-shot callback. The capture core treats the owner as a black
//! box and relies on two guarantees from this module:
//!
//! - every request completes exactly once, even if the owner drops it
//!   without answering (an empty result is delivered on drop), and
//! - when a result task runner is set, completion is posted to it instead
//!   of running inside [`send_result`](CopyOutputRequest::send_result).

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::geometry::PixelSize;
use crate::gpu::{ColorSpace, SyncToken};
use crate::id::SharedImageId;
use crate::release::ScopedRelease;
use crate::task::TaskRunner;

/// Pixel layout of a copy result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResultFormat {
    /// Interleaved 8-bit RGBA.
    #[default]
    Rgba,
    /// Planar YUV 4:2:0. Only available in system memory.
    I420,
}

/// Where a copy result's pixels live.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResultDestination {
    /// A CPU-accessible bitmap.
    #[default]
    SystemMemory,
    /// A GPU texture.
    NativeTextures,
}

/// Asks the copy to be written straight into a pre-allocated image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlitRequest {
    /// Destination image.
    pub destination: SharedImageId,
    /// Token to wait on before writing the destination.
    pub sync_token: SyncToken,
    /// Offset of the copied region inside the destination, in pixels.
    pub offset: (u32, u32),
}

/// Tightly packed RGBA8 pixels in row-major order.
#[derive(Clone, PartialEq, Eq)]
pub struct SoftwareBitmap {
    size: PixelSize,
    pixels: Vec<u8>,
}

impl fmt::Debug for SoftwareBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareBitmap")
            .field("size", &self.size)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

impl SoftwareBitmap {
    /// Wraps `pixels`, or returns `None` if the length doesn't match `size`.
    #[must_use]
    pub fn new(size: PixelSize, pixels: Vec<u8>) -> Option<Self> {
        let expected = usize::try_from(size.area().checked_mul(4)?).ok()?;
        (pixels.len() == expected).then_some(Self { size, pixels })
    }

    /// A bitmap with every pixel set to `rgba`.
    #[must_use]
    pub fn filled(size: PixelSize, rgba: [u8; 4]) -> Self {
        let count = usize::try_from(size.area()).unwrap_or(0);
        let texels = vec![rgba; count];
        Self {
            size,
            pixels: bytemuck::cast_slice::<[u8; 4], u8>(&texels).to_vec(),
        }
    }

    /// Dimensions.
    #[inline]
    #[must_use]
    pub fn size(&self) -> PixelSize {
        self.size
    }

    /// Raw bytes.
    #[inline]
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// The bytes viewed as RGBA texels.
    #[must_use]
    pub fn texels(&self) -> &[[u8; 4]] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// The texel at `(x, y)`, if inside the bitmap.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        let index = y as usize * self.size.width as usize + x as usize;
        self.texels().get(index).copied()
    }

    /// Consumes the bitmap, returning its bytes.
    #[must_use]
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}

/// A copy result backed by a GPU texture.
#[derive(Debug)]
pub struct TextureResult {
    /// The image holding the pixels.
    pub image: SharedImageId,
    /// Token to wait on before reading `image`.
    pub sync_token: SyncToken,
    /// Color space of the pixels.
    pub color_space: ColorSpace,
    /// Returns `image` to its allocator. Blit results carry
    /// [`ScopedRelease::none`]; the requester owns the destination.
    pub release: ScopedRelease,
}

/// The payload of a non-empty copy result.
#[derive(Debug)]
pub enum CopyOutputContent {
    /// CPU pixels.
    Bitmap(SoftwareBitmap),
    /// GPU texture.
    Texture(TextureResult),
}

/// The answer to a [`CopyOutputRequest`].
#[derive(Debug)]
pub struct CopyOutputResult {
    format: ResultFormat,
    destination: ResultDestination,
    size: PixelSize,
    content: Option<CopyOutputContent>,
}

impl CopyOutputResult {
    /// A result carrying no pixels.
    #[must_use]
    pub fn empty(format: ResultFormat, destination: ResultDestination) -> Self {
        Self {
            format,
            destination,
            size: PixelSize::default(),
            content: None,
        }
    }

    /// A system-memory RGBA result.
    #[must_use]
    pub fn from_bitmap(bitmap: SoftwareBitmap) -> Self {
        Self {
            format: ResultFormat::Rgba,
            destination: ResultDestination::SystemMemory,
            size: bitmap.size(),
            content: Some(CopyOutputContent::Bitmap(bitmap)),
        }
    }

    /// A native-texture RGBA result of the given size.
    #[must_use]
    pub fn from_texture(size: PixelSize, texture: TextureResult) -> Self {
        Self {
            format: ResultFormat::Rgba,
            destination: ResultDestination::NativeTextures,
            size,
            content: Some(CopyOutputContent::Texture(texture)),
        }
    }

    /// Returns `true` if no pixels were produced.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_none() || self.size.is_empty()
    }

    /// Pixel layout.
    #[inline]
    #[must_use]
    pub fn format(&self) -> ResultFormat {
        self.format
    }

    /// Where the pixels live.
    #[inline]
    #[must_use]
    pub fn destination(&self) -> ResultDestination {
        self.destination
    }

    /// Size of the copied region.
    #[inline]
    #[must_use]
    pub fn size(&self) -> PixelSize {
        self.size
    }

    /// Consumes the result, returning its payload.
    #[must_use]
    pub fn into_content(self) -> Option<CopyOutputContent> {
        self.content
    }
}

/// One-shot completion for a [`CopyOutputRequest`].
pub type CopyOutputCallback = Box<dyn FnOnce(CopyOutputResult)>;

/// A request to copy a render pass's output.
pub struct CopyOutputRequest {
    format: ResultFormat,
    destination: ResultDestination,
    blit: Option<BlitRequest>,
    result_task_runner: Option<Rc<dyn TaskRunner>>,
    callback: Option<CopyOutputCallback>,
}

impl fmt::Debug for CopyOutputRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyOutputRequest")
            .field("format", &self.format)
            .field("destination", &self.destination)
            .field("blit", &self.blit)
            .field("result_task_runner", &self.result_task_runner.is_some())
            .field("sent", &self.callback.is_none())
            .finish()
    }
}

impl CopyOutputRequest {
    /// Creates a request whose result is handed to `callback`.
    ///
    /// # Panics
    ///
    /// Panics if `format` is [`ResultFormat::I420`] with
    /// [`ResultDestination::NativeTextures`].
    #[must_use]
    pub fn new(
        format: ResultFormat,
        destination: ResultDestination,
        callback: CopyOutputCallback,
    ) -> Self {
        assert!(
            !(format == ResultFormat::I420 && destination == ResultDestination::NativeTextures),
            "I420 copy results are only available in system memory"
        );
        Self {
            format,
            destination,
            blit: None,
            result_task_runner: None,
            callback: Some(callback),
        }
    }

    /// Requested pixel layout.
    #[inline]
    #[must_use]
    pub fn result_format(&self) -> ResultFormat {
        self.format
    }

    /// Requested result location.
    #[inline]
    #[must_use]
    pub fn result_destination(&self) -> ResultDestination {
        self.destination
    }

    /// Directs the copy into a pre-allocated image.
    pub fn set_blit_request(&mut self, blit: BlitRequest) {
        self.blit = Some(blit);
    }

    /// The pre-allocated destination, if any.
    #[inline]
    #[must_use]
    pub fn blit_request(&self) -> Option<&BlitRequest> {
        self.blit.as_ref()
    }

    /// Posts the completion to `runner` instead of running it inline.
    pub fn set_result_task_runner(&mut self, runner: Rc<dyn TaskRunner>) {
        self.result_task_runner = Some(runner);
    }

    /// Returns `true` if a result task runner is set.
    #[inline]
    #[must_use]
    pub fn has_result_task_runner(&self) -> bool {
        self.result_task_runner.is_some()
    }

    /// Delivers `result`, consuming the request.
    pub fn send_result(mut self, result: CopyOutputResult) {
        if let Some(callback) = self.callback.take() {
            deliver(self.result_task_runner.take(), callback, result);
        }
    }
}

impl Drop for CopyOutputRequest {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            let result = CopyOutputResult::empty(self.format, self.destination);
            deliver(self.result_task_runner.take(), callback, result);
        }
    }
}

fn deliver(
    runner: Option<Rc<dyn TaskRunner>>,
    callback: CopyOutputCallback,
    result: CopyOutputResult,
) {
    match runner {
        Some(runner) => runner.post_task(Box::new(move || callback(result))),
        None => callback(result),
    }
}

#[cfg(test)]
mod tests {
    use core::cell::RefCell;

    use super::*;
    use crate::task::ManualTaskRunner;

    fn capture_into(slot: &Rc<RefCell<Option<CopyOutputResult>>>) -> CopyOutputCallback {
        let slot = Rc::clone(slot);
        Box::new(move |result| *slot.borrow_mut() = Some(result))
    }

    #[test]
    fn send_result_without_runner_is_inline() {
        let slot = Rc::new(RefCell::new(None));
        let request = CopyOutputRequest::new(
            ResultFormat::Rgba,
            ResultDestination::SystemMemory,
            capture_into(&slot),
        );
        let bitmap = SoftwareBitmap::filled(PixelSize::new(2, 2), [1, 2, 3, 4]);
        request.send_result(CopyOutputResult::from_bitmap(bitmap));
        let result = slot.borrow_mut().take().expect("delivered inline");
        assert!(!result.is_empty());
        assert_eq!(result.size(), PixelSize::new(2, 2));
    }

    #[test]
    fn send_result_posts_to_runner() {
        let runner = Rc::new(ManualTaskRunner::new());
        let slot = Rc::new(RefCell::new(None));
        let mut request = CopyOutputRequest::new(
            ResultFormat::Rgba,
            ResultDestination::SystemMemory,
            capture_into(&slot),
        );
        request.set_result_task_runner(runner.clone());
        request.send_result(CopyOutputResult::from_bitmap(SoftwareBitmap::filled(
            PixelSize::new(1, 1),
            [0; 4],
        )));
        assert!(slot.borrow().is_none());
        assert_eq!(runner.run_until_idle(), 1);
        assert!(slot.borrow().is_some());
    }

    #[test]
    fn dropped_request_completes_empty() {
        let slot = Rc::new(RefCell::new(None));
        let request = CopyOutputRequest::new(
            ResultFormat::Rgba,
            ResultDestination::NativeTextures,
            capture_into(&slot),
        );
        drop(request);
        let result = slot.borrow_mut().take().expect("completed on drop");
        assert!(result.is_empty());
        assert_eq!(result.destination(), ResultDestination::NativeTextures);
    }

    #[test]
    #[should_panic(expected = "I420 copy results are only available in system memory")]
    fn i420_textures_are_rejected() {
        let _request = CopyOutputRequest::new(
            ResultFormat::I420,
            ResultDestination::NativeTextures,
            Box::new(|_| {}),
        );
    }

    #[test]
    fn bitmap_rejects_mismatched_length() {
        assert!(SoftwareBitmap::new(PixelSize::new(2, 2), vec![0; 15]).is_none());
        let bitmap = SoftwareBitmap::new(PixelSize::new(2, 1), vec![1, 2, 3, 4, 5, 6, 7, 8])
            .expect("length matches");
        assert_eq!(bitmap.pixel(1, 0), Some([5, 6, 7, 8]));
        assert_eq!(bitmap.pixel(2, 0), None);
    }

    #[test]
    fn zero_sized_content_counts_as_empty() {
        let result = CopyOutputResult::from_bitmap(SoftwareBitmap::filled(
            PixelSize::new(0, 4),
            [0; 4],
        ));
        assert!(result.is_empty());
    }
}
