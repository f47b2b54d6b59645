// Copyright 2026 the Stillframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Copy-output source over wgpu textures.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::mpsc;

use kurbo::{Affine, Rect};
use stillframe_core::copy_output::{
    CopyOutputRequest, CopyOutputResult, ResultDestination, ResultFormat, SoftwareBitmap,
    TextureResult,
};
use stillframe_core::frame::{CopyOutputSource, RenderPass};
use stillframe_core::geometry::PixelSize;
use stillframe_core::gpu::{
    ColorSpace, SharedImageDescriptor, SharedImageFormat, SharedImageInterface, SharedImageUsage,
};
use stillframe_core::id::{RenderPassId, SharedImageId};
use stillframe_core::release::ScopedRelease;

use crate::shared_images::WgpuSharedImages;

/// A copy encoded into the command buffer, waiting for submission.
enum EncodedCopy {
    Texture {
        image: SharedImageId,
        color_space: ColorSpace,
        release: ScopedRelease,
    },
    Readback {
        buffer: wgpu::Buffer,
        padded_row_bytes: u32,
        swizzle: bool,
    },
}

struct InFlightCopy {
    request: CopyOutputRequest,
    size: PixelSize,
    copy: EncodedCopy,
}

/// A [`CopyOutputSource`] whose render passes are wgpu textures.
///
/// Requests queue up until [`flush`](Self::flush), which encodes every copy
/// into one command buffer, submits it, waits for readbacks, and answers the
/// requests in issue order. Requests that cannot be serviced (unknown pass,
/// texture without `COPY_SRC`, unsupported format, failed allocation)
/// complete empty.
pub struct WgpuFrame {
    device: wgpu::Device,
    queue: wgpu::Queue,
    images: Rc<WgpuSharedImages>,
    passes: Vec<RenderPass>,
    textures: HashMap<RenderPassId, wgpu::Texture>,
    pending: Vec<(RenderPassId, CopyOutputRequest)>,
}

impl std::fmt::Debug for WgpuFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuFrame")
            .field("passes", &self.passes)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl WgpuFrame {
    /// Creates an empty frame. Texture results are allocated from `images`.
    #[must_use]
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, images: Rc<WgpuSharedImages>) -> Self {
        Self {
            device,
            queue,
            images,
            passes: Vec::new(),
            textures: HashMap::new(),
            pending: Vec::new(),
        }
    }

    /// Adds (or replaces) the render pass `id`, drawn into `texture`.
    pub fn add_render_pass(
        &mut self,
        id: RenderPassId,
        texture: wgpu::Texture,
        transform_to_root_target: Affine,
    ) {
        let pass = RenderPass {
            id,
            output_rect: Rect::new(
                0.0,
                0.0,
                f64::from(texture.width()),
                f64::from(texture.height()),
            ),
            transform_to_root_target,
            format: shared_image_format(texture.format()).unwrap_or_default(),
        };
        self.passes.retain(|existing| existing.id != id);
        self.passes.push(pass);
        self.textures.insert(id, texture);
    }

    /// Ends the frame. Requests not yet flushed complete empty.
    pub fn clear(&mut self) {
        self.passes.clear();
        self.textures.clear();
        for (_, request) in self.pending.drain(..) {
            send_empty(request);
        }
    }

    /// Number of requests waiting for [`flush`](Self::flush).
    #[must_use]
    pub fn pending_request_count(&self) -> usize {
        self.pending.len()
    }

    /// Executes every queued copy and answers its request.
    ///
    /// Blocks until readbacks are mapped. Returns the number of requests
    /// answered.
    pub fn flush(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending);
        let answered = pending.len();
        if pending.is_empty() {
            return 0;
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("stillframe copy output"),
            });
        let mut in_flight = Vec::with_capacity(pending.len());
        for (render_pass_id, request) in pending {
            match self.encode_copy(&mut encoder, render_pass_id, &request) {
                Some((size, copy)) => in_flight.push(InFlightCopy {
                    request,
                    size,
                    copy,
                }),
                None => send_empty(request),
            }
        }
        if in_flight.is_empty() {
            return answered;
        }

        self.queue.submit([encoder.finish()]);
        let sync_token = self.images.generate_sync_token();

        let (sender, receiver) = mpsc::channel();
        let mut readbacks = 0_usize;
        for (index, flight) in in_flight.iter().enumerate() {
            if let EncodedCopy::Readback { buffer, .. } = &flight.copy {
                let sender = sender.clone();
                buffer
                    .slice(..)
                    .map_async(wgpu::MapMode::Read, move |result| {
                        _ = sender.send((index, result.is_ok()));
                    });
                readbacks += 1;
            }
        }
        drop(sender);

        let mut mapped = vec![false; in_flight.len()];
        if readbacks > 0
            && self
                .device
                .poll(wgpu::PollType::wait_indefinitely())
                .is_ok()
        {
            for (index, ok) in receiver.try_iter() {
                mapped[index] = ok;
            }
        }

        for (index, flight) in in_flight.into_iter().enumerate() {
            let InFlightCopy {
                request,
                size,
                copy,
            } = flight;
            let result = match copy {
                EncodedCopy::Texture {
                    image,
                    color_space,
                    mut release,
                } => {
                    release.update_sync_token(sync_token);
                    CopyOutputResult::from_texture(
                        size,
                        TextureResult {
                            image,
                            sync_token,
                            color_space,
                            release,
                        },
                    )
                }
                EncodedCopy::Readback {
                    buffer,
                    padded_row_bytes,
                    swizzle,
                } => match mapped[index]
                    .then(|| read_bitmap(&buffer, size, padded_row_bytes, swizzle))
                    .flatten()
                {
                    Some(bitmap) => CopyOutputResult::from_bitmap(bitmap),
                    None => {
                        CopyOutputResult::empty(request.result_format(), request.result_destination())
                    }
                },
            };
            request.send_result(result);
        }
        answered
    }

    fn encode_copy(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        render_pass_id: RenderPassId,
        request: &CopyOutputRequest,
    ) -> Option<(PixelSize, EncodedCopy)> {
        let source = self.textures.get(&render_pass_id)?;
        let size = PixelSize::new(source.width(), source.height());
        if size.is_empty()
            || request.result_format() != ResultFormat::Rgba
            || !source.usage().contains(wgpu::TextureUsages::COPY_SRC)
        {
            return None;
        }
        let extent = wgpu::Extent3d {
            width: size.width,
            height: size.height,
            depth_or_array_layers: 1,
        };

        let copy = match (request.result_destination(), request.blit_request()) {
            (ResultDestination::NativeTextures, Some(blit)) => {
                let destination = self.images.texture(blit.destination)?;
                let (x, y) = blit.offset;
                let fits = x.checked_add(size.width)? <= destination.width()
                    && y.checked_add(size.height)? <= destination.height();
                if !fits || !same_format_family(source.format(), destination.format()) {
                    return None;
                }
                encoder.copy_texture_to_texture(
                    texture_origin(source, wgpu::Origin3d::ZERO),
                    texture_origin(&destination, wgpu::Origin3d { x, y, z: 0 }),
                    extent,
                );
                EncodedCopy::Texture {
                    image: blit.destination,
                    color_space: self.images.color_space(blit.destination)?,
                    release: ScopedRelease::none(),
                }
            }
            (ResultDestination::NativeTextures, None) => {
                let image = self
                    .images
                    .create_shared_image(&SharedImageDescriptor {
                        format: shared_image_format(source.format())?,
                        size,
                        color_space: ColorSpace::Srgb,
                        usage: SharedImageUsage::GPU_READ,
                        debug_label: "stillframe copy output",
                    })
                    .ok()?;
                let images = Rc::clone(&self.images);
                let release = ScopedRelease::from_fn(
                    move |sync_token, _is_lost| images.destroy_shared_image(image.id, sync_token),
                    image.creation_sync_token,
                );
                let destination = self.images.texture(image.id)?;
                encoder.copy_texture_to_texture(
                    texture_origin(source, wgpu::Origin3d::ZERO),
                    texture_origin(&destination, wgpu::Origin3d::ZERO),
                    extent,
                );
                EncodedCopy::Texture {
                    image: image.id,
                    color_space: ColorSpace::Srgb,
                    release,
                }
            }
            // A CPU-writable blit destination is not reachable from the GPU;
            // system-memory results are always read back.
            (ResultDestination::SystemMemory, _) => {
                let swizzle = match shared_image_format(source.format())? {
                    SharedImageFormat::Rgba8 => false,
                    SharedImageFormat::Bgra8 => true,
                };
                let padded_row_bytes = (size.width * 4)
                    .next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
                let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("stillframe readback"),
                    size: u64::from(padded_row_bytes) * u64::from(size.height),
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                encoder.copy_texture_to_buffer(
                    texture_origin(source, wgpu::Origin3d::ZERO),
                    wgpu::TexelCopyBufferInfo {
                        buffer: &buffer,
                        layout: wgpu::TexelCopyBufferLayout {
                            offset: 0,
                            bytes_per_row: Some(padded_row_bytes),
                            rows_per_image: Some(size.height),
                        },
                    },
                    extent,
                );
                EncodedCopy::Readback {
                    buffer,
                    padded_row_bytes,
                    swizzle,
                }
            }
        };
        Some((size, copy))
    }
}

impl CopyOutputSource for WgpuFrame {
    fn has_active_frame(&self) -> bool {
        !self.passes.is_empty()
    }

    fn render_passes(&self) -> &[RenderPass] {
        &self.passes
    }

    fn request_copy_of_output(&mut self, render_pass_id: RenderPassId, request: CopyOutputRequest) {
        if !self.textures.contains_key(&render_pass_id) {
            send_empty(request);
            return;
        }
        self.pending.push((render_pass_id, request));
    }
}

fn send_empty(request: CopyOutputRequest) {
    let result = CopyOutputResult::empty(request.result_format(), request.result_destination());
    request.send_result(result);
}

fn texture_origin(texture: &wgpu::Texture, origin: wgpu::Origin3d) -> wgpu::TexelCopyTextureInfo<'_> {
    wgpu::TexelCopyTextureInfo {
        texture,
        mip_level: 0,
        origin,
        aspect: wgpu::TextureAspect::All,
    }
}

/// The shared image format with the same channel order as `format`.
fn shared_image_format(format: wgpu::TextureFormat) -> Option<SharedImageFormat> {
    match format.remove_srgb_suffix() {
        wgpu::TextureFormat::Rgba8Unorm => Some(SharedImageFormat::Rgba8),
        wgpu::TextureFormat::Bgra8Unorm => Some(SharedImageFormat::Bgra8),
        _ => None,
    }
}

fn same_format_family(a: wgpu::TextureFormat, b: wgpu::TextureFormat) -> bool {
    a.remove_srgb_suffix() == b.remove_srgb_suffix()
}

fn read_bitmap(
    buffer: &wgpu::Buffer,
    size: PixelSize,
    padded_row_bytes: u32,
    swizzle: bool,
) -> Option<SoftwareBitmap> {
    let mut pixels = {
        let mapped = buffer.slice(..).get_mapped_range();
        unpad_rows(&mapped, size, padded_row_bytes as usize)
    };
    buffer.unmap();
    if swizzle {
        swap_red_blue(&mut pixels);
    }
    SoftwareBitmap::new(size, pixels)
}

/// Copies the tight RGBA rows out of a row-padded readback.
fn unpad_rows(padded: &[u8], size: PixelSize, padded_row_bytes: usize) -> Vec<u8> {
    let row_bytes = size.width as usize * 4;
    let mut pixels = Vec::with_capacity(row_bytes * size.height as usize);
    for row in padded.chunks(padded_row_bytes).take(size.height as usize) {
        let Some(row) = row.get(..row_bytes) else {
            break;
        };
        pixels.extend_from_slice(row);
    }
    pixels
}

fn swap_red_blue(pixels: &mut [u8]) {
    for texel in pixels.chunks_exact_mut(4) {
        texel.swap(0, 2);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use stillframe_core::config::CaptureConfig;
    use stillframe_core::directive::{SharedElement, TransitionDirective};
    use stillframe_core::id::ElementResourceId;
    use stillframe_core::result::CapturedContent;
    use stillframe_core::saved_frame::SavedFrame;
    use stillframe_core::task::ManualTaskRunner;

    use super::*;
    use crate::test_device::{create_device_queue, source_texture};

    const PIXELS: [u8; 16] = [
        255, 0, 0, 255, //
        0, 255, 0, 255, //
        0, 0, 255, 255, //
        9, 8, 7, 6,
    ];

    #[test]
    fn unpad_rows_drops_row_padding() {
        let padded = [1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8, 0, 0, 0, 0];
        assert_eq!(
            unpad_rows(&padded, PixelSize::new(1, 2), 8),
            [1, 2, 3, 4, 5, 6, 7, 8]
        );
    }

    #[test]
    fn unpad_rows_stops_at_short_buffer() {
        let padded = [1, 2, 3, 4, 0, 0, 0, 0, 5, 6];
        assert_eq!(unpad_rows(&padded, PixelSize::new(1, 2), 8), [1, 2, 3, 4]);
    }

    #[test]
    fn swizzle_swaps_red_and_blue() {
        let mut pixels = [1, 2, 3, 4, 5, 6, 7, 8];
        swap_red_blue(&mut pixels);
        assert_eq!(pixels, [3, 2, 1, 4, 7, 6, 5, 8]);
    }

    #[test]
    fn srgb_formats_share_a_family() {
        assert!(same_format_family(
            wgpu::TextureFormat::Rgba8UnormSrgb,
            wgpu::TextureFormat::Rgba8Unorm
        ));
        assert!(!same_format_family(
            wgpu::TextureFormat::Bgra8Unorm,
            wgpu::TextureFormat::Rgba8Unorm
        ));
        assert_eq!(
            shared_image_format(wgpu::TextureFormat::Bgra8UnormSrgb),
            Some(SharedImageFormat::Bgra8)
        );
        assert_eq!(shared_image_format(wgpu::TextureFormat::R8Unorm), None);
    }

    fn capture_session(
        runner: &Rc<ManualTaskRunner>,
        images: Option<Rc<WgpuSharedImages>>,
    ) -> SavedFrame {
        let directive = TransitionDirective::new(
            1,
            vec![SharedElement::new(RenderPassId(1), ElementResourceId(1))],
        );
        SavedFrame::new(
            directive,
            Box::new(|| {}),
            runner.clone(),
            images.map(|images| images as Rc<dyn SharedImageInterface>),
            CaptureConfig::new(),
        )
    }

    /// Reads `texture` back through a second frame.
    fn read_back(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        images: &Rc<WgpuSharedImages>,
        texture: wgpu::Texture,
    ) -> Option<SoftwareBitmap> {
        let mut frame = WgpuFrame::new(device.clone(), queue.clone(), Rc::clone(images));
        frame.add_render_pass(RenderPassId(99), texture, Affine::IDENTITY);
        let out = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&out);
        frame.request_copy_of_output(
            RenderPassId(99),
            CopyOutputRequest::new(
                ResultFormat::Rgba,
                ResultDestination::SystemMemory,
                Box::new(move |result| {
                    if let Some(stillframe_core::copy_output::CopyOutputContent::Bitmap(bitmap)) =
                        result.into_content()
                    {
                        *sink.borrow_mut() = Some(bitmap);
                    }
                }),
            ),
        );
        frame.flush();
        out.take()
    }

    #[test]
    #[ignore = "requires a wgpu adapter"]
    fn software_capture_reads_pixels_back() {
        let (device, queue) = create_device_queue();
        let images = Rc::new(WgpuSharedImages::new(device.clone(), 1));
        let mut frame = WgpuFrame::new(device.clone(), queue.clone(), Rc::clone(&images));
        let texture = source_texture(&device, &queue, 2, 2, wgpu::TextureFormat::Rgba8Unorm, &PIXELS);
        frame.add_render_pass(RenderPassId(1), texture, Affine::translate((4.0, 2.0)));

        let runner = Rc::new(ManualTaskRunner::new());
        let mut session = capture_session(&runner, None);
        session.begin_capture(&mut frame);
        assert_eq!(frame.pending_request_count(), 1);
        assert_eq!(frame.flush(), 1);
        runner.run_until_idle();

        assert!(session.is_valid());
        let result = session.take_result().expect("captured");
        let element = result.slot(0).expect("slot 0");
        assert_eq!(
            element.draw_data().target_transform,
            Affine::translate((4.0, 2.0))
        );
        match element.content() {
            CapturedContent::Software(bitmap) => assert_eq!(bitmap.pixels(), PIXELS),
            other => panic!("expected a bitmap, got {other:?}"),
        }
    }

    #[test]
    #[ignore = "requires a wgpu adapter"]
    fn bgra_readback_is_swizzled_to_rgba() {
        let (device, queue) = create_device_queue();
        let images = Rc::new(WgpuSharedImages::new(device.clone(), 1));
        let mut bgra = PIXELS;
        swap_red_blue(&mut bgra);
        let texture = source_texture(&device, &queue, 2, 2, wgpu::TextureFormat::Bgra8Unorm, &bgra);
        let bitmap = read_back(&device, &queue, &images, texture).expect("read back");
        assert_eq!(bitmap.pixels(), PIXELS);
    }

    #[test]
    #[ignore = "requires a wgpu adapter"]
    fn hardware_capture_blits_into_shared_image() {
        let (device, queue) = create_device_queue();
        let images = Rc::new(WgpuSharedImages::new(device.clone(), 2));
        let mut frame = WgpuFrame::new(device.clone(), queue.clone(), Rc::clone(&images));
        let texture = source_texture(&device, &queue, 2, 2, wgpu::TextureFormat::Rgba8Unorm, &PIXELS);
        frame.add_render_pass(RenderPassId(1), texture, Affine::IDENTITY);

        let runner = Rc::new(ManualTaskRunner::new());
        let mut session = capture_session(&runner, Some(Rc::clone(&images)));
        session.begin_capture(&mut frame);
        assert_eq!(images.live_count(), 1);
        frame.flush();
        runner.run_until_idle();

        assert!(session.is_valid());
        let mut result = session.take_result().expect("captured");
        let element = result.take_slot(0).expect("slot 0");
        let CapturedContent::Hardware {
            image, sync_token, ..
        } = *element.content()
        else {
            panic!("expected a texture");
        };
        assert_eq!(sync_token, images.current_sync_token());
        let captured = images.texture(image).expect("destination is live");
        let bitmap = read_back(&device, &queue, &images, captured).expect("read back");
        assert_eq!(bitmap.pixels(), PIXELS);

        drop(element);
        assert_eq!(images.live_count(), 0);
    }

    #[test]
    #[ignore = "requires a wgpu adapter"]
    fn hardware_capture_blits_bgra_pass() {
        let (device, queue) = create_device_queue();
        let images = Rc::new(WgpuSharedImages::new(device.clone(), 2));
        let mut frame = WgpuFrame::new(device.clone(), queue.clone(), Rc::clone(&images));
        let mut bgra = PIXELS;
        swap_red_blue(&mut bgra);
        let texture = source_texture(&device, &queue, 2, 2, wgpu::TextureFormat::Bgra8Unorm, &bgra);
        frame.add_render_pass(RenderPassId(1), texture, Affine::IDENTITY);
        assert_eq!(frame.render_passes()[0].format, SharedImageFormat::Bgra8);

        let runner = Rc::new(ManualTaskRunner::new());
        let mut session = capture_session(&runner, Some(Rc::clone(&images)));
        session.begin_capture(&mut frame);
        frame.flush();
        runner.run_until_idle();

        assert!(session.is_valid());
        let mut result = session.take_result().expect("captured");
        let element = result.take_slot(0).expect("slot 0");
        let CapturedContent::Hardware { image, .. } = *element.content() else {
            panic!("expected a texture");
        };
        let captured = images.texture(image).expect("destination is live");
        assert_eq!(captured.format(), wgpu::TextureFormat::Bgra8Unorm);
        let bitmap = read_back(&device, &queue, &images, captured).expect("read back");
        assert_eq!(bitmap.pixels(), PIXELS);
    }

    #[test]
    #[ignore = "requires a wgpu adapter"]
    fn texture_result_without_blit_owns_its_image() {
        let (device, queue) = create_device_queue();
        let images = Rc::new(WgpuSharedImages::new(device.clone(), 2));
        let mut frame = WgpuFrame::new(device.clone(), queue.clone(), Rc::clone(&images));
        let texture = source_texture(&device, &queue, 2, 2, wgpu::TextureFormat::Rgba8Unorm, &PIXELS);
        frame.add_render_pass(RenderPassId(1), texture, Affine::IDENTITY);

        let result_slot = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&result_slot);
        frame.request_copy_of_output(
            RenderPassId(1),
            CopyOutputRequest::new(
                ResultFormat::Rgba,
                ResultDestination::NativeTextures,
                Box::new(move |result| *sink.borrow_mut() = Some(result)),
            ),
        );
        frame.flush();
        let result = result_slot.take().expect("answered");
        assert!(!result.is_empty());
        assert_eq!(images.live_count(), 1);
        drop(result);
        assert_eq!(images.live_count(), 0);
    }

    #[test]
    #[ignore = "requires a wgpu adapter"]
    fn unknown_pass_and_cleared_frame_complete_empty() {
        let (device, queue) = create_device_queue();
        let images = Rc::new(WgpuSharedImages::new(device.clone(), 1));
        let mut frame = WgpuFrame::new(device.clone(), queue.clone(), Rc::clone(&images));
        let texture = source_texture(&device, &queue, 2, 2, wgpu::TextureFormat::Rgba8Unorm, &PIXELS);
        frame.add_render_pass(RenderPassId(1), texture, Affine::IDENTITY);

        let empties = Rc::new(Cell::new(0_u32));
        for pass in [RenderPassId(7), RenderPassId(1)] {
            let counter = Rc::clone(&empties);
            frame.request_copy_of_output(
                pass,
                CopyOutputRequest::new(
                    ResultFormat::Rgba,
                    ResultDestination::SystemMemory,
                    Box::new(move |result| {
                        if result.is_empty() {
                            counter.set(counter.get() + 1);
                        }
                    }),
                ),
            );
        }
        assert_eq!(empties.get(), 1);
        assert_eq!(frame.pending_request_count(), 1);
        frame.clear();
        assert_eq!(empties.get(), 2);
        assert!(!frame.has_active_frame());
        assert_eq!(frame.flush(), 0);
    }
}
