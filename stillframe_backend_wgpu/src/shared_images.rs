// Copyright 2026 the Stillframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared images backed by wgpu textures.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use stillframe_core::gpu::{
    AllocatedSharedImage, AllocationError, ColorSpace, SharedImageDescriptor, SharedImageFormat,
    SharedImageInterface, SharedImageUsage, SyncToken,
};
use stillframe_core::id::SharedImageId;

struct SharedTexture {
    texture: wgpu::Texture,
    color_space: ColorSpace,
}

/// A [`SharedImageInterface`] that allocates 2D textures on a wgpu device.
///
/// Sync tokens live in one namespace per interface. The release count
/// advances each time the owner calls
/// [`generate_sync_token`](Self::generate_sync_token) after a queue
/// submission, so a token orders everything submitted before it.
pub struct WgpuSharedImages {
    device: wgpu::Device,
    namespace: u32,
    max_dimension: u32,
    next_id: Cell<u64>,
    release_count: Cell<u64>,
    images: RefCell<HashMap<SharedImageId, SharedTexture>>,
}

impl std::fmt::Debug for WgpuSharedImages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuSharedImages")
            .field("namespace", &self.namespace)
            .field("max_dimension", &self.max_dimension)
            .field("live", &self.images.borrow().len())
            .field("release_count", &self.release_count.get())
            .finish_non_exhaustive()
    }
}

impl WgpuSharedImages {
    /// Creates an allocator on `device` whose tokens use `namespace`.
    #[must_use]
    pub fn new(device: wgpu::Device, namespace: u32) -> Self {
        let max_dimension = device.limits().max_texture_dimension_2d;
        Self {
            device,
            namespace,
            max_dimension,
            next_id: Cell::new(0),
            release_count: Cell::new(0),
            images: RefCell::new(HashMap::new()),
        }
    }

    /// The texture backing `id`, if it is still alive.
    #[must_use]
    pub fn texture(&self, id: SharedImageId) -> Option<wgpu::Texture> {
        self.images.borrow().get(&id).map(|image| image.texture.clone())
    }

    /// The color space `id` was allocated with.
    #[must_use]
    pub fn color_space(&self, id: SharedImageId) -> Option<ColorSpace> {
        self.images.borrow().get(&id).map(|image| image.color_space)
    }

    /// Number of allocated images not yet destroyed.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.images.borrow().len()
    }

    /// The token covering every submission recorded so far.
    #[must_use]
    pub fn current_sync_token(&self) -> SyncToken {
        SyncToken::new(self.namespace, self.release_count.get())
    }

    /// Records a queue submission and returns the token that orders it.
    pub fn generate_sync_token(&self) -> SyncToken {
        self.release_count.set(self.release_count.get() + 1);
        self.current_sync_token()
    }
}

impl SharedImageInterface for WgpuSharedImages {
    fn create_shared_image(
        &self,
        descriptor: &SharedImageDescriptor,
    ) -> Result<AllocatedSharedImage, AllocationError> {
        let size = descriptor.size;
        if size.is_empty() {
            return Err(AllocationError::EmptySize);
        }
        if size.width > self.max_dimension || size.height > self.max_dimension {
            return Err(AllocationError::TooLarge(size));
        }

        let out_of_memory = self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let validation = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(descriptor.debug_label),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(descriptor.format),
            usage: texture_usages(descriptor.usage),
            view_formats: &[],
        });
        if pollster::block_on(validation.pop()).is_some() {
            // Scopes pop innermost first.
            _ = pollster::block_on(out_of_memory.pop());
            return Err(AllocationError::UnsupportedFormat(descriptor.format));
        }
        if pollster::block_on(out_of_memory.pop()).is_some() {
            return Err(AllocationError::OutOfMemory);
        }

        let id = SharedImageId(self.next_id.get() + 1);
        self.next_id.set(id.0);
        self.images.borrow_mut().insert(
            id,
            SharedTexture {
                texture,
                color_space: descriptor.color_space,
            },
        );
        Ok(AllocatedSharedImage {
            id,
            creation_sync_token: self.current_sync_token(),
        })
    }

    fn destroy_shared_image(&self, id: SharedImageId, sync_token: SyncToken) {
        // wgpu keeps a dropped texture alive until submitted work using it
        // has finished, which is exactly the ordering the token asks for.
        _ = sync_token;
        self.images.borrow_mut().remove(&id);
    }
}

/// Maps a shared image format onto the matching linear wgpu format.
pub(crate) fn texture_format(format: SharedImageFormat) -> wgpu::TextureFormat {
    match format {
        SharedImageFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        SharedImageFormat::Bgra8 => wgpu::TextureFormat::Bgra8Unorm,
    }
}

/// Maps shared image usage onto wgpu texture usages.
///
/// Every shared image can be copied from and into.
pub(crate) fn texture_usages(usage: SharedImageUsage) -> wgpu::TextureUsages {
    let mut usages = wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST;
    if usage.intersects(SharedImageUsage::GPU_READ | SharedImageUsage::DISPLAY_READ) {
        usages |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(SharedImageUsage::GPU_WRITE) {
        usages |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    usages
}

#[cfg(test)]
mod tests {
    use stillframe_core::geometry::PixelSize;

    use super::*;
    use crate::test_device::create_device_queue;

    fn descriptor(width: u32, height: u32) -> SharedImageDescriptor {
        SharedImageDescriptor {
            format: SharedImageFormat::Rgba8,
            size: PixelSize::new(width, height),
            color_space: ColorSpace::DisplayP3,
            usage: SharedImageUsage::GPU_READ | SharedImageUsage::GPU_WRITE,
            debug_label: "shared image test",
        }
    }

    #[test]
    fn cpu_write_images_are_copy_targets_only() {
        let usages = texture_usages(SharedImageUsage::CPU_WRITE);
        assert_eq!(
            usages,
            wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST
        );
    }

    #[test]
    fn gpu_images_are_sampled_and_rendered() {
        let usages = texture_usages(SharedImageUsage::GPU_READ | SharedImageUsage::GPU_WRITE);
        assert!(usages.contains(wgpu::TextureUsages::TEXTURE_BINDING));
        assert!(usages.contains(wgpu::TextureUsages::RENDER_ATTACHMENT));
        assert!(usages.contains(wgpu::TextureUsages::COPY_DST));
    }

    #[test]
    fn formats_map_to_linear_variants() {
        assert_eq!(
            texture_format(SharedImageFormat::Rgba8),
            wgpu::TextureFormat::Rgba8Unorm
        );
        assert_eq!(
            texture_format(SharedImageFormat::Bgra8),
            wgpu::TextureFormat::Bgra8Unorm
        );
    }

    #[test]
    #[ignore = "requires a wgpu adapter"]
    fn allocates_and_destroys_textures() {
        let (device, _queue) = create_device_queue();
        let images = WgpuSharedImages::new(device, 3);

        let image = images.create_shared_image(&descriptor(16, 8)).unwrap();
        assert_eq!(image.creation_sync_token, SyncToken::new(3, 0));
        let texture = images.texture(image.id).expect("texture is live");
        assert_eq!((texture.width(), texture.height()), (16, 8));
        assert_eq!(images.color_space(image.id), Some(ColorSpace::DisplayP3));

        let token = images.generate_sync_token();
        assert_eq!(token, SyncToken::new(3, 1));
        images.destroy_shared_image(image.id, token);
        assert_eq!(images.live_count(), 0);
        assert!(images.texture(image.id).is_none());
    }

    #[test]
    #[ignore = "requires a wgpu adapter"]
    fn rejects_empty_and_oversized_images() {
        let (device, _queue) = create_device_queue();
        let limit = device.limits().max_texture_dimension_2d;
        let images = WgpuSharedImages::new(device, 1);

        assert_eq!(
            images.create_shared_image(&descriptor(0, 8)),
            Err(AllocationError::EmptySize)
        );
        assert_eq!(
            images.create_shared_image(&descriptor(limit + 1, 8)),
            Err(AllocationError::TooLarge(PixelSize::new(limit + 1, 8)))
        );
        assert_eq!(images.live_count(), 0);
    }
}
