// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! gralloc: The allocator context and the public buffer operations.

use std::sync::Arc;

use log::debug;
use log::error;
use log::warn;

use crate::compression::CompressionPolicy;
use crate::formats::FormatFamily;
use crate::formats::PixelFormat;
use crate::gralloc_utils::*;
use crate::handle::BufferHandle;
use crate::handle::BufferRegion;
use crate::handle::BufferRegions;
use crate::heap::base_region_flags;
use crate::heap::packed_region_flags;
use crate::heap::select_heap;
use crate::heap::yuv_region_flags;
use crate::heap::HeapAllocator;
use crate::heap::HeapMask;
use crate::heap::HeapRegion;
use crate::heap::RegionFlags;
use crate::heap::SystemHeap;
use crate::layout::compute_layout;
use crate::layout::LayoutConfig;
use crate::layout::LayoutDescriptor;
use crate::mapper;
use crate::mapper::YCbCrLayout;
use crate::usage::UsageFlags;

/// Deployment configuration of an allocator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GrallocConfig {
    pub layout: LayoutConfig,
    /// Software-write locks flush only the locked rows on unlock.
    pub range_flush: bool,
    /// Use the extended heap selection (camera, crypto and secure camera heaps).
    pub common_heap_selection: bool,
}

impl Default for GrallocConfig {
    fn default() -> GrallocConfig {
        GrallocConfig {
            layout: LayoutConfig::default(),
            range_flush: false,
            common_heap_selection: true,
        }
    }
}

/// Builder for `Gralloc`.
#[derive(Clone, Debug, Default)]
pub struct GrallocBuilder {
    config: GrallocConfig,
}

impl GrallocBuilder {
    /// Create a new GrallocBuilder with the default configuration.
    pub fn new() -> GrallocBuilder {
        Default::default()
    }

    /// Enables or disables block compression.
    pub fn set_compression(mut self, enabled: bool) -> GrallocBuilder {
        self.config.layout.compression.enabled = enabled;
        self
    }

    /// Sets the dimension at or below which buffers are never compressed.
    pub fn set_compression_min_dimension(mut self, min_dimension: u32) -> GrallocBuilder {
        self.config.layout.compression.min_dimension = min_dimension;
        self
    }

    /// Sets the chroma vertical stride alignment of multi-region 4:2:0 formats.
    pub fn set_chroma_valign(mut self, chroma_valign: Option<u32>) -> GrallocBuilder {
        self.config.layout.chroma_valign = chroma_valign;
        self
    }

    pub fn set_mscl_align_restriction(mut self, v: bool) -> GrallocBuilder {
        self.config.layout.mscl_align_restriction = v;
        self
    }

    pub fn set_ten_bit_align_restriction(mut self, v: bool) -> GrallocBuilder {
        self.config.layout.ten_bit_align_restriction = v;
        self
    }

    pub fn set_range_flush(mut self, v: bool) -> GrallocBuilder {
        self.config.range_flush = v;
        self
    }

    pub fn set_common_heap_selection(mut self, v: bool) -> GrallocBuilder {
        self.config.common_heap_selection = v;
        self
    }

    /// Builds an allocator drawing memory from `heap`.
    pub fn build(self, heap: Arc<dyn HeapAllocator>) -> GrallocResult<Gralloc> {
        if let Some(a) = self.config.layout.chroma_valign {
            if !a.is_power_of_two() {
                return Err(GrallocError::InvalidArgs(
                    "chroma alignment must be a power of two",
                ));
            }
        }

        debug!("gralloc config: {:?}", self.config);
        Ok(Gralloc {
            config: self.config,
            heap,
        })
    }

    /// Builds an allocator backed by anonymous shared memory.
    pub fn build_system(self) -> GrallocResult<Gralloc> {
        self.build(Arc::new(SystemHeap::new()))
    }
}

/// The allocator context: configuration plus the heap every region comes from.
pub struct Gralloc {
    config: GrallocConfig,
    heap: Arc<dyn HeapAllocator>,
}

impl Gralloc {
    pub fn config(&self) -> &GrallocConfig {
        &self.config
    }

    pub fn compression_policy(&self) -> &CompressionPolicy {
        &self.config.layout.compression
    }

    /// Allocates a buffer.
    ///
    /// Either every region of the buffer is acquired or none is: a failed acquisition releases
    /// the regions acquired before it.
    pub fn allocate(
        &self,
        width: u32,
        height: u32,
        format: u32,
        usage: UsageFlags,
    ) -> GrallocResult<BufferHandle> {
        if width == 0 || height == 0 {
            return Err(GrallocError::InvalidArgs("width and height must be positive"));
        }
        if width > i32::MAX as u32 || height > i32::MAX as u32 {
            return Err(GrallocError::InvalidArgs("dimension out of range"));
        }

        let format = PixelFormat::try_from(format)?;
        let layout = compute_layout(width, height, format, usage, &self.config.layout)?;

        let heap_mask = select_heap(usage, self.config.common_heap_selection);
        let mut flags = base_region_flags(usage);
        if layout.compressed {
            // The block headers must start out zeroed.
            flags.remove(RegionFlags::NOZEROED);
        }
        let flags = match layout.format.info().family {
            FormatFamily::Packed { .. } | FormatFamily::Blob => packed_region_flags(usage, flags),
            _ => yuv_region_flags(usage, flags),
        };

        let regions = self.acquire_regions(&layout, usage, heap_mask, flags)?;
        let regions = regions.into_iter().map(BufferRegion::new).collect();
        let handle = BufferHandle::new(
            &layout,
            width,
            height,
            usage,
            BufferRegions::from_regions(regions)?,
        );

        debug!(
            "allocated {}x{} {} (requested {}) stride {} vstride {} sizes {:?}",
            width,
            height,
            handle.format,
            handle.framework_format,
            handle.stride,
            handle.vstride,
            layout.region_sizes()
        );
        Ok(handle)
    }

    fn acquire_regions(
        &self,
        layout: &LayoutDescriptor,
        usage: UsageFlags,
        heap_mask: HeapMask,
        flags: RegionFlags,
    ) -> GrallocResult<Vec<HeapRegion>> {
        let info = layout.format.info();
        let private_plane = info.private_plane;
        let dpb_fallback = usage.contains(UsageFlags::PROTECTED_DPB)
            && matches!(
                info.family,
                FormatFamily::Yuv(_) | FormatFamily::FrameworkYuv(_)
            );
        let mut acquired: Vec<HeapRegion> = Vec::with_capacity(layout.regions());
        let mut flags = flags;

        for (index, &size) in layout.region_sizes().iter().enumerate() {
            let result = if private_plane && index == 2 {
                self.heap
                    .acquire_region(size, HeapMask::SYSTEM, RegionFlags::empty())
            } else if index == 0 {
                self.acquire_first(size, dpb_fallback, heap_mask, &mut flags)
            } else {
                self.heap.acquire_region(size, heap_mask, flags)
            };

            match result {
                Ok(region) => acquired.push(region),
                Err(e) => {
                    error!(
                        "failed to acquire region {} ({} bytes) for {}: {}",
                        index, size, layout.format, e
                    );
                    for region in acquired.drain(..) {
                        self.heap.release_region(region);
                    }
                    return Err(GrallocError::OutOfMemory(size));
                }
            }
        }

        Ok(acquired)
    }

    /// Acquires the first region.  With `dpb_fallback` set a failure is retried once with the
    /// video output heap flags, and `flags` is updated so later regions use the flags that
    /// succeeded.  Only YUV protected DPB buffers have a fallback.
    fn acquire_first(
        &self,
        size: u64,
        dpb_fallback: bool,
        heap_mask: HeapMask,
        flags: &mut RegionFlags,
    ) -> GrallocResult<HeapRegion> {
        match self.heap.acquire_region(size, heap_mask, *flags) {
            Err(e) if dpb_fallback => {
                warn!(
                    "protected DPB allocation of {} bytes failed ({}), retrying as video output",
                    size, e
                );
                flags.remove(RegionFlags::VIDEO_EXT2);
                flags.insert(RegionFlags::MFC_OUTPUT);
                self.heap.acquire_region(size, heap_mask, *flags)
            }
            result => result,
        }
    }

    /// Unmaps and releases every region of `handle` and invalidates it.
    pub fn free(&self, handle: &mut BufferHandle) -> GrallocResult<()> {
        handle.ensure_valid()?;
        mapper::unmap(handle);

        if let Some(regions) = handle.regions.take() {
            for region in regions.into_vec() {
                if let Some(import) = region.import {
                    self.heap.free_import(import);
                }
                self.heap.release_region(region.region);
            }
        }

        handle.magic = 0;
        Ok(())
    }

    /// Maps a buffer received from another process and imports its regions into the heap.
    pub fn register_buffer(&self, handle: &mut BufferHandle) -> GrallocResult<()> {
        handle.ensure_valid()?;
        let mapped = mapper::map(self.heap.as_ref(), handle);

        let heap = self.heap.as_ref();
        let format = handle.format;
        for (index, region) in handle.regions_mut().enumerate() {
            if region.import.is_some() {
                continue;
            }
            match heap.import_region(&region.region) {
                Ok(id) => region.import = Some(id),
                Err(e) => error!("error importing region {} of {}: {}", index, format, e),
            }
        }

        debug!(
            "registered {}x{} {} stride {}",
            handle.width, handle.height, handle.format, handle.stride
        );
        mapped
    }

    /// Unmaps a registered buffer and drops its imports.  The descriptors stay open until the
    /// handle is dropped.
    pub fn unregister_buffer(&self, handle: &mut BufferHandle) -> GrallocResult<()> {
        handle.ensure_valid()?;
        mapper::unmap(handle);

        for region in handle.regions_mut() {
            if let Some(import) = region.import.take() {
                self.heap.free_import(import);
            }
        }
        Ok(())
    }

    pub fn map(&self, handle: &mut BufferHandle) -> GrallocResult<()> {
        handle.ensure_valid()?;
        mapper::map(self.heap.as_ref(), handle)
    }

    pub fn unmap(&self, handle: &mut BufferHandle) -> GrallocResult<()> {
        handle.ensure_valid()?;
        mapper::unmap(handle);
        Ok(())
    }

    /// Locks a packed buffer for CPU access.  Returns null if the buffer is not CPU addressable.
    pub fn lock(
        &self,
        handle: &mut BufferHandle,
        usage: UsageFlags,
        rect: Rect,
    ) -> GrallocResult<*mut u8> {
        handle.ensure_valid()?;
        mapper::lock(
            self.heap.as_ref(),
            handle,
            usage,
            rect,
            self.config.range_flush,
        )
    }

    /// Locks a YUV buffer for CPU access and describes its planes.
    pub fn lock_ycbcr(
        &self,
        handle: &mut BufferHandle,
        usage: UsageFlags,
        rect: Rect,
    ) -> GrallocResult<YCbCrLayout> {
        handle.ensure_valid()?;
        mapper::lock_ycbcr(self.heap.as_ref(), handle, usage, rect)
    }

    pub fn unlock(&self, handle: &mut BufferHandle) -> GrallocResult<()> {
        handle.ensure_valid()?;
        mapper::unlock(self.heap.as_ref(), handle, self.config.range_flush)
    }
}
