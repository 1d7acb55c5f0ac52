// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! mapper: Maps buffer regions into the process, locks buffers for CPU access and describes the
//! planes of YUV buffers.

use std::ptr;

use log::error;
use log::trace;

use crate::formats::PixelFormat;
use crate::formats::YCbCrRule;
use crate::gralloc_os::MemoryMapping;
use crate::gralloc_utils::*;
use crate::handle::BufferHandle;
use crate::handle::BufferRegion;
use crate::heap::HeapAllocator;
use crate::usage::UsageFlags;

/// Index of the region holding the private metadata plane.
const PRIVATE_REGION: usize = 2;

/// Where a plane starts: a region index and a byte offset into it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlaneRef {
    pub region: usize,
    pub offset: u64,
}

impl PlaneRef {
    fn new(region: usize, offset: u64) -> Option<PlaneRef> {
        Some(PlaneRef { region, offset })
    }
}

/// Plane origins and pitches of a YUV buffer, independent of where it is mapped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlaneLayout {
    pub y: Option<PlaneRef>,
    pub cb: Option<PlaneRef>,
    pub cr: Option<PlaneRef>,
    pub ystride: u32,
    pub cstride: u32,
    /// 1 for separate Cb/Cr planes, 2 for interleaved chroma.
    pub chroma_step: u32,
}

/// CPU addresses and pitches of the planes of a locked YUV buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct YCbCrLayout {
    pub y: *mut u8,
    pub cb: *mut u8,
    pub cr: *mut u8,
    pub ystride: u32,
    pub cstride: u32,
    pub chroma_step: u32,
}

impl Default for YCbCrLayout {
    fn default() -> YCbCrLayout {
        YCbCrLayout {
            y: ptr::null_mut(),
            cb: ptr::null_mut(),
            cr: ptr::null_mut(),
            ystride: 0,
            cstride: 0,
            chroma_step: 0,
        }
    }
}

/// Computes where the planes of a `format` buffer start.
///
/// Tiled buffers can only be described to the video encoder; any other usage fails with
/// `UnsupportedFormat`.
pub fn plane_layout(
    format: PixelFormat,
    width: u32,
    height: u32,
    stride: u32,
    vstride: u32,
    usage: UsageFlags,
) -> GrallocResult<PlaneLayout> {
    let rule = format
        .info()
        .ycbcr
        .ok_or(GrallocError::UnsupportedFormat(format))?;

    let w = width as u64;
    let h = height as u64;
    let s = stride as u64;
    let vs = vstride as u64;
    let encoder = usage.contains(UsageFlags::HW_VIDEO_ENCODER);
    let y = PlaneRef::new(0, 0);

    let planar_cstride = align(s / 2, 16) as u32;

    let layout = match rule {
        YCbCrRule::SemiPlanarCrCb => {
            let v = w * h;
            PlaneLayout {
                y,
                cb: PlaneRef::new(0, v + 1),
                cr: PlaneRef::new(0, v),
                ystride: width,
                cstride: width,
                chroma_step: 2,
            }
        }
        YCbCrRule::PlanarCrCb => {
            let ystride = align(w, 16);
            let cstride = align(ystride / 2, 16);
            let v = ystride * h;
            let u = v + cstride * (h / 2);
            PlaneLayout {
                y,
                cb: PlaneRef::new(0, u),
                cr: PlaneRef::new(0, v),
                ystride: ystride as u32,
                cstride: cstride as u32,
                chroma_step: 1,
            }
        }
        YCbCrRule::PlanarCbCr => {
            let u = s * h;
            let v = u + planar_cstride as u64 * (h / 2);
            PlaneLayout {
                y,
                cb: PlaneRef::new(0, u),
                cr: PlaneRef::new(0, v),
                ystride: stride,
                cstride: planar_cstride,
                chroma_step: 1,
            }
        }
        YCbCrRule::MultiSemiPlanarCbCr | YCbCrRule::MultiSemiPlanarCbCrPriv => {
            let cr = if rule == YCbCrRule::MultiSemiPlanarCbCrPriv && encoder {
                PlaneRef::new(PRIVATE_REGION, 0)
            } else {
                PlaneRef::new(1, 1)
            };
            PlaneLayout {
                y,
                cb: PlaneRef::new(1, 0),
                cr,
                ystride: stride,
                cstride: stride,
                chroma_step: 2,
            }
        }
        YCbCrRule::MultiSemiPlanarCrCb => PlaneLayout {
            y,
            cb: PlaneRef::new(1, 1),
            cr: PlaneRef::new(1, 0),
            ystride: stride,
            cstride: stride,
            chroma_step: 2,
        },
        YCbCrRule::MultiPlanarCbCr => PlaneLayout {
            y,
            cb: PlaneRef::new(1, 0),
            cr: PlaneRef::new(2, 0),
            ystride: stride,
            cstride: planar_cstride,
            chroma_step: 1,
        },
        YCbCrRule::MultiPlanarCrCb => PlaneLayout {
            y,
            cb: PlaneRef::new(2, 0),
            cr: PlaneRef::new(1, 0),
            ystride: stride,
            cstride: planar_cstride,
            chroma_step: 1,
        },
        YCbCrRule::MultiTiled => {
            if !encoder {
                error!("tiled buffers can only be described to the video encoder");
                return Err(GrallocError::UnsupportedFormat(format));
            }
            PlaneLayout {
                y,
                cb: PlaneRef::new(1, 0),
                cr: None,
                ystride: stride,
                cstride: stride,
                chroma_step: 1,
            }
        }
        YCbCrRule::Interleaved | YCbCrRule::LumaOnly => PlaneLayout {
            y,
            cb: None,
            cr: None,
            ystride: stride,
            cstride: stride,
            chroma_step: 1,
        },
        YCbCrRule::SingleSemiPlanar => {
            let u = s * vs + GRALLOC_EXT_SIZE;
            PlaneLayout {
                y,
                cb: PlaneRef::new(0, u),
                cr: PlaneRef::new(0, u + 1),
                ystride: stride,
                cstride: stride,
                chroma_step: 2,
            }
        }
        YCbCrRule::SingleSemiPlanar10 => {
            let luma_tail = align(w / 4, 16) * vs + GRALLOC_10B_TAIL_PAD;
            let u = (s * vs + GRALLOC_EXT_SIZE) + luma_tail;
            PlaneLayout {
                y,
                cb: PlaneRef::new(0, u),
                cr: PlaneRef::new(0, u + 1),
                ystride: stride,
                cstride: stride,
                chroma_step: 2,
            }
        }
        YCbCrRule::MultiP010 => PlaneLayout {
            y,
            cb: PlaneRef::new(1, 0),
            cr: PlaneRef::new(2, 0),
            ystride: stride,
            cstride: stride,
            chroma_step: 2,
        },
    };

    Ok(layout)
}

fn map_region(heap: &dyn HeapAllocator, index: usize, region: &mut BufferRegion) -> GrallocResult<()> {
    if region.mapping.is_some() {
        return Ok(());
    }

    let size: usize = region.size().try_into()?;
    let mapping = MemoryMapping::from_safe_descriptor(
        region.region.descriptor(),
        size,
        GRALLOC_MAP_ACCESS_RW,
    )
    .map_err(|e| {
        error!("could not map region {} ({} bytes): {}", index, size, e);
        e
    })?;

    trace!(
        "mapped region {} at {:p} ({} bytes)",
        index,
        mapping.as_ptr(),
        mapping.size()
    );
    region.mapping = Some(mapping);
    heap.sync_region(&region.region)
}

/// Maps the regions of `handle` that the process may touch.
///
/// The private metadata plane is always mapped first, and failing to map it is only logged.
/// Protected buffers without the non-secure exception stop there, as do buffers allocated
/// without zero-fill unless software access was requested.
pub fn map(heap: &dyn HeapAllocator, handle: &mut BufferHandle) -> GrallocResult<()> {
    let format = handle.format;
    let private_plane = format.info().private_plane;
    if private_plane {
        if let Some(region) = handle.region_mut(PRIVATE_REGION) {
            if let Err(e) = map_region(heap, PRIVATE_REGION, region) {
                error!("private plane of {} left unmapped: {}", format, e);
            }
        }
    }

    let usage = handle.usage;
    if usage.is_protected() && !usage.contains(UsageFlags::PRIVATE_NONSECURE) {
        return Ok(());
    }

    if usage.contains(UsageFlags::NOZEROED) && !usage.has_sw_access() {
        return Ok(());
    }

    for (index, region) in handle.regions_mut().enumerate() {
        if private_plane && index == PRIVATE_REGION {
            continue;
        }
        map_region(heap, index, region)?;
    }

    Ok(())
}

/// Drops every CPU mapping of `handle`.  Unmapping an unmapped handle does nothing.
pub fn unmap(handle: &mut BufferHandle) {
    for region in handle.regions_mut() {
        if let Some(mapping) = region.mapping.take() {
            trace!("unmapping {:p}", mapping.as_ptr());
        }
    }
}

fn sync_all(heap: &dyn HeapAllocator, handle: &BufferHandle) -> GrallocResult<()> {
    for index in 0..handle.region_count() {
        if let Some(region) = handle.region(index) {
            heap.sync_region(region.heap_region())?;
        }
    }
    Ok(())
}

fn sw_lock_usage(usage: UsageFlags) -> UsageFlags {
    usage & (UsageFlags::SW_READ_MASK | UsageFlags::SW_WRITE_MASK)
}

/// Locks a packed buffer for CPU access and returns the start of its first region, or null if
/// the buffer is not CPU addressable.
pub fn lock(
    heap: &dyn HeapAllocator,
    handle: &mut BufferHandle,
    usage: UsageFlags,
    rect: Rect,
    range_flush: bool,
) -> GrallocResult<*mut u8> {
    if handle.framework_format == PixelFormat::YCbCr420Flexible {
        error!("lock can't be used with the flexible YUV format, use lock_ycbcr");
        return Err(GrallocError::UnsupportedFormat(handle.framework_format));
    }

    if !handle.format.info().cpu_lockable {
        error!("lock doesn't support {}, use lock_ycbcr", handle.format);
        return Err(GrallocError::UnsupportedFormat(handle.format));
    }

    handle.lock_usage = sw_lock_usage(usage);
    if range_flush && usage.intersects(UsageFlags::SW_WRITE_MASK) {
        handle.lock_offset = rect.top.saturating_mul(handle.stride);
        handle.lock_len = rect.height.saturating_mul(handle.stride);
    } else {
        handle.lock_offset = 0;
        handle.lock_len = 0;
    }

    if handle.address(0).is_null() {
        map(heap, handle)?;
    }

    if usage.has_sw_access() {
        sync_all(heap, handle)?;
    }

    Ok(handle.address(0))
}

/// Locks a YUV buffer for CPU access and describes its planes.  All addresses are null when the
/// buffer is not CPU addressable.
pub fn lock_ycbcr(
    heap: &dyn HeapAllocator,
    handle: &mut BufferHandle,
    usage: UsageFlags,
    rect: Rect,
) -> GrallocResult<YCbCrLayout> {
    trace!("lock_ycbcr {} rect {:?}", handle.format, rect);

    if handle.address(0).is_null() {
        map(heap, handle)?;
    }

    if (0..handle.region_count()).all(|i| handle.address(i).is_null()) {
        return Ok(YCbCrLayout::default());
    }

    // Flexible buffers report no stride; planes use the stride they were laid out with.
    let stride = match handle.stride {
        0 => align(handle.width as u64, 16) as u32,
        s => s,
    };
    let planes = plane_layout(
        handle.format,
        handle.width,
        handle.height,
        stride,
        handle.vstride,
        usage,
    )?;

    let address = |plane: Option<PlaneRef>| match plane {
        Some(p) => {
            let base = handle.address(p.region);
            if base.is_null() {
                base
            } else {
                base.wrapping_add(p.offset as usize)
            }
        }
        None => ptr::null_mut(),
    };

    let layout = YCbCrLayout {
        y: address(planes.y),
        cb: address(planes.cb),
        cr: address(planes.cr),
        ystride: planes.ystride,
        cstride: planes.cstride,
        chroma_step: planes.chroma_step,
    };

    handle.lock_usage = sw_lock_usage(usage);
    handle.lock_offset = 0;
    handle.lock_len = 0;
    if usage.has_sw_access() {
        sync_all(heap, handle)?;
    }

    Ok(layout)
}

/// Ends a CPU access.  Caches are synced when the lock asked for software access or the buffer
/// lives in cached memory.
pub fn unlock(
    heap: &dyn HeapAllocator,
    handle: &mut BufferHandle,
    range_flush: bool,
) -> GrallocResult<()> {
    let cached = handle.usage.is_sw_read_often();
    let sw_locked = !handle.lock_usage.is_empty();

    let result = if sw_locked || cached {
        sync_after_lock(heap, handle, range_flush)
    } else {
        Ok(())
    };

    handle.lock_usage = UsageFlags::empty();
    handle.lock_offset = 0;
    handle.lock_len = 0;
    result
}

fn sync_after_lock(
    heap: &dyn HeapAllocator,
    handle: &BufferHandle,
    range_flush: bool,
) -> GrallocResult<()> {
    let partial = range_flush
        && matches!(handle.format, PixelFormat::Rgba8888 | PixelFormat::Rgbx8888)
        && handle.lock_offset != 0;

    for index in 0..handle.region_count() {
        let region = match handle.region(index) {
            Some(r) => r.heap_region(),
            None => continue,
        };
        if index == 0 && partial {
            let offset = handle.lock_offset as u64 * 4;
            let len = handle.lock_len as u64 * 4;
            heap.sync_region_range(region, offset, len)?;
        } else {
            heap.sync_region(region)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::gralloc::Gralloc;
    use crate::gralloc::GrallocBuilder;
    use crate::heap::fake_heap::FakeHeap;

    fn gralloc(heap: &Arc<FakeHeap>) -> Gralloc {
        GrallocBuilder::new()
            .set_compression(false)
            .build(heap.clone())
            .unwrap()
    }

    #[test]
    fn yv12_176x144_planes() {
        let planes = plane_layout(PixelFormat::Yv12, 176, 144, 176, 144, UsageFlags::empty())
            .unwrap();
        let v = 176 * 144;
        assert_eq!(planes.chroma_step, 1);
        assert_eq!(planes.ystride, 176);
        assert_eq!(planes.cstride, 96);
        assert_eq!(planes.cr, Some(PlaneRef { region: 0, offset: v }));
        assert_eq!(
            planes.cb,
            Some(PlaneRef {
                region: 0,
                offset: v + 96 * 72
            })
        );
    }

    #[test]
    fn ycbcr_420_p_176x144_planes() {
        let planes = plane_layout(
            PixelFormat::ExynosYCbCr420P,
            176,
            144,
            176,
            144,
            UsageFlags::empty(),
        )
        .unwrap();
        let u = 176 * 144;
        assert_eq!(planes.chroma_step, 1);
        assert_eq!(planes.cb, Some(PlaneRef { region: 0, offset: u }));
        assert_eq!(
            planes.cr,
            Some(PlaneRef {
                region: 0,
                offset: u + 96 * 72
            })
        );
    }

    #[test]
    fn semi_planar_multi_planes() {
        let planes = plane_layout(
            PixelFormat::ExynosYCrCb420SpM,
            64,
            64,
            64,
            64,
            UsageFlags::empty(),
        )
        .unwrap();
        assert_eq!(planes.chroma_step, 2);
        assert_eq!(planes.cr, Some(PlaneRef { region: 1, offset: 0 }));
        assert_eq!(planes.cb, Some(PlaneRef { region: 1, offset: 1 }));
    }

    #[test]
    fn priv_cr_moves_under_encoder() {
        let format = PixelFormat::ExynosYCbCr420SpMPriv;
        let plain = plane_layout(format, 64, 64, 64, 64, UsageFlags::empty()).unwrap();
        assert_eq!(plain.cr, Some(PlaneRef { region: 1, offset: 1 }));
        let enc = plane_layout(format, 64, 64, 64, 64, UsageFlags::HW_VIDEO_ENCODER).unwrap();
        assert_eq!(enc.cr, Some(PlaneRef { region: 2, offset: 0 }));

        let sp_m = plane_layout(
            PixelFormat::ExynosYCbCr420SpM,
            64,
            64,
            64,
            64,
            UsageFlags::HW_VIDEO_ENCODER,
        )
        .unwrap();
        assert_eq!(sp_m.cr, Some(PlaneRef { region: 1, offset: 1 }));
    }

    #[test]
    fn tiled_requires_encoder() {
        let format = PixelFormat::ExynosYCbCr420SpMTiled;
        assert!(matches!(
            plane_layout(format, 64, 64, 64, 64, UsageFlags::SW_READ_OFTEN),
            Err(GrallocError::UnsupportedFormat(PixelFormat::ExynosYCbCr420SpMTiled))
        ));
        let planes = plane_layout(format, 64, 64, 64, 64, UsageFlags::HW_VIDEO_ENCODER).unwrap();
        assert_eq!(planes.cr, None);
    }

    #[test]
    fn spn_s10b_offsets() {
        let planes = plane_layout(
            PixelFormat::ExynosYCbCr420SpnS10b,
            640,
            360,
            640,
            368,
            UsageFlags::empty(),
        )
        .unwrap();
        let u = (640 * 368 + 256) + (160 * 368 + 64);
        assert_eq!(planes.cb, Some(PlaneRef { region: 0, offset: u }));
        assert_eq!(planes.cr, Some(PlaneRef { region: 0, offset: u + 1 }));
    }

    #[test]
    fn every_yuv_format_is_described() {
        for format in PixelFormat::ALL {
            let info = format.info();
            let result = plane_layout(format, 64, 64, 64, 64, UsageFlags::HW_VIDEO_ENCODER);
            match info.ycbcr {
                Some(_) => assert!(result.is_ok(), "{format}"),
                None => assert!(result.is_err(), "{format}"),
            }
        }
    }

    #[test]
    fn unmap_is_idempotent() {
        let heap = Arc::new(FakeHeap::new());
        let gralloc = gralloc(&heap);
        let mut handle = gralloc
            .allocate(64, 64, PixelFormat::ExynosYv12M.raw(), UsageFlags::SW_READ_OFTEN)
            .unwrap();
        gralloc.map(&mut handle).unwrap();
        assert!((0..3).all(|i| !handle.address(i).is_null()));

        gralloc.unmap(&mut handle).unwrap();
        assert!((0..3).all(|i| handle.address(i).is_null()));
        gralloc.unmap(&mut handle).unwrap();
        assert!((0..3).all(|i| handle.address(i).is_null()));
        assert_eq!(handle.region_count(), 3);
    }

    #[test]
    fn map_syncs_each_region() {
        let heap = Arc::new(FakeHeap::new());
        let gralloc = gralloc(&heap);
        let mut handle = gralloc
            .allocate(64, 64, PixelFormat::ExynosYCbCr420SpM.raw(), UsageFlags::SW_READ_OFTEN)
            .unwrap();
        gralloc.map(&mut handle).unwrap();
        assert_eq!(heap.syncs().len(), 2);

        // Mapping again is a no-op.
        gralloc.map(&mut handle).unwrap();
        assert_eq!(heap.syncs().len(), 2);
    }

    #[test]
    fn map_failure_reports_errno() {
        let heap = Arc::new(FakeHeap::new().unmappable_call(1));
        let gralloc = gralloc(&heap);
        let mut handle = gralloc
            .allocate(64, 64, PixelFormat::ExynosYv12M.raw(), UsageFlags::SW_READ_OFTEN)
            .unwrap();

        match gralloc.map(&mut handle) {
            Err(GrallocError::MapFailed(errno)) => assert_eq!(errno, libc::EACCES),
            other => panic!("unexpected result {:?}", other),
        }
        assert!(!handle.address(0).is_null());
        assert!(handle.address(1).is_null());
        assert!(handle.address(2).is_null());

        gralloc.unmap(&mut handle).unwrap();
        assert!(matches!(
            gralloc.lock_ycbcr(&mut handle, UsageFlags::SW_READ_OFTEN, Rect::new(0, 0, 64, 64)),
            Err(GrallocError::MapFailed(_))
        ));
        gralloc.free(&mut handle).unwrap();
    }

    #[test]
    fn protected_buffers_stay_unmapped() {
        let heap = Arc::new(FakeHeap::new());
        let gralloc = gralloc(&heap);
        let mut handle = gralloc
            .allocate(64, 64, PixelFormat::Rgba8888.raw(), UsageFlags::PROTECTED)
            .unwrap();
        let addr = gralloc
            .lock(&mut handle, UsageFlags::SW_READ_OFTEN, Rect::new(0, 0, 64, 64))
            .unwrap();
        assert!(addr.is_null());

        let mut nonsecure = gralloc
            .allocate(
                64,
                64,
                PixelFormat::Rgba8888.raw(),
                UsageFlags::PROTECTED | UsageFlags::PRIVATE_NONSECURE,
            )
            .unwrap();
        gralloc.map(&mut nonsecure).unwrap();
        assert!(!nonsecure.address(0).is_null());
    }

    #[test]
    fn priv_plane_is_mapped_even_when_protected() {
        let heap = Arc::new(FakeHeap::new());
        let gralloc = gralloc(&heap);
        let mut handle = gralloc
            .allocate(
                64,
                64,
                PixelFormat::ExynosYCbCr420SpMPriv.raw(),
                UsageFlags::PROTECTED | UsageFlags::HW_VIDEO_ENCODER,
            )
            .unwrap();
        gralloc.map(&mut handle).unwrap();
        assert!(handle.address(0).is_null());
        assert!(handle.address(1).is_null());
        assert!(!handle.address(2).is_null());
    }

    #[test]
    fn nozeroed_maps_only_with_sw_usage() {
        let heap = Arc::new(FakeHeap::new());
        let gralloc = gralloc(&heap);
        let mut hw_only = gralloc
            .allocate(
                64,
                64,
                PixelFormat::Rgba8888.raw(),
                UsageFlags::NOZEROED | UsageFlags::HW_TEXTURE,
            )
            .unwrap();
        gralloc.map(&mut hw_only).unwrap();
        assert!(hw_only.address(0).is_null());

        let mut sw = gralloc
            .allocate(
                64,
                64,
                PixelFormat::Rgba8888.raw(),
                UsageFlags::NOZEROED | UsageFlags::SW_WRITE_RARELY,
            )
            .unwrap();
        gralloc.map(&mut sw).unwrap();
        assert!(!sw.address(0).is_null());
    }

    #[test]
    fn lock_rejects_flexible_and_multi_plane() {
        let heap = Arc::new(FakeHeap::new());
        let gralloc = gralloc(&heap);
        let rect = Rect::new(0, 0, 64, 64);

        let mut flexible = gralloc
            .allocate(
                64,
                64,
                PixelFormat::YCbCr420Flexible.raw(),
                UsageFlags::SW_READ_OFTEN,
            )
            .unwrap();
        assert!(matches!(
            gralloc.lock(&mut flexible, UsageFlags::SW_READ_OFTEN, rect),
            Err(GrallocError::UnsupportedFormat(PixelFormat::YCbCr420Flexible))
        ));
        let planes = gralloc
            .lock_ycbcr(&mut flexible, UsageFlags::SW_READ_OFTEN, rect)
            .unwrap();
        assert!(!planes.y.is_null());
        assert_eq!(planes.cr, planes.y.wrapping_add(64 * 64));
        gralloc.unlock(&mut flexible).unwrap();

        let mut multi = gralloc
            .allocate(
                64,
                64,
                PixelFormat::ExynosYCbCr420SpM.raw(),
                UsageFlags::SW_READ_OFTEN,
            )
            .unwrap();
        assert!(gralloc
            .lock(&mut multi, UsageFlags::SW_READ_OFTEN, rect)
            .is_err());
    }

    #[test]
    fn lock_writes_are_visible_through_mapping() {
        let heap = Arc::new(FakeHeap::new());
        let gralloc = gralloc(&heap);
        let mut handle = gralloc
            .allocate(
                32,
                32,
                PixelFormat::Rgba8888.raw(),
                UsageFlags::SW_READ_OFTEN | UsageFlags::SW_WRITE_OFTEN,
            )
            .unwrap();
        let addr = gralloc
            .lock(&mut handle, UsageFlags::SW_WRITE_OFTEN, Rect::new(0, 0, 32, 32))
            .unwrap();
        assert!(!addr.is_null());
        // Safe because the first region is at least 32 * 32 * 4 bytes and mapped read/write.
        unsafe {
            ptr::write_bytes(addr, 0xab, 32 * 32 * 4);
            assert_eq!(*addr.add(100), 0xab);
        }
        gralloc.unlock(&mut handle).unwrap();
    }

    #[test]
    fn lock_unlock_sync_every_region() {
        let heap = Arc::new(FakeHeap::new());
        let gralloc = gralloc(&heap);
        let mut handle = gralloc
            .allocate(
                64,
                64,
                PixelFormat::ExynosYv12M.raw(),
                UsageFlags::SW_READ_RARELY,
            )
            .unwrap();
        gralloc.map(&mut handle).unwrap();
        heap.clear_syncs();

        let rect = Rect::new(0, 0, 64, 64);
        gralloc
            .lock_ycbcr(&mut handle, UsageFlags::SW_READ_RARELY, rect)
            .unwrap();
        assert_eq!(heap.syncs().len(), 3);
        gralloc.unlock(&mut handle).unwrap();
        assert_eq!(heap.syncs().len(), 6);

        // Hardware-only lock of an uncached buffer needs no maintenance.
        gralloc
            .lock_ycbcr(&mut handle, UsageFlags::HW_TEXTURE, rect)
            .unwrap();
        gralloc.unlock(&mut handle).unwrap();
        assert_eq!(heap.syncs().len(), 6);
    }

    #[test]
    fn range_flush_syncs_locked_rows() {
        let heap = Arc::new(FakeHeap::new());
        let gralloc = GrallocBuilder::new()
            .set_compression(false)
            .set_range_flush(true)
            .build(heap.clone())
            .unwrap();
        let mut handle = gralloc
            .allocate(
                64,
                64,
                PixelFormat::Rgba8888.raw(),
                UsageFlags::SW_READ_OFTEN | UsageFlags::SW_WRITE_OFTEN,
            )
            .unwrap();
        gralloc
            .lock(&mut handle, UsageFlags::SW_WRITE_OFTEN, Rect::new(0, 8, 64, 16))
            .unwrap();
        heap.clear_syncs();
        gralloc.unlock(&mut handle).unwrap();

        let syncs = heap.syncs();
        assert_eq!(syncs.len(), 1);
        assert_eq!(syncs[0].1, Some((8 * 64 * 4, 16 * 64 * 4)));
    }
}
