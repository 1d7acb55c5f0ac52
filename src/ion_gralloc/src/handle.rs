// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! handle: The buffer handle, its structural validation and its transferable wire form.

use std::mem::size_of;
use std::ptr;

use log::error;
use zerocopy::AsBytes;
use zerocopy::FromBytes;

use crate::formats::PixelFormat;
use crate::gralloc_os::MemoryMapping;
use crate::gralloc_os::SafeDescriptor;
use crate::gralloc_utils::*;
use crate::heap::HeapRegion;
use crate::heap::ImportId;
use crate::layout::compute_layout;
use crate::layout::LayoutConfig;
use crate::layout::LayoutDescriptor;
use crate::usage::UsageFlags;

/// Tag stored in every live handle.
pub const GRALLOC_MAGIC: u32 = 0x3141592;

/// Maximum number of regions a buffer owns.
pub const GRALLOC_MAX_REGIONS: usize = 3;

/// Structural version of a handle: the size of its header.
pub const GRALLOC_HANDLE_VERSION: u32 = size_of::<NativeHandleHeader>() as u32;

const HANDLE_INT_COUNT: u32 = (size_of::<HandleInts>() / size_of::<u32>()) as u32;

/// Descriptor slots plus integer words; identical for every region count.
pub const GRALLOC_HANDLE_FIELD_COUNT: u32 = GRALLOC_MAX_REGIONS as u32 + HANDLE_INT_COUNT;

/// One region owned by a buffer, with its optional CPU mapping and import token.
#[derive(Debug)]
pub struct BufferRegion {
    pub(crate) region: HeapRegion,
    pub(crate) mapping: Option<MemoryMapping>,
    pub(crate) import: Option<ImportId>,
}

impl BufferRegion {
    pub fn new(region: HeapRegion) -> BufferRegion {
        BufferRegion {
            region,
            mapping: None,
            import: None,
        }
    }

    pub fn size(&self) -> u64 {
        self.region.size()
    }

    pub fn heap_region(&self) -> &HeapRegion {
        &self.region
    }

    pub fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }

    /// Start of the CPU mapping, or null when the region is not mapped.
    pub fn address(&self) -> *mut u8 {
        self.mapping
            .as_ref()
            .map_or(ptr::null_mut(), |m| m.as_ptr())
    }
}

/// The regions of a buffer, keyed by how many there are.
#[derive(Debug)]
pub enum BufferRegions {
    Single {
        main: BufferRegion,
    },
    Dual {
        luma: BufferRegion,
        chroma: BufferRegion,
    },
    Triple {
        luma: BufferRegion,
        chroma: BufferRegion,
        /// Second chroma plane or private metadata plane.
        extra: BufferRegion,
    },
}

impl BufferRegions {
    /// Builds the variant matching the number of regions given.
    pub fn from_regions(regions: Vec<BufferRegion>) -> GrallocResult<BufferRegions> {
        let mut iter = regions.into_iter();
        let regions = match (iter.next(), iter.next(), iter.next(), iter.next()) {
            (Some(main), None, None, None) => BufferRegions::Single { main },
            (Some(luma), Some(chroma), None, None) => BufferRegions::Dual { luma, chroma },
            (Some(luma), Some(chroma), Some(extra), None) => {
                BufferRegions::Triple {
                    luma,
                    chroma,
                    extra,
                }
            }
            _ => return Err(GrallocError::InvalidArgs("a buffer owns 1 to 3 regions")),
        };
        Ok(regions)
    }

    pub fn len(&self) -> usize {
        match self {
            BufferRegions::Single { .. } => 1,
            BufferRegions::Dual { .. } => 2,
            BufferRegions::Triple { .. } => 3,
        }
    }

    pub fn get(&self, index: usize) -> Option<&BufferRegion> {
        match (self, index) {
            (BufferRegions::Single { main }, 0) => Some(main),
            (BufferRegions::Dual { luma, .. }, 0) => Some(luma),
            (BufferRegions::Dual { chroma, .. }, 1) => Some(chroma),
            (BufferRegions::Triple { luma, .. }, 0) => Some(luma),
            (BufferRegions::Triple { chroma, .. }, 1) => Some(chroma),
            (BufferRegions::Triple { extra, .. }, 2) => Some(extra),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut BufferRegion> {
        match (self, index) {
            (BufferRegions::Single { main }, 0) => Some(main),
            (BufferRegions::Dual { luma, .. }, 0) => Some(luma),
            (BufferRegions::Dual { chroma, .. }, 1) => Some(chroma),
            (BufferRegions::Triple { luma, .. }, 0) => Some(luma),
            (BufferRegions::Triple { chroma, .. }, 1) => Some(chroma),
            (BufferRegions::Triple { extra, .. }, 2) => Some(extra),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &BufferRegion> {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut BufferRegion> {
        let (a, b, c) = match self {
            BufferRegions::Single { main } => (Some(main), None, None),
            BufferRegions::Dual { luma, chroma } => (Some(luma), Some(chroma), None),
            BufferRegions::Triple {
                luma,
                chroma,
                extra,
            } => (Some(luma), Some(chroma), Some(extra)),
        };
        a.into_iter().chain(b).chain(c)
    }

    pub fn into_vec(self) -> Vec<BufferRegion> {
        match self {
            BufferRegions::Single { main } => vec![main],
            BufferRegions::Dual { luma, chroma } => vec![luma, chroma],
            BufferRegions::Triple {
                luma,
                chroma,
                extra,
            } => vec![luma, chroma, extra],
        }
    }
}

/// An allocated buffer.
///
/// The handle owns its regions: dropping it unmaps and closes them.  Use `Gralloc::free` to hand
/// them back to the heap explicitly.
#[derive(Debug)]
pub struct BufferHandle {
    pub(crate) version: u32,
    pub(crate) magic: u32,
    pub(crate) regions: Option<BufferRegions>,
    pub usage: UsageFlags,
    pub width: u32,
    pub height: u32,
    /// Concrete format of the buffer.
    pub format: PixelFormat,
    pub internal_format: u64,
    /// Format the client asked for.
    pub framework_format: PixelFormat,
    /// Row pitch in pixels; 0 for the flexible YUV format.
    pub stride: u32,
    pub vstride: u32,
    pub compressible: bool,
    pub offset: u32,
    pub(crate) lock_usage: UsageFlags,
    pub(crate) lock_offset: u32,
    pub(crate) lock_len: u32,
}

impl BufferHandle {
    pub(crate) fn new(
        layout: &LayoutDescriptor,
        width: u32,
        height: u32,
        usage: UsageFlags,
        regions: BufferRegions,
    ) -> BufferHandle {
        let stride = if layout.framework_format == PixelFormat::YCbCr420Flexible {
            0
        } else {
            layout.stride
        };

        BufferHandle {
            version: GRALLOC_HANDLE_VERSION,
            magic: GRALLOC_MAGIC,
            regions: Some(regions),
            usage,
            width,
            height,
            format: layout.format,
            internal_format: layout.internal_format,
            framework_format: layout.framework_format,
            stride,
            vstride: layout.vstride,
            compressible: layout.compressed,
            offset: 0,
            lock_usage: UsageFlags::empty(),
            lock_offset: 0,
            lock_len: 0,
        }
    }

    /// Fails with `InvalidHandle` unless `validate` accepts the handle.
    pub fn ensure_valid(&self) -> GrallocResult<()> {
        if validate(self) {
            Ok(())
        } else {
            error!(
                "invalid gralloc handle (version {}, magic {:#x})",
                self.version, self.magic
            );
            Err(GrallocError::InvalidHandle)
        }
    }

    pub fn region_count(&self) -> usize {
        self.regions.as_ref().map_or(0, |r| r.len())
    }

    pub fn region(&self, index: usize) -> Option<&BufferRegion> {
        self.regions.as_ref().and_then(|r| r.get(index))
    }

    pub(crate) fn region_mut(&mut self, index: usize) -> Option<&mut BufferRegion> {
        self.regions.as_mut().and_then(|r| r.get_mut(index))
    }

    pub(crate) fn regions_mut(&mut self) -> impl Iterator<Item = &mut BufferRegion> {
        self.regions.iter_mut().flat_map(|r| r.iter_mut())
    }

    /// CPU address of a region, or null if it is absent or unmapped.
    pub fn address(&self, index: usize) -> *mut u8 {
        self.region(index).map_or(ptr::null_mut(), |r| r.address())
    }

    /// Byte size of a region, 0 if absent.
    pub fn region_size(&self, index: usize) -> u64 {
        self.region(index).map_or(0, |r| r.size())
    }

    /// Duplicates the descriptors and serializes the rest of the handle for another process.
    pub fn export(&self) -> GrallocResult<TransferableHandle> {
        self.ensure_valid()?;

        let mut descriptors = Vec::with_capacity(GRALLOC_MAX_REGIONS);
        for region in self.regions.iter().flat_map(|r| r.iter()) {
            descriptors.push(region.region.descriptor().try_clone()?);
        }

        let num_fds = descriptors.len() as u32;
        let header = NativeHandleHeader {
            version: self.version,
            num_fds,
            num_ints: GRALLOC_HANDLE_FIELD_COUNT - num_fds,
        };

        let ints = HandleInts {
            size0: self.region_size(0),
            size1: self.region_size(1),
            size2: self.region_size(2),
            internal_format: self.internal_format,
            magic: self.magic,
            usage: self.usage.bits(),
            offset: self.offset,
            format: self.format.raw(),
            framework_format: self.framework_format.raw(),
            width: self.width,
            height: self.height,
            stride: self.stride,
            vstride: self.vstride,
            compressible: self.compressible as u32,
            lock_usage: self.lock_usage.bits(),
            lock_offset: self.lock_offset,
            lock_len: self.lock_len,
            reserved: 0,
        };

        Ok(TransferableHandle {
            header,
            descriptors,
            ints,
        })
    }

    /// Rebuilds a handle received from another process, checking its structure first.  The
    /// result owns the received descriptors but is neither mapped nor imported.
    pub fn import(transferable: TransferableHandle) -> GrallocResult<BufferHandle> {
        let TransferableHandle {
            header,
            descriptors,
            ints,
        } = transferable;

        if header.version != GRALLOC_HANDLE_VERSION
            || header.num_fds.checked_add(header.num_ints) != Some(GRALLOC_HANDLE_FIELD_COUNT)
            || header.num_fds as usize != descriptors.len()
            || ints.magic != GRALLOC_MAGIC
        {
            error!(
                "rejecting handle: version {} fds {} ints {} magic {:#x}",
                header.version, header.num_fds, header.num_ints, ints.magic
            );
            return Err(GrallocError::InvalidHandle);
        }

        let format = PixelFormat::try_from(ints.format)?;
        let framework_format = PixelFormat::try_from(ints.framework_format)?;
        if format.region_count() != descriptors.len() {
            return Err(GrallocError::InvalidHandle);
        }

        let sizes = [ints.size0, ints.size1, ints.size2];
        let (used, unused) = sizes.split_at(descriptors.len());
        if used.iter().any(|s| *s == 0) || unused.iter().any(|s| *s != 0) {
            return Err(GrallocError::InvalidHandle);
        }

        if !geometry_matches(&ints, format, framework_format, used) {
            error!(
                "rejecting handle: {}x{} {} stride {} vstride {} does not fit sizes {:?}",
                ints.width, ints.height, format, ints.stride, ints.vstride, used
            );
            return Err(GrallocError::InvalidHandle);
        }

        let regions = descriptors
            .into_iter()
            .zip(sizes)
            .map(|(descriptor, size)| BufferRegion::new(HeapRegion::new(descriptor, size)))
            .collect();

        Ok(BufferHandle {
            version: header.version,
            magic: ints.magic,
            regions: Some(BufferRegions::from_regions(regions)?),
            usage: UsageFlags::from_bits_retain(ints.usage),
            width: ints.width,
            height: ints.height,
            format,
            internal_format: ints.internal_format,
            framework_format,
            stride: ints.stride,
            vstride: ints.vstride,
            compressible: ints.compressible != 0,
            offset: ints.offset,
            lock_usage: UsageFlags::from_bits_retain(ints.lock_usage),
            lock_offset: ints.lock_offset,
            lock_len: ints.lock_len,
        })
    }
}

/// Recomputes the layout a received handle claims and checks that its geometry is the one the
/// layout engine produces and that every region is large enough to hold it.
fn geometry_matches(
    ints: &HandleInts,
    format: PixelFormat,
    framework_format: PixelFormat,
    sizes: &[u64],
) -> bool {
    if ints.width == 0 || ints.height == 0 {
        return false;
    }

    let usage = UsageFlags::from_bits_retain(ints.usage);
    let layout = match compute_layout(
        ints.width,
        ints.height,
        framework_format,
        usage,
        &LayoutConfig::minimal(),
    ) {
        Ok(layout) => layout,
        Err(_) => return false,
    };

    let stride = if framework_format == PixelFormat::YCbCr420Flexible {
        0
    } else {
        layout.stride
    };

    layout.format == format
        && stride == ints.stride
        && layout.vstride == ints.vstride
        && layout.region_sizes().len() == sizes.len()
        && layout
            .region_sizes()
            .iter()
            .zip(sizes)
            .all(|(minimum, size)| size >= minimum)
}

/// Returns true if the handle is structurally sound: current version, live magic tag, and
/// exactly as many regions as its format requires.
pub fn validate(handle: &BufferHandle) -> bool {
    handle.version == GRALLOC_HANDLE_VERSION
        && handle.magic == GRALLOC_MAGIC
        && handle
            .regions
            .as_ref()
            .is_some_and(|r| r.len() == handle.format.region_count())
}

/// Fixed header of a transferable handle.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, AsBytes, FromBytes)]
pub struct NativeHandleHeader {
    pub version: u32,
    pub num_fds: u32,
    pub num_ints: u32,
}

/// Integer payload of a transferable handle.  Sizes of absent regions are 0.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, AsBytes, FromBytes)]
pub struct HandleInts {
    pub size0: u64,
    pub size1: u64,
    pub size2: u64,
    pub internal_format: u64,
    pub magic: u32,
    pub usage: u32,
    pub offset: u32,
    pub format: u32,
    pub framework_format: u32,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub vstride: u32,
    pub compressible: u32,
    pub lock_usage: u32,
    pub lock_offset: u32,
    pub lock_len: u32,
    pub reserved: u32,
}

/// A handle in the shape it crosses process boundaries: descriptors travel out of band through
/// the platform's capability-passing primitive, the rest as plain bytes.
#[derive(Debug)]
pub struct TransferableHandle {
    header: NativeHandleHeader,
    descriptors: Vec<SafeDescriptor>,
    ints: HandleInts,
}

impl TransferableHandle {
    pub fn header(&self) -> &NativeHandleHeader {
        &self.header
    }

    pub fn header_bytes(&self) -> &[u8] {
        self.header.as_bytes()
    }

    pub fn int_bytes(&self) -> &[u8] {
        self.ints.as_bytes()
    }

    pub fn descriptors(&self) -> &[SafeDescriptor] {
        &self.descriptors
    }

    /// Reassembles a handle from received bytes and descriptors.  Only the byte lengths are
    /// checked here; `BufferHandle::import` checks the content.
    pub fn from_parts(
        header_bytes: &[u8],
        descriptors: Vec<SafeDescriptor>,
        int_bytes: &[u8],
    ) -> GrallocResult<TransferableHandle> {
        let header = NativeHandleHeader::read_from(header_bytes).ok_or(GrallocError::InvalidHandle)?;
        let ints = HandleInts::read_from(int_bytes).ok_or(GrallocError::InvalidHandle)?;
        Ok(TransferableHandle {
            header,
            descriptors,
            ints,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::CompressionPolicy;
    use crate::gralloc_os::AsRawDescriptor;
    use crate::heap::HeapAllocator;
    use crate::heap::HeapMask;
    use crate::heap::RegionFlags;
    use crate::heap::SystemHeap;
    use crate::layout::compute_layout;
    use crate::layout::LayoutConfig;

    fn make_handle(format: PixelFormat, width: u32, height: u32) -> BufferHandle {
        let config = LayoutConfig {
            compression: CompressionPolicy::disabled(),
            ..Default::default()
        };
        let usage = UsageFlags::SW_READ_OFTEN;
        let layout = compute_layout(width, height, format, usage, &config).unwrap();
        let heap = SystemHeap::new();
        let regions = layout
            .region_sizes()
            .iter()
            .map(|size| {
                BufferRegion::new(
                    heap.acquire_region(*size, HeapMask::SYSTEM, RegionFlags::empty())
                        .unwrap(),
                )
            })
            .collect();
        BufferHandle::new(
            &layout,
            width,
            height,
            usage,
            BufferRegions::from_regions(regions).unwrap(),
        )
    }

    #[test]
    fn wire_shape_is_fixed() {
        assert_eq!(GRALLOC_HANDLE_VERSION, 12);
        assert_eq!(size_of::<HandleInts>(), 88);
        assert_eq!(GRALLOC_HANDLE_FIELD_COUNT, 25);
    }

    #[test]
    fn fresh_handle_is_valid() {
        for format in [
            PixelFormat::Rgba8888,
            PixelFormat::ExynosYCbCr420SpM,
            PixelFormat::ExynosYCbCr420SpMPriv,
        ] {
            let handle = make_handle(format, 64, 64);
            assert!(validate(&handle));
            assert_eq!(handle.region_count(), format.region_count());
        }
    }

    #[test]
    fn corrupted_handle_is_invalid() {
        let mut handle = make_handle(PixelFormat::Rgba8888, 64, 64);
        handle.magic = 0xdead;
        assert!(!validate(&handle));
        assert!(matches!(
            handle.ensure_valid(),
            Err(GrallocError::InvalidHandle)
        ));

        let mut handle = make_handle(PixelFormat::Rgba8888, 64, 64);
        handle.version = 8;
        assert!(!validate(&handle));

        // A three region format described with a single region.
        let mut handle = make_handle(PixelFormat::Rgba8888, 64, 64);
        handle.format = PixelFormat::ExynosYv12M;
        assert!(!validate(&handle));
    }

    #[test]
    fn flexible_format_reports_zero_stride() {
        let handle = make_handle(PixelFormat::YCbCr420Flexible, 64, 48);
        assert_eq!(handle.stride, 0);
        assert_eq!(handle.format, PixelFormat::YCrCb420Sp);
        assert_eq!(handle.framework_format, PixelFormat::YCbCr420Flexible);
    }

    #[test]
    fn export_and_import() {
        let handle = make_handle(PixelFormat::ExynosYCbCr420SpM, 320, 240);
        let exported = handle.export().unwrap();
        assert_eq!(exported.header().num_fds, 2);
        assert_eq!(exported.header().num_ints, GRALLOC_HANDLE_FIELD_COUNT - 2);
        assert_ne!(
            exported.descriptors()[0].as_raw_descriptor(),
            handle.region(0).unwrap().heap_region().as_raw_descriptor()
        );

        let descriptors = exported
            .descriptors()
            .iter()
            .map(|d| d.try_clone().unwrap())
            .collect();
        let received = TransferableHandle::from_parts(
            exported.header_bytes(),
            descriptors,
            exported.int_bytes(),
        )
        .unwrap();
        let imported = BufferHandle::import(received).unwrap();

        assert!(validate(&imported));
        assert_eq!(imported.format, handle.format);
        assert_eq!(imported.stride, handle.stride);
        assert_eq!(imported.vstride, handle.vstride);
        assert_eq!(imported.region_size(0), handle.region_size(0));
        assert_eq!(imported.region_size(1), handle.region_size(1));
        assert!(!imported.region(0).unwrap().is_mapped());
    }

    #[test]
    fn import_rejects_bad_structure() {
        let handle = make_handle(PixelFormat::Rgba8888, 32, 32);

        let exported = handle.export().unwrap();
        let mut header = *exported.header();
        header.num_ints += 1;
        let bad_count =
            TransferableHandle::from_parts(header.as_bytes(), vec![], exported.int_bytes())
                .unwrap();
        assert!(BufferHandle::import(bad_count).is_err());

        // Descriptor missing.
        let exported = handle.export().unwrap();
        let missing = TransferableHandle::from_parts(
            exported.header_bytes(),
            vec![],
            exported.int_bytes(),
        )
        .unwrap();
        assert!(BufferHandle::import(missing).is_err());

        // Stale magic.
        let exported = handle.export().unwrap();
        let mut ints = HandleInts::read_from(exported.int_bytes()).unwrap();
        ints.magic = 0;
        let descriptors = vec![exported.descriptors()[0].try_clone().unwrap()];
        let stale =
            TransferableHandle::from_parts(exported.header_bytes(), descriptors, ints.as_bytes())
                .unwrap();
        assert!(matches!(
            BufferHandle::import(stale),
            Err(GrallocError::InvalidHandle)
        ));

        // Truncated payload.
        let exported = handle.export().unwrap();
        assert!(TransferableHandle::from_parts(
            exported.header_bytes(),
            vec![],
            &exported.int_bytes()[..40],
        )
        .is_err());
    }

    fn resend(handle: &BufferHandle, edit: impl FnOnce(&mut HandleInts)) -> TransferableHandle {
        let exported = handle.export().unwrap();
        let mut ints = HandleInts::read_from(exported.int_bytes()).unwrap();
        edit(&mut ints);
        let descriptors = exported
            .descriptors()
            .iter()
            .map(|d| d.try_clone().unwrap())
            .collect();
        TransferableHandle::from_parts(exported.header_bytes(), descriptors, ints.as_bytes())
            .unwrap()
    }

    #[test]
    fn import_rejects_geometry_larger_than_regions() {
        let handle = make_handle(PixelFormat::Yv12, 64, 64);
        assert!(BufferHandle::import(resend(&handle, |_| ())).is_ok());

        let grown = resend(&handle, |ints| {
            ints.width = 4096;
            ints.height = 4096;
        });
        assert!(matches!(
            BufferHandle::import(grown),
            Err(GrallocError::InvalidHandle)
        ));

        let grown_consistently = resend(&handle, |ints| {
            ints.width = 4096;
            ints.height = 4096;
            ints.stride = 4096;
            ints.vstride = 4096;
        });
        assert!(BufferHandle::import(grown_consistently).is_err());

        let wide_stride = resend(&handle, |ints| ints.stride = 1024);
        assert!(BufferHandle::import(wide_stride).is_err());

        let tall = resend(&handle, |ints| ints.vstride = 1024);
        assert!(BufferHandle::import(tall).is_err());

        let empty = resend(&handle, |ints| ints.width = 0);
        assert!(BufferHandle::import(empty).is_err());

        let shrunk = resend(&handle, |ints| ints.size0 = 64 * 64);
        assert!(BufferHandle::import(shrunk).is_err());

        let relabeled = resend(&handle, |ints| {
            ints.format = PixelFormat::Rgba8888.raw();
            ints.framework_format = PixelFormat::Rgba8888.raw();
        });
        assert!(BufferHandle::import(relabeled).is_err());
    }

    #[test]
    fn import_accepts_grown_regions() {
        let config = LayoutConfig {
            compression: CompressionPolicy::disabled(),
            mscl_align_restriction: true,
            ten_bit_align_restriction: true,
            ..Default::default()
        };
        let usage = UsageFlags::SW_READ_OFTEN;
        let format = PixelFormat::ExynosYCbCr420SpMS10b;
        let layout = compute_layout(100, 60, format, usage, &config).unwrap();
        let heap = SystemHeap::new();
        let regions = layout
            .region_sizes()
            .iter()
            .map(|size| {
                BufferRegion::new(
                    heap.acquire_region(*size, HeapMask::SYSTEM, RegionFlags::empty())
                        .unwrap(),
                )
            })
            .collect();
        let handle = BufferHandle::new(
            &layout,
            100,
            60,
            usage,
            BufferRegions::from_regions(regions).unwrap(),
        );

        let imported = BufferHandle::import(resend(&handle, |_| ())).unwrap();
        assert_eq!(imported.region_size(0), layout.region_size(0).unwrap());
    }

    #[test]
    fn export_of_freed_handle_fails() {
        let mut handle = make_handle(PixelFormat::Rgba8888, 32, 32);
        handle.magic = 0;
        assert!(handle.export().is_err());
    }
}
