// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! heap: The boundary to the memory-region allocator and the policy that picks heap classes and
//! region flags from usage flags.

#[cfg(test)]
pub(crate) mod fake_heap;
mod system_heap;

use bitflags::bitflags;

use crate::gralloc_os::AsRawDescriptor;
use crate::gralloc_os::RawDescriptor;
use crate::gralloc_os::SafeDescriptor;
use crate::gralloc_utils::*;
use crate::usage::UsageFlags;

pub use system_heap::SystemHeap;

bitflags! {
    /// Heap classes a region may be carved from.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct HeapMask: u32 {
        const SYSTEM = 1 << 0;
        const CONTIG = 1 << 4;
        const CAMERA = 1 << 5;
        const CRYPTO = 1 << 6;
        const SECURE_CAMERA = 1 << 7;
    }
}

bitflags! {
    /// Allocation flags attached to a region request.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RegionFlags: u32 {
        const CACHED = 1 << 0;
        const CACHED_NEEDS_SYNC = 1 << 1;
        const NOZEROED = 1 << 3;
        const PROTECTED = 1 << 4;
        const SYNC_FORCE = 1 << 5;
        const MAY_HWRENDER = 1 << 6;

        const G2D_WFD = 1 << 22;
        const VIDEO_EXT2 = 1 << 25;
        const MFC_OUTPUT = 1 << 27;
        const FIMD_VIDEO = 1 << 29;
        const VIDEO_EXT = 1 << 31;
    }
}

/// A region of memory handed out by a `HeapAllocator`.  Dropping it closes the descriptor.
#[derive(Debug)]
pub struct HeapRegion {
    descriptor: SafeDescriptor,
    size: u64,
}

impl HeapRegion {
    pub fn new(descriptor: SafeDescriptor, size: u64) -> HeapRegion {
        HeapRegion { descriptor, size }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn descriptor(&self) -> &SafeDescriptor {
        &self.descriptor
    }
}

impl AsRawDescriptor for HeapRegion {
    fn as_raw_descriptor(&self) -> RawDescriptor {
        self.descriptor.as_raw_descriptor()
    }
}

/// Per-process token for a region imported into the heap.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImportId(pub u32);

/// Trait implemented by providers of buffer memory.
///
/// Implementations must be safe to call from several threads at once; the allocator holds no
/// lock around them.
pub trait HeapAllocator: Send + Sync {
    /// Acquires a region of at least `size` bytes from one of the heaps in `heap_mask`.
    fn acquire_region(
        &self,
        size: u64,
        heap_mask: HeapMask,
        flags: RegionFlags,
    ) -> GrallocResult<HeapRegion>;

    /// Returns a region to its heap.
    fn release_region(&self, region: HeapRegion);

    /// Flushes and invalidates the CPU caches for the whole region.
    fn sync_region(&self, region: &HeapRegion) -> GrallocResult<()>;

    /// Flushes and invalidates the CPU caches for `len` bytes starting at `offset`.
    fn sync_region_range(&self, region: &HeapRegion, offset: u64, len: u64) -> GrallocResult<()>;

    /// Imports a region received from another process.
    fn import_region(&self, region: &HeapRegion) -> GrallocResult<ImportId>;

    /// Drops an import obtained through `import_region`.
    fn free_import(&self, import: ImportId);
}

/// Picks the heap classes a buffer with `usage` is allocated from.
///
/// With `common` unset only the protected/system split applies.
pub fn select_heap(usage: UsageFlags, common: bool) -> HeapMask {
    let nonsecure = usage.contains(UsageFlags::PRIVATE_NONSECURE);
    let linear = usage.contains(UsageFlags::PHYSICALLY_LINEAR);

    if !common {
        return if usage.is_protected() {
            HeapMask::CONTIG
        } else {
            HeapMask::SYSTEM
        };
    }

    if usage.is_protected() {
        if nonsecure && !linear {
            HeapMask::SYSTEM
        } else {
            HeapMask::CONTIG
        }
    } else if usage.contains(UsageFlags::CAMERA_RESERVED) {
        HeapMask::CAMERA
    } else if nonsecure && linear {
        HeapMask::CRYPTO
    } else if usage.contains(UsageFlags::SECURE_CAMERA_RESERVED) {
        HeapMask::SECURE_CAMERA
    } else {
        HeapMask::SYSTEM
    }
}

/// Region flags every request derives from its usage, before the format family adds its own.
pub fn base_region_flags(usage: UsageFlags) -> RegionFlags {
    let mut flags = RegionFlags::empty();

    if usage.is_sw_read_often() {
        flags |= RegionFlags::CACHED | RegionFlags::CACHED_NEEDS_SYNC;
        if usage.contains(UsageFlags::HW_RENDER) {
            flags |= RegionFlags::SYNC_FORCE;
        }
    }

    if usage.contains(UsageFlags::HW_RENDER) {
        flags |= RegionFlags::MAY_HWRENDER;
    }

    if usage.contains(UsageFlags::NOZEROED) {
        flags |= RegionFlags::NOZEROED;
    }

    flags
}

fn composer_only(usage: UsageFlags) -> bool {
    usage.contains(UsageFlags::HW_COMPOSER)
        && !usage.intersects(UsageFlags::HW_TEXTURE | UsageFlags::HW_RENDER)
}

/// Adds the protection flags of a packed (RGB, raw, blob) buffer.
pub fn packed_region_flags(usage: UsageFlags, base: RegionFlags) -> RegionFlags {
    let nonsecure_linear = usage.contains(UsageFlags::PRIVATE_NONSECURE | UsageFlags::PHYSICALLY_LINEAR);

    let extra = if usage.is_protected() {
        if nonsecure_linear {
            RegionFlags::G2D_WFD
        } else if usage.contains(UsageFlags::VIDEO_EXT) {
            RegionFlags::VIDEO_EXT | RegionFlags::PROTECTED
        } else if composer_only(usage) {
            // DRM playback.
            RegionFlags::FIMD_VIDEO | RegionFlags::PROTECTED
        } else {
            RegionFlags::MFC_OUTPUT | RegionFlags::PROTECTED
        }
    } else if nonsecure_linear {
        RegionFlags::PROTECTED
    } else {
        RegionFlags::empty()
    };

    base | extra
}

/// Adds the protection flags of a YUV buffer.
pub fn yuv_region_flags(usage: UsageFlags, base: RegionFlags) -> RegionFlags {
    let extra = if usage.is_protected() {
        let sub_case = if usage.contains(UsageFlags::VIDEO_EXT) {
            RegionFlags::VIDEO_EXT
        } else if usage.contains(UsageFlags::PROTECTED_DPB) {
            RegionFlags::VIDEO_EXT2
        } else if composer_only(usage) {
            RegionFlags::FIMD_VIDEO
        } else {
            RegionFlags::MFC_OUTPUT
        };
        RegionFlags::PROTECTED | sub_case
    } else if usage.contains(UsageFlags::CAMERA_RESERVED) {
        RegionFlags::MFC_OUTPUT
    } else {
        RegionFlags::empty()
    };

    base | extra
}
