// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Heap backed by anonymous shared memory.  Every heap class is served from memfd, so the
//! heap mask and protection flags only show up in the trace log.

use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use log::error;
use log::trace;

use crate::gralloc_os::round_up_to_page_size;
use crate::gralloc_os::AsRawDescriptor;
use crate::gralloc_os::SafeDescriptor;
use crate::gralloc_os::SharedMemory;
use crate::gralloc_utils::*;
use crate::heap::HeapAllocator;
use crate::heap::HeapMask;
use crate::heap::HeapRegion;
use crate::heap::ImportId;
use crate::heap::RegionFlags;

/// A heap allocating exportable system memory.
pub struct SystemHeap {
    next_import: AtomicU32,
}

impl SystemHeap {
    pub fn new() -> SystemHeap {
        SystemHeap {
            next_import: AtomicU32::new(1),
        }
    }
}

impl Default for SystemHeap {
    fn default() -> SystemHeap {
        SystemHeap::new()
    }
}

impl HeapAllocator for SystemHeap {
    fn acquire_region(
        &self,
        size: u64,
        heap_mask: HeapMask,
        flags: RegionFlags,
    ) -> GrallocResult<HeapRegion> {
        let shm = round_up_to_page_size(size)
            .and_then(|aligned| SharedMemory::new("ion_gralloc", aligned))
            .map_err(|e| {
                error!("failed to allocate {} bytes from {:?}: {}", size, heap_mask, e);
                GrallocError::OutOfMemory(size)
            })?;

        trace!(
            "allocated region fd {} size {} heap {:?} flags {:?}",
            shm.as_raw_descriptor(),
            size,
            heap_mask,
            flags
        );
        Ok(HeapRegion::new(SafeDescriptor::from(shm), size))
    }

    fn release_region(&self, region: HeapRegion) {
        trace!("releasing region fd {}", region.as_raw_descriptor());
    }

    fn sync_region(&self, region: &HeapRegion) -> GrallocResult<()> {
        trace!("sync fd {}", region.as_raw_descriptor());
        Ok(())
    }

    fn sync_region_range(&self, region: &HeapRegion, offset: u64, len: u64) -> GrallocResult<()> {
        trace!(
            "sync fd {} range {}+{}",
            region.as_raw_descriptor(),
            offset,
            len
        );
        Ok(())
    }

    fn import_region(&self, region: &HeapRegion) -> GrallocResult<ImportId> {
        let id = ImportId(self.next_import.fetch_add(1, Ordering::Relaxed));
        trace!("imported fd {} as {:?}", region.as_raw_descriptor(), id);
        Ok(id)
    }

    fn free_import(&self, import: ImportId) {
        trace!("freed import {:?}", import);
    }
}
