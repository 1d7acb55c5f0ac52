// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A recording heap for unit tests.  Regions are real memfds so they can be mapped; selected
//! acquisitions can be made to fail.

use std::collections::HashSet;
use std::env;
use std::fs::File;
use std::sync::Mutex;

use crate::gralloc_os::AsRawDescriptor;
use crate::gralloc_os::RawDescriptor;
use crate::gralloc_os::SafeDescriptor;
use crate::gralloc_utils::*;
use crate::heap::HeapAllocator;
use crate::heap::HeapMask;
use crate::heap::HeapRegion;
use crate::heap::ImportId;
use crate::heap::RegionFlags;
use crate::heap::SystemHeap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Acquisition {
    pub size: u64,
    pub heap_mask: HeapMask,
    pub flags: RegionFlags,
    pub succeeded: bool,
}

#[derive(Default)]
struct FakeHeapState {
    fail_calls: HashSet<usize>,
    unmappable_calls: HashSet<usize>,
    acquisitions: Vec<Acquisition>,
    released: Vec<u64>,
    syncs: Vec<(RawDescriptor, Option<(u64, u64)>)>,
    imports: u32,
    freed_imports: Vec<ImportId>,
}

#[derive(Default)]
pub struct FakeHeap {
    inner: SystemHeap,
    state: Mutex<FakeHeapState>,
}

impl FakeHeap {
    pub fn new() -> FakeHeap {
        Default::default()
    }

    /// Makes the `call`-th (zero based) acquisition fail.
    pub fn fail_call(self, call: usize) -> FakeHeap {
        self.state.lock().unwrap().fail_calls.insert(call);
        self
    }

    /// Makes the `call`-th (zero based) acquisition return a region backed by a read-only file,
    /// which can't be mapped for writing.
    pub fn unmappable_call(self, call: usize) -> FakeHeap {
        self.state.lock().unwrap().unmappable_calls.insert(call);
        self
    }

    pub fn acquisitions(&self) -> Vec<Acquisition> {
        self.state.lock().unwrap().acquisitions.clone()
    }

    /// Sizes of released regions, in release order.
    pub fn released(&self) -> Vec<u64> {
        self.state.lock().unwrap().released.clone()
    }

    pub fn syncs(&self) -> Vec<(RawDescriptor, Option<(u64, u64)>)> {
        self.state.lock().unwrap().syncs.clone()
    }

    pub fn clear_syncs(&self) {
        self.state.lock().unwrap().syncs.clear();
    }

    pub fn freed_imports(&self) -> Vec<ImportId> {
        self.state.lock().unwrap().freed_imports.clone()
    }
}

impl HeapAllocator for FakeHeap {
    fn acquire_region(
        &self,
        size: u64,
        heap_mask: HeapMask,
        flags: RegionFlags,
    ) -> GrallocResult<HeapRegion> {
        let mut state = self.state.lock().unwrap();
        let call = state.acquisitions.len();
        let succeeded = !state.fail_calls.contains(&call);
        state.acquisitions.push(Acquisition {
            size,
            heap_mask,
            flags,
            succeeded,
        });

        if !succeeded {
            return Err(GrallocError::OutOfMemory(size));
        }

        if state.unmappable_calls.contains(&call) {
            let file = File::open(env::current_exe()?)?;
            return Ok(HeapRegion::new(SafeDescriptor::from(file), size));
        }

        self.inner.acquire_region(size, heap_mask, flags)
    }

    fn release_region(&self, region: HeapRegion) {
        self.state.lock().unwrap().released.push(region.size());
    }

    fn sync_region(&self, region: &HeapRegion) -> GrallocResult<()> {
        self.state
            .lock()
            .unwrap()
            .syncs
            .push((region.as_raw_descriptor(), None));
        Ok(())
    }

    fn sync_region_range(&self, region: &HeapRegion, offset: u64, len: u64) -> GrallocResult<()> {
        self.state
            .lock()
            .unwrap()
            .syncs
            .push((region.as_raw_descriptor(), Some((offset, len))));
        Ok(())
    }

    fn import_region(&self, _region: &HeapRegion) -> GrallocResult<ImportId> {
        let mut state = self.state.lock().unwrap();
        state.imports += 1;
        Ok(ImportId(state.imports))
    }

    fn free_import(&self, import: ImportId) {
        self.state.lock().unwrap().freed_imports.push(import);
    }
}
