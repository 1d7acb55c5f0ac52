// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::gralloc_os::sys::platform::MemoryMapping as PlatformMapping;
use crate::gralloc_os::SafeDescriptor;
use crate::gralloc_utils::GrallocResult;

/// A shared, process-local mapping of a region.  The mapping is torn down when dropped.
#[derive(Debug)]
pub struct MemoryMapping {
    mapping: PlatformMapping,
}

impl MemoryMapping {
    pub fn from_safe_descriptor(
        descriptor: &SafeDescriptor,
        size: usize,
        map_info: u32,
    ) -> GrallocResult<MemoryMapping> {
        let mapping = PlatformMapping::from_safe_descriptor(descriptor, size, map_info)?;
        Ok(MemoryMapping { mapping })
    }

    /// Start of the mapping in this process' address space.
    pub fn as_ptr(&self) -> *mut u8 {
        self.mapping.addr.as_ptr() as *mut u8
    }

    pub fn size(&self) -> usize {
        self.mapping.size
    }
}
