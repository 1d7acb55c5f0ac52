// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::num::NonZeroUsize;
use std::ptr::NonNull;

use libc::c_void;
use log::error;
use nix::sys::mman::mmap;
use nix::sys::mman::munmap;
use nix::sys::mman::MapFlags;
use nix::sys::mman::ProtFlags;

use crate::gralloc_os::descriptor::SafeDescriptor;
use crate::gralloc_utils::GrallocError;
use crate::gralloc_utils::GrallocResult;

use crate::gralloc_utils::GRALLOC_MAP_ACCESS_MASK;
use crate::gralloc_utils::GRALLOC_MAP_ACCESS_READ;
use crate::gralloc_utils::GRALLOC_MAP_ACCESS_RW;
use crate::gralloc_utils::GRALLOC_MAP_ACCESS_WRITE;

/// Wraps a shared memory mapping in the current process. Provides RAII semantics including
/// munmap when no longer needed.
#[derive(Debug)]
pub struct MemoryMapping {
    pub addr: NonNull<c_void>,
    pub size: usize,
}

// Safe because the mapping is exclusively owned and only handed out as a raw address.
unsafe impl Send for MemoryMapping {}
unsafe impl Sync for MemoryMapping {}

impl Drop for MemoryMapping {
    fn drop(&mut self) {
        // This is safe because we mmap the area at addr ourselves, and nobody
        // else is holding a reference to it.
        if let Err(e) = unsafe { munmap(self.addr, self.size) } {
            error!(
                "could not unmap {:p} ({} bytes): {}",
                self.addr.as_ptr(),
                self.size,
                e
            );
        }
    }
}

impl MemoryMapping {
    pub fn from_safe_descriptor(
        descriptor: &SafeDescriptor,
        size: usize,
        map_info: u32,
    ) -> GrallocResult<MemoryMapping> {
        let prot = match map_info & GRALLOC_MAP_ACCESS_MASK {
            GRALLOC_MAP_ACCESS_READ => ProtFlags::PROT_READ,
            GRALLOC_MAP_ACCESS_WRITE => ProtFlags::PROT_WRITE,
            GRALLOC_MAP_ACCESS_RW => ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            _ => return Err(GrallocError::InvalidMapping("incorrect access flags")),
        };

        let non_zero_size =
            NonZeroUsize::new(size).ok_or(GrallocError::InvalidMapping("zero size mapping"))?;

        // Safe because the kernel picks the address and we own the returned mapping.
        let addr = unsafe {
            mmap(
                None,
                non_zero_size,
                prot,
                MapFlags::MAP_SHARED,
                descriptor,
                0,
            )
        }
        .map_err(|e| GrallocError::MapFailed(e as i32))?;

        Ok(MemoryMapping { addr, size })
    }
}
