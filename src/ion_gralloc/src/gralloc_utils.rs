// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! gralloc_utils: Error type, result alias and small shared structs needed by the rest of the
//! crate.

use std::ffi::NulError;
use std::io::Error as IoError;
use std::num::TryFromIntError;

#[cfg(unix)]
use nix::Error as NixError;
use remain::sorted;
use thiserror::Error;

use crate::formats::PixelFormat;

/// Reserved trailer appended to every independently allocated plane group.
pub const GRALLOC_EXT_SIZE: u64 = 256;

/// Size of the private metadata plane carried by the PRIV and S10B formats.
pub const GRALLOC_PRIV_SIZE: u64 = 64;

/// Padding appended to the 2-bit tail of the single-region 10-bit formats.
pub const GRALLOC_10B_TAIL_PAD: u64 = 64;

/// Extra bytes required by the scaler when the width is not a multiple of `GRALLOC_MSCL_ALIGN`.
pub const GRALLOC_MSCL_EXT_SIZE: u64 = 512;
pub const GRALLOC_MSCL_ALIGN: u32 = 128;

/// An error generated while using this crate.
#[sorted]
#[derive(Error, Debug)]
pub enum GrallocError {
    /// Checked Arithmetic error
    #[error("arithmetic failed: {}({}) {op} {}({})", .field1.0, .field1.1, .field2.0, .field2.1)]
    CheckedArithmetic {
        field1: (&'static str, u64),
        field2: (&'static str, u64),
        op: &'static str,
    },
    /// Malformed allocation request.
    #[error("invalid gralloc arguments: {0}")]
    InvalidArgs(&'static str),
    /// The format value is not part of the supported enumeration.
    #[error("invalid gralloc format {0:#x}")]
    InvalidFormat(u32),
    /// The handle failed structural validation.
    #[error("invalid gralloc handle")]
    InvalidHandle,
    /// A mapping request that can never succeed (zero size, bad access flags).
    #[error("invalid mapping request: {0}")]
    InvalidMapping(&'static str),
    /// An input/output error occured.
    #[error("an input/output error occur: {0}")]
    IoError(IoError),
    /// The mapping failed.
    #[error("the mapping failed with errno {0}")]
    MapFailed(i32),
    /// Nix crate error.
    #[cfg(unix)]
    #[error("The errno is {0}")]
    NixError(NixError),
    #[error("Nul Error occured {0}")]
    NulError(NulError),
    /// The heap could not provide a region of the requested size.
    #[error("out of memory allocating a {0} byte region")]
    OutOfMemory(u64),
    /// An attempted integer conversion failed.
    #[error("int conversion failed: {0}")]
    TryFromIntError(TryFromIntError),
    /// The format is valid but not addressable by the requested operation.
    #[error("format {0:?} is not supported by this operation")]
    UnsupportedFormat(PixelFormat),
}

#[cfg(unix)]
impl From<NixError> for GrallocError {
    fn from(e: NixError) -> GrallocError {
        GrallocError::NixError(e)
    }
}

impl From<NulError> for GrallocError {
    fn from(e: NulError) -> GrallocError {
        GrallocError::NulError(e)
    }
}

impl From<IoError> for GrallocError {
    fn from(e: IoError) -> GrallocError {
        GrallocError::IoError(e)
    }
}

impl From<TryFromIntError> for GrallocError {
    fn from(e: TryFromIntError) -> GrallocError {
        GrallocError::TryFromIntError(e)
    }
}

/// The result of an operation in this crate.
pub type GrallocResult<T> = std::result::Result<T, GrallocError>;

/// Mapped memory access flags.
pub const GRALLOC_MAP_ACCESS_MASK: u32 = 0xf0;
pub const GRALLOC_MAP_ACCESS_READ: u32 = 0x10;
pub const GRALLOC_MAP_ACCESS_WRITE: u32 = 0x20;
pub const GRALLOC_MAP_ACCESS_RW: u32 = 0x30;

/// The region of a buffer a client intends to touch while it holds a lock.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Rect {
        Rect {
            left,
            top,
            width,
            height,
        }
    }
}

/// Rounds `v` up to the next multiple of `alignment`, which must be a power of two.
#[inline(always)]
pub fn align(v: u64, alignment: u64) -> u64 {
    vmm_sys_util::align_upwards!(v, alignment)
}
