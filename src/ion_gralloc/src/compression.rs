// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! compression: Decides whether a buffer may use block-compressed (AFBC) storage and computes
//! the size of the compressed layout.

use crate::formats::PixelFormat;
use crate::formats::GRALLOC_INTFMT_AFBC;
use crate::gralloc_utils::*;
use crate::usage::UsageFlags;

/// Width and height of one compression block, in pixels.
pub const AFBC_PIXELS_PER_BLOCK: u64 = 16;
/// Header bytes per compression block.
pub const AFBC_HEADER_BYTES_PER_BLOCK: u64 = 16;
/// Alignment of the header area; the body starts right after it.
pub const AFBC_BODY_ALIGNMENT: u64 = 1024;

/// Default minimum dimension (exclusive) for which compression pays off.
pub const AFBC_MIN_DIMENSION: u32 = 192;

/// Runtime knobs of the compression selector.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CompressionPolicy {
    pub enabled: bool,
    /// Buffers with either dimension at or below this value stay linear.
    pub min_dimension: u32,
}

impl Default for CompressionPolicy {
    fn default() -> CompressionPolicy {
        CompressionPolicy {
            enabled: true,
            min_dimension: AFBC_MIN_DIMENSION,
        }
    }
}

impl CompressionPolicy {
    /// A policy under which nothing is ever compressed.
    pub fn disabled() -> CompressionPolicy {
        CompressionPolicy {
            enabled: false,
            ..Default::default()
        }
    }

    fn active(&self) -> bool {
        cfg!(feature = "afbc") && self.enabled
    }
}

/// Returns true if a buffer with the given geometry, concrete format and usage may be stored
/// block-compressed.
pub fn is_compressible(
    width: u32,
    height: u32,
    format: PixelFormat,
    usage: UsageFlags,
    policy: &CompressionPolicy,
) -> bool {
    if !policy.active() {
        return false;
    }

    match format {
        PixelFormat::Rgba8888 | PixelFormat::Bgra8888 | PixelFormat::Rgbx8888 | PixelFormat::Yv12 => (),
        _ => return false,
    }

    if usage.is_protected() {
        return false;
    }

    if width <= policy.min_dimension || height <= policy.min_dimension {
        return false;
    }

    if usage.has_sw_access() || usage.is_empty() {
        return false;
    }

    if usage.contains(UsageFlags::HW_VIDEO_ENCODER) {
        return false;
    }

    let framebuffer_target = UsageFlags::HW_FB | UsageFlags::HW_RENDER | UsageFlags::HW_COMPOSER;
    let general_ui = UsageFlags::HW_TEXTURE | UsageFlags::HW_COMPOSER;
    usage.intersects(framebuffer_target) || usage.intersects(general_ui)
}

/// Returns the internal format for `format`: the raw format value, with the AFBC bit set when
/// the buffer is compressed and only touched by hardware.
pub fn select_format(format: PixelFormat, usage: UsageFlags, compressible: bool) -> u64 {
    let internal = format.raw() as u64;
    if usage.has_sw_access() || usage.is_empty() || !compressible {
        return internal;
    }

    internal | GRALLOC_INTFMT_AFBC
}

/// Size in bytes of a compressed single-plane buffer: the body, the block header area and the
/// reserved trailer.
///
/// `stride` is in pixels and must already be a multiple of the block width.
pub fn compressed_size(stride: u64, height: u64, bytes_per_pixel: u64) -> GrallocResult<u64> {
    let aligned_height = align(height, AFBC_PIXELS_PER_BLOCK);
    let nblocks = (stride / AFBC_PIXELS_PER_BLOCK) * (aligned_height / AFBC_PIXELS_PER_BLOCK);

    let body_rows = checked_arithmetic!(stride * aligned_height)?;
    let body = checked_arithmetic!(body_rows * bytes_per_pixel)?;
    let header_bytes = checked_arithmetic!(nblocks * AFBC_HEADER_BYTES_PER_BLOCK)?;
    let header = align(header_bytes, AFBC_BODY_ALIGNMENT);

    let trailer = GRALLOC_EXT_SIZE;
    let size = checked_arithmetic!(body + header)?;
    checked_arithmetic!(size + trailer)
}
