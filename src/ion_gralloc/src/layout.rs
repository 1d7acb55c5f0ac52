// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! layout: Computes the memory geometry of a buffer from its width, height, format and usage.
//!
//! Every buffer is made of one to three independently allocated regions.  Region 0 always holds
//! luma (or the whole image for single-region formats); region 1 holds chroma; region 2 holds
//! either a second chroma plane or the private metadata plane, depending on the format.

use std::cmp::max;

use log::debug;

use crate::compression::compressed_size;
use crate::compression::is_compressible;
use crate::compression::select_format;
use crate::compression::CompressionPolicy;
use crate::formats::FormatFamily;
use crate::formats::FrameworkYuvRule;
use crate::formats::PixelFormat;
use crate::formats::YuvPlaneRule;
use crate::gralloc_utils::*;
use crate::usage::UsageFlags;

const ROW_ALIGN: u64 = 16;
const SEMI_PLANAR_CHROMA_VALIGN: u64 = 8;

/// Deployment knobs that change the size formulas.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LayoutConfig {
    pub compression: CompressionPolicy,
    /// Alignment of the chroma vertical stride of multi-region 4:2:0 formats.
    pub chroma_valign: Option<u32>,
    /// Grow regions when the width is not a multiple of the scaler alignment.
    pub mscl_align_restriction: bool,
    /// Size 10-bit tails with the aligned vertical stride instead of the height.
    pub ten_bit_align_restriction: bool,
}

impl LayoutConfig {
    /// The configuration yielding the smallest regions any deployment allocates.  A buffer
    /// received from another process must be at least this large.
    pub fn minimal() -> LayoutConfig {
        LayoutConfig {
            compression: CompressionPolicy::disabled(),
            chroma_valign: Some(1),
            mscl_align_restriction: false,
            ten_bit_align_restriction: false,
        }
    }
}

/// The computed geometry of a buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LayoutDescriptor {
    /// The concrete format the buffer is laid out as.
    pub format: PixelFormat,
    /// The format originally requested.
    pub framework_format: PixelFormat,
    pub internal_format: u64,
    /// Row pitch in pixels.
    pub stride: u32,
    /// Row pitch of the first plane in bytes.
    pub byte_stride: u64,
    pub vstride: u32,
    regions: usize,
    sizes: [u64; 3],
    pub compressed: bool,
}

impl LayoutDescriptor {
    fn new(
        format: PixelFormat,
        framework_format: PixelFormat,
        stride: u64,
        byte_stride: u64,
        vstride: u64,
    ) -> GrallocResult<LayoutDescriptor> {
        Ok(LayoutDescriptor {
            format,
            framework_format,
            internal_format: format.raw() as u64,
            stride: stride.try_into()?,
            byte_stride,
            vstride: vstride.try_into()?,
            regions: 0,
            sizes: [0; 3],
            compressed: false,
        })
    }

    fn with_regions(mut self, sizes: &[u64]) -> LayoutDescriptor {
        self.regions = sizes.len();
        self.sizes[..sizes.len()].copy_from_slice(sizes);
        self
    }

    /// Number of regions to allocate.
    pub fn regions(&self) -> usize {
        self.regions
    }

    /// Byte size of every region, in allocation order.
    pub fn region_sizes(&self) -> &[u64] {
        &self.sizes[..self.regions]
    }

    /// Byte size of a single region.
    pub fn region_size(&self, index: usize) -> Option<u64> {
        self.region_sizes().get(index).copied()
    }

    pub fn total_size(&self) -> u64 {
        self.region_sizes().iter().sum()
    }
}

/// Appends the reserved trailer to a plane.
fn with_trailer(plane: u64) -> GrallocResult<u64> {
    let trailer = GRALLOC_EXT_SIZE;
    checked_arithmetic!(plane + trailer)
}

fn grow(size: u64, extra: u64) -> GrallocResult<u64> {
    checked_arithmetic!(size + extra)
}

/// Resolves the platform-abstract formats to a concrete format using the usage flags.  Concrete
/// formats are returned unchanged.
pub fn resolve_format(format: PixelFormat, usage: UsageFlags) -> PixelFormat {
    let resolved = match format {
        PixelFormat::ImplementationDefined => {
            if usage.is_camera_zsl() {
                PixelFormat::YCbCr422I
            } else if usage.intersects(UsageFlags::HW_TEXTURE | UsageFlags::HW_COMPOSER) {
                if usage.contains(UsageFlags::YUV_RANGE_FULL) {
                    PixelFormat::ExynosYCrCb420SpMFull
                } else {
                    PixelFormat::ExynosYCrCb420SpM
                }
            } else {
                PixelFormat::ExynosYCrCb420SpM
            }
        }
        PixelFormat::YCbCr420Flexible => {
            if usage.contains(UsageFlags::HW_VIDEO_ENCODER) {
                PixelFormat::ExynosYCbCr420SpM
            } else {
                PixelFormat::YCrCb420Sp
            }
        }
        other => return other,
    };

    debug!("resolved {} to {} for usage {:#x}", format, resolved, usage.bits());
    resolved
}

/// Computes the layout of a buffer, trying the packed formats first and the YUV formats second.
pub fn compute_layout(
    width: u32,
    height: u32,
    format: PixelFormat,
    usage: UsageFlags,
    config: &LayoutConfig,
) -> GrallocResult<LayoutDescriptor> {
    match rgb_layout(width, height, format, usage, config) {
        Err(GrallocError::InvalidFormat(_)) => yuv_layout(width, height, format, usage, config),
        result => result,
    }
}

/// Layout of the single-region packed formats and the blob format.  Fails with `InvalidFormat`
/// for anything else.
pub fn rgb_layout(
    width: u32,
    height: u32,
    format: PixelFormat,
    usage: UsageFlags,
    config: &LayoutConfig,
) -> GrallocResult<LayoutDescriptor> {
    let w = width as u64;
    let h = height as u64;

    let bytes_per_pixel = match format.info().family {
        FormatFamily::Blob => {
            let size = checked_arithmetic!(w * h)?;
            return Ok(LayoutDescriptor::new(format, format, w, w, h)?.with_regions(&[size]));
        }
        FormatFamily::Packed { bytes_per_pixel } => bytes_per_pixel as u64,
        _ => return Err(GrallocError::InvalidFormat(format.raw())),
    };

    let stride = align(w, ROW_ALIGN);
    let bytes_per_row = checked_arithmetic!(stride * bytes_per_pixel)?;
    let vstride = align(h, ROW_ALIGN);

    // Some consumers read one row past the nominal height.
    let rows = max(vstride, h + 2);
    let mut size = with_trailer(checked_arithmetic!(bytes_per_row * rows)?)?;

    let compressed = is_compressible(width, height, format, usage, &config.compression);
    if compressed {
        size = compressed_size(stride, h, bytes_per_pixel)?;
    }

    if config.mscl_align_restriction && width % GRALLOC_MSCL_ALIGN != 0 {
        size = grow(size, GRALLOC_MSCL_EXT_SIZE)?;
    }

    let mut layout =
        LayoutDescriptor::new(format, format, stride, bytes_per_row, vstride)?.with_regions(&[size]);
    layout.compressed = compressed;
    layout.internal_format = select_format(format, usage, compressed);
    Ok(layout)
}

/// Layout of the YUV formats, resolving abstract formats first.  Fails with `InvalidFormat` for
/// packed formats.
pub fn yuv_layout(
    width: u32,
    height: u32,
    format: PixelFormat,
    usage: UsageFlags,
    config: &LayoutConfig,
) -> GrallocResult<LayoutDescriptor> {
    let framework_format = format;
    let format = resolve_format(format, usage);

    match format.info().family {
        FormatFamily::FrameworkYuv(rule) => {
            framework_yuv_layout(width, height, format, framework_format, rule, config)
        }
        FormatFamily::Yuv(rule) => {
            multi_plane_layout(width, height, format, framework_format, rule, config)
        }
        _ => Err(GrallocError::InvalidFormat(framework_format.raw())),
    }
}

fn framework_yuv_layout(
    width: u32,
    height: u32,
    format: PixelFormat,
    framework_format: PixelFormat,
    rule: FrameworkYuvRule,
    config: &LayoutConfig,
) -> GrallocResult<LayoutDescriptor> {
    let w = width as u64;
    let h = height as u64;

    let (stride, byte_stride, mut size) = match rule {
        FrameworkYuvRule::Planar420 => {
            let stride = align(w, ROW_ALIGN);
            let luma = checked_arithmetic!(stride * h)?;
            let chroma_stride = align(stride / 2, ROW_ALIGN);
            let chroma = checked_arithmetic!(chroma_stride * h)?;
            (stride, stride, with_trailer(grow(luma, chroma)?)?)
        }
        FrameworkYuvRule::SemiPlanar420 => {
            let luma = checked_arithmetic!(w * h)?;
            let three = 3u64;
            let tripled = checked_arithmetic!(luma * three)?;
            (w, w, with_trailer(tripled / 2)?)
        }
        FrameworkYuvRule::Luma { bytes_per_pixel } => {
            let stride = align(w, ROW_ALIGN);
            let bpp = bytes_per_pixel as u64;
            let byte_stride = stride * bpp;
            (stride, byte_stride, checked_arithmetic!(byte_stride * h)?)
        }
    };

    if config.mscl_align_restriction && width % GRALLOC_MSCL_ALIGN != 0 {
        size = grow(size, GRALLOC_MSCL_EXT_SIZE)?;
    }

    Ok(
        LayoutDescriptor::new(format, framework_format, stride, byte_stride, h)?
            .with_regions(&[size]),
    )
}

fn multi_plane_layout(
    width: u32,
    height: u32,
    format: PixelFormat,
    framework_format: PixelFormat,
    rule: YuvPlaneRule,
    config: &LayoutConfig,
) -> GrallocResult<LayoutDescriptor> {
    let w = width as u64;
    let h = height as u64;
    let chroma_valign = config.chroma_valign.map(u64::from);

    let mut stride = align(w, ROW_ALIGN);
    let mut luma_vstride = align(h, ROW_ALIGN);
    let mut byte_stride = stride;
    // Row pitch of the 2-bit tail of the 10-bit formats.
    let tail_stride = align(w / 4, ROW_ALIGN);

    let (mut luma, mut chroma) = match rule {
        YuvPlaneRule::Planar420 => {
            stride = align(w, 32);
            byte_stride = stride;
            let chroma_rows = match chroma_valign {
                Some(a) => align(luma_vstride / 2, a),
                None => luma_vstride / 2,
            };
            let chroma_stride = align(stride / 2, ROW_ALIGN);
            (
                with_trailer(checked_arithmetic!(luma_vstride * stride)?)?,
                with_trailer(checked_arithmetic!(chroma_rows * chroma_stride)?)?,
            )
        }
        YuvPlaneRule::Tiled420 => {
            luma_vstride = align(h, 32);
            let chroma_vstride = align(h / 2, 32);
            (
                with_trailer(checked_arithmetic!(luma_vstride * stride)?)?,
                with_trailer(checked_arithmetic!(chroma_vstride * stride)?)?,
            )
        }
        YuvPlaneRule::SemiPlanar420 => {
            let chroma_rows = align(
                luma_vstride / 2,
                chroma_valign.unwrap_or(SEMI_PLANAR_CHROMA_VALIGN),
            );
            (
                with_trailer(checked_arithmetic!(stride * luma_vstride)?)?,
                with_trailer(checked_arithmetic!(stride * chroma_rows)?)?,
            )
        }
        YuvPlaneRule::SemiPlanar420Priv => {
            luma_vstride = align(h, 32);
            let chroma_rows = align(luma_vstride / 2, SEMI_PLANAR_CHROMA_VALIGN);
            (
                with_trailer(checked_arithmetic!(stride * luma_vstride)?)?,
                with_trailer(checked_arithmetic!(stride * chroma_rows)?)?,
            )
        }
        YuvPlaneRule::Interleaved422 => {
            luma_vstride = h;
            byte_stride = stride * 2;
            (with_trailer(checked_arithmetic!(luma_vstride * byte_stride)?)?, 0)
        }
        YuvPlaneRule::SemiPlanar420Single => {
            let luma_plane = checked_arithmetic!(stride * luma_vstride)?;
            let chroma = match chroma_valign {
                Some(a) => {
                    let chroma_rows = align(luma_vstride / 2, a);
                    align(with_trailer(checked_arithmetic!(stride * chroma_rows)?)?, ROW_ALIGN)
                }
                None => align(with_trailer(luma_plane / 2)?, ROW_ALIGN),
            };
            (grow(with_trailer(luma_plane)?, chroma)?, chroma)
        }
        YuvPlaneRule::SemiPlanar420Split10 => {
            let (tail_luma_rows, tail_chroma_rows) = if config.ten_bit_align_restriction {
                (luma_vstride, luma_vstride / 2)
            } else {
                (h, h / 2)
            };
            let luma_plane = checked_arithmetic!(stride * luma_vstride)?;
            let luma_tail = checked_arithmetic!(tail_stride * tail_luma_rows)?;
            let chroma_tail = checked_arithmetic!(tail_stride * tail_chroma_rows)?;
            (
                grow(with_trailer(luma_plane)?, with_trailer(luma_tail)?)?,
                grow(with_trailer(luma_plane / 2)?, with_trailer(chroma_tail)?)?,
            )
        }
        YuvPlaneRule::SemiPlanar420Single10 => {
            let luma_plane = checked_arithmetic!(stride * luma_vstride)?;
            let luma_tail = checked_arithmetic!(tail_stride * luma_vstride)?;
            let chroma_tail = tail_stride * (luma_vstride / 2);
            let chroma_tail = grow(chroma_tail, GRALLOC_10B_TAIL_PAD)?;
            let chroma = grow(align(with_trailer(luma_plane / 2)?, ROW_ALIGN), chroma_tail)?;
            let luma_tail = grow(luma_tail, GRALLOC_10B_TAIL_PAD)?;
            let luma = grow(with_trailer(luma_plane)?, luma_tail)?;
            (grow(luma, chroma)?, chroma)
        }
        YuvPlaneRule::P010 => {
            byte_stride = stride * 2;
            let luma_plane = checked_arithmetic!(byte_stride * luma_vstride)?;
            (with_trailer(luma_plane)?, with_trailer(luma_plane / 2)?)
        }
    };

    if config.mscl_align_restriction && width % GRALLOC_MSCL_ALIGN != 0 {
        luma = grow(luma, GRALLOC_MSCL_EXT_SIZE)?;
        chroma = grow(chroma, GRALLOC_MSCL_EXT_SIZE / 2)?;
    }

    let info = format.info();
    let extra = if info.private_plane {
        GRALLOC_PRIV_SIZE
    } else {
        chroma
    };
    let sizes = [luma, chroma, extra];

    Ok(
        LayoutDescriptor::new(format, framework_format, stride, byte_stride, luma_vstride)?
            .with_regions(&sizes[..info.regions]),
    )
}
