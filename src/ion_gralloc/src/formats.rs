// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! formats: The pixel format enumeration and the per-format table that drives both the layout
//! engine and the plane addressing done by the mapper.

use std::fmt;

use crate::gralloc_utils::*;

/// Bit of the internal format that marks block-compressed (AFBC) storage.
pub const GRALLOC_INTFMT_AFBC: u64 = 1 << 32;

/// A pixel format identifier.  Values match the platform HAL numbering.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PixelFormat {
    Rgba8888 = 0x1,
    Rgbx8888 = 0x2,
    Rgb888 = 0x3,
    Rgb565 = 0x4,
    Bgra8888 = 0x5,
    YCrCb420Sp = 0x11,
    YCbCr422I = 0x14,
    RgbaFp16 = 0x16,
    Raw16 = 0x20,
    Blob = 0x21,
    ImplementationDefined = 0x22,
    YCbCr420Flexible = 0x23,
    RawOpaque = 0x24,
    Raw10 = 0x25,
    Raw12 = 0x26,
    Rgba1010102 = 0x2b,
    Y8 = 0x2020_3859,
    Y16 = 0x2036_3159,
    Yv12 = 0x3231_5659,
    ExynosYCbCr420PM = 0x101,
    ExynosYCbCr420SpM = 0x105,
    ExynosYCbCr420SpMTiled = 0x107,
    ExynosArgb8888 = 0x108,
    ExynosYv12M = 0x11c,
    ExynosYCrCb420SpM = 0x11d,
    ExynosYCrCb420SpMFull = 0x11e,
    ExynosYCbCr420P = 0x11f,
    ExynosYCbCr420SpMPriv = 0x121,
    ExynosYCbCr420Spn = 0x123,
    ExynosYCbCr420SpMS10b = 0x125,
    ExynosYCbCr420SpnS10b = 0x126,
    ExynosYCbCrP010M = 0x127,
}

impl PixelFormat {
    /// Every format this allocator knows about.
    pub const ALL: [PixelFormat; 32] = [
        PixelFormat::Rgba8888,
        PixelFormat::Rgbx8888,
        PixelFormat::Rgb888,
        PixelFormat::Rgb565,
        PixelFormat::Bgra8888,
        PixelFormat::YCrCb420Sp,
        PixelFormat::YCbCr422I,
        PixelFormat::RgbaFp16,
        PixelFormat::Raw16,
        PixelFormat::Blob,
        PixelFormat::ImplementationDefined,
        PixelFormat::YCbCr420Flexible,
        PixelFormat::RawOpaque,
        PixelFormat::Raw10,
        PixelFormat::Raw12,
        PixelFormat::Rgba1010102,
        PixelFormat::Y8,
        PixelFormat::Y16,
        PixelFormat::Yv12,
        PixelFormat::ExynosYCbCr420PM,
        PixelFormat::ExynosYCbCr420SpM,
        PixelFormat::ExynosYCbCr420SpMTiled,
        PixelFormat::ExynosArgb8888,
        PixelFormat::ExynosYv12M,
        PixelFormat::ExynosYCrCb420SpM,
        PixelFormat::ExynosYCrCb420SpMFull,
        PixelFormat::ExynosYCbCr420P,
        PixelFormat::ExynosYCbCr420SpMPriv,
        PixelFormat::ExynosYCbCr420Spn,
        PixelFormat::ExynosYCbCr420SpMS10b,
        PixelFormat::ExynosYCbCr420SpnS10b,
        PixelFormat::ExynosYCbCrP010M,
    ];

    /// Returns the raw HAL value of the format.
    pub fn raw(self) -> u32 {
        self as u32
    }

    /// Returns the table entry describing this format.
    pub fn info(self) -> &'static FormatInfo {
        use PixelFormat::*;
        match self {
            RgbaFp16 => &PACKED_8BPP,
            ExynosArgb8888 | Rgba8888 | Rgbx8888 | Bgra8888 | Rgba1010102 => &PACKED_4BPP,
            Rgb888 => &PACKED_3BPP,
            Rgb565 | Raw16 | RawOpaque => &PACKED_2BPP,
            Raw10 | Raw12 => &PACKED_2BPP_NO_LOCK,
            Blob => &BLOB,
            ImplementationDefined | YCbCr420Flexible => &ABSTRACT,
            Yv12 => &FRAMEWORK_YV12,
            ExynosYCbCr420P => &FRAMEWORK_YCBCR_420_P,
            YCrCb420Sp => &FRAMEWORK_NV21,
            Y8 => &FRAMEWORK_Y8,
            Y16 => &FRAMEWORK_Y16,
            ExynosYv12M => &MULTI_YV12,
            ExynosYCbCr420PM => &MULTI_YCBCR_420_P,
            ExynosYCbCr420SpMTiled => &MULTI_TILED,
            ExynosYCrCb420SpM | ExynosYCrCb420SpMFull => &MULTI_NV21,
            ExynosYCbCr420SpM => &MULTI_NV12,
            ExynosYCbCr420SpMPriv => &MULTI_NV12_PRIV,
            YCbCr422I => &INTERLEAVED_422,
            ExynosYCbCr420Spn => &SINGLE_SPN,
            ExynosYCbCr420SpMS10b => &MULTI_S10B,
            ExynosYCbCr420SpnS10b => &SINGLE_SPN_S10B,
            ExynosYCbCrP010M => &MULTI_P010,
        }
    }

    /// Returns true if the format must be resolved against usage flags before it can be laid out.
    pub fn is_abstract(self) -> bool {
        matches!(self.info().family, FormatFamily::Abstract)
    }

    /// Number of independently allocated regions a buffer of this format owns.
    pub fn region_count(self) -> usize {
        self.info().regions
    }
}

impl TryFrom<u32> for PixelFormat {
    type Error = GrallocError;

    fn try_from(value: u32) -> GrallocResult<PixelFormat> {
        PixelFormat::ALL
            .iter()
            .copied()
            .find(|format| format.raw() == value)
            .ok_or(GrallocError::InvalidFormat(value))
    }
}

impl From<PixelFormat> for u32 {
    fn from(f: PixelFormat) -> u32 {
        f.raw()
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}({:#x})", self, self.raw())
    }
}

/// How the size of a format is derived.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FormatFamily {
    /// Single plane, fixed bytes per pixel.
    Packed { bytes_per_pixel: u32 },
    /// Raw byte container with no pixel semantics.
    Blob,
    /// Resolved to a concrete format from usage flags.
    Abstract,
    /// Framework-visible YUV, one region, vertical stride equals the height.
    FrameworkYuv(FrameworkYuvRule),
    /// Vendor YUV layouts with their own luma/chroma formulas.
    Yuv(YuvPlaneRule),
}

/// Size formulas of the single-region framework YUV formats.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FrameworkYuvRule {
    /// Luma plus two chroma planes of `align(stride / 2, 16)` bytes per row.
    Planar420,
    /// Luma plus an interleaved chroma plane, unaligned stride.
    SemiPlanar420,
    /// Luma only, `bytes_per_pixel` per sample.
    Luma { bytes_per_pixel: u32 },
}

/// Size formulas of the vendor YUV formats.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum YuvPlaneRule {
    /// Three regions, separate Cb/Cr planes.
    Planar420,
    /// Two regions, luma and chroma rows aligned to 32.
    Tiled420,
    /// Two regions, interleaved chroma.
    SemiPlanar420,
    /// Two regions plus a private metadata region, vertical stride aligned to 32.
    SemiPlanar420Priv,
    /// One region, packed 4:2:2.
    Interleaved422,
    /// One region holding luma followed by interleaved chroma.
    SemiPlanar420Single,
    /// Two regions plus a private metadata region, each plane followed by its 2-bit tail.
    SemiPlanar420Split10,
    /// One region holding luma, its 2-bit tail, chroma and its 2-bit tail.
    SemiPlanar420Single10,
    /// 16 bits per sample, three regions.
    P010,
}

/// How `lock_ycbcr` derives per-plane addresses for a format.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum YCbCrRule {
    /// One region, Cr before Cb interleaved after luma, stride equals width.
    SemiPlanarCrCb,
    /// One region, Cr plane after luma, Cb plane after Cr.
    PlanarCrCb,
    /// One region, Cb plane after luma, Cr plane after Cb.
    PlanarCbCr,
    /// Chroma region interleaves Cb first.
    MultiSemiPlanarCbCr,
    /// Chroma region interleaves Cb first; under encoder usage Cr points at the third region.
    MultiSemiPlanarCbCrPriv,
    /// Chroma region interleaves Cr first.
    MultiSemiPlanarCrCb,
    /// Cb in the second region, Cr in the third.
    MultiPlanarCbCr,
    /// Cr in the second region, Cb in the third.
    MultiPlanarCrCb,
    /// Only describable to the video encoder.
    MultiTiled,
    /// Luma and chroma interleaved in one plane.
    Interleaved,
    /// One region, chroma after the luma plane and its trailer.
    SingleSemiPlanar,
    /// One region, chroma after the luma plane, its 2-bit tail and trailers.
    SingleSemiPlanar10,
    /// No chroma planes.
    LumaOnly,
    /// 16-bit interleaved chroma, Cb in the second region and Cr in the third.
    MultiP010,
}

/// Static properties of a pixel format.
#[derive(Copy, Clone, Debug)]
pub struct FormatInfo {
    pub family: FormatFamily,
    /// Regions allocated for the format, 0 for abstract formats.
    pub regions: usize,
    /// Alignment of the stride in pixels.
    pub stride_align: u32,
    /// Alignment of the vertical stride in rows.
    pub vstride_align: u32,
    /// The last region is a small private metadata plane.
    pub private_plane: bool,
    /// May be handed to `lock` for direct CPU access.
    pub cpu_lockable: bool,
    pub ycbcr: Option<YCbCrRule>,
}

static PACKED_2BPP: FormatInfo = FormatInfo {
    family: FormatFamily::Packed { bytes_per_pixel: 2 },
    regions: 1,
    stride_align: 16,
    vstride_align: 16,
    private_plane: false,
    cpu_lockable: true,
    ycbcr: None,
};

static PACKED_2BPP_NO_LOCK: FormatInfo = FormatInfo {
    cpu_lockable: false,
    ..PACKED_2BPP
};

static PACKED_3BPP: FormatInfo = FormatInfo {
    family: FormatFamily::Packed { bytes_per_pixel: 3 },
    ..PACKED_2BPP
};

static PACKED_4BPP: FormatInfo = FormatInfo {
    family: FormatFamily::Packed { bytes_per_pixel: 4 },
    ..PACKED_2BPP
};

static PACKED_8BPP: FormatInfo = FormatInfo {
    family: FormatFamily::Packed { bytes_per_pixel: 8 },
    ..PACKED_2BPP
};

static BLOB: FormatInfo = FormatInfo {
    family: FormatFamily::Blob,
    regions: 1,
    stride_align: 1,
    vstride_align: 1,
    private_plane: false,
    cpu_lockable: true,
    ycbcr: None,
};

static ABSTRACT: FormatInfo = FormatInfo {
    family: FormatFamily::Abstract,
    regions: 0,
    stride_align: 1,
    vstride_align: 1,
    private_plane: false,
    cpu_lockable: false,
    ycbcr: None,
};

static FRAMEWORK_YV12: FormatInfo = FormatInfo {
    family: FormatFamily::FrameworkYuv(FrameworkYuvRule::Planar420),
    regions: 1,
    stride_align: 16,
    vstride_align: 1,
    private_plane: false,
    cpu_lockable: true,
    ycbcr: Some(YCbCrRule::PlanarCrCb),
};

static FRAMEWORK_YCBCR_420_P: FormatInfo = FormatInfo {
    cpu_lockable: false,
    ycbcr: Some(YCbCrRule::PlanarCbCr),
    ..FRAMEWORK_YV12
};

static FRAMEWORK_NV21: FormatInfo = FormatInfo {
    family: FormatFamily::FrameworkYuv(FrameworkYuvRule::SemiPlanar420),
    stride_align: 1,
    cpu_lockable: false,
    ycbcr: Some(YCbCrRule::SemiPlanarCrCb),
    ..FRAMEWORK_YV12
};

static FRAMEWORK_Y8: FormatInfo = FormatInfo {
    family: FormatFamily::FrameworkYuv(FrameworkYuvRule::Luma { bytes_per_pixel: 1 }),
    ycbcr: Some(YCbCrRule::LumaOnly),
    ..FRAMEWORK_YV12
};

static FRAMEWORK_Y16: FormatInfo = FormatInfo {
    family: FormatFamily::FrameworkYuv(FrameworkYuvRule::Luma { bytes_per_pixel: 2 }),
    ..FRAMEWORK_Y8
};

static MULTI_YV12: FormatInfo = FormatInfo {
    family: FormatFamily::Yuv(YuvPlaneRule::Planar420),
    regions: 3,
    stride_align: 32,
    vstride_align: 16,
    private_plane: false,
    cpu_lockable: false,
    ycbcr: Some(YCbCrRule::MultiPlanarCrCb),
};

static MULTI_YCBCR_420_P: FormatInfo = FormatInfo {
    ycbcr: Some(YCbCrRule::MultiPlanarCbCr),
    ..MULTI_YV12
};

static MULTI_TILED: FormatInfo = FormatInfo {
    family: FormatFamily::Yuv(YuvPlaneRule::Tiled420),
    regions: 2,
    stride_align: 16,
    vstride_align: 32,
    ycbcr: Some(YCbCrRule::MultiTiled),
    ..MULTI_YV12
};

static MULTI_NV21: FormatInfo = FormatInfo {
    family: FormatFamily::Yuv(YuvPlaneRule::SemiPlanar420),
    regions: 2,
    stride_align: 16,
    ycbcr: Some(YCbCrRule::MultiSemiPlanarCrCb),
    ..MULTI_YV12
};

static MULTI_NV12: FormatInfo = FormatInfo {
    ycbcr: Some(YCbCrRule::MultiSemiPlanarCbCr),
    ..MULTI_NV21
};

static MULTI_NV12_PRIV: FormatInfo = FormatInfo {
    family: FormatFamily::Yuv(YuvPlaneRule::SemiPlanar420Priv),
    regions: 3,
    vstride_align: 32,
    private_plane: true,
    ycbcr: Some(YCbCrRule::MultiSemiPlanarCbCrPriv),
    ..MULTI_NV21
};

static MULTI_S10B: FormatInfo = FormatInfo {
    family: FormatFamily::Yuv(YuvPlaneRule::SemiPlanar420Split10),
    vstride_align: 16,
    ..MULTI_NV12_PRIV
};

static INTERLEAVED_422: FormatInfo = FormatInfo {
    family: FormatFamily::Yuv(YuvPlaneRule::Interleaved422),
    regions: 1,
    stride_align: 16,
    vstride_align: 1,
    private_plane: false,
    cpu_lockable: true,
    ycbcr: Some(YCbCrRule::Interleaved),
};

static SINGLE_SPN: FormatInfo = FormatInfo {
    family: FormatFamily::Yuv(YuvPlaneRule::SemiPlanar420Single),
    regions: 1,
    stride_align: 16,
    vstride_align: 16,
    private_plane: false,
    cpu_lockable: false,
    ycbcr: Some(YCbCrRule::SingleSemiPlanar),
};

static SINGLE_SPN_S10B: FormatInfo = FormatInfo {
    family: FormatFamily::Yuv(YuvPlaneRule::SemiPlanar420Single10),
    ycbcr: Some(YCbCrRule::SingleSemiPlanar10),
    ..SINGLE_SPN
};

static MULTI_P010: FormatInfo = FormatInfo {
    family: FormatFamily::Yuv(YuvPlaneRule::P010),
    stride_align: 16,
    ycbcr: Some(YCbCrRule::MultiP010),
    ..MULTI_YV12
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values_round_trip() {
        for format in PixelFormat::ALL {
            assert_eq!(PixelFormat::try_from(format.raw()).unwrap(), format);
        }
    }

    #[test]
    fn unknown_value_is_invalid() {
        match PixelFormat::try_from(0x7777) {
            Err(GrallocError::InvalidFormat(0x7777)) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn table_is_consistent() {
        for format in PixelFormat::ALL {
            let info = format.info();
            if format.is_abstract() {
                assert_eq!(info.regions, 0);
                assert!(info.ycbcr.is_none());
                continue;
            }

            assert!((1..=3).contains(&info.regions), "{format}");
            assert!(info.stride_align.is_power_of_two(), "{format}");
            assert!(info.vstride_align.is_power_of_two(), "{format}");
            if info.private_plane {
                assert_eq!(info.regions, 3, "{format}");
            }
            if let FormatFamily::Yuv(_) | FormatFamily::FrameworkYuv(_) = info.family {
                assert!(info.ycbcr.is_some(), "{format}");
            }
        }
    }

    #[test]
    fn display_includes_raw_value() {
        assert_eq!(format!("{}", PixelFormat::Yv12), "Yv12(0x32315659)");
    }
}
