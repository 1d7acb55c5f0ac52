// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! usage: Buffer usage flags.

use bitflags::bitflags;

bitflags! {
    /// Intended consumers and producers of a buffer.  The low bits follow the platform HAL, the
    /// high bits are vendor private.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct UsageFlags: u32 {
        const SW_READ_RARELY = 0x0000_0002;
        const SW_READ_OFTEN = 0x0000_0003;
        const SW_READ_MASK = 0x0000_000f;
        const SW_WRITE_RARELY = 0x0000_0020;
        const SW_WRITE_OFTEN = 0x0000_0030;
        const SW_WRITE_MASK = 0x0000_00f0;
        const HW_TEXTURE = 0x0000_0100;
        const HW_RENDER = 0x0000_0200;
        const HW_2D = 0x0000_0400;
        const HW_COMPOSER = 0x0000_0800;
        const HW_FB = 0x0000_1000;
        const PROTECTED = 0x0000_4000;
        const HW_VIDEO_ENCODER = 0x0001_0000;
        const HW_CAMERA_WRITE = 0x0002_0000;
        const HW_CAMERA_READ = 0x0004_0000;
        const HW_CAMERA_ZSL = 0x0006_0000;

        const VIDEO_EXT = 0x0020_0000;
        const PROTECTED_DPB = 0x0040_0000;
        const PHYSICALLY_LINEAR = 0x0080_0000;
        const PRIVATE_NONSECURE = 0x0100_0000;
        const CAMERA_RESERVED = 0x0200_0000;
        const NOZEROED = 0x0800_0000;
        const YUV_RANGE_FULL = 0x2000_0000;
        const SECURE_CAMERA_RESERVED = 0x8000_0000;
    }
}

impl UsageFlags {
    /// True if the CPU reads or writes the buffer.
    pub fn has_sw_access(self) -> bool {
        self.intersects(UsageFlags::SW_READ_MASK | UsageFlags::SW_WRITE_MASK)
    }

    /// True if the CPU reads the buffer often, which places it in cached memory.
    pub fn is_sw_read_often(self) -> bool {
        self & UsageFlags::SW_READ_MASK == UsageFlags::SW_READ_OFTEN
    }

    /// True if the buffer content is protected from CPU access.
    pub fn is_protected(self) -> bool {
        self.contains(UsageFlags::PROTECTED)
    }

    /// True if every bit of `HW_CAMERA_ZSL` is present.
    pub fn is_camera_zsl(self) -> bool {
        self.contains(UsageFlags::HW_CAMERA_ZSL)
    }
}
