// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A crate for allocating, describing and CPU-mapping hardware-shareable graphics buffers on
//! Exynos-class display pipelines.

#[macro_use]
mod macros;
mod gralloc_os;
mod gralloc_utils;

pub mod compression;
pub mod formats;
pub mod gralloc;
pub mod handle;
pub mod heap;
pub mod layout;
pub mod mapper;
pub mod usage;

pub use crate::compression::is_compressible;
pub use crate::compression::select_format;
pub use crate::compression::CompressionPolicy;
pub use crate::formats::PixelFormat;
pub use crate::formats::GRALLOC_INTFMT_AFBC;
pub use crate::gralloc::Gralloc;
pub use crate::gralloc::GrallocBuilder;
pub use crate::gralloc::GrallocConfig;
pub use crate::gralloc_os::AsRawDescriptor;
pub use crate::gralloc_os::RawDescriptor;
pub use crate::gralloc_os::SafeDescriptor;
pub use crate::gralloc_utils::*;
pub use crate::handle::validate;
pub use crate::handle::BufferHandle;
pub use crate::handle::TransferableHandle;
pub use crate::heap::select_heap;
pub use crate::heap::HeapAllocator;
pub use crate::heap::HeapMask;
pub use crate::heap::HeapRegion;
pub use crate::heap::ImportId;
pub use crate::heap::RegionFlags;
pub use crate::heap::SystemHeap;
pub use crate::layout::compute_layout;
pub use crate::layout::resolve_format;
pub use crate::layout::rgb_layout;
pub use crate::layout::yuv_layout;
pub use crate::layout::LayoutConfig;
pub use crate::layout::LayoutDescriptor;
pub use crate::mapper::YCbCrLayout;
pub use crate::usage::UsageFlags;
