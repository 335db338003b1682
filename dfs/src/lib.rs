//! DFS is a flat, append-only file catalog stored inside a single fixed-size
//! disk image.
//!
//! # Layout
//! ==========================================================================
//! | Header | Allocation bitmap | Root entry | Node entries and fragments.. |
//! ==========================================================================
//!
//! Every operation takes the whole image as a byte buffer and mutates it in
//! place. Loading the buffer from a host file and writing it back is the job
//! of [`io::DiskImage`]. Nothing here synchronizes access; callers sharing an
//! image between threads or processes must hold exclusive access to the whole
//! buffer for the duration of each call.
mod alloc;
mod checksum;
mod disk;
mod error;
mod fragment;
mod fs;
pub mod io;
pub mod journal;
mod node;
mod sb;

pub use crate::alloc::allocate_block;
pub use crate::error::{DfsError, Result};
pub use crate::fs::{append, append_with, format, info, list, read_file, Entries, FormatOptions};
pub use crate::node::{NodeMeta, NodeSummary};
pub use crate::sb::VolumeInfo;

/// The four magic bytes opening every volume.
pub const SIGNATURE: [u8; 4] = *b"4DFS";

/// Major version in the high nibble, minor in the low nibble. Version 0.3
/// stores the partition size as a 16-bit count of [`PARTITION_UNIT`]s.
pub const VERSION: u8 = 0x03;

/// The unit `partition_size` is counted in.
pub const PARTITION_UNIT: u64 = 4096;

/// Images carrying a boot sector keep the volume right after it.
pub const BOOT_SECTOR_SIZE: usize = 512;

pub const DEFAULT_DISK_SIZE: u64 = 32_768_000;
pub const DEFAULT_GRANULARITY: u16 = 512;

/// Smallest granule able to hold a node entry with a useful name.
pub const MIN_GRANULARITY: u16 = 128;
