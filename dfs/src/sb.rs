use std::convert::TryFrom;
use std::mem::size_of;
use std::ops::Range;

use byteorder::LittleEndian;
use log::warn;
use zerocopy::byteorder::{U16, U64};
use zerocopy::{AsBytes, FromBytes, Unaligned};

use crate::disk;
use crate::error::{DfsError, Result};
use crate::node::NODE_ENTRY_SIZE;
use crate::{BOOT_SECTOR_SIZE, MIN_GRANULARITY, PARTITION_UNIT, SIGNATURE, VERSION};

/// Size of the fixed header fields. The allocation bitmap starts right after.
pub(crate) const HEADER_SIZE: usize = size_of::<RawHeader>();

/// The name written into the root entry by format.
pub(crate) const ROOT_NAME: &str = "root";

#[repr(C)]
#[derive(AsBytes, FromBytes, Unaligned, Clone, Copy)]
struct RawHeader {
    signature: [u8; 4],
    version: u8,
    first_journal_block: U64<LittleEndian>,
    root_offset: U64<LittleEndian>,
    mirror_partition: U16<LittleEndian>,
    bitmap_granularity: U16<LittleEndian>,
    partition_size: U16<LittleEndian>,
}

/// The superblock at the start of every volume.
///
/// Describes where the entry chain begins and how the partition is carved
/// into granules. The allocation bitmap is not part of this struct; it lives
/// directly behind the fixed fields and is accessed in place by the
/// allocator.
#[derive(Debug, PartialEq, Clone)]
pub(crate) struct Header {
    pub version: u8,
    /// Offset of the first journal event, 0 while journaling is disabled.
    pub first_journal_block: u64,
    /// Offset of the root entry, relative to the start of the volume.
    pub root_offset: u64,
    /// Offset of the mirror partition, 0 if there is none.
    pub mirror_partition: u16,
    /// Bytes tracked by one bitmap bit.
    pub bitmap_granularity: u16,
    /// Partition size in `PARTITION_UNIT`s.
    pub partition_size: u16,
}

impl Header {
    /// Lays out a fresh header for a partition of `partition_bytes` split into
    /// `granularity` byte granules. The root entry is placed on the first
    /// granule boundary behind the bitmap.
    pub fn for_partition(partition_bytes: u64, granularity: u16) -> Result<Self> {
        if partition_bytes == 0 || partition_bytes % PARTITION_UNIT != 0 {
            return Err(DfsError::InvalidGeometry(format!(
                "partition size {} is not a positive multiple of {}",
                partition_bytes, PARTITION_UNIT
            )));
        }
        let units = u16::try_from(partition_bytes / PARTITION_UNIT).map_err(|_| {
            DfsError::InvalidGeometry(format!(
                "partition size {} exceeds the maximum of {} bytes",
                partition_bytes,
                u16::MAX as u64 * PARTITION_UNIT
            ))
        })?;
        if granularity < MIN_GRANULARITY {
            return Err(DfsError::InvalidGeometry(format!(
                "granularity {} is below the minimum of {}",
                granularity, MIN_GRANULARITY
            )));
        }

        let mut header = Self {
            version: VERSION,
            first_journal_block: 0,
            root_offset: 0,
            mirror_partition: 0,
            bitmap_granularity: granularity,
            partition_size: units,
        };
        let gran = granularity as u64;
        header.root_offset = round_up(header.bitmap_end() as u64, gran);

        // The root entry plus one free granule must fit in the partition.
        if header.reserved_granules() >= header.granules() {
            return Err(DfsError::InvalidGeometry(format!(
                "{} granules of {} bytes cannot hold the header, bitmap and root entry",
                header.granules(),
                granularity
            )));
        }
        Ok(header)
    }

    /// Reads the header at the start of `vol`. Only the fields are decoded;
    /// [`Header::validate`] checks they describe a usable volume.
    pub fn parse(vol: &[u8]) -> Result<Self> {
        if vol.len() < HEADER_SIZE {
            return Err(DfsError::BufferTooSmall {
                required: HEADER_SIZE as u64,
                actual: vol.len() as u64,
            });
        }
        let raw: RawHeader = disk::read_at(vol, 0)?;
        if raw.signature != SIGNATURE {
            return Err(DfsError::InvalidSignature);
        }
        Ok(Self {
            version: raw.version,
            first_journal_block: raw.first_journal_block.get(),
            root_offset: raw.root_offset.get(),
            mirror_partition: raw.mirror_partition.get(),
            bitmap_granularity: raw.bitmap_granularity.get(),
            partition_size: raw.partition_size.get(),
        })
    }

    pub fn write(&self, vol: &mut [u8]) -> Result<()> {
        let raw = RawHeader {
            signature: SIGNATURE,
            version: self.version,
            first_journal_block: U64::new(self.first_journal_block),
            root_offset: U64::new(self.root_offset),
            mirror_partition: U16::new(self.mirror_partition),
            bitmap_granularity: U16::new(self.bitmap_granularity),
            partition_size: U16::new(self.partition_size),
        };
        disk::write_at(vol, 0, &raw)
    }

    /// Checks a parsed header against the `available` bytes behind it.
    pub fn validate(&self, available: usize) -> Result<()> {
        if self.version != VERSION {
            return Err(DfsError::UnsupportedVersion {
                major: self.version_major(),
                minor: self.version_minor(),
            });
        }
        if self.bitmap_granularity < MIN_GRANULARITY || self.partition_size == 0 {
            return Err(DfsError::InvalidGeometry(format!(
                "header declares {} units with granularity {}",
                self.partition_size, self.bitmap_granularity
            )));
        }
        if self.partition_bytes() > available as u64 {
            return Err(DfsError::BufferTooSmall {
                required: self.partition_bytes(),
                actual: available as u64,
            });
        }
        if self.root_offset < self.bitmap_end() as u64 {
            return Err(DfsError::corrupt(
                self.root_offset,
                "root entry overlaps the header",
            ));
        }
        Ok(())
    }

    pub fn version_major(&self) -> u8 {
        (self.version & 0xF0) >> 4
    }

    pub fn version_minor(&self) -> u8 {
        self.version & 0x0F
    }

    pub fn partition_bytes(&self) -> u64 {
        self.partition_size as u64 * PARTITION_UNIT
    }

    pub fn granularity(&self) -> u64 {
        self.bitmap_granularity as u64
    }

    /// Number of whole granules in the partition, one bitmap bit each.
    pub fn granules(&self) -> u64 {
        self.partition_bytes() / self.granularity()
    }

    pub fn bitmap_len(&self) -> usize {
        ((self.granules() + 7) / 8) as usize
    }

    /// Location of the allocation bitmap within the volume.
    pub fn bitmap_range(&self) -> Range<usize> {
        HEADER_SIZE..self.bitmap_end()
    }

    /// Granules covering the header, the bitmap and the root entry. Format
    /// marks exactly these before anything else is allocated.
    pub fn reserved_granules(&self) -> u64 {
        let root_end = self.root_offset + (NODE_ENTRY_SIZE + ROOT_NAME.len() + 1) as u64;
        round_up(root_end, self.granularity()) / self.granularity()
    }

    /// First byte past the bitmap. No record may start below it.
    pub fn bitmap_end(&self) -> usize {
        HEADER_SIZE + self.bitmap_len()
    }
}

/// Finds the start of the volume within `buf`: offset 0, or right behind a
/// boot sector.
pub(crate) fn locate(buf: &[u8]) -> Result<usize> {
    if has_signature(buf, 0) {
        return Ok(0);
    }
    if has_signature(buf, BOOT_SECTOR_SIZE) {
        warn!("invalid signature at offset 0, using the volume after the boot sector");
        return Ok(BOOT_SECTOR_SIZE);
    }
    Err(DfsError::InvalidSignature)
}

/// Locates, parses and validates the volume inside `buf`. Returns the header
/// and the byte range of the partition it describes.
pub(crate) fn open(buf: &[u8]) -> Result<(Header, Range<usize>)> {
    let base = locate(buf)?;
    let vol = &buf[base..];
    let header = Header::parse(vol)?;
    header.validate(vol.len())?;
    let end = base + header.partition_bytes() as usize;
    Ok((header, base..end))
}

fn has_signature(buf: &[u8], at: usize) -> bool {
    buf.get(at..at + SIGNATURE.len()) == Some(&SIGNATURE[..])
}

fn round_up(value: u64, multiple: u64) -> u64 {
    (value + multiple - 1) / multiple * multiple
}

/// Decoded summary of a volume's header.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeInfo {
    /// Where the volume starts in the buffer: 0, or 512 behind a boot sector.
    pub volume_offset: usize,
    pub version_major: u8,
    pub version_minor: u8,
    pub root_offset: u64,
    pub granularity: u16,
    /// Partition size in bytes.
    pub partition_size: u64,
    pub mirror_partition: u16,
    pub first_journal_block: u64,
    pub granules: u64,
    pub free_granules: u64,
}

impl VolumeInfo {
    pub fn has_mirror(&self) -> bool {
        self.mirror_partition != 0
    }

    pub fn has_journal(&self) -> bool {
        self.first_journal_block != 0
    }
}
