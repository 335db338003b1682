use std::mem::size_of;

use byteorder::LittleEndian;
use log::debug;
use zerocopy::byteorder::U64;
use zerocopy::{AsBytes, FromBytes, Unaligned};

use crate::checksum::crc32;
use crate::disk;
use crate::error::{DfsError, Result};
use crate::sb::Header;

/// Fixed part of a fragment; the payload fills the rest of its granule.
pub(crate) const FRAGMENT_HEADER_SIZE: usize = size_of::<RawFragment>();

#[repr(C)]
#[derive(AsBytes, FromBytes, Unaligned, Clone, Copy)]
struct RawFragment {
    /// Valid payload bytes.
    size: U64<LittleEndian>,
    /// CRC-32 of the valid payload bytes.
    checksum: U64<LittleEndian>,
    next: U64<LittleEndian>,
}

/// Payload bytes one granule can carry.
pub(crate) fn payload_capacity(granularity: u64) -> usize {
    granularity as usize - FRAGMENT_HEADER_SIZE
}

/// Fragments needed to hold `len` bytes. Empty content needs none.
pub(crate) fn fragments_needed(len: usize, capacity: usize) -> usize {
    (len + capacity - 1) / capacity
}

/// Writes `content` as a chain of fragments at `offsets`, one granule each,
/// in order. `offsets` must hold exactly as many entries as
/// [`fragments_needed`] reports.
pub(crate) fn write_chain(
    vol: &mut [u8],
    offsets: &[u64],
    content: &[u8],
    capacity: usize,
) -> Result<()> {
    debug_assert_eq!(offsets.len(), fragments_needed(content.len(), capacity));
    for (i, (chunk, &offset)) in content.chunks(capacity).zip(offsets).enumerate() {
        let next = offsets.get(i + 1).copied().unwrap_or(0);
        let raw = RawFragment {
            size: U64::new(chunk.len() as u64),
            checksum: U64::new(crc32(chunk) as u64),
            next: U64::new(next),
        };
        disk::write_at(vol, offset, &raw)?;
        disk::region_mut(vol, offset + FRAGMENT_HEADER_SIZE as u64, chunk.len())?
            .copy_from_slice(chunk);
        debug!("fragment of {} bytes at {} -> {}", chunk.len(), offset, next);
    }
    Ok(())
}

/// Reassembles the content of a file from the fragment chain starting at
/// `first`, truncated to `file_size`. Every payload is checked against its
/// stored checksum.
pub(crate) fn read_chain(header: &Header, vol: &[u8], first: u64, file_size: u64) -> Result<Vec<u8>> {
    let capacity = payload_capacity(header.granularity());
    let floor = header.bitmap_end() as u64;
    let mut content = Vec::new();
    let mut next = first;
    let mut hops = 0;

    while next != 0 && (content.len() as u64) < file_size {
        let offset = next;
        if hops >= header.granules() {
            return Err(DfsError::corrupt(offset, "fragment chain loops back on itself"));
        }
        if offset < floor {
            return Err(DfsError::corrupt(offset, "fragment points into the header"));
        }
        hops += 1;

        let raw: RawFragment = disk::read_at(vol, offset)?;
        let size = raw.size.get();
        if size > capacity as u64 {
            return Err(DfsError::corrupt(offset, "fragment larger than its granule"));
        }
        let payload = disk::region(vol, offset + FRAGMENT_HEADER_SIZE as u64, size as usize)?;
        if crc32(payload) as u64 != raw.checksum.get() {
            return Err(DfsError::ChecksumMismatch { offset });
        }
        content.extend_from_slice(payload);
        next = raw.next.get();
    }

    if (content.len() as u64) < file_size {
        return Err(DfsError::corrupt(first, "content shorter than the file size"));
    }
    content.truncate(file_size as usize);
    Ok(content)
}
