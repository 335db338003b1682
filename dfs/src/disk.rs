//! Bounds-checked access to records stored at byte offsets inside a volume.
//!
//! Every offset read from the image is untrusted, so nothing in here indexes
//! the buffer without checking the record fits first.
use std::convert::TryFrom;
use std::mem::size_of;

use zerocopy::{AsBytes, FromBytes, LayoutVerified, Unaligned};

use crate::error::{DfsError, Result};

/// Borrows `len` bytes at `offset`, failing if the region leaves the buffer.
pub(crate) fn region(buf: &[u8], offset: u64, len: usize) -> Result<&[u8]> {
    let (start, end) = span(buf.len(), offset, len)?;
    Ok(&buf[start..end])
}

pub(crate) fn region_mut(buf: &mut [u8], offset: u64, len: usize) -> Result<&mut [u8]> {
    let (start, end) = span(buf.len(), offset, len)?;
    Ok(&mut buf[start..end])
}

/// Copies the fixed-size record `T` out of the buffer.
pub(crate) fn read_at<T>(buf: &[u8], offset: u64) -> Result<T>
where
    T: FromBytes + Unaligned + Copy,
{
    let bytes = region(buf, offset, size_of::<T>())?;
    LayoutVerified::<&[u8], T>::new_unaligned(bytes)
        .map(|record| *record.into_ref())
        .ok_or_else(|| DfsError::corrupt(offset, "misshapen record"))
}

pub(crate) fn write_at<T: AsBytes>(buf: &mut [u8], offset: u64, record: &T) -> Result<()> {
    let bytes = record.as_bytes();
    region_mut(buf, offset, bytes.len())?.copy_from_slice(bytes);
    Ok(())
}

fn span(buf_len: usize, offset: u64, len: usize) -> Result<(usize, usize)> {
    let start = usize::try_from(offset)
        .map_err(|_| DfsError::corrupt(offset, "offset does not fit in memory"))?;
    match start.checked_add(len) {
        Some(end) if end <= buf_len => Ok((start, end)),
        _ => Err(DfsError::corrupt(offset, "record runs past the end of the partition")),
    }
}
