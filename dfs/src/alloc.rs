use log::debug;

use crate::error::{DfsError, Result};
use crate::sb::{self, Header};

#[derive(Debug, PartialEq)]
pub(crate) enum State {
    Free,
    Used,
}

/// One bit per granule, stored in place inside the volume. Bit `n` lives in
/// byte `n / 8` under mask `1 << (n % 8)`.
pub(crate) struct Bitmap<B> {
    bits: B,
    /// Number of granules the bitmap tracks. Trailing bits in the last byte
    /// are never handed out.
    granules: u64,
}

impl<B: AsRef<[u8]>> Bitmap<B> {
    pub fn new(bits: B, granules: u64) -> Self {
        debug_assert!(bits.as_ref().len() as u64 * 8 >= granules);
        Self { bits, granules }
    }

    pub fn granules(&self) -> u64 {
        self.granules
    }

    pub fn get(&self, granule: u64) -> State {
        assert!(granule < self.granules, "granule {} out of range", granule);
        let byte = self.bits.as_ref()[(granule / 8) as usize];
        match (byte >> (granule % 8)) & 0b1 {
            0 => State::Free,
            _ => State::Used,
        }
    }

    pub fn free_count(&self) -> u64 {
        (0..self.granules)
            .filter(|&granule| self.get(granule) == State::Free)
            .count() as u64
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Bitmap<B> {
    pub fn set_reserved(&mut self, granule: u64) {
        assert!(granule < self.granules, "granule {} out of range", granule);
        self.bits.as_mut()[(granule / 8) as usize] |= 1 << (granule % 8);
    }

    /// Only used to undo an allocation session that could not complete.
    fn set_free(&mut self, granule: u64) {
        assert!(granule < self.granules, "granule {} out of range", granule);
        self.bits.as_mut()[(granule / 8) as usize] &= !(1 << (granule % 8));
    }

    /// Clears the whole bitmap, including the unused trailing bits.
    pub fn clear(&mut self) {
        for byte in self.bits.as_mut().iter_mut() {
            *byte = 0;
        }
    }
}

/// First fit allocation over the bitmap. Each call to `next` hands out the
/// lowest free granule and marks it used. Granules issued by this session are
/// remembered so a caller that runs out of space part way through can give
/// them all back with [`FirstFit::rollback`].
pub(crate) struct FirstFit<'a> {
    bitmap: Bitmap<&'a mut [u8]>,
    /// Everything below the marker is known to be used.
    marker: u64,
    /// Granules below the floor hold the header, bitmap and root entry.
    floor: u64,
    granularity: u64,
    issued: Vec<u64>,
}

impl<'a> FirstFit<'a> {
    pub fn new(bitmap: Bitmap<&'a mut [u8]>) -> Self {
        Self {
            bitmap,
            marker: 0,
            floor: 0,
            granularity: 1,
            issued: Vec::new(),
        }
    }

    /// Allocator over the bitmap of the volume described by `header`. It
    /// refuses to hand out the granules format reserved, even when their bits
    /// have been cleared.
    pub fn for_volume(header: &Header, vol: &'a mut [u8]) -> Self {
        Self {
            floor: header.reserved_granules(),
            granularity: header.granularity(),
            ..Self::new(bitmap_of_mut(header, vol))
        }
    }

    pub fn allocate(&mut self) -> Result<u64> {
        let granule = self.next().ok_or(DfsError::AllocatorExhausted)?;
        if granule < self.floor {
            self.issued.pop();
            self.bitmap.set_free(granule);
            self.marker = granule;
            return Err(DfsError::corrupt(
                granule * self.granularity,
                "bitmap marks a reserved granule free",
            ));
        }
        Ok(granule)
    }

    /// Releases every granule this session handed out.
    pub fn rollback(mut self) {
        debug!("rolling back {} granules", self.issued.len());
        for granule in std::mem::take(&mut self.issued) {
            self.bitmap.set_free(granule);
        }
    }
}

impl<'a> Iterator for FirstFit<'a> {
    type Item = u64;

    fn next(&mut self) -> Option<Self::Item> {
        for granule in self.marker..self.bitmap.granules() {
            if let State::Free = self.bitmap.get(granule) {
                self.bitmap.set_reserved(granule);
                self.marker = granule + 1;
                self.issued.push(granule);
                return Some(granule);
            }
        }
        self.marker = self.bitmap.granules();
        None
    }
}

/// Borrows the bitmap of the volume described by `header`.
pub(crate) fn bitmap_of<'a>(header: &Header, vol: &'a [u8]) -> Bitmap<&'a [u8]> {
    Bitmap::new(&vol[header.bitmap_range()], header.granules())
}

pub(crate) fn bitmap_of_mut<'a>(header: &Header, vol: &'a mut [u8]) -> Bitmap<&'a mut [u8]> {
    Bitmap::new(&mut vol[header.bitmap_range()], header.granules())
}

/// Allocates the lowest free granule of the volume in `buf` and returns its
/// index. The granule starts at `index * bitmap_granularity` bytes into the
/// volume. Bits are never cleared again.
pub fn allocate_block(buf: &mut [u8]) -> Result<u64> {
    let (header, range) = sb::open(buf)?;
    let vol = &mut buf[range];
    let granule = FirstFit::for_volume(&header, vol).allocate()?;
    debug!("allocated granule {}", granule);
    Ok(granule)
}
