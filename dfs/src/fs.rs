use log::{debug, info, warn};

use crate::alloc::{bitmap_of, bitmap_of_mut, FirstFit};
use crate::error::{DfsError, Result};
use crate::fragment;
use crate::node::{self, EntryChain, NodeEntry, NodeMeta, NodeSummary};
use crate::sb::{self, Header, VolumeInfo, ROOT_NAME};
use crate::{DEFAULT_DISK_SIZE, DEFAULT_GRANULARITY};

/// Geometry used when formatting an image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormatOptions {
    /// Partition size in bytes, a multiple of 4096.
    pub partition_size: u64,
    /// Bytes tracked by one bitmap bit.
    pub granularity: u16,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            partition_size: DEFAULT_DISK_SIZE,
            granularity: DEFAULT_GRANULARITY,
        }
    }
}

impl FormatOptions {
    /// Checks the geometry without touching any image. Fails with
    /// [`DfsError::InvalidGeometry`] exactly when [`format`] would.
    pub fn validate(&self) -> Result<()> {
        Header::for_partition(self.partition_size, self.granularity).map(|_| ())
    }

    /// Formats `buf` with this geometry, see [`format`].
    pub fn format(&self, buf: &mut [u8]) -> Result<()> {
        format(buf, self.partition_size, self.granularity)
    }
}

/// Initializes an empty volume at the start of `buf`.
///
/// # Layout
/// ==================================================================
/// | Header (27 bytes) | Bitmap | padding | Root entry | free .. |
/// ==================================================================
///
/// The root entry starts on the first granule boundary behind the bitmap.
/// Every granule up to and including the one holding the end of the root
/// entry is marked used.
pub fn format(buf: &mut [u8], partition_size: u64, granularity: u16) -> Result<()> {
    let header = Header::for_partition(partition_size, granularity)?;
    if (buf.len() as u64) < partition_size {
        return Err(DfsError::BufferTooSmall {
            required: partition_size,
            actual: buf.len() as u64,
        });
    }
    let vol = &mut buf[..partition_size as usize];

    header.write(vol)?;
    let mut bitmap = bitmap_of_mut(&header, vol);
    bitmap.clear();
    for granule in 0..header.reserved_granules() {
        bitmap.set_reserved(granule);
    }

    NodeEntry::new(ROOT_NAME, NodeMeta::root()).write(vol, header.root_offset)?;

    info!(
        "formatted {} bytes: {} granules of {}, bitmap of {} bytes, root at +{}",
        partition_size,
        header.granules(),
        granularity,
        header.bitmap_len(),
        header.root_offset
    );
    Ok(())
}

/// Decodes the header of the volume in `buf`.
pub fn info(buf: &[u8]) -> Result<VolumeInfo> {
    let (header, range) = sb::open(buf)?;
    let volume_offset = range.start;
    let vol = &buf[range];
    Ok(VolumeInfo {
        volume_offset,
        version_major: header.version_major(),
        version_minor: header.version_minor(),
        root_offset: header.root_offset,
        granularity: header.bitmap_granularity,
        partition_size: header.partition_bytes(),
        mirror_partition: header.mirror_partition,
        first_journal_block: header.first_journal_block,
        granules: header.granules(),
        free_granules: bitmap_of(&header, vol).free_count(),
    })
}

/// Lists the catalog of the volume in `buf`, root entry first.
///
/// The signature and header are checked up front. The chain itself is walked
/// lazily; a broken link surfaces as a [`DfsError::CorruptChain`] item, after
/// which the iterator ends. Call `list` again to start over from the root.
pub fn list(buf: &[u8]) -> Result<Entries<'_>> {
    let (header, range) = sb::open(buf)?;
    Ok(Entries {
        chain: EntryChain::new(&header, &buf[range]),
    })
}

/// Iterator over the entries of a volume, see [`list`].
pub struct Entries<'a> {
    chain: EntryChain<'a>,
}

impl<'a> Iterator for Entries<'a> {
    type Item = Result<NodeSummary>;

    fn next(&mut self) -> Option<Self::Item> {
        self.chain
            .next()
            .map(|entry| entry.map(|entry| entry.summary()))
    }
}

/// Appends a file named `name` holding `content`, stamped with the current
/// time and default permissions.
pub fn append(buf: &mut [u8], name: &str, content: &[u8]) -> Result<()> {
    append_with(buf, name, content, &NodeMeta::now())
}

/// Appends a file with caller supplied attributes.
///
/// All granules are allocated before anything is written. If the bitmap runs
/// out part way, the granules taken so far are released again and the buffer
/// is left exactly as it was. The new entry only becomes reachable when the
/// old tail is linked to it, which happens last.
pub fn append_with(buf: &mut [u8], name: &str, content: &[u8], meta: &NodeMeta) -> Result<()> {
    let (header, range) = sb::open(buf)?;
    let vol = &mut buf[range];
    node::validate_name(name, header.granularity())?;

    let mut tail = None;
    for entry in EntryChain::new(&header, vol) {
        let entry = entry?;
        if entry.name == name.as_bytes() {
            return Err(DfsError::AlreadyExists(name.to_string()));
        }
        tail = Some(entry.offset);
    }
    let tail = tail.ok_or_else(|| DfsError::corrupt(header.root_offset, "empty entry chain"))?;

    let capacity = fragment::payload_capacity(header.granularity());
    let needed = 1 + fragment::fragments_needed(content.len(), capacity);
    let mut offsets = Vec::with_capacity(needed);
    {
        let mut alloc = FirstFit::for_volume(&header, vol);
        for _ in 0..needed {
            match alloc.allocate() {
                Ok(granule) => offsets.push(granule * header.granularity()),
                Err(err) => {
                    warn!(
                        "appending {:?} needs {} granules, got {} before: {}",
                        name,
                        needed,
                        offsets.len(),
                        err
                    );
                    alloc.rollback();
                    return Err(err);
                }
            }
        }
    }

    let (entry_offset, fragments) = offsets.split_at(1);
    let entry_offset = entry_offset[0];
    fragment::write_chain(vol, fragments, content, capacity)?;

    let mut entry = NodeEntry::new(name, *meta);
    entry.fragment = fragments.first().copied().unwrap_or(0);
    entry.file_size = content.len() as u64;
    entry.write(vol, entry_offset)?;

    node::link(vol, tail, entry_offset)?;
    debug!("linked entry at {} behind {}", entry_offset, tail);
    info!(
        "appended {:?}: {} bytes in {} fragments",
        name,
        content.len(),
        fragments.len()
    );
    Ok(())
}

/// Reads back the content of the file named `name`, verifying the checksum
/// of every fragment.
pub fn read_file(buf: &[u8], name: &str) -> Result<Vec<u8>> {
    let (header, range) = sb::open(buf)?;
    let vol = &buf[range];
    for entry in EntryChain::new(&header, vol) {
        let entry = entry?;
        if entry.name == name.as_bytes() {
            return fragment::read_chain(&header, vol, entry.fragment, entry.file_size);
        }
    }
    Err(DfsError::DoesNotExist(name.to_string()))
}
