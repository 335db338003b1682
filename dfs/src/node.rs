use std::mem::size_of;
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::LittleEndian;
use log::debug;
use zerocopy::byteorder::{U16, U64};
use zerocopy::{AsBytes, FromBytes, Unaligned};

use crate::disk;
use crate::error::{DfsError, Result};
use crate::sb::Header;

/// Fixed part of a node entry. The NUL terminated name follows inline.
pub(crate) const NODE_ENTRY_SIZE: usize = size_of::<RawNodeEntry>();

const ROOT_DEFAULT_PERMS: u16 = 0o777;
const FILE_DEFAULT_PERMS: u16 = 0o644;

#[repr(C)]
#[derive(AsBytes, FromBytes, Unaligned, Clone, Copy)]
struct RawNodeEntry {
    next_entry: U64<LittleEndian>,
    child_entry: U64<LittleEndian>,
    fragment: U64<LittleEndian>,
    symlink: U64<LittleEndian>,
    file_size: U64<LittleEndian>,
    utc_creation_time: U64<LittleEndian>,
    utc_edition_time: U64<LittleEndian>,
    utc_access_time: U64<LittleEndian>,
    group_perms: U16<LittleEndian>,
    user_perms: U16<LittleEndian>,
    gid: U16<LittleEndian>,
    uid: U16<LittleEndian>,
    os_id: u8,
    os_specific: U64<LittleEndian>,
}

/// Caller controlled attributes of a new entry. Times are seconds since the
/// Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeMeta {
    pub created: u64,
    pub edited: u64,
    pub accessed: u64,
    pub user_perms: u16,
    pub group_perms: u16,
    pub uid: u16,
    pub gid: u16,
}

impl NodeMeta {
    /// Default file attributes stamped with the current time.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        Self {
            created: secs,
            edited: secs,
            accessed: secs,
            ..Self::default()
        }
    }

    pub(crate) fn root() -> Self {
        Self {
            user_perms: ROOT_DEFAULT_PERMS,
            group_perms: ROOT_DEFAULT_PERMS,
            ..Self::default()
        }
    }
}

impl Default for NodeMeta {
    fn default() -> Self {
        Self {
            created: 0,
            edited: 0,
            accessed: 0,
            user_perms: FILE_DEFAULT_PERMS,
            group_perms: FILE_DEFAULT_PERMS,
            uid: 0,
            gid: 0,
        }
    }
}

/// A decoded node entry together with the offset it was read from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NodeEntry {
    pub offset: u64,
    pub next_entry: u64,
    /// Reserved for nesting, always stored as read.
    pub child_entry: u64,
    pub fragment: u64,
    /// Reserved for links, always stored as read.
    pub symlink: u64,
    pub file_size: u64,
    pub meta: NodeMeta,
    pub os_id: u8,
    pub os_specific: u64,
    pub name: Vec<u8>,
}

impl NodeEntry {
    /// A terminal entry with no content.
    pub fn new(name: &str, meta: NodeMeta) -> Self {
        Self {
            offset: 0,
            next_entry: 0,
            child_entry: 0,
            fragment: 0,
            symlink: 0,
            file_size: 0,
            meta,
            os_id: 0,
            os_specific: 0,
            name: name.as_bytes().to_vec(),
        }
    }

    pub fn read(vol: &[u8], offset: u64) -> Result<Self> {
        let raw: RawNodeEntry = disk::read_at(vol, offset)?;
        // read_at has checked the fixed fields end inside the volume.
        let tail = &vol[offset as usize + NODE_ENTRY_SIZE..];
        let name_len = tail
            .iter()
            .position(|&byte| byte == 0)
            .ok_or_else(|| DfsError::corrupt(offset, "unterminated entry name"))?;

        Ok(Self {
            offset,
            next_entry: raw.next_entry.get(),
            child_entry: raw.child_entry.get(),
            fragment: raw.fragment.get(),
            symlink: raw.symlink.get(),
            file_size: raw.file_size.get(),
            meta: NodeMeta {
                created: raw.utc_creation_time.get(),
                edited: raw.utc_edition_time.get(),
                accessed: raw.utc_access_time.get(),
                user_perms: raw.user_perms.get(),
                group_perms: raw.group_perms.get(),
                uid: raw.uid.get(),
                gid: raw.gid.get(),
            },
            os_id: raw.os_id,
            os_specific: raw.os_specific.get(),
            name: tail[..name_len].to_vec(),
        })
    }

    /// Writes the entry, name and terminator at `offset`.
    pub fn write(&self, vol: &mut [u8], offset: u64) -> Result<()> {
        let raw = RawNodeEntry {
            next_entry: U64::new(self.next_entry),
            child_entry: U64::new(self.child_entry),
            fragment: U64::new(self.fragment),
            symlink: U64::new(self.symlink),
            file_size: U64::new(self.file_size),
            utc_creation_time: U64::new(self.meta.created),
            utc_edition_time: U64::new(self.meta.edited),
            utc_access_time: U64::new(self.meta.accessed),
            group_perms: U16::new(self.meta.group_perms),
            user_perms: U16::new(self.meta.user_perms),
            gid: U16::new(self.meta.gid),
            uid: U16::new(self.meta.uid),
            os_id: self.os_id,
            os_specific: U64::new(self.os_specific),
        };
        let slot = disk::region_mut(vol, offset, self.encoded_len())?;
        let (fixed, name) = slot.split_at_mut(NODE_ENTRY_SIZE);
        fixed.copy_from_slice(raw.as_bytes());
        name[..self.name.len()].copy_from_slice(&self.name);
        name[self.name.len()] = 0;
        Ok(())
    }

    pub fn encoded_len(&self) -> usize {
        NODE_ENTRY_SIZE + self.name.len() + 1
    }

    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            offset: self.offset,
            name: String::from_utf8_lossy(&self.name).into_owned(),
            file_size: self.file_size,
            user_perms: self.meta.user_perms,
            group_perms: self.meta.group_perms,
            uid: self.meta.uid,
            gid: self.meta.gid,
            created: self.meta.created,
            edited: self.meta.edited,
            accessed: self.meta.accessed,
        }
    }
}

/// Rewrites only the `next_entry` link of the entry at `offset`.
pub(crate) fn link(vol: &mut [u8], offset: u64, next: u64) -> Result<()> {
    disk::write_at(vol, offset, &U64::<LittleEndian>::new(next))
}

/// Checks that `name` can be stored in a single granule.
pub(crate) fn validate_name(name: &str, granularity: u64) -> Result<()> {
    if name.is_empty() {
        return Err(DfsError::InvalidName("name is empty".to_string()));
    }
    if name.as_bytes().contains(&0) {
        return Err(DfsError::InvalidName(format!("{:?} contains a NUL byte", name)));
    }
    let max = granularity as usize - NODE_ENTRY_SIZE - 1;
    if name.len() > max {
        return Err(DfsError::InvalidName(format!(
            "{:?} is longer than {} bytes",
            name, max
        )));
    }
    Ok(())
}

/// What listing reports for every entry.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSummary {
    /// Offset of the entry within the volume.
    pub offset: u64,
    pub name: String,
    pub file_size: u64,
    pub user_perms: u16,
    pub group_perms: u16,
    pub uid: u16,
    pub gid: u16,
    pub created: u64,
    pub edited: u64,
    pub accessed: u64,
}

/// Walks the entry chain from the root. Offsets come from the image and are
/// not trusted: every hop is bounds checked and the walk gives up once it
/// has taken more hops than the partition has granules, which only a cycle
/// can cause. The iterator stops after the first error.
pub(crate) struct EntryChain<'a> {
    vol: &'a [u8],
    next: Option<u64>,
    hops: u64,
    max_hops: u64,
    floor: u64,
}

impl<'a> EntryChain<'a> {
    pub fn new(header: &Header, vol: &'a [u8]) -> Self {
        Self {
            vol,
            next: Some(header.root_offset),
            hops: 0,
            max_hops: header.granules(),
            floor: header.bitmap_end() as u64,
        }
    }

    fn step(&mut self, offset: u64) -> Result<NodeEntry> {
        if self.hops >= self.max_hops {
            return Err(DfsError::corrupt(offset, "entry chain loops back on itself"));
        }
        if offset < self.floor {
            return Err(DfsError::corrupt(offset, "entry points into the header"));
        }
        self.hops += 1;
        let entry = NodeEntry::read(self.vol, offset)?;
        debug!("entry {:?} at {}", String::from_utf8_lossy(&entry.name), offset);
        Ok(entry)
    }
}

impl<'a> Iterator for EntryChain<'a> {
    type Item = Result<NodeEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.next.take()?;
        let entry = self.step(offset);
        if let Ok(entry) = &entry {
            if entry.next_entry != 0 {
                self.next = Some(entry.next_entry);
            }
        }
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        Header::for_partition(16 * 4096, 512).unwrap()
    }

    #[test]
    fn fixed_fields_take_eighty_one_bytes() {
        assert_eq!(NODE_ENTRY_SIZE, 81);
    }

    #[test]
    fn entry_survives_write_and_read() {
        let mut vol = vec![0; 4096];
        let mut entry = NodeEntry::new("a.txt", NodeMeta::default());
        entry.offset = 1024;
        entry.fragment = 1536;
        entry.file_size = 10;
        entry.meta.created = 1_600_000_000;
        entry.write(&mut vol, 1024).unwrap();

        assert_eq!(NodeEntry::read(&vol, 1024).unwrap(), entry);
        assert_eq!(vol[1024 + NODE_ENTRY_SIZE + 5], 0);
    }

    #[test]
    fn permission_fields_are_laid_out_group_first() {
        let mut vol = vec![0; 512];
        let mut meta = NodeMeta::root();
        meta.user_perms = 0o700;
        NodeEntry::new("x", meta).write(&mut vol, 0).unwrap();

        assert_eq!(&vol[64..66], &0o777u16.to_le_bytes());
        assert_eq!(&vol[66..68], &0o700u16.to_le_bytes());
    }

    #[test]
    fn link_rewrites_only_next_entry() {
        let mut vol = vec![0; 1024];
        let entry = NodeEntry::new("a", NodeMeta::default());
        entry.write(&mut vol, 0).unwrap();
        link(&mut vol, 0, 512).unwrap();

        let read = NodeEntry::read(&vol, 0).unwrap();
        assert_eq!(read.next_entry, 512);
        assert_eq!(read.name, b"a".to_vec());
    }

    #[test]
    fn unterminated_name_is_corrupt() {
        let mut vol = vec![0x41; 128];
        vol[..NODE_ENTRY_SIZE].copy_from_slice(&[0; NODE_ENTRY_SIZE]);
        assert!(matches!(
            NodeEntry::read(&vol, 0),
            Err(DfsError::CorruptChain { .. })
        ));
    }

    #[test]
    fn names_are_validated() {
        assert!(validate_name("a.txt", 512).is_ok());
        assert!(validate_name("", 512).is_err());
        assert!(validate_name("a\0b", 512).is_err());
        assert!(validate_name(&"n".repeat(512 - 81 - 1), 512).is_ok());
        assert!(validate_name(&"n".repeat(512 - 81), 512).is_err());
    }

    #[test]
    fn chain_walk_follows_links_in_order() {
        let header = header();
        let mut vol = vec![0; header.partition_bytes() as usize];
        let root = header.root_offset;
        NodeEntry::new("root", NodeMeta::root()).write(&mut vol, root).unwrap();
        NodeEntry::new("one", NodeMeta::default()).write(&mut vol, 2048).unwrap();
        link(&mut vol, root, 2048).unwrap();

        let names: Vec<Vec<u8>> = EntryChain::new(&header, &vol)
            .map(|entry| entry.unwrap().name)
            .collect();
        assert_eq!(names, vec![b"root".to_vec(), b"one".to_vec()]);
    }

    #[test]
    fn chain_walk_detects_cycles() {
        let header = header();
        let mut vol = vec![0; header.partition_bytes() as usize];
        let root = header.root_offset;
        NodeEntry::new("root", NodeMeta::root()).write(&mut vol, root).unwrap();
        link(&mut vol, root, root).unwrap();

        let last = EntryChain::new(&header, &vol).last().unwrap();
        assert!(matches!(last, Err(DfsError::CorruptChain { .. })));
    }

    #[test]
    fn chain_walk_rejects_links_out_of_bounds() {
        let header = header();
        let mut vol = vec![0; header.partition_bytes() as usize];
        let root = header.root_offset;
        NodeEntry::new("root", NodeMeta::root()).write(&mut vol, root).unwrap();
        link(&mut vol, root, header.partition_bytes() - 10).unwrap();

        let results: Vec<_> = EntryChain::new(&header, &vol).collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[1], Err(DfsError::CorruptChain { .. })));
    }

    #[test]
    fn chain_walk_rejects_links_into_the_header() {
        let header = header();
        let mut vol = vec![0; header.partition_bytes() as usize];
        let root = header.root_offset;
        NodeEntry::new("root", NodeMeta::root()).write(&mut vol, root).unwrap();
        link(&mut vol, root, 4).unwrap();

        let last = EntryChain::new(&header, &vol).last().unwrap();
        assert!(matches!(last, Err(DfsError::CorruptChain { .. })));
    }
}
