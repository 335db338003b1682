//! Journal records reserved by the format.
//!
//! Version 0.3 volumes are formatted with journaling disabled
//! (`first_journal_block == 0`) and no catalog operation reads or appends
//! events. The record layout is kept here so tools inspecting foreign images
//! agree on it.
use std::convert::TryFrom;
use std::mem::size_of;

use byteorder::LittleEndian;
use zerocopy::byteorder::U64;
use zerocopy::{AsBytes, FromBytes, LayoutVerified, Unaligned};

/// Fixed part of a journal event; `size` payload bytes follow.
pub const JOURNAL_EVENT_SIZE: usize = size_of::<RawJournalEvent>();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JournalKind {
    FileModification = 0,
    ExpandShrink = 1,
    UnlinkChain = 2,
    LinkChain = 3,
    Copy = 4,
    ChangeDescriptor = 5,
    Resize = 6,
}

impl TryFrom<u8> for JournalKind {
    type Error = u8;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Ok(match tag {
            0 => JournalKind::FileModification,
            1 => JournalKind::ExpandShrink,
            2 => JournalKind::UnlinkChain,
            3 => JournalKind::LinkChain,
            4 => JournalKind::Copy,
            5 => JournalKind::ChangeDescriptor,
            6 => JournalKind::Resize,
            unknown => return Err(unknown),
        })
    }
}

#[repr(C)]
#[derive(AsBytes, FromBytes, Unaligned, Clone, Copy)]
struct RawJournalEvent {
    kind: u8,
    next: U64<LittleEndian>,
    size: U64<LittleEndian>,
}

/// Header of one journal event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalEvent {
    pub kind: JournalKind,
    /// Offset of the next event, 0 at the end of the journal.
    pub next: u64,
    /// Payload bytes following the header.
    pub size: u64,
}

impl JournalEvent {
    /// Decodes an event header from the front of `bytes`. Returns `None` when
    /// the buffer is too short or the tag is unknown.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let (raw, _) = LayoutVerified::<_, RawJournalEvent>::new_unaligned_from_prefix(bytes)?;
        Some(Self {
            kind: JournalKind::try_from(raw.kind).ok()?,
            next: raw.next.get(),
            size: raw.size.get(),
        })
    }

    pub fn serialize(&self) -> [u8; JOURNAL_EVENT_SIZE] {
        let raw = RawJournalEvent {
            kind: self.kind as u8,
            next: U64::new(self.next),
            size: U64::new(self.size),
        };
        let mut encoded = [0; JOURNAL_EVENT_SIZE];
        encoded.copy_from_slice(raw.as_bytes());
        encoded
    }
}
