//! Data element tags used by the header reader.

use std::fmt;

/// A DICOM data element tag: `(group, element)`.
///
/// Tags order by group then element, which is the order elements appear in
/// a conformant dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    /// Group number.
    pub group: u16,
    /// Element number.
    pub element: u16,
}

impl Tag {
    /// Creates a tag from its group and element numbers.
    #[inline]
    #[must_use]
    pub const fn new(group: u16, element: u16) -> Self {
        Self { group, element }
    }

    /// Returns `true` for item and delimitation tags, which never carry a VR.
    #[inline]
    #[must_use]
    pub const fn is_delimiter_group(self) -> bool {
        self.group == 0xFFFE
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.group, self.element)
    }
}

/// Group of the file meta information elements.
pub const META_GROUP: u16 = 0x0002;

/// (0002,0000) File Meta Information Group Length.
pub const META_GROUP_LENGTH: Tag = Tag::new(0x0002, 0x0000);
/// (0002,0010) Transfer Syntax UID.
pub const TRANSFER_SYNTAX_UID: Tag = Tag::new(0x0002, 0x0010);

/// (0008,0018) SOP Instance UID.
pub const SOP_INSTANCE_UID: Tag = Tag::new(0x0008, 0x0018);
/// (0020,000D) Study Instance UID.
pub const STUDY_INSTANCE_UID: Tag = Tag::new(0x0020, 0x000D);
/// (0020,000E) Series Instance UID.
pub const SERIES_INSTANCE_UID: Tag = Tag::new(0x0020, 0x000E);
/// (0020,0011) Series Number.
pub const SERIES_NUMBER: Tag = Tag::new(0x0020, 0x0011);
/// (0020,0013) Instance Number.
pub const INSTANCE_NUMBER: Tag = Tag::new(0x0020, 0x0013);

/// (FFFE,E000) Item.
pub const ITEM: Tag = Tag::new(0xFFFE, 0xE000);
/// (FFFE,E00D) Item Delimitation Item.
pub const ITEM_DELIMITATION: Tag = Tag::new(0xFFFE, 0xE00D);
/// (FFFE,E0DD) Sequence Delimitation Item.
pub const SEQUENCE_DELIMITATION: Tag = Tag::new(0xFFFE, 0xE0DD);

/// The last top-level tag the reader cares about; parsing stops past it.
pub const LAST_WANTED: Tag = INSTANCE_NUMBER;
