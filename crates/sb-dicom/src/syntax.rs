//! Transfer syntaxes and the dataset encodings they imply.

use std::io::{self, Read};

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};

use crate::tags::Tag;

/// Byte order of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// Little endian.
    Little,
    /// Big endian (retired, still seen from old consoles).
    Big,
}

/// A transfer syntax the reader can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferSyntax {
    /// `1.2.840.10008.1.2`, the DICOM default.
    ImplicitVrLittleEndian,
    /// `1.2.840.10008.1.2.1`, also used for every encapsulated pixel syntax.
    ExplicitVrLittleEndian,
    /// `1.2.840.10008.1.2.2`.
    ExplicitVrBigEndian,
}

impl TransferSyntax {
    /// UID of implicit VR little endian.
    pub const IMPLICIT_VR_LITTLE_ENDIAN: &'static str = "1.2.840.10008.1.2";
    /// UID of explicit VR little endian.
    pub const EXPLICIT_VR_LITTLE_ENDIAN: &'static str = "1.2.840.10008.1.2.1";
    /// UID of explicit VR big endian.
    pub const EXPLICIT_VR_BIG_ENDIAN: &'static str = "1.2.840.10008.1.2.2";
    /// UID of deflated explicit VR little endian, which is not supported.
    pub const DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN: &'static str = "1.2.840.10008.1.2.1.99";

    /// Resolves a transfer syntax UID, trimming DICOM padding.
    ///
    /// Returns `None` for syntaxes whose dataset cannot be read without
    /// inflating it first.
    ///
    /// # Examples
    ///
    /// ```
    /// use sb_dicom::TransferSyntax;
    ///
    /// assert_eq!(
    ///     TransferSyntax::from_uid("1.2.840.10008.1.2\0"),
    ///     Some(TransferSyntax::ImplicitVrLittleEndian)
    /// );
    /// // JPEG baseline: the dataset itself is explicit VR little endian
    /// assert_eq!(
    ///     TransferSyntax::from_uid("1.2.840.10008.1.2.4.50"),
    ///     Some(TransferSyntax::ExplicitVrLittleEndian)
    /// );
    /// assert_eq!(TransferSyntax::from_uid("1.2.840.10008.1.2.1.99"), None);
    /// ```
    #[must_use]
    pub fn from_uid(uid: &str) -> Option<Self> {
        match uid.trim_matches(|c: char| c == '\0' || c == ' ') {
            Self::IMPLICIT_VR_LITTLE_ENDIAN => Some(Self::ImplicitVrLittleEndian),
            Self::EXPLICIT_VR_BIG_ENDIAN => Some(Self::ExplicitVrBigEndian),
            Self::DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN => None,
            _ => Some(Self::ExplicitVrLittleEndian),
        }
    }

    /// Returns the canonical UID of this syntax.
    #[must_use]
    pub const fn uid(self) -> &'static str {
        match self {
            Self::ImplicitVrLittleEndian => Self::IMPLICIT_VR_LITTLE_ENDIAN,
            Self::ExplicitVrLittleEndian => Self::EXPLICIT_VR_LITTLE_ENDIAN,
            Self::ExplicitVrBigEndian => Self::EXPLICIT_VR_BIG_ENDIAN,
        }
    }

    /// Returns `true` if elements carry an explicit value representation.
    #[must_use]
    pub const fn explicit_vr(self) -> bool {
        !matches!(self, Self::ImplicitVrLittleEndian)
    }

    /// Returns the byte order of the dataset.
    #[must_use]
    pub const fn endian(self) -> Endian {
        match self {
            Self::ExplicitVrBigEndian => Endian::Big,
            Self::ImplicitVrLittleEndian | Self::ExplicitVrLittleEndian => Endian::Little,
        }
    }
}

impl Endian {
    /// Decodes a tag from its four raw bytes.
    #[must_use]
    pub fn decode_tag(self, raw: [u8; 4]) -> Tag {
        match self {
            Self::Little => Tag::new(
                LittleEndian::read_u16(&raw[..2]),
                LittleEndian::read_u16(&raw[2..]),
            ),
            Self::Big => Tag::new(BigEndian::read_u16(&raw[..2]), BigEndian::read_u16(&raw[2..])),
        }
    }

    /// Reads a `u16` in this byte order.
    pub fn read_u16<R: Read>(self, reader: &mut R) -> io::Result<u16> {
        match self {
            Self::Little => reader.read_u16::<LittleEndian>(),
            Self::Big => reader.read_u16::<BigEndian>(),
        }
    }

    /// Reads a `u32` in this byte order.
    pub fn read_u32<R: Read>(self, reader: &mut R) -> io::Result<u32> {
        match self {
            Self::Little => reader.read_u32::<LittleEndian>(),
            Self::Big => reader.read_u32::<BigEndian>(),
        }
    }
}
