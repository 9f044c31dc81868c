//! Element-level decoding shared by the meta group and the dataset.

use std::io::{self, Read};

use crate::syntax::Endian;
use crate::tags::{self, Tag};

/// Length value marking an element or item of undefined length.
pub(crate) const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// Longest text value the reader will buffer.
const MAX_TEXT_LENGTH: u32 = 1024;

/// Deepest sequence nesting walked before giving up.
const MAX_DEPTH: usize = 16;

/// Explicit VRs encoded with two reserved bytes and a 32-bit length.
const LONG_LENGTH_VRS: [&[u8; 2]; 13] = [
    b"OB", b"OD", b"OF", b"OL", b"OV", b"OW", b"SQ", b"SV", b"UC", b"UN", b"UR", b"UT", b"UV",
];

/// Why decoding stopped, before a path is attached.
#[derive(Debug)]
pub(crate) enum Fault {
    /// The input ended in the middle of an element.
    Eof,
    /// The input could not be read.
    Io(io::Error),
    /// The structure is invalid.
    Malformed(String),
}

impl From<io::Error> for Fault {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::Eof
        } else {
            Self::Io(err)
        }
    }
}

/// Tag, VR and length of one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ElementHeader {
    pub tag: Tag,
    pub vr: Option<[u8; 2]>,
    pub length: u32,
}

impl ElementHeader {
    const fn is_undefined_length(&self) -> bool {
        self.length == UNDEFINED_LENGTH
    }
}

/// Reads element headers and values in one encoding.
pub(crate) struct ElementReader<R> {
    inner: R,
    endian: Endian,
    explicit_vr: bool,
}

impl<R: Read> ElementReader<R> {
    pub(crate) const fn new(inner: R, endian: Endian, explicit_vr: bool) -> Self {
        Self {
            inner,
            endian,
            explicit_vr,
        }
    }

    /// Reads the four raw bytes of the next tag.
    ///
    /// Returns `None` at a clean end of input.
    pub(crate) fn next_raw_tag(&mut self) -> Result<Option<[u8; 4]>, Fault> {
        let mut raw = [0u8; 4];
        match fill(&mut self.inner, &mut raw)? {
            0 => Ok(None),
            4 => Ok(Some(raw)),
            _ => Err(Fault::Eof),
        }
    }

    /// Reads the next element header, or `None` at a clean end of input.
    pub(crate) fn next_header(&mut self) -> Result<Option<ElementHeader>, Fault> {
        match self.next_raw_tag()? {
            Some(raw) => {
                let tag = self.endian.decode_tag(raw);
                self.header_for(tag).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Reads the VR and length that follow an already-read tag.
    pub(crate) fn header_for(&mut self, tag: Tag) -> Result<ElementHeader, Fault> {
        if tag.is_delimiter_group() || !self.explicit_vr {
            let length = self.endian.read_u32(&mut self.inner)?;
            return Ok(ElementHeader {
                tag,
                vr: None,
                length,
            });
        }

        let mut vr = [0u8; 2];
        self.inner.read_exact(&mut vr)?;
        if !vr.iter().all(u8::is_ascii_uppercase) {
            return Err(Fault::Malformed(format!(
                "invalid VR bytes {vr:02X?} at {tag}"
            )));
        }

        let length = if LONG_LENGTH_VRS.contains(&&vr) {
            let mut reserved = [0u8; 2];
            self.inner.read_exact(&mut reserved)?;
            self.endian.read_u32(&mut self.inner)?
        } else {
            u32::from(self.endian.read_u16(&mut self.inner)?)
        };

        Ok(ElementHeader {
            tag,
            vr: Some(vr),
            length,
        })
    }

    /// Reads a short text value such as a UID or integer string.
    pub(crate) fn read_text(&mut self, header: &ElementHeader) -> Result<String, Fault> {
        if header.is_undefined_length() || header.length > MAX_TEXT_LENGTH {
            return Err(Fault::Malformed(format!(
                "{} has implausible length {}",
                header.tag, header.length
            )));
        }
        let mut bytes = vec![0u8; header.length as usize];
        self.inner.read_exact(&mut bytes)?;
        String::from_utf8(bytes)
            .map_err(|_| Fault::Malformed(format!("{} is not valid text", header.tag)))
    }

    /// Skips the value of `header`, walking undefined-length sequences.
    ///
    /// An undefined-length `UN` element holds a sequence encoded in implicit
    /// VR little endian whatever the transfer syntax, so it is walked in that
    /// encoding.
    pub(crate) fn skip_value(&mut self, header: &ElementHeader, depth: usize) -> Result<(), Fault> {
        if !header.is_undefined_length() {
            return self.skip_bytes(u64::from(header.length));
        }
        if header.vr == Some(*b"UN") {
            let outer = (self.endian, self.explicit_vr);
            self.endian = Endian::Little;
            self.explicit_vr = false;
            let walked = self.skip_sequence(depth + 1);
            (self.endian, self.explicit_vr) = outer;
            return walked;
        }
        self.skip_sequence(depth + 1)
    }

    fn skip_sequence(&mut self, depth: usize) -> Result<(), Fault> {
        if depth > MAX_DEPTH {
            return Err(Fault::Malformed("sequence nesting too deep".to_owned()));
        }
        while let Some(raw) = self.next_raw_tag()? {
            let tag = self.endian.decode_tag(raw);
            let length = self.endian.read_u32(&mut self.inner)?;
            match tag {
                tags::SEQUENCE_DELIMITATION => return Ok(()),
                tags::ITEM if length == UNDEFINED_LENGTH => self.skip_item(depth)?,
                tags::ITEM => self.skip_bytes(u64::from(length))?,
                other => {
                    return Err(Fault::Malformed(format!(
                        "unexpected {other} inside sequence"
                    )));
                }
            }
        }
        Err(Fault::Eof)
    }

    fn skip_item(&mut self, depth: usize) -> Result<(), Fault> {
        while let Some(header) = self.next_header()? {
            if header.tag == tags::ITEM_DELIMITATION {
                return Ok(());
            }
            self.skip_value(&header, depth)?;
        }
        Err(Fault::Eof)
    }

    fn skip_bytes(&mut self, length: u64) -> Result<(), Fault> {
        let copied = io::copy(&mut (&mut self.inner).take(length), &mut io::sink())?;
        if copied < length {
            return Err(Fault::Eof);
        }
        Ok(())
    }
}

/// Reads until `buf` is full or the input ends, returning the bytes read.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
