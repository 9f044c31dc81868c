//! Synthetic Part 10 instances for tests.
//!
//! Produces small but structurally faithful files: preamble, `DICM` prefix,
//! explicit little endian meta group, then a dataset in the requested
//! transfer syntax with a nested sequence ahead of the identifiers and a few
//! bytes of pixel data at the end.

use std::io::{self, Write};
use std::path::Path;

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

use crate::syntax::{Endian, TransferSyntax};
use crate::tags::{self, Tag};

/// MR Image Storage.
const MR_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.4";

const META_VERSION: Tag = Tag::new(0x0002, 0x0001);
const MEDIA_STORAGE_SOP_CLASS_UID: Tag = Tag::new(0x0002, 0x0002);
const MEDIA_STORAGE_SOP_INSTANCE_UID: Tag = Tag::new(0x0002, 0x0003);
const SOP_CLASS_UID: Tag = Tag::new(0x0008, 0x0016);
const MODALITY: Tag = Tag::new(0x0008, 0x0060);
const REFERENCED_IMAGE_SEQUENCE: Tag = Tag::new(0x0008, 0x1140);
const REFERENCED_SOP_CLASS_UID: Tag = Tag::new(0x0008, 0x1150);
const REFERENCED_SOP_INSTANCE_UID: Tag = Tag::new(0x0008, 0x1155);
const PATIENT_NAME: Tag = Tag::new(0x0010, 0x0010);
/// Private vendor sequence, stored as `UN` the way many scanners export it.
const PRIVATE_SEQUENCE: Tag = Tag::new(0x0019, 0x1010);
const PRIVATE_VALUE: Tag = Tag::new(0x0019, 0x1011);
const PIXEL_DATA: Tag = Tag::new(0x7FE0, 0x0010);

/// A synthetic instance description, built with chained setters.
#[derive(Debug, Clone)]
pub struct SynthInstance {
    study_uid: Option<String>,
    series_uid: Option<String>,
    sop_instance_uid: String,
    series_number: Option<i32>,
    instance_number: Option<i32>,
    transfer_syntax: TransferSyntax,
    transfer_syntax_uid: Option<String>,
    with_sequence: bool,
    with_private_sequence: bool,
    pixel_bytes: usize,
}

impl SynthInstance {
    /// Describes an explicit VR little endian instance in the given run.
    #[must_use]
    pub fn new(study_uid: &str, series_uid: &str) -> Self {
        Self {
            study_uid: Some(study_uid.to_owned()),
            series_uid: Some(series_uid.to_owned()),
            sop_instance_uid: format!("{series_uid}.1"),
            series_number: Some(1),
            instance_number: Some(1),
            transfer_syntax: TransferSyntax::ExplicitVrLittleEndian,
            transfer_syntax_uid: None,
            with_sequence: true,
            with_private_sequence: false,
            pixel_bytes: 64,
        }
    }

    /// Encodes the dataset with `syntax`.
    #[must_use]
    pub fn transfer_syntax(mut self, syntax: TransferSyntax) -> Self {
        self.transfer_syntax = syntax;
        self
    }

    /// Writes `uid` into the meta group instead of the encoding's own UID.
    ///
    /// The dataset is still encoded with the configured syntax.
    #[must_use]
    pub fn transfer_syntax_uid(mut self, uid: &str) -> Self {
        self.transfer_syntax_uid = Some(uid.to_owned());
        self
    }

    /// Sets the SOP Instance UID.
    #[must_use]
    pub fn sop_instance_uid(mut self, uid: &str) -> Self {
        uid.clone_into(&mut self.sop_instance_uid);
        self
    }

    /// Sets the Instance Number.
    #[must_use]
    pub const fn instance_number(mut self, number: i32) -> Self {
        self.instance_number = Some(number);
        self
    }

    /// Sets the Series Number.
    #[must_use]
    pub const fn series_number(mut self, number: i32) -> Self {
        self.series_number = Some(number);
        self
    }

    /// Omits the Study Instance UID.
    #[must_use]
    pub fn without_study(mut self) -> Self {
        self.study_uid = None;
        self
    }

    /// Omits the Series Instance UID.
    #[must_use]
    pub fn without_series(mut self) -> Self {
        self.series_uid = None;
        self
    }

    /// Omits the Referenced Image Sequence.
    #[must_use]
    pub const fn without_sequence(mut self) -> Self {
        self.with_sequence = false;
        self
    }

    /// Adds a private undefined-length `UN` sequence ahead of the identifiers.
    ///
    /// Its contents are implicit VR little endian whatever the dataset's
    /// transfer syntax.
    #[must_use]
    pub const fn with_private_sequence(mut self) -> Self {
        self.with_private_sequence = true;
        self
    }

    /// Encodes the instance.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(512 + self.pixel_bytes);
        out.extend_from_slice(&[0u8; 128]);
        out.extend_from_slice(b"DICM");
        self.write_meta(&mut out)?;
        self.write_dataset(&mut out)?;
        Ok(out)
    }

    /// Encodes the instance and writes it to `path`.
    pub fn write_to(&self, path: impl AsRef<Path>) -> io::Result<()> {
        std::fs::write(path, self.to_bytes()?)
    }

    fn write_meta(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let meta = Encoder::new(Endian::Little, true);
        let ts_uid = self
            .transfer_syntax_uid
            .as_deref()
            .unwrap_or_else(|| self.transfer_syntax.uid());

        let mut group = Vec::new();
        meta.element(&mut group, META_VERSION, *b"OB", &[0x00, 0x01])?;
        meta.uid(&mut group, MEDIA_STORAGE_SOP_CLASS_UID, MR_IMAGE_STORAGE)?;
        meta.uid(&mut group, MEDIA_STORAGE_SOP_INSTANCE_UID, &self.sop_instance_uid)?;
        meta.uid(&mut group, tags::TRANSFER_SYNTAX_UID, ts_uid)?;

        let group_length = u32::try_from(group.len())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        meta.element(out, tags::META_GROUP_LENGTH, *b"UL", &group_length.to_le_bytes())?;
        out.extend_from_slice(&group);
        Ok(())
    }

    fn write_dataset(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let enc = Encoder::new(
            self.transfer_syntax.endian(),
            self.transfer_syntax.explicit_vr(),
        );

        enc.uid(out, SOP_CLASS_UID, MR_IMAGE_STORAGE)?;
        enc.uid(out, tags::SOP_INSTANCE_UID, &self.sop_instance_uid)?;
        enc.text(out, MODALITY, *b"CS", "MR")?;
        if self.with_sequence {
            enc.sequence_start(out, REFERENCED_IMAGE_SEQUENCE, *b"SQ")?;
            enc.delimiter(out, tags::ITEM, u32::MAX)?;
            enc.uid(out, REFERENCED_SOP_CLASS_UID, MR_IMAGE_STORAGE)?;
            enc.uid(out, REFERENCED_SOP_INSTANCE_UID, "1.2.3.4.5.6")?;
            enc.delimiter(out, tags::ITEM_DELIMITATION, 0)?;
            enc.delimiter(out, tags::SEQUENCE_DELIMITATION, 0)?;
        }
        enc.text(out, PATIENT_NAME, *b"PN", "ANON^PHANTOM")?;
        if self.with_private_sequence {
            enc.sequence_start(out, PRIVATE_SEQUENCE, *b"UN")?;
            let inner = Encoder::new(Endian::Little, false);
            inner.delimiter(out, tags::ITEM, u32::MAX)?;
            inner.text(out, PRIVATE_VALUE, *b"LO", "VENDOR")?;
            inner.delimiter(out, tags::ITEM_DELIMITATION, 0)?;
            inner.delimiter(out, tags::SEQUENCE_DELIMITATION, 0)?;
        }
        if let Some(study) = &self.study_uid {
            enc.uid(out, tags::STUDY_INSTANCE_UID, study)?;
        }
        if let Some(series) = &self.series_uid {
            enc.uid(out, tags::SERIES_INSTANCE_UID, series)?;
        }
        if let Some(number) = self.series_number {
            enc.text(out, tags::SERIES_NUMBER, *b"IS", &number.to_string())?;
        }
        if let Some(number) = self.instance_number {
            enc.text(out, tags::INSTANCE_NUMBER, *b"IS", &number.to_string())?;
        }
        let pixels: Vec<u8> = (0..self.pixel_bytes)
            .map(|i| u8::try_from(i % 251).unwrap_or_default())
            .collect();
        enc.element(out, PIXEL_DATA, *b"OW", &pixels)
    }
}

/// Writes elements in one encoding.
#[derive(Debug, Clone, Copy)]
struct Encoder {
    endian: Endian,
    explicit_vr: bool,
}

impl Encoder {
    const fn new(endian: Endian, explicit_vr: bool) -> Self {
        Self {
            endian,
            explicit_vr,
        }
    }

    fn u16(self, out: &mut Vec<u8>, value: u16) -> io::Result<()> {
        match self.endian {
            Endian::Little => out.write_u16::<LittleEndian>(value),
            Endian::Big => out.write_u16::<BigEndian>(value),
        }
    }

    fn u32(self, out: &mut Vec<u8>, value: u32) -> io::Result<()> {
        match self.endian {
            Endian::Little => out.write_u32::<LittleEndian>(value),
            Endian::Big => out.write_u32::<BigEndian>(value),
        }
    }

    fn tag(self, out: &mut Vec<u8>, tag: Tag) -> io::Result<()> {
        self.u16(out, tag.group)?;
        self.u16(out, tag.element)
    }

    fn element(self, out: &mut Vec<u8>, tag: Tag, vr: [u8; 2], value: &[u8]) -> io::Result<()> {
        let length = u32::try_from(value.len())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.tag(out, tag)?;
        if self.explicit_vr {
            out.write_all(&vr)?;
            if matches!(&vr, b"OB" | b"OW" | b"SQ" | b"UN" | b"UT") {
                out.write_all(&[0, 0])?;
                self.u32(out, length)?;
            } else {
                let short = u16::try_from(length)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
                self.u16(out, short)?;
            }
        } else {
            self.u32(out, length)?;
        }
        out.write_all(value)
    }

    fn uid(self, out: &mut Vec<u8>, tag: Tag, value: &str) -> io::Result<()> {
        let mut bytes = value.as_bytes().to_vec();
        if bytes.len() % 2 == 1 {
            bytes.push(0);
        }
        self.element(out, tag, *b"UI", &bytes)
    }

    fn text(self, out: &mut Vec<u8>, tag: Tag, vr: [u8; 2], value: &str) -> io::Result<()> {
        let mut bytes = value.as_bytes().to_vec();
        if bytes.len() % 2 == 1 {
            bytes.push(b' ');
        }
        self.element(out, tag, vr, &bytes)
    }

    fn sequence_start(self, out: &mut Vec<u8>, tag: Tag, vr: [u8; 2]) -> io::Result<()> {
        self.tag(out, tag)?;
        if self.explicit_vr {
            out.write_all(&vr)?;
            out.write_all(&[0, 0])?;
        }
        self.u32(out, u32::MAX)
    }

    fn delimiter(self, out: &mut Vec<u8>, tag: Tag, length: u32) -> io::Result<()> {
        self.tag(out, tag)?;
        self.u32(out, length)
    }
}
