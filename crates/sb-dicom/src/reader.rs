//! Header extraction.
//!
//! Reads the preamble, the file meta group and the leading part of the
//! dataset, returning as soon as every wanted element has been passed.

use std::fs::File;
use std::io::{self, BufReader, Read};

use camino::Utf8Path;
use sb_core::{HeaderFields, Uid};

use crate::element::{ElementReader, Fault};
use crate::error::ReadError;
use crate::syntax::{Endian, TransferSyntax};
use crate::tags;

/// Length of the Part 10 preamble preceding the `DICM` prefix.
const PREAMBLE_LENGTH: usize = 128;

/// The four bytes following the preamble.
const MAGIC: &[u8; 4] = b"DICM";

/// Raw text values collected from the dataset.
#[derive(Debug, Default)]
struct RawFields {
    study: Option<String>,
    series: Option<String>,
    sop_instance: Option<String>,
    series_number: Option<String>,
    instance_number: Option<String>,
}

/// Reads the classification header of the file at `path`.
///
/// Only the header is read; pixel data is never touched.
///
/// # Errors
///
/// See [`ReadError`] for how each failure is classified.
pub fn read_header(path: &Utf8Path) -> Result<HeaderFields, ReadError> {
    let file = File::open(path).map_err(|e| ReadError::from_io(path, e))?;
    read_header_from(BufReader::new(file), path)
}

/// Reads the classification header from an arbitrary reader.
///
/// `path` is only used to label errors.
pub fn read_header_from<R: Read>(mut reader: R, path: &Utf8Path) -> Result<HeaderFields, ReadError> {
    let mut prefix = [0u8; PREAMBLE_LENGTH + MAGIC.len()];
    if let Err(e) = reader.read_exact(&mut prefix) {
        // too short to judge yet; most likely still being written
        if e.kind() == io::ErrorKind::UnexpectedEof {
            return Err(ReadError::Truncated {
                path: path.to_owned(),
            });
        }
        return Err(ReadError::from_io(path, e));
    }
    if &prefix[PREAMBLE_LENGTH..] != MAGIC {
        return Err(ReadError::NotDicom {
            path: path.to_owned(),
            reason: "missing DICM prefix",
        });
    }

    let (syntax_uid, pending) = read_meta(&mut reader).map_err(|f| fault_error(path, f))?;
    let syntax = resolve_syntax(syntax_uid.as_deref(), path)?;

    let dataset = io::Cursor::new(pending).chain(reader);
    let elements = ElementReader::new(dataset, syntax.endian(), syntax.explicit_vr());
    let (raw, ended_early) = read_dataset(elements).map_err(|f| fault_error(path, f))?;
    if ended_early && (raw.study.is_none() || raw.series.is_none()) {
        return Err(ReadError::Truncated {
            path: path.to_owned(),
        });
    }

    build_header(raw, path)
}

/// Reads the meta group, returning the transfer syntax UID and the raw tag
/// bytes of the first dataset element, if one was read.
fn read_meta<R: Read>(reader: &mut R) -> Result<(Option<String>, Vec<u8>), Fault> {
    let mut elements = ElementReader::new(reader, Endian::Little, true);
    let mut syntax_uid = None;

    while let Some(raw) = elements.next_raw_tag()? {
        let tag = Endian::Little.decode_tag(raw);
        if tag.group != tags::META_GROUP {
            return Ok((syntax_uid, raw.to_vec()));
        }
        let header = elements.header_for(tag)?;
        if tag == tags::TRANSFER_SYNTAX_UID {
            syntax_uid = Some(elements.read_text(&header)?);
        } else {
            elements.skip_value(&header, 0)?;
        }
    }

    Ok((syntax_uid, Vec::new()))
}

/// Picks the dataset encoding. A meta group without a transfer syntax falls
/// back to the DICOM default, implicit VR little endian.
fn resolve_syntax(uid: Option<&str>, path: &Utf8Path) -> Result<TransferSyntax, ReadError> {
    match uid {
        None => Ok(TransferSyntax::ImplicitVrLittleEndian),
        Some(uid) => TransferSyntax::from_uid(uid).ok_or_else(|| {
            ReadError::UnsupportedTransferSyntax {
                path: path.to_owned(),
                uid: uid.trim_end_matches(|c: char| c == '\0' || c == ' ').to_owned(),
            }
        }),
    }
}

/// Collects the wanted values. The flag is `true` when the input ended
/// before parsing moved past the last wanted tag.
fn read_dataset<R: Read>(mut elements: ElementReader<R>) -> Result<(RawFields, bool), Fault> {
    let mut raw = RawFields::default();

    while let Some(header) = elements.next_header()? {
        if header.tag > tags::LAST_WANTED {
            return Ok((raw, false));
        }
        match header.tag {
            tags::SOP_INSTANCE_UID => raw.sop_instance = Some(elements.read_text(&header)?),
            tags::STUDY_INSTANCE_UID => raw.study = Some(elements.read_text(&header)?),
            tags::SERIES_INSTANCE_UID => raw.series = Some(elements.read_text(&header)?),
            tags::SERIES_NUMBER => raw.series_number = Some(elements.read_text(&header)?),
            tags::INSTANCE_NUMBER => raw.instance_number = Some(elements.read_text(&header)?),
            _ => elements.skip_value(&header, 0)?,
        }
    }

    Ok((raw, true))
}

fn build_header(raw: RawFields, path: &Utf8Path) -> Result<HeaderFields, ReadError> {
    let study_uid = required_uid(raw.study, "StudyInstanceUID", path)?;
    let series_uid = required_uid(raw.series, "SeriesInstanceUID", path)?;

    let mut header = HeaderFields::new(study_uid, series_uid);
    header.sop_instance_uid = raw.sop_instance.and_then(|v| Uid::parse(&v).ok());
    header.series_number = raw.series_number.as_deref().and_then(parse_integer_string);
    header.instance_number = raw.instance_number.as_deref().and_then(parse_integer_string);
    Ok(header)
}

fn required_uid(
    value: Option<String>,
    element: &'static str,
    path: &Utf8Path,
) -> Result<Uid, ReadError> {
    let value = value.ok_or_else(|| ReadError::MissingElement {
        path: path.to_owned(),
        element,
    })?;
    Uid::parse(&value).map_err(|source| ReadError::InvalidUid {
        path: path.to_owned(),
        element,
        source,
    })
}

/// Parses the first value of an IS (integer string) element.
fn parse_integer_string(value: &str) -> Option<i32> {
    value
        .split('\\')
        .next()?
        .trim_matches(|c: char| c == '\0' || c == ' ')
        .parse()
        .ok()
}

fn fault_error(path: &Utf8Path, fault: Fault) -> ReadError {
    match fault {
        Fault::Eof => ReadError::Truncated {
            path: path.to_owned(),
        },
        Fault::Io(source) => ReadError::from_io(path, source),
        Fault::Malformed(reason) => ReadError::Malformed {
            path: path.to_owned(),
            reason,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::SynthInstance;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    const STUDY: &str = "1.3.12.2.1107.5.2.43.1";
    const SERIES: &str = "1.3.12.2.1107.5.2.43.1.2";

    fn path() -> &'static Utf8Path {
        Utf8Path::new("/watch/IM0001.dcm")
    }

    fn parse(bytes: &[u8]) -> Result<HeaderFields, ReadError> {
        read_header_from(bytes, path())
    }

    #[test]
    fn test_reads_explicit_little_endian() {
        let bytes = SynthInstance::new(STUDY, SERIES)
            .series_number(5)
            .instance_number(12)
            .to_bytes()
            .unwrap();

        let header = parse(&bytes).unwrap();
        assert_eq!(header.study_uid.as_str(), STUDY);
        assert_eq!(header.series_uid.as_str(), SERIES);
        assert_eq!(header.series_number, Some(5));
        assert_eq!(header.instance_number, Some(12));
        assert_eq!(
            header.sop_instance_uid.as_ref().map(Uid::as_str),
            Some("1.3.12.2.1107.5.2.43.1.2.1")
        );
    }

    #[test]
    fn test_reads_every_supported_encoding() {
        for syntax in [
            TransferSyntax::ImplicitVrLittleEndian,
            TransferSyntax::ExplicitVrLittleEndian,
            TransferSyntax::ExplicitVrBigEndian,
        ] {
            let bytes = SynthInstance::new(STUDY, SERIES)
                .transfer_syntax(syntax)
                .instance_number(3)
                .to_bytes()
                .unwrap();
            let header = parse(&bytes).unwrap();
            assert_eq!(header.series_uid.as_str(), SERIES, "{syntax:?}");
            assert_eq!(header.instance_number, Some(3), "{syntax:?}");
        }
    }

    #[test]
    fn test_private_un_sequence_is_skipped() {
        for syntax in [
            TransferSyntax::ImplicitVrLittleEndian,
            TransferSyntax::ExplicitVrLittleEndian,
            TransferSyntax::ExplicitVrBigEndian,
        ] {
            let bytes = SynthInstance::new(STUDY, SERIES)
                .transfer_syntax(syntax)
                .with_private_sequence()
                .to_bytes()
                .unwrap();
            let header = parse(&bytes).unwrap();
            assert_eq!(header.study_uid.as_str(), STUDY, "{syntax:?}");
            assert_eq!(header.series_uid.as_str(), SERIES, "{syntax:?}");
        }
    }

    #[test]
    fn test_encapsulated_syntax_reads_as_explicit() {
        let bytes = SynthInstance::new(STUDY, SERIES)
            .transfer_syntax_uid("1.2.840.10008.1.2.4.70")
            .to_bytes()
            .unwrap();
        assert_eq!(parse(&bytes).unwrap().study_uid.as_str(), STUDY);
    }

    #[test]
    fn test_deflated_is_unsupported() {
        let bytes = SynthInstance::new(STUDY, SERIES)
            .transfer_syntax_uid(TransferSyntax::DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN)
            .to_bytes()
            .unwrap();
        let err = parse(&bytes).unwrap_err();
        assert!(matches!(err, ReadError::UnsupportedTransferSyntax { ref uid, .. } if uid == "1.2.840.10008.1.2.1.99"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_without_sequence() {
        let bytes = SynthInstance::new(STUDY, SERIES)
            .without_sequence()
            .to_bytes()
            .unwrap();
        assert_eq!(parse(&bytes).unwrap().series_uid.as_str(), SERIES);
    }

    #[test]
    fn test_short_file_is_truncated() {
        let err = parse(b"partial").unwrap_err();
        assert!(matches!(err, ReadError::Truncated { .. }));
        assert!(err.is_incomplete());
        assert!(err.is_transient());
    }

    #[test]
    fn test_missing_magic_is_not_dicom() {
        let mut bytes = SynthInstance::new(STUDY, SERIES).to_bytes().unwrap();
        bytes[128..132].copy_from_slice(b"NOPE");
        let err = parse(&bytes).unwrap_err();
        assert!(matches!(
            err,
            ReadError::NotDicom {
                reason: "missing DICM prefix",
                ..
            }
        ));
    }

    fn position(haystack: &[u8], needle: &[u8]) -> usize {
        haystack
            .windows(needle.len())
            .position(|w| w == needle)
            .unwrap()
    }

    #[test]
    fn test_partial_write_is_truncated() {
        let bytes = SynthInstance::new(STUDY, SERIES).to_bytes().unwrap();
        let study_tag = position(&bytes, &[0x20, 0x00, 0x0D, 0x00, b'U', b'I']);

        // cut in the middle of the study element's tag
        let err = parse(&bytes[..study_tag + 3]).unwrap_err();
        assert!(matches!(err, ReadError::Truncated { .. }), "{err}");
        assert!(err.is_transient());

        // cut exactly on the element boundary before it
        let err = parse(&bytes[..study_tag]).unwrap_err();
        assert!(matches!(err, ReadError::Truncated { .. }), "{err}");
    }

    #[test]
    fn test_cut_inside_meta_group_is_truncated() {
        let bytes = SynthInstance::new(STUDY, SERIES).to_bytes().unwrap();
        let err = parse(&bytes[..140]).unwrap_err();
        assert!(matches!(err, ReadError::Truncated { .. }), "{err}");
    }

    #[test]
    fn test_cut_after_identifiers_still_reads() {
        let bytes = SynthInstance::new(STUDY, SERIES).to_bytes().unwrap();
        // drop the tail of the pixel data; parsing stops before it
        let header = parse(&bytes[..bytes.len() - 10]).unwrap();
        assert_eq!(header.study_uid.as_str(), STUDY);
    }

    #[test]
    fn test_missing_series() {
        let bytes = SynthInstance::new(STUDY, SERIES)
            .without_series()
            .to_bytes()
            .unwrap();
        let err = parse(&bytes).unwrap_err();
        assert!(matches!(
            err,
            ReadError::MissingElement {
                element: "SeriesInstanceUID",
                ..
            }
        ));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_missing_study() {
        let bytes = SynthInstance::new(STUDY, SERIES)
            .without_study()
            .to_bytes()
            .unwrap();
        assert!(matches!(
            parse(&bytes),
            Err(ReadError::MissingElement {
                element: "StudyInstanceUID",
                ..
            })
        ));
    }

    #[test]
    fn test_unsafe_uid_is_rejected() {
        let bytes = SynthInstance::new("..", SERIES).to_bytes().unwrap();
        assert!(matches!(
            parse(&bytes),
            Err(ReadError::InvalidUid {
                element: "StudyInstanceUID",
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_sop_instance_is_dropped() {
        let bytes = SynthInstance::new(STUDY, SERIES)
            .sop_instance_uid("a/b")
            .to_bytes()
            .unwrap();
        assert!(parse(&bytes).unwrap().sop_instance_uid.is_none());
    }

    #[test]
    fn test_parse_integer_string() {
        assert_eq!(parse_integer_string("12 "), Some(12));
        assert_eq!(parse_integer_string(" -3\\4"), Some(-3));
        assert_eq!(parse_integer_string("abc"), None);
        assert_eq!(parse_integer_string(""), None);
    }

    #[test]
    fn test_read_header_from_disk() {
        let dir = TempDir::new().unwrap();
        let file = Utf8PathBuf::from_path_buf(dir.path().join("IM0001.dcm")).unwrap();
        SynthInstance::new(STUDY, SERIES).write_to(&file).unwrap();

        let header = read_header(&file).unwrap();
        assert_eq!(header.run_identity().series.as_str(), SERIES);
    }

    #[test]
    fn test_read_header_vanished() {
        let dir = TempDir::new().unwrap();
        let file = Utf8PathBuf::from_path_buf(dir.path().join("gone.dcm")).unwrap();
        let err = read_header(&file).unwrap_err();
        assert!(err.is_vanished());
        assert_eq!(err.path().as_str(), file.as_str());
    }
}
