//! Student photo encoding between inline data URLs and binary entries.
//!
//! # Invariants
//! - Inline photos use `data:<mime>;base64,<payload>`.
//! - Binary entries are named `photos/<nationalId>.<ext>`; the identifier is
//!   the file name text before the first `.`.
//! - Decoded bytes must carry the signature of the format their extension
//!   names.

use super::document::PHOTOS_DIR;
use super::{ArchiveError, ArchiveResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;

static DATA_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^data:([A-Za-z0-9.+-]+/[A-Za-z0-9.+-]+);base64,(.*)$")
        .expect("valid data url regex")
});

/// Image formats accepted in the photo directory.
const FORMATS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

/// Photo decoded from an inline data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinePhoto {
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Parses an inline data URL; `None` when it is not base64 data.
pub fn parse_data_url(value: &str) -> Option<InlinePhoto> {
    let captures = DATA_URL_RE.captures(value.trim())?;
    let mime = captures.get(1)?.as_str().to_ascii_lowercase();
    let payload: String = captures
        .get(2)?
        .as_str()
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD.decode(payload).ok()?;
    Some(InlinePhoto { mime, bytes })
}

pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let mime = if mime == "image/jpg" { "image/jpeg" } else { mime };
    FORMATS
        .iter()
        .find(|(known, _)| *known == mime)
        .map(|(_, ext)| *ext)
}

pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    let extension = extension.to_ascii_lowercase();
    let extension = if extension == "jpeg" { "jpg" } else { extension.as_str() };
    FORMATS
        .iter()
        .find(|(_, ext)| *ext == extension)
        .map(|(mime, _)| *mime)
}

/// Whether an identifier can name a photo entry without escaping.
pub fn is_entry_safe(identifier: &str) -> bool {
    !identifier.is_empty()
        && identifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn entry_name(identifier: &str, extension: &str) -> String {
    format!("{PHOTOS_DIR}{identifier}.{extension}")
}

/// Splits a photo entry name into identifier and extension.
pub fn split_entry_name(entry: &str) -> Option<(&str, &str)> {
    let file = entry.strip_prefix(PHOTOS_DIR)?;
    let (identifier, rest) = file.split_once('.')?;
    if identifier.is_empty() || identifier.contains('/') {
        return None;
    }
    let extension = rest.rsplit('.').next().unwrap_or(rest);
    Some((identifier, extension))
}

/// Decodes one binary photo entry into `(identifier, data URL)`.
pub fn decode_entry(entry: &str, bytes: &[u8]) -> ArchiveResult<(String, String)> {
    let fail = |reason: &str| ArchiveError::AssetDecode {
        entry: entry.to_string(),
        reason: reason.to_string(),
    };

    let (identifier, extension) =
        split_entry_name(entry).ok_or_else(|| fail("entry name has no identifier"))?;
    let mime = mime_for_extension(extension).ok_or_else(|| fail("unsupported image extension"))?;
    if bytes.is_empty() {
        return Err(fail("entry is empty"));
    }
    if !has_signature(mime, bytes) {
        return Err(fail("content does not match its image type"));
    }
    Ok((identifier.to_string(), to_data_url(mime, bytes)))
}

fn has_signature(mime: &str, bytes: &[u8]) -> bool {
    match mime {
        "image/jpeg" => bytes.starts_with(&[0xFF, 0xD8, 0xFF]),
        "image/png" => bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
        "image/gif" => bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a"),
        "image/webp" => bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_entry, parse_data_url, split_entry_name, to_data_url};
    use crate::archive::ArchiveError;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    #[test]
    fn data_url_roundtrip_keeps_mime_and_bytes() {
        let url = to_data_url("image/png", PNG);
        let photo = parse_data_url(&url).unwrap();
        assert_eq!(photo.mime, "image/png");
        assert_eq!(photo.bytes, PNG);
        assert!(parse_data_url("not a data url").is_none());
    }

    #[test]
    fn entry_identifier_is_text_before_first_dot() {
        assert_eq!(
            split_entry_name("photos/12345678901.jpg"),
            Some(("12345678901", "jpg"))
        );
        assert_eq!(
            split_entry_name("photos/12345.backup.png"),
            Some(("12345", "png"))
        );
        assert_eq!(split_entry_name("photos/.png"), None);
        assert_eq!(split_entry_name("data.json"), None);
    }

    #[test]
    fn decode_entry_rejects_mismatched_content() {
        let (identifier, url) = decode_entry("photos/42.png", PNG).unwrap();
        assert_eq!(identifier, "42");
        assert!(url.starts_with("data:image/png;base64,"));

        let err = decode_entry("photos/42.jpg", PNG).unwrap_err();
        assert!(matches!(err, ArchiveError::AssetDecode { .. }));
        let err = decode_entry("photos/42.tiff", PNG).unwrap_err();
        assert!(matches!(err, ArchiveError::AssetDecode { .. }));
    }
}
