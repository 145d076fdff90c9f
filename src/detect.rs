//! Schema version detection from a bounded input prefix.
//!
//! The detector peeks at most [`PRESCAN_LIMIT`] bytes, scans them for the
//! `schemaVersion` marker in either wire form, and hands the consumed
//! prefix back so the caller can reconstitute a logically identical
//! stream without double-reading.

use std::io::{Chain, Cursor, Read};

use crate::error::ConvertError;
use crate::format::EpcisVersion;

/// Maximum number of bytes read during the prescan.
pub const PRESCAN_LIMIT: usize = 1024;

/// Result of the prescan: the detected version plus the consumed bytes.
#[derive(Debug)]
pub struct DetectedVersion {
    pub version: EpcisVersion,
    /// Exactly the bytes read from the input, in order.
    pub prefix: Vec<u8>,
}

impl DetectedVersion {
    /// Reconstitute the input stream: the buffered prefix followed by the
    /// remainder of the original stream.
    pub fn replay<R: Read>(self, rest: R) -> Chain<Cursor<Vec<u8>>, R> {
        Cursor::new(self.prefix).chain(rest)
    }
}

/// Detect the EPCIS schema version from the stream prefix.
///
/// Matches `schemaVersion="1.2"` / `schemaVersion='1.2'` in XML and the
/// whitespace-normalised `"schemaVersion":"1.2"` in JSON, likewise for
/// 2.0. A missing marker (including an empty stream) is
/// [`ConvertError::SchemaVersionMissing`]; any other version value is
/// [`ConvertError::UnsupportedVersion`].
pub fn detect_version(input: &mut impl Read) -> Result<DetectedVersion, ConvertError> {
    let mut prefix = vec![0u8; PRESCAN_LIMIT];
    let mut filled = 0;
    while filled < PRESCAN_LIMIT {
        let n = input.read(&mut prefix[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    prefix.truncate(filled);

    let text = String::from_utf8_lossy(&prefix);
    if !text.contains("schemaVersion") {
        return Err(ConvertError::SchemaVersionMissing);
    }

    let squashed: String = text.chars().filter(|c| *c != ' ').collect();
    let version = if marker_matches(&text, &squashed, "1.2") {
        EpcisVersion::V1_2
    } else if marker_matches(&text, &squashed, "2.0") {
        EpcisVersion::V2_0
    } else {
        return Err(ConvertError::UnsupportedVersion(text.into_owned()));
    };

    Ok(DetectedVersion { version, prefix })
}

fn marker_matches(text: &str, squashed: &str, version: &str) -> bool {
    text.contains(&format!("schemaVersion=\"{version}\""))
        || text.contains(&format!("schemaVersion='{version}'"))
        || squashed.contains(&format!("\"schemaVersion\":\"{version}\""))
}
