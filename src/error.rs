//! Error types for document conversion, and the in-band problem response.

use std::io::Cursor;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema;

/// Errors that can occur while converting an EPCIS document.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The 1024-byte prefix scan found no `schemaVersion` marker.
    #[error("unable to detect the EPCIS schemaVersion for the given document")]
    SchemaVersionMissing,

    /// A `schemaVersion` marker was found but its value is not 1.2 or 2.0.
    #[error("document declares an unsupported EPCIS schema version")]
    UnsupportedVersion(String),

    /// The requested (media type, version) pair has no conversion path.
    #[error("unsupported conversion: {0}")]
    UnsupportedConversion(String),

    /// XML parsing or serialization error.
    #[error("XML error: {0}")]
    Xml(String),

    /// JSON parsing or serialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// A validator rejected an event or the envelope.
    #[error("validation error: {0}")]
    Validation(String),

    /// The injected event mapper failed.
    #[error("event mapper error: {0}")]
    Mapping(String),

    /// Invalid converter configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// IO error on the upstream or downstream stream.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    /// Create an XML error.
    pub fn xml(message: impl Into<String>) -> Self {
        Self::Xml(message.into())
    }

    /// Create a JSON error.
    pub fn json(message: impl Into<String>) -> Self {
        Self::Json(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a mapping error.
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping(message.into())
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// True for a broken downstream pipe, which means the consumer went
    /// away and the producer should terminate quietly.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::BrokenPipe)
    }
}

/// Structured error document written into the output stream when a
/// conversion fails after streaming has begun.
///
/// Serialised as namespaced XML when the output media type is XML, as
/// JSON otherwise, so the consumer always reads a parseable document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemResponseBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl ProblemResponseBody {
    /// Map a conversion error onto the problem vocabulary.
    pub fn from_error(error: &ConvertError) -> Self {
        let (kind, title, status) = match error {
            ConvertError::SchemaVersionMissing | ConvertError::UnsupportedVersion(_) => (
                "epcisException:ValidationException",
                "Unsupported EPCIS document version",
                400,
            ),
            ConvertError::UnsupportedConversion(_) => (
                "epcisException:ValidationException",
                "Unsupported conversion",
                400,
            ),
            ConvertError::Xml(_) | ConvertError::Json(_) => (
                "epcisException:ValidationException",
                "Malformed EPCIS document",
                400,
            ),
            ConvertError::Validation(_) => (
                "epcisException:ValidationException",
                "EPCIS document validation failed",
                400,
            ),
            ConvertError::Configuration(_) => (
                "epcisException:ValidationException",
                "Invalid conversion request",
                400,
            ),
            ConvertError::Mapping(_) | ConvertError::Io(_) => (
                "epcisException:ImplementationException",
                "Conversion failed",
                500,
            ),
        };
        Self {
            kind: kind.to_string(),
            title: title.to_string(),
            status,
            detail: Some(error.to_string()),
            instance: None,
        }
    }

    /// Serialise as a JSON problem document.
    pub fn to_json(&self) -> Result<Vec<u8>, ConvertError> {
        serde_json::to_vec_pretty(self).map_err(|e| ConvertError::json(e.to_string()))
    }

    /// Serialise as a namespaced XML problem document.
    pub fn to_xml(&self) -> Result<Vec<u8>, ConvertError> {
        let mut buffer = Cursor::new(Vec::new());
        let mut writer = Writer::new_with_indent(&mut buffer, b' ', 2);

        let mut root = BytesStart::new("epcisException:ProblemResponseBody");
        root.push_attribute(("xmlns:epcisException", schema::ns::EPCIS_EXCEPTION));
        writer
            .write_event(Event::Start(root))
            .map_err(|e| ConvertError::xml(e.to_string()))?;

        write_text_element(&mut writer, "type", &self.kind)?;
        write_text_element(&mut writer, "title", &self.title)?;
        write_text_element(&mut writer, "status", &self.status.to_string())?;
        if let Some(ref detail) = self.detail {
            write_text_element(&mut writer, "detail", detail)?;
        }
        if let Some(ref instance) = self.instance {
            write_text_element(&mut writer, "instance", instance)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("epcisException:ProblemResponseBody")))
            .map_err(|e| ConvertError::xml(e.to_string()))?;

        Ok(buffer.into_inner())
    }
}

fn write_text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> Result<(), ConvertError> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(|e| ConvertError::xml(e.to_string()))?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(|e| ConvertError::xml(e.to_string()))?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(|e| ConvertError::xml(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_body_from_parse_error() {
        let body = ProblemResponseBody::from_error(&ConvertError::xml("unexpected element"));
        assert_eq!(body.kind, "epcisException:ValidationException");
        assert_eq!(body.status, 400);
        assert!(body.detail.as_deref().is_some_and(|d| d.contains("unexpected element")));
    }

    #[test]
    fn test_problem_body_from_io_error() {
        let io = ConvertError::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        let body = ProblemResponseBody::from_error(&io);
        assert_eq!(body.kind, "epcisException:ImplementationException");
        assert_eq!(body.status, 500);
    }

    #[test]
    fn test_problem_body_xml_is_namespaced() {
        let body = ProblemResponseBody::from_error(&ConvertError::SchemaVersionMissing);
        let xml = String::from_utf8(body.to_xml().expect("serialise")).expect("utf-8");
        assert!(xml.contains("epcisException:ProblemResponseBody"));
        assert!(xml.contains("xmlns:epcisException"));
        assert!(xml.contains("<status>400</status>"));
    }

    #[test]
    fn test_problem_body_json_field_names() {
        let body = ProblemResponseBody::from_error(&ConvertError::validation("bad event"));
        let json = String::from_utf8(body.to_json().expect("serialise")).expect("utf-8");
        assert!(json.contains("\"type\""));
        assert!(json.contains("\"title\""));
        assert!(!json.contains("\"instance\""));
    }

    #[test]
    fn test_broken_pipe_detection() {
        let err = ConvertError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"));
        assert!(err.is_broken_pipe());
        assert!(!ConvertError::SchemaVersionMissing.is_broken_pipe());
    }
}
