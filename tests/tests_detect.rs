//! Version detection over document prefixes.

use std::io::Read;

use epcis_convert::{detect_version, ConvertError, EpcisVersion, VersionTransformer};
use rstest::rstest;

#[rstest]
#[case::xml_2_0(r#"<epcis:EPCISDocument schemaVersion="2.0">"#, EpcisVersion::V2_0)]
#[case::xml_1_2(r#"<epcis:EPCISDocument schemaVersion="1.2">"#, EpcisVersion::V1_2)]
#[case::xml_single_quotes("<epcis:EPCISDocument schemaVersion='1.2'>", EpcisVersion::V1_2)]
#[case::json_2_0(r#"{"type":"EPCISDocument","schemaVersion":"2.0"}"#, EpcisVersion::V2_0)]
#[case::json_spaced(r#"{ "schemaVersion" : "2.0" }"#, EpcisVersion::V2_0)]
fn detects_version_from_prefix(#[case] prefix: &str, #[case] expected: EpcisVersion) {
    let detected = detect_version(&mut prefix.as_bytes()).expect("detected");
    assert_eq!(detected.version, expected);
}

#[test]
fn unsupported_version_is_rejected() {
    let doc = r#"<epcis:EPCISDocument schemaVersion="9.9">"#;
    let result = detect_version(&mut doc.as_bytes());
    assert!(matches!(result, Err(ConvertError::UnsupportedVersion(_))));
}

#[test]
fn empty_stream_reports_missing_version() {
    let result = detect_version(&mut std::io::empty());
    assert!(matches!(result, Err(ConvertError::SchemaVersionMissing)));
}

#[test]
fn document_without_marker_reports_missing_version() {
    let doc = r#"<epcis:EPCISDocument creationDate="2024-03-05T10:00:00.000Z">"#;
    let result = detect_version(&mut doc.as_bytes());
    assert!(matches!(result, Err(ConvertError::SchemaVersionMissing)));
}

#[test]
fn replay_reconstitutes_the_stream_without_double_reading() {
    let mut document = format!(
        r#"<epcis:EPCISDocument schemaVersion="2.0">{}"#,
        "x".repeat(4096)
    )
    .into_bytes();
    document.extend_from_slice(b"</epcis:EPCISDocument>");

    let mut stream = document.as_slice();
    let detected = detect_version(&mut stream).expect("detected");

    let mut replayed = Vec::new();
    detected
        .replay(stream)
        .read_to_end(&mut replayed)
        .expect("read");
    assert_eq!(replayed, document);
}

#[test]
fn transformer_exposes_the_detector() {
    let transformer = VersionTransformer::new();
    let doc = r#"{"schemaVersion":"2.0"}"#;
    let detected = transformer
        .version_detector(&mut doc.as_bytes())
        .expect("detected");
    assert_eq!(detected.version, EpcisVersion::V2_0);
    assert_eq!(detected.prefix, doc.as_bytes());
}
