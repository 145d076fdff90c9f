//! JSON-LD 2.0 to XML conversion.

mod helpers;

use epcis_convert::{Conversion, EpcisFormat, EpcisVersion, VersionTransformer};
use helpers::*;

fn to_xml(to_version: EpcisVersion) -> Conversion {
    Conversion::of(
        EpcisFormat::JsonLd,
        Some(EpcisVersion::V2_0),
        EpcisFormat::Xml,
        to_version,
    )
    .expect("request")
}

#[test]
fn json_2_0_to_xml_2_0() {
    let transformer = VersionTransformer::new();
    let output = convert_to_string(
        &transformer,
        OBJECT_EVENT_JSON_2_0,
        &to_xml(EpcisVersion::V2_0),
    );

    assert!(output.starts_with("<?xml"));
    assert!(output.contains(r#"xmlns:epcis="urn:epcglobal:epcis:xsd:1""#));
    assert!(output.contains(r#"schemaVersion="2.0""#));
    // Namespaces from @context become xmlns declarations on the root.
    assert!(output.contains(r#"xmlns:example="https://example.com/epcis""#));

    assert!(output.contains("<ObjectEvent>"));
    assert!(output.contains("<epc>urn:epc:id:sgtin:0614141.107346.2017</epc>"));
    assert!(output.contains(r#"<bizTransaction type="po">urn:epc:id:gdti:0614141.06012.1234</bizTransaction>"#));
    assert!(output.contains("<quantity>200</quantity>"));
    assert!(output.contains("<example:myField>custom value</example:myField>"));
    assert!(output.trim_end().ends_with("</epcis:EPCISDocument>"));
}

#[test]
fn json_2_0_to_xml_2_0_orders_fields_per_schema() {
    let transformer = VersionTransformer::new();
    let output = convert_to_string(
        &transformer,
        OBJECT_EVENT_JSON_2_0,
        &to_xml(EpcisVersion::V2_0),
    );
    let time = output.find("<eventTime>").expect("eventTime");
    let epcs = output.find("<epcList>").expect("epcList");
    let action = output.find("<action>").expect("action");
    let read_point = output.find("<readPoint>").expect("readPoint");
    let custom = output.find("<example:myField>").expect("user extension");
    assert!(time < epcs && epcs < action && action < read_point && read_point < custom);
}

#[test]
fn json_2_0_to_xml_1_2_applies_wrapper_policy() {
    let transformer = VersionTransformer::new();
    let output = convert_to_string(
        &transformer,
        OBJECT_EVENT_JSON_2_0,
        &to_xml(EpcisVersion::V1_2),
    );

    assert!(output.contains(r#"schemaVersion="1.2""#));
    // quantityList moves under the 1.2 extension wrapper.
    let extension = output.find("<extension>").expect("extension wrapper");
    let quantity = output.find("<quantityList>").expect("quantityList");
    assert!(extension < quantity);
}

#[test]
fn json_document_without_events_still_frames_output() {
    let transformer = VersionTransformer::new();
    let empty = r#"{
        "@context": ["https://ref.gs1.org/standards/epcis/epcis-context.jsonld"],
        "type": "EPCISDocument",
        "schemaVersion": "2.0",
        "creationDate": "2024-03-05T10:00:00.000Z",
        "epcisBody": {"eventList": []}
    }"#;
    let output = convert_to_string(&transformer, empty, &to_xml(EpcisVersion::V2_0));
    assert!(output.contains("<EventList/>") || output.contains("<EventList>"));
    assert!(output.trim_end().ends_with("</epcis:EPCISDocument>"));
}

#[test]
fn malformed_json_yields_problem_response_in_stream() {
    let transformer = VersionTransformer::new();
    let output = convert_to_string(
        &transformer,
        r#"{"type":"EPCISDocument","schemaVersion":"2.0","epcisBody":"#,
        &to_xml(EpcisVersion::V2_0),
    );
    assert!(output.contains("epcisException:ProblemResponseBody"));
}
