//! Shared fixtures and comparison helpers for the conversion suites.

#![allow(dead_code)]

use std::io::Read;

use epcis_convert::{Conversion, VersionTransformer};
use serde_json::Value;

/// EPCIS 2.0 XML document with one `ObjectEvent` carrying every field
/// family the transcoder projects, in canonical schema order.
pub const OBJECT_EVENT_ALL_FIELDS_XML_2_0: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<epcis:EPCISDocument xmlns:epcis="urn:epcglobal:epcis:xsd:1" xmlns:cbvmda="urn:epcglobal:cbv:mda" xmlns:example="https://example.com/epcis" schemaVersion="2.0" creationDate="2024-03-05T10:00:00.000Z">
  <EPCISBody>
    <EventList>
      <ObjectEvent>
        <eventTime>2024-03-05T09:00:00.000Z</eventTime>
        <recordTime>2024-03-05T09:00:01.000Z</recordTime>
        <eventTimeZoneOffset>+01:00</eventTimeZoneOffset>
        <eventID>ni:///sha-256;df7bb3c352fef055578554f09f5e2aa41782150ced7bd0b8af24dd3ccb30ba69?ver=CBV2.0</eventID>
        <errorDeclaration>
          <declarationTime>2024-03-06T10:00:00.000Z</declarationTime>
          <reason>incorrect_data</reason>
          <correctiveEventIDs>
            <correctiveEventID>urn:uuid:404d95fc-9457-4a51-bd6a-0bba133845a8</correctiveEventID>
          </correctiveEventIDs>
        </errorDeclaration>
        <epcList>
          <epc>urn:epc:id:sgtin:0614141.107346.2017</epc>
          <epc>urn:epc:id:sgtin:0614141.107346.2018</epc>
        </epcList>
        <action>OBSERVE</action>
        <bizStep>shipping</bizStep>
        <disposition>in_transit</disposition>
        <persistentDisposition>
          <set>completeness_verified</set>
          <unset>completeness_inferred</unset>
        </persistentDisposition>
        <readPoint>
          <id>urn:epc:id:sgln:0614141.07346.1234</id>
        </readPoint>
        <bizLocation>
          <id>urn:epc:id:sgln:0614141.00888.0</id>
        </bizLocation>
        <bizTransactionList>
          <bizTransaction type="po">urn:epc:id:gdti:0614141.06012.1234</bizTransaction>
        </bizTransactionList>
        <quantityList>
          <quantityElement>
            <epcClass>urn:epc:class:lgtin:4012345.012345.998877</epcClass>
            <quantity>200</quantity>
            <uom>KGM</uom>
          </quantityElement>
        </quantityList>
        <sourceList>
          <source type="owning_party">urn:epc:id:pgln:4012345.00225</source>
        </sourceList>
        <destinationList>
          <destination type="owning_party">urn:epc:id:pgln:0614141.00777</destination>
        </destinationList>
        <sensorElementList>
          <sensorElement>
            <sensorMetadata time="2024-03-05T09:00:00.000Z" deviceID="urn:epc:id:giai:4000001.111"/>
            <sensorReport type="Temperature" value="26.0" uom="CEL"/>
            <sensorReport type="Humidity" value="12.1" uom="A93"/>
          </sensorElement>
        </sensorElementList>
        <ilmd>
          <cbvmda:lotNumber>LOT123</cbvmda:lotNumber>
        </ilmd>
        <example:myField>custom value</example:myField>
      </ObjectEvent>
    </EventList>
  </EPCISBody>
</epcis:EPCISDocument>"#;

/// 2.0 document mixing all five event kinds, in input order.
pub const COMBINATION_OF_EVENTS_XML_2_0: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<epcis:EPCISDocument xmlns:epcis="urn:epcglobal:epcis:xsd:1" schemaVersion="2.0" creationDate="2024-03-05T10:00:00.000Z">
  <EPCISBody>
    <EventList>
      <ObjectEvent>
        <eventTime>2024-03-05T09:00:00.000Z</eventTime>
        <eventTimeZoneOffset>+01:00</eventTimeZoneOffset>
        <epcList>
          <epc>urn:epc:id:sgtin:0614141.107346.2017</epc>
        </epcList>
        <action>OBSERVE</action>
      </ObjectEvent>
      <AggregationEvent>
        <eventTime>2024-03-05T09:10:00.000Z</eventTime>
        <eventTimeZoneOffset>+01:00</eventTimeZoneOffset>
        <parentID>urn:epc:id:sscc:0614141.1234567890</parentID>
        <childEPCs>
          <epc>urn:epc:id:sgtin:0614141.107346.2018</epc>
        </childEPCs>
        <action>ADD</action>
      </AggregationEvent>
      <TransactionEvent>
        <eventTime>2024-03-05T09:20:00.000Z</eventTime>
        <eventTimeZoneOffset>+01:00</eventTimeZoneOffset>
        <bizTransactionList>
          <bizTransaction type="po">urn:epc:id:gdti:0614141.06012.1234</bizTransaction>
        </bizTransactionList>
        <epcList>
          <epc>urn:epc:id:sgtin:0614141.107346.2019</epc>
        </epcList>
        <action>ADD</action>
      </TransactionEvent>
      <TransformationEvent>
        <eventTime>2024-03-05T09:30:00.000Z</eventTime>
        <eventTimeZoneOffset>+01:00</eventTimeZoneOffset>
        <inputEPCList>
          <epc>urn:epc:id:sgtin:4012345.011122.25</epc>
        </inputEPCList>
        <outputEPCList>
          <epc>urn:epc:id:sgtin:4012345.077889.25</epc>
        </outputEPCList>
        <transformationID>urn:epc:id:gdti:0614141.12345.400</transformationID>
      </TransformationEvent>
      <AssociationEvent>
        <eventTime>2024-03-05T09:40:00.000Z</eventTime>
        <eventTimeZoneOffset>+01:00</eventTimeZoneOffset>
        <parentID>urn:epc:id:grai:4012345.55555.987</parentID>
        <childEPCs>
          <epc>urn:epc:id:giai:4000001.12345</epc>
        </childEPCs>
        <action>ADD</action>
      </AssociationEvent>
    </EventList>
  </EPCISBody>
</epcis:EPCISDocument>"#;

/// EPCIS 1.2 document whose `ObjectEvent` carries `eventID` and
/// `errorDeclaration` under `baseExtension`, in canonical 1.2 shape.
pub const OBJECT_EVENT_BASE_EXTENSION_XML_1_2: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<epcis:EPCISDocument xmlns:epcis="urn:epcglobal:epcis:xsd:1" schemaVersion="1.2" creationDate="2024-03-05T10:00:00.000Z">
  <EPCISBody>
    <EventList>
      <ObjectEvent>
        <eventTime>2024-03-05T09:00:00.000Z</eventTime>
        <eventTimeZoneOffset>+01:00</eventTimeZoneOffset>
        <baseExtension>
          <eventID>ni:///sha-256;df7bb3c352fef055578554f09f5e2aa41782150ced7bd0b8af24dd3ccb30ba69?ver=CBV2.0</eventID>
          <errorDeclaration>
            <declarationTime>2024-03-06T10:00:00.000Z</declarationTime>
            <reason>incorrect_data</reason>
          </errorDeclaration>
        </baseExtension>
        <epcList>
          <epc>urn:epc:id:sgtin:0614141.107346.2017</epc>
        </epcList>
        <action>OBSERVE</action>
        <bizStep>shipping</bizStep>
        <extension>
          <quantityList>
            <quantityElement>
              <epcClass>urn:epc:class:lgtin:4012345.012345.998877</epcClass>
              <quantity>200</quantity>
            </quantityElement>
          </quantityList>
          <extension>
            <persistentDisposition>
              <set>completeness_verified</set>
            </persistentDisposition>
          </extension>
        </extension>
      </ObjectEvent>
    </EventList>
  </EPCISBody>
</epcis:EPCISDocument>"#;

/// EPCIS 2.0 JSON-LD document matching the collector's envelope shape.
pub const OBJECT_EVENT_JSON_2_0: &str = r#"{
    "@context": [
        "https://ref.gs1.org/standards/epcis/epcis-context.jsonld",
        {"example": "https://example.com/epcis"}
    ],
    "type": "EPCISDocument",
    "schemaVersion": "2.0",
    "creationDate": "2024-03-05T10:00:00.000Z",
    "epcisBody": {
        "eventList": [
            {
                "type": "ObjectEvent",
                "eventTime": "2024-03-05T09:00:00.000Z",
                "eventTimeZoneOffset": "+01:00",
                "epcList": ["urn:epc:id:sgtin:0614141.107346.2017"],
                "action": "OBSERVE",
                "bizStep": "shipping",
                "readPoint": {"id": "urn:epc:id:sgln:0614141.07346.1234"},
                "bizTransactionList": [
                    {"type": "po", "bizTransaction": "urn:epc:id:gdti:0614141.06012.1234"}
                ],
                "quantityList": [
                    {"epcClass": "urn:epc:class:lgtin:4012345.012345.998877", "quantity": 200, "uom": "KGM"}
                ],
                "example:myField": "custom value"
            }
        ]
    }
}"#;

/// Drain a conversion's output stream into a string.
pub fn convert_to_string(
    transformer: &VersionTransformer,
    input: &str,
    conversion: &Conversion,
) -> String {
    let mut reader = transformer
        .convert(owned_reader(input), conversion)
        .expect("conversion must start");
    let mut output = String::new();
    reader.read_to_string(&mut output).expect("readable output");
    output
}

fn owned_reader(input: &str) -> std::io::Cursor<Vec<u8>> {
    std::io::Cursor::new(input.as_bytes().to_vec())
}

/// Whitespace-insensitive XML comparison form: every line trimmed and
/// joined. Fixtures keep each tag on its own line, so indentation is the
/// only thing this erases.
pub fn normalize_xml(xml: &str) -> String {
    xml.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("")
}

/// Parse JSON output for structural comparison.
pub fn json_value(text: &str) -> Value {
    serde_json::from_str(text).expect("well-formed JSON output")
}

/// The events of a parsed JSON document.
pub fn event_list(document: &Value) -> &Vec<Value> {
    document["epcisBody"]["eventList"]
        .as_array()
        .expect("eventList array")
}
