//! Static schema knowledge: canonical field orderings for both schema
//! versions, the 1.2 wrapper policy, and the projection rules shared by
//! the XML and JSON sides of the transcoder.
//!
//! Everything here is data, keyed on element local names. The rewriter
//! and the transcoder consult these tables instead of dragging in an
//! XSLT engine or a generated object model.

use crate::event::EventKind;

/// Namespace and context URIs.
pub mod ns {
    /// EPCIS XML root namespace.
    pub const EPCIS: &str = "urn:epcglobal:epcis:xsd:1";
    /// EPCIS 2.0 JSON-LD context.
    pub const EPCIS_CONTEXT: &str = "https://ref.gs1.org/standards/epcis/epcis-context.jsonld";
    /// Namespace of the XML problem response envelope.
    pub const EPCIS_EXCEPTION: &str = "urn:gs1:epcis:epcisException:xsd:2";
}

/// Fields shared by every event kind, in 2.0 schema order.
static BASE_2_0: [&str; 6] = [
    "eventTime",
    "recordTime",
    "eventTimeZoneOffset",
    "eventID",
    "errorDeclaration",
    "certificationInfo",
];

/// Canonical 2.0 ordering of the known fields of an event type.
///
/// The writers place known fields in this order; unknown (user-defined)
/// fields follow, preserving their relative input order.
pub fn field_order_2_0(kind: EventKind) -> &'static [&'static str] {
    match kind {
        EventKind::Object => &[
            "eventTime",
            "recordTime",
            "eventTimeZoneOffset",
            "eventID",
            "errorDeclaration",
            "certificationInfo",
            "epcList",
            "action",
            "bizStep",
            "disposition",
            "persistentDisposition",
            "readPoint",
            "bizLocation",
            "bizTransactionList",
            "quantityList",
            "sourceList",
            "destinationList",
            "sensorElementList",
            "ilmd",
            "extension",
        ],
        EventKind::Aggregation => &[
            "eventTime",
            "recordTime",
            "eventTimeZoneOffset",
            "eventID",
            "errorDeclaration",
            "certificationInfo",
            "parentID",
            "childEPCs",
            "action",
            "bizStep",
            "disposition",
            "persistentDisposition",
            "readPoint",
            "bizLocation",
            "bizTransactionList",
            "childQuantityList",
            "sourceList",
            "destinationList",
            "sensorElementList",
            "extension",
        ],
        EventKind::Transaction => &[
            "eventTime",
            "recordTime",
            "eventTimeZoneOffset",
            "eventID",
            "errorDeclaration",
            "certificationInfo",
            "bizTransactionList",
            "parentID",
            "epcList",
            "action",
            "bizStep",
            "disposition",
            "persistentDisposition",
            "readPoint",
            "bizLocation",
            "quantityList",
            "sourceList",
            "destinationList",
            "sensorElementList",
            "extension",
        ],
        EventKind::Transformation => &[
            "eventTime",
            "recordTime",
            "eventTimeZoneOffset",
            "eventID",
            "errorDeclaration",
            "certificationInfo",
            "inputEPCList",
            "inputQuantityList",
            "outputEPCList",
            "outputQuantityList",
            "transformationID",
            "bizStep",
            "disposition",
            "persistentDisposition",
            "readPoint",
            "bizLocation",
            "bizTransactionList",
            "sourceList",
            "destinationList",
            "ilmd",
            "sensorElementList",
            "extension",
        ],
        EventKind::Association => &[
            "eventTime",
            "recordTime",
            "eventTimeZoneOffset",
            "eventID",
            "errorDeclaration",
            "certificationInfo",
            "parentID",
            "childEPCs",
            "childQuantityList",
            "action",
            "bizStep",
            "disposition",
            "persistentDisposition",
            "readPoint",
            "bizLocation",
            "bizTransactionList",
            "sourceList",
            "destinationList",
            "sensorElementList",
            "extension",
        ],
    }
}

/// The time trio that opens every 1.2 event, ahead of `baseExtension`.
pub fn base_order_1_2() -> &'static [&'static str] {
    &BASE_2_0[..3]
}

/// 1.2 main sequence of an event type, after the time trio and
/// `baseExtension`.
pub fn main_order_1_2(kind: EventKind) -> &'static [&'static str] {
    match kind {
        EventKind::Object => &[
            "epcList",
            "action",
            "bizStep",
            "disposition",
            "readPoint",
            "bizLocation",
            "bizTransactionList",
        ],
        EventKind::Aggregation => &[
            "parentID",
            "childEPCs",
            "action",
            "bizStep",
            "disposition",
            "readPoint",
            "bizLocation",
            "bizTransactionList",
        ],
        EventKind::Transaction => &[
            "bizTransactionList",
            "parentID",
            "epcList",
            "action",
            "bizStep",
            "disposition",
            "readPoint",
            "bizLocation",
        ],
        EventKind::Transformation => &[
            "inputEPCList",
            "inputQuantityList",
            "outputEPCList",
            "outputQuantityList",
            "transformationID",
            "bizStep",
            "disposition",
            "readPoint",
            "bizLocation",
            "bizTransactionList",
            "sourceList",
            "destinationList",
            "ilmd",
        ],
        // AssociationEvent keeps its 2.0 shape inside the double wrapper.
        EventKind::Association => &[],
    }
}

/// Fields that live under the first-level `<extension>` in 1.2.
pub fn extension_order_1_2(kind: EventKind) -> &'static [&'static str] {
    match kind {
        EventKind::Object => &["quantityList", "sourceList", "destinationList", "ilmd"],
        EventKind::Aggregation => &["childQuantityList", "sourceList", "destinationList"],
        EventKind::Transaction => &["quantityList", "sourceList", "destinationList"],
        EventKind::Transformation | EventKind::Association => &[],
    }
}

/// 2.0-only fields that live under `<extension><extension>` in 1.2.
pub fn inner_extension_order_1_2() -> &'static [&'static str] {
    &["sensorElementList", "persistentDisposition"]
}

/// Fields the 1.2 schema requires even when absent from the source event;
/// the writer emits an explicit empty element for them.
pub fn required_empty_1_2(kind: EventKind) -> &'static [&'static str] {
    match kind {
        EventKind::Object => &["epcList"],
        EventKind::Aggregation => &["parentID", "childEPCs"],
        EventKind::Transaction => &["bizTransactionList", "parentID"],
        EventKind::Transformation | EventKind::Association => &[],
    }
}

/// Lists of plain EPCs; their XML item element is `<epc>` and their JSON
/// form is a string array.
pub fn is_epc_list(name: &str) -> bool {
    matches!(
        name,
        "epcList" | "childEPCs" | "inputEPCList" | "outputEPCList"
    )
}

/// Quantity lists; XML items are `<quantityElement>` and the JSON form is
/// an array of `{epcClass, quantity, uom?}` objects.
pub fn is_quantity_list(name: &str) -> bool {
    matches!(
        name,
        "quantityList" | "childQuantityList" | "inputQuantityList" | "outputQuantityList"
    )
}

/// Typed reference lists: the XML item carries a `type` attribute and a
/// text value; the JSON item is `{type?, <item>}` with the item name as
/// the value key.
pub fn typed_list_item(name: &str) -> Option<&'static str> {
    match name {
        "bizTransactionList" => Some("bizTransaction"),
        "sourceList" => Some("source"),
        "destinationList" => Some("destination"),
        _ => None,
    }
}

/// Location references serialised in JSON as `{id}` objects.
pub fn is_id_object(name: &str) -> bool {
    matches!(name, "readPoint" | "bizLocation")
}

/// Elements whose data is carried entirely in XML attributes and whose
/// JSON form is a flat object of those attributes.
pub fn is_attribute_bag(name: &str) -> bool {
    matches!(name, "sensorMetadata" | "sensorReport")
}

/// JSON keys whose values are numbers on the wire.
pub fn is_numeric_key(name: &str) -> bool {
    matches!(
        name,
        "quantity" | "value" | "minValue" | "maxValue" | "meanValue" | "sDev" | "percRank"
            | "percValue"
    )
}

/// JSON keys whose values are booleans on the wire.
pub fn is_boolean_key(name: &str) -> bool {
    name == "booleanValue"
}
