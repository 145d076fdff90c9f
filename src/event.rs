//! The logical document and event model shared by both wire representations.
//!
//! The converter does not own a full EPCIS object model. Each event is an
//! ordered bag of named fields, where a field carries its attributes and
//! either text content or child fields. This preserves user-defined
//! content without prior schema knowledge and keeps the per-event memory
//! footprint proportional to the event itself, not the document.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::ConvertError;

/// The five EPCIS event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Object,
    Aggregation,
    Transformation,
    Transaction,
    Association,
}

impl EventKind {
    /// Resolve an event kind from the XML element name / JSON `type` value.
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "ObjectEvent" => Some(Self::Object),
            "AggregationEvent" => Some(Self::Aggregation),
            "TransformationEvent" => Some(Self::Transformation),
            "TransactionEvent" => Some(Self::Transaction),
            "AssociationEvent" => Some(Self::Association),
            _ => None,
        }
    }

    /// The XML element name, which is also the JSON-LD `type` value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Object => "ObjectEvent",
            Self::Aggregation => "AggregationEvent",
            Self::Transformation => "TransformationEvent",
            Self::Transaction => "TransactionEvent",
            Self::Association => "AssociationEvent",
        }
    }
}

/// Content of a [`Field`]: either character data or nested fields.
///
/// An element with neither (`<epcList/>`) is `Children(vec![])`, which the
/// XML writer renders as a self-closing tag.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Children(Vec<Field>),
}

impl FieldValue {
    /// Borrow the text content, if this is a text field.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Children(_) => None,
        }
    }

    /// Borrow the child fields, if any.
    pub fn children(&self) -> &[Field] {
        match self {
            Self::Text(_) => &[],
            Self::Children(c) => c,
        }
    }
}

/// One named field of an event (or a nested child of one).
///
/// `name` is the qualified name as it appeared on the wire, e.g.
/// `eventTime` or `example:myField`. Attribute order is preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub value: FieldValue,
}

impl Field {
    /// A field with child content.
    pub fn new(name: impl Into<String>, children: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            value: FieldValue::Children(children),
        }
    }

    /// A field with text content.
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            value: FieldValue::Text(text.into()),
        }
    }

    /// An explicitly empty field (`<name/>`).
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Value of an attribute by key.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First child with the given name.
    pub fn child(&self, name: &str) -> Option<&Field> {
        self.value.children().iter().find(|f| f.name == name)
    }

    /// Text of the first child with the given name.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(|f| f.value.as_text())
    }
}

/// One EPCIS event: a kind plus an ordered bag of fields.
///
/// Field order is the input order; the writers impose the target schema's
/// sequence when serialising, so the bag never needs re-sorting.
#[derive(Debug, Clone, PartialEq)]
pub struct EpcisEvent {
    pub kind: EventKind,
    pub attributes: Vec<(String, String)>,
    pub fields: Vec<Field>,
}

impl EpcisEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            attributes: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// First field with the given name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Remove and return the first field with the given name.
    pub fn take_field(&mut self, name: &str) -> Option<Field> {
        let idx = self.fields.iter().position(|f| f.name == name)?;
        Some(self.fields.remove(idx))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}

/// Hook applied to each fully parsed event before it is written.
///
/// Must be pure with respect to other events; the transcoder writes
/// whatever the hook returns.
pub type EventMapper = Arc<dyn Fn(EpcisEvent) -> Result<EpcisEvent, ConvertError> + Send + Sync>;

/// Prefix → URI bindings collected from the document envelope.
///
/// Insertion order is document order; the map is frozen once the envelope
/// has been written and events may reference only prefixes present in it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamespaceMap {
    entries: IndexMap<String, String>,
}

impl NamespaceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.entries.insert(prefix.into(), uri.into());
    }

    pub fn uri(&self, prefix: &str) -> Option<&str> {
        self.entries.get(prefix).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Everything the writers need from the document envelope.
///
/// Built by the parser side before the first event is emitted; immutable
/// for the rest of the pipeline.
#[derive(Debug, Clone, Default)]
pub struct DocumentEnvelope {
    /// Declared schema version, e.g. `"2.0"`.
    pub schema_version: String,
    pub creation_date: Option<String>,
    /// Foreign namespaces (the EPCIS namespace itself is implied).
    pub namespaces: NamespaceMap,
    /// Remaining root attributes, preserved verbatim for XML output.
    pub attributes: Vec<(String, String)>,
}
