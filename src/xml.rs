//! XML side of the event transcoder.
//!
//! The reader stream-parses an EPCIS XML document with a pull parser,
//! builds the envelope from the `epcis:EPCISDocument` element, then
//! drains each `EventList` child into an [`EpcisEvent`] bag and hands it
//! to the [`EventHandler`]. The whole event list is never materialised.
//!
//! The writer emits one event element with known fields in 2.0 schema
//! order, unknown fields after them in input order.

use std::io::{BufRead, BufReader, Read, Write};

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};

use crate::collector::EventHandler;
use crate::error::ConvertError;
use crate::event::{DocumentEnvelope, EpcisEvent, EventKind, EventMapper, Field, FieldValue};
use crate::schema;

// ============================================================================
// DOCUMENT READER
// ============================================================================

/// Streaming reader for EPCIS XML documents.
#[derive(Default)]
pub struct XmlDocumentReader {
    mapper: Option<EventMapper>,
}

impl XmlDocumentReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// A reader that applies `mapper` to each event before the handler.
    pub fn with_mapper(mapper: EventMapper) -> Self {
        Self {
            mapper: Some(mapper),
        }
    }

    /// Parse `input` and drive `handler` with the envelope and each event.
    pub fn read<R: Read>(
        &self,
        input: R,
        handler: &mut EventHandler<'_>,
    ) -> Result<(), ConvertError> {
        let mut reader = Reader::from_reader(BufReader::new(input));
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut saw_document = false;
        let mut in_event_list = false;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    let name = element_name(e)?;
                    match local_name(&name) {
                        "EPCISDocument" if !saw_document => {
                            saw_document = true;
                            let envelope = parse_envelope(e)?;
                            handler.start(&envelope)?;
                        }
                        "EPCISBody" if saw_document => {}
                        "EventList" if saw_document => in_event_list = true,
                        "EPCISHeader" if saw_document => {
                            let mut skip = Vec::new();
                            reader
                                .read_to_end_into(QName(name.as_bytes()), &mut skip)
                                .map_err(|e| parse_error(&reader, e))?;
                        }
                        _ if in_event_list => {
                            let pending = PendingField::from_start(e)?;
                            let field = drain_element(&mut reader, pending)?;
                            self.emit(field, handler)?;
                        }
                        other => {
                            return Err(ConvertError::xml(format!(
                                "unexpected element <{other}> in EPCIS document"
                            )));
                        }
                    }
                }
                Ok(Event::Empty(ref e)) => {
                    let name = element_name(e)?;
                    match local_name(&name) {
                        "EventList" if saw_document => {}
                        _ if in_event_list => {
                            let field = PendingField::from_start(e)?.finish();
                            self.emit(field, handler)?;
                        }
                        _ => {}
                    }
                }
                Ok(Event::End(ref e)) => {
                    let name = std::str::from_utf8(e.name().as_ref())
                        .map_err(|e| ConvertError::xml(format!("invalid tag name: {e}")))?
                        .to_string();
                    if local_name(&name) == "EventList" {
                        in_event_list = false;
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(parse_error(&reader, e)),
            }
            buf.clear();
        }

        if !saw_document {
            return Err(ConvertError::xml(
                "input is not an epcis:EPCISDocument".to_string(),
            ));
        }
        handler.finish()
    }

    fn emit(&self, field: Field, handler: &mut EventHandler<'_>) -> Result<(), ConvertError> {
        let mut event = event_from_field(field)?;
        if let Some(ref mapper) = self.mapper {
            event = mapper(event)?;
        }
        handler.event(&event)
    }
}

/// Build the envelope from the document element's attributes.
pub fn parse_envelope(e: &BytesStart<'_>) -> Result<DocumentEnvelope, ConvertError> {
    let mut envelope = DocumentEnvelope::default();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ConvertError::xml(format!("attribute error: {e}")))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| ConvertError::xml(format!("attribute key error: {e}")))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| ConvertError::xml(format!("attribute value error: {e}")))?
            .to_string();

        if let Some(prefix) = key.strip_prefix("xmlns:") {
            // Infrastructure namespaces are implied by the writers.
            if prefix != "epcis" && prefix != "xsi" {
                envelope.namespaces.insert(prefix, value);
            }
        } else if key == "schemaVersion" {
            envelope.schema_version = value;
        } else if key == "creationDate" {
            envelope.creation_date = Some(value);
        } else if !key.starts_with("xsi:") {
            envelope.attributes.push((key, value));
        }
    }
    Ok(envelope)
}

/// Turn a drained `EventList` child into an event bag.
pub fn event_from_field(field: Field) -> Result<EpcisEvent, ConvertError> {
    let kind = EventKind::from_type_name(local_name(&field.name)).ok_or_else(|| {
        ConvertError::xml(format!("unknown event type <{}> in EventList", field.name))
    })?;
    let fields = match field.value {
        FieldValue::Children(children) => children,
        FieldValue::Text(_) => {
            return Err(ConvertError::xml(format!(
                "event element <{}> has no child fields",
                field.name
            )));
        }
    };
    Ok(EpcisEvent {
        kind,
        attributes: field.attributes,
        fields,
    })
}

/// In-flight element while its subtree is being drained.
pub(crate) struct PendingField {
    name: String,
    attributes: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<Field>,
}

impl PendingField {
    pub(crate) fn from_start(e: &BytesStart<'_>) -> Result<Self, ConvertError> {
        let name = element_name(e)?;
        let mut attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|e| ConvertError::xml(format!("attribute error: {e}")))?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| ConvertError::xml(format!("attribute key error: {e}")))?
                .to_string();
            let value = attr
                .unescape_value()
                .map_err(|e| ConvertError::xml(format!("attribute value error: {e}")))?
                .to_string();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            text: None,
            children: Vec::new(),
        })
    }

    pub(crate) fn finish(self) -> Field {
        let value = if !self.children.is_empty() {
            FieldValue::Children(self.children)
        } else if let Some(text) = self.text {
            FieldValue::Text(text)
        } else {
            FieldValue::Children(Vec::new())
        };
        Field {
            name: self.name,
            attributes: self.attributes,
            value,
        }
    }
}

/// Drain the subtree of an already-consumed `Start` event into a field.
pub(crate) fn drain_element<R: BufRead>(
    reader: &mut Reader<R>,
    root: PendingField,
) -> Result<Field, ConvertError> {
    let mut stack: Vec<PendingField> = vec![root];
    let mut buf = Vec::new();
    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| parse_error(reader, e))?;
        match event {
            Event::Start(ref e) => stack.push(PendingField::from_start(e)?),
            Event::Empty(ref e) => {
                let field = PendingField::from_start(e)?.finish();
                match stack.last_mut() {
                    Some(parent) => parent.children.push(field),
                    None => return Err(unbalanced()),
                }
            }
            Event::Text(ref t) => {
                let text = t
                    .unescape()
                    .map_err(|e| ConvertError::xml(format!("text error: {e}")))?;
                if !text.trim().is_empty() {
                    match stack.last_mut() {
                        Some(top) => top.text.get_or_insert_with(String::new).push_str(&text),
                        None => return Err(unbalanced()),
                    }
                }
            }
            Event::CData(ref t) => {
                let text = std::str::from_utf8(t)
                    .map_err(|e| ConvertError::xml(format!("CDATA error: {e}")))?;
                match stack.last_mut() {
                    Some(top) => top.text.get_or_insert_with(String::new).push_str(text),
                    None => return Err(unbalanced()),
                }
            }
            Event::End(_) => {
                let done = stack.pop().ok_or_else(unbalanced)?.finish();
                match stack.last_mut() {
                    Some(parent) => parent.children.push(done),
                    None => return Ok(done),
                }
            }
            Event::Eof => {
                return Err(ConvertError::xml(
                    "unexpected end of document inside event".to_string(),
                ));
            }
            _ => {}
        }
        buf.clear();
    }
}

fn unbalanced() -> ConvertError {
    ConvertError::xml("unbalanced element nesting".to_string())
}

fn element_name(e: &BytesStart<'_>) -> Result<String, ConvertError> {
    std::str::from_utf8(e.name().as_ref())
        .map(str::to_string)
        .map_err(|e| ConvertError::xml(format!("invalid tag name: {e}")))
}

/// Local part of a possibly prefixed name.
pub(crate) fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn parse_error<R>(reader: &Reader<R>, e: quick_xml::Error) -> ConvertError {
    ConvertError::xml(format!(
        "XML parse error at position {}: {e}",
        reader.error_position()
    ))
}

// ============================================================================
// EVENT WRITER
// ============================================================================

/// Write one event element with known fields in 2.0 schema order.
pub fn write_event<W: Write>(
    writer: &mut Writer<W>,
    event: &EpcisEvent,
) -> Result<(), ConvertError> {
    let mut start = BytesStart::new(event.kind.type_name());
    for (key, value) in &event.attributes {
        if key != "xmlns:epcis" {
            start.push_attribute((key.as_str(), value.as_str()));
        }
    }
    writer
        .write_event(Event::Start(start))
        .map_err(write_error)?;

    let order = schema::field_order_2_0(event.kind);
    for name in order {
        for field in event.fields.iter().filter(|f| f.name == *name) {
            write_field(writer, field)?;
        }
    }
    for field in event.fields.iter().filter(|f| !order.contains(&f.name.as_str())) {
        write_field(writer, field)?;
    }

    writer
        .write_event(Event::End(quick_xml::events::BytesEnd::new(
            event.kind.type_name(),
        )))
        .map_err(write_error)?;
    Ok(())
}

/// Write one field subtree verbatim (attributes and child order kept).
pub fn write_field<W: Write>(writer: &mut Writer<W>, field: &Field) -> Result<(), ConvertError> {
    let mut start = BytesStart::new(field.name.as_str());
    for (key, value) in &field.attributes {
        // The document element owns this declaration.
        if key != "xmlns:epcis" {
            start.push_attribute((key.as_str(), value.as_str()));
        }
    }
    match &field.value {
        FieldValue::Text(text) => {
            writer
                .write_event(Event::Start(start))
                .map_err(write_error)?;
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(write_error)?;
            writer
                .write_event(Event::End(quick_xml::events::BytesEnd::new(
                    field.name.as_str(),
                )))
                .map_err(write_error)?;
        }
        FieldValue::Children(children) if children.is_empty() => {
            writer
                .write_event(Event::Empty(start))
                .map_err(write_error)?;
        }
        FieldValue::Children(children) => {
            writer
                .write_event(Event::Start(start))
                .map_err(write_error)?;
            for child in children {
                write_field(writer, child)?;
            }
            writer
                .write_event(Event::End(quick_xml::events::BytesEnd::new(
                    field.name.as_str(),
                )))
                .map_err(write_error)?;
        }
    }
    Ok(())
}

fn write_error<E: std::fmt::Display>(e: E) -> ConvertError {
    ConvertError::xml(format!("write error: {e}"))
}
