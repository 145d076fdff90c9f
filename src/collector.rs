//! Write-side sink: the event handler, the framed document collectors
//! and the validator capability.
//!
//! The handler is the single sink between a document reader and the
//! output. It writes the envelope prologue once, on the first event,
//! feeds each event to the optional validator, then to the collector,
//! and writes the epilogue at end of stream. A handler without a
//! collector runs validation only.

use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::ConvertError;
use crate::event::{DocumentEnvelope, EpcisEvent};
use crate::{json, schema, xml};

/// Validation capability injected by the caller.
///
/// Concrete implementations (XSD for XML output, JSON Schema for JSON
/// output) live outside this crate; implementations must be shareable
/// across events.
pub trait EventValidator: Send + Sync {
    fn validate(&self, event: &EpcisEvent) -> Result<(), ConvertError>;
}

/// What to do when the validator rejects an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Surface the validation error and abort the conversion.
    #[default]
    Abort,
    /// Drop the event and continue with the rest of the stream.
    Skip,
}

/// A framed document writer: prologue, one call per event, epilogue.
pub trait EventCollector {
    fn start(&mut self, envelope: &DocumentEnvelope) -> Result<(), ConvertError>;
    fn collect(&mut self, event: &EpcisEvent) -> Result<(), ConvertError>;
    fn finish(&mut self) -> Result<(), ConvertError>;
}

/// The single write-side sink driven by the document readers.
pub struct EventHandler<'a> {
    validator: Option<&'a dyn EventValidator>,
    collector: Option<&'a mut dyn EventCollector>,
    policy: FailurePolicy,
    envelope: Option<DocumentEnvelope>,
    prologue_written: bool,
}

impl<'a> EventHandler<'a> {
    /// At least one of `validator` and `collector` must be present.
    pub fn new(
        validator: Option<&'a dyn EventValidator>,
        collector: Option<&'a mut dyn EventCollector>,
    ) -> Result<Self, ConvertError> {
        if validator.is_none() && collector.is_none() {
            return Err(ConvertError::configuration(
                "event handler requires a validator or a collector",
            ));
        }
        Ok(Self {
            validator,
            collector,
            policy: FailurePolicy::default(),
            envelope: None,
            prologue_written: false,
        })
    }

    /// Handler that only writes, without validation.
    pub fn collecting(collector: &'a mut dyn EventCollector) -> Result<Self, ConvertError> {
        Self::new(None, Some(collector))
    }

    /// Validation-only handler with no output sink.
    pub fn validating(validator: &'a dyn EventValidator) -> Result<Self, ConvertError> {
        Self::new(Some(validator), None)
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Record the document envelope. The prologue itself is deferred to
    /// the first event so that pre-event failures stay out of the output.
    pub fn start(&mut self, envelope: &DocumentEnvelope) -> Result<(), ConvertError> {
        if self.prologue_written {
            return Err(ConvertError::configuration(
                "document envelope already written",
            ));
        }
        self.envelope = Some(envelope.clone());
        Ok(())
    }

    pub fn event(&mut self, event: &EpcisEvent) -> Result<(), ConvertError> {
        self.ensure_prologue()?;
        if let Some(validator) = self.validator {
            if let Err(error) = validator.validate(event) {
                match self.policy {
                    FailurePolicy::Abort => return Err(error),
                    FailurePolicy::Skip => {
                        warn!(kind = event.kind.type_name(), %error, "skipping invalid event");
                        return Ok(());
                    }
                }
            }
        }
        if let Some(collector) = self.collector.as_deref_mut() {
            collector.collect(event)?;
        }
        Ok(())
    }

    pub fn finish(&mut self) -> Result<(), ConvertError> {
        self.ensure_prologue()?;
        if let Some(collector) = self.collector.as_deref_mut() {
            collector.finish()?;
        }
        Ok(())
    }

    fn ensure_prologue(&mut self) -> Result<(), ConvertError> {
        if self.prologue_written {
            return Ok(());
        }
        let envelope = self.envelope.as_ref().ok_or_else(|| {
            ConvertError::configuration("no document envelope before first event")
        })?;
        if let Some(collector) = self.collector.as_deref_mut() {
            collector.start(envelope)?;
        }
        self.prologue_written = true;
        Ok(())
    }
}

// ============================================================================
// XML COLLECTOR
// ============================================================================

/// Writes an EPCIS 2.0 XML document around the event stream.
pub struct XmlEventCollector<W: Write> {
    writer: Writer<W>,
}

impl<W: Write> XmlEventCollector<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: Writer::new_with_indent(sink, b' ', 2),
        }
    }
}

impl<W: Write> EventCollector for XmlEventCollector<W> {
    fn start(&mut self, envelope: &DocumentEnvelope) -> Result<(), ConvertError> {
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(write_error)?;

        let mut root = BytesStart::new("epcis:EPCISDocument");
        root.push_attribute(("xmlns:epcis", schema::ns::EPCIS));
        for (prefix, uri) in envelope.namespaces.iter() {
            root.push_attribute((format!("xmlns:{prefix}").as_str(), uri));
        }
        root.push_attribute(("schemaVersion", envelope.schema_version.as_str()));
        if let Some(ref creation_date) = envelope.creation_date {
            root.push_attribute(("creationDate", creation_date.as_str()));
        }
        for (key, value) in &envelope.attributes {
            root.push_attribute((key.as_str(), value.as_str()));
        }
        self.writer
            .write_event(Event::Start(root))
            .map_err(write_error)?;
        self.writer
            .write_event(Event::Start(BytesStart::new("EPCISBody")))
            .map_err(write_error)?;
        self.writer
            .write_event(Event::Start(BytesStart::new("EventList")))
            .map_err(write_error)?;
        Ok(())
    }

    fn collect(&mut self, event: &EpcisEvent) -> Result<(), ConvertError> {
        xml::write_event(&mut self.writer, event)
    }

    fn finish(&mut self) -> Result<(), ConvertError> {
        self.writer
            .write_event(Event::End(BytesEnd::new("EventList")))
            .map_err(write_error)?;
        self.writer
            .write_event(Event::End(BytesEnd::new("EPCISBody")))
            .map_err(write_error)?;
        self.writer
            .write_event(Event::End(BytesEnd::new("epcis:EPCISDocument")))
            .map_err(write_error)?;
        self.writer.get_mut().flush()?;
        Ok(())
    }
}

fn write_error<E: std::fmt::Display>(e: E) -> ConvertError {
    ConvertError::xml(format!("write error: {e}"))
}

// ============================================================================
// JSON COLLECTOR
// ============================================================================

/// Writes an EPCIS 2.0 JSON-LD document around the event stream.
pub struct JsonEventCollector<W: Write> {
    sink: W,
    events_written: usize,
}

impl<W: Write> JsonEventCollector<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            events_written: 0,
        }
    }
}

impl<W: Write> EventCollector for JsonEventCollector<W> {
    fn start(&mut self, envelope: &DocumentEnvelope) -> Result<(), ConvertError> {
        let mut context = vec![json!(schema::ns::EPCIS_CONTEXT)];
        for (prefix, uri) in envelope.namespaces.iter() {
            context.push(json!({ prefix: uri }));
        }

        self.sink.write_all(b"{\"@context\":")?;
        self.sink.write_all(&to_bytes(&Value::Array(context))?)?;
        self.sink.write_all(b",\"type\":\"EPCISDocument\"")?;
        self.sink.write_all(b",\"schemaVersion\":")?;
        self.sink
            .write_all(&to_bytes(&json!(envelope.schema_version))?)?;
        if let Some(ref creation_date) = envelope.creation_date {
            self.sink.write_all(b",\"creationDate\":")?;
            self.sink.write_all(&to_bytes(&json!(creation_date))?)?;
        }
        self.sink.write_all(b",\"epcisBody\":{\"eventList\":[")?;
        Ok(())
    }

    fn collect(&mut self, event: &EpcisEvent) -> Result<(), ConvertError> {
        if self.events_written > 0 {
            self.sink.write_all(b",")?;
        }
        self.sink.write_all(b"\n")?;
        self.sink.write_all(&to_bytes(&json::event_to_value(event))?)?;
        self.events_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ConvertError> {
        if self.events_written > 0 {
            self.sink.write_all(b"\n")?;
        }
        self.sink.write_all(b"]}}")?;
        self.sink.flush()?;
        Ok(())
    }
}

fn to_bytes(value: &serde_json::Value) -> Result<Vec<u8>, ConvertError> {
    serde_json::to_vec(value).map_err(|e| ConvertError::json(e.to_string()))
}
