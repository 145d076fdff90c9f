//! Conversion orchestrator: resolves a `(from, to)` pair to a graph of
//! streaming stages joined by bounded in-memory pipes.
//!
//! Each producing stage runs on its own worker thread and writes into a
//! pipe; the caller reads the final [`PipeReader`]. Back-pressure comes
//! from the bounded pipe ring. A stage that fails after streaming has
//! begun marshals a [`ProblemResponseBody`] into its output pipe before
//! closing, so the consumer always reads either a valid document or a
//! parseable error document; failures detected before any stage starts
//! propagate synchronously.

use std::io::{Read, Write};
use std::thread;

use tracing::warn;

use crate::collector::{EventHandler, JsonEventCollector, XmlEventCollector};
use crate::detect::{self, DetectedVersion};
use crate::error::{ConvertError, ProblemResponseBody};
use crate::event::EventMapper;
use crate::format::{Conversion, EpcisFormat, EpcisVersion};
use crate::json::JsonDocumentReader;
use crate::pipe::{self, PipeReader, PipeWriter};
use crate::rewrite::{RewriteFlags, XmlVersionRewriter};
use crate::xml::XmlDocumentReader;

type Input = Box<dyn Read + Send>;

/// Converts EPCIS documents between wire representations and schema
/// versions in one streaming pass.
///
/// Construct once per process and share; the transformer holds no
/// per-conversion state.
#[derive(Default, Clone)]
pub struct VersionTransformer {
    mapper: Option<EventMapper>,
}

impl VersionTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transformer whose converters all apply `mapper` to each event.
    pub fn map_with(&self, mapper: EventMapper) -> Self {
        Self {
            mapper: Some(mapper),
        }
    }

    /// Detect the schema version of a document prefix.
    ///
    /// The returned [`DetectedVersion`] carries the consumed bytes for
    /// re-prepending via [`DetectedVersion::replay`].
    pub fn version_detector(
        &self,
        input: &mut impl Read,
    ) -> Result<DetectedVersion, ConvertError> {
        detect::detect_version(input)
    }

    /// Convert `input` per `conversion`, autodetecting the source
    /// version when `from_version` is unset.
    ///
    /// Returns the converted document as a stream. Dropping the stream
    /// cancels the conversion: workers observe a broken pipe on their
    /// next write and terminate.
    pub fn convert(
        &self,
        input: impl Read + Send + 'static,
        conversion: &Conversion,
    ) -> Result<PipeReader, ConvertError> {
        let mut input: Input = Box::new(input);
        let from_version = match conversion.from_version {
            Some(version) => version,
            None => {
                let detected = detect::detect_version(&mut input)?;
                let version = detected.version;
                input = Box::new(detected.replay(input));
                version
            }
        };
        self.perform_conversion(input, conversion, from_version)
    }

    /// Resolve the stage graph for a fully specified conversion and
    /// start it.
    pub fn perform_conversion(
        &self,
        input: Input,
        conversion: &Conversion,
        from_version: EpcisVersion,
    ) -> Result<PipeReader, ConvertError> {
        use EpcisFormat::{JsonLd, Xml};
        use EpcisVersion::{V1_2, V2_0};

        let flags = RewriteFlags::from(conversion);
        match (
            conversion.from_media_type,
            from_version,
            conversion.to_media_type,
            conversion.to_version,
        ) {
            (Xml, V2_0, Xml, V2_0) => Ok(self.xml_pass(input)),
            (Xml, V1_2, Xml, V1_2) => {
                let upgraded = self.rewrite_stage(input, V1_2, V2_0, flags.clone());
                let normalised = self.xml_pass(Box::new(upgraded));
                Ok(self.rewrite_stage(Box::new(normalised), V2_0, V1_2, flags))
            }
            (Xml, V1_2, Xml, V2_0) => Ok(self.rewrite_stage(input, V1_2, V2_0, flags)),
            (Xml, V2_0, Xml, V1_2) => Ok(self.rewrite_stage(input, V2_0, V1_2, flags)),
            (Xml, V2_0, JsonLd, V2_0) => Ok(self.xml_to_json(input)),
            (Xml, V1_2, JsonLd, V2_0) => {
                let upgraded = self.rewrite_stage(input, V1_2, V2_0, flags);
                Ok(self.xml_to_json(Box::new(upgraded)))
            }
            (JsonLd, V2_0, Xml, V2_0) => Ok(self.json_to_xml(input)),
            (JsonLd, V2_0, Xml, V1_2) => {
                let xml = self.json_to_xml(input);
                Ok(self.rewrite_stage(Box::new(xml), V2_0, V1_2, flags))
            }
            (JsonLd, V2_0, JsonLd, V2_0) => Ok(self.json_pass(input)),
            (from_media, from, to_media, to) => Err(ConvertError::UnsupportedConversion(format!(
                "{from_media} {from} to {to_media} {to} has no conversion path"
            ))),
        }
    }

    // ── Stage constructors ───────────────────────────────────────────

    fn xml_pass(&self, input: Input) -> PipeReader {
        let reader = self.xml_reader();
        spawn_stage(EpcisFormat::Xml, move |sink| {
            let mut collector = XmlEventCollector::new(&mut *sink);
            let mut handler = EventHandler::collecting(&mut collector)?;
            reader.read(input, &mut handler)
        })
    }

    fn json_pass(&self, input: Input) -> PipeReader {
        let reader = self.json_reader();
        spawn_stage(EpcisFormat::JsonLd, move |sink| {
            let mut collector = JsonEventCollector::new(&mut *sink);
            let mut handler = EventHandler::collecting(&mut collector)?;
            reader.read(input, &mut handler)
        })
    }

    fn xml_to_json(&self, input: Input) -> PipeReader {
        let reader = self.xml_reader();
        spawn_stage(EpcisFormat::JsonLd, move |sink| {
            let mut collector = JsonEventCollector::new(&mut *sink);
            let mut handler = EventHandler::collecting(&mut collector)?;
            reader.read(input, &mut handler)
        })
    }

    fn json_to_xml(&self, input: Input) -> PipeReader {
        let reader = self.json_reader();
        spawn_stage(EpcisFormat::Xml, move |sink| {
            let mut collector = XmlEventCollector::new(&mut *sink);
            let mut handler = EventHandler::collecting(&mut collector)?;
            reader.read(input, &mut handler)
        })
    }

    fn rewrite_stage(
        &self,
        input: Input,
        from: EpcisVersion,
        to: EpcisVersion,
        flags: RewriteFlags,
    ) -> PipeReader {
        spawn_stage(EpcisFormat::Xml, move |sink| {
            XmlVersionRewriter::new(flags).rewrite(input, &mut *sink, from, to)
        })
    }

    fn xml_reader(&self) -> XmlDocumentReader {
        match self.mapper.clone() {
            Some(mapper) => XmlDocumentReader::with_mapper(mapper),
            None => XmlDocumentReader::new(),
        }
    }

    fn json_reader(&self) -> JsonDocumentReader {
        match self.mapper.clone() {
            Some(mapper) => JsonDocumentReader::with_mapper(mapper),
            None => JsonDocumentReader::new(),
        }
    }
}

/// Run one producing stage on a worker thread. On failure the stage
/// writes a media-type-appropriate problem response into its pipe before
/// closing it.
fn spawn_stage<F>(media: EpcisFormat, run: F) -> PipeReader
where
    F: FnOnce(&mut PipeWriter) -> Result<(), ConvertError> + Send + 'static,
{
    let (mut writer, reader) = pipe::pipe(pipe::DEFAULT_CAPACITY);
    thread::spawn(move || {
        let Err(error) = run(&mut writer) else {
            return;
        };
        if error.is_broken_pipe() {
            // The consumer went away; nothing left to report.
            return;
        }
        warn!(%error, "conversion stage failed, writing problem response");
        let body = ProblemResponseBody::from_error(&error);
        let serialised = match media {
            EpcisFormat::Xml => body.to_xml(),
            EpcisFormat::JsonLd => body.to_json(),
        };
        match serialised {
            Ok(bytes) => {
                if writer.write_all(&bytes).is_err() {
                    warn!("could not write the problem response to the output stream");
                }
            }
            Err(error) => warn!(%error, "could not serialise the problem response"),
        }
    });
    reader
}
