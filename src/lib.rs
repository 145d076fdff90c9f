//! Streaming converter for EPCIS supply-chain event documents.
//!
//! Converts between the XML wire form (rooted at `epcis:EPCISDocument`)
//! and the JSON-LD wire form, and between schema versions 1.2 and 2.0.
//! A single entry point accepts a byte stream, autodetects its version,
//! and returns a byte stream in the requested `(media type, version)`
//! pair. Documents stream event by event; the event list is never
//! materialised in memory.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────────────────────────────┐
//! │ input bytes │──▶│ version detector (1024-byte prescan, replay) │
//! └─────────────┘   └──────────────────────┬───────────────────────┘
//!                                          ▼
//!                   ┌──────────────────────────────────────────────┐
//!                   │ VersionTransformer: stage graph over pipes   │
//!                   │   rewrite (1.2 ↔ 2.0) ── transcode (XML ↔    │
//!                   │   JSON-LD) ── collect (validate + frame)     │
//!                   └──────────────────────┬───────────────────────┘
//!                                          ▼
//!                               output stream (PipeReader)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use epcis_convert::{Conversion, EpcisFormat, EpcisVersion, VersionTransformer};
//!
//! let transformer = VersionTransformer::new();
//! let conversion = Conversion::builder()
//!     .from_media_type(EpcisFormat::Xml)
//!     .to_media_type(EpcisFormat::JsonLd)
//!     .to_version(EpcisVersion::V2_0)
//!     .build()?;
//! let mut output = transformer.convert(input, &conversion)?;
//! std::io::copy(&mut output, &mut sink)?;
//! ```

pub mod collector;
pub mod detect;
pub mod error;
pub mod event;
pub mod format;
pub mod json;
pub mod pipe;
pub mod rewrite;
pub mod schema;
pub mod transformer;
pub mod xml;

// Re-export commonly needed items
pub use collector::{
    EventCollector, EventHandler, EventValidator, FailurePolicy, JsonEventCollector,
    XmlEventCollector,
};
pub use detect::{detect_version, DetectedVersion};
pub use error::{ConvertError, ProblemResponseBody};
pub use event::{DocumentEnvelope, EpcisEvent, EventKind, EventMapper, Field, FieldValue};
pub use format::{Conversion, EpcisFormat, EpcisVersion};
pub use pipe::PipeReader;
pub use transformer::VersionTransformer;
