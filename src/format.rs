//! Media types, schema versions and the conversion request.

use std::fmt;

use crate::error::ConvertError;

/// The two supported wire representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EpcisFormat {
    Xml,
    JsonLd,
}

impl EpcisFormat {
    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Xml => "application/xml",
            Self::JsonLd => "application/ld+json",
        }
    }
}

impl fmt::Display for EpcisFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xml => f.write_str("XML"),
            Self::JsonLd => f.write_str("JSON-LD"),
        }
    }
}

/// The two supported EPCIS schema versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EpcisVersion {
    V1_2,
    V2_0,
}

impl EpcisVersion {
    /// The value carried by the `schemaVersion` attribute/field.
    pub fn schema_version(&self) -> &'static str {
        match self {
            Self::V1_2 => "1.2",
            Self::V2_0 => "2.0",
        }
    }

    pub fn from_schema_version(value: &str) -> Option<Self> {
        match value {
            "1.2" => Some(Self::V1_2),
            "2.0" => Some(Self::V2_0),
            _ => None,
        }
    }
}

impl fmt::Display for EpcisVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.schema_version())
    }
}

/// A conversion request, immutable through the pipeline.
///
/// `from_version` may be left unset, in which case the transformer runs
/// the version detector on the input prefix. The three `include_*` flags
/// and `generate_gs1_compliant_document` gate 2.0-only content when the
/// target is 1.2; they have no effect on 2.0 output.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub from_media_type: EpcisFormat,
    pub from_version: Option<EpcisVersion>,
    pub to_media_type: EpcisFormat,
    pub to_version: EpcisVersion,
    pub generate_gs1_compliant_document: bool,
    pub include_association_event: bool,
    pub include_persistent_disposition: bool,
    pub include_sensor_element_list: bool,
}

impl Conversion {
    /// Shorthand constructor with all flags at their defaults.
    ///
    /// Applies the same validation as [`ConversionBuilder::build`]: a
    /// `(JSON-LD, 1.2)` source pair is rejected.
    pub fn of(
        from_media_type: EpcisFormat,
        from_version: Option<EpcisVersion>,
        to_media_type: EpcisFormat,
        to_version: EpcisVersion,
    ) -> Result<Self, ConvertError> {
        let mut builder = Self::builder()
            .from_media_type(from_media_type)
            .to_media_type(to_media_type)
            .to_version(to_version);
        if let Some(version) = from_version {
            builder = builder.from_version(version);
        }
        builder.build()
    }

    pub fn builder() -> ConversionBuilder {
        ConversionBuilder::default()
    }
}

/// Builder for [`Conversion`].
#[derive(Debug, Clone, Default)]
pub struct ConversionBuilder {
    from_media_type: Option<EpcisFormat>,
    from_version: Option<EpcisVersion>,
    to_media_type: Option<EpcisFormat>,
    to_version: Option<EpcisVersion>,
    generate_gs1_compliant_document: Option<bool>,
    include_association_event: Option<bool>,
    include_persistent_disposition: Option<bool>,
    include_sensor_element_list: Option<bool>,
}

impl ConversionBuilder {
    pub fn from_media_type(mut self, format: EpcisFormat) -> Self {
        self.from_media_type = Some(format);
        self
    }

    pub fn from_version(mut self, version: EpcisVersion) -> Self {
        self.from_version = Some(version);
        self
    }

    pub fn to_media_type(mut self, format: EpcisFormat) -> Self {
        self.to_media_type = Some(format);
        self
    }

    pub fn to_version(mut self, version: EpcisVersion) -> Self {
        self.to_version = Some(version);
        self
    }

    pub fn generate_gs1_compliant_document(mut self, value: bool) -> Self {
        self.generate_gs1_compliant_document = Some(value);
        self
    }

    pub fn include_association_event(mut self, value: bool) -> Self {
        self.include_association_event = Some(value);
        self
    }

    pub fn include_persistent_disposition(mut self, value: bool) -> Self {
        self.include_persistent_disposition = Some(value);
        self
    }

    pub fn include_sensor_element_list(mut self, value: bool) -> Self {
        self.include_sensor_element_list = Some(value);
        self
    }

    pub fn build(self) -> Result<Conversion, ConvertError> {
        let from_media_type = self
            .from_media_type
            .ok_or_else(|| ConvertError::configuration("fromMediaType is required"))?;
        let to_media_type = self
            .to_media_type
            .ok_or_else(|| ConvertError::configuration("toMediaType is required"))?;
        let to_version = self
            .to_version
            .ok_or_else(|| ConvertError::configuration("toVersion is required"))?;

        if from_media_type == EpcisFormat::JsonLd && self.from_version == Some(EpcisVersion::V1_2) {
            return Err(ConvertError::configuration(
                "EPCIS 1.2 has no JSON binding; (JSON-LD, 1.2) is not a valid input pair",
            ));
        }

        Ok(Conversion {
            from_media_type,
            from_version: self.from_version,
            to_media_type,
            to_version,
            generate_gs1_compliant_document: self.generate_gs1_compliant_document.unwrap_or(true),
            include_association_event: self.include_association_event.unwrap_or(true),
            include_persistent_disposition: self.include_persistent_disposition.unwrap_or(true),
            include_sensor_element_list: self.include_sensor_element_list.unwrap_or(true),
        })
    }
}
