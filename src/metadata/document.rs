//! Structured metadata documents and the parse/filter collaborators.
//!
//! The reloading provider only needs a document's validity hints; parsing,
//! filtering and structural validation are pluggable. [`SamlMetadataParser`]
//! is the default parser for SAML 2.0 `EntityDescriptor` and
//! `EntitiesDescriptor` documents.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use samael::metadata::{EntityDescriptor, EntityDescriptorType};
use std::time::Duration;
use tracing::debug;

use super::duration::parse_xs_duration;
use super::error::MetadataError;

/// Freshness hints declared by one element of a metadata document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidityHint {
    /// `cacheDuration`: how long the element may be cached.
    pub cache_duration: Option<Duration>,
    /// `validUntil`: instant after which the element must not be used.
    pub valid_until: Option<DateTime<Utc>>,
}

impl ValidityHint {
    pub fn is_empty(&self) -> bool {
        self.cache_duration.is_none() && self.valid_until.is_none()
    }
}

/// A parsed metadata document.
pub trait MetadataDocument: Send + Sync + 'static {
    /// Hints declared on the root element.
    fn root_validity_hint(&self) -> ValidityHint;

    /// Hints of the root and of every descendant that declares its own.
    fn validity_hints(&self) -> Vec<ValidityHint>;
}

/// Turns decoded bytes into a structured document.
pub trait MetadataParser: Send + Sync + 'static {
    type Document: MetadataDocument;

    fn parse(&self, bytes: &[u8]) -> Result<Self::Document, MetadataError>;
}

/// Post-parse filter or validator, applied before expiry is computed.
pub trait MetadataFilter<D>: Send + Sync {
    fn name(&self) -> &str;

    /// Inspect or prune the document. An error rejects the whole document.
    fn apply(&self, document: &mut D) -> Result<(), MetadataError>;
}

/// Rejects documents whose root declares neither `cacheDuration` nor `validUntil`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireValidityHints;

impl<D: MetadataDocument> MetadataFilter<D> for RequireValidityHints {
    fn name(&self) -> &str {
        "require-validity-hints"
    }

    fn apply(&self, document: &mut D) -> Result<(), MetadataError> {
        if document.root_validity_hint().is_empty() {
            return Err(MetadataError::Invalid(
                "root element must declare cacheDuration or validUntil".to_string(),
            ));
        }
        Ok(())
    }
}

/// SAML 2.0 metadata: a single entity or an aggregate of entities.
#[derive(Debug, Clone)]
pub struct SamlMetadata {
    descriptor: EntityDescriptorType,
    root_hint: ValidityHint,
    hints: Vec<ValidityHint>,
}

impl SamlMetadata {
    pub fn descriptor(&self) -> &EntityDescriptorType {
        &self.descriptor
    }

    /// Whether the root is an `EntitiesDescriptor`.
    pub fn is_aggregate(&self) -> bool {
        matches!(self.descriptor, EntityDescriptorType::EntitiesDescriptor(_))
    }

    /// `entityID` of a single-entity document.
    pub fn entity_id(&self) -> Option<&str> {
        match self.descriptor {
            EntityDescriptorType::EntityDescriptor(ref entity) => entity.entity_id.as_deref(),
            EntityDescriptorType::EntitiesDescriptor(_) => None,
        }
    }

    /// `Name` of an aggregate document.
    pub fn name(&self) -> Option<&str> {
        match self.descriptor {
            EntityDescriptorType::EntitiesDescriptor(ref entities) => entities.name.as_deref(),
            EntityDescriptorType::EntityDescriptor(_) => None,
        }
    }

    /// Every entity in the document, nested aggregates included.
    pub fn entities(&self) -> impl Iterator<Item = &EntityDescriptor> + '_ {
        self.descriptor.iter()
    }

    pub fn entity(&self, entity_id: &str) -> Option<&EntityDescriptor> {
        self.entities()
            .find(|entity| entity.entity_id.as_deref() == Some(entity_id))
    }
}

impl MetadataDocument for SamlMetadata {
    fn root_validity_hint(&self) -> ValidityHint {
        self.root_hint
    }

    fn validity_hints(&self) -> Vec<ValidityHint> {
        self.hints.clone()
    }
}

/// Parses UTF-8 SAML metadata with samael.
///
/// Validity hints are read straight from the XML attributes of every element,
/// so role descriptors may carry a full `xs:duration` `cacheDuration`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SamlMetadataParser;

impl MetadataParser for SamlMetadataParser {
    type Document = SamlMetadata;

    fn parse(&self, bytes: &[u8]) -> Result<SamlMetadata, MetadataError> {
        let xml = std::str::from_utf8(bytes)
            .map_err(|e| MetadataError::Invalid(format!("metadata is not valid UTF-8: {}", e)))?;

        let scanned = scan_validity_hints(xml)?;

        let descriptor: EntityDescriptorType = scanned
            .typed_xml
            .parse()
            .map_err(|e| MetadataError::Invalid(format!("failed to parse metadata: {}", e)))?;

        let document = SamlMetadata {
            descriptor,
            root_hint: scanned.root_hint,
            hints: scanned.hints,
        };

        debug!(
            entity_id = ?document.entity_id(),
            name = ?document.name(),
            entities = document.entities().count(),
            hints = document.hints.len(),
            "Parsed SAML metadata"
        );

        Ok(document)
    }
}

struct ScannedMetadata {
    /// The document with role-level `cacheDuration` removed, for samael.
    typed_xml: String,
    root_hint: ValidityHint,
    hints: Vec<ValidityHint>,
}

fn malformed(e: impl std::fmt::Display) -> MetadataError {
    MetadataError::Invalid(format!("malformed metadata XML: {}", e))
}

/// Collect the validity hints of every element in document order.
///
/// samael types `cacheDuration` as an integer below the entity level, so the
/// attribute is dropped from those elements in the copy handed to it.
fn scan_validity_hints(xml: &str) -> Result<ScannedMetadata, MetadataError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut root_hint = None;
    let mut hints = Vec::new();

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                return Err(MetadataError::Invalid(format!(
                    "malformed metadata XML at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        };

        let event = match event {
            Event::Eof => break,
            Event::Start(start) => Event::Start(visit_element(start, &mut root_hint, &mut hints)?),
            Event::Empty(start) => Event::Empty(visit_element(start, &mut root_hint, &mut hints)?),
            other => other,
        };

        writer.write_event(event).map_err(malformed)?;
    }

    let root_hint = root_hint.ok_or_else(|| {
        MetadataError::Invalid("metadata document has no root element".to_string())
    })?;
    let typed_xml = String::from_utf8(writer.into_inner()).map_err(malformed)?;

    Ok(ScannedMetadata {
        typed_xml,
        root_hint,
        hints,
    })
}

fn visit_element<'a>(
    start: BytesStart<'a>,
    root_hint: &mut Option<ValidityHint>,
    hints: &mut Vec<ValidityHint>,
) -> Result<BytesStart<'a>, MetadataError> {
    let entity_level = matches!(
        start.local_name().as_ref(),
        b"EntityDescriptor" | b"EntitiesDescriptor"
    );

    let mut hint = ValidityHint::default();
    for attr in start.attributes() {
        let attr = attr.map_err(malformed)?;
        match attr.key.local_name().as_ref() {
            b"cacheDuration" => {
                let value = attr.unescape_value().map_err(malformed)?;
                let duration = parse_xs_duration(&value)
                    .map_err(|e| MetadataError::Invalid(format!("invalid cacheDuration: {}", e)))?;
                hint.cache_duration = Some(duration);
            }
            b"validUntil" => {
                let value = attr.unescape_value().map_err(malformed)?;
                let valid_until = DateTime::parse_from_rfc3339(value.trim()).map_err(|e| {
                    MetadataError::Invalid(format!("invalid validUntil '{}': {}", value, e))
                })?;
                hint.valid_until = Some(valid_until.with_timezone(&Utc));
            }
            _ => {}
        }
    }

    if root_hint.is_none() {
        *root_hint = Some(hint);
    }
    if !hint.is_empty() {
        hints.push(hint);
    }

    if entity_level || hint.cache_duration.is_none() {
        return Ok(start);
    }

    let mut stripped = start.to_owned();
    stripped.clear_attributes();
    for attr in start.attributes() {
        let attr = attr.map_err(malformed)?;
        if attr.key.local_name().as_ref() != b"cacheDuration" {
            stripped.push_attribute(attr);
        }
    }
    Ok(stripped)
}
