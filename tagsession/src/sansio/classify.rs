//! Mapping from a detected tag to the identity reported with read results.

use super::types::{DetectedTag, MiFareFamily, TagKind};

/// Identifier and family label of a tag.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagIdentity {
    /// Lowercase hex rendering of the identifier bytes.
    pub id: String,
    pub family: String,
}

pub fn family_label(kind: TagKind) -> &'static str {
    match kind {
        TagKind::MiFare(MiFareFamily::Desfire) => "MiFare Desfire",
        TagKind::MiFare(MiFareFamily::Plus) => "MiFare Plus",
        TagKind::MiFare(MiFareFamily::Ultralight) => "MiFare Ultralight",
        _ => "unknown",
    }
}

pub fn classify(tag: &DetectedTag) -> TagIdentity {
    TagIdentity {
        id: hex::encode(&tag.identifier),
        family: family_label(tag.kind).to_string(),
    }
}
