//! Pure payload encoding and decoding.
//!
//! The functions in this module never touch the reader. Checking the encoded
//! length against the tag capacity is left to the caller.

use crate::model::TagModel;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encoding error: {0}")]
    Encode(serde_json::Error),
    #[error("decoding error: {0}")]
    Decode(serde_json::Error),
}

/// Serialize a model into the bytes stored in the tag's payload record.
///
/// # Example
///
/// ```
/// use tagsession::TagModel;
/// use tagsession::sansio::codec::{decode, encode};
///
/// let model = TagModel::new("rmr").with_records(["techno"]);
/// let bytes = encode(&model).unwrap();
/// assert_eq!(decode(&bytes).unwrap().records, vec!["techno".to_string()]);
/// ```
pub fn encode(model: &TagModel) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(model).map_err(CodecError::Encode)
}

/// Rebuild a model from a payload record.
pub fn decode(payload: &[u8]) -> Result<TagModel, CodecError> {
    serde_json::from_slice(payload).map_err(CodecError::Decode)
}
