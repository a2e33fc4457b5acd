//! Signed response envelope
//!
//! The authority serves each topic as one JSON array whose final element is
//! a signature marker:
//!
//! ```text
//! [ {record}, {record}, ..., {"signature": "<base64>"} ]
//! ```
//!
//! The signature covers the canonical serialization of every element before
//! the marker.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Why a response body could not be split into records and signature.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// Body is not a JSON array of the expected record shape
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Array has no elements at all
    #[error("empty response")]
    Empty,

    /// Final element is not a signature marker
    #[error("missing signature element")]
    MissingSignature,
}

/// An ordered record set plus the signature the authority attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedBatch<R> {
    pub records: Vec<R>,
    pub signature: String,
}

impl<R: DeserializeOwned> SignedBatch<R> {
    /// Split a response body into records and the trailing signature.
    pub fn parse(body: &[u8]) -> Result<Self, EnvelopeError> {
        let mut elements: Vec<Value> =
            serde_json::from_slice(body).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

        let marker = elements.pop().ok_or(EnvelopeError::Empty)?;
        let signature = marker
            .get("signature")
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::MissingSignature)?
            .to_string();

        let records = elements
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<R>, _>>()
            .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

        Ok(Self { records, signature })
    }
}
