//! Signature verification for authority-signed record sets
//!
//! The authority signs the canonical serialization of a record set with
//! RSA PKCS#1 v1.5 over SHA-256. Verification here reproduces that
//! serialization byte for byte and checks the signature against a fixed
//! public key.
//!
//! ## Canonical form
//!
//! ```text
//! [{"flightNumber":"VY1234","originFull":"Barcelona",...},{...}]
//! ```
//!
//! A compact JSON array, one object per record, keys in declared struct
//! order, no inserted whitespace, UTF-8 encoded.
//!
//! Verification failure is data, not a fault: every malformed input
//! (bad key, bad base64, wrong length, mismatched digest) yields `false`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{AirlinkError, AirlinkResult};

/// Base64 X.509 SubjectPublicKeyInfo of the signing authority.
pub const AUTHORITY_PUBLIC_KEY: &str = concat!(
    "MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAxTXj2e0YQMcttm/zGb7l",
    "g2FjxSWZLoH0oBGUzROzl3pf3MaTo+jznszz7FK/y3gSyUlkc3drQ60MoHyKd3jd",
    "7DdYujsYmvHWF5IYxjyTa5r+W0b3FTXorKROyR7cp7qM98z5ANq+whmMfQduQgGP",
    "ZDE0HrURv42MSckilD7KWH3G7b0nXOFVMSVfiPt9sjf4gnV5LLDoMHz/Dl3AtSPE",
    "CaEO3tKu/lpH6ZBUjp8htKnsEY+bqWGzL3A9qyCVqvu63m3pyTy9ywMpawwT0GCZ",
    "JBradUbwGC60hex1aeMyx56aHeKact7bU5WXMBju7EPOnq3zkg0yJJQXMnnrPzxB",
    "NwIDAQAB"
);

/// Produce the exact byte string the authority signs for `records`.
pub fn canonicalize<R: Serialize>(records: &[R]) -> AirlinkResult<Vec<u8>> {
    Ok(serde_json::to_vec(records)?)
}

/// Decode base64 the way the authority emits it, tolerating line breaks.
fn decode_base64(input: &str) -> Option<Vec<u8>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).ok()
}

/// Decode a base64 SPKI public key.
pub fn decode_public_key(public_key_b64: &str) -> AirlinkResult<RsaPublicKey> {
    let der = decode_base64(public_key_b64)
        .ok_or_else(|| AirlinkError::Key("public key is not valid base64".to_string()))?;
    RsaPublicKey::from_public_key_der(&der).map_err(|e| AirlinkError::Key(e.to_string()))
}

/// Stateless check of `records` against a base64 signature and base64 key.
///
/// Never fails: any malformed input is reported as `false`.
pub fn verify<R: Serialize>(records: &[R], signature_b64: &str, public_key_b64: &str) -> bool {
    match decode_public_key(public_key_b64) {
        Ok(key) => verify_with_key(records, signature_b64, &VerifyingKey::<Sha256>::new(key)),
        Err(e) => {
            warn!(error = %e, "Rejecting signature: unusable public key");
            false
        }
    }
}

fn verify_with_key<R: Serialize>(
    records: &[R],
    signature_b64: &str,
    key: &VerifyingKey<Sha256>,
) -> bool {
    let message = match canonicalize(records) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Rejecting signature: records failed to canonicalize");
            return false;
        }
    };

    let Some(signature_bytes) = decode_base64(signature_b64) else {
        debug!("Rejecting signature: not valid base64");
        return false;
    };

    let signature = match Signature::try_from(signature_bytes.as_slice()) {
        Ok(sig) => sig,
        Err(e) => {
            debug!(error = %e, "Rejecting signature: malformed");
            return false;
        }
    };

    let valid = key.verify(&message, &signature).is_ok();
    debug!(
        valid,
        records = records.len(),
        digest = %hex::encode(&Sha256::digest(&message)[..8]),
        "Signature checked"
    );
    valid
}

/// Verifier bound to one authority key, parsed once.
///
/// A key that fails to parse is kept as "no key": every verification then
/// returns `false` and the sync layer falls back to local data.
#[derive(Clone)]
pub struct SignatureVerifier {
    key: Option<VerifyingKey<Sha256>>,
    fingerprint: Option<String>,
}

impl SignatureVerifier {
    /// Build a verifier from base64 SPKI key material.
    pub fn new(public_key_b64: &str) -> Self {
        match decode_public_key(public_key_b64) {
            Ok(key) => {
                let fingerprint = key_fingerprint(public_key_b64);
                Self {
                    key: Some(VerifyingKey::<Sha256>::new(key)),
                    fingerprint,
                }
            }
            Err(e) => {
                warn!(error = %e, "Authority key unusable; all signatures will be rejected");
                Self {
                    key: None,
                    fingerprint: None,
                }
            }
        }
    }

    /// Verifier for the embedded authority key
    pub fn authority() -> Self {
        Self::new(AUTHORITY_PUBLIC_KEY)
    }

    /// Whether a usable key was loaded
    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// Short hex SHA-256 fingerprint of the key DER, for display
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// Check `records` against `signature_b64`.
    pub fn verify<R: Serialize>(&self, records: &[R], signature_b64: &str) -> bool {
        match &self.key {
            Some(key) => verify_with_key(records, signature_b64, key),
            None => false,
        }
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

fn key_fingerprint(public_key_b64: &str) -> Option<String> {
    let der = decode_base64(public_key_b64)?;
    Some(hex::encode(&Sha256::digest(&der)[..8]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FlightRecord, NewsItem};
    use rsa::pkcs1v15::SigningKey;
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::signature::{SignatureEncoding, Signer};
    use rsa::RsaPrivateKey;

    const TEST_KEY_PEM: &str = include_str!("../tests/fixtures/authority_test_key.pem");
    const TEST_PUBLIC_KEY: &str = include_str!("../tests/fixtures/authority_test_key.pub.b64");

    fn sign<R: Serialize>(records: &[R]) -> String {
        let private_key = RsaPrivateKey::from_pkcs8_pem(TEST_KEY_PEM).unwrap();
        let signing_key = SigningKey::<Sha256>::new(private_key);
        let message = canonicalize(records).unwrap();
        STANDARD.encode(signing_key.sign(&message).to_bytes())
    }

    fn flight(number: &str, status: &str) -> FlightRecord {
        FlightRecord {
            flight_number: number.to_string(),
            origin_full: "Barcelona".to_string(),
            origin_short: "BCN".to_string(),
            departure_time: "10:30".to_string(),
            destination_full: "Madrid".to_string(),
            destination_short: "MAD".to_string(),
            landing_time: "11:45".to_string(),
            status: status.to_string(),
            date: "2025-05-10".to_string(),
        }
    }

    #[test]
    fn test_embedded_authority_key_parses() {
        let verifier = SignatureVerifier::authority();
        assert!(verifier.has_key());
        assert!(verifier.fingerprint().is_some());
    }

    #[test]
    fn test_canonical_form_is_compact() {
        let bytes = canonicalize(&[flight("VY1234", "Delayed")]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with(r#"[{"flightNumber":"VY1234","originFull":"Barcelona""#));
        assert!(!text.contains(": "));
        assert!(!text.contains(", "));
    }

    #[test]
    fn test_sign_then_verify() {
        let records = vec![flight("VY1234", "Delayed"), flight("VY2000", "On Time")];
        let signature = sign(&records);

        let verifier = SignatureVerifier::new(TEST_PUBLIC_KEY);
        assert!(verifier.verify(&records, &signature));
        assert!(verify(&records, &signature, TEST_PUBLIC_KEY));
    }

    #[test]
    fn test_reordered_records_fail() {
        let records = vec![flight("VY1234", "Delayed"), flight("VY2000", "On Time")];
        let signature = sign(&records);

        let reordered = vec![records[1].clone(), records[0].clone()];
        assert!(!verify(&reordered, &signature, TEST_PUBLIC_KEY));
    }

    #[test]
    fn test_tampered_field_fails() {
        let records = vec![flight("VY1234", "Delayed")];
        let signature = sign(&records);

        let tampered = vec![flight("VY1234", "On Time")];
        assert!(!verify(&tampered, &signature, TEST_PUBLIC_KEY));
    }

    #[test]
    fn test_wrong_key_fails() {
        let records = vec![flight("VY1234", "Delayed")];
        let signature = sign(&records);

        let verifier = SignatureVerifier::authority();
        assert!(!verifier.verify(&records, &signature));
    }

    #[test]
    fn test_malformed_inputs_return_false() {
        let records = vec![flight("VY1234", "Delayed")];
        let signature = sign(&records);

        assert!(!verify(&records, "%%% not base64 %%%", TEST_PUBLIC_KEY));
        assert!(!verify(&records, "", TEST_PUBLIC_KEY));
        assert!(!verify(&records, "AAAA", TEST_PUBLIC_KEY));
        assert!(!verify(&records, &signature, "not a key"));
        assert!(!verify(&records, &signature, "AAAA"));
    }

    #[test]
    fn test_unusable_key_rejects_everything() {
        let verifier = SignatureVerifier::new("garbage");
        assert!(!verifier.has_key());

        let records = vec![flight("VY1234", "Delayed")];
        assert!(!verifier.verify(&records, &sign(&records)));
    }

    #[test]
    fn test_signature_with_line_breaks_accepted() {
        let records = vec![NewsItem {
            id: "n1".to_string(),
            flight_number: "VY1234".to_string(),
            title: "Gate change".to_string(),
            content: "Boarding at B12".to_string(),
            date: "2025-05-10".to_string(),
        }];
        let signature = sign(&records);
        let wrapped: String = signature
            .as_bytes()
            .chunks(76)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join("\n");

        assert!(verify(&records, &wrapped, TEST_PUBLIC_KEY));
    }
}
