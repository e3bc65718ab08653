//! Request signing: canonical serialization, MD5 signature and form encoding.
//!
//! The gateway authenticates a request by recomputing
//! `md5(data + time + app_key)` over the exact `data` string it receives, so
//! the string that is hashed and the string that is sent must be the same
//! bytes. [`SignedRequest`] holds both and is the only thing encoded.
use md5::{Digest, Md5};
use serde::Serialize;
use std::fmt::Write;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to form-encode request: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),
}

/// Serialize `payload` to the canonical form used for signing.
///
/// Compact JSON, fields in declaration order, non-ASCII text emitted as raw
/// UTF-8.
///
/// # Errors
/// Returns [`SigningError::Serialize`] if the payload cannot be represented as JSON.
pub fn canonical_json<T: Serialize + ?Sized>(payload: &T) -> Result<String, SigningError> {
    Ok(serde_json::to_string(payload)?)
}

/// Lowercase hex MD5 of `data ++ timestamp ++ app_key`.
///
/// # Examples
/// ```rust
/// use amego_core::sign::signature;
///
/// let sign = signature("{}", 1597645574, "key");
/// assert_eq!(sign.len(), 32);
/// ```
pub fn signature(data: &str, timestamp: i64, app_key: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(data.as_bytes());
    hasher.update(timestamp.to_string().as_bytes());
    hasher.update(app_key.as_bytes());
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        let _ = write!(&mut hex, "{:02x}", byte);
    }
    hex
}

/// A payload bound to one timestamp and signature.
///
/// Field order is the wire order of the form body: `invoice`, `data`, `time`,
/// `sign`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedRequest {
    #[serde(rename = "invoice")]
    seller_tax_id: String,
    data: String,
    time: i64,
    sign: String,
}

impl SignedRequest {
    /// Canonicalize `payload` and sign it with `timestamp` and `app_key`.
    ///
    /// # Errors
    /// Returns [`SigningError::Serialize`] if the payload cannot be serialized.
    pub fn new<T: Serialize + ?Sized>(
        payload: &T,
        seller_tax_id: &str,
        app_key: &str,
        timestamp: i64,
    ) -> Result<Self, SigningError> {
        let data = canonical_json(payload)?;
        let sign = signature(&data, timestamp, app_key);
        tracing::debug!(
            seller_tax_id,
            timestamp,
            data_len = data.len(),
            "signed request payload"
        );
        Ok(Self {
            seller_tax_id: seller_tax_id.to_string(),
            data,
            time: timestamp,
            sign,
        })
    }

    pub fn seller_tax_id(&self) -> &str {
        &self.seller_tax_id
    }

    /// The canonical JSON that was hashed and will be sent.
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn sign(&self) -> &str {
        &self.sign
    }

    /// Recompute the signature with `app_key` and compare.
    pub fn verify(&self, app_key: &str) -> bool {
        signature(&self.data, self.time, app_key) == self.sign
    }

    /// `application/x-www-form-urlencoded` body with the four request fields.
    ///
    /// # Errors
    /// Returns [`SigningError::FormEncode`] if encoding fails.
    pub fn to_form_body(&self) -> Result<String, SigningError> {
        Ok(serde_urlencoded::to_string(self)?)
    }
}
