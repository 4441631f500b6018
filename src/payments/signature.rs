//! Webhook signature verification
//!
//! Two schemes are supported:
//!
//! - **Static credential**: the provider sends `client-id` / `client-secret`
//!   headers which must equal the configured pair.
//! - **Signed digest**: the provider signs the canonical string
//!   `METHOD:PATH:lowerhex(SHA-256(minified body)):TIMESTAMP`, either with RSA
//!   (SHA-256, PKCS#1 v1.5) when a public key is configured, or with
//!   HMAC-SHA-512 over the shared secret otherwise. Signatures are base64.

use crate::payments::types::Provider;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use serde_json::Value;
use sha2::{Digest, Sha256, Sha512};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("request body is not valid JSON: {0}")]
    InvalidBody(#[from] serde_json::Error),
    #[error("invalid RSA public key: {0}")]
    InvalidPublicKey(String),
}

/// Authentication-relevant headers of an inbound callback
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackHeaders {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub timestamp: Option<String>,
    pub signature: Option<String>,
}

/// Request elements covered by a signed digest
#[derive(Debug, Clone, Copy)]
pub struct SignedRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub body: &'a [u8],
    pub timestamp: &'a str,
    pub signature: &'a str,
}

/// Client id / secret pair compared against request headers
#[derive(Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl StaticCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn verify(&self, client_id: &str, client_secret: &str) -> bool {
        // Evaluate both comparisons so timing does not reveal which one failed
        let id_ok = constant_time_eq(self.client_id.as_bytes(), client_id.as_bytes());
        let secret_ok = constant_time_eq(self.client_secret.as_bytes(), client_secret.as_bytes());
        id_ok & secret_ok
    }
}

/// Shared secret and optional RSA public key for signed digests
#[derive(Clone)]
pub struct DigestCredentials {
    client_secret: String,
    public_key: Option<RsaPublicKey>,
}

impl fmt::Debug for DigestCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestCredentials")
            .field("client_secret", &"<redacted>")
            .field("asymmetric", &self.public_key.is_some())
            .finish()
    }
}

impl DigestCredentials {
    /// Symmetric-only credentials (HMAC-SHA-512)
    pub fn symmetric(client_secret: impl Into<String>) -> Self {
        Self {
            client_secret: client_secret.into(),
            public_key: None,
        }
    }

    pub fn with_public_key(client_secret: impl Into<String>, public_key: RsaPublicKey) -> Self {
        Self {
            client_secret: client_secret.into(),
            public_key: Some(public_key),
        }
    }

    /// Build credentials from a PEM public key (SPKI or PKCS#1)
    pub fn from_pem(client_secret: impl Into<String>, pem: &str) -> Result<Self, SignatureError> {
        let public_key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|e| SignatureError::InvalidPublicKey(e.to_string()))?;
        Ok(Self::with_public_key(client_secret, public_key))
    }

    pub fn is_asymmetric(&self) -> bool {
        self.public_key.is_some()
    }

    /// Verify a signed digest; the RSA key takes precedence when configured
    pub fn verify(&self, request: &SignedRequest<'_>) -> bool {
        let canonical = match canonical_string(
            request.method,
            request.path,
            request.body,
            request.timestamp,
        ) {
            Ok(canonical) => canonical,
            Err(e) => {
                debug!("Cannot build canonical string: {}", e);
                return false;
            }
        };

        match &self.public_key {
            Some(key) => verify_rsa(key, &canonical, request.signature),
            None => {
                let expected = sign_symmetric(&self.client_secret, &canonical);
                constant_time_eq(expected.as_bytes(), request.signature.trim().as_bytes())
            }
        }
    }
}

/// Credentials configured for one provider; the variant selects the scheme
#[derive(Debug, Clone)]
pub enum ProviderCredentials {
    Static(StaticCredentials),
    Digest(DigestCredentials),
}

/// Result of authenticating an inbound callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authentication {
    Verified,
    /// The route accepts unsigned callbacks
    Unsigned,
    Rejected { reason: &'static str },
}

impl Authentication {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Authentication::Rejected { .. })
    }
}

/// Verifies callbacks against credentials fixed at startup
#[derive(Debug, Clone, Default)]
pub struct SignatureVerifier {
    credentials: HashMap<Provider, ProviderCredentials>,
}

impl SignatureVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(mut self, provider: Provider, credentials: ProviderCredentials) -> Self {
        self.credentials.insert(provider, credentials);
        self
    }

    /// Authenticate a callback for `provider`
    ///
    /// `require_signature == false` accepts the request as [`Authentication::Unsigned`]
    /// without inspecting headers.
    pub fn authenticate(
        &self,
        provider: Provider,
        require_signature: bool,
        headers: &CallbackHeaders,
        method: &str,
        path: &str,
        body: &[u8],
    ) -> Authentication {
        if !require_signature {
            return Authentication::Unsigned;
        }

        match self.credentials.get(&provider) {
            None => Authentication::Rejected {
                reason: "no credentials configured",
            },
            Some(ProviderCredentials::Static(credentials)) => {
                let client_id = headers.client_id.as_deref().unwrap_or_default();
                let client_secret = headers.client_secret.as_deref().unwrap_or_default();
                if credentials.verify(client_id, client_secret) {
                    Authentication::Verified
                } else {
                    Authentication::Rejected {
                        reason: "client credentials mismatch",
                    }
                }
            }
            Some(ProviderCredentials::Digest(credentials)) => {
                let (Some(timestamp), Some(signature)) =
                    (headers.timestamp.as_deref(), headers.signature.as_deref())
                else {
                    return Authentication::Rejected {
                        reason: "missing signature headers",
                    };
                };

                let request = SignedRequest {
                    method,
                    path,
                    body,
                    timestamp,
                    signature,
                };
                if credentials.verify(&request) {
                    Authentication::Verified
                } else {
                    Authentication::Rejected {
                        reason: "signature mismatch",
                    }
                }
            }
        }
    }
}

/// Re-serialize a JSON body the way Go's `encoding/json` marshals a decoded
/// `interface{}`, which is what callback signers hash
///
/// - no insignificant whitespace, object keys in byte order
/// - every number is a float64 in shortest form, so `100000.00` becomes
///   `100000`; magnitudes outside `[1e-6, 1e21)` use exponent form (`1e+21`)
/// - `<`, `>`, `&`, U+2028 and U+2029 inside strings become `\uXXXX`
pub fn minify_body(body: &[u8]) -> Result<Vec<u8>, SignatureError> {
    let value: Value = serde_json::from_slice(body)?;
    let mut out = String::with_capacity(body.len());
    write_marshaled(&value, &mut out)?;
    Ok(out.into_bytes())
}

fn write_marshaled(value: &Value, out: &mut String) -> Result<(), SignatureError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(flag) => out.push_str(if *flag { "true" } else { "false" }),
        Value::Number(number) => out.push_str(&marshal_number(number)),
        Value::String(text) => out.push_str(&marshal_string(text)?),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_marshaled(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&marshal_string(key)?);
                out.push(':');
                write_marshaled(item, out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn marshal_number(number: &serde_json::Number) -> String {
    let Some(float) = number.as_f64() else {
        return number.to_string();
    };
    let abs = float.abs();
    if abs != 0.0 && !(1e-6..1e21).contains(&abs) {
        let formatted = format!("{:e}", float);
        return match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{}e+{}", mantissa, exponent)
            }
            _ => formatted,
        };
    }
    float.to_string()
}

fn marshal_string(text: &str) -> Result<String, SignatureError> {
    let quoted = serde_json::to_string(text)?;
    if !quoted.contains(['<', '>', '&', '\u{2028}', '\u{2029}']) {
        return Ok(quoted);
    }
    let mut escaped = String::with_capacity(quoted.len() + 16);
    for c in quoted.chars() {
        match c {
            '<' => escaped.push_str("\\u003c"),
            '>' => escaped.push_str("\\u003e"),
            '&' => escaped.push_str("\\u0026"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            c => escaped.push(c),
        }
    }
    Ok(escaped)
}

/// `METHOD:PATH:lowerhex(SHA-256(minified body)):TIMESTAMP`
pub fn canonical_string(
    method: &str,
    path: &str,
    body: &[u8],
    timestamp: &str,
) -> Result<String, SignatureError> {
    let body_hash = hex::encode(Sha256::digest(minify_body(body)?));
    Ok(format!("{}:{}:{}:{}", method, path, body_hash, timestamp))
}

/// Base64 HMAC-SHA-512 of the canonical string
pub fn sign_symmetric(secret: &str, canonical: &str) -> String {
    let mut mac =
        HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(canonical.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

fn verify_rsa(public_key: &RsaPublicKey, canonical: &str, signature: &str) -> bool {
    let Ok(signature) = BASE64.decode(signature.trim()) else {
        return false;
    };
    let hashed = Sha256::digest(canonical.as_bytes());
    public_key
        .verify(Pkcs1v15Sign::new::<Sha256>(), &hashed, &signature)
        .is_ok()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}
