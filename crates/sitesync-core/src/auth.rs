//! Request authentication: HMAC signature verification and the manual
//! override credential.
//!
//! Provides:
//! - `Authenticator` -- decides whether a `DeploymentRequest` is legitimate
//! - `compute_signature()` -- produces `<algorithm>=<hex>` header values
//!
//! The override credential takes priority. When it is present it is the only
//! thing checked: a wrong override is an explicit rejection, never a fallback
//! to signature checking. Otherwise the signature header must carry an HMAC
//! of the exact raw body under the shared signing secret.

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use sitesync_types::error::AuthError;
use sitesync_types::request::DeploymentRequest;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// HMAC digest algorithms accepted in the signature header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// `sha1=<hex>`, sent in `X-Hub-Signature`.
    Sha1,
    /// `sha256=<hex>`, sent in `X-Hub-Signature-256`.
    Sha256,
}

impl SignatureAlgorithm {
    pub fn prefix(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha1 => "sha1",
            SignatureAlgorithm::Sha256 => "sha256",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "sha1" => Some(SignatureAlgorithm::Sha1),
            "sha256" => Some(SignatureAlgorithm::Sha256),
            _ => None,
        }
    }
}

/// How an authorized request proved itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// Matched the manual override credential.
    Override,
    /// Carried a valid HMAC signature.
    Signature(SignatureAlgorithm),
}

/// Result of authenticating a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Authorized(AuthMethod),
    Unauthorized(AuthError),
}

// ---------------------------------------------------------------------------
// Authenticator
// ---------------------------------------------------------------------------

/// Verifies deployment requests against the signing secret and override token.
///
/// Both secrets are loaded once at startup and held as `SecretString`, so they
/// never appear in `Debug` output.
#[derive(Debug, Clone)]
pub struct Authenticator {
    signing_secret: SecretString,
    override_token: SecretString,
}

impl Authenticator {
    pub fn new(signing_secret: SecretString, override_token: SecretString) -> Self {
        Self {
            signing_secret,
            override_token,
        }
    }

    /// Authenticate a request. Reads only the configured secrets; no side effects.
    pub fn authenticate(&self, request: &DeploymentRequest) -> AuthResult {
        let verdict = match request.override_credential() {
            Some(provided) => self.verify_override(provided).map(|()| AuthMethod::Override),
            None => self
                .verify_signature(request.body(), request.signature())
                .map(AuthMethod::Signature),
        };

        match verdict {
            Ok(method) => AuthResult::Authorized(method),
            Err(reason) => AuthResult::Unauthorized(reason),
        }
    }

    /// Compare a provided override credential against the configured token.
    ///
    /// Both sides are hashed first so the constant-time comparison runs over
    /// equal-length inputs and does not reveal the token's length. The
    /// provided value is raw header bytes; bytes that are not valid UTF-8
    /// simply fail to match.
    pub fn verify_override(&self, provided: &[u8]) -> Result<(), AuthError> {
        let expected = Sha256::digest(self.override_token.expose_secret().as_bytes());
        let actual = Sha256::digest(provided);
        if constant_time_eq(&expected, &actual) {
            Ok(())
        } else {
            Err(AuthError::BadOverrideCredential)
        }
    }

    /// Verify a `<algorithm>=<hex>` signature header over the raw body.
    pub fn verify_signature(
        &self,
        body: &[u8],
        header: Option<&str>,
    ) -> Result<SignatureAlgorithm, AuthError> {
        let header = header
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(AuthError::MissingSignature)?;

        let (prefix, digest_hex) = header
            .split_once('=')
            .ok_or(AuthError::MalformedSignature)?;
        let algorithm = SignatureAlgorithm::from_prefix(prefix)
            .ok_or_else(|| AuthError::UnsupportedAlgorithm(prefix.to_string()))?;
        let expected = hex_decode(digest_hex).map_err(|()| AuthError::MalformedSignature)?;

        let key = self.signing_secret.expose_secret().as_bytes();
        match algorithm {
            SignatureAlgorithm::Sha1 => verify_mac::<HmacSha1>(key, body, &expected)?,
            SignatureAlgorithm::Sha256 => verify_mac::<HmacSha256>(key, body, &expected)?,
        }
        Ok(algorithm)
    }
}

/// Compute a signature header value for `body`, e.g. `sha256=5bdcc1...`.
pub fn compute_signature(algorithm: SignatureAlgorithm, secret: &[u8], body: &[u8]) -> String {
    let digest = match algorithm {
        SignatureAlgorithm::Sha1 => mac_bytes::<HmacSha1>(secret, body),
        SignatureAlgorithm::Sha256 => mac_bytes::<HmacSha256>(secret, body),
    };
    format!("{}={}", algorithm.prefix(), hex_encode(&digest))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Constant-time verification via the hmac crate's `verify_slice`.
fn verify_mac<M: Mac + KeyInit>(key: &[u8], body: &[u8], expected: &[u8]) -> Result<(), AuthError> {
    let mut mac = <M as Mac>::new_from_slice(key).map_err(|_| AuthError::IncorrectSignature)?;
    mac.update(body);
    mac.verify_slice(expected)
        .map_err(|_| AuthError::IncorrectSignature)
}

fn mac_bytes<M: Mac + KeyInit>(key: &[u8], body: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length.
    let Ok(mut mac) = <M as Mac>::new_from_slice(key) else {
        return Vec::new();
    };
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}

/// Decode a hex string to bytes.
fn hex_decode(hex: &str) -> Result<Vec<u8>, ()> {
    if hex.is_empty() || hex.len() % 2 != 0 {
        return Err(());
    }
    hex.as_bytes()
        .chunks_exact(2)
        .map(|pair| -> Result<u8, ()> { Ok((hex_nibble(pair[0])? << 4) | hex_nibble(pair[1])?) })
        .collect()
}

// `from_str_radix` tolerates a leading sign, so digits are decoded by hand.
fn hex_nibble(c: u8) -> Result<u8, ()> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(()),
    }
}

/// Encode bytes to a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Constant-time byte comparison (XOR-based).
///
/// Time taken is independent of how many bytes match.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
