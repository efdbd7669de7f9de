//! # Key Material
//!
//! Immutable EC key pairs on the three curves OCPP message signing uses, and
//! signing identities that add per-message signer metadata on top of them.
//!
//! ## Invariants
//!
//! - A `KeyMaterial` always holds a valid public point; when it also holds a
//!   private scalar, that scalar generates the point. Violations fail
//!   construction, never later use.
//! - The key id is the DER-encoded `SubjectPublicKeyInfo` of the public key,
//!   computed once at construction.

use crate::domain::ecdsa;
use crate::domain::errors::SignaturePolicyError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePublicKey, EncodePublicKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use zeroize::Zeroize;

// =============================================================================
// CURVES
// =============================================================================

/// Named curve of a key pair, also used as the signature algorithm name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningCurve {
    #[serde(rename = "secp256r1")]
    Secp256r1,
    #[serde(rename = "secp384r1")]
    Secp384r1,
    #[serde(rename = "secp521r1")]
    Secp521r1,
}

impl SigningCurve {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningCurve::Secp256r1 => "secp256r1",
            SigningCurve::Secp384r1 => "secp384r1",
            SigningCurve::Secp521r1 => "secp521r1",
        }
    }

    /// Hash `data` with the digest paired with this curve.
    #[must_use]
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        ecdsa::digest(*self, data)
    }
}

impl fmt::Display for SigningCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigningCurve {
    type Err = SignaturePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "secp256r1" | "p-256" | "prime256v1" => Ok(SigningCurve::Secp256r1),
            "secp384r1" | "p-384" => Ok(SigningCurve::Secp384r1),
            "secp521r1" | "p-521" => Ok(SigningCurve::Secp521r1),
            _ => Err(SignaturePolicyError::UnknownCurve(s.to_string())),
        }
    }
}

// =============================================================================
// KEY MATERIAL
// =============================================================================

#[derive(Clone)]
enum CurveKeys {
    P256 {
        secret: Option<p256::SecretKey>,
        public: p256::PublicKey,
    },
    P384 {
        secret: Option<p384::SecretKey>,
        public: p384::PublicKey,
    },
    P521 {
        secret: Option<p521::SecretKey>,
        public: p521::PublicKey,
    },
}

/// An immutable EC key pair, or a verification-only public key.
#[derive(Clone)]
pub struct KeyMaterial {
    keys: CurveKeys,
    key_id: Vec<u8>,
}

impl KeyMaterial {
    /// Generate a fresh random key pair on `curve`.
    pub fn generate(curve: SigningCurve) -> Result<Self, SignaturePolicyError> {
        let keys = match curve {
            SigningCurve::Secp256r1 => {
                let secret = p256::SecretKey::random(&mut OsRng);
                CurveKeys::P256 {
                    public: secret.public_key(),
                    secret: Some(secret),
                }
            }
            SigningCurve::Secp384r1 => {
                let secret = p384::SecretKey::random(&mut OsRng);
                CurveKeys::P384 {
                    public: secret.public_key(),
                    secret: Some(secret),
                }
            }
            SigningCurve::Secp521r1 => {
                let secret = p521::SecretKey::random(&mut OsRng);
                CurveKeys::P521 {
                    public: secret.public_key(),
                    secret: Some(secret),
                }
            }
        };
        Self::from_keys(keys)
    }

    /// Build key material from a raw private scalar and an encoded public key.
    ///
    /// The public key may be SEC1 (compressed or uncompressed) or DER
    /// `SubjectPublicKeyInfo`. Without a private key the result can only verify.
    pub fn from_bytes(
        curve: SigningCurve,
        private_key: Option<&[u8]>,
        public_key: &[u8],
    ) -> Result<Self, SignaturePolicyError> {
        let keys = match curve {
            SigningCurve::Secp256r1 => {
                let public = p256::PublicKey::from_sec1_bytes(public_key)
                    .or_else(|_| p256::PublicKey::from_public_key_der(public_key))
                    .map_err(|e| invalid("public key", e))?;
                let secret = private_key
                    .map(p256::SecretKey::from_slice)
                    .transpose()
                    .map_err(|e| invalid("private key", e))?;
                if secret.as_ref().is_some_and(|s| s.public_key() != public) {
                    return Err(SignaturePolicyError::KeyMismatch);
                }
                CurveKeys::P256 { secret, public }
            }
            SigningCurve::Secp384r1 => {
                let public = p384::PublicKey::from_sec1_bytes(public_key)
                    .or_else(|_| p384::PublicKey::from_public_key_der(public_key))
                    .map_err(|e| invalid("public key", e))?;
                let secret = private_key
                    .map(p384::SecretKey::from_slice)
                    .transpose()
                    .map_err(|e| invalid("private key", e))?;
                if secret.as_ref().is_some_and(|s| s.public_key() != public) {
                    return Err(SignaturePolicyError::KeyMismatch);
                }
                CurveKeys::P384 { secret, public }
            }
            SigningCurve::Secp521r1 => {
                let public = p521::PublicKey::from_sec1_bytes(public_key)
                    .or_else(|_| p521::PublicKey::from_public_key_der(public_key))
                    .map_err(|e| invalid("public key", e))?;
                let secret = private_key
                    .map(p521::SecretKey::from_slice)
                    .transpose()
                    .map_err(|e| invalid("private key", e))?;
                if secret.as_ref().is_some_and(|s| s.public_key() != public) {
                    return Err(SignaturePolicyError::KeyMismatch);
                }
                CurveKeys::P521 { secret, public }
            }
        };
        Self::from_keys(keys)
    }

    /// Build a key pair from its private scalar alone; the public point is derived.
    pub fn from_private_key(
        curve: SigningCurve,
        private_key: &[u8],
    ) -> Result<Self, SignaturePolicyError> {
        let keys = match curve {
            SigningCurve::Secp256r1 => {
                let secret =
                    p256::SecretKey::from_slice(private_key).map_err(|e| invalid("private key", e))?;
                CurveKeys::P256 {
                    public: secret.public_key(),
                    secret: Some(secret),
                }
            }
            SigningCurve::Secp384r1 => {
                let secret =
                    p384::SecretKey::from_slice(private_key).map_err(|e| invalid("private key", e))?;
                CurveKeys::P384 {
                    public: secret.public_key(),
                    secret: Some(secret),
                }
            }
            SigningCurve::Secp521r1 => {
                let secret =
                    p521::SecretKey::from_slice(private_key).map_err(|e| invalid("private key", e))?;
                CurveKeys::P521 {
                    public: secret.public_key(),
                    secret: Some(secret),
                }
            }
        };
        Self::from_keys(keys)
    }

    /// A verification-only key.
    pub fn public_only(curve: SigningCurve, public_key: &[u8]) -> Result<Self, SignaturePolicyError> {
        Self::from_bytes(curve, None, public_key)
    }

    /// Derive key material from stored base64 fields.
    pub fn from_base64(
        curve: SigningCurve,
        private_key: Option<&str>,
        public_key: &str,
    ) -> Result<Self, SignaturePolicyError> {
        let public = STANDARD
            .decode(public_key.trim())
            .map_err(|e| invalid("public key base64", e))?;
        let mut private = private_key
            .map(|encoded| STANDARD.decode(encoded.trim()))
            .transpose()
            .map_err(|e| invalid("private key base64", e))?;

        let result = Self::from_bytes(curve, private.as_deref(), &public);
        if let Some(bytes) = private.as_mut() {
            bytes.zeroize();
        }
        result
    }

    fn from_keys(keys: CurveKeys) -> Result<Self, SignaturePolicyError> {
        let der = match &keys {
            CurveKeys::P256 { public, .. } => public.to_public_key_der(),
            CurveKeys::P384 { public, .. } => public.to_public_key_der(),
            CurveKeys::P521 { public, .. } => public.to_public_key_der(),
        }
        .map_err(|e| invalid("DER encoding", e))?;

        Ok(Self {
            keys,
            key_id: der.as_bytes().to_vec(),
        })
    }

    #[must_use]
    pub fn curve(&self) -> SigningCurve {
        match self.keys {
            CurveKeys::P256 { .. } => SigningCurve::Secp256r1,
            CurveKeys::P384 { .. } => SigningCurve::Secp384r1,
            CurveKeys::P521 { .. } => SigningCurve::Secp521r1,
        }
    }

    /// DER-encoded public key, used as the key id of produced signatures.
    #[must_use]
    pub fn key_id(&self) -> &[u8] {
        &self.key_id
    }

    #[must_use]
    pub fn key_id_base64(&self) -> String {
        STANDARD.encode(&self.key_id)
    }

    #[must_use]
    pub fn has_private_key(&self) -> bool {
        match &self.keys {
            CurveKeys::P256 { secret, .. } => secret.is_some(),
            CurveKeys::P384 { secret, .. } => secret.is_some(),
            CurveKeys::P521 { secret, .. } => secret.is_some(),
        }
    }

    /// Uncompressed SEC1 encoding of the public key.
    #[must_use]
    pub fn public_key_sec1(&self) -> Vec<u8> {
        match &self.keys {
            CurveKeys::P256 { public, .. } => public.to_encoded_point(false).as_bytes().to_vec(),
            CurveKeys::P384 { public, .. } => public.to_encoded_point(false).as_bytes().to_vec(),
            CurveKeys::P521 { public, .. } => public.to_encoded_point(false).as_bytes().to_vec(),
        }
    }

    #[must_use]
    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.public_key_sec1())
    }

    /// Base64 of the raw private scalar, for writing configuration back out.
    #[must_use]
    pub fn private_key_base64(&self) -> Option<String> {
        let mut bytes = match &self.keys {
            CurveKeys::P256 { secret, .. } => secret.as_ref().map(|s| s.to_bytes().to_vec()),
            CurveKeys::P384 { secret, .. } => secret.as_ref().map(|s| s.to_bytes().to_vec()),
            CurveKeys::P521 { secret, .. } => secret.as_ref().map(|s| s.to_bytes().to_vec()),
        }?;
        let encoded = STANDARD.encode(&bytes);
        bytes.zeroize();
        Some(encoded)
    }

    /// Sign an already-computed digest. The signer does not hash again.
    pub fn sign_prehash(&self, digest: &[u8]) -> Result<Vec<u8>, SignaturePolicyError> {
        let missing = || SignaturePolicyError::MissingPrivateKey {
            key_id: self.key_id_base64(),
        };
        match &self.keys {
            CurveKeys::P256 { secret, .. } => {
                ecdsa::sign_p256(secret.as_ref().ok_or_else(missing)?, digest)
            }
            CurveKeys::P384 { secret, .. } => {
                ecdsa::sign_p384(secret.as_ref().ok_or_else(missing)?, digest)
            }
            CurveKeys::P521 { secret, .. } => {
                ecdsa::sign_p521(secret.as_ref().ok_or_else(missing)?, digest)
            }
        }
    }
}

impl PartialEq for KeyMaterial {
    fn eq(&self, other: &Self) -> bool {
        self.key_id == other.key_id && self.has_private_key() == other.has_private_key()
    }
}

impl Eq for KeyMaterial {}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("curve", &self.curve())
            .field("key_id", &self.key_id_base64())
            .field("has_private_key", &self.has_private_key())
            .finish()
    }
}

fn invalid(what: &str, error: impl fmt::Display) -> SignaturePolicyError {
    SignaturePolicyError::InvalidKeyMaterial(format!("{what}: {error}"))
}

// =============================================================================
// SIGNING IDENTITY
// =============================================================================

/// Generator evaluated against the JSON document of the message being signed.
pub type MetadataFn<T> = Arc<dyn Fn(&Value) -> T + Send + Sync>;

/// Key material plus optional signer metadata.
///
/// Name, description and timestamp generators are evaluated on every signing
/// call; their outputs are never cached.
#[derive(Clone)]
pub struct SigningIdentity {
    key: KeyMaterial,
    name: Option<MetadataFn<String>>,
    description: Option<MetadataFn<String>>,
    timestamp: Option<MetadataFn<DateTime<Utc>>>,
}

impl SigningIdentity {
    #[must_use]
    pub fn new(key: KeyMaterial) -> Self {
        Self {
            key,
            name: None,
            description: None,
            timestamp: None,
        }
    }

    #[must_use]
    pub fn with_name<F>(mut self, generator: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.name = Some(Arc::new(generator));
        self
    }

    #[must_use]
    pub fn with_description<F>(mut self, generator: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.description = Some(Arc::new(generator));
        self
    }

    #[must_use]
    pub fn with_timestamp<F>(mut self, generator: F) -> Self
    where
        F: Fn(&Value) -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.timestamp = Some(Arc::new(generator));
        self
    }

    #[must_use]
    pub fn key(&self) -> &KeyMaterial {
        &self.key
    }

    #[must_use]
    pub fn name_for(&self, document: &Value) -> Option<String> {
        self.name.as_ref().map(|generate| generate(document))
    }

    #[must_use]
    pub fn description_for(&self, document: &Value) -> Option<String> {
        self.description.as_ref().map(|generate| generate(document))
    }

    #[must_use]
    pub fn timestamp_for(&self, document: &Value) -> Option<DateTime<Utc>> {
        self.timestamp.as_ref().map(|generate| generate(document))
    }
}

impl From<KeyMaterial> for SigningIdentity {
    fn from(key: KeyMaterial) -> Self {
        Self::new(key)
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("key", &self.key)
            .field("name", &self.name.is_some())
            .field("description", &self.description.is_some())
            .field("timestamp", &self.timestamp.is_some())
            .finish()
    }
}
