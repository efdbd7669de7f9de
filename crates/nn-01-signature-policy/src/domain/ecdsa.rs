//! # ECDSA Primitives (secp256r1 / secp384r1 / secp521r1)
//!
//! Pure domain logic: digest selection, prehash signing and prehash
//! verification. Signatures are deterministic (RFC 6979) and use the
//! fixed-size `r || s` encoding.
//!
//! ## Digests
//!
//! | Curve     | Digest  |
//! |-----------|---------|
//! | secp256r1 | SHA-256 |
//! | secp384r1 | SHA-512 |
//! | secp521r1 | SHA-512 |
//!
//! The digest is handed to the signer as a prehash; the signer never hashes
//! again.

use super::errors::SignaturePolicyError;
use super::keys::SigningCurve;
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::DecodePublicKey;
use sha2::{Digest, Sha256, Sha512};

/// Hash `data` with the digest paired with `curve`.
pub fn digest(curve: SigningCurve, data: &[u8]) -> Vec<u8> {
    match curve {
        SigningCurve::Secp256r1 => Sha256::digest(data).to_vec(),
        SigningCurve::Secp384r1 | SigningCurve::Secp521r1 => Sha512::digest(data).to_vec(),
    }
}

pub(crate) fn sign_p256(
    secret: &p256::SecretKey,
    prehash: &[u8],
) -> Result<Vec<u8>, SignaturePolicyError> {
    let signer = p256::ecdsa::SigningKey::from(secret);
    let signature: p256::ecdsa::Signature = signer
        .sign_prehash(prehash)
        .map_err(|e| SignaturePolicyError::SigningFailed(e.to_string()))?;
    Ok(signature.to_bytes().to_vec())
}

pub(crate) fn sign_p384(
    secret: &p384::SecretKey,
    prehash: &[u8],
) -> Result<Vec<u8>, SignaturePolicyError> {
    let signer = p384::ecdsa::SigningKey::from(secret);
    let signature: p384::ecdsa::Signature = signer
        .sign_prehash(prehash)
        .map_err(|e| SignaturePolicyError::SigningFailed(e.to_string()))?;
    Ok(signature.to_bytes().to_vec())
}

pub(crate) fn sign_p521(
    secret: &p521::SecretKey,
    prehash: &[u8],
) -> Result<Vec<u8>, SignaturePolicyError> {
    let signer = p521::ecdsa::SigningKey::from_bytes(&secret.to_bytes())
        .map_err(|e| SignaturePolicyError::SigningFailed(e.to_string()))?;
    let signature: p521::ecdsa::Signature = signer
        .sign_prehash(prehash)
        .map_err(|e| SignaturePolicyError::SigningFailed(e.to_string()))?;
    Ok(signature.to_bytes().to_vec())
}

/// Verify `signature` over `prehash` with the public key encoded in `key_id`.
///
/// Returns `Ok(false)` for a well-formed key whose signature does not match,
/// and `Err(InvalidKeyId)` when `key_id` is not a DER public key on `curve`.
/// A signature of the wrong length is simply invalid.
pub fn verify_prehash(
    curve: SigningCurve,
    key_id: &[u8],
    prehash: &[u8],
    signature: &[u8],
) -> Result<bool, SignaturePolicyError> {
    let invalid_key = |e: p256::pkcs8::spki::Error| {
        SignaturePolicyError::InvalidKeyId(format!("{curve}: {e}"))
    };

    let valid = match curve {
        SigningCurve::Secp256r1 => {
            let public = p256::PublicKey::from_public_key_der(key_id).map_err(invalid_key)?;
            let Ok(signature) = p256::ecdsa::Signature::from_slice(signature) else {
                return Ok(false);
            };
            p256::ecdsa::VerifyingKey::from(&public)
                .verify_prehash(prehash, &signature)
                .is_ok()
        }
        SigningCurve::Secp384r1 => {
            let public = p384::PublicKey::from_public_key_der(key_id).map_err(invalid_key)?;
            let Ok(signature) = p384::ecdsa::Signature::from_slice(signature) else {
                return Ok(false);
            };
            p384::ecdsa::VerifyingKey::from(&public)
                .verify_prehash(prehash, &signature)
                .is_ok()
        }
        SigningCurve::Secp521r1 => {
            let public = p521::PublicKey::from_public_key_der(key_id).map_err(invalid_key)?;
            let Ok(signature) = p521::ecdsa::Signature::from_slice(signature) else {
                return Ok(false);
            };
            let point = public.to_encoded_point(false);
            let Ok(verifier) = p521::ecdsa::VerifyingKey::from_sec1_bytes(point.as_bytes()) else {
                return Err(SignaturePolicyError::InvalidKeyId(format!(
                    "{curve}: point rejected"
                )));
            };
            verifier.verify_prehash(prehash, &signature).is_ok()
        }
    };

    Ok(valid)
}
