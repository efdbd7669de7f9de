//! # Signable Messages
//!
//! The view of an OCPP request or response that the policy needs: its
//! context, its signature set and the identities it asks to be signed with.

use super::entities::SignatureSet;
use super::keys::{KeyMaterial, SigningIdentity};

/// A message that carries signatures.
pub trait SignableMessage {
    /// Context string that selects policy rules, e.g. `"BootNotificationRequest"`.
    fn context(&self) -> &str;

    fn signatures(&self) -> &SignatureSet;

    fn signatures_mut(&mut self) -> &mut SignatureSet;

    /// Plain key pairs this message asks to be signed with.
    fn sign_keys(&self) -> &[KeyMaterial] {
        &[]
    }

    /// Key pairs with signer metadata this message asks to be signed with.
    fn sign_infos(&self) -> &[SigningIdentity] {
        &[]
    }
}
