use ed25519_dalek::SigningKey;
use rand_core::OsRng;

use crate::error::AddressBookError;

/// Source of the node's private identity key material.
pub trait IdentityProvider: Send + Sync {
    /// Raw private key bytes; the book stores them hex-encoded.
    fn generate_key(&self) -> Result<Vec<u8>, AddressBookError>;
}

/// Generates Ed25519 signing keys from the operating system RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519Identity;

impl IdentityProvider for Ed25519Identity {
    fn generate_key(&self) -> Result<Vec<u8>, AddressBookError> {
        let signing_key = SigningKey::generate(&mut OsRng);
        Ok(signing_key.to_bytes().to_vec())
    }
}
