//! Ed25519 signature verification for governance objects and votes.
//!
//! The message is always the 32-byte artifact hash; keys come from the
//! masternode directory.

use ed25519_dalek::{Signature as DalekSignature, VerifyingKey};

use crate::domain::entities::{Hash, PublicKey, Signature};
use crate::ports::outbound::SignatureVerifier;

/// Verifier backed by `ed25519-dalek`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, message: &Hash, public_key: &PublicKey, signature: &Signature) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(public_key) else {
            return false;
        };
        let signature = DalekSignature::from_bytes(signature);
        key.verify_strict(message, &signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn keypair(seed: u8) -> (SigningKey, PublicKey) {
        let signing = SigningKey::from_bytes(&[seed; 32]);
        let public = signing.verifying_key().to_bytes();
        (signing, public)
    }

    #[test]
    fn accepts_a_valid_signature() {
        let (signing, public) = keypair(7);
        let message = [0xAB; 32];
        let signature = signing.sign(&message).to_bytes();

        assert!(Ed25519Verifier.verify(&message, &public, &signature));
    }

    #[test]
    fn rejects_a_tampered_message() {
        let (signing, public) = keypair(7);
        let message = [0xAB; 32];
        let signature = signing.sign(&message).to_bytes();

        let tampered = [0xAC; 32];
        assert!(!Ed25519Verifier.verify(&tampered, &public, &signature));
    }

    #[test]
    fn rejects_a_foreign_key() {
        let (signing, _) = keypair(7);
        let (_, other_public) = keypair(8);
        let message = [0xAB; 32];
        let signature = signing.sign(&message).to_bytes();

        assert!(!Ed25519Verifier.verify(&message, &other_public, &signature));
    }
}
