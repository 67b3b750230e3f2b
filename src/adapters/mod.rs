//! Adapters: concrete implementations of the outbound ports.

pub mod content_store;
pub mod signature;

pub use content_store::IpfsHttpStore;
pub use signature::Ed25519Verifier;
