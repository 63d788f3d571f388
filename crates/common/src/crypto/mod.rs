//! Cryptographic primitives for the secrets engine
//!
//! - **Path encryption**: a versioned, convergent AES-256-GCM keyring ([`Policy`])
//!   used to hide logical key names from the backing store
//! - **Payload sealing**: ChaCha20-Poly1305 envelopes ([`Secret`]) for user data,
//!   keyed by subkeys derived from the policy
//!
//! # Security Model
//!
//! ## Key names
//! Every segment of a logical key is encrypted deterministically so that the
//! same directory always maps to the same opaque name. This leaks equality of
//! segments (two equal names encrypt equal) and nothing else.
//!
//! ## User data
//! Version payloads are never encrypted convergently. Each one is sealed under
//! a fresh random nonce with a key derived from the policy for the path the
//! payload is stored at.
//!
//! ## Rotation
//! Rotating the policy adds a key version. Old versions stay in the keyring so
//! existing paths and payloads keep decrypting; nothing is re-encrypted eagerly.

mod policy;
mod policy_handle;
mod secret;

pub use policy::{KeyEntry, Policy, PolicyError, GCM_NONCE_SIZE, VERSION_HEADER_SIZE};
pub use policy_handle::{PolicyHandle, POLICY_NAME, POLICY_PATH};
pub use secret::{Secret, SecretError, BLAKE3_HASH_SIZE, NONCE_SIZE, SECRET_SIZE};
