//! Session token verification and the token store seam.

pub mod store;
pub mod verifier;

pub use store::{MemoryTokenStore, TokenStatusMap, TokenStore};
pub use verifier::TokenVerifier;
