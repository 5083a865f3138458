//! msgate-core: Shared protocol library for the msgate delivery tier.
//!
//! Provides the platform enumeration, identity keys, the CBOR wire envelope
//! clients decode, RelayService RPC messages, HMAC session tokens, and the
//! queued-event translation used by the push ingest adapter.

pub mod codec;
pub mod error;
pub mod identity;
pub mod ingest;
pub mod messages;
pub mod platform;
pub mod token;

// Re-export commonly used items at crate root.
pub use codec::{cbor_decode, cbor_encode, frame_encode, FrameDecoder};
pub use error::{GateError, GateResult};
pub use identity::{identity_keys_for, IdentityKey};
pub use messages::{decode_envelope, encode_envelope, Envelope, ReqIdentifier};
pub use platform::Platform;
pub use token::{create_token, generate_secret, verify_token, TokenStatus};
