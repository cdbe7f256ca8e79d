//! Core domain primitives shared by the broker and tools.

pub mod backend;
pub mod crypto;
pub mod error;
pub mod scopes;
pub mod sweep;
pub mod types;
pub mod vault;

pub use backend::file::FileBackend;
pub use backend::memory::MemoryBackend;
pub use backend::{StorageBackend, StoredBlob};
pub use crypto::envelope::{EnvelopeService, MasterKey};
pub use crypto::signing::SigningKey;
pub use error::{Error, Result};
pub use scopes::{ScopeExpression, satisfies, scope_match};
pub use sweep::{SweepReport, Sweeper};
pub use types::{Envelope, Expiry, SealedSecret, Secret, SecretId, SecretPatch};
pub use vault::SecretVault;
