use std::sync::Arc;
use std::time::Instant;

use crate::auth::Authorizer;
use coffer_core::backend::StorageBackend;
use coffer_core::sweep::Sweeper;
use coffer_core::vault::SecretVault;

pub type SharedBackend = Arc<dyn StorageBackend>;
pub type SharedVault = Arc<SecretVault<SharedBackend>>;
pub type SharedSweeper = Arc<Sweeper<SharedBackend>>;
pub type SharedAuthorizer = Arc<Authorizer>;

#[derive(Clone)]
pub struct AppState {
    pub vault: SharedVault,
    pub sweeper: SharedSweeper,
    pub authorizer: SharedAuthorizer,
    pub started: Instant,
}

impl AppState {
    pub fn new(vault: SharedVault, sweeper: SharedSweeper, authorizer: SharedAuthorizer) -> Self {
        Self {
            vault,
            sweeper,
            authorizer,
            started: Instant::now(),
        }
    }
}
