use std::io;
use std::path::{Path, PathBuf};

use rifas_models::ValidationErrors;

mod persist;
mod storage;
mod store;

pub use persist::{ACTIVE_RAFFLE_KEY, Loaded, Repair, TicketReset, decode_raffle, load_raffle, save_raffle};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use store::{Outcome, RaffleStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode raffle: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
}

impl StoreError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn validation(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}
