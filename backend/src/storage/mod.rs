pub mod scratch_service;

pub use scratch_service::{ScratchFile, ScratchService, StorageError};
