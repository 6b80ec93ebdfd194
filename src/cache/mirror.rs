//! Durable cart mirrors.
//!
//! The mirror is the only cross-process shared resource: each cache write
//! persists opportunistically so a restarted process can recover its cart
//! without network access. Two processes racing on the same mirror produce an
//! undefined final state; the next full reconciliation is authoritative.

use std::{
    ffi::OsString,
    fmt::Debug,
    fs, io,
    path::PathBuf,
    sync::{Mutex, PoisonError},
};

use thiserror::Error;

use crate::cart::Cart;

/// Errors reading or writing a cart mirror.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Underlying IO failure.
    #[error("mirror io error")]
    Io(#[from] io::Error),

    /// The mirrored cart could not be (de)serialized.
    #[error("mirror serialization error")]
    Serde(#[from] serde_json::Error),
}

/// A durable mirror of the cart, surviving process restarts.
pub trait CartMirror: Debug + Send + Sync {
    /// Loads the mirrored cart, if one was ever stored.
    ///
    /// # Errors
    ///
    /// Returns a [`MirrorError`] if the mirror exists but cannot be read.
    fn load(&self) -> Result<Option<Cart>, MirrorError>;

    /// Replaces the mirrored cart.
    ///
    /// # Errors
    ///
    /// Returns a [`MirrorError`] if the cart cannot be persisted.
    fn store(&self, cart: &Cart) -> Result<(), MirrorError>;
}

/// JSON-file mirror. Writes go to a sibling temp file first and are renamed
/// into place, so a crashed write never corrupts the mirror.
#[derive(Debug)]
pub struct JsonFileMirror {
    path: PathBuf,
}

impl JsonFileMirror {
    /// Creates a mirror backed by the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn staging_path(&self) -> PathBuf {
        let mut staged = OsString::from(self.path.as_os_str());
        staged.push(".tmp");
        PathBuf::from(staged)
    }
}

impl CartMirror for JsonFileMirror {
    fn load(&self) -> Result<Option<Cart>, MirrorError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn store(&self, cart: &Cart) -> Result<(), MirrorError> {
        let staged = self.staging_path();

        fs::write(&staged, serde_json::to_vec(cart)?)?;
        fs::rename(&staged, &self.path)?;

        Ok(())
    }
}

/// In-memory mirror; nothing survives the process. Used in tests and for
/// sessions that opt out of local persistence.
#[derive(Debug, Default)]
pub struct MemoryMirror {
    slot: Mutex<Option<Cart>>,
}

impl MemoryMirror {
    /// Creates an empty in-memory mirror.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CartMirror for MemoryMirror {
    fn load(&self) -> Result<Option<Cart>, MirrorError> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn store(&self, cart: &Cart) -> Result<(), MirrorError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(cart.clone());

        Ok(())
    }
}
