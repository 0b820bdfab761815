//! Durable key/value storage used by every stateful component.
//!
//! Values are opaque strings; the key names below are the persisted contract.

use async_trait::async_trait;

use crate::error::Result;

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Persisted key names.
pub mod keys {
    /// Serialized user and session snapshot.
    pub const USER: &str = "user";
    /// The local passcode, plain or hashed.
    pub const USER_PASSCODE: &str = "user_passcode";
    /// Account id the passcode is bound to.
    pub const USER_ID: &str = "user_id";
    /// Account email the passcode is bound to.
    pub const USER_EMAIL: &str = "user_email";
    /// Decimal count of consecutive failed passcode validations.
    pub const FAILED_ATTEMPTS: &str = "failed_attempts";
    /// Committed ballot selections.
    pub const BALLOT_SELECTIONS: &str = "ballot_selections";
}

/// An asynchronous key/value store.
///
/// Calls are awaited one at a time by their owners; implementations need not
/// provide multi-key transactions.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read a value, or `None` if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Remove several keys.
    async fn multi_remove(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}
