//! The local passcode, its failed-attempt counter, and the lockout policy.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};

use crate::error::Result;
use crate::model::{
    secret::{PasscodeHashing, Secret},
    storage::{keys, CredentialStore},
};

pub use self::code::{ParseError, Passcode};

pub mod code;

/// Consecutive failures that trigger a lockout.
pub const MAX_FAILED_ATTEMPTS: u32 = 3;

/// Immutable view of the guard, consumed by the navigation gate.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct PasscodeSnapshot {
    /// Has the initial status check completed?
    pub loaded: bool,
    /// Is a passcode currently stored?
    pub is_set: bool,
}

/// The account a passcode is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundUser {
    pub id: String,
    pub email: String,
}

/// Result of checking an entered passcode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Correct; the failed-attempt counter was reset.
    Valid,
    /// Incorrect; the counter was incremented.
    Invalid { remaining_attempts: u32 },
    /// Incorrect, and the counter reached [`MAX_FAILED_ATTEMPTS`].
    /// The caller must apply [`PasscodeGuard::enforce_lockout`] and log out.
    LockedOut,
    /// No passcode is stored, or storage could not be read.
    NoCredential,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Owner of the passcode credential.
///
/// Every operation touching the counter runs under a single-flight lock, so
/// back-to-back validations never lose an increment.
pub struct PasscodeGuard {
    store: Arc<dyn CredentialStore>,
    hashing: PasscodeHashing,
    flight: Mutex<()>,
    snapshot: watch::Sender<PasscodeSnapshot>,
}

impl PasscodeGuard {
    pub fn new(store: Arc<dyn CredentialStore>, hashing: PasscodeHashing) -> Self {
        let (snapshot, _) = watch::channel(PasscodeSnapshot::default());
        Self {
            store,
            hashing,
            flight: Mutex::new(()),
            snapshot,
        }
    }

    /// Check whether a passcode is stored and mark the guard as loaded.
    pub async fn load(&self) {
        let is_set = match self.store.get(keys::USER_PASSCODE).await {
            Ok(stored) => stored.is_some(),
            Err(e) => {
                error!("Passcode check failed: {e}");
                false
            }
        };
        self.publish(true, is_set);
    }

    pub fn snapshot(&self) -> PasscodeSnapshot {
        *self.snapshot.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PasscodeSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn is_passcode_set(&self) -> bool {
        self.snapshot().is_set
    }

    /// Store a new passcode, optionally binding it to an account, and reset the counter.
    pub async fn set_passcode(&self, code: &Passcode, user: Option<&BoundUser>) -> bool {
        let _flight = self.flight.lock().await;
        match self.write_passcode(code, user).await {
            Ok(()) => {
                info!("Passcode saved");
                self.publish(true, true);
                true
            }
            Err(e) => {
                error!("Passcode save failed: {e}");
                false
            }
        }
    }

    async fn write_passcode(&self, code: &Passcode, user: Option<&BoundUser>) -> Result<()> {
        let secret = Secret::new(&code.to_string(), self.hashing)?;
        self.store.set(keys::USER_PASSCODE, secret.as_stored()).await?;
        self.store.remove(keys::FAILED_ATTEMPTS).await?;
        if let Some(user) = user {
            self.store.set(keys::USER_ID, &user.id).await?;
            self.store.set(keys::USER_EMAIL, &user.email).await?;
        }
        Ok(())
    }

    /// Check an entered passcode.
    ///
    /// This never wipes anything itself: a [`Validation::LockedOut`] result
    /// must be followed by [`Self::enforce_lockout`].
    pub async fn validate(&self, code: &Passcode) -> Validation {
        let _flight = self.flight.lock().await;
        match self.check(code).await {
            Ok(validation) => validation,
            Err(e) => {
                error!("Passcode validation failed: {e}");
                Validation::NoCredential
            }
        }
    }

    async fn check(&self, code: &Passcode) -> Result<Validation> {
        let stored = match self.store.get(keys::USER_PASSCODE).await? {
            Some(stored) => Secret::from_stored(stored),
            None => {
                debug!("No passcode set");
                return Ok(Validation::NoCredential);
            }
        };

        if stored.matches(code.to_string()) {
            self.store.remove(keys::FAILED_ATTEMPTS).await?;
            debug!("Passcode valid, failed attempts reset");
            return Ok(Validation::Valid);
        }

        let attempts = self.read_failed_attempts().await? + 1;
        self.store
            .set(keys::FAILED_ATTEMPTS, &attempts.to_string())
            .await?;
        if attempts >= MAX_FAILED_ATTEMPTS {
            warn!("Passcode rejected {attempts} times in a row, locking out");
            Ok(Validation::LockedOut)
        } else {
            info!("Passcode rejected, {attempts} failed attempt(s)");
            Ok(Validation::Invalid {
                remaining_attempts: MAX_FAILED_ATTEMPTS - attempts,
            })
        }
    }

    /// Wipe the passcode and its account binding after a lockout.
    ///
    /// The counter is kept, so [`Self::remaining_attempts`] stays at zero
    /// until a new passcode is set.
    pub async fn enforce_lockout(&self) {
        let _flight = self.flight.lock().await;
        let wipe = [keys::USER_PASSCODE, keys::USER_ID, keys::USER_EMAIL];
        if let Err(e) = self.store.multi_remove(&wipe).await {
            error!("Lockout wipe failed: {e}");
        }
        // Even if the wipe failed, the passcode must no longer be offered.
        self.publish(true, false);
    }

    /// Wipe the passcode, its account binding, and the counter.
    pub async fn clear(&self) {
        let _flight = self.flight.lock().await;
        let wipe = [
            keys::USER_PASSCODE,
            keys::USER_ID,
            keys::USER_EMAIL,
            keys::FAILED_ATTEMPTS,
        ];
        if let Err(e) = self.store.multi_remove(&wipe).await {
            error!("Passcode clear failed: {e}");
        }
        info!("Cleared all passcode data");
        self.publish(true, false);
    }

    /// Wipe only the passcode, keeping the account binding.
    pub async fn clear_passcode_only(&self) {
        let _flight = self.flight.lock().await;
        if let Err(e) = self.store.remove(keys::USER_PASSCODE).await {
            error!("Passcode clear failed: {e}");
        }
        info!("Cleared passcode only");
        self.publish(true, false);
    }

    /// Number of consecutive failed validations.
    pub async fn failed_attempts(&self) -> u32 {
        match self.read_failed_attempts().await {
            Ok(attempts) => attempts,
            Err(e) => {
                error!("Get failed attempts failed: {e}");
                0
            }
        }
    }

    pub async fn remaining_attempts(&self) -> u32 {
        MAX_FAILED_ATTEMPTS.saturating_sub(self.failed_attempts().await)
    }

    async fn read_failed_attempts(&self) -> Result<u32> {
        Ok(self
            .store
            .get(keys::FAILED_ATTEMPTS)
            .await?
            .and_then(|stored| match stored.trim().parse() {
                Ok(attempts) => Some(attempts),
                Err(_) => {
                    warn!("Ignoring unreadable failed attempt counter '{stored}'");
                    None
                }
            })
            .unwrap_or(0))
    }

    /// The account the passcode is bound to, if both identifiers are stored.
    pub async fn bound_user(&self) -> Option<BoundUser> {
        let read = async {
            let id = self.store.get(keys::USER_ID).await?;
            let email = self.store.get(keys::USER_EMAIL).await?;
            Result::Ok(id.zip(email).map(|(id, email)| BoundUser { id, email }))
        };
        match read.await {
            Ok(user) => user,
            Err(e) => {
                error!("Get user info failed: {e}");
                None
            }
        }
    }

    fn publish(&self, loaded: bool, is_set: bool) {
        self.snapshot.send_replace(PasscodeSnapshot { loaded, is_set });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::storage::{examples::BrokenStore, MemoryStore};

    fn guard(store: &MemoryStore) -> PasscodeGuard {
        PasscodeGuard::new(Arc::new(store.clone()), PasscodeHashing::Plaintext)
    }

    fn bound() -> BoundUser {
        BoundUser {
            id: "1".to_string(),
            email: "a.a@gmail.com".to_string(),
        }
    }

    #[tokio::test]
    async fn valid_after_set() {
        let store = MemoryStore::new();
        let guard = guard(&store);
        guard.load().await;
        assert_eq!(guard.snapshot(), PasscodeSnapshot { loaded: true, is_set: false });

        assert!(guard.set_passcode(&Passcode::example(), Some(&bound())).await);
        assert!(guard.is_passcode_set());
        assert_eq!(
            store.get(keys::USER_PASSCODE).await.unwrap().as_deref(),
            Some("1234")
        );
        assert_eq!(guard.bound_user().await, Some(bound()));

        assert_eq!(guard.validate(&Passcode::example()).await, Validation::Valid);
        assert_eq!(guard.remaining_attempts().await, MAX_FAILED_ATTEMPTS);
    }

    #[tokio::test]
    async fn success_resets_counter() {
        let store = MemoryStore::new();
        let guard = guard(&store);
        guard.set_passcode(&Passcode::example(), None).await;

        assert_eq!(
            guard.validate(&Passcode::wrong_example()).await,
            Validation::Invalid { remaining_attempts: 2 }
        );
        assert_eq!(
            guard.validate(&Passcode::wrong_example()).await,
            Validation::Invalid { remaining_attempts: 1 }
        );
        assert_eq!(guard.remaining_attempts().await, 1);

        assert_eq!(guard.validate(&Passcode::example()).await, Validation::Valid);
        assert_eq!(guard.failed_attempts().await, 0);
        assert!(!store.contains(keys::FAILED_ATTEMPTS));
    }

    #[tokio::test]
    async fn third_failure_locks_out() {
        let store = MemoryStore::new();
        let guard = guard(&store);
        guard.set_passcode(&Passcode::example(), Some(&bound())).await;

        guard.validate(&Passcode::wrong_example()).await;
        guard.validate(&Passcode::wrong_example()).await;
        let third = guard.validate(&Passcode::wrong_example()).await;
        assert_eq!(third, Validation::LockedOut);

        // Nothing is wiped until the caller enforces the lockout.
        assert!(store.contains(keys::USER_PASSCODE));
        guard.enforce_lockout().await;

        assert_eq!(guard.remaining_attempts().await, 0);
        assert!(!guard.is_passcode_set());
        assert_eq!(store.get(keys::USER_PASSCODE).await.unwrap(), None);
        assert_eq!(guard.bound_user().await, None);
        assert_eq!(
            guard.validate(&Passcode::example()).await,
            Validation::NoCredential
        );
        // A missing passcode does not count as a failure.
        assert_eq!(guard.failed_attempts().await, MAX_FAILED_ATTEMPTS);

        // Setting a new passcode starts over.
        guard.set_passcode(&Passcode::example(), None).await;
        assert_eq!(guard.remaining_attempts().await, MAX_FAILED_ATTEMPTS);
    }

    #[tokio::test]
    async fn concurrent_failures_are_all_counted() {
        let store = MemoryStore::new();
        let guard = Arc::new(guard(&store));
        guard.set_passcode(&Passcode::example(), None).await;

        let wrong = Passcode::wrong_example();
        let (first, second) = tokio::join!(guard.validate(&wrong), guard.validate(&wrong));

        let mut results = [first, second];
        results.sort_by_key(|v| match v {
            Validation::Invalid { remaining_attempts } => *remaining_attempts,
            _ => u32::MAX,
        });
        assert_eq!(
            results,
            [
                Validation::Invalid { remaining_attempts: 1 },
                Validation::Invalid { remaining_attempts: 2 },
            ]
        );
        assert_eq!(guard.failed_attempts().await, 2);
    }

    #[tokio::test]
    async fn clear_variants() {
        let store = MemoryStore::new();
        let guard = guard(&store);

        guard.set_passcode(&Passcode::example(), Some(&bound())).await;
        guard.validate(&Passcode::wrong_example()).await;
        guard.clear_passcode_only().await;
        assert!(!guard.is_passcode_set());
        assert_eq!(guard.bound_user().await, Some(bound()));

        guard.set_passcode(&Passcode::example(), Some(&bound())).await;
        guard.validate(&Passcode::wrong_example()).await;
        guard.clear().await;
        assert!(store.is_empty());
        assert_eq!(guard.remaining_attempts().await, MAX_FAILED_ATTEMPTS);
    }

    #[tokio::test]
    async fn hashed_passcode() {
        let store = MemoryStore::new();
        let guard = PasscodeGuard::new(Arc::new(store.clone()), PasscodeHashing::Argon2);
        guard.set_passcode(&Passcode::example(), None).await;

        let stored = store.get(keys::USER_PASSCODE).await.unwrap().unwrap();
        assert_ne!(stored, "1234");
        assert_eq!(guard.validate(&Passcode::example()).await, Validation::Valid);
        assert_eq!(
            guard.validate(&Passcode::wrong_example()).await,
            Validation::Invalid { remaining_attempts: 2 }
        );
    }

    #[tokio::test]
    async fn storage_failure_fails_closed() {
        let guard = PasscodeGuard::new(Arc::new(BrokenStore), PasscodeHashing::Plaintext);
        guard.load().await;
        assert_eq!(guard.snapshot(), PasscodeSnapshot { loaded: true, is_set: false });

        assert!(!guard.set_passcode(&Passcode::example(), None).await);
        assert!(!guard.is_passcode_set());
        assert_eq!(
            guard.validate(&Passcode::example()).await,
            Validation::NoCredential
        );
        assert_eq!(guard.bound_user().await, None);
    }
}
