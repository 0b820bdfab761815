//! The authenticated user, its verification flags, and their persistence.

use std::sync::Arc;

use tokio::sync::{watch, RwLock};

use crate::error::{Error, Result};
use crate::model::{
    catalog::{Directory, DirectoryEntry},
    secret::{PasscodeHashing, Secret},
    storage::{keys, CredentialStore},
    user::{read_record, District, Person, SessionRecord, TeamMembership, User},
};

/// Personal id given to accounts verified without any identity evidence.
pub const PLACEHOLDER_PERSONAL_ID: &str = "12345678901";

/// Immutable view of the session, consumed by the navigation gate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Has the initial session load completed?
    pub loaded: bool,
    pub user: Option<User>,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn is_verified_or_skipped(&self) -> bool {
        self.user
            .as_ref()
            .map(User::is_verified_or_skipped)
            .unwrap_or(false)
    }
}

/// Owner of the signed-in user.
pub struct SessionState {
    store: Arc<dyn CredentialStore>,
    hashing: PasscodeHashing,
    directory: RwLock<Directory>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl SessionState {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        directory: Directory,
        hashing: PasscodeHashing,
    ) -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot::default());
        Self {
            store,
            hashing,
            directory: RwLock::new(directory),
            snapshot,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn user(&self) -> Option<User> {
        self.snapshot.borrow().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot.borrow().is_authenticated()
    }

    /// Rehydrate a persisted session at start-up and mark the session loaded.
    pub async fn load(&self) {
        let user = match self.read_stored().await {
            Ok(user) => user,
            Err(e) => {
                error!("Auth check failed: {e}");
                None
            }
        };
        self.publish(user);
    }

    /// Sign in with email and password.
    pub async fn login(&self, email: &str, password: &str) -> bool {
        let user = {
            let directory = self.directory.read().await;
            match directory.by_email(email) {
                Some(entry) if entry_accepts(entry, password) => user_from_entry(entry),
                _ => {
                    info!("Login rejected for {email}");
                    return false;
                }
            }
        };
        match self.persist(&user, true).await {
            Ok(()) => {
                info!("User {} logged in", user.id);
                self.publish(Some(user));
                true
            }
            Err(e) => {
                error!("Login failed: {e}");
                false
            }
        }
    }

    /// Create an unverified account and sign it in.
    pub async fn register(&self, email: &str, password: &str, name: &str) -> bool {
        if email.is_empty() || password.is_empty() || name.is_empty() {
            return false;
        }
        let mut directory = self.directory.write().await;
        if directory.by_email(email).is_some() {
            info!("Registration rejected, {email} already exists");
            return false;
        }
        let secret = match Secret::new(password, self.hashing) {
            Ok(secret) => secret,
            Err(e) => {
                error!("Registration failed: {e}");
                return false;
            }
        };

        let user = User {
            id: (directory.len() + 1).to_string(),
            email: email.to_string(),
            name: name.to_string(),
            user_name: name.to_lowercase().split_whitespace().collect(),
            mobile_number: String::new(),
            is_verified: false,
            skip_verified: false,
            full_name: Some(name.to_string()),
            person: None,
            image: None,
            team_member: TeamMembership::none(),
            district: District::none(),
        };
        if let Err(e) = self.persist(&user, true).await {
            error!("Registration failed: {e}");
            return false;
        }
        directory.users.push(DirectoryEntry {
            id: user.id.clone(),
            user_name: user.user_name.clone(),
            email: user.email.clone(),
            mobile_number: String::new(),
            is_verified: false,
            person: None,
            password: Some(secret),
            image: None,
            team_member: user.team_member.clone(),
            location: user.district.clone(),
            delegate_id: None,
        });
        drop(directory);

        info!("Registered user {}", user.id);
        self.publish(Some(user));
        true
    }

    /// Sign in from persisted data after a successful passcode entry.
    ///
    /// Falls back to the directory entry of the bound email when no session
    /// record is stored or it cannot be read.
    pub async fn restore_from_passcode(&self) -> bool {
        match self.restore().await {
            Ok(Some(user)) => {
                info!("User {} restored via passcode", user.id);
                self.publish(Some(user));
                true
            }
            Ok(None) => {
                warn!("Nothing to restore a passcode session from");
                false
            }
            Err(e) => {
                error!("Passcode login failed: {e}");
                false
            }
        }
    }

    async fn restore(&self) -> Result<Option<User>> {
        match self.read_stored().await {
            Ok(Some(user)) => return Ok(Some(user)),
            Ok(None) => {}
            Err(e) => warn!("Stored session unreadable, looking up bound email: {e}"),
        }
        let email = match self.store.get(keys::USER_EMAIL).await? {
            Some(email) => email,
            None => return Ok(None),
        };
        let directory = self.directory.read().await;
        Ok(directory.by_email(&email).map(user_from_entry))
    }

    /// Mark the user verified and attach a legal identity.
    ///
    /// The identity comes from `evidence`, else from a verified directory
    /// entry, else a placeholder is synthesised. Fails only without a user.
    pub async fn verify(&self, evidence: Option<Person>) -> bool {
        let mut user = match self.user() {
            Some(user) => user,
            None => return false,
        };
        let person = match evidence {
            Some(person) => person,
            None => {
                let directory = self.directory.read().await;
                match directory.by_id(&user.id) {
                    Some(DirectoryEntry {
                        is_verified: true,
                        person: Some(person),
                        ..
                    }) => person.clone(),
                    _ => Person {
                        personal_id: PLACEHOLDER_PERSONAL_ID.to_string(),
                        full_name: user.full_name.clone().unwrap_or_else(|| user.name.clone()),
                    },
                }
            }
        };
        user.is_verified = true;
        user.full_name = Some(person.full_name.clone());
        user.person = Some(person);
        self.replace(user, "Verification").await
    }

    /// Let the user through without verifying. `is_verified` stays false.
    pub async fn skip_verification(&self) -> bool {
        match self.user() {
            Some(mut user) => {
                user.skip_verified = true;
                self.replace(user, "Skip verification").await
            }
            None => false,
        }
    }

    /// Replace the user's team membership, superseding the previous one.
    pub async fn update_team_membership(&self, membership: TeamMembership) -> bool {
        match self.user() {
            Some(mut user) => {
                user.team_member = membership;
                self.replace(user, "Update user team").await
            }
            None => false,
        }
    }

    /// Move the user to another district.
    pub async fn change_district(&self, district: District) -> bool {
        match self.user() {
            Some(mut user) => {
                user.district = district;
                self.replace(user, "Change district").await
            }
            None => false,
        }
    }

    /// Forget the signed-in user. The passcode and its binding are kept.
    pub async fn logout(&self) {
        if let Err(e) = self.store.remove(keys::USER).await {
            error!("Logout failed: {e}");
        }
        info!("Logged out");
        self.publish(None);
    }

    async fn replace(&self, user: User, action: &str) -> bool {
        match self.persist(&user, false).await {
            Ok(()) => {
                self.publish(Some(user));
                true
            }
            Err(e) => {
                error!("{action} failed: {e}");
                false
            }
        }
    }

    async fn read_stored(&self) -> Result<Option<User>> {
        let raw = match self.store.get(keys::USER).await? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let loaded = {
            let directory = self.directory.read().await;
            read_record(&raw, &directory)?
        };
        if loaded.migrated {
            self.persist(&loaded.user, false).await?;
        }
        Ok(Some(loaded.user))
    }

    async fn persist(&self, user: &User, bind: bool) -> Result<()> {
        let record = SessionRecord::new(user.clone()).to_json()?;
        self.store.set(keys::USER, &record).await?;
        if bind {
            self.store.set(keys::USER_ID, &user.id).await?;
            self.store.set(keys::USER_EMAIL, &user.email).await?;
        }
        Ok(())
    }

    fn publish(&self, user: Option<User>) {
        self.snapshot.send_replace(SessionSnapshot { loaded: true, user });
    }
}

fn entry_accepts(entry: &DirectoryEntry, password: &str) -> bool {
    entry
        .password
        .as_ref()
        .map(|secret| secret.matches(password))
        .unwrap_or(false)
}

fn user_from_entry(entry: &DirectoryEntry) -> User {
    User {
        id: entry.id.clone(),
        email: entry.email.clone(),
        name: entry.user_name.clone(),
        user_name: entry.user_name.clone(),
        mobile_number: entry.mobile_number.clone(),
        is_verified: entry.is_verified,
        skip_verified: false,
        full_name: Some(
            entry
                .person
                .as_ref()
                .map(|person| person.full_name.clone())
                .unwrap_or_else(|| entry.user_name.clone()),
        ),
        person: entry.person.clone(),
        image: entry.image.clone(),
        team_member: entry.team_member.clone(),
        district: entry.location.clone(),
    }
}

/// Reject an operation that needs a signed-in user.
pub(crate) fn require_user(session: &SessionState) -> Result<User> {
    session
        .user()
        .ok_or_else(|| Error::Unauthorized("no user is signed in".to_string()))
}
