//! The composed application state handed to the host UI.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    catalog::{BallotId, BallotItemId, Candidate, CandidateId, Catalog, Election, ElectionId, Seed},
    commit::{CommitGate, CommitIntent, CommitOutcome},
    navigation::{resolve, NavigationGate, Screen},
    passcode::{BoundUser, Passcode, PasscodeGuard, Validation},
    secret::PasscodeHashing,
    selection::{SelectionEntry, SelectionStore, Toggle},
    session::{require_user, SessionState},
    storage::{CredentialStore, FileStore},
    user::{Person, User},
};

pub struct App {
    catalog: Arc<Catalog>,
    guard: Arc<PasscodeGuard>,
    session: Arc<SessionState>,
    selections: Arc<Mutex<SelectionStore>>,
    commit: CommitGate,
}

impl App {
    /// Open the stores named by `config`.
    pub async fn open(config: &Config) -> Result<Self> {
        let store = FileStore::open(config.storage_path()).await?;
        let seed = Seed::from_file(config.catalog_path()).await?;
        Self::with_store(
            Arc::new(store),
            seed,
            config.passcode_hashing(),
            config.election_id(),
        )
    }

    /// Compose an app over an existing store.
    ///
    /// Selections are made against `election_id`, or the first election of
    /// the catalog.
    pub fn with_store(
        store: Arc<dyn CredentialStore>,
        seed: Seed,
        hashing: PasscodeHashing,
        election_id: Option<ElectionId>,
    ) -> Result<Self> {
        let Seed { catalog, users } = seed;
        let election = match election_id {
            Some(id) => catalog.election(id),
            None => catalog.elections.first(),
        }
        .cloned()
        .ok_or_else(|| match election_id {
            Some(id) => Error::NotFound(format!("Election {id}")),
            None => Error::NotFound("Catalog has no elections".to_string()),
        })?;
        debug!("Using election {} '{}'", election.id, election.name);

        let guard = Arc::new(PasscodeGuard::new(store.clone(), hashing));
        let session = Arc::new(SessionState::new(store.clone(), users, hashing));
        let selections = Arc::new(Mutex::new(SelectionStore::new(Arc::new(election))));
        let commit = CommitGate::new(guard.clone(), session.clone(), selections.clone(), store);
        Ok(Self {
            catalog: Arc::new(catalog),
            guard,
            session,
            selections,
            commit,
        })
    }

    /// Run the initial load of every store.
    pub async fn load(&self) {
        tokio::join!(self.guard.load(), self.session.load());
        self.commit.load().await;
        info!("Loaded, showing {}", self.screen());
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn guard(&self) -> &PasscodeGuard {
        &self.guard
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn user(&self) -> Option<User> {
        self.session.user()
    }

    pub fn screen(&self) -> Screen {
        resolve(&self.session.snapshot(), &self.guard.snapshot())
    }

    pub fn gate(&self) -> NavigationGate {
        NavigationGate::new(self.session.subscribe(), self.guard.subscribe())
    }

    pub async fn login(&self, email: &str, password: &str) -> bool {
        self.session.login(email, password).await
    }

    pub async fn register(&self, email: &str, password: &str, name: &str) -> bool {
        self.session.register(email, password, name).await
    }

    pub async fn verify(&self, evidence: Option<Person>) -> bool {
        self.session.verify(evidence).await
    }

    /// Verify against the identity registry.
    pub async fn verify_personal_id(&self, personal_id: &str) -> bool {
        match self.catalog.lookup_identity(personal_id) {
            Some(person) => self.session.verify(Some(person.clone())).await,
            None => {
                info!("No identity registered for the given personal id");
                false
            }
        }
    }

    pub async fn skip_verification(&self) -> bool {
        self.session.skip_verification().await
    }

    /// Set the passcode, bound to the signed-in user if there is one.
    pub async fn set_passcode(&self, code: &Passcode) -> bool {
        let bound = self.session.user().map(|user| BoundUser {
            id: user.id,
            email: user.email,
        });
        self.guard.set_passcode(code, bound.as_ref()).await
    }

    /// Sign in with the passcode alone.
    ///
    /// A correct passcode with no account left to restore reports
    /// [`Validation::NoCredential`]. A lockout signs out completely.
    pub async fn unlock(&self, code: &Passcode) -> Validation {
        let validation = self.guard.validate(code).await;
        match validation {
            Validation::Valid => {
                if !self.session.restore_from_passcode().await {
                    return Validation::NoCredential;
                }
                self.commit.load().await;
            }
            Validation::LockedOut => self.commit.lock_out().await,
            Validation::Invalid { .. } | Validation::NoCredential => {}
        }
        validation
    }

    /// Forget the passcode but keep the account binding.
    pub async fn reset_passcode(&self) {
        self.guard.clear_passcode_only().await;
    }

    /// Forget the account entirely so another one can sign in.
    pub async fn change_user(&self) {
        self.guard.clear().await;
        self.logout().await;
    }

    pub async fn logout(&self) {
        self.session.logout().await;
        self.commit.forget().await;
    }

    /// Toggle a candidate, as offered in the user's district.
    pub async fn select(
        &self,
        ballot_id: BallotId,
        item_id: BallotItemId,
        candidate_id: CandidateId,
    ) -> Result<Toggle> {
        let user = require_user(&self.session)?;
        self.selections
            .lock()
            .await
            .select(ballot_id, item_id, candidate_id, &user.district.name)
    }

    /// Pick an item without candidates, such as a decline.
    pub async fn choose(&self, ballot_id: BallotId, item_id: BallotItemId) -> Result<SelectionEntry> {
        require_user(&self.session)?;
        let mut selections = self.selections.lock().await;
        selections.choose(ballot_id, item_id).cloned()
    }

    /// Candidates of an item offered in the user's district.
    pub async fn available_candidates(
        &self,
        ballot_id: BallotId,
        item_id: BallotItemId,
    ) -> Result<Vec<Candidate>> {
        let user = require_user(&self.session)?;
        let selections = self.selections.lock().await;
        let candidates = selections.available_candidates(ballot_id, item_id, &user.district.name)?;
        Ok(candidates.into_iter().cloned().collect())
    }

    pub async fn election(&self) -> Election {
        self.selections.lock().await.election().clone()
    }

    pub async fn entry(&self, ballot_id: BallotId) -> Option<SelectionEntry> {
        self.selections.lock().await.get_entry(ballot_id).cloned()
    }

    pub async fn dirty(&self) -> Vec<SelectionEntry> {
        self.selections
            .lock()
            .await
            .dirty()
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn discard(&self, ballot_id: BallotId) -> bool {
        self.selections.lock().await.discard(ballot_id)
    }

    pub async fn discard_all(&self) {
        self.selections.lock().await.discard_all();
    }

    /// Confirm pending selections with the passcode, then apply `intent`.
    pub async fn commit(&self, code: &Passcode, intent: CommitIntent) -> CommitOutcome {
        self.commit.commit(code, intent).await
    }
}
