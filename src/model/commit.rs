//! Passcode re-entry in front of every sensitive mutation.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::model::{
    passcode::{Passcode, PasscodeGuard, Validation},
    selection::{SelectionMap, SelectionStore},
    session::SessionState,
    storage::{keys, CredentialStore},
    user::{District, TeamMembership},
};

/// The change confirmed alongside the pending selections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitIntent {
    /// Persist the selection map.
    Ballots,
    ChangeDistrict(District),
    JoinTeam(TeamMembership),
    /// Fall back to the placeholder team.
    LeaveTeam,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The passcode matched. `flipped` entries lost their dirty flag and
    /// `applied` says whether the intent's own write succeeded.
    Committed { flipped: usize, applied: bool },
    /// Wrong passcode; nothing changed.
    Rejected { remaining_attempts: u32 },
    /// Wrong passcode for the last time. Credentials, session and every
    /// selection have been wiped.
    LockedOut,
    /// No passcode to check against; nothing changed.
    NoCredential,
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

pub struct CommitGate {
    guard: Arc<PasscodeGuard>,
    session: Arc<SessionState>,
    selections: Arc<Mutex<SelectionStore>>,
    store: Arc<dyn CredentialStore>,
    flight: Mutex<()>,
}

impl CommitGate {
    pub fn new(
        guard: Arc<PasscodeGuard>,
        session: Arc<SessionState>,
        selections: Arc<Mutex<SelectionStore>>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            guard,
            session,
            selections,
            store,
            flight: Mutex::new(()),
        }
    }

    /// Confirm every pending selection and then apply `intent`.
    pub async fn commit(&self, code: &Passcode, intent: CommitIntent) -> CommitOutcome {
        let _flight = self.flight.lock().await;
        match self.guard.validate(code).await {
            Validation::Valid => {}
            Validation::Invalid { remaining_attempts } => {
                return CommitOutcome::Rejected { remaining_attempts }
            }
            Validation::LockedOut => {
                self.lock_out().await;
                return CommitOutcome::LockedOut;
            }
            Validation::NoCredential => return CommitOutcome::NoCredential,
        }

        let (flipped, committed) = {
            let mut selections = self.selections.lock().await;
            let flipped = selections.mark_committed(Utc::now());
            (flipped, selections.committed().clone())
        };
        info!("Committed {flipped} selection(s)");

        // Whatever the intent, flipped entries are stored before it applies.
        let saved = if flipped > 0 || intent == CommitIntent::Ballots {
            self.persist(&committed).await
        } else {
            true
        };
        let applied = match intent {
            CommitIntent::Ballots => saved,
            CommitIntent::ChangeDistrict(district) => self.change_district(district).await,
            CommitIntent::JoinTeam(membership) => {
                self.session.update_team_membership(membership).await
            }
            CommitIntent::LeaveTeam => {
                self.session
                    .update_team_membership(TeamMembership::none())
                    .await
            }
        };
        CommitOutcome::Committed { flipped, applied }
    }

    /// Move the user, dropping selections made on district ballots of the
    /// district left behind.
    async fn change_district(&self, district: District) -> bool {
        let moved = self
            .session
            .user()
            .map(|user| user.district != district)
            .unwrap_or(false);
        if !self.session.change_district(district).await {
            return false;
        }
        if moved {
            let (dropped, committed) = {
                let mut selections = self.selections.lock().await;
                let dropped = selections.drop_district_scoped();
                (dropped, selections.committed().clone())
            };
            if dropped > 0 {
                info!("Dropped {dropped} district selection(s) after moving");
                self.persist(&committed).await;
            }
        }
        true
    }

    /// Forced logout after a lockout: credentials, session and selections go.
    pub async fn lock_out(&self) {
        warn!("Passcode locked out, signing out");
        self.guard.enforce_lockout().await;
        self.session.logout().await;
        self.forget().await;
    }

    /// Restore previously committed selections from storage.
    pub async fn load(&self) {
        let stored = match self.read().await {
            Ok(stored) => stored,
            Err(e) => {
                error!("Reading saved selections failed: {e}");
                None
            }
        };
        if let Some(map) = stored {
            debug!("Restoring {} saved selection(s)", map.len());
            self.selections.lock().await.restore(map);
        }
    }

    /// Drop all selections, in memory and in storage.
    pub async fn forget(&self) {
        self.selections.lock().await.reset();
        if let Err(e) = self.store.remove(keys::BALLOT_SELECTIONS).await {
            error!("Removing saved selections failed: {e}");
        }
    }

    async fn read(&self) -> Result<Option<SelectionMap>> {
        match self.store.get(keys::BALLOT_SELECTIONS).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn persist(&self, map: &SelectionMap) -> bool {
        match self.save(map).await {
            Ok(()) => true,
            Err(e) => {
                error!("Saving selections failed: {e}");
                false
            }
        }
    }

    async fn save(&self, map: &SelectionMap) -> Result<()> {
        let raw = serde_json::to_string(map)?;
        self.store.set(keys::BALLOT_SELECTIONS, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::{
        catalog::{Directory, Election},
        secret::PasscodeHashing,
        storage::MemoryStore,
        user::Team,
    };

    struct Fixture {
        store: MemoryStore,
        session: Arc<SessionState>,
        selections: Arc<Mutex<SelectionStore>>,
        gate: CommitGate,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let shared: Arc<dyn CredentialStore> = Arc::new(store.clone());
        let guard = Arc::new(PasscodeGuard::new(shared.clone(), PasscodeHashing::Plaintext));
        let session = Arc::new(SessionState::new(
            shared.clone(),
            Directory::example(),
            PasscodeHashing::Plaintext,
        ));
        let selections = Arc::new(Mutex::new(SelectionStore::new(Arc::new(Election::example()))));
        let gate = CommitGate::new(guard.clone(), session.clone(), selections.clone(), shared);

        session.login("a.a@gmail.com", "password123").await;
        guard.set_passcode(&Passcode::example(), None).await;
        Fixture {
            store,
            session,
            selections,
            gate,
        }
    }

    #[tokio::test]
    async fn correct_code_flips_dirty_entries() {
        let f = fixture().await;
        {
            let mut selections = f.selections.lock().await;
            selections.select(1, 1, 1, "თბილისი").unwrap();
            selections.mark_committed(Utc::now());
            selections.select(2, 1, 3, "თბილისი").unwrap();
        }
        let untouched = f.selections.lock().await.get_entry(1).cloned();

        let outcome = f.gate.commit(&Passcode::example(), CommitIntent::Ballots).await;
        assert_eq!(outcome, CommitOutcome::Committed { flipped: 1, applied: true });

        let selections = f.selections.lock().await;
        assert!(!selections.has_dirty());
        assert_eq!(selections.get_entry(1).cloned(), untouched);

        let saved: SelectionMap =
            serde_json::from_str(&f.store.get(keys::BALLOT_SELECTIONS).await.unwrap().unwrap())
                .unwrap();
        assert_eq!(&saved, selections.entries());
    }

    #[tokio::test]
    async fn wrong_code_changes_nothing() {
        let f = fixture().await;
        f.selections.lock().await.select(1, 1, 1, "თბილისი").unwrap();
        let before = f.selections.lock().await.entries().clone();

        let outcome = f
            .gate
            .commit(&Passcode::wrong_example(), CommitIntent::Ballots)
            .await;
        assert_eq!(outcome, CommitOutcome::Rejected { remaining_attempts: 2 });
        assert_eq!(f.selections.lock().await.entries(), &before);
        assert!(!f.store.contains(keys::BALLOT_SELECTIONS));
    }

    #[tokio::test]
    async fn lockout_wipes_everything() {
        let f = fixture().await;
        f.gate.commit(&Passcode::example(), CommitIntent::Ballots).await;
        f.selections.lock().await.select(1, 1, 1, "თბილისი").unwrap();

        for _ in 0..2 {
            f.gate.commit(&Passcode::wrong_example(), CommitIntent::Ballots).await;
        }
        let outcome = f
            .gate
            .commit(&Passcode::wrong_example(), CommitIntent::Ballots)
            .await;
        assert_eq!(outcome, CommitOutcome::LockedOut);

        assert!(!f.session.is_authenticated());
        assert!(f.selections.lock().await.entries().is_empty());
        for key in [
            keys::USER,
            keys::USER_PASSCODE,
            keys::USER_ID,
            keys::USER_EMAIL,
            keys::BALLOT_SELECTIONS,
        ] {
            assert!(!f.store.contains(key), "{key} survived the lockout");
        }
        assert_eq!(
            f.gate.commit(&Passcode::example(), CommitIntent::Ballots).await,
            CommitOutcome::NoCredential
        );
    }

    #[tokio::test]
    async fn profile_intents_go_through_session() {
        let f = fixture().await;

        let outcome = f
            .gate
            .commit(&Passcode::example(), CommitIntent::ChangeDistrict(District::example2()))
            .await;
        assert_eq!(outcome, CommitOutcome::Committed { flipped: 0, applied: true });
        assert_eq!(f.session.user().unwrap().district, District::example2());

        f.gate
            .commit(
                &Passcode::example(),
                CommitIntent::JoinTeam(TeamMembership::join(Team::example2())),
            )
            .await;
        assert_eq!(f.session.user().unwrap().team_member.team, Team::example2());

        // A rejected confirmation keeps the pending change out.
        f.gate
            .commit(&Passcode::wrong_example(), CommitIntent::LeaveTeam)
            .await;
        assert_eq!(f.session.user().unwrap().team_member.team, Team::example2());

        f.gate.commit(&Passcode::example(), CommitIntent::LeaveTeam).await;
        assert_eq!(f.session.user().unwrap().team_member, TeamMembership::none());
    }

    #[tokio::test]
    async fn profile_commit_saves_flipped_selections() {
        let f = fixture().await;
        f.selections.lock().await.select(1, 1, 2, "თბილისი").unwrap();

        let outcome = f
            .gate
            .commit(
                &Passcode::example(),
                CommitIntent::JoinTeam(TeamMembership::join(Team::example2())),
            )
            .await;
        assert_eq!(outcome, CommitOutcome::Committed { flipped: 1, applied: true });

        let saved: SelectionMap =
            serde_json::from_str(&f.store.get(keys::BALLOT_SELECTIONS).await.unwrap().unwrap())
                .unwrap();
        assert_eq!(&saved, f.selections.lock().await.entries());

        // Nothing flipped, nothing written.
        f.store.remove(keys::BALLOT_SELECTIONS).await.unwrap();
        f.gate.commit(&Passcode::example(), CommitIntent::LeaveTeam).await;
        assert!(!f.store.contains(keys::BALLOT_SELECTIONS));
    }

    #[tokio::test]
    async fn moving_drops_district_selections() {
        let f = fixture().await;
        {
            let mut selections = f.selections.lock().await;
            selections.select(1, 1, 1, "თბილისი").unwrap();
            selections.select(3, 1, 101, "თბილისი").unwrap();
        }

        let outcome = f
            .gate
            .commit(&Passcode::example(), CommitIntent::ChangeDistrict(District::example2()))
            .await;
        assert_eq!(outcome, CommitOutcome::Committed { flipped: 2, applied: true });

        let selections = f.selections.lock().await;
        assert_eq!(selections.get_entry(3), None);
        assert!(selections.get_entry(1).is_some());
        let saved: SelectionMap =
            serde_json::from_str(&f.store.get(keys::BALLOT_SELECTIONS).await.unwrap().unwrap())
                .unwrap();
        assert_eq!(&saved, selections.entries());
        drop(selections);

        // Staying put keeps them.
        f.selections.lock().await.select(3, 1, 201, "ბათუმი").unwrap();
        f.gate
            .commit(&Passcode::example(), CommitIntent::ChangeDistrict(District::example2()))
            .await;
        assert!(f.selections.lock().await.get_entry(3).is_some());
    }

    #[tokio::test]
    async fn saved_selections_are_restored() {
        let f = fixture().await;
        f.selections.lock().await.select(3, 1, 101, "თბილისი").unwrap();
        f.gate.commit(&Passcode::example(), CommitIntent::Ballots).await;
        let committed = f.selections.lock().await.entries().clone();

        f.selections.lock().await.reset();
        f.gate.load().await;
        assert_eq!(f.selections.lock().await.entries(), &committed);

        f.gate.forget().await;
        assert!(!f.store.contains(keys::BALLOT_SELECTIONS));
        f.gate.load().await;
        assert!(f.selections.lock().await.entries().is_empty());
    }
}
