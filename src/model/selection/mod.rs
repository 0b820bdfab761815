//! In-progress ballot choices, one entry per ballot.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::catalog::{Ballot, BallotId, BallotItem, BallotItemId, Candidate, CandidateId, Election};

pub use self::district::candidates_for;
pub use self::selector::{BallotItemSelector, SelectedCandidate, Toggle};

pub mod district;
pub mod selector;

/// The choice made on one ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionEntry {
    pub ballot_id: BallotId,
    pub ballot_item_id: BallotItemId,
    /// Name of the chosen item.
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub selections: Vec<SelectedCandidate>,
    /// Chosen but not yet confirmed with the passcode.
    pub is_new_selection: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committed_at: Option<DateTime<Utc>>,
}

impl SelectionEntry {
    fn new(ballot: &Ballot, item: &BallotItem, selections: Vec<SelectedCandidate>) -> Self {
        Self {
            ballot_id: ballot.id,
            ballot_item_id: item.id,
            name: item.name.clone(),
            description: item.description.clone(),
            selections,
            is_new_selection: true,
            committed_at: None,
        }
    }
}

/// Selection entries keyed by ballot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionMap {
    pub entries: HashMap<BallotId, SelectionEntry>,
}

impl Deref for SelectionMap {
    type Target = HashMap<BallotId, SelectionEntry>;

    fn deref(&self) -> &Self::Target {
        &self.entries
    }
}

impl DerefMut for SelectionMap {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.entries
    }
}

/// The working set of selections for one election, plus the last
/// committed state each ballot reverts to on discard.
#[derive(Debug, Clone)]
pub struct SelectionStore {
    election: Arc<Election>,
    working: SelectionMap,
    committed: SelectionMap,
}

impl SelectionStore {
    pub fn new(election: Arc<Election>) -> Self {
        Self {
            election,
            working: SelectionMap::default(),
            committed: SelectionMap::default(),
        }
    }

    pub fn election(&self) -> &Election {
        &self.election
    }

    /// Toggle a candidate on an item, as seen from `district`.
    ///
    /// Choosing a different item than the ballot's current entry starts over
    /// from an empty selection. A toggle rejected by the item's limit leaves
    /// everything as it was.
    pub fn select(
        &mut self,
        ballot_id: BallotId,
        item_id: BallotItemId,
        candidate_id: CandidateId,
        district: &str,
    ) -> Result<Toggle> {
        let election = Arc::clone(&self.election);
        let (ballot, item) = find(&election, ballot_id, item_id)?;
        if !item.has_candidates() {
            return Err(Error::BadRequest(format!(
                "Ballot item {item_id} of ballot {ballot_id} has no candidates"
            )));
        }
        let mut selections = match self.working.get(&ballot_id) {
            Some(entry) if entry.ballot_item_id == item_id => entry.selections.clone(),
            _ => Vec::new(),
        };
        // Deselecting never depends on what the district currently offers.
        if selector::remove(candidate_id, &mut selections) {
            self.working
                .insert(ballot_id, SelectionEntry::new(ballot, item, selections));
            return Ok(Toggle::Removed);
        }

        let candidate = candidates_for(ballot, item, district)
            .into_iter()
            .find(|candidate| candidate.id == candidate_id)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Candidate {candidate_id} in ballot {ballot_id} item {item_id} for district '{district}'"
                ))
            })?;
        let toggle = BallotItemSelector::for_item(item).toggle(candidate, &mut selections);
        if toggle.changed() {
            let entry = SelectionEntry::new(ballot, item, selections);
            self.working.insert(ballot_id, entry);
        }
        Ok(toggle)
    }

    /// Pick an item that has no candidate list, such as a decline.
    pub fn choose(&mut self, ballot_id: BallotId, item_id: BallotItemId) -> Result<&SelectionEntry> {
        let election = Arc::clone(&self.election);
        let (ballot, item) = find(&election, ballot_id, item_id)?;
        if item.has_candidates() {
            return Err(Error::BadRequest(format!(
                "Ballot item {item_id} of ballot {ballot_id} needs candidates to be selected"
            )));
        }
        let entry = SelectionEntry::new(ballot, item, Vec::new());
        self.working.insert(ballot_id, entry);
        Ok(&self.working[&ballot_id])
    }

    /// Candidates of an item offered to voters in `district`.
    pub fn available_candidates(
        &self,
        ballot_id: BallotId,
        item_id: BallotItemId,
        district: &str,
    ) -> Result<Vec<&Candidate>> {
        let (ballot, item) = find(&self.election, ballot_id, item_id)?;
        Ok(candidates_for(ballot, item, district))
    }

    pub fn get_entry(&self, ballot_id: BallotId) -> Option<&SelectionEntry> {
        self.working.get(&ballot_id)
    }

    /// Entries awaiting confirmation, ordered by ballot.
    pub fn dirty(&self) -> Vec<&SelectionEntry> {
        let mut dirty: Vec<_> = self
            .working
            .values()
            .filter(|entry| entry.is_new_selection)
            .collect();
        dirty.sort_by_key(|entry| entry.ballot_id);
        dirty
    }

    pub fn has_dirty(&self) -> bool {
        self.working.values().any(|entry| entry.is_new_selection)
    }

    pub fn entries(&self) -> &SelectionMap {
        &self.working
    }

    /// The entries as last committed, without pending changes.
    pub fn committed(&self) -> &SelectionMap {
        &self.committed
    }

    /// Drop unconfirmed changes to one ballot, reverting to its committed entry.
    pub fn discard(&mut self, ballot_id: BallotId) -> bool {
        match self.committed.get(&ballot_id) {
            Some(committed) => {
                let reverted = self.working.insert(ballot_id, committed.clone());
                reverted.as_ref() != Some(committed)
            }
            None => self.working.remove(&ballot_id).is_some(),
        }
    }

    /// Drop every unconfirmed change.
    pub fn discard_all(&mut self) {
        self.working = self.committed.clone();
    }

    /// Forget everything, committed or not.
    pub fn reset(&mut self) {
        self.working.clear();
        self.committed.clear();
    }

    /// Drop every entry, committed or not, of a ballot scoped to districts.
    ///
    /// Returns how many entries were dropped.
    pub fn drop_district_scoped(&mut self) -> usize {
        let election = Arc::clone(&self.election);
        let scoped = |ballot_id: &BallotId| {
            election
                .ballot(*ballot_id)
                .map(Ballot::is_district_scoped)
                .unwrap_or(false)
        };
        let before = self.working.len();
        self.working.retain(|ballot_id, _| !scoped(ballot_id));
        self.committed.retain(|ballot_id, _| !scoped(ballot_id));
        before - self.working.len()
    }

    /// Replace the store's contents with a previously committed map.
    ///
    /// Entries naming ballots outside this election are dropped.
    pub fn restore(&mut self, map: SelectionMap) {
        let mut map = map;
        map.retain(|ballot_id, entry| {
            let known = self.election.ballot(*ballot_id).is_some();
            if !known {
                warn!("Dropping stored selection for unknown ballot {ballot_id}");
            }
            entry.is_new_selection = false;
            known
        });
        self.working = map.clone();
        self.committed = map;
    }

    /// Clear the dirty flag on every entry and record the result as committed.
    ///
    /// Returns how many entries were flipped.
    pub fn mark_committed(&mut self, now: DateTime<Utc>) -> usize {
        let mut flipped = 0;
        for entry in self.working.values_mut() {
            if entry.is_new_selection {
                entry.is_new_selection = false;
                entry.committed_at = Some(now);
                flipped += 1;
            }
        }
        self.committed = self.working.clone();
        flipped
    }
}

fn find(
    election: &Election,
    ballot_id: BallotId,
    item_id: BallotItemId,
) -> Result<(&Ballot, &BallotItem)> {
    let ballot = election
        .ballot(ballot_id)
        .ok_or_else(|| Error::NotFound(format!("Ballot {ballot_id}")))?;
    let item = ballot
        .item(item_id)
        .ok_or_else(|| Error::NotFound(format!("Ballot item {item_id} of ballot {ballot_id}")))?;
    Ok((ballot, item))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TBILISI: &str = "თბილისი";
    const BATUMI: &str = "ბათუმი";

    fn store() -> SelectionStore {
        SelectionStore::new(Arc::new(Election::example()))
    }

    fn picked(store: &SelectionStore, ballot_id: BallotId) -> Vec<(CandidateId, u32)> {
        store
            .get_entry(ballot_id)
            .map(|entry| entry.selections.iter().map(|s| (s.id, s.position)).collect())
            .unwrap_or_default()
    }

    #[test]
    fn select_creates_dirty_entry() {
        let mut store = store();
        assert_eq!(store.select(1, 1, 3, TBILISI).unwrap(), Toggle::Added);

        let entry = store.get_entry(1).unwrap();
        assert_eq!(entry.ballot_item_id, 1);
        assert_eq!(entry.name, "ჩემი არჩევანი");
        assert!(entry.is_new_selection);
        assert_eq!(picked(&store, 1), vec![(3, 1)]);
        assert!(store.has_dirty());
    }

    #[test]
    fn select_respects_item_limit() {
        let mut store = store();
        for id in 1..=3 {
            store.select(1, 1, id, TBILISI).unwrap();
        }
        assert_eq!(store.select(1, 1, 4, TBILISI).unwrap(), Toggle::Rejected);
        assert_eq!(picked(&store, 1), vec![(1, 1), (2, 2), (3, 3)]);

        assert_eq!(store.select(1, 1, 2, TBILISI).unwrap(), Toggle::Removed);
        assert_eq!(picked(&store, 1), vec![(1, 1), (3, 2)]);
    }

    #[test]
    fn select_filters_by_district() {
        let mut store = store();
        assert_eq!(store.select(3, 1, 202, BATUMI).unwrap(), Toggle::Added);
        assert!(matches!(store.select(3, 1, 102, BATUMI), Err(Error::NotFound(_))));
        assert_eq!(picked(&store, 3), vec![(202, 1)]);

        let offered: Vec<_> = store
            .available_candidates(3, 1, TBILISI)
            .unwrap()
            .into_iter()
            .map(|candidate| candidate.id)
            .collect();
        assert_eq!(offered, vec![101, 102, 103]);
    }

    #[test]
    fn deselect_outside_current_district() {
        let mut store = store();
        store.select(3, 1, 101, TBILISI).unwrap();

        assert_eq!(store.select(3, 1, 101, BATUMI).unwrap(), Toggle::Removed);
        assert!(picked(&store, 3).is_empty());
        assert!(store.get_entry(3).unwrap().is_new_selection);
        assert!(matches!(store.select(3, 1, 101, BATUMI), Err(Error::NotFound(_))));
    }

    #[test]
    fn district_scoped_entries_can_be_dropped() {
        let mut store = store();
        store.select(1, 1, 1, TBILISI).unwrap();
        store.select(3, 1, 101, TBILISI).unwrap();
        store.mark_committed(Utc::now());
        store.select(3, 1, 102, TBILISI).unwrap();

        assert_eq!(store.drop_district_scoped(), 1);
        assert_eq!(store.get_entry(3), None);
        assert_eq!(picked(&store, 1), vec![(1, 1)]);

        // The committed entry does not come back on discard.
        store.discard_all();
        assert_eq!(store.get_entry(3), None);
        assert_eq!(store.drop_district_scoped(), 0);
    }

    #[test]
    fn unknown_references_are_rejected() {
        let mut store = store();
        assert!(matches!(store.select(9, 1, 1, TBILISI), Err(Error::NotFound(_))));
        assert!(matches!(store.select(1, 9, 1, TBILISI), Err(Error::NotFound(_))));
        assert!(matches!(store.select(1, 1, 99, TBILISI), Err(Error::NotFound(_))));
        assert!(matches!(store.select(1, 2, 1, TBILISI), Err(Error::BadRequest(_))));
        assert!(matches!(store.choose(1, 1), Err(Error::BadRequest(_))));
        assert!(store.entries().is_empty());
    }

    #[test]
    fn other_item_replaces_entry() {
        let mut store = store();
        store.select(2, 1, 1, TBILISI).unwrap();
        store.select(2, 1, 2, TBILISI).unwrap();

        let entry = store.choose(2, 2).unwrap();
        assert_eq!(entry.ballot_item_id, 2);
        assert!(entry.selections.is_empty());
        assert!(entry.is_new_selection);

        // Going back to the candidate list starts from scratch.
        store.select(2, 1, 5, TBILISI).unwrap();
        assert_eq!(picked(&store, 2), vec![(5, 1)]);
    }

    #[test]
    fn commit_flips_only_dirty_entries() {
        let mut store = store();
        store.select(1, 1, 1, TBILISI).unwrap();
        let first = Utc::now();
        assert_eq!(store.mark_committed(first), 1);
        let committed = store.get_entry(1).unwrap().clone();
        assert!(!committed.is_new_selection);
        assert_eq!(committed.committed_at, Some(first));

        store.select(2, 1, 4, TBILISI).unwrap();
        assert_eq!(store.dirty().len(), 1);
        assert_eq!(store.mark_committed(Utc::now()), 1);
        assert_eq!(store.get_entry(1), Some(&committed));
        assert!(!store.has_dirty());
        assert_eq!(store.mark_committed(Utc::now()), 0);
    }

    #[test]
    fn discard_reverts_to_committed() {
        let mut store = store();
        store.select(1, 1, 1, TBILISI).unwrap();
        store.mark_committed(Utc::now());
        let committed = store.get_entry(1).unwrap().clone();

        store.select(1, 1, 2, TBILISI).unwrap();
        store.select(2, 1, 3, TBILISI).unwrap();
        assert!(store.discard(1));
        assert_eq!(store.get_entry(1), Some(&committed));
        assert!(store.discard(2));
        assert_eq!(store.get_entry(2), None);
        assert!(!store.discard(2));

        store.select(1, 1, 2, TBILISI).unwrap();
        store.select(3, 1, 101, TBILISI).unwrap();
        store.discard_all();
        assert_eq!(store.entries().len(), 1);
        assert!(!store.has_dirty());

        store.reset();
        assert!(store.entries().is_empty());
        store.discard_all();
        assert!(store.entries().is_empty());
    }

    #[test]
    fn restore_drops_unknown_ballots() {
        let mut source = store();
        source.select(1, 1, 2, TBILISI).unwrap();
        source.choose(2, 2).unwrap();
        source.mark_committed(Utc::now());

        let mut map = source.entries().clone();
        let mut stray = map[&1].clone();
        stray.ballot_id = 42;
        map.insert(42, stray);

        let json = serde_json::to_string(&map).unwrap();
        let map: SelectionMap = serde_json::from_str(&json).unwrap();

        let mut restored = store();
        restored.restore(map);
        assert_eq!(restored.entries(), source.entries());
        assert!(!restored.has_dirty());
    }
}
