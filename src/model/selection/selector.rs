use serde::{Deserialize, Serialize};

use crate::model::catalog::{BallotItem, Candidate, CandidateId};

/// A candidate as held in a selection, with its 1-based pick order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedCandidate {
    pub id: CandidateId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub position: u32,
}

impl SelectedCandidate {
    fn new(candidate: &Candidate) -> Self {
        Self {
            id: candidate.id,
            number: candidate.number,
            name: candidate.name.clone(),
            title: candidate.title.clone(),
            image: candidate.image.clone(),
            position: 0,
        }
    }
}

/// Result of a toggle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Toggle {
    Added,
    Removed,
    /// The ceiling was reached; nothing changed.
    Rejected,
}

impl Toggle {
    pub fn changed(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

/// Toggles candidates in and out of a bounded, ordered selection.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BallotItemSelector {
    ceiling: Option<u32>,
}

impl BallotItemSelector {
    /// `max_selected_item` of 0 means no limit.
    pub fn new(max_selected_item: u32) -> Self {
        Self {
            ceiling: (max_selected_item > 0).then_some(max_selected_item),
        }
    }

    pub fn for_item(item: &BallotItem) -> Self {
        Self::new(item.max_selected_item)
    }

    pub fn ceiling(&self) -> Option<u32> {
        self.ceiling
    }

    /// Can another candidate be added to `selections`?
    pub fn has_room(&self, selections: &[SelectedCandidate]) -> bool {
        match self.ceiling {
            Some(ceiling) => selections.len() < ceiling as usize,
            None => true,
        }
    }

    /// Add `candidate`, or remove it if already selected.
    ///
    /// Positions are renumbered afterwards, so a removal shifts later
    /// picks down and a re-added candidate goes to the end.
    pub fn toggle(&self, candidate: &Candidate, selections: &mut Vec<SelectedCandidate>) -> Toggle {
        if remove(candidate.id, selections) {
            return Toggle::Removed;
        }
        if !self.has_room(selections) {
            debug!("Selection limit reached, ignoring candidate {}", candidate.id);
            return Toggle::Rejected;
        }
        selections.push(SelectedCandidate::new(candidate));
        renumber(selections);
        Toggle::Added
    }
}

/// Take `id` out of `selections` and renumber the rest.
///
/// Returns false if it was not selected.
pub fn remove(id: CandidateId, selections: &mut Vec<SelectedCandidate>) -> bool {
    match selections.iter().position(|s| s.id == id) {
        Some(index) => {
            selections.remove(index);
            renumber(selections);
            true
        }
        None => false,
    }
}

fn renumber(selections: &mut [SelectedCandidate]) {
    for (position, selection) in (1..).zip(selections.iter_mut()) {
        selection.position = position;
    }
}
