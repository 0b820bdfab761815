use serde::{Deserialize, Serialize};

use crate::model::user::District;

pub type ElectionId = u32;
pub type BallotId = u32;
pub type BallotItemId = u32;
pub type CandidateId = u32;

/// An election, with its ballots in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Election {
    pub id: ElectionId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub ballots: Vec<Ballot>,
}

impl Election {
    pub fn ballot(&self, id: BallotId) -> Option<&Ballot> {
        self.ballots.iter().find(|ballot| ballot.id == id)
    }
}

/// How a ballot's candidate pools are organised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotType {
    pub id: u32,
    pub name: String,
    /// Candidate pools differ by the voter's district.
    pub by_district: bool,
}

/// One votable unit within an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    pub id: BallotId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub ballot_type: BallotType,
    pub ballot_items: Vec<BallotItem>,
}

impl Ballot {
    pub fn item(&self, id: BallotItemId) -> Option<&BallotItem> {
        self.ballot_items.iter().find(|item| item.id == id)
    }

    pub fn is_district_scoped(&self) -> bool {
        self.ballot_type.by_district
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BallotItemKind {
    /// Exposes a candidate list.
    Accept,
    /// A single-shot declaration, e.g. declining to take part.
    Decline,
    #[serde(other)]
    Other,
}

/// A choice within a ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotItem {
    pub id: BallotItemId,
    #[serde(rename = "type")]
    pub kind: BallotItemKind,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Maximum number of candidates; 0 means no limit.
    #[serde(default)]
    pub max_selected_item: u32,
    /// Candidates grouped by district.
    #[serde(default, rename = "listItems")]
    pub pools: Vec<DistrictPool>,
}

impl BallotItem {
    /// Does this item offer candidates to pick from?
    pub fn has_candidates(&self) -> bool {
        self.pools.iter().any(|pool| !pool.candidates.is_empty())
    }
}

/// The candidates offered to voters of one district.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistrictPool {
    #[serde(rename = "location")]
    pub district: District,
    #[serde(rename = "listItems")]
    pub candidates: Vec<Candidate>,
}

/// A selectable party or politician.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: CandidateId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}
