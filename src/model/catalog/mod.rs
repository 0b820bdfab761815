//! Read-only reference data, plus the account directory used for sign-in.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::Result;
use crate::model::{
    secret::Secret,
    user::{District, Person, Team, TeamMembership},
};

pub use self::election::{
    Ballot, BallotId, BallotItem, BallotItemId, BallotItemKind, BallotType, Candidate,
    CandidateId, DistrictPool, Election, ElectionId,
};

pub mod election;

/// Length of a personal id, in digits.
pub const PERSONAL_ID_LENGTH: usize = 11;

/// Static reference data: elections, districts, teams and the identity registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    #[serde(default)]
    pub elections: Vec<Election>,
    #[serde(default)]
    pub districts: Vec<District>,
    #[serde(default)]
    pub teams: Vec<Team>,
    /// Identities an account can be verified against.
    #[serde(default)]
    pub identities: Vec<Person>,
}

impl Catalog {
    pub fn election(&self, id: ElectionId) -> Option<&Election> {
        self.elections.iter().find(|election| election.id == id)
    }

    pub fn district(&self, id: u32) -> Option<&District> {
        self.districts.iter().find(|district| district.id == id)
    }

    pub fn team(&self, id: u32) -> Option<&Team> {
        self.teams.iter().find(|team| team.id == id)
    }

    /// Find a registered identity by personal id.
    ///
    /// Non-digit characters are ignored; anything but exactly
    /// [`PERSONAL_ID_LENGTH`] digits matches nothing.
    pub fn lookup_identity(&self, personal_id: &str) -> Option<&Person> {
        let digits: String = personal_id.chars().filter(char::is_ascii_digit).collect();
        if digits.len() != PERSONAL_ID_LENGTH {
            return None;
        }
        self.identities
            .iter()
            .find(|person| person.personal_id == digits)
    }
}

/// An account known to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub id: String,
    pub user_name: String,
    pub email: String,
    #[serde(default)]
    pub mobile_number: String,
    pub is_verified: bool,
    pub person: Option<Person>,
    /// Accounts without a password cannot sign in with one.
    #[serde(default)]
    pub password: Option<Secret>,
    #[serde(default)]
    pub image: Option<String>,
    pub team_member: TeamMembership,
    pub location: District,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate_id: Option<u32>,
}

/// The account directory. Registration appends to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Directory {
    pub users: Vec<DirectoryEntry>,
}

impl Directory {
    pub fn by_id(&self, id: &str) -> Option<&DirectoryEntry> {
        self.users.iter().find(|entry| entry.id == id)
    }

    /// Case-insensitive email lookup.
    pub fn by_email(&self, email: &str) -> Option<&DirectoryEntry> {
        let email = email.to_lowercase();
        self.users
            .iter()
            .find(|entry| entry.email.to_lowercase() == email)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Everything loaded from the seed file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed {
    #[serde(flatten)]
    pub catalog: Catalog,
    #[serde(default)]
    pub users: Directory,
}

impl Seed {
    /// Read a seed from a JSON file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let body = fs::read_to_string(path.as_ref()).await?;
        let seed: Self = serde_json::from_str(&body)?;
        info!(
            "Loaded catalog from {}: {} election(s), {} account(s)",
            path.as_ref().display(),
            seed.catalog.elections.len(),
            seed.users.len()
        );
        Ok(seed)
    }
}
