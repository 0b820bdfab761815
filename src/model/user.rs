//! The signed-in user and its persisted form.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::error::{Error, Result};
use crate::model::catalog::Directory;

/// Team every account starts in.
pub const NO_TEAM_ID: u32 = 1;
pub const NO_TEAM_NAME: &str = "გუნდის გარეშე";

/// District every account starts in.
pub const NO_DISTRICT_ID: u32 = 0;
pub const NO_DISTRICT_NAME: &str = "ლოკაციის გარეშე";

/// An administrative district.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct District {
    pub id: u32,
    pub name: String,
}

impl District {
    /// The placeholder district of a new account.
    pub fn none() -> Self {
        Self {
            id: NO_DISTRICT_ID,
            name: NO_DISTRICT_NAME.to_string(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamKind {
    Party,
    Movement,
    Ngo,
}

/// A political team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(rename = "type")]
    pub kind: TeamKind,
}

impl Team {
    /// The placeholder team of a new account.
    pub fn none() -> Self {
        Self {
            id: NO_TEAM_ID,
            name: NO_TEAM_NAME.to_string(),
            number: Some(0),
            logo: None,
            kind: TeamKind::Ngo,
        }
    }
}

/// A user's single active team membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMembership {
    pub team: Team,
    pub is_delegate: bool,
    pub is_approved: bool,
    pub is_leader: bool,
}

impl TeamMembership {
    /// Membership of the placeholder team.
    pub fn none() -> Self {
        Self {
            team: Team::none(),
            is_delegate: false,
            is_approved: false,
            is_leader: false,
        }
    }

    /// A fresh, unapproved membership of `team`.
    pub fn join(team: Team) -> Self {
        Self {
            team,
            ..Self::none()
        }
    }
}

/// A verified legal identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub personal_id: String,
    pub full_name: String,
}

/// The signed-in user, as held in session memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    /// Display name.
    pub name: String,
    pub user_name: String,
    #[serde(default)]
    pub mobile_number: String,
    pub is_verified: bool,
    #[serde(default)]
    pub skip_verified: bool,
    #[serde(default)]
    pub full_name: Option<String>,
    /// Present only once verified.
    pub person: Option<Person>,
    #[serde(default)]
    pub image: Option<String>,
    pub team_member: TeamMembership,
    #[serde(rename = "location")]
    pub district: District,
}

impl User {
    /// May the user proceed past the verification screen?
    pub fn is_verified_or_skipped(&self) -> bool {
        self.is_verified || self.skip_verified
    }
}

/// Layout versions of the persisted `user` record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum SchemaVersion {
    /// Unversioned records, possibly carrying a bare `teamId`.
    Legacy = 1,
    Current = 2,
}

/// The `user` record as written to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub schema_version: SchemaVersion,
    #[serde(flatten)]
    pub user: User,
}

impl SessionRecord {
    pub fn new(user: User) -> Self {
        Self {
            schema_version: SchemaVersion::Current,
            user,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Outcome of reading a stored `user` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loaded {
    pub user: User,
    /// The record was in an older layout and should be written back.
    pub migrated: bool,
}

/// Parse a stored `user` record, upgrading older layouts.
///
/// Legacy records may carry a bare `teamId` instead of a `teamMember`; the
/// membership and district are then backfilled from the directory entry with
/// the same id and `teamId` is dropped. A missing district becomes
/// [`District::none`].
pub fn read_record(raw: &str, directory: &Directory) -> Result<Loaded> {
    let mut value: Value = serde_json::from_str(raw)?;
    let object = value
        .as_object_mut()
        .ok_or_else(|| Error::BadRequest("stored user is not an object".to_string()))?;

    let version = match object.get("schemaVersion") {
        Some(version) => serde_json::from_value(version.clone())?,
        None => SchemaVersion::Legacy,
    };

    if version == SchemaVersion::Legacy {
        migrate_legacy(object, directory);
        object.insert(
            "schemaVersion".to_string(),
            serde_json::to_value(SchemaVersion::Current)?,
        );
    }

    let record: SessionRecord = serde_json::from_value(value)?;
    Ok(Loaded {
        user: record.user,
        migrated: version == SchemaVersion::Legacy,
    })
}

fn migrate_legacy(object: &mut Map<String, Value>, directory: &Directory) {
    if object.contains_key("teamId") && !object.contains_key("teamMember") {
        let entry = object
            .get("id")
            .and_then(Value::as_str)
            .and_then(|id| directory.by_id(id));
        match entry {
            Some(entry) => {
                info!("Migrating legacy user record {}", entry.id);
                if let Ok(team_member) = serde_json::to_value(&entry.team_member) {
                    object.insert("teamMember".to_string(), team_member);
                }
                if let Ok(location) = serde_json::to_value(&entry.location) {
                    object.insert("location".to_string(), location);
                }
                object.remove("teamId");
            }
            None => warn!("Legacy user record has no directory entry to migrate from"),
        }
    }
    if !object.contains_key("location") {
        if let Ok(location) = serde_json::to_value(District::none()) {
            object.insert("location".to_string(), location);
        }
    }
}
