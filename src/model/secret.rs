use std::fmt::{Debug, Formatter};

use argon2::Config;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Result;

const ARGON2_PREFIX: &str = "$argon2";

/// How new secrets are written to storage.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasscodeHashing {
    /// Store the secret as entered.
    Plaintext,
    /// Store an argon2 encoded hash.
    #[default]
    Argon2,
}

/// A stored secret: either the raw value or its argon2 encoding.
///
/// Reading accepts both forms regardless of the configured [`PasscodeHashing`].
#[derive(Clone, PartialEq, Eq)]
pub enum Secret {
    Plain(String),
    Argon2(String),
}

impl Secret {
    /// Prepare a secret for storage.
    pub fn new(raw: &str, hashing: PasscodeHashing) -> Result<Self> {
        match hashing {
            PasscodeHashing::Plaintext => Ok(Self::Plain(raw.to_string())),
            PasscodeHashing::Argon2 => {
                // 16 bytes is recommended for password hashing:
                //  https://en.wikipedia.org/wiki/Argon2
                let mut salt = [0_u8; 16];
                rand::thread_rng().fill(&mut salt);
                let encoded = argon2::hash_encoded(raw.as_bytes(), &salt, &Config::default())?;
                Ok(Self::Argon2(encoded))
            }
        }
    }

    /// Interpret a value read back from storage.
    pub fn from_stored(stored: String) -> Self {
        if stored.starts_with(ARGON2_PREFIX) {
            Self::Argon2(stored)
        } else {
            Self::Plain(stored)
        }
    }

    /// The value to write to storage.
    pub fn as_stored(&self) -> &str {
        match self {
            Self::Plain(raw) => raw,
            Self::Argon2(encoded) => encoded,
        }
    }

    /// Check whether `candidate` is the secret.
    pub fn matches<T: AsRef<[u8]>>(&self, candidate: T) -> bool {
        match self {
            Self::Plain(raw) => raw.as_bytes() == candidate.as_ref(),
            Self::Argon2(encoded) => match argon2::verify_encoded(encoded, candidate.as_ref()) {
                Ok(valid) => valid,
                Err(e) => {
                    error!("Stored secret has a malformed hash: {e}");
                    false
                }
            },
        }
    }
}

impl Debug for Secret {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => write!(f, "Secret::Plain(..)"),
            Self::Argon2(_) => write!(f, "Secret::Argon2(..)"),
        }
    }
}

impl Serialize for Secret {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_stored())
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::from_stored)
    }
}
