use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LENGTH: usize = 4;

/// A local passcode, as entered on the keypad.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Passcode {
    digits: [u8; LENGTH],
}

impl Passcode {
    pub fn digits(&self) -> &[u8; LENGTH] {
        &self.digits
    }
}

// Never print the digits themselves.
impl std::fmt::Debug for Passcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Passcode(****)")
    }
}

impl Display for Passcode {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = self
            .digits
            .iter()
            .map(|digit| char::from(b'0' + digit))
            .collect::<String>();
        write!(formatter, "{code}")
    }
}

impl FromStr for Passcode {
    type Err = ParseError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let len = string.chars().count();
        if len != LENGTH {
            return Err(Self::Err::InvalidLength(len));
        }
        let mut digits = [0; LENGTH];
        for (digit, c) in digits.iter_mut().zip(string.chars()) {
            *digit = match c {
                '0'..='9' => c as u8 - b'0',
                _ => return Err(Self::Err::InvalidChar(c)),
            };
        }
        Ok(Self { digits })
    }
}

impl TryFrom<String> for Passcode {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Passcode> for String {
    fn from(code: Passcode) -> Self {
        code.to_string()
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("passcode must contain exactly 4 characters, found {0}")]
    InvalidLength(usize),
    #[error("passcode must contain only digits, found '{0}'")]
    InvalidChar(char),
}
