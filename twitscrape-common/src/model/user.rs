use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::{fmt::Display, str::FromStr};
use thiserror::Error;

pub const SCREEN_NAME_MAX_LEN: usize = 15;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

/// The `@handle` of an account, without the `@`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct ScreenName(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The screen name is invalid: {0:?}")]
pub struct InvalidScreenNameError(String);

impl ScreenName {
    pub fn new(name: String) -> Result<Self, InvalidScreenNameError> {
        let valid_chars = name
            .chars()
            .all(|char| char.is_ascii_alphanumeric() || char == '_');

        if !name.is_empty() && name.len() <= SCREEN_NAME_MAX_LEN && valid_chars {
            Ok(ScreenName(name))
        } else {
            Err(InvalidScreenNameError(name))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Display for ScreenName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ScreenName {
    type Err = InvalidScreenNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.strip_prefix('@').unwrap_or(s).to_owned())
    }
}

impl<'de> Deserialize<'de> for ScreenName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        ScreenName::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"ScreenName"))
    }
}
