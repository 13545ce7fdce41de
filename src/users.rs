use std::{fs, path::Path};

use log::info;
use rand::{seq::SliceRandom, Rng};
use serde::Deserialize;

use crate::error::ConfigError;

/// A credential record from the identity source.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    #[serde(default)]
    pub access_token: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
        }
    }

    pub fn token(&self) -> Option<&str> {
        let token = self.access_token.trim();
        (!token.is_empty()).then_some(token)
    }
}

/// Identities available to sessions. Read-only once loaded.
#[derive(Debug)]
pub struct UserPool {
    identities: Vec<Identity>,
}

impl UserPool {
    pub fn new(identities: Vec<Identity>) -> Self {
        Self { identities }
    }

    pub fn load_from_source(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Missing {
            path: path.to_owned(),
            source,
        })?;
        let identities: Vec<Identity> =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Malformed {
                path: path.to_owned(),
                source,
            })?;

        if identities.is_empty() {
            return Err(ConfigError::EmptyUserPool(path.to_owned()));
        }

        info!("Loaded {} identities from {}", identities.len(), path.display());

        Ok(Self::new(identities))
    }

    /// Uniform pick with replacement. Several sessions may end up with the same identity.
    pub fn pick_random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Identity> {
        self.identities.choose(rng)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}
