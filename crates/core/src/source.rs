use std::fmt;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::domain::search::SearchFilter;
use crate::domain::slot::Slot;
use crate::errors::SourceError;

/// Bearer credential issued by the reservation source.
#[derive(Clone)]
pub struct Credential {
    grant_type: String,
    access_token: SecretString,
}

impl Credential {
    pub fn new(grant_type: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self { grant_type: grant_type.into(), access_token: SecretString::from(access_token.into()) }
    }

    pub fn grant_type(&self) -> &str {
        &self.grant_type
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.access_token.expose_secret().is_empty() { "<unset>" } else { "<redacted>" };
        f.debug_struct("Credential")
            .field("grant_type", &self.grant_type)
            .field("access_token", &token)
            .finish()
    }
}

#[async_trait]
pub trait SlotSource: Send + Sync {
    async fn authenticate(&self) -> Result<Credential, SourceError>;
    async fn fetch_slots(&self, filter: &SearchFilter) -> Result<Vec<Slot>, SourceError>;
}
