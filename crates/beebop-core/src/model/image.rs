//! イメージ参照

use beebop_config::ImageSettings;
use serde::{Deserialize, Serialize};
use std::fmt;

/// イメージ参照 (`repo/name:tag`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub repo: String,
    pub name: String,
    pub tag: String,
}

impl ImageReference {
    pub fn new(repo: impl Into<String>, name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            name: name.into(),
            tag: tag.into(),
        }
    }
}

impl From<&ImageSettings> for ImageReference {
    fn from(settings: &ImageSettings) -> Self {
        Self::new(&settings.repo, &settings.name, &settings.tag)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.repo, self.name, self.tag)
    }
}
