use anyhow::Result;
use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use try_again::Options;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    /// Retry policy for the command
    #[serde(default)]
    pub retry: Options,

    /// Exit codes counted as success, `[0]` when empty
    #[serde(default)]
    pub success_codes: Vec<i32>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?)
    }

    pub fn success_codes(&self) -> Vec<i32> {
        if self.success_codes.is_empty() {
            vec![0]
        } else {
            self.success_codes.clone()
        }
    }
}
