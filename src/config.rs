use std::env;
use std::path::PathBuf;

use eyre::{eyre, Result};

use crate::gemini_client::DEFAULT_ENDPOINT;

const APP_DIR_NAME: &str = "gemini-chat";

/// Settings resolved from the command line and the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub endpoint: String,
    /// Key from `GEMINI_API_KEY`, used when no key has been saved.
    pub env_api_key: Option<String>,
}

impl Config {
    pub fn resolve(data_dir: Option<PathBuf>, endpoint: Option<String>) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => dirs::data_dir()
                .map(|dir| dir.join(APP_DIR_NAME))
                .ok_or_else(|| eyre!("Could not determine a data directory; pass --data-dir"))?,
        };

        let env_api_key = env::var("GEMINI_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        Ok(Self {
            data_dir,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            env_api_key,
        })
    }
}
