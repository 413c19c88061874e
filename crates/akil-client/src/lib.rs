pub mod client;
pub mod forms;
pub mod models;

pub use bookmark_api::{BookmarkApi, OpportunityApi};
pub use client::AkilClient;
pub use forms::{FieldErrors, SignInForm, VerifyEmailForm};

use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://akil-backend.onrender.com";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Connection settings for the Akil backend
#[derive(Debug, Clone)]
pub struct AkilConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl AkilConfig {
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("AKIL_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let timeout_secs = std::env::var("AKIL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            base_url,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl Default for AkilConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}
