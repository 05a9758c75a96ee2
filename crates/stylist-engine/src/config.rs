use std::time::Duration;

use crate::non_empty_env;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
const DEFAULT_REQUEST_TIMEOUT_S: f64 = 90.0;

/// Runtime settings, read from the environment. Empty variables count as unset.
#[derive(Debug, Clone, PartialEq)]
pub struct StylistConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub image_model: String,
    pub request_timeout_s: f64,
    pub provider: String,
}

impl Default for StylistConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl StylistConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let api_key = get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY"));
        let api_base = get("GEMINI_API_BASE")
            .map(|value| value.trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let image_model =
            get("STYLIST_IMAGE_MODEL").unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string());
        let request_timeout_s = get("STYLIST_REQUEST_TIMEOUT")
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|value| value.is_finite())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_S)
            .clamp(15.0, 300.0);
        let provider = get("STYLIST_PROVIDER").unwrap_or_else(|| {
            if api_key.is_some() {
                "gemini".to_string()
            } else {
                "dryrun".to_string()
            }
        });

        Self {
            api_key,
            api_base,
            image_model,
            request_timeout_s,
            provider,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_s)
    }
}
