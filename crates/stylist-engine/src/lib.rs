use std::env;

use serde_json::{Map, Value};

mod capability;
mod config;
mod dryrun;
mod edit_session;
mod gemini;
mod orchestrator;
mod studio;

#[cfg(test)]
mod testing;

pub use capability::{
    default_capability_registry, resolve_outcome, CapabilityOutcome, CapabilityRegistry,
    FailureKind, ImageCapability, ImageResult, GENERIC_EDIT_FAILURE, GENERIC_GENERATION_FAILURE,
};
pub use config::StylistConfig;
pub use dryrun::DryrunCapability;
pub use edit_session::{ApplyOutcome, EditSession};
pub use gemini::GeminiCapability;
pub use orchestrator::Orchestrator;
pub use studio::Studio;

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing: &String| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
