use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use stylist_contracts::ImagePayload;

use crate::config::StylistConfig;
use crate::dryrun::DryrunCapability;
use crate::gemini::GeminiCapability;

pub const GENERIC_GENERATION_FAILURE: &str = "Failed to generate outfit. Try again.";
pub const GENERIC_EDIT_FAILURE: &str = "Failed to edit image. Please try again.";

/// What the image service handed back. A refusal is an expected answer, not an error;
/// `Err` from a capability call is reserved for transport failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageResult {
    Success(ImagePayload),
    Refusal(String),
    Empty,
}

pub trait ImageCapability: Send + Sync {
    fn name(&self) -> &str;
    fn style_generate(&self, image: &ImagePayload, instruction: &str) -> Result<ImageResult>;
    fn edit(&self, image: &ImagePayload, instruction: &str) -> Result<ImageResult>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Refusal,
    EmptyResponse,
    Transport,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refusal => "capability_refusal",
            Self::EmptyResponse => "capability_empty_response",
            Self::Transport => "capability_transport_failure",
        }
    }
}

#[derive(Debug)]
pub enum CapabilityOutcome {
    Image(ImagePayload),
    Failed {
        kind: FailureKind,
        message: String,
        detail: Option<String>,
    },
}

/// Collapses a capability call into either an image or user-facing failure text.
/// Refusal text is surfaced verbatim; everything else gets `generic_message`.
pub fn resolve_outcome(result: Result<ImageResult>, generic_message: &str) -> CapabilityOutcome {
    match result {
        Ok(ImageResult::Success(image)) if !image.is_empty() => CapabilityOutcome::Image(image),
        Ok(ImageResult::Success(_)) | Ok(ImageResult::Empty) => CapabilityOutcome::Failed {
            kind: FailureKind::EmptyResponse,
            message: generic_message.to_string(),
            detail: None,
        },
        Ok(ImageResult::Refusal(text)) if !text.trim().is_empty() => CapabilityOutcome::Failed {
            kind: FailureKind::Refusal,
            message: text,
            detail: None,
        },
        Ok(ImageResult::Refusal(_)) => CapabilityOutcome::Failed {
            kind: FailureKind::EmptyResponse,
            message: generic_message.to_string(),
            detail: None,
        },
        Err(err) => CapabilityOutcome::Failed {
            kind: FailureKind::Transport,
            message: generic_message.to_string(),
            detail: Some(crate::error_chain_text(&err, 512)),
        },
    }
}

#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: BTreeMap<String, Arc<dyn ImageCapability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C: ImageCapability + 'static>(&mut self, capability: C) {
        self.capabilities
            .insert(capability.name().to_string(), Arc::new(capability));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ImageCapability>> {
        self.capabilities.get(name.trim()).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.capabilities.keys().cloned().collect()
    }
}

pub fn default_capability_registry(config: &StylistConfig) -> CapabilityRegistry {
    let mut capabilities = CapabilityRegistry::new();
    capabilities.register(DryrunCapability::new());
    capabilities.register(GeminiCapability::new(config));
    capabilities
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use stylist_contracts::ImagePayload;

    use super::*;

    fn failure(outcome: CapabilityOutcome) -> (FailureKind, String, Option<String>) {
        match outcome {
            CapabilityOutcome::Failed {
                kind,
                message,
                detail,
            } => (kind, message, detail),
            CapabilityOutcome::Image(_) => panic!("expected a failure"),
        }
    }

    #[test]
    fn success_with_bytes_is_an_image() {
        let outcome = resolve_outcome(
            Ok(ImageResult::Success(ImagePayload::png(vec![1, 2]))),
            GENERIC_GENERATION_FAILURE,
        );
        assert!(matches!(outcome, CapabilityOutcome::Image(image) if image.bytes == vec![1, 2]));
    }

    #[test]
    fn refusal_text_is_kept_verbatim() {
        let (kind, message, _) = failure(resolve_outcome(
            Ok(ImageResult::Refusal("policy violation: X".to_string())),
            GENERIC_GENERATION_FAILURE,
        ));
        assert_eq!(kind, FailureKind::Refusal);
        assert_eq!(message, "policy violation: X");
    }

    #[test]
    fn empty_and_blank_results_use_generic_message() {
        for result in [
            ImageResult::Empty,
            ImageResult::Refusal("   ".to_string()),
            ImageResult::Success(ImagePayload::png(Vec::new())),
        ] {
            let (kind, message, _) = failure(resolve_outcome(Ok(result), GENERIC_EDIT_FAILURE));
            assert_eq!(kind, FailureKind::EmptyResponse);
            assert_eq!(message, GENERIC_EDIT_FAILURE);
        }
    }

    #[test]
    fn transport_errors_hide_detail_from_message() {
        let err = anyhow!("connection reset").context("Gemini request failed");
        let (kind, message, detail) = failure(resolve_outcome(Err(err), GENERIC_GENERATION_FAILURE));
        assert_eq!(kind, FailureKind::Transport);
        assert_eq!(message, GENERIC_GENERATION_FAILURE);
        assert_eq!(
            detail.as_deref(),
            Some("Gemini request failed | caused by: connection reset")
        );
    }

    #[test]
    fn default_registry_lists_builtin_capabilities() {
        let registry = default_capability_registry(&StylistConfig::default());
        assert_eq!(registry.names(), vec!["dryrun", "gemini"]);
        assert!(registry.get("dryrun").is_some());
        assert!(registry.get("stability").is_none());
    }
}
