use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use stylist_contracts::events::{EventKind, EventWriter};
use stylist_contracts::{ColorTheme, ImagePayload, ResultRegistry, Style};

use crate::capability::{resolve_outcome, CapabilityOutcome, ImageCapability, GENERIC_EDIT_FAILURE};
use crate::map_object;
use crate::orchestrator::lock_registry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Blank instruction, no working image, or an edit already running.
    Skipped,
    /// `committed` is false only when the record's source was replaced mid-edit.
    Applied { committed: bool },
    Failed { message: String },
}

/// Working state for iterative edits on one Ready record.
#[derive(Debug)]
pub struct EditSession {
    style: Style,
    record_id: String,
    source_id: Option<String>,
    working_image: Option<ImagePayload>,
    instruction: String,
    processing: bool,
    last_error: Option<String>,
    events: EventWriter,
}

impl EditSession {
    pub fn open(registry: &Mutex<ResultRegistry>, style: Style, events: EventWriter) -> Result<Self> {
        let (record, source_id) = {
            let registry = lock_registry(registry)?;
            (
                registry.get(style).clone(),
                registry.active_source().map(str::to_string),
            )
        };
        let image = match (record.is_ready(), record.image) {
            (true, Some(image)) => image,
            _ => bail!(
                "{} has no finished outfit to edit yet ({}).",
                style.label(),
                record.status.as_str()
            ),
        };

        events.emit_quiet(
            EventKind::EditSessionOpened,
            map_object(json!({
                "style": style.slug(),
                "record_id": record.id,
                "image_digest": image.digest(),
            })),
        );

        Ok(Self {
            style,
            record_id: record.id,
            source_id,
            working_image: Some(image),
            instruction: String::new(),
            processing: false,
            last_error: None,
            events,
        })
    }

    pub fn style(&self) -> Style {
        self.style
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    pub fn working_image(&self) -> Option<&ImagePayload> {
        self.working_image.as_ref()
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn set_instruction(&mut self, text: impl Into<String>) {
        self.instruction = text.into();
    }

    pub fn apply_theme(&mut self, theme: ColorTheme) {
        self.set_instruction(theme.instruction());
    }

    /// Sends the pending instruction to the capability. A successful edit replaces
    /// the working image and the bound record's image; a failed one only sets
    /// `last_error`. The instruction is cleared either way.
    pub fn apply(
        &mut self,
        capability: &dyn ImageCapability,
        registry: &Mutex<ResultRegistry>,
    ) -> Result<ApplyOutcome> {
        let instruction = self.instruction.trim().to_string();
        if instruction.is_empty() || self.processing {
            return Ok(ApplyOutcome::Skipped);
        }
        let Some(current) = self.working_image.clone() else {
            return Ok(ApplyOutcome::Skipped);
        };

        self.processing = true;
        self.last_error = None;
        let started = Instant::now();
        let outcome = resolve_outcome(capability.edit(&current, &instruction), GENERIC_EDIT_FAILURE);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            CapabilityOutcome::Image(image) => {
                let digest = image.digest();
                let committed = self.commit(registry, &image);
                self.working_image = Some(image);
                committed.map(|committed| {
                    self.events.emit_quiet(
                        EventKind::EditApplied,
                        map_object(json!({
                            "style": self.style.slug(),
                            "instruction": instruction,
                            "image_digest": digest,
                            "committed": committed,
                            "elapsed_ms": elapsed_ms,
                        })),
                    );
                    ApplyOutcome::Applied { committed }
                })
            }
            CapabilityOutcome::Failed {
                kind,
                message,
                detail,
            } => {
                self.last_error = Some(message.clone());
                self.events.emit_quiet(
                    EventKind::EditFailed,
                    map_object(json!({
                        "style": self.style.slug(),
                        "instruction": instruction,
                        "failure_kind": kind.as_str(),
                        "error": message,
                        "detail": detail.map(Value::String).unwrap_or(Value::Null),
                        "elapsed_ms": elapsed_ms,
                    })),
                );
                Ok(ApplyOutcome::Failed { message })
            }
        };

        self.processing = false;
        self.instruction.clear();
        result
    }

    fn commit(&self, registry: &Mutex<ResultRegistry>, image: &ImagePayload) -> Result<bool> {
        let mut registry = lock_registry(registry)?;
        let still_current = match self.source_id.as_deref() {
            Some(source_id) => registry.is_active_source(source_id),
            None => registry.active_source().is_none(),
        };
        if !still_current {
            return Ok(false);
        }
        let next = registry.get(self.style).ready(image.clone());
        registry.set(self.style, next)?;
        Ok(true)
    }

    /// Writes the image currently on display as `virtual-stylist-{style}.png`.
    pub fn download_to(&self, dir: &Path) -> Result<PathBuf> {
        let Some(image) = self.working_image.as_ref() else {
            bail!("Nothing to download for {}.", self.style.label());
        };
        write_download(dir, self.style, image)
    }

    pub fn close(self) {
        self.events.emit_quiet(
            EventKind::EditSessionClosed,
            map_object(json!({
                "style": self.style.slug(),
                "record_id": self.record_id,
            })),
        );
    }
}

pub(crate) fn write_download(dir: &Path, style: Style, image: &ImagePayload) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(style.download_file_name());
    fs::write(&path, &image.bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
