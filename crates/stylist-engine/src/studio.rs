use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::json;
use stylist_contracts::events::{EventKind, EventWriter};
use stylist_contracts::{ColorTheme, ResultRecord, SourceItem, Style};

use crate::capability::ImageCapability;
use crate::edit_session::{write_download, ApplyOutcome, EditSession};
use crate::map_object;
use crate::orchestrator::Orchestrator;

/// Top-level stylist state: the current upload, the three style records and at
/// most one open edit session.
pub struct Studio {
    events: EventWriter,
    orchestrator: Orchestrator,
    source: Option<SourceItem>,
    edit: Option<EditSession>,
}

impl Studio {
    pub fn new(capability: Arc<dyn ImageCapability>, events: EventWriter) -> Result<Self> {
        events.emit(
            EventKind::SessionStarted,
            map_object(json!({ "capability": capability.name() })),
        )?;
        Ok(Self {
            orchestrator: Orchestrator::new(capability, events.clone()),
            events,
            source: None,
            edit: None,
        })
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn source(&self) -> Option<&SourceItem> {
        self.source.as_ref()
    }

    pub fn edit_session(&self) -> Option<&EditSession> {
        self.edit.as_ref()
    }

    pub fn record(&self, style: Style) -> Result<ResultRecord> {
        self.orchestrator.record(style)
    }

    pub fn snapshot(&self) -> Result<Vec<ResultRecord>> {
        self.orchestrator.snapshot()
    }

    pub fn upload_path(&mut self, path: &Path) -> Result<Option<String>> {
        let item = SourceItem::from_path(path)?;
        self.upload(item)
    }

    /// Replaces the current source and starts generating all three styles.
    /// Returns the size advisory for oversized uploads. If the fan-out fails the
    /// studio is left with no source.
    pub fn upload(&mut self, item: SourceItem) -> Result<Option<String>> {
        self.close_edit();
        let advisory = item.size_advisory();
        self.events.emit(
            EventKind::SourceUploaded,
            map_object(json!({
                "source_id": item.id,
                "file_name": item.file_name,
                "mime_type": item.image.mime_type,
                "bytes": item.image.len(),
                "image_digest": item.image.digest(),
                "advisory": advisory,
            })),
        )?;
        if let Err(err) = self.orchestrator.generate_all(&item) {
            self.source = None;
            let _ = self.orchestrator.reset();
            return Err(err);
        }
        self.source = Some(item);
        Ok(advisory)
    }

    pub fn clear_source(&mut self) -> Result<()> {
        self.close_edit();
        let previous = self.source.take();
        self.orchestrator.reset()?;
        self.events.emit(
            EventKind::SourceCleared,
            map_object(json!({
                "source_id": previous.map(|item| item.id),
            })),
        )?;
        Ok(())
    }

    pub fn retry(&self, style: Style) -> Result<()> {
        if self.edit.as_ref().map(EditSession::style) == Some(style) {
            bail!("Close the {} edit session before retrying.", style.label());
        }
        self.orchestrator.retry(self.source.as_ref(), style)
    }

    /// Opens an edit session on a Ready record, replacing any open session.
    pub fn open_edit(&mut self, style: Style) -> Result<&EditSession> {
        let registry = self.orchestrator.registry();
        let session = EditSession::open(&registry, style, self.events.clone())?;
        self.close_edit();
        Ok(&*self.edit.insert(session))
    }

    pub fn set_instruction(&mut self, text: &str) -> Result<()> {
        self.session_mut()?.set_instruction(text);
        Ok(())
    }

    /// Pre-fills the instruction from a preset; nothing is sent until `apply_edit`.
    pub fn apply_theme(&mut self, theme: ColorTheme) -> Result<()> {
        self.session_mut()?.apply_theme(theme);
        Ok(())
    }

    pub fn apply_edit(&mut self) -> Result<ApplyOutcome> {
        let capability = self.orchestrator.capability();
        let registry = self.orchestrator.registry();
        self.session_mut()?.apply(capability.as_ref(), &registry)
    }

    pub fn close_edit(&mut self) -> bool {
        match self.edit.take() {
            Some(session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    /// Saves the open session's working image, or a Ready record's image, as
    /// `virtual-stylist-{style}.png` under `dir`.
    pub fn download(&self, style: Option<Style>, dir: &Path) -> Result<PathBuf> {
        let (style, path) = match (&self.edit, style) {
            (Some(session), None) => (session.style(), session.download_to(dir)?),
            (Some(session), Some(style)) if session.style() == style => {
                (style, session.download_to(dir)?)
            }
            (_, Some(style)) => {
                let record = self.record(style)?;
                let Some(image) = record.image.as_ref().filter(|_| record.is_ready()) else {
                    bail!("{} has no finished outfit to download.", style.label());
                };
                (style, write_download(dir, style, image)?)
            }
            (None, None) => bail!("Choose a style to download."),
        };
        self.events.emit(
            EventKind::ImageDownloaded,
            map_object(json!({
                "style": style.slug(),
                "path": path.to_string_lossy(),
            })),
        )?;
        Ok(path)
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.orchestrator.wait_idle()
    }

    fn session_mut(&mut self) -> Result<&mut EditSession> {
        match self.edit.as_mut() {
            Some(session) => Ok(session),
            None => bail!("No edit session is open. Pick a finished outfit first."),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::thread;

    use serde_json::Value;
    use stylist_contracts::{ImagePayload, RecordStatus};

    use super::*;
    use crate::capability::ImageResult;
    use crate::testing::{tagged_image, Scripted, ScriptedCapability};
    use crate::GENERIC_GENERATION_FAILURE;

    fn studio(capability: &Arc<ScriptedCapability>, events: EventWriter) -> Result<Studio> {
        let shared: Arc<dyn ImageCapability> = capability.clone();
        Studio::new(shared, events)
    }

    fn upload_and_wait(studio: &mut Studio, tag: &str) -> Result<SourceItem> {
        let item = SourceItem::from_bytes(tag.as_bytes().to_vec(), "image/jpeg")?;
        studio.upload(item.clone())?;
        studio.wait_idle()?;
        Ok(item)
    }

    fn event_types(path: &Path) -> Result<Vec<String>> {
        let raw = fs::read_to_string(path)?;
        raw.lines()
            .map(|line| {
                let event: Value = serde_json::from_str(line)?;
                Ok(event["type"].as_str().unwrap_or_default().to_string())
            })
            .collect()
    }

    #[test]
    fn upload_generates_all_three_styles() -> Result<()> {
        let capability = Arc::new(ScriptedCapability::new());
        let mut studio = studio(&capability, EventWriter::detached("test"))?;
        let item = upload_and_wait(&mut studio, "jacket")?;

        assert_eq!(studio.source().map(|source| source.id.as_str()), Some(item.id.as_str()));
        for record in studio.snapshot()? {
            assert_eq!(record.status, RecordStatus::Ready);
        }
        assert_eq!(capability.calls().len(), 3);
        Ok(())
    }

    #[test]
    fn upload_path_reports_advisory_only_for_large_files() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("item.jpg");
        fs::write(&path, b"not really a jpeg")?;

        let capability = Arc::new(ScriptedCapability::new());
        let mut studio = studio(&capability, EventWriter::detached("test"))?;
        assert_eq!(studio.upload_path(&path)?, None);
        studio.wait_idle()?;
        assert_eq!(
            studio.source().map(|source| source.image.mime_type.as_str()),
            Some("image/jpeg")
        );

        let big = SourceItem::from_bytes(vec![0u8; 11 * 1024 * 1024], "image/png")?;
        assert!(studio.upload(big)?.is_some());
        studio.wait_idle()?;
        Ok(())
    }

    #[test]
    fn non_image_upload_is_rejected_without_touching_records() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("notes.txt");
        fs::write(&path, b"hello")?;

        let capability = Arc::new(ScriptedCapability::new());
        let mut studio = studio(&capability, EventWriter::detached("test"))?;
        assert!(studio.upload_path(&path).is_err());
        assert!(studio.source().is_none());
        for record in studio.snapshot()? {
            assert_eq!(record.status, RecordStatus::Idle);
        }
        assert!(capability.calls().is_empty());
        Ok(())
    }

    #[test]
    fn failed_fan_out_leaves_no_stale_source() -> Result<()> {
        let capability = Arc::new(ScriptedCapability::new());
        let mut studio = studio(&capability, EventWriter::detached("test"))?;
        upload_and_wait(&mut studio, "first")?;
        studio.open_edit(Style::Casual)?;

        let registry = studio.orchestrator().registry();
        let _ = thread::spawn(move || {
            let _guard = registry.lock();
            panic!("registry poisoned");
        })
        .join();

        let replacement = SourceItem::from_bytes(b"second".to_vec(), "image/jpeg")?;
        assert!(studio.upload(replacement).is_err());
        assert!(studio.source().is_none());
        assert!(studio.edit_session().is_none());
        let err = studio
            .retry(Style::Business)
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(err.contains("Upload an item"));
        Ok(())
    }

    #[test]
    fn clear_source_resets_records_and_closes_edit() -> Result<()> {
        let capability = Arc::new(ScriptedCapability::new());
        let mut studio = studio(&capability, EventWriter::detached("test"))?;
        upload_and_wait(&mut studio, "scarf")?;
        studio.open_edit(Style::Casual)?;

        studio.clear_source()?;
        assert!(studio.source().is_none());
        assert!(studio.edit_session().is_none());
        for record in studio.snapshot()? {
            assert_eq!(record.status, RecordStatus::Idle);
            assert!(record.image.is_none());
        }
        assert!(studio.retry(Style::Casual).is_err());
        Ok(())
    }

    #[test]
    fn retry_is_refused_while_editing_that_style() -> Result<()> {
        let capability = Arc::new(ScriptedCapability::new());
        capability.script(
            Style::Business,
            Scripted::Result(ImageResult::Empty),
        );
        let mut studio = studio(&capability, EventWriter::detached("test"))?;
        upload_and_wait(&mut studio, "blazer")?;
        assert_eq!(
            studio.record(Style::Business)?.error_message.as_deref(),
            Some(GENERIC_GENERATION_FAILURE)
        );

        studio.open_edit(Style::Casual)?;
        assert!(studio.retry(Style::Casual).is_err());

        studio.retry(Style::Business)?;
        studio.wait_idle()?;
        assert_eq!(studio.record(Style::Business)?.status, RecordStatus::Ready);
        Ok(())
    }

    #[test]
    fn edit_round_trip_persists_after_close_and_reopen() -> Result<()> {
        let capability = Arc::new(ScriptedCapability::new());
        let mut studio = studio(&capability, EventWriter::detached("test"))?;
        upload_and_wait(&mut studio, "dress")?;

        assert!(studio.open_edit(Style::Business).is_ok());
        studio.set_instruction("make the tie red")?;
        assert_eq!(
            studio.apply_edit()?,
            ApplyOutcome::Applied { committed: true }
        );
        assert!(studio.close_edit());

        let record = studio.record(Style::Business)?;
        let edited = record.image.clone();
        assert_eq!(record.status, RecordStatus::Ready);
        assert!(edited
            .as_ref()
            .map(|image| image.bytes.starts_with(b"edit-"))
            .unwrap_or(false));

        let reopened = studio.open_edit(Style::Business)?;
        assert_eq!(reopened.working_image(), edited.as_ref());
        Ok(())
    }

    #[test]
    fn edit_requires_an_open_session_and_ready_record() -> Result<()> {
        let capability = Arc::new(ScriptedCapability::new());
        capability.script(Style::NightOut, Scripted::Transport("timed out"));
        let mut studio = studio(&capability, EventWriter::detached("test"))?;
        assert!(studio.apply_edit().is_err());
        assert!(studio.apply_theme(ColorTheme::Warm).is_err());

        upload_and_wait(&mut studio, "boots")?;
        assert!(studio.open_edit(Style::NightOut).is_err());
        assert!(studio.edit_session().is_none());
        Ok(())
    }

    #[test]
    fn opening_another_style_replaces_the_session() -> Result<()> {
        let capability = Arc::new(ScriptedCapability::new());
        let mut studio = studio(&capability, EventWriter::detached("test"))?;
        upload_and_wait(&mut studio, "coat")?;

        studio.open_edit(Style::Casual)?;
        studio.apply_theme(ColorTheme::Monochrome)?;
        studio.open_edit(Style::NightOut)?;
        let session = studio.edit_session();
        assert_eq!(session.map(EditSession::style), Some(Style::NightOut));
        assert_eq!(session.map(EditSession::instruction), Some(""));
        Ok(())
    }

    #[test]
    fn new_upload_closes_the_edit_session() -> Result<()> {
        let capability = Arc::new(ScriptedCapability::new());
        let mut studio = studio(&capability, EventWriter::detached("test"))?;
        upload_and_wait(&mut studio, "first")?;
        studio.open_edit(Style::Casual)?;

        upload_and_wait(&mut studio, "second")?;
        assert!(studio.edit_session().is_none());
        let casual = studio.record(Style::Casual)?;
        assert!(casual
            .image
            .map(|image| image.bytes.starts_with(b"casual:second:"))
            .unwrap_or(false));
        Ok(())
    }

    #[test]
    fn download_prefers_the_working_image() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let capability = Arc::new(ScriptedCapability::new());
        capability.script_edit(Scripted::Result(ImageResult::Success(tagged_image("edited"))));
        let mut studio = studio(&capability, EventWriter::detached("test"))?;
        assert!(studio.download(Some(Style::Casual), temp.path()).is_err());
        upload_and_wait(&mut studio, "tee")?;

        let path = studio.download(Some(Style::Business), temp.path())?;
        assert!(path.ends_with("virtual-stylist-business.png"));
        assert!(fs::read(&path)?.starts_with(b"business:tee:"));

        studio.open_edit(Style::Casual)?;
        studio.set_instruction("brighter")?;
        studio.apply_edit()?;
        let path = studio.download(None, temp.path())?;
        assert!(path.ends_with("virtual-stylist-casual.png"));
        assert_eq!(fs::read(&path)?, b"edited".to_vec());
        Ok(())
    }

    #[test]
    fn session_events_are_written_to_jsonl() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let capability = Arc::new(ScriptedCapability::new());
        capability.script_edit(Scripted::Result(ImageResult::Refusal("no".to_string())));
        let mut studio = studio(&capability, EventWriter::new(&events_path, "sess-1"))?;

        upload_and_wait(&mut studio, "hat")?;
        studio.open_edit(Style::Casual)?;
        studio.set_instruction("add a feather")?;
        studio.apply_edit()?;
        studio.close_edit();
        studio.clear_source()?;

        let types = event_types(&events_path)?;
        assert_eq!(types.first().map(String::as_str), Some("session_started"));
        assert_eq!(types.get(1).map(String::as_str), Some("source_uploaded"));
        let count = |name: &str| types.iter().filter(|kind| kind.as_str() == name).count();
        assert_eq!(count("generation_started"), 3);
        assert_eq!(count("generation_ready"), 3);
        assert_eq!(count("edit_session_opened"), 1);
        assert_eq!(count("edit_failed"), 1);
        assert_eq!(count("edit_session_closed"), 1);
        assert_eq!(types.last().map(String::as_str), Some("source_cleared"));

        let raw = fs::read_to_string(&events_path)?;
        for line in raw.lines() {
            let event: Value = serde_json::from_str(line)?;
            assert_eq!(event["session_id"], json!("sess-1"));
        }
        Ok(())
    }

    #[test]
    fn failed_edit_leaves_the_record_alone() -> Result<()> {
        let capability = Arc::new(ScriptedCapability::new());
        capability.script_edit(Scripted::Transport("503"));
        let mut studio = studio(&capability, EventWriter::detached("test"))?;
        upload_and_wait(&mut studio, "belt")?;
        let before: Option<ImagePayload> = studio.record(Style::NightOut)?.image;

        studio.open_edit(Style::NightOut)?;
        studio.set_instruction("gold accents")?;
        assert!(matches!(studio.apply_edit()?, ApplyOutcome::Failed { .. }));
        assert_eq!(studio.record(Style::NightOut)?.image, before);
        assert_eq!(
            studio.edit_session().and_then(EditSession::last_error),
            Some(crate::GENERIC_EDIT_FAILURE)
        );
        Ok(())
    }
}
