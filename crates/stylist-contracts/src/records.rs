use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::styles::Style;

pub const ADVISORY_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Encoded image bytes plus their mime type. Never decoded by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn png(bytes: Vec<u8>) -> Self {
        Self::new(bytes, "image/png")
    }

    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// The uploaded clothing item. `id` is the identity generation tasks are tagged with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    pub id: String,
    pub image: ImagePayload,
    pub file_name: Option<String>,
}

impl SourceItem {
    pub fn from_bytes(bytes: Vec<u8>, mime_type: &str) -> Result<Self> {
        let mime_type = mime_type.trim().to_ascii_lowercase();
        if !mime_type.starts_with("image/") {
            bail!("Unsupported upload type '{mime_type}'; please choose an image file.");
        }
        if bytes.is_empty() {
            bail!("Uploaded image is empty.");
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            image: ImagePayload::new(bytes, mime_type),
            file_name: None,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let mime_type = mime_for_path(path)
            .map(str::to_string)
            .or_else(|| sniff_mime(&bytes))
            .with_context(|| format!("{} is not a recognised image file", path.display()))?;
        let mut item = Self::from_bytes(bytes, &mime_type)?;
        item.file_name = path
            .file_name()
            .and_then(|value| value.to_str())
            .map(str::to_string);
        Ok(item)
    }

    /// Large uploads are allowed; this only produces the advisory text.
    pub fn size_advisory(&self) -> Option<String> {
        if self.image.len() <= ADVISORY_UPLOAD_BYTES {
            return None;
        }
        Some(format!(
            "Image is {:.1} MB; uploads under 10 MB work best.",
            self.image.len() as f64 / (1024.0 * 1024.0)
        ))
    }
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

fn sniff_mime(bytes: &[u8]) -> Option<String> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type().to_string())
        .filter(|mime| mime.starts_with("image/"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Idle,
    Loading,
    Ready,
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

/// Per-style generation state. Transitions build a fresh record so the registry
/// only ever swaps whole values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub id: String,
    pub style: Style,
    pub image: Option<ImagePayload>,
    pub status: RecordStatus,
    pub error_message: Option<String>,
}

impl ResultRecord {
    pub fn initial(style: Style) -> Self {
        Self {
            id: style.record_id().to_string(),
            style,
            image: None,
            status: RecordStatus::Idle,
            error_message: None,
        }
    }

    /// Clears the error; keeps any previous image so it can stay on screen.
    pub fn loading(&self) -> Self {
        Self {
            status: RecordStatus::Loading,
            error_message: None,
            ..self.clone()
        }
    }

    pub fn ready(&self, image: ImagePayload) -> Self {
        Self {
            image: Some(image),
            status: RecordStatus::Ready,
            error_message: None,
            ..self.clone()
        }
    }

    pub fn failed(&self, message: impl Into<String>) -> Self {
        Self {
            status: RecordStatus::Failed,
            error_message: Some(message.into()),
            ..self.clone()
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == RecordStatus::Ready && self.image.is_some()
    }

    pub fn summary(&self) -> Map<String, Value> {
        let mut row = Map::new();
        row.insert("id".to_string(), json!(self.id));
        row.insert("style".to_string(), json!(self.style.slug()));
        row.insert("status".to_string(), json!(self.status.as_str()));
        row.insert(
            "image_digest".to_string(),
            self.image
                .as_ref()
                .map(|image| Value::String(image.digest()))
                .unwrap_or(Value::Null),
        );
        row.insert(
            "error".to_string(),
            self.error_message
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );
        row
    }
}

/// Single source of truth for rendering: one record per style plus the id of the
/// source item the records currently belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRegistry {
    records: IndexMap<Style, ResultRecord>,
    active_source: Option<String>,
}

impl Default for ResultRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultRegistry {
    pub fn new() -> Self {
        Self {
            records: initial_records()
                .into_iter()
                .map(|record| (record.style, record))
                .collect(),
            active_source: None,
        }
    }

    pub fn get(&self, style: Style) -> &ResultRecord {
        // Constructed with every style and only ever replaced key-for-key.
        &self.records[&style]
    }

    pub fn set(&mut self, style: Style, record: ResultRecord) -> Result<()> {
        if record.style != style {
            bail!(
                "record for {} cannot be stored under {}",
                record.style.label(),
                style.label()
            );
        }
        self.records.insert(style, record);
        Ok(())
    }

    pub fn reset_all(&mut self, records: Vec<ResultRecord>) -> Result<()> {
        let mut next = IndexMap::new();
        for record in records {
            if next.insert(record.style, record).is_some() {
                bail!("reset_all received more than one record for a style");
            }
        }
        if next.len() != Style::ALL.len() {
            bail!("reset_all requires exactly one record per style");
        }
        next.sort_by(|left, _, right, _| left.cmp(right));
        self.records = next;
        Ok(())
    }

    pub fn active_source(&self) -> Option<&str> {
        self.active_source.as_deref()
    }

    pub fn set_active_source(&mut self, source_id: Option<String>) {
        self.active_source = source_id;
    }

    pub fn is_active_source(&self, source_id: &str) -> bool {
        self.active_source.as_deref() == Some(source_id)
    }

    pub fn records(&self) -> Vec<ResultRecord> {
        self.records.values().cloned().collect()
    }
}

pub fn initial_records() -> Vec<ResultRecord> {
    Style::ALL.into_iter().map(ResultRecord::initial).collect()
}
