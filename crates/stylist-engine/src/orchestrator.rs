use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Value};
use stylist_contracts::events::{EventKind, EventWriter};
use stylist_contracts::records::initial_records;
use stylist_contracts::{RecordStatus, ResultRecord, ResultRegistry, SourceItem, Style};

use crate::capability::{
    resolve_outcome, CapabilityOutcome, ImageCapability, GENERIC_GENERATION_FAILURE,
};
use crate::map_object;

/// One in-flight style generation, tagged with the source it was issued against.
struct GenerationTask {
    source_id: String,
    style: Style,
    handle: thread::JoinHandle<()>,
}

/// Fans a source item out to the image capability once per style. Every call runs
/// on its own thread and commits only its own record; there is no join between them.
pub struct Orchestrator {
    registry: Arc<Mutex<ResultRegistry>>,
    capability: Arc<dyn ImageCapability>,
    events: EventWriter,
    tasks: Mutex<Vec<GenerationTask>>,
}

impl Orchestrator {
    pub fn new(capability: Arc<dyn ImageCapability>, events: EventWriter) -> Self {
        Self {
            registry: Arc::new(Mutex::new(ResultRegistry::new())),
            capability,
            events,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> Arc<Mutex<ResultRegistry>> {
        Arc::clone(&self.registry)
    }

    pub fn capability(&self) -> Arc<dyn ImageCapability> {
        Arc::clone(&self.capability)
    }

    pub fn record(&self, style: Style) -> Result<ResultRecord> {
        Ok(lock_registry(&self.registry)?.get(style).clone())
    }

    pub fn snapshot(&self) -> Result<Vec<ResultRecord>> {
        Ok(lock_registry(&self.registry)?.records())
    }

    /// Drops every record back to Idle with no image and detaches the registry
    /// from any source, so late completions are discarded.
    pub fn reset(&self) -> Result<()> {
        let mut registry = lock_registry(&self.registry)?;
        registry.reset_all(initial_records())?;
        registry.set_active_source(None);
        Ok(())
    }

    /// Resets the registry to `source`, marks all styles Loading, then starts one
    /// independent generation per style.
    pub fn generate_all(&self, source: &SourceItem) -> Result<()> {
        {
            let mut registry = lock_registry(&self.registry)?;
            registry.reset_all(initial_records())?;
            registry.set_active_source(Some(source.id.clone()));
            for style in Style::ALL {
                let loading = registry.get(style).loading();
                registry.set(style, loading)?;
            }
        }
        for style in Style::ALL {
            self.generate_one(source, style)?;
        }
        Ok(())
    }

    /// Re-runs a single style against the current source. The other records are
    /// left untouched.
    pub fn retry(&self, source: Option<&SourceItem>, style: Style) -> Result<()> {
        let Some(source) = source else {
            bail!("Upload an item before retrying {}.", style.label());
        };
        if self.record(style)?.status == RecordStatus::Loading {
            bail!("{} is still generating.", style.label());
        }
        self.generate_one(source, style)
    }

    pub fn generate_one(&self, source: &SourceItem, style: Style) -> Result<()> {
        {
            let mut registry = lock_registry(&self.registry)?;
            if !registry.is_active_source(&source.id) {
                bail!("source {} is no longer the active upload", source.id);
            }
            let loading = registry.get(style).loading();
            registry.set(style, loading)?;
        }
        self.events.emit_quiet(
            EventKind::GenerationStarted,
            map_object(json!({
                "source_id": source.id,
                "style": style.slug(),
                "capability": self.capability.name(),
            })),
        );

        self.prune_finished();

        let job = GenerationJob {
            registry: Arc::clone(&self.registry),
            capability: Arc::clone(&self.capability),
            events: self.events.clone(),
            source: source.clone(),
            style,
        };
        let spawned = thread::Builder::new()
            .name(format!("stylist-generate-{}", style.slug()))
            .spawn(move || job.run());
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                let mut registry = lock_registry(&self.registry)?;
                let failed = registry.get(style).failed(GENERIC_GENERATION_FAILURE);
                registry.set(style, failed)?;
                return Err(err).context("failed to spawn generation thread");
            }
        };

        self.tasks
            .lock()
            .map_err(|_| anyhow!("generation task list lock poisoned"))?
            .push(GenerationTask {
                source_id: source.id.clone(),
                style,
                handle,
            });
        Ok(())
    }

    /// Number of generation calls that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.tasks
            .lock()
            .map(|tasks| tasks.iter().filter(|task| !task.handle.is_finished()).count())
            .unwrap_or(0)
    }

    /// Blocks until every outstanding generation has committed (or been discarded).
    pub fn wait_idle(&self) -> Result<()> {
        let tasks = std::mem::take(
            &mut *self
                .tasks
                .lock()
                .map_err(|_| anyhow!("generation task list lock poisoned"))?,
        );
        let mut panicked = Vec::new();
        for task in tasks {
            if task.handle.join().is_err() {
                panicked.push(format!("{} ({})", task.style.label(), task.source_id));
            }
        }
        if !panicked.is_empty() {
            bail!("generation thread panicked: {}", panicked.join(", "));
        }
        Ok(())
    }

    fn prune_finished(&self) {
        let Ok(mut tasks) = self.tasks.lock() else {
            return;
        };
        let (finished, running): (Vec<_>, Vec<_>) =
            tasks.drain(..).partition(|task| task.handle.is_finished());
        *tasks = running;
        for task in finished {
            let _ = task.handle.join();
        }
    }
}

struct GenerationJob {
    registry: Arc<Mutex<ResultRegistry>>,
    capability: Arc<dyn ImageCapability>,
    events: EventWriter,
    source: SourceItem,
    style: Style,
}

impl GenerationJob {
    fn run(self) {
        let started = Instant::now();
        let result = self
            .capability
            .style_generate(&self.source.image, &self.style.generation_instruction());
        let outcome = resolve_outcome(result, GENERIC_GENERATION_FAILURE);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let Ok(mut registry) = lock_registry(&self.registry) else {
            return;
        };
        if !registry.is_active_source(&self.source.id) {
            drop(registry);
            self.events.emit_quiet(
                EventKind::GenerationDiscarded,
                map_object(json!({
                    "source_id": self.source.id,
                    "style": self.style.slug(),
                    "elapsed_ms": elapsed_ms,
                })),
            );
            return;
        }

        let current = registry.get(self.style).clone();
        let (next, kind, mut payload) = match outcome {
            CapabilityOutcome::Image(image) => {
                let digest = image.digest();
                (
                    current.ready(image),
                    EventKind::GenerationReady,
                    map_object(json!({ "image_digest": digest })),
                )
            }
            CapabilityOutcome::Failed {
                kind,
                message,
                detail,
            } => (
                current.failed(message.clone()),
                EventKind::GenerationFailed,
                map_object(json!({
                    "failure_kind": kind.as_str(),
                    "error": message,
                    "detail": detail.map(Value::String).unwrap_or(Value::Null),
                })),
            ),
        };
        if registry.set(self.style, next).is_err() {
            return;
        }
        drop(registry);

        payload.insert("source_id".to_string(), json!(self.source.id));
        payload.insert("style".to_string(), json!(self.style.slug()));
        payload.insert("elapsed_ms".to_string(), json!(elapsed_ms));
        self.events.emit_quiet(kind, payload);
    }
}

pub(crate) fn lock_registry(
    registry: &Mutex<ResultRegistry>,
) -> Result<MutexGuard<'_, ResultRegistry>> {
    registry
        .lock()
        .map_err(|_| anyhow!("result registry lock poisoned"))
}
