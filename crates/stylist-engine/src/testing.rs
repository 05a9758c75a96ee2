use std::collections::{HashMap, VecDeque};
use std::sync::{mpsc, Mutex};

use anyhow::{anyhow, Result};
use stylist_contracts::{ImagePayload, Style};

use crate::capability::{ImageCapability, ImageResult};

pub(crate) enum Scripted {
    Result(ImageResult),
    Transport(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedCall {
    pub op: &'static str,
    pub style: Option<Style>,
    pub instruction: String,
    pub input: ImagePayload,
}

/// In-process capability with per-style scripted answers and optional gates that
/// hold a call open until the test releases it. Unscripted calls succeed with a
/// style-tagged image.
#[derive(Default)]
pub(crate) struct ScriptedCapability {
    generate: Mutex<HashMap<Style, VecDeque<Scripted>>>,
    edits: Mutex<VecDeque<Scripted>>,
    gates: Mutex<HashMap<Style, mpsc::Receiver<()>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedCapability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, style: Style, answer: Scripted) {
        if let Ok(mut generate) = self.generate.lock() {
            generate.entry(style).or_default().push_back(answer);
        }
    }

    pub fn script_edit(&self, answer: Scripted) {
        if let Ok(mut edits) = self.edits.lock() {
            edits.push_back(answer);
        }
    }

    /// The next generate call for `style` blocks until the returned sender fires
    /// (or is dropped).
    pub fn gate(&self, style: Style) -> mpsc::Sender<()> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut gates) = self.gates.lock() {
            gates.insert(style, rx);
        }
        tx
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn record(&self, op: &'static str, style: Option<Style>, image: &ImagePayload, instruction: &str) -> usize {
        let Ok(mut calls) = self.calls.lock() else {
            return 0;
        };
        calls.push(RecordedCall {
            op,
            style,
            instruction: instruction.to_string(),
            input: image.clone(),
        });
        calls.len()
    }
}

pub(crate) fn style_from_instruction(instruction: &str) -> Option<Style> {
    Style::ALL
        .into_iter()
        .find(|style| instruction.contains(&format!("\"{}\" occasion", style.label())))
}

pub(crate) fn tagged_image(tag: &str) -> ImagePayload {
    ImagePayload::png(tag.as_bytes().to_vec())
}

fn answer(scripted: Scripted) -> Result<ImageResult> {
    match scripted {
        Scripted::Result(result) => Ok(result),
        Scripted::Transport(message) => Err(anyhow!(message)),
    }
}

impl ImageCapability for ScriptedCapability {
    fn name(&self) -> &str {
        "scripted"
    }

    fn style_generate(&self, image: &ImagePayload, instruction: &str) -> Result<ImageResult> {
        let style = style_from_instruction(instruction)
            .ok_or_else(|| anyhow!("instruction does not name a style"))?;
        let call_no = self.record("generate", Some(style), image, instruction);

        let gate = self
            .gates
            .lock()
            .ok()
            .and_then(|mut gates| gates.remove(&style));
        if let Some(gate) = gate {
            let _ = gate.recv();
        }

        let scripted = self
            .generate
            .lock()
            .ok()
            .and_then(|mut generate| generate.get_mut(&style).and_then(VecDeque::pop_front));
        match scripted {
            Some(scripted) => answer(scripted),
            None => Ok(ImageResult::Success(tagged_image(&format!(
                "{}:{}:{call_no}",
                style.slug(),
                String::from_utf8_lossy(&image.bytes)
            )))),
        }
    }

    fn edit(&self, image: &ImagePayload, instruction: &str) -> Result<ImageResult> {
        let call_no = self.record("edit", None, image, instruction);
        let scripted = self
            .edits
            .lock()
            .ok()
            .and_then(|mut edits| edits.pop_front());
        match scripted {
            Some(scripted) => answer(scripted),
            None => Ok(ImageResult::Success(tagged_image(&format!("edit-{call_no}")))),
        }
    }
}
