use std::io::Cursor;

use anyhow::{Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};
use stylist_contracts::styles::edit_instruction;
use stylist_contracts::ImagePayload;

use crate::capability::{ImageCapability, ImageResult};

const DRYRUN_SIZE: u32 = 64;

/// Offline capability: answers every call with a flat PNG whose colour is derived
/// from the instruction and the input image, so each style gets its own image.
#[derive(Debug, Clone, Default)]
pub struct DryrunCapability;

impl DryrunCapability {
    pub fn new() -> Self {
        Self
    }

    fn render(&self, image: &ImagePayload, prompt: &str) -> Result<ImageResult> {
        let (r, g, b) = color_from_prompt(prompt, &image.bytes);
        let canvas = RgbImage::from_pixel(DRYRUN_SIZE, DRYRUN_SIZE, Rgb([r, g, b]));
        let mut bytes = Vec::new();
        canvas
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .context("dryrun PNG encode failed")?;
        Ok(ImageResult::Success(ImagePayload::png(bytes)))
    }
}

impl ImageCapability for DryrunCapability {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn style_generate(&self, image: &ImagePayload, instruction: &str) -> Result<ImageResult> {
        self.render(image, instruction)
    }

    fn edit(&self, image: &ImagePayload, instruction: &str) -> Result<ImageResult> {
        self.render(image, &edit_instruction(instruction))
    }
}

fn color_from_prompt(prompt: &str, input: &[u8]) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(input);
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}
