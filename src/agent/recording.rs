//! Animated GIF of a run, built from the per-step page snapshots

use image::codecs::gif::{GifEncoder, Repeat};
use image::imageops::{self, FilterType};
use image::{Delay, Frame, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

const FRAME_DELAY_MS: u32 = 1000;

/// Collects snapshots during a run and writes them out as a GIF.
///
/// Every failure here is logged and swallowed; a broken recording never
/// changes the outcome of a run.
pub struct GifRecorder {
    path: PathBuf,
    frames: Vec<RgbaImage>,
}

impl GifRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frames: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Add a PNG snapshot as the next frame
    pub fn push_png(&mut self, png: &[u8]) {
        match image::load_from_memory(png) {
            Ok(img) => {
                let mut frame = img.to_rgba8();
                // All frames share the first frame's size
                if let Some(first) = self.frames.first() {
                    if frame.dimensions() != first.dimensions() {
                        frame = imageops::resize(&frame, first.width(), first.height(), FilterType::Triangle);
                    }
                }
                self.frames.push(frame);
            }
            Err(e) => log::warn!("Skipping unreadable snapshot for the recording: {}", e),
        }
    }

    /// Write the GIF. Returns whether a file was written.
    pub fn finish(self) -> bool {
        if self.frames.is_empty() {
            log::debug!("No frames recorded, not writing {}", self.path.display());
            return false;
        }

        let frame_count = self.frames.len();
        match write_gif(&self.path, self.frames) {
            Ok(()) => {
                log::info!("Wrote run recording ({} frames) to {}", frame_count, self.path.display());
                true
            }
            Err(e) => {
                log::warn!("Failed to write run recording to {}: {}", self.path.display(), e);
                false
            }
        }
    }
}

fn write_gif(path: &Path, frames: Vec<RgbaImage>) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let mut encoder = GifEncoder::new(BufWriter::new(file));
    encoder.set_repeat(Repeat::Infinite)?;
    encoder.encode_frames(
        frames
            .into_iter()
            .map(|buffer| Frame::from_parts(buffer, 0, 0, Delay::from_numer_denom_ms(FRAME_DELAY_MS, 1))),
    )?;
    Ok(())
}
