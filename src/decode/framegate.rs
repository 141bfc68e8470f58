//! Perceptual-hash gate that skips decode attempts while the scene is
//! unchanged. A static frame that already missed will miss again, so the
//! loop only pays for a fresh attempt when the hash moves past a threshold
//! or a recheck cooldown elapses.

use std::time::{Duration, Instant};

use image_hasher::{HashAlg, Hasher, HasherConfig, ImageHash};

use crate::capture::source::Frame;

pub struct FrameGate {
    change_threshold: u32,
    recheck_cooldown: Duration,
    hasher: Hasher,
    last_hash: Option<ImageHash>,
    last_attempt: Option<Instant>,
}

impl FrameGate {
    /// A `change_threshold` of 0 disables gating entirely: every frame gets
    /// a decode attempt.
    pub fn new(change_threshold: u32, recheck_cooldown: Duration) -> Self {
        Self {
            change_threshold,
            recheck_cooldown,
            hasher: HasherConfig::new()
                .hash_alg(HashAlg::DoubleGradient)
                .hash_size(8, 8)
                .to_hasher(),
            last_hash: None,
            last_attempt: None,
        }
    }

    /// Decides whether this frame deserves a decode attempt and, if so,
    /// records it as the new comparison baseline.
    pub fn should_attempt(&mut self, frame: &Frame) -> bool {
        if self.change_threshold == 0 {
            return true;
        }

        // An unhashable frame is never gated; the decoder will reject it.
        let Some(luma) = frame.to_luma_image() else {
            return true;
        };
        let hash = self.hasher.hash_image(&image::DynamicImage::ImageLuma8(luma));

        let attempt = match &self.last_hash {
            None => true,
            Some(previous) => {
                hash.dist(previous) >= self.change_threshold || self.cooldown_elapsed()
            }
        };

        if attempt {
            self.last_hash = Some(hash);
            self.last_attempt = Some(Instant::now());
        }

        attempt
    }

    fn cooldown_elapsed(&self) -> bool {
        self.last_attempt
            .map(|at| at.elapsed() >= self.recheck_cooldown)
            .unwrap_or(true)
    }
}
