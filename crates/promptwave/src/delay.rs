//! Codebook delay pattern.
//!
//! Codebook `k` runs `k` steps behind codebook 0, so producing `frames`
//! codec frames takes `frames + K - 1` decoder steps. Outside its active
//! window a codebook is forced to the pad token.

use anyhow::Result;
use candle_core::{Device, Tensor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayPattern {
    pub num_codebooks: usize,
    pub frames: usize,
    pub pad_token_id: u32,
}

impl DelayPattern {
    pub fn new(num_codebooks: usize, frames: usize, pad_token_id: u32) -> Self {
        Self {
            num_codebooks,
            frames,
            pad_token_id,
        }
    }

    /// Decoder steps needed to emit every frame of every codebook
    pub fn total_steps(&self) -> usize {
        if self.frames == 0 {
            return 0;
        }
        self.frames + self.num_codebooks - 1
    }

    /// Whether codebook `k` produces a real token at `step`
    pub fn is_active(&self, step: usize, k: usize) -> bool {
        k <= step && step < self.frames + k
    }

    /// Replace the tokens of inactive codebooks with the pad token
    pub fn mask_step(&self, step: usize, tokens: &mut [u32]) {
        for (k, token) in tokens.iter_mut().enumerate() {
            if !self.is_active(step, k) {
                *token = self.pad_token_id;
            }
        }
    }

    /// Realign per-step tokens (`[steps][K]`) into frame-aligned codes,
    /// returned as a `[1, K, frames]` u32 tensor.
    pub fn undelay(&self, steps: &[Vec<u32>], device: &Device) -> Result<Tensor> {
        if steps.len() < self.total_steps() {
            anyhow::bail!(
                "need {} decoder steps to undelay {} frames, got {}",
                self.total_steps(),
                self.frames,
                steps.len()
            );
        }

        let mut codes = Vec::with_capacity(self.num_codebooks * self.frames);
        for k in 0..self.num_codebooks {
            for frame in 0..self.frames {
                let step = &steps[frame + k];
                let token = step.get(k).copied().ok_or_else(|| {
                    anyhow::anyhow!("step {} has no token for codebook {}", frame + k, k)
                })?;
                codes.push(token);
            }
        }
        Ok(Tensor::from_vec(
            codes,
            (1, self.num_codebooks, self.frames),
            device,
        )?)
    }
}

/// Number of codec frames for `duration_secs` of audio
pub fn frames_for(duration_secs: f64, frame_rate: usize) -> usize {
    (duration_secs.max(0.0) * frame_rate as f64).round() as usize
}
