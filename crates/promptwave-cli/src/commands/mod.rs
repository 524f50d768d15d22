pub mod generate;
pub mod serve;

use anyhow::Result;
use clap::Args;
use promptwave::device::select_device;
use promptwave::{GenerationParams, MusicGenModel, defaults};

/// Model selection and sampling flags shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// HuggingFace repo id or local checkpoint directory
    #[arg(long, env = "PROMPTWAVE_MODEL", default_value = defaults::MODEL_REPO)]
    pub model: String,

    /// Model revision (branch, tag or commit) on the Hub
    #[arg(long)]
    pub revision: Option<String>,

    /// Seconds of audio to generate
    #[arg(long, default_value_t = defaults::DURATION_SECS, value_parser = parse_duration)]
    pub duration: f64,

    /// Classifier-free guidance scale
    #[arg(long, default_value_t = defaults::GUIDANCE_SCALE)]
    pub guidance_scale: f64,

    /// Sample among the k most likely tokens
    #[arg(long, default_value_t = defaults::TOP_K)]
    pub top_k: usize,

    /// Sampling temperature (0 = greedy)
    #[arg(long, default_value_t = defaults::TEMPERATURE)]
    pub temperature: f64,

    /// Random seed for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,

    /// Run on the CPU even when an accelerator is available
    #[arg(long)]
    pub cpu: bool,
}

impl ModelArgs {
    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            duration_secs: self.duration,
            guidance_scale: self.guidance_scale,
            top_k: self.top_k,
            temperature: self.temperature,
            seed: self.seed,
        }
    }

    pub fn load(&self) -> Result<MusicGenModel> {
        let device = select_device(self.cpu);
        tracing::info!(
            "Loading {} on {}",
            self.model,
            promptwave::device::describe(&device)
        );
        MusicGenModel::load(&self.model, self.revision.as_deref(), self.params(), &device)
    }
}

fn parse_duration(s: &str) -> std::result::Result<f64, String> {
    let value: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(format!("duration must be a positive number of seconds, got {}", s));
    }
    Ok(value)
}
