//! Model configuration, parsed from the `config.json` shipped with the
//! Hugging Face MusicGen checkpoints.

use anyhow::{Context, Result};
use candle_nn::Activation;
use candle_transformers::models::{encodec, t5};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;

/// Generation defaults, matching the reference MusicGen settings.
pub mod defaults {
    /// Hugging Face repository loaded when no model is given
    pub const MODEL_REPO: &str = "facebook/musicgen-small";
    /// Output sample rate of the EnCodec codec used by MusicGen
    pub const SAMPLE_RATE: u32 = 32_000;
    /// Seconds of audio produced per request
    pub const DURATION_SECS: f64 = 15.0;
    /// Classifier-free guidance coefficient
    pub const GUIDANCE_SCALE: f64 = 3.0;
    /// Number of candidates kept by top-k sampling
    pub const TOP_K: usize = 250;
    pub const TEMPERATURE: f64 = 1.0;
    /// EOS id appended by the T5 tokenizer
    pub const T5_EOS_TOKEN_ID: u32 = 1;
}

/// Sampling settings, fixed for the lifetime of a loaded model
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub duration_secs: f64,
    pub guidance_scale: f64,
    pub top_k: usize,
    pub temperature: f64,
    /// `None` draws a fresh seed for every generation
    pub seed: Option<u64>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            duration_secs: defaults::DURATION_SECS,
            guidance_scale: defaults::GUIDANCE_SCALE,
            top_k: defaults::TOP_K,
            temperature: defaults::TEMPERATURE,
            seed: None,
        }
    }
}

/// Decoder section of the MusicGen config
#[derive(Debug, Clone, Deserialize)]
pub struct DecoderConfig {
    #[serde(default = "default_vocab_size")]
    pub vocab_size: usize,
    #[serde(default = "default_max_position_embeddings")]
    pub max_position_embeddings: usize,
    #[serde(default = "default_num_hidden_layers")]
    pub num_hidden_layers: usize,
    #[serde(default = "default_ffn_dim")]
    pub ffn_dim: usize,
    #[serde(default = "default_num_attention_heads")]
    pub num_attention_heads: usize,
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    #[serde(default = "default_num_codebooks")]
    pub num_codebooks: usize,
    #[serde(default = "default_special_token_id")]
    pub pad_token_id: u32,
    #[serde(default = "default_special_token_id")]
    pub bos_token_id: u32,
    #[serde(default)]
    pub activation_function: Activation,
    #[serde(default)]
    pub scale_embedding: bool,
    #[serde(default = "default_audio_channels")]
    pub audio_channels: usize,
}

fn default_vocab_size() -> usize {
    2048
}

fn default_max_position_embeddings() -> usize {
    2048
}

fn default_num_hidden_layers() -> usize {
    24
}

fn default_ffn_dim() -> usize {
    4096
}

fn default_num_attention_heads() -> usize {
    16
}

fn default_hidden_size() -> usize {
    1024
}

fn default_num_codebooks() -> usize {
    4
}

fn default_special_token_id() -> u32 {
    2048
}

fn default_audio_channels() -> usize {
    1
}

impl DecoderConfig {
    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }
}

/// Full MusicGen configuration (text encoder, decoder and audio codec)
#[derive(Debug, Clone)]
pub struct MusicgenConfig {
    pub decoder: DecoderConfig,
    pub text_encoder: t5::Config,
    pub audio_encoder: encodec::Config,
}

#[derive(Deserialize)]
struct RawConfig {
    decoder: DecoderConfig,
    text_encoder: t5::Config,
    audio_encoder: Value,
}

impl MusicgenConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(json).context("invalid MusicGen config")?;
        let audio_encoder = serde_json::from_value(with_encodec_defaults(raw.audio_encoder))
            .context("invalid audio_encoder section in MusicGen config")?;

        if raw.decoder.hidden_size % raw.decoder.num_attention_heads != 0 {
            anyhow::bail!(
                "hidden_size {} is not divisible by num_attention_heads {}",
                raw.decoder.hidden_size,
                raw.decoder.num_attention_heads
            );
        }

        Ok(Self {
            decoder: raw.decoder,
            text_encoder: raw.text_encoder,
            audio_encoder,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        Self::from_json(&json)
    }

    pub fn sample_rate(&self) -> usize {
        self.audio_encoder.sampling_rate
    }

    /// Codec frames per second of audio
    pub fn frame_rate(&self) -> usize {
        let hop_length: usize = self.audio_encoder.upsampling_ratios.iter().product();
        self.audio_encoder.sampling_rate / hop_length.max(1)
    }
}

/// Older checkpoints omit some EnCodec keys; fill them with the
/// transformers defaults so the codec config deserializes. The
/// snake_case enum spellings used by transformers are mapped onto the
/// variant names candle expects.
fn with_encodec_defaults(mut section: Value) -> Value {
    let defaults = json!({
        "target_bandwidths": [1.5, 3.0, 6.0, 12.0, 24.0],
        "sampling_rate": 24000,
        "audio_channels": 1,
        "normalize": false,
        "chunk_length_s": null,
        "overlap": null,
        "hidden_size": 128,
        "num_filters": 32,
        "num_residual_layers": 1,
        "upsampling_ratios": [8, 5, 4, 2],
        "norm_type": "WeightNorm",
        "kernel_size": 7,
        "last_kernel_size": 7,
        "residual_kernel_size": 3,
        "dilation_growth_rate": 2,
        "use_causal_conv": true,
        "pad_mode": "Reflect",
        "compress": 2,
        "num_lstm_layers": 2,
        "trim_right_ratio": 1.0,
        "codebook_size": 1024,
        "codebook_dim": null,
        "use_conv_shortcut": true,
    });

    if let (Value::Object(map), Value::Object(defaults)) = (&mut section, defaults) {
        for (key, value) in defaults {
            map.entry(key).or_insert(value);
        }
        for key in ["norm_type", "pad_mode"] {
            if let Some(Value::String(name)) = map.get_mut(key) {
                *name = variant_name(name);
            }
        }
    }
    section
}

/// `weight_norm` -> `WeightNorm`, `none` -> `None`; already-cased names pass through
fn variant_name(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
