//! MusicGenModel: text prompt in, waveform out.
//!
//! Ties together the T5 text conditioner, the codebook decoder and the
//! EnCodec codec, and runs the guided autoregressive sampling loop.

use crate::conditioners::text::T5Conditioner;
use crate::config::{GenerationParams, MusicgenConfig};
use crate::delay::{DelayPattern, frames_for};
use crate::models::decoder::MusicgenDecoder;
use crate::sampling::{Sampler, apply_guidance};
use crate::state::init_states;
use crate::weights::ModelFiles;

use anyhow::{Context, Result};
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::encodec;
use std::time::Instant;

pub struct MusicGenModel {
    conditioner: T5Conditioner,
    decoder: MusicgenDecoder,
    codec: encodec::Model,
    params: GenerationParams,
    /// Output sample rate (Hz)
    pub sample_rate: usize,
    /// Codec frames per second
    pub frame_rate: usize,
    pad_token_id: u32,
    bos_token_id: u32,
    device: Device,
}

impl MusicGenModel {
    /// Load a checkpoint from a HuggingFace repo id or a local directory
    pub fn load(
        model: &str,
        revision: Option<&str>,
        params: GenerationParams,
        device: &Device,
    ) -> Result<Self> {
        let files = ModelFiles::resolve(model, revision)?;
        Self::from_files(&files, params, device)
    }

    pub fn from_files(
        files: &ModelFiles,
        params: GenerationParams,
        device: &Device,
    ) -> Result<Self> {
        let config = MusicgenConfig::load(&files.config)?;
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&files.weights], DType::F32, device)
                .with_context(|| format!("Failed to map weights {:?}", files.weights))?
        };
        Self::from_config_and_vb(&config, files, params, vb)
    }

    fn from_config_and_vb(
        config: &MusicgenConfig,
        files: &ModelFiles,
        params: GenerationParams,
        vb: VarBuilder,
    ) -> Result<Self> {
        let device = vb.device().clone();

        let conditioner = T5Conditioner::new(
            &files.tokenizer,
            &config.text_encoder,
            config.decoder.hidden_size,
            vb.clone(),
        )?;
        tracing::debug!("text encoder ready");

        let decoder = MusicgenDecoder::new(&config.decoder, "decoder", vb.pp("decoder"))?;
        tracing::debug!(
            "decoder ready ({} layers, {} codebooks)",
            config.decoder.num_hidden_layers,
            config.decoder.num_codebooks
        );

        let codec = encodec::Model::new(&config.audio_encoder, vb.pp("audio_encoder"))?;

        Ok(Self {
            conditioner,
            decoder,
            codec,
            params,
            sample_rate: config.sample_rate(),
            frame_rate: config.frame_rate(),
            pad_token_id: config.decoder.pad_token_id,
            bos_token_id: config.decoder.bos_token_id,
            device,
        })
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    /// Codec frames produced for the configured duration
    pub fn frames(&self) -> usize {
        frames_for(self.params.duration_secs, self.frame_rate)
    }

    /// Decoder steps one generation takes
    pub fn total_steps(&self) -> usize {
        self.delay_pattern().total_steps()
    }

    fn delay_pattern(&self) -> DelayPattern {
        DelayPattern::new(self.decoder.num_codebooks(), self.frames(), self.pad_token_id)
    }

    /// Generate audio for `prompt`; returns a `[1, samples]` CPU tensor
    pub fn generate(&mut self, prompt: &str) -> Result<Tensor> {
        self.generate_with_progress(prompt, &mut |_, _| {})
    }

    /// Like [`generate`](Self::generate), calling `on_step(step, total)`
    /// after every decoder step.
    pub fn generate_with_progress(
        &mut self,
        prompt: &str,
        on_step: &mut dyn FnMut(usize, usize),
    ) -> Result<Tensor> {
        let pattern = self.delay_pattern();
        let total = pattern.total_steps();
        if total == 0 {
            anyhow::bail!(
                "duration {}s is too short to produce any audio",
                self.params.duration_secs
            );
        }
        if total > self.decoder.max_positions() {
            anyhow::bail!(
                "duration {}s needs {} decoder steps, the model supports at most {}",
                self.params.duration_secs,
                total,
                self.decoder.max_positions()
            );
        }

        let start = Instant::now();
        let cond = self.conditioner.forward(prompt)?;
        // Row 0 conditional, row 1 unconditional
        let encoder_states = Tensor::cat(&[&cond, &cond.zeros_like()?], 0)?;
        tracing::debug!("prompt encoded into {} states", cond.dim(1)?);

        let codes = self.decode_codes(&encoder_states, &pattern, on_step)?;
        let pcm = self.codec.decode(&codes)?;
        let audio = pcm.squeeze(0)?.to_device(&Device::Cpu)?.to_dtype(DType::F32)?;

        tracing::debug!(
            "generated {} samples in {:.2?}",
            audio.dim(1)?,
            start.elapsed()
        );
        Ok(audio)
    }

    /// Guided sampling loop; returns frame-aligned codes [1, K, frames]
    fn decode_codes(
        &self,
        encoder_states: &Tensor,
        pattern: &DelayPattern,
        on_step: &mut dyn FnMut(usize, usize),
    ) -> Result<Tensor> {
        let num_codebooks = pattern.num_codebooks;
        let total = pattern.total_steps();
        let seed = self.params.seed.unwrap_or_else(rand::random);
        let mut sampler = Sampler::new(seed, self.params.top_k, self.params.temperature);
        let mut state = init_states();

        let mut input = vec![self.bos_token_id; num_codebooks];
        let mut steps = Vec::with_capacity(total);
        for step in 0..total {
            let ids = Tensor::from_vec(input, (1, num_codebooks, 1), &self.device)?
                .repeat((2, 1, 1))?;
            let logits = self.decoder.forward(&ids, encoder_states, &mut state)?;
            let guided = apply_guidance(&logits.i(0)?, &logits.i(1)?, self.params.guidance_scale)?;

            let mut tokens = sampler.sample(&guided)?;
            pattern.mask_step(step, &mut tokens);
            steps.push(tokens.clone());
            input = tokens;

            on_step(step + 1, total);
        }

        pattern.undelay(&steps, &self.device)
    }
}
