use anyhow::Result;
use candle_core::{DType, IndexOp, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};

/// Classifier-free guidance: `uncond + (cond - uncond) * scale`
pub fn apply_guidance(cond: &Tensor, uncond: &Tensor, scale: f64) -> candle_core::Result<Tensor> {
    uncond + ((cond - uncond)? * scale)?
}

/// Draws one token per codebook from guided logits
pub struct Sampler {
    processor: LogitsProcessor,
}

impl Sampler {
    /// Top-k sampling at `temperature`; a non-positive temperature is greedy.
    pub fn new(seed: u64, top_k: usize, temperature: f64) -> Self {
        let sampling = if temperature <= 0.0 {
            Sampling::ArgMax
        } else if top_k == 0 {
            Sampling::All { temperature }
        } else {
            Sampling::TopK {
                k: top_k,
                temperature,
            }
        };
        Self {
            processor: LogitsProcessor::from_sampling(seed, sampling),
        }
    }

    /// `logits` is [K, vocab]; returns K token ids
    pub fn sample(&mut self, logits: &Tensor) -> Result<Vec<u32>> {
        let logits = logits.to_dtype(DType::F32)?;
        let (codebooks, _vocab) = logits.dims2()?;
        let mut tokens = Vec::with_capacity(codebooks);
        for k in 0..codebooks {
            tokens.push(self.processor.sample(&logits.i(k)?)?);
        }
        Ok(tokens)
    }
}
