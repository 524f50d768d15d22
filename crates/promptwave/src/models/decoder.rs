//! MusicGen decoder: an autoregressive transformer over parallel codebook
//! streams, conditioned on text through cross-attention.

use crate::config::DecoderConfig;
use crate::modules::attention::MultiHeadAttention;
use crate::modules::norm::LayerNorm;
use crate::modules::positional::SinusoidalPositions;
use crate::state::{ModelState, get_offset, set_offset};
use candle_core::{IndexOp, Result, Tensor};
use candle_nn::{Activation, Embedding, Linear, Module, VarBuilder};

const LAYER_NORM_EPS: f64 = 1e-5;

#[derive(Clone)]
pub struct DecoderLayer {
    self_attn: MultiHeadAttention,
    self_attn_layer_norm: LayerNorm,
    encoder_attn: MultiHeadAttention,
    encoder_attn_layer_norm: LayerNorm,
    fc1: Linear,
    fc2: Linear,
    final_layer_norm: LayerNorm,
    activation: Activation,
}

impl DecoderLayer {
    pub fn new(cfg: &DecoderConfig, name: &str, vb: VarBuilder) -> Result<Self> {
        let dim = cfg.hidden_size;
        let heads = cfg.num_attention_heads;
        Ok(Self {
            self_attn: MultiHeadAttention::new(
                dim,
                heads,
                &format!("{}.self_attn", name),
                vb.pp("self_attn"),
            )?,
            self_attn_layer_norm: LayerNorm::new(
                dim,
                LAYER_NORM_EPS,
                vb.pp("self_attn_layer_norm"),
            )?,
            encoder_attn: MultiHeadAttention::new(
                dim,
                heads,
                &format!("{}.encoder_attn", name),
                vb.pp("encoder_attn"),
            )?,
            encoder_attn_layer_norm: LayerNorm::new(
                dim,
                LAYER_NORM_EPS,
                vb.pp("encoder_attn_layer_norm"),
            )?,
            fc1: candle_nn::linear_no_bias(dim, cfg.ffn_dim, vb.pp("fc1"))?,
            fc2: candle_nn::linear_no_bias(cfg.ffn_dim, dim, vb.pp("fc2"))?,
            final_layer_norm: LayerNorm::new(dim, LAYER_NORM_EPS, vb.pp("final_layer_norm"))?,
            activation: cfg.activation_function,
        })
    }

    /// Pre-norm block: self-attention, cross-attention, feed-forward
    pub fn forward(
        &self,
        x: &Tensor,
        encoder_states: &Tensor,
        model_state: &mut ModelState,
    ) -> Result<Tensor> {
        let h = self.self_attn_layer_norm.forward(x)?;
        let x = (x + self.self_attn.forward_self(&h, model_state)?)?;

        let h = self.encoder_attn_layer_norm.forward(&x)?;
        let x = (&x + self.encoder_attn.forward_cross(&h, encoder_states, model_state)?)?;

        let h = self.final_layer_norm.forward(&x)?;
        let h = self.fc2.forward(&self.activation.forward(&self.fc1.forward(&h)?)?)?;
        x + h
    }
}

/// Decoder stack plus one embedding table and one LM head per codebook
#[derive(Clone)]
pub struct MusicgenDecoder {
    embed_tokens: Vec<Embedding>,
    positions: SinusoidalPositions,
    layers: Vec<DecoderLayer>,
    layer_norm: LayerNorm,
    lm_heads: Vec<Linear>,
    embed_scale: f64,
    num_codebooks: usize,
    name: String,
}

impl MusicgenDecoder {
    /// `vb` points at the `decoder` prefix of a MusicGen checkpoint
    pub fn new(cfg: &DecoderConfig, name: &str, vb: VarBuilder) -> Result<Self> {
        let dim = cfg.hidden_size;
        let vb_d = vb.pp("model").pp("decoder");

        let mut embed_tokens = Vec::with_capacity(cfg.num_codebooks);
        let mut lm_heads = Vec::with_capacity(cfg.num_codebooks);
        for k in 0..cfg.num_codebooks {
            // +1 row for the pad/BOS token
            embed_tokens.push(candle_nn::embedding(
                cfg.vocab_size + 1,
                dim,
                vb_d.pp(format!("embed_tokens.{}", k)),
            )?);
            lm_heads.push(candle_nn::linear_no_bias(
                dim,
                cfg.vocab_size,
                vb.pp(format!("lm_heads.{}", k)),
            )?);
        }

        let mut layers = Vec::with_capacity(cfg.num_hidden_layers);
        for i in 0..cfg.num_hidden_layers {
            layers.push(DecoderLayer::new(
                cfg,
                &format!("{}.layers.{}", name, i),
                vb_d.pp(format!("layers.{}", i)),
            )?);
        }

        let positions = SinusoidalPositions::new(cfg.max_position_embeddings, dim, vb.device())?;
        let layer_norm = LayerNorm::new(dim, LAYER_NORM_EPS, vb_d.pp("layer_norm"))?;
        let embed_scale = if cfg.scale_embedding {
            (dim as f64).sqrt()
        } else {
            1.0
        };

        Ok(Self {
            embed_tokens,
            positions,
            layers,
            layer_norm,
            lm_heads,
            embed_scale,
            num_codebooks: cfg.num_codebooks,
            name: name.to_string(),
        })
    }

    pub fn num_codebooks(&self) -> usize {
        self.num_codebooks
    }

    /// Number of steps the position table allows
    pub fn max_positions(&self) -> usize {
        self.positions.max_positions()
    }

    /// Run one or more decoding steps.
    ///
    /// * `input_ids` - [B, K, T] codebook tokens (u32)
    /// * `encoder_states` - [B, S, hidden] projected text states
    ///
    /// Returns the logits of the last position, [B, K, vocab].
    pub fn forward(
        &self,
        input_ids: &Tensor,
        encoder_states: &Tensor,
        model_state: &mut ModelState,
    ) -> Result<Tensor> {
        let (_b, k, t) = input_ids.dims3()?;
        if k != self.num_codebooks {
            candle_core::bail!(
                "expected {} codebooks in decoder input, got {}",
                self.num_codebooks,
                k
            );
        }

        let mut x = self.embed_tokens[0].forward(&input_ids.i((.., 0, ..))?)?;
        for (codebook, embed) in self.embed_tokens.iter().enumerate().skip(1) {
            x = (x + embed.forward(&input_ids.i((.., codebook, ..))?)?)?;
        }
        if self.embed_scale != 1.0 {
            x = (x * self.embed_scale)?;
        }

        let offset = get_offset(model_state, &self.name);
        let positions = self.positions.forward(offset, t)?;
        x = x.broadcast_add(&positions.unsqueeze(0)?)?;

        for layer in &self.layers {
            x = layer.forward(&x, encoder_states, model_state)?;
        }
        set_offset(model_state, &self.name, offset + t)?;

        let x = self.layer_norm.forward(&x.narrow(1, t - 1, 1)?)?.squeeze(1)?;
        let logits = self
            .lm_heads
            .iter()
            .map(|head| head.forward(&x))
            .collect::<Result<Vec<_>>>()?;
        Tensor::stack(&logits, 1)
    }
}
