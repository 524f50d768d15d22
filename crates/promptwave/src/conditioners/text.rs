use crate::config::defaults;
use candle_core::{Device, Result, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::t5;
use sentencepiece::SentencePieceProcessor;
use std::path::Path;

/// Tokenizes a prompt with the T5 sentencepiece model
pub struct T5Tokenizer {
    sp: SentencePieceProcessor,
}

impl T5Tokenizer {
    pub fn open(tokenizer_path: &Path) -> Result<Self> {
        let sp = SentencePieceProcessor::open(tokenizer_path)
            .map_err(|e| candle_core::Error::Msg(format!("Failed to load tokenizer: {:?}", e)))?;
        Ok(Self { sp })
    }

    /// Piece ids followed by the EOS id, as the T5 encoder was trained on
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let pieces = self
            .sp
            .encode(text)
            .map_err(|e| candle_core::Error::Msg(format!("Failed to encode text: {:?}", e)))?;

        let mut ids: Vec<u32> = pieces.iter().map(|p| p.id).collect();
        ids.push(defaults::T5_EOS_TOKEN_ID);
        Ok(ids)
    }

    pub fn prepare(&self, text: &str, device: &Device) -> Result<Tensor> {
        let ids = self.encode(text)?;
        let len = ids.len();
        Tensor::from_vec(ids, (1, len), device)
    }
}

/// Text conditioning for the decoder: T5 encoder states projected to the
/// decoder width.
pub struct T5Conditioner {
    tokenizer: T5Tokenizer,
    encoder: t5::T5EncoderModel,
    enc_to_dec_proj: Linear,
    device: Device,
}

impl T5Conditioner {
    /// `vb` points at the checkpoint root (`text_encoder.*`, `enc_to_dec_proj.*`)
    pub fn new(
        tokenizer_path: &Path,
        cfg: &t5::Config,
        decoder_dim: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let tokenizer = T5Tokenizer::open(tokenizer_path)?;
        let encoder = t5::T5EncoderModel::load(vb.pp("text_encoder"), cfg)?;
        let enc_to_dec_proj =
            candle_nn::linear(cfg.d_model, decoder_dim, vb.pp("enc_to_dec_proj"))?;
        Ok(Self {
            tokenizer,
            encoder,
            enc_to_dec_proj,
            device: vb.device().clone(),
        })
    }

    /// Encode a prompt into conditioning states of shape [1, tokens, decoder_dim]
    pub fn forward(&mut self, text: &str) -> Result<Tensor> {
        let ids = self.tokenizer.prepare(text, &self.device)?;
        let states = self.encoder.forward(&ids)?;
        self.enc_to_dec_proj.forward(&states)
    }
}
