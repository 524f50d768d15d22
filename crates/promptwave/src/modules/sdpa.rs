use candle_core::{DType, Device, Result, Tensor};

/// Scaled Dot Product Attention
///
/// Computes `softmax(Q @ K.T * scale + mask) @ V`.
///
/// # Arguments
/// * `q` - Query tensor of shape [Batch, Heads, Q_Len, Dim]
/// * `k` - Key tensor of shape [Batch, Heads, KV_Len, Dim]
/// * `v` - Value tensor of shape [Batch, Heads, KV_Len, Dim]
/// * `scale` - Scaling factor (usually 1 / sqrt(dim))
/// * `is_causal` - Whether to apply causal masking; queries are aligned to
///   the end of the key sequence (KV cache decoding)
///
/// # Returns
/// * Tensor of shape [Batch, Heads, Q_Len, Dim]
pub fn sdpa(q: &Tensor, k: &Tensor, v: &Tensor, scale: f64, is_causal: bool) -> Result<Tensor> {
    let q = q.contiguous()?;
    let v = v.contiguous()?;
    let (_b, _h, q_len, _dim) = q.dims4()?;
    let kv_len = k.dim(2)?;

    let k_t = k.transpose(2, 3)?.contiguous()?; // [B, H, D, S]
    let scores = (q.matmul(&k_t)? * scale)?;

    // A single query at the end of the cache sees every key
    let scores = if is_causal && q_len > 1 {
        let mask = causal_mask(q_len, kv_len, q.device())?;
        scores.broadcast_add(&mask)?
    } else {
        scores
    };

    let probs = candle_nn::ops::softmax_last_dim(&scores)?;
    probs.matmul(&v)
}

/// Additive causal mask of shape [1, 1, q_len, kv_len]
fn causal_mask(q_len: usize, kv_len: usize, device: &Device) -> Result<Tensor> {
    let shift = kv_len.saturating_sub(q_len);

    // pos_q: [q_len, 1]
    let pos_q = Tensor::arange(0u32, q_len as u32, device)?
        .to_dtype(DType::F32)?
        .affine(1.0, shift as f64)?
        .reshape((q_len, 1))?;

    // pos_k: [1, kv_len]
    let pos_k = Tensor::arange(0u32, kv_len as u32, device)?
        .to_dtype(DType::F32)?
        .reshape((1, kv_len))?;

    let is_future = pos_k.broadcast_gt(&pos_q)?;
    let mask = is_future.where_cond(
        &Tensor::full(f32::NEG_INFINITY, (q_len, kv_len), device)?,
        &Tensor::zeros((q_len, kv_len), DType::F32, device)?,
    )?;

    mask.reshape((1, 1, q_len, kv_len))
}
