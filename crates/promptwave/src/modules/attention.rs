use crate::modules::sdpa::sdpa;
use crate::state::{ModelState, get_or_create_state};
use candle_core::{Result, Tensor};
use candle_nn::{Linear, Module, VarBuilder};

/// Initial KV cache capacity, doubled whenever it fills up
const INITIAL_CACHE_CAPACITY: usize = 64;

/// Bias-free multi-head attention as used by the MusicGen decoder.
///
/// Self-attention keeps a growing KV cache in the [`ModelState`] under the
/// module name; cross-attention projects the encoder states once and reuses
/// them for every step.
#[derive(Clone)]
pub struct MultiHeadAttention {
    embed_dim: usize,
    num_heads: usize,
    head_dim: usize,
    scaling: f64,
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    out_proj: Linear,
    name: String,
}

impl MultiHeadAttention {
    pub fn new(embed_dim: usize, num_heads: usize, name: &str, vb: VarBuilder) -> Result<Self> {
        let head_dim = embed_dim / num_heads;
        let q_proj = candle_nn::linear_no_bias(embed_dim, embed_dim, vb.pp("q_proj"))?;
        let k_proj = candle_nn::linear_no_bias(embed_dim, embed_dim, vb.pp("k_proj"))?;
        let v_proj = candle_nn::linear_no_bias(embed_dim, embed_dim, vb.pp("v_proj"))?;
        let out_proj = candle_nn::linear_no_bias(embed_dim, embed_dim, vb.pp("out_proj"))?;

        Ok(Self {
            embed_dim,
            num_heads,
            head_dim,
            scaling: (head_dim as f64).powf(-0.5),
            q_proj,
            k_proj,
            v_proj,
            out_proj,
            name: name.to_string(),
        })
    }

    /// [B, T, E] -> [B, H, T, D]
    fn split_heads(&self, x: &Tensor) -> Result<Tensor> {
        let (b, t, _) = x.dims3()?;
        x.reshape((b, t, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()
    }

    /// [B, H, T, D] -> [B, T, E], then output projection
    fn merge_heads(&self, x: &Tensor) -> Result<Tensor> {
        let (b, _h, t, _d) = x.dims4()?;
        let x = x.transpose(1, 2)?.reshape((b, t, self.embed_dim))?;
        self.out_proj.forward(&x)
    }

    fn query(&self, x: &Tensor) -> Result<Tensor> {
        self.split_heads(&(self.q_proj.forward(x)? * self.scaling)?)
    }

    /// Causal self-attention of `x` over the cached positions plus itself
    pub fn forward_self(&self, x: &Tensor, model_state: &mut ModelState) -> Result<Tensor> {
        let q = self.query(x)?;
        let k = self.split_heads(&self.k_proj.forward(x)?)?;
        let v = self.split_heads(&self.v_proj.forward(x)?)?;
        let (b, _h, t, _d) = q.dims4()?;

        let module_state = get_or_create_state(model_state, &self.name);
        let current_len = module_state
            .get("l")
            .and_then(|l| l.to_scalar::<i64>().ok())
            .unwrap_or(0) as usize;

        // Take ownership of the buffers so slice_set writes into unshared storage
        let cached = (module_state.remove("k_buf"), module_state.remove("v_buf"));
        let (mut k_buf, mut v_buf) = match cached {
            (Some(kb), Some(vb)) => (kb, vb),
            _ => {
                let shape = (b, self.num_heads, INITIAL_CACHE_CAPACITY, self.head_dim);
                (
                    Tensor::zeros(shape, q.dtype(), q.device())?,
                    Tensor::zeros(shape, q.dtype(), q.device())?,
                )
            }
        };

        let cap = k_buf.dim(2)?;
        if current_len + t > cap {
            let new_cap = (current_len + t).next_power_of_two();
            let zeros_shape = (b, self.num_heads, new_cap - cap, self.head_dim);
            let k_zeros = Tensor::zeros(zeros_shape, q.dtype(), q.device())?;
            let v_zeros = Tensor::zeros(zeros_shape, q.dtype(), q.device())?;
            k_buf = Tensor::cat(&[k_buf, k_zeros], 2)?;
            v_buf = Tensor::cat(&[v_buf, v_zeros], 2)?;
        }
        k_buf.slice_set(&k, 2, current_len)?;
        v_buf.slice_set(&v, 2, current_len)?;
        let new_len = current_len + t;

        let kc = k_buf.narrow(2, 0, new_len)?;
        let vc = v_buf.narrow(2, 0, new_len)?;

        module_state.insert("k_buf".to_string(), k_buf);
        module_state.insert("v_buf".to_string(), v_buf);
        module_state.insert("l".to_string(), Tensor::new(new_len as i64, q.device())?);

        // Queries are pre-scaled
        let x = sdpa(&q, &kc, &vc, 1.0, true)?;
        self.merge_heads(&x)
    }

    /// Attention of `x` over the (projected) text encoder states
    pub fn forward_cross(
        &self,
        x: &Tensor,
        encoder_states: &Tensor,
        model_state: &mut ModelState,
    ) -> Result<Tensor> {
        let q = self.query(x)?;

        let module_state = get_or_create_state(model_state, &self.name);
        let (k, v) = match (module_state.get("k"), module_state.get("v")) {
            (Some(k), Some(v)) => (k.clone(), v.clone()),
            _ => {
                let k = self.split_heads(&self.k_proj.forward(encoder_states)?)?;
                let v = self.split_heads(&self.v_proj.forward(encoder_states)?)?;
                module_state.insert("k".to_string(), k.clone());
                module_state.insert("v".to_string(), v.clone());
                (k, v)
            }
        };

        let x = sdpa(&q, &k, &v, 1.0, false)?;
        self.merge_heads(&x)
    }
}
