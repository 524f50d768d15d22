use candle_core::{Device, Result, Tensor};

/// Fixed sinusoidal position table used by the MusicGen decoder.
///
/// Row `p` is `[cos(p * f_0) .. cos(p * f_{h-1}), sin(p * f_0) .. sin(p * f_{h-1})]`
/// with `f_i = exp(-i * ln(10000) / (h - 1))` and `h = dim / 2`.
#[derive(Clone)]
pub struct SinusoidalPositions {
    table: Tensor,
    max_positions: usize,
}

impl SinusoidalPositions {
    pub fn new(max_positions: usize, dim: usize, device: &Device) -> Result<Self> {
        let half = dim / 2;
        let step = (10_000f64).ln() / (half.max(2) - 1) as f64;
        let freqs: Vec<f64> = (0..half).map(|i| (-(i as f64) * step).exp()).collect();

        let mut data = Vec::with_capacity(max_positions * dim);
        for pos in 0..max_positions {
            let row_start = data.len();
            for f in &freqs {
                data.push((pos as f64 * f).cos() as f32);
            }
            for f in &freqs {
                data.push((pos as f64 * f).sin() as f32);
            }
            // Odd widths get a zero pad column
            data.resize(row_start + dim, 0.0);
        }

        let table = Tensor::from_vec(data, (max_positions, dim), device)?;
        Ok(Self {
            table,
            max_positions,
        })
    }

    /// Embeddings for positions `offset..offset + len`, shape [len, dim]
    pub fn forward(&self, offset: usize, len: usize) -> Result<Tensor> {
        if offset + len > self.max_positions {
            candle_core::bail!(
                "position {} exceeds the {} positions supported by the decoder",
                offset + len,
                self.max_positions
            );
        }
        self.table.narrow(0, offset, len)
    }

    pub fn max_positions(&self) -> usize {
        self.max_positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_zero_is_cos_then_sin() -> Result<()> {
        let pos = SinusoidalPositions::new(4, 6, &Device::Cpu)?;
        let row = pos.forward(0, 1)?.squeeze(0)?.to_vec1::<f32>()?;
        assert_eq!(row, vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_frequencies() -> Result<()> {
        let pos = SinusoidalPositions::new(4, 4, &Device::Cpu)?;
        let row = pos.forward(1, 1)?.squeeze(0)?.to_vec1::<f32>()?;
        // half = 2: f_0 = 1, f_1 = 1 / 10000
        assert!((row[0] - 1f32.cos()).abs() < 1e-6);
        assert!((row[1] - 1e-4f32.cos()).abs() < 1e-6);
        assert!((row[2] - 1f32.sin()).abs() < 1e-6);
        assert!((row[3] - 1e-4f32.sin()).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_out_of_range() -> Result<()> {
        let pos = SinusoidalPositions::new(4, 4, &Device::Cpu)?;
        assert!(pos.forward(3, 1).is_ok());
        assert!(pos.forward(3, 2).is_err());
        Ok(())
    }
}
