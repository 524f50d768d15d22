//! WAV encoding of generated waveforms.
//!
//! Samples are stored as 32-bit IEEE float, exactly as the model produced
//! them: no clamping, normalization or resampling.

use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<(Tensor, u32)> {
    let reader = WavReader::open(path)?;
    read_wav_internal(reader)
}

pub fn read_wav_from_bytes(bytes: &[u8]) -> Result<(Tensor, u32)> {
    let reader = WavReader::new(std::io::Cursor::new(bytes))?;
    read_wav_internal(reader)
}

fn read_wav_internal<R: std::io::Read>(mut reader: WavReader<R>) -> Result<(Tensor, u32)> {
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
    };

    // Interleaved to [channels, samples]
    let num_samples = samples.len() / channels.max(1);
    let mut planar = vec![0.0f32; channels * num_samples];
    for c in 0..channels {
        for i in 0..num_samples {
            planar[c * num_samples + i] = samples[i * channels + c];
        }
    }
    let tensor = Tensor::from_vec(planar, (channels, num_samples), &Device::Cpu)?;

    Ok((tensor, spec.sample_rate))
}

pub fn write_wav<P: AsRef<Path>>(path: P, audio: &Tensor, sample_rate: u32) -> Result<()> {
    let file = std::io::BufWriter::new(std::fs::File::create(path)?);
    write_wav_to_writer(file, audio, sample_rate)
}

/// Write a `[channels, samples]` tensor as a float WAV stream
pub fn write_wav_to_writer<W: std::io::Write + std::io::Seek>(
    writer: W,
    audio: &Tensor,
    sample_rate: u32,
) -> Result<()> {
    let shape = audio.dims();
    if shape.len() != 2 {
        anyhow::bail!(
            "Expected audio tensor with shape [channels, samples], got {:?}",
            shape
        );
    }
    let channels = u16::try_from(shape[0])?;
    if channels == 0 {
        anyhow::bail!("Audio tensor has no channels");
    }

    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut wav_writer = WavWriter::new(writer, spec)?;
    let data = audio
        .to_device(&Device::Cpu)?
        .to_dtype(DType::F32)?
        .to_vec2::<f32>()?;

    // Interleave channels if more than 1
    for i in 0..shape[1] {
        for channel_data in &data {
            wav_writer.write_sample(channel_data[i])?;
        }
    }
    wav_writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_io() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("io.wav");
        let t = Tensor::from_vec(vec![0.0f32, 0.5, -0.5, 0.1], (1, 4), &Device::Cpu)?;
        write_wav(&path, &t, 32_000)?;

        let (read_t, sr) = read_wav(&path)?;
        assert_eq!(sr, 32_000);
        assert_eq!(read_t.dims(), t.dims());
        assert_eq!(read_t.to_vec2::<f32>()?, t.to_vec2::<f32>()?);
        Ok(())
    }

    #[test]
    fn test_samples_are_not_clamped() -> Result<()> {
        let t = Tensor::from_vec(vec![1.5f32, -2.25, 0.75], (1, 3), &Device::Cpu)?;
        let mut buffer = std::io::Cursor::new(Vec::new());
        write_wav_to_writer(&mut buffer, &t, 32_000)?;

        let reader = WavReader::new(std::io::Cursor::new(buffer.into_inner()))?;
        let spec = reader.spec();
        assert_eq!(spec.sample_format, SampleFormat::Float);
        assert_eq!(spec.bits_per_sample, 32);
        let samples = reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        assert_eq!(samples, vec![1.5, -2.25, 0.75]);
        Ok(())
    }

    #[test]
    fn test_stereo_is_interleaved() -> Result<()> {
        let t = Tensor::from_vec(vec![0.1f32, 0.2, -0.1, -0.2], (2, 2), &Device::Cpu)?;
        let mut buffer = std::io::Cursor::new(Vec::new());
        write_wav_to_writer(&mut buffer, &t, 32_000)?;

        let bytes = buffer.into_inner();
        let (read_t, _) = read_wav_from_bytes(&bytes)?;
        assert_eq!(read_t.to_vec2::<f32>()?, t.to_vec2::<f32>()?);

        let reader = WavReader::new(std::io::Cursor::new(bytes))?;
        let interleaved = reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        assert_eq!(interleaved, vec![0.1, -0.1, 0.2, -0.2]);
        Ok(())
    }

    #[test]
    fn test_rejects_wrong_rank() -> Result<()> {
        let t = Tensor::zeros((1, 1, 4), DType::F32, &Device::Cpu)?;
        let mut buffer = std::io::Cursor::new(Vec::new());
        assert!(write_wav_to_writer(&mut buffer, &t, 32_000).is_err());
        Ok(())
    }
}
