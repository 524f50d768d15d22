//! The seam between a text-to-music model and whatever serves it.

use crate::audio::write_wav;
use crate::musicgen_model::MusicGenModel;
use anyhow::Result;
use candle_core::Tensor;
use std::path::Path;

/// Something that turns a prompt into a `[channels, samples]` waveform.
///
/// Implementations need `&mut self`: a handle serves one generation at a time.
pub trait MusicGenerator: Send + 'static {
    fn sample_rate(&self) -> u32;

    fn generate(&mut self, prompt: &str, on_step: &mut dyn FnMut(usize, usize)) -> Result<Tensor>;
}

impl MusicGenerator for MusicGenModel {
    fn sample_rate(&self) -> u32 {
        self.sample_rate as u32
    }

    fn generate(&mut self, prompt: &str, on_step: &mut dyn FnMut(usize, usize)) -> Result<Tensor> {
        self.generate_with_progress(prompt, on_step)
    }
}

impl<G: MusicGenerator + ?Sized> MusicGenerator for Box<G> {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn generate(&mut self, prompt: &str, on_step: &mut dyn FnMut(usize, usize)) -> Result<Tensor> {
        (**self).generate(prompt, on_step)
    }
}

/// Generate audio for `prompt` and write it to `path` as a float WAV at the
/// generator's sample rate. Returns the number of samples per channel.
pub fn generate_to_file<G: MusicGenerator + ?Sized>(
    generator: &mut G,
    prompt: &str,
    path: &Path,
    on_step: &mut dyn FnMut(usize, usize),
) -> Result<usize> {
    let audio = generator.generate(prompt, on_step)?;
    write_wav(path, &audio, generator.sample_rate())?;
    Ok(audio.dim(1)?)
}
