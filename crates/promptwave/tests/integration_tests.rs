//! Integration tests with the real facebook/musicgen-small weights
//!
//! Run with `cargo test -- --ignored`; the first run downloads ~2.4GB.

use promptwave::audio::read_wav;
use promptwave::config::MusicgenConfig;
use promptwave::weights::{ModelFiles, download_if_necessary};
use promptwave::{GenerationParams, MusicGenModel, generate_to_file};

use candle_core::Device;

fn short_params() -> GenerationParams {
    GenerationParams {
        duration_secs: 1.0,
        seed: Some(1234),
        ..Default::default()
    }
}

#[test]
#[ignore = "requires model download"]
fn test_download_config() {
    let path = download_if_necessary("hf://facebook/musicgen-small/config.json")
        .expect("Failed to download config");
    let config = MusicgenConfig::load(&path).expect("Failed to parse config");
    assert_eq!(config.sample_rate(), 32_000);
    assert_eq!(config.frame_rate(), 50);
    assert_eq!(config.decoder.num_codebooks, 4);
}

#[test]
#[ignore = "requires model download"]
fn test_model_load() {
    let files = ModelFiles::resolve("facebook/musicgen-small", None).expect("Failed to resolve");
    let model = MusicGenModel::from_files(&files, short_params(), &Device::Cpu)
        .expect("Failed to load model");
    assert_eq!(model.sample_rate, 32_000);
    assert_eq!(model.frames(), 50);
    assert_eq!(model.total_steps(), 53);
}

#[test]
#[ignore = "requires model download"]
fn test_generate_one_second() {
    let mut model = MusicGenModel::load(
        "facebook/musicgen-small",
        None,
        short_params(),
        &Device::Cpu,
    )
    .expect("Failed to load model");

    let mut last = (0, 0);
    let audio = model
        .generate_with_progress("80s pop track with bassy drums and synth", &mut |s, t| {
            last = (s, t)
        })
        .expect("Generation failed");

    assert_eq!(last, (53, 53));
    let (channels, samples) = audio.dims2().unwrap();
    assert_eq!(channels, 1);
    // 50 frames of 640 samples
    assert_eq!(samples, 32_000);

    let data = audio.flatten_all().unwrap().to_vec1::<f32>().unwrap();
    assert!(data.iter().all(|v| v.is_finite()));
    assert!(data.iter().any(|v| *v != 0.0));
}

#[test]
#[ignore = "requires model download"]
fn test_fixed_seed_is_reproducible() {
    let mut model = MusicGenModel::load(
        "facebook/musicgen-small",
        None,
        GenerationParams {
            duration_secs: 0.2,
            seed: Some(7),
            ..Default::default()
        },
        &Device::Cpu,
    )
    .expect("Failed to load model");

    let a = model.generate("ambient pads").unwrap();
    let b = model.generate("ambient pads").unwrap();
    let a = a.flatten_all().unwrap().to_vec1::<f32>().unwrap();
    let b = b.flatten_all().unwrap().to_vec1::<f32>().unwrap();
    assert_eq!(a, b);
}

#[test]
#[ignore = "requires model download"]
fn test_generate_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("song.wav");
    let mut model = MusicGenModel::load(
        "facebook/musicgen-small",
        None,
        short_params(),
        &Device::Cpu,
    )
    .unwrap();

    let samples = generate_to_file(&mut model, "lofi hip hop", &path, &mut |_, _| {}).unwrap();
    let (audio, sr) = read_wav(&path).unwrap();
    assert_eq!(sr, 32_000);
    assert_eq!(audio.dims(), &[1, samples]);
}
