//! `promptwave generate`: one prompt, one WAV file.

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use promptwave::generate_to_file;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use super::ModelArgs;

#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Description of the music to generate
    #[arg(short, long)]
    pub prompt: String,

    /// Output audio file path
    #[arg(short, long, default_value = "output.wav")]
    pub output: PathBuf,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// Print styled message (respects quiet mode)
macro_rules! info {
    ($quiet:expr, $($arg:tt)*) => {
        if !$quiet {
            println!($($arg)*);
        }
    };
}

/// Only warnings reach the terminal; the status lines cover the rest
pub const GENERATE_LOG_FILTER: &str = "promptwave=warn,promptwave_cli=warn";

fn log_subscriber(filter: EnvFilter) -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .finish()
}

pub fn run(args: GenerateArgs) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(GENERATE_LOG_FILTER));
    let _ = tracing::subscriber::set_global_default(log_subscriber(filter));
    let quiet = args.quiet;

    info!(quiet, "{} Loading model {}...", "▶".cyan(), args.model.model.yellow());
    let mut model = args.model.load()?;
    info!(
        quiet,
        "  {} Model loaded (sample rate: {}Hz)",
        "✓".green(),
        model.sample_rate
    );

    info!(
        quiet,
        "{} Generating {:.1}s: \"{}\"",
        "▶".cyan(),
        model.params().duration_secs,
        truncate_text(&args.prompt, 60).italic()
    );

    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(model.total_steps() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.cyan} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
                )?
                .progress_chars("█▓░"),
        );
        pb.set_message("decoding...");
        pb
    };

    let start = Instant::now();
    let samples = generate_to_file(&mut model, &args.prompt, &args.output, &mut |step, _| {
        pb.set_position(step as u64)
    })?;
    pb.finish_and_clear();

    if !quiet {
        let duration_sec = samples as f32 / model.sample_rate as f32;
        println!();
        println!(
            "  {} {}",
            "✓".green().bold(),
            "Audio generated successfully!".green().bold()
        );
        println!(
            "    Duration: {:.2}s ({} samples @ {}Hz) in {:.1?}",
            duration_sec,
            samples,
            model.sample_rate,
            start.elapsed()
        );
        println!("    Output:   {}", args.output.display().cyan());
        println!();
    }

    Ok(())
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
