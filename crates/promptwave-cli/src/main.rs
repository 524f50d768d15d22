//! promptwave - text-to-music generation with MusicGen on candle

use anyhow::Result;
use clap::Parser;

use promptwave_cli::commands;

/// Generate music from text prompts
#[derive(Parser)]
#[command(
    name = "promptwave",
    author,
    version,
    about = "promptwave - text-to-music generation",
    long_about = "Generate music from a text description with MusicGen.\n\n\
                  Run one-off generations from the command line or serve\n\
                  the model over HTTP."
)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Generate audio from a prompt
    ///
    /// Runs the model once and saves the result to a WAV file.
    Generate(commands::generate::GenerateArgs),

    /// Start the HTTP API server
    ///
    /// Serves generation over REST and exposes the generated files.
    Serve(commands::serve::ServeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        // CPU/GPU bound, no need for the runtime
        Commands::Generate(cmd_args) => commands::generate::run(cmd_args),
        Commands::Serve(cmd_args) => commands::serve::run(cmd_args).await,
    }
}
