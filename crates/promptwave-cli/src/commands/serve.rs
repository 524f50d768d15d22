use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use super::ModelArgs;
use crate::server::routes::DEFAULT_CORS_ORIGIN;

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Host to bind
    #[arg(long, env = "PROMPTWAVE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PROMPTWAVE_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Directory generated files are written to and served from
    #[arg(long, env = "PROMPTWAVE_OUTPUTS_DIR", default_value = "outputs")]
    pub outputs_dir: PathBuf,

    /// Browser origin allowed to call the API (with credentials)
    #[arg(long, default_value = DEFAULT_CORS_ORIGIN)]
    pub cors_origin: String,

    #[command(flatten)]
    pub model: ModelArgs,
}

pub async fn run(args: ServeArgs) -> Result<()> {
    crate::server::start_server(args).await
}

pub fn print_endpoints(host: &str, port: u16) {
    println!();
    println!("  Listening on http://{}:{}", host, port);
    println!("    POST /generate           {{\"prompt\": \"...\"}} -> audio/wav");
    println!("    GET  /outputs            list generated files");
    println!("    GET  /outputs/{{filename}} download a generated file");
    println!("    GET  /health");
    println!();
}
