use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use videofactory::{Config, Factory, Mode, Request, TextProvider, Vibe};

#[derive(Parser)]
#[command(name = "videofactory", version)]
#[command(about = "Turn a topic into a narrated video and a thumbnail", long_about = None)]
struct Cli {
    /// What the video is about
    #[arg(default_value = "Psychology of Money")]
    topic: String,
    #[arg(short, long, value_enum, default_value_t = Mode::Short)]
    mode: Mode,
    #[arg(short, long, value_enum, default_value_t = Vibe::Professional)]
    vibe: Vibe,
    /// Stock footage API key
    #[arg(long, env = "PEXELS_API_KEY", hide_env_values = true)]
    pexels_key: Option<String>,
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory for intermediate and final files
    #[arg(short, long)]
    work_dir: Option<PathBuf>,
    /// Bold TTF/OTF font for titles and subtitles
    #[arg(long)]
    font: Option<PathBuf>,
    #[arg(long, value_enum)]
    text_provider: Option<TextProvider>,
    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(key) = cli.pexels_key.filter(|key| !key.trim().is_empty()) {
        config.footage_api_key = Some(key);
    }
    if let Some(work_dir) = cli.work_dir {
        config.work_dir = work_dir;
    }
    if let Some(font) = cli.font {
        config.font_path = Some(font);
    }
    if let Some(provider) = cli.text_provider {
        config.text_provider = provider;
    }
    config.validate()?;

    let factory = Factory::from_config(config)?;
    let output = factory
        .run(&Request::new(cli.topic, cli.mode, cli.vibe))
        .await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", output.thumbnail.display());
        println!("{}", output.video.display());
    }
    Ok(())
}
