use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use hark::{
    Config, MicrophoneFactory, ProcessEngineFactory, RecordingQueue, RecordingRequest,
};

#[derive(Parser)]
#[command(
    name = "hark",
    about = "Record from the microphone and transcribe through an external engine"
)]
struct Args {
    /// Config file to load (without extension)
    #[arg(long, default_value = "config/hark")]
    config: String,

    /// Speech recognition language code (overrides the config)
    #[arg(long)]
    language: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let cfg = match Config::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Using default config ({:#})", e);
            Config::default()
        }
    };

    if cfg.engine.program.is_empty() {
        anyhow::bail!(
            "No engine command configured; set [engine] program in {}.toml",
            args.config
        );
    }

    let language = args.language.unwrap_or_else(|| cfg.language.clone());
    info!("hark v0.1.0 (language: {})", language);

    let queue = RecordingQueue::new(
        Arc::new(ProcessEngineFactory::from_command(&cfg.engine)),
        Arc::new(MicrophoneFactory),
    );
    queue.start();

    let request = RecordingRequest::new(cfg.capture.clone(), &language)
        .on_status(|status| info!("Recording status: {:?}", status))
        .on_text_chunk(|text| println!("  {}", text));

    let task_id = queue.submit(request);
    println!("Recording... press Enter to stop.");

    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
    })
    .await?;

    if !queue.stop(&task_id) {
        warn!("Task {} was not recording yet", task_id);
    }

    match queue.get_result(&task_id, Some(Duration::from_secs(60))).await {
        Some(result) if result.success => {
            if result.transcript.is_empty() {
                println!("No speech detected.");
            } else {
                println!("\nTranscript: {}", result.transcript);
            }
            println!("({:.1}s)", result.elapsed_seconds);
        }
        Some(result) => eprintln!("Recording failed: {}", result.error),
        None => eprintln!("Timed out waiting for the transcription result."),
    }

    queue.shutdown().await;

    Ok(())
}
