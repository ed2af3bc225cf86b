// src/main.rs
//! GL200 Decoder - tracker frame decoder and TCP front end

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gl200_decoder::{
    config::DecoderConfig,
    display::TerminalDisplay,
    protocol::decoder::PROTOCOL,
    session::{DeviceRegistry, LastPositionStore},
    Gl200Decoder, TrackerServer,
};
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::PathBuf,
    sync::{atomic::Ordering, Arc},
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gl200-decoder", version, about = "Decoder for GL200-family tracker frames")]
struct Cli {
    /// Configuration file (defaults to ~/.config/gl200-decoder/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Accept tracker connections over TCP
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Acknowledge location reports
        #[arg(long)]
        ack: bool,
        /// Drop frames from devices that are not configured
        #[arg(long)]
        known_only: bool,
        /// Show a live table of last known positions
        #[arg(long)]
        display: bool,
    },
    /// Decode sentences, one per line, from a file or stdin and print them as JSON
    Decode {
        file: Option<PathBuf>,
        /// Print the acknowledgments a location report would receive
        #[arg(long)]
        ack: bool,
    },
    /// Print the effective configuration
    Config {
        /// Write it back to the configuration file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => DecoderConfig::load_from(path),
        None => DecoderConfig::load(),
    }
    .context("Failed to load configuration")?;

    match cli.command {
        Command::Serve {
            host,
            port,
            ack,
            known_only,
            display,
        } => {
            let host = host.unwrap_or_else(|| config.listen_host.clone());
            let port = port.unwrap_or(config.listen_port);
            config.update_listener(host, port);
            if ack {
                config.set_ack(PROTOCOL, true);
            }
            if known_only {
                config.auto_register = false;
            }
            serve(config, display).await
        }
        Command::Decode { file, ack } => {
            if ack {
                config.set_ack(PROTOCOL, true);
            }
            decode(&config, file)
        }
        Command::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                match &cli.config {
                    Some(path) => config.save_to(path),
                    None => config.save(),
                }
                .context("Failed to save configuration")?;
            }
            Ok(())
        }
    }
}

async fn serve(config: DecoderConfig, display: bool) -> Result<()> {
    let server = TrackerServer::new(&config);
    let listener = TrackerServer::bind(&config.listen_address()).await?;

    let running = server.running();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            running.store(false, Ordering::Relaxed);
        }
    });

    if display {
        let background = server.clone();
        let listener_task = tokio::spawn(async move { background.run(listener).await });
        let shown = TerminalDisplay::new()
            .run(server.store(), server.registry(), server.running())
            .await;

        if listener_task.is_finished() {
            if let Err(e) = listener_task.await {
                error!("Listener task failed: {}", e);
            }
        } else {
            listener_task.abort();
        }
        shown?;
    } else {
        let watcher = server.running();
        tokio::select! {
            _ = server.run(listener) => warn!("Listener stopped"),
            _ = async {
                while watcher.load(Ordering::Relaxed) {
                    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                }
            } => {}
        }
    }

    info!("Shutting down...");
    Ok(())
}

fn decode(config: &DecoderConfig, file: Option<PathBuf>) -> Result<()> {
    let registry = Arc::new(DeviceRegistry::new(true));
    let store = Arc::new(LastPositionStore::new());
    let decoder = Gl200Decoder::new(registry, store.clone(), Arc::new(config.clone()));

    let reader: Box<dyn BufRead> = match file {
        Some(path) => Box::new(BufReader::new(
            File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    for line in reader.lines() {
        let line = line?;
        let sentence = line.trim();
        if sentence.is_empty() {
            continue;
        }

        let mut replies: Vec<String> = Vec::new();
        if let Some(position) = decoder.decode(sentence, Some(&mut replies)) {
            store.update(&position);
            println!("{}", serde_json::to_string(&position)?);
        }
        for reply in replies {
            println!("{}", serde_json::json!({ "reply": reply }));
        }
    }

    Ok(())
}
