use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use dotenvy::dotenv;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info, warn};

mod analyzer;
mod config;
mod error;
mod imaging;
mod llm;
mod models;
mod service;
mod state;
mod stylist;
#[cfg(test)]
mod testing;
mod utils;
mod visualizer;

use config::Config;
use llm::media::detect_mime_type;
use service::{ImageRequest, LookbookMode, ServiceReply, StylistRequest, VisualizationRequest};
use state::AppState;
use utils::logging::init_logging;

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    Analyze {
        image: PathBuf,
    },
    Suggest {
        request: PathBuf,
    },
    Visualize {
        request: PathBuf,
        moodboard_out: Option<PathBuf>,
        simple_lookbook: bool,
    },
    Help,
}

impl CliCommand {
    fn name(&self) -> &'static str {
        match self {
            CliCommand::Analyze { .. } => "analyze",
            CliCommand::Suggest { .. } => "suggest",
            CliCommand::Visualize { .. } => "visualize",
            CliCommand::Help => "help",
        }
    }
}

fn usage() -> &'static str {
    "Usage:
  wardrobe-stylist analyze --image <file>
  wardrobe-stylist suggest --request <json-file>
  wardrobe-stylist visualize --request <json-file> [--moodboard-out <png-file>] [--simple-lookbook]

The analyze image file may hold raw image bytes or base64 / data-URL text."
}

fn flag_value(args: &[String], index: usize, flag: &str) -> Result<PathBuf> {
    args.get(index)
        .filter(|value| !value.starts_with("--"))
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("Missing value for {flag}"))
}

fn parse_args(args: &[String]) -> Result<CliCommand> {
    let Some(subcommand) = args.get(1) else {
        return Err(anyhow!(usage()));
    };
    if matches!(subcommand.as_str(), "--help" | "-h" | "help") {
        return Ok(CliCommand::Help);
    }

    let mut image: Option<PathBuf> = None;
    let mut request: Option<PathBuf> = None;
    let mut moodboard_out: Option<PathBuf> = None;
    let mut simple_lookbook = false;

    let mut index = 2;
    while index < args.len() {
        match args[index].as_str() {
            "--image" => {
                index += 1;
                image = Some(flag_value(args, index, "--image")?);
            }
            "--request" => {
                index += 1;
                request = Some(flag_value(args, index, "--request")?);
            }
            "--moodboard-out" => {
                index += 1;
                moodboard_out = Some(flag_value(args, index, "--moodboard-out")?);
            }
            "--simple-lookbook" => {
                simple_lookbook = true;
            }
            "--help" | "-h" => {
                return Ok(CliCommand::Help);
            }
            other => {
                return Err(anyhow!("Unknown argument: {other}\n{}", usage()));
            }
        }
        index += 1;
    }

    match subcommand.as_str() {
        "analyze" => Ok(CliCommand::Analyze {
            image: image.ok_or_else(|| anyhow!("--image is required"))?,
        }),
        "suggest" => Ok(CliCommand::Suggest {
            request: request.ok_or_else(|| anyhow!("--request is required"))?,
        }),
        "visualize" => Ok(CliCommand::Visualize {
            request: request.ok_or_else(|| anyhow!("--request is required"))?,
            moodboard_out,
            simple_lookbook,
        }),
        other => Err(anyhow!("Unknown command: {other}\n{}", usage())),
    }
}

/// Raw image files become a data URL; anything else is taken as base64 text.
fn image_payload(bytes: Vec<u8>) -> Result<String> {
    if image::guess_format(&bytes).is_ok() {
        let mime_type = detect_mime_type(&bytes).unwrap_or_else(|| "image/jpeg".to_string());
        return Ok(format!(
            "data:{mime_type};base64,{}",
            general_purpose::STANDARD.encode(&bytes)
        ));
    }
    let text = String::from_utf8(bytes).context("Image file is neither an image nor text")?;
    Ok(text.trim().to_string())
}

async fn read_request<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid request JSON in {}", path.display()))
}

fn print_reply<T: Serialize>(reply: &ServiceReply<T>) -> Result<bool> {
    println!("{}", serde_json::to_string_pretty(&reply.body)?);
    if let Some(retry_after) = &reply.retry_after_header {
        eprintln!("Retry-After: {retry_after}");
    }
    info!("Reply status={} success={}", reply.status, reply.is_success());
    Ok(reply.is_success())
}

async fn run(state: &AppState, command: CliCommand) -> Result<bool> {
    match command {
        CliCommand::Analyze { image } => {
            let bytes = tokio::fs::read(&image)
                .await
                .with_context(|| format!("Failed to read {}", image.display()))?;
            let request = ImageRequest {
                image_base64: image_payload(bytes)?,
            };
            print_reply(&service::analyze(state, request).await)
        }
        CliCommand::Suggest { request } => {
            let request: StylistRequest = read_request(&request).await?;
            print_reply(&service::suggest(state, request).await)
        }
        CliCommand::Visualize {
            request,
            moodboard_out,
            simple_lookbook,
        } => {
            let mut request: VisualizationRequest = read_request(&request).await?;
            if simple_lookbook {
                request.lookbook_mode = LookbookMode::Simple;
            }
            let reply = service::visualize(state, request).await;
            if let (Some(path), Some(data)) = (moodboard_out, reply.body.data.as_ref()) {
                let png = general_purpose::STANDARD
                    .decode(&data.image_base64)
                    .context("Moodboard payload is not valid base64")?;
                tokio::fs::write(&path, png)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Moodboard written to {}", path.display());
            }
            print_reply(&reply)
        }
        CliCommand::Help => {
            println!("{}", usage());
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let command = match parse_args(&args) {
        Ok(CliCommand::Help) => {
            println!("{}", usage());
            return ExitCode::SUCCESS;
        }
        Ok(command) => command,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration error: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    let _guards = init_logging(&config.log_level, &config.logs_dir);
    info!(
        "Starting wardrobe stylist: command={} model={}",
        command.name(),
        config.gemini_model
    );
    if !config.strict_item_ids {
        warn!("STRICT_ITEM_IDS is off; suggested item ids are not checked against the wardrobe");
    }

    let state = match AppState::new(config) {
        Ok(state) => state,
        Err(err) => {
            error!("Failed to initialize pipeline: {err:#}");
            eprintln!("Failed to initialize pipeline: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(&state, command).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("Command failed: {err:#}");
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
