use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use foldermirror::config::MirrorConfig;
use foldermirror::coordinator::RunCoordinator;
use foldermirror::logging;
use foldermirror_core::DriveClient;
use tracing::{info, warn};

const USAGE: &str = "Usage: foldermirror [--destination <path>] <folder-id>...";

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliArgs {
    root_ids: Vec<String>,
    destination: Option<PathBuf>,
    ignored: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliMode {
    Run(CliArgs),
    Help,
}

fn parse_cli<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs {
        root_ids: Vec::new(),
        destination: None,
        ignored: Vec::new(),
    };
    let mut args = args.into_iter().skip(1);
    while let Some(arg) = args.next() {
        if !arg.starts_with('-') {
            parsed.root_ids.push(arg);
            continue;
        }
        let option = arg.trim_start_matches('-');
        match option.split_once('=') {
            Some(("destination", value)) => parsed.destination = Some(PathBuf::from(value)),
            _ => match option {
                "destination" => {
                    let value = args
                        .next()
                        .with_context(|| format!("{arg} requires a path"))?;
                    parsed.destination = Some(PathBuf::from(value));
                }
                "help" | "h" => return Ok(CliMode::Help),
                _ => parsed.ignored.push(arg),
            },
        }
    }
    if parsed.root_ids.is_empty() {
        anyhow::bail!("no folder ids given\n{USAGE}");
    }
    Ok(CliMode::Run(parsed))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = match parse_cli(std::env::args())? {
        CliMode::Help => {
            println!("{USAGE}");
            println!("  --destination <path>   Mirror into <path> instead of the working directory");
            return Ok(());
        }
        CliMode::Run(args) => args,
    };

    let config = MirrorConfig::from_env()?.with_destination(args.destination);
    logging::init(&config.log)?;
    for option in &args.ignored {
        warn!(option = %option, "ignoring unrecognized option");
    }

    let client = match config.api_url.as_deref() {
        Some(url) => DriveClient::with_base_url(url, config.token.clone()),
        None => DriveClient::new(config.token.clone()),
    }
    .context("failed to build API client")?;

    info!(
        roots = args.root_ids.len(),
        destination = %config.destination.display(),
        "mirror run starting"
    );
    RunCoordinator::new(Arc::new(client), config.destination.clone())
        .with_policy(config.retry)
        .with_transfer_config(config.transfer)
        .run(&args.root_ids)
        .await;
    Ok(())
}
