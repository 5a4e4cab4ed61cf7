// Copyright 2026 Webmirror Contributors
// SPDX-License-Identifier: MIT

//! webmirror: capture, verify and publish a web client bundle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use webmirror::fetch::Fetch;
use webmirror::{build_target, publisher_from_config, HttpFetcher, RunFailure, RunOptions, TargetKind};
use webmirror_cli::{config, output};

#[derive(Parser)]
#[command(
    name = "webmirror",
    about = "Mirror a single-page web client once its entry document and manifest stop changing",
    version
)]
struct Cli {
    /// Path to a JSON config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log line format on stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture, mirror and publish one target (default).
    Run {
        /// Which bundle to capture.
        #[arg(long, default_value = "web-client", value_parser = parse_target)]
        target: TargetKind,

        /// Give up after this many attempts; 0 removes the ceiling.
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Mirror everything even when the published documents match.
        #[arg(long)]
        force: bool,

        /// Stage and verify but do not publish.
        #[arg(long)]
        no_publish: bool,
    },

    /// Load and validate the configuration, then print it.
    CheckConfig,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   webmirror completions bash > ~/.local/share/bash-completion/completions/webmirror
    ///   webmirror completions zsh > ~/.zfunc/_webmirror
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

fn parse_target(raw: &str) -> Result<TargetKind, String> {
    raw.parse::<TargetKind>().map_err(|e| e.to_string())
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    let command = cli.command.unwrap_or(Commands::Run {
        target: TargetKind::WebClient,
        max_attempts: None,
        force: false,
        no_publish: false,
    });

    let result = match command {
        Commands::Run {
            target,
            max_attempts,
            force,
            no_publish,
        } => {
            run(
                cli.config.as_deref(),
                target,
                max_attempts,
                RunOptions { force },
                no_publish,
                cli.json,
            )
            .await
        }
        Commands::CheckConfig => check_config(cli.config.as_deref(), cli.json),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "webmirror", &mut std::io::stdout());
            Ok(())
        }
    };

    // 0=success, 1=error
    if let Err(e) = &result {
        if cli.json {
            match e.downcast_ref::<RunFailure>() {
                Some(failure) => output::print_json(&output::failure_json(failure)),
                None => output::print_json(&serde_json::json!({
                    "error": true,
                    "message": format!("{e:#}"),
                })),
            }
        } else {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(
    config_path: Option<&Path>,
    target: TargetKind,
    max_attempts: Option<u32>,
    options: RunOptions,
    no_publish: bool,
    json: bool,
) -> anyhow::Result<()> {
    let (path, mut config) = config::load(config_path)?;
    if let Some(n) = max_attempts {
        config.acquisition.max_attempts = (n > 0).then_some(n);
    }
    config
        .validate()
        .with_context(|| format!("config {}", path.display()))?;

    let fetcher: Arc<dyn Fetch> =
        Arc::new(HttpFetcher::new(&config.origin).context("failed to build HTTP client")?);
    let publisher = if no_publish {
        None
    } else {
        Some(publisher_from_config(&config.publish)?)
    };

    let target = build_target(target, config, fetcher)?;
    tracing::info!(kind = %target.kind(), force = options.force, "run requested");
    let report = target.run(publisher.as_deref(), &options).await?;
    output::print_report(&report, json);
    Ok(())
}

fn check_config(config_path: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let (path, config) = config::load(config_path)?;
    config
        .validate()
        .with_context(|| format!("config {}", path.display()))?;

    if json {
        output::print_json(&serde_json::json!({
            "path": path,
            "exists": path.exists(),
            "config": config,
        }));
    } else {
        let source = if path.exists() { "" } else { " (not found, defaults)" };
        println!("  Config: {}{source}", path.display());
        output::print_json(&config);
    }
    Ok(())
}
