// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use rollcall::{
    config::{BackendKind, Settings},
    http,
    path::default_config_path,
    service::AttendanceService,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{
    path::{Path, PathBuf},
    process::exit,
    sync::Arc,
};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  rollcall [options] <rollcall-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to settings file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Store adapter to use instead of the configured one.
    #[arg(short, long, global = true, value_name = "kind")]
    pub backend: Option<BackendKind>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let mut settings = load_settings(self.config.as_deref())?;
        if let Some(backend) = self.backend {
            settings.backend.kind = backend;
        }

        match self.command {
            Command::Serve(opts) => run_serve(settings, opts).await,
            Command::Export(opts) => run_export(settings, opts).await,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Serve attendance API and static frontend.
    #[command(override_usage = "rollcall serve [options]")]
    Serve(ServeOptions),

    /// Print attendance matrix of target week as JSON.
    #[command(override_usage = "rollcall export [options] <date>...")]
    Export(ExportOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ServeOptions {
    /// Port to listen on.
    #[arg(short, long, value_name = "port")]
    pub port: Option<u16>,

    /// Directory of static frontend files.
    #[arg(short, long, value_name = "path")]
    pub static_dir: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ExportOptions {
    /// Dates of the week in display order.
    #[arg(required = true, value_name = "date")]
    pub week_dates: Vec<String>,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer().compact().with_target(false);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let (path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (default_config_path()?, false),
    };

    let mut settings = match std::fs::read_to_string(&path) {
        Ok(data) => data
            .parse::<Settings>()
            .with_context(|| format!("invalid settings file {:?}", path.display()))?,
        Err(error) if !explicit && error.kind() == std::io::ErrorKind::NotFound => {
            Settings::default()
        }
        Err(error) => {
            return Err(error).with_context(|| format!("cannot read settings file {:?}", path.display()))
        }
    };
    settings.apply_env()?;

    Ok(settings)
}

async fn run_serve(mut settings: Settings, opts: ServeOptions) -> Result<()> {
    if let Some(port) = opts.port {
        settings.server.port = port;
    }
    if let Some(static_dir) = opts.static_dir {
        settings.server.static_dir = static_dir;
    }

    let service = Arc::new(AttendanceService::open(settings.build_store()?).await);
    let static_dir = settings.server.static_dir.as_path();
    let static_dir = static_dir.is_dir().then_some(static_dir);
    if static_dir.is_none() {
        info!(
            "static directory {:?} not found, serving API only",
            settings.server.static_dir.display()
        );
    }

    let router = http::router(service, static_dir);
    let listener = TcpListener::bind(("0.0.0.0", settings.server.port))
        .await
        .with_context(|| format!("cannot bind port {}", settings.server.port))?;
    http::serve(listener, router).await?;

    Ok(())
}

async fn run_export(settings: Settings, opts: ExportOptions) -> Result<()> {
    let service = AttendanceService::open(settings.build_store()?).await;
    let matrix = service.build_matrix(opts.week_dates.as_slice()).await;
    println!("{}", serde_json::to_string_pretty(&matrix)?);

    Ok(())
}
