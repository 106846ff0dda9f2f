use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use presenton_kernel::schools::UniversityDirectory;
use presenton_kernel::tooling::log_event;
use presenton_kernel::{default_registry, serve, AppState, ServerConfig, Settings};
use serde_json::json;

const DEFAULT_CONFIG_FILE: &str = "presenton.toml";

#[derive(Parser, Debug)]
#[command(name = "presenton-server")]
#[command(about = "Serve the presentation backend API")]
struct CliOptions {
    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 picks a free port)
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// App data directory (defaults to APP_DATA_DIRECTORY or ./app_data)
    #[arg(long = "data-dir")]
    data_dir: Option<PathBuf>,

    /// Server config file (TOML)
    #[arg(long = "config", short = 'c')]
    config: Option<PathBuf>,

    /// University snapshot file (defaults to <data-dir>/universities.json)
    #[arg(long = "schools")]
    schools: Option<PathBuf>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn load_server_config(path: Option<&PathBuf>) -> Result<ServerConfig> {
    match path {
        Some(path) => ServerConfig::load(path),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default.is_file() {
                ServerConfig::load(&default)
            } else {
                Ok(ServerConfig::default())
            }
        }
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse();
    let mut config = load_server_config(options.config.as_ref())?;
    if let Some(host) = options.host {
        config.host = host;
    }
    if let Some(port) = options.port {
        config.port = port;
    }
    if options.data_dir.is_some() {
        config.data_dir = options.data_dir;
    }
    if options.schools.is_some() {
        config.schools_file = options.schools;
    }

    let registry = default_registry();
    let mut ctx = registry.context();

    let (settings, warnings) = Settings::effective();
    for warning in &warnings {
        log_event(&mut ctx, "warn", warning, None);
    }
    let data_dir = config
        .data_dir
        .clone()
        .unwrap_or_else(|| settings.app_data_directory());
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("unable to create data directory {}", data_dir.display()))?;

    let directory = match &config.schools_file {
        Some(path) => UniversityDirectory::open(path)?,
        None => UniversityDirectory::open_in(&data_dir)?,
    };
    let school_count = directory.len();
    let state = Arc::new(AppState::new(settings, data_dir.clone(), directory));

    let host = serve(&mut ctx, &config.host, config.port, state)?;
    log_event(
        &mut ctx,
        "info",
        "presenton server listening",
        Some(json!({
            "url": host["url"],
            "bind": config.addr(),
            "dataDir": data_dir.display().to_string(),
            "universities": school_count
        })),
    );

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })?;
    while running.load(Ordering::SeqCst) && ctx.running_http_hosts() > 0 {
        thread::sleep(Duration::from_millis(200));
    }
    ctx.stop_all_http_hosts();
    log_event(&mut ctx, "info", "presenton server stopped", None);
    Ok(())
}
