use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use choretrack::auth::StaticTokens;
use choretrack::config::Config;
use choretrack::db::Database;
use choretrack::logging;
use choretrack::notify::Notifier;
use choretrack::photos::PhotoStore;
use choretrack::repository::ChoreRepository;
use choretrack::server::{self, AppState};

#[derive(Debug, Default)]
struct Args {
    config_path: Option<PathBuf>,
    bind: Option<String>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("choretrack {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                parsed.config_path = Some(PathBuf::from(option_value(&args, i)));
                i += 1;
            }
            "--bind" | "-b" => {
                parsed.bind = Some(option_value(&args, i).to_string());
                i += 1;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    parsed
}

fn option_value(args: &[String], i: usize) -> &str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires an argument", args[i]);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"choretrack - chore tracking server

USAGE:
    choretrack [OPTIONS]

OPTIONS:
    --config, -c PATH   Path to config file
    --bind, -b ADDR     Listen address (overrides server.bind)
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    CHORETRACK_CONFIG   Path to config file (overrides default location)
    CHORETRACK_LOG      Log filter (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/choretrack/config.toml"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    let mut config = match args.config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    logging::init(config.log_dir.clone())?;

    let db = Database::open(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;
    db.initialize().context("Failed to initialize database")?;
    let db = Arc::new(db);

    let tokens = StaticTokens::provision(&db, &config.auth.tokens)
        .context("Failed to provision bearer tokens")?;
    if config.auth.tokens.is_empty() {
        warn!("No tokens configured under [auth.tokens]; every API request will be rejected");
    }

    let photos = PhotoStore::from_config(&config.uploads);
    let repo = ChoreRepository::new(db, photos, Arc::new(Notifier::new()));
    let state = AppState::new(Arc::new(repo), Arc::new(tokens))
        .with_expose_errors(!config.server.is_production())
        .with_body_limit(config.uploads.max_bytes);

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(
        address = %listener.local_addr()?,
        environment = %config.server.environment,
        "Server listening"
    );

    server::serve(listener, state).await?;
    info!("Server stopped");
    Ok(())
}
