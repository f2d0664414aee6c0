//! tutor-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered with
//! `TUTOR_*` environment variables, opens the SQLite store and serves the
//! JSON API over HTTP.
//!
//! # Bootstrapping
//!
//! The first admin login has to exist before anything else can be created:
//!
//! ```text
//! tutor-server --create-admin root
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tutor_api::{AppState, MAX_TOKEN_TTL_HOURS, ServerConfig, auth};
use tutor_core::{principal::NewCredentials, store::IdentityStore};
use tutor_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Tutoring-centre registry server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,

  /// Create an admin principal with this login (password read from stdin)
  /// and exit.
  #[arg(long, value_name = "LOGIN")]
  create_admin: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    println!("{}", auth::hash_password(&password)?);
    return Ok(());
  }

  let settings = config::Config::builder()
    .set_default("host", "127.0.0.1")?
    .set_default("port", 8080_i64)?
    .set_default("store_path", "~/.local/share/tutor/registry.db")?
    .set_default("token_ttl_hours", 12_i64)?
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("TUTOR"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;
  server_cfg.token_ttl().with_context(|| {
    format!(
      "token_ttl_hours must be between 1 and {MAX_TOKEN_TTL_HOURS}, got {}",
      server_cfg.token_ttl_hours
    )
  })?;

  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  if let Some(login) = cli.create_admin {
    let password = read_password()?;
    auth::check_password_policy(&password)?;
    let principal = store
      .insert_admin(NewCredentials { login, password_hash: auth::hash_password(&password)? })
      .await
      .context("failed to create admin")?;
    println!("{}", principal.principal_id);
    return Ok(());
  }

  let address = format!("{}:{}", server_cfg.host, server_cfg.port);
  let app = tutor_api::router(AppState::new(store, server_cfg));

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read a password line from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
