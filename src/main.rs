//! # Stash CLI (`stash`)
//!
//! The `stash` binary serves the REST backend and acts as its client.
//!
//! ## Usage
//!
//! ```bash
//! stash --config ./config/stash.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `stash init` | Create the SQLite database and run schema migrations |
//! | `stash serve` | Start the REST server |
//! | `stash user add <email>` | Create an account directly in the database |
//! | `stash login <email>` | Log in and store the session |
//! | `stash logout` | Forget the stored session |
//! | `stash add` | Add a bookmark or note |
//! | `stash edit <id>` | Change a bookmark's url, notes, or tags |
//! | `stash rm <id>` | Delete a bookmark |
//! | `stash list` | Load, filter, and print bookmarks grouped by domain |
//! | `stash find <term>` | Server-side substring search |
//!
//! Logging goes to stderr and is controlled by `STASH_LOG`
//! (e.g. `STASH_LOG=stash=debug`).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use stash::browse;
use stash::client::{self, HttpRecordStore};
use stash::config::{self, Config};
use stash_core::models::BookmarkDraft;
use stash_core::store::{RecordStore, StoreError};
use stash::progress::ProgressMode;
use stash::session::{FileSession, Session, SessionData};
use stash::sync::{Notice, SyncController, SyncOptions, SyncPhase};

/// Stash CLI: a self-hosted bookmark and notes manager.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Client commands work without one.
#[derive(Parser)]
#[command(
    name = "stash",
    about = "Stash: a self-hosted bookmark and notes manager",
    version,
    long_about = "Stash stores bookmarks and notes behind a small REST API and \
    provides a client that loads them progressively, searches them with a fuzzy \
    index, and prints them grouped by domain."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/stash.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Start the REST server on `[server].bind`.
    Serve,

    /// Manage accounts directly in the database.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Log in and store the session token.
    Login {
        email: String,

        #[arg(long)]
        password: String,

        /// Server base URL. Defaults to `[client].base_url`.
        #[arg(long)]
        server: Option<String>,
    },

    /// Forget the stored session.
    Logout,

    /// Add a bookmark (with --url) or a note (with --notes only).
    Add {
        #[arg(long)]
        url: Option<String>,

        #[arg(long, default_value = "")]
        notes: String,

        /// Comma-separated tags.
        #[arg(long, default_value = "")]
        tags: String,
    },

    /// Change a bookmark. Omitted fields keep their current value;
    /// `--url ""` turns a bookmark into a note.
    Edit {
        id: i64,

        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        #[arg(long)]
        tags: Option<String>,
    },

    /// Delete a bookmark.
    Rm { id: i64 },

    /// Load all bookmarks and print the visible page grouped by domain.
    List {
        /// Fuzzy search query.
        #[arg(long, short)]
        query: Option<String>,

        /// Only records without a URL.
        #[arg(long)]
        notes_only: bool,

        /// Reveal this many extra steps beyond the first page.
        #[arg(long, default_value_t = 0)]
        more: usize,

        /// Progress output: off, human, or json (stderr).
        /// Defaults to human when stderr is a terminal.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Case-insensitive substring search on the server.
    Find { term: String },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create an account.
    Add {
        email: String,

        #[arg(long)]
        password: String,
    },
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_env("STASH_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(match cli.command {
        Commands::Serve => "info",
        _ => "warn",
    });

    // Server-side commands need a real config file
    match &cli.command {
        Commands::Init => {
            let cfg = config::load_config(&cli.config)?;
            stash::migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
            return Ok(());
        }
        Commands::Serve => {
            let cfg = config::load_config(&cli.config)?;
            stash::server::run_server(&cfg).await?;
            return Ok(());
        }
        Commands::User {
            action: UserAction::Add { email, password },
        } => {
            let cfg = config::load_config(&cli.config)?;
            let pool = stash::db::connect(&cfg).await?;
            stash::migrate::migrate_pool(&pool).await?;
            let user = stash::auth::create_user(&pool, email, password).await?;
            pool.close().await;
            println!("Created user {} (id {}).", user.email, user.id);
            return Ok(());
        }
        _ => {}
    }

    let cfg = config::load_config_or_default(&cli.config)?;
    let session_path = cfg.client.session_file();

    match cli.command {
        Commands::Login {
            email,
            password,
            server,
        } => {
            let base_url = server.unwrap_or_else(|| cfg.client.base_url.clone());
            let resp = client::login(&base_url, &email, &password).await?;
            FileSession::save(
                &session_path,
                SessionData {
                    base_url,
                    token: resp.token,
                    email: resp.user.email.clone(),
                },
            )?;
            println!("Logged in as {}.", resp.user.email);
        }
        Commands::Logout => {
            let session = FileSession::load(&session_path)?;
            if session.is_valid() {
                session.invalidate();
                println!("Logged out.");
            } else {
                println!("Not logged in.");
            }
        }
        Commands::Add { url, notes, tags } => {
            let mut sync = controller(&cfg, &session_path, ProgressMode::Off)?;
            let draft = BookmarkDraft::new(url.as_deref(), &notes, &tags);
            let record = sync.add(draft).await.map_err(store_error)?;
            println!("Added [{}] {}", record.id, record.title);
        }
        Commands::Edit {
            id,
            url,
            notes,
            tags,
        } => {
            let mut sync = controller(&cfg, &session_path, ProgressMode::Off)?;
            load(&mut sync).await?;
            let existing = sync
                .state()
                .superset()
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .ok_or(StoreError::NotFound(id))?;
            let draft = BookmarkDraft::new(
                url.as_deref().or(existing.url.as_deref()),
                notes.as_deref().unwrap_or(&existing.notes),
                tags.as_deref().unwrap_or(&existing.tags),
            );
            let record = sync.update(id, draft).await.map_err(store_error)?;
            println!("Updated [{}] {}", record.id, record.title);
        }
        Commands::Rm { id } => {
            let mut sync = controller(&cfg, &session_path, ProgressMode::Off)?;
            sync.delete(id).await.map_err(store_error)?;
            println!("Deleted [{}]", id);
        }
        Commands::List {
            query,
            notes_only,
            more,
            progress,
        } => {
            let mode = ProgressMode::from_flag(progress.as_deref())?;
            let mut sync = controller(&cfg, &session_path, mode)?;
            load(&mut sync).await?;

            sync.set_notes_only(notes_only);
            if let Some(query) = query {
                sync.search_now(query);
            }
            // One reveal per cooldown window, as a scrolling client would.
            let cooldown = cfg.sync.reveal().cooldown;
            let start = Instant::now();
            for step in 0..more {
                sync.reveal_more(start + cooldown * step as u32);
            }
            print!("{}", browse::render(sync.state()));
        }
        Commands::Find { term } => {
            let (session, store) = remote(&cfg, &session_path)?;
            match store.search_substring(&term).await {
                Ok(records) => print!("{}", browse::render_list(&records)),
                Err(err) => {
                    if err.is_unauthorized() {
                        session.invalidate();
                    }
                    return Err(store_error(err));
                }
            }
        }
        Commands::Init | Commands::Serve | Commands::User { .. } => {
            // Handled above (before loading the client config)
        }
    }

    Ok(())
}

/// Opens the stored session and an HTTP store pointed at its server.
fn remote(
    cfg: &Config,
    session_path: &std::path::Path,
) -> anyhow::Result<(Arc<FileSession>, Arc<HttpRecordStore>)> {
    let session = Arc::new(FileSession::load(session_path)?);
    let Some(data) = session.data() else {
        anyhow::bail!("Not logged in. Run `stash login <email> --password <password>` first.");
    };
    let base_url = if data.base_url.is_empty() {
        cfg.client.base_url.clone()
    } else {
        data.base_url
    };
    let store = Arc::new(HttpRecordStore::new(base_url, session.clone()));
    Ok((session, store))
}

fn controller(
    cfg: &Config,
    session_path: &std::path::Path,
    mode: ProgressMode,
) -> anyhow::Result<SyncController> {
    let (session, store) = remote(cfg, session_path)?;
    Ok(
        SyncController::new(store, session, SyncOptions::from_config(cfg))
            .with_progress(mode.reporter()),
    )
}

/// Runs a full two-phase load and turns terminal failures into errors.
async fn load(sync: &mut SyncController) -> anyhow::Result<()> {
    sync.reload();
    sync.run_until_settled().await;
    match (sync.phase(), sync.notice()) {
        (SyncPhase::Halted, _) => Err(store_error(StoreError::Unauthorized(
            "session rejected".to_string(),
        ))),
        (SyncPhase::Failed, Some(Notice::Error(message))) => {
            anyhow::bail!("Failed to load bookmarks: {}", message)
        }
        (_, Some(Notice::Warning(message))) => {
            eprintln!("warning: {}", message);
            Ok(())
        }
        _ => Ok(()),
    }
}

fn store_error(err: StoreError) -> anyhow::Error {
    match err {
        StoreError::Unauthorized(_) => {
            anyhow::anyhow!("Session expired or invalid. Run `stash login` again.")
        }
        other => other.into(),
    }
}
