use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use spotify_manager::catalog_store::{CatalogStore, EntityKind, ItemFilter, SqliteCatalogStore};
use spotify_manager::config::{AppConfig, CliConfig, FileConfig};
use spotify_manager::library::LibraryManager;
use spotify_manager::reconcile::{PassReport, Reconciler};
use spotify_manager::remote::{
    AppSession, SpotifyApi, SpotifyClient, SpotifyToken, TokenStore, UserSession,
};
use spotify_manager::snapshot::SnapshotReader;
use spotify_manager::transfer;

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(
    name = "spotify-manager",
    version = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH")),
    about = "Keeps a local catalog of your Spotify library"
)]
struct CliArgs {
    /// Path to the SQLite catalog database file.
    #[clap(long, global = true, value_parser = parse_path)]
    pub db: Option<PathBuf>,

    /// Path to a TOML config file. Its values override the command line.
    #[clap(long, global = true, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Where the Spotify user token is stored.
    #[clap(long, global = true, value_parser = parse_path)]
    pub token_path: Option<PathBuf>,

    #[clap(long, global = true, env = "SPOTIFY_CLIENT_ID", hide_env_values = true)]
    pub client_id: Option<String>,

    #[clap(long, global = true, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Print results as JSON.
    #[clap(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Adds an artist, album or track from its open.spotify.com link.
    Add { url: String },

    /// Deletes one item from the catalog and from the Spotify library.
    Delete { kind: KindArg, id: String },

    /// Lists the catalog.
    List {
        #[clap(default_value = "all")]
        what: ListTarget,
    },

    /// Reconciles the catalog with the Spotify library.
    Sync {
        #[clap(default_value = "all")]
        what: SyncTarget,
    },

    /// Removes artists that own nothing and unused genres.
    Cleanup,

    /// Writes every table to a text file.
    Export { file: PathBuf },

    /// Upserts the rows of a file written by `export`.
    Import { file: PathBuf },

    /// Writes a copy of the database file.
    Backup { file: PathBuf },

    /// Manages the stored Spotify user token.
    Token {
        #[command(subcommand)]
        command: TokenCommand,
    },
}

#[derive(Subcommand, Debug)]
enum TokenCommand {
    /// Stores a refresh token; the access token is obtained on first use.
    Set {
        #[clap(long)]
        refresh_token: String,
    },

    /// Shows whether a token is stored and when it expires.
    Status,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Artist,
    Album,
    Track,
}

impl From<KindArg> for EntityKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Artist => EntityKind::Artist,
            KindArg::Album => EntityKind::Album,
            KindArg::Track => EntityKind::Track,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ListTarget {
    All,
    Albums,
    Tracks,
    Artists,
    Genres,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SyncTarget {
    All,
    Artists,
    Albums,
    Tracks,
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to install the log subscriber")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let cli_config = CliConfig {
        db_path: cli_args.db.clone(),
        token_path: cli_args.token_path.clone(),
        client_id: cli_args.client_id.clone(),
        client_secret: cli_args.client_secret.clone(),
        ..Default::default()
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    let app = App {
        config,
        json: cli_args.json,
    };
    app.run(cli_args.command)
}

struct App {
    config: AppConfig,
    json: bool,
}

impl App {
    fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Add { url } => {
                let added = self.library_manager()?.add_from_url(&url)?;
                self.print(&added, || {
                    let remote = if added.mirrored { ", saved in Spotify" } else { "" };
                    println!("Added {} '{}' ({}){}", added.kind, added.name, added.id, remote);
                })
            }
            Command::Delete { kind, id } => {
                let kind = EntityKind::from(kind);
                let mut manager = LibraryManager::new(self.open_store()?);
                if let Some(user) = self.user_api()? {
                    manager = manager.with_user(user);
                }
                let deleted = manager.delete(kind, &id)?;
                if !deleted {
                    bail!("{} {} is not in the catalog", kind, id);
                }
                self.print(&id, || println!("Deleted {} {}", kind, id))
            }
            Command::List { what } => self.list(what),
            Command::Sync { what } => self.sync(what),
            Command::Cleanup => {
                let report = LibraryManager::new(self.open_store()?).cleanup()?;
                self.print(&report, || {
                    println!(
                        "Removed {} artists and {} genres",
                        report.artists_removed, report.genres_removed
                    )
                })
            }
            Command::Export { file } => {
                let store = self.open_store()?;
                let report = transfer::export_to_path(store.as_ref(), &file)
                    .with_context(|| format!("Export to {:?} failed", file))?;
                self.print(&report, || {
                    for (table, rows) in &report.rows {
                        println!("{}\t{}", table, rows);
                    }
                })
            }
            Command::Import { file } => {
                let store = self.open_store()?;
                let report = transfer::import_from_path(store.as_ref(), &file)
                    .with_context(|| format!("Import from {:?} failed", file))?;
                self.print(&report, || {
                    println!(
                        "Applied {} rows from {} tables, {} rejected",
                        report.applied,
                        report.blocks,
                        report.failed.len()
                    );
                    for failure in &report.failed {
                        println!("  [{}] line {}: {}", failure.table, failure.line, failure.reason);
                    }
                })
            }
            Command::Backup { file } => {
                let store = self.open_store()?;
                store.backup_to(&file)?;
                self.print(&file, || println!("Database copied to {:?}", file))
            }
            Command::Token { command } => self.token(command),
        }
    }

    fn print<T: Serialize>(&self, value: &T, text: impl FnOnce()) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text();
        }
        Ok(())
    }

    fn open_store(&self) -> Result<Arc<dyn CatalogStore>> {
        info!("Opening SQLite catalog database at {:?}...", self.config.db_path);
        let store = SqliteCatalogStore::new(&self.config.db_path)
            .with_context(|| format!("Failed to open {:?}", self.config.db_path))?;
        Ok(Arc::new(store))
    }

    /// Client acting as the signed-in user, `None` when no token is stored.
    fn user_api(&self) -> Result<Option<Arc<dyn SpotifyApi>>> {
        let Some(session) = UserSession::open(self.config.session_settings())? else {
            return Ok(None);
        };
        let client = SpotifyClient::new(&self.config.client_settings(), Arc::new(session))?;
        Ok(Some(Arc::new(client)))
    }

    fn library_manager(&self) -> Result<LibraryManager> {
        let user = self.user_api()?;
        let lookup: Arc<dyn SpotifyApi> = if self.config.has_client_credentials() {
            let session = AppSession::new(self.config.session_settings())?;
            Arc::new(SpotifyClient::new(
                &self.config.client_settings(),
                Arc::new(session),
            )?)
        } else if let Some(user) = &user {
            user.clone()
        } else {
            bail!("Set SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET, or sign in with `token set`");
        };

        let manager = LibraryManager::new(self.open_store()?).with_lookup(lookup);
        Ok(match user {
            Some(user) => manager.with_user(user),
            None => manager,
        })
    }

    fn list(&self, what: ListTarget) -> Result<()> {
        let store = self.open_store()?;
        match what {
            ListTarget::Artists => {
                let artists = store.list_artists()?;
                self.print(&artists, || {
                    for artist in &artists {
                        println!("{}\t{}\t{}", artist.id, artist.name, artist.genres.join(", "));
                    }
                })
            }
            ListTarget::Genres => {
                let genres = store.list_genres()?;
                self.print(&genres, || {
                    for genre in &genres {
                        println!("{}", genre.name);
                    }
                })
            }
            ListTarget::All | ListTarget::Albums | ListTarget::Tracks => {
                let filter = match what {
                    ListTarget::Albums => ItemFilter::Albums,
                    ListTarget::Tracks => ItemFilter::Tracks,
                    _ => ItemFilter::All,
                };
                let items = store.list_all(filter)?;
                self.print(&items, || {
                    for item in &items {
                        println!(
                            "{}\t{}\t{}\t{}\t{}\t{}",
                            item.kind,
                            item.artist_name,
                            item.release_year,
                            item.name,
                            item.genres.join(", "),
                            item.url
                        );
                    }
                })
            }
        }
    }

    fn sync(&self, what: SyncTarget) -> Result<()> {
        let Some(api) = self.user_api()? else {
            bail!(
                "Not signed in to Spotify: store a refresh token with `spotify-manager token set`"
            );
        };
        let reconciler = Reconciler::new(
            self.open_store()?,
            SnapshotReader::new(api, self.config.reader_settings()),
        );

        let kind = match what {
            SyncTarget::Artists => EntityKind::Artist,
            SyncTarget::Albums => EntityKind::Album,
            SyncTarget::Tracks => EntityKind::Track,
            SyncTarget::All => {
                let report = reconciler.sync_all();
                let passes: Vec<&PassReport> = report.passes().collect();
                self.print(&passes, || passes.iter().for_each(|p| print_pass(p)))?;
                return match report.failure {
                    Some((kind, e)) => Err(anyhow!("{} sync failed: {}", kind, e)),
                    None => Ok(()),
                };
            }
        };
        let report = reconciler.sync(kind)?;
        self.print(&report, || print_pass(&report))
    }

    fn token(&self, command: TokenCommand) -> Result<()> {
        let store = TokenStore::new(&self.config.token_path);
        match command {
            TokenCommand::Set { refresh_token } => {
                let refresh_token = refresh_token.trim().to_string();
                if refresh_token.is_empty() {
                    bail!("The refresh token is empty");
                }
                store.save(&SpotifyToken::from_refresh_token(refresh_token))?;
                if !self.config.has_client_credentials() {
                    warn!("No client credentials configured, the token cannot be refreshed yet");
                }
                println!("Token stored in {:?}", store.path());
                Ok(())
            }
            TokenCommand::Status => match store.load()? {
                None => {
                    println!("Not signed in ({:?} does not exist)", store.path());
                    Ok(())
                }
                Some(token) if token.is_expired() => {
                    println!("Signed in, access token expired: it is refreshed on next use");
                    Ok(())
                }
                Some(token) => {
                    println!("Signed in, access token valid until {}", token.expires_at);
                    Ok(())
                }
            },
        }
    }
}

fn print_pass(report: &PassReport) {
    println!(
        "{}: {} remote, {} added, {} removed, {} kept, {} failed",
        report.kind,
        report.remote_total,
        report.added,
        report.removed,
        report.retained,
        report.failures.len()
    );
    for failure in &report.failures {
        println!("  {}", failure);
    }
}
