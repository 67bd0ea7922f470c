//! # anon-board Binary
//!
//! Assembles the board from configuration and exposes it either as a web
//! server (`serve`) or through one-shot operator commands.

use std::sync::Arc;

use ab_api::handlers::AppState;
use ab_api::{configure_routes, middleware};
use ab_config::Settings;
use ab_core::models::{EntryId, EntryPatch};
use ab_core::traits::EntryStore;
use ab_core::Board;
use ab_markup::RestrictedMarkdown;
use actix_web::{web, App, HttpServer};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "db-sqlite")]
use ab_db_sqlite::SqliteEntryStore;

#[cfg(not(feature = "db-sqlite"))]
use ab_core::memory::MemoryEntryStore;

#[derive(Parser)]
#[command(name = "anon-board")]
#[command(about = "Anonymous threaded comment board", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web server
    Serve {
        /// Overrides `server.host`
        #[arg(long)]
        host: Option<String>,

        /// Overrides `server.port`
        #[arg(long)]
        port: Option<u16>,
    },

    /// Create the database schema
    Init,

    /// Find or create a root post by title
    Post {
        title: String,
        content: Option<String>,
        name: Option<String>,
    },

    /// Add an entry with any name; a reply when `--reply-to` is given
    Create {
        content: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        reply_to: Option<EntryId>,
    },

    /// Reply as the operator
    Comment {
        content: String,
        parent_id: EntryId,

        #[arg(long)]
        title: Option<String>,
    },

    /// Edit an entry
    Change {
        id: EntryId,

        #[arg(long)]
        content: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        name: Option<String>,

        /// Move the entry under another parent
        #[arg(long)]
        parent: Option<EntryId>,
    },

    /// Delete an entry together with all of its replies
    Del { id: EntryId },

    /// Print one entry
    Get { id: EntryId },

    /// Print every reply
    Check,

    /// Print the reply tree under a root as JSON
    Tree { id: EntryId },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(feature = "db-sqlite")]
async fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn EntryStore>> {
    let store =
        SqliteEntryStore::connect(&settings.database.url, settings.database.max_connections)
            .await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "db-sqlite"))]
async fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn EntryStore>> {
    tracing::warn!(url = %settings.database.url, "built without db-sqlite; entries are kept in memory");
    Ok(Arc::new(MemoryEntryStore::new()))
}

async fn serve(board: Board, settings: &Settings, host: String, port: u16) -> anyhow::Result<()> {
    let state = web::Data::new(AppState {
        board,
        index_order: settings.board.index_order,
    });

    info!("anon-board starting on http://{host}:{port}");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::security_headers())
            .wrap(middleware::standard_middleware())
            .configure(configure_routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await?;
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load()?;
    init_tracing(settings.log.json);

    let store = open_store(&settings).await?;
    let board = Board::new(
        store,
        Box::new(RestrictedMarkdown::new()),
        settings.board.operator_name.clone(),
    );

    match cli.command {
        Commands::Serve { host, port } => {
            let (default_host, default_port) = settings.bind_address();
            serve(
                board,
                &settings,
                host.unwrap_or(default_host),
                port.unwrap_or(default_port),
            )
            .await?;
        }
        Commands::Init => {
            // Opening the store already ensured the schema.
            println!("initialized {}", settings.database.url);
        }
        Commands::Post { title, content, name } => {
            let resolved = board
                .admin_create_root(&title, content.as_deref(), name.as_deref())
                .await?;
            let verb = if resolved.created { "added" } else { "exists" };
            println!("{verb} {}", resolved.entry.id);
        }
        Commands::Create { content, title, name, reply_to } => {
            let id = board
                .admin_create(&content, reply_to, title.as_deref(), name.as_deref())
                .await?;
            println!("created {id}");
        }
        Commands::Comment { content, parent_id, title } => {
            let id = board
                .admin_create_reply(&content, parent_id, title.as_deref())
                .await?;
            println!("added {id}");
        }
        Commands::Change { id, content, title, name, parent } => {
            let patch = EntryPatch { content, title, name, parent_id: parent };
            print_json(&board.admin_edit(id, patch).await?)?;
        }
        Commands::Del { id } => {
            let removed = board.admin_delete(id).await?;
            for id in removed {
                println!("deleted {id}");
            }
        }
        Commands::Get { id } => print_json(&board.get(id).await?)?,
        Commands::Check => {
            for reply in board.list_replies().await? {
                println!("{}", serde_json::to_string(&reply)?);
            }
        }
        Commands::Tree { id } => print_json(&board.render_tree(id).await?)?,
    }
    Ok(())
}
