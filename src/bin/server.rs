use std::{
    fs::OpenOptions,
    net::SocketAddr,
    path::{Path, PathBuf},
    process::exit,
    sync::Arc,
};

use axum::{
    Router,
    extract::{MatchedPath, Request},
};
use axum_server::Handle;
use clap::Parser;
use rusqlite::Connection;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

use moneyboard::{
    AppState, CommandBridge, CommandInstaller, CommandScraper, PaginationConfig, build_router,
    get_local_offset, graceful_shutdown, spawn_scheduler,
};

/// The REST API server for moneyboard.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long, env = "MONEYBOARD_DB_PATH")]
    db_path: String,

    /// The port to serve the API from.
    #[arg(short, long, env = "MONEYBOARD_PORT", default_value_t = 3000)]
    port: u16,

    /// The canonical name of the local timezone, e.g. "Asia/Jerusalem".
    #[arg(long, env = "MONEYBOARD_TIMEZONE", default_value = "Asia/Jerusalem")]
    timezone: String,

    /// The program that scrapes a vendor and prints its transactions as JSON.
    #[arg(long, env = "MONEYBOARD_SCRAPER_COMMAND", default_value = "moneyboard-scraper")]
    scraper_command: PathBuf,

    /// The program that pairs with and sends messages over WhatsApp.
    #[arg(long, env = "MONEYBOARD_WHATSAPP_COMMAND", default_value = "moneyboard-whatsapp")]
    whatsapp_command: PathBuf,

    /// The program that checks for and installs scraper library versions.
    ///
    /// The library updater is disabled when this is not set.
    #[arg(long, env = "MONEYBOARD_LIBRARY_COMMAND")]
    library_command: Option<PathBuf>,

    /// File path for the debug log.
    #[arg(long, env = "MONEYBOARD_LOG_PATH", default_value = "debug.log")]
    log_path: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    setup_logging(&args.log_path);

    if get_local_offset(&args.timezone).is_none() {
        tracing::error!("\"{}\" is not a valid timezone", args.timezone);
        exit(1);
    }

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));

    let connection = match Connection::open(&args.db_path) {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not open database at {}: {error}", args.db_path);
            exit(1);
        }
    };

    let app_state = match AppState::new(
        connection,
        &args.timezone,
        PaginationConfig::default(),
        Arc::new(CommandScraper::new(args.scraper_command)),
        Arc::new(CommandBridge::new(args.whatsapp_command)),
    ) {
        Ok(app_state) => app_state,
        Err(error) => {
            tracing::error!("could not initialize the database: {error}");
            exit(1);
        }
    };

    let app_state = match args.library_command {
        Some(library_command) => {
            app_state.with_library_installer(Arc::new(CommandInstaller::new(library_command)))
        }
        None => {
            tracing::info!("no library command given, the library updater is disabled");
            app_state
        }
    };

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    let scheduler = spawn_scheduler(app_state.clone());

    let router = add_tracing_layer(build_router(app_state));

    tracing::info!("HTTP server listening on {}", addr);
    if let Err(error) = axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await
    {
        tracing::error!("server error: {error}");
    }

    scheduler.abort();
}

fn setup_logging(log_path: &Path) {
    let stdout_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    let debug_log = match OpenOptions::new().create(true).append(true).open(log_path) {
        Ok(log_file) => Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(log_file))
                .with_filter(filter::LevelFilter::DEBUG),
        ),
        Err(error) => {
            eprintln!("Could not open log file {log_path:?}: {error}");
            None
        }
    };

    tracing_subscriber::registry()
        .with(stdout_log)
        .with(debug_log)
        .init();
}

fn add_tracing_layer(router: Router) -> Router {
    let tracing_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            tracing::debug_span!("request", %method, %uri, matched_path)
        })
        // By default, `TraceLayer` will log 5xx responses but we're doing our specific
        // logging of errors so disable that
        .on_failure(());

    router.layer(tracing_layer)
}
