use actix::prelude::*;
use actix_files::Files;
use actix_session::config::PersistentSession;
use actix_session::{
    storage::{CookieSessionStore, RedisSessionStore},
    SessionMiddleware,
};
use actix_web::{cookie::{Key, SameSite}, web, App, HttpServer};
use deadpool_redis::{Config as RedisConfig, Runtime};
use path_clean::PathClean;
use std::sync::Arc;

mod actors;
mod bridge;
mod config;
mod dom;
mod errors;
mod logger;
mod playground;
mod routing;
mod session;
mod static_assets;
mod store;
mod tour;

use actors::tour_socket::TourSetup;
use actors::ws_server::WsServer;
use store::{clear_everywhere, open_store, CompletionFlag, ScopedStore};

use clap::Parser;

#[derive(Parser)]
#[command(name = "ai-tour")]
#[command(about = "Guided onboarding tour for the AI chat assistant.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Runs the tour server
    Serve,
    /// Plays a first visit against the built-in playground page
    Simulate,
    /// Forgets that the tour was completed
    ResetFlag {
        /// Only forget it for this viewer id
        #[arg(long)]
        viewer: Option<String>,
    },
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();
    let log_level = config::CONFIG.log_level.as_deref().unwrap_or("info");
    logger::init_logger(log_level);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server().await,
        Commands::Simulate => playground::run_simulation(Arc::new(config::CONFIG.tour.clone()))
            .await
            .map_err(|e| std::io::Error::other(e.to_string())),
        Commands::ResetFlag { viewer } => {
            let tour_config = &config::CONFIG.tour;
            let store = open_store(tour_config.storage_path.as_deref());
            match viewer {
                Some(viewer) => {
                    CompletionFlag::new(Arc::new(ScopedStore::new(store, &viewer)), &tour_config.completion_key).clear();
                    println!("The tour will open again on {}'s next visit.", viewer);
                }
                None => {
                    let cleared = clear_everywhere(store.as_ref(), &tour_config.completion_key)
                        .map_err(|e| std::io::Error::other(e.to_string()))?;
                    println!("Cleared {} completion flag(s). The tour will open again on the next visit.", cleared);
                }
            }
            Ok(())
        }
    }
}

async fn run_server() -> std::io::Result<()> {
    let tour_config = Arc::new(config::CONFIG.tour.clone());
    let host = config::CONFIG.host().to_string();
    let port = config::CONFIG.port();

    // --- Actor Initialization ---

    // Every attached page gets its own mirror and tour from this setup.
    let ws_server = WsServer::new().start();
    let tour_setup = TourSetup {
        config: tour_config.clone(),
        store: open_store(tour_config.storage_path.as_deref()),
    };

    // Prepare a runtime session store and secret key. Without a session
    // section we fall back to cookies and a fixed key so the middleware type
    // stays the same across configurations.
    let (runtime_store, runtime_secret): (session::RuntimeSessionStore, Key) = if let Some(session_config) = &config::CONFIG.session {
        let secret_key = match Key::try_from(session_config.secret_key.as_bytes()) {
            Ok(key) => key,
            Err(e) => {
                println!("Your `secret_key` in `config.yaml` is not long enough. It needs to be at least 64 characters long for security. Please generate a new, longer key.");
                println!("Details: {}", e);
                std::process::exit(1);
            }
        };
        let store = match session_config.backend {
            config::SessionBackend::Cookie => session::RuntimeSessionStore::Cookie(Arc::new(CookieSessionStore::default())),
            config::SessionBackend::Memory => session::RuntimeSessionStore::InMemory(session::InMemoryBackend::new()),
            config::SessionBackend::Redis => {
                let Some(redis_url) = session_config.redis_url.as_ref() else {
                    println!("The redis session backend needs a `redis_url` in `config.yaml`.");
                    std::process::exit(1);
                };
                let mut redis_cfg = RedisConfig::from_url(redis_url);
                redis_cfg.pool = Some(deadpool_redis::PoolConfig {
                    max_size: session_config.redis_pool_size.unwrap_or(10) as usize,
                    ..Default::default()
                });
                let redis_pool = redis_cfg
                    .create_pool(Some(Runtime::Tokio1))
                    .map_err(|e| std::io::Error::other(format!("could not create the redis pool: {}", e)))?;
                let store = RedisSessionStore::new_pooled(redis_pool)
                    .await
                    .map_err(|e| std::io::Error::other(format!("could not reach redis: {}", e)))?;
                session::RuntimeSessionStore::Redis(store)
            }
        };
        (store, secret_key)
    } else {
        log::warn!("Heads up! No session key was found in your `config.yaml`. We're using a temporary key for now, but for production, you'll want to set a secure `secret_key`.");
        let store = session::RuntimeSessionStore::Cookie(Arc::new(CookieSessionStore::default()));
        (store, Key::from(&[0u8; 64]))
    };

    let static_prefix = config::CONFIG.static_url_prefix.clone().unwrap_or_else(|| "/static".to_string());
    log::debug!(
        "Serve the client with: {}",
        static_assets::get_script_tags(&static_prefix, &tour_config).trim_end()
    );

    let server = HttpServer::new(move || {
        let session_config = config::CONFIG.session.as_ref();
        let mut app = App::new()
            .wrap(actix_web::middleware::Compress::default())
            .app_data(web::Data::new(ws_server.clone()))
            .app_data(web::Data::new(tour_setup.clone()))
            .configure(|cfg| routing::configure(cfg, &static_prefix));

        // Mounted after the routes so the embedded scripts win over files
        // that happen to share the prefix.
        if let Some(static_path_str) = &config::CONFIG.static_path {
            let static_path = std::path::PathBuf::from(static_path_str).clean();
            app = app.service(Files::new(&static_prefix, static_path));
        }

        app.wrap(
            SessionMiddleware::builder(runtime_store.clone(), runtime_secret.clone())
                .cookie_name(session_config.map(|s| s.cookie_name.clone()).unwrap_or_else(|| "ai_tour_session".to_string()))
                .cookie_secure(session_config.map(|s| s.cookie_secure).unwrap_or(false))
                .cookie_http_only(session_config.map(|s| s.cookie_http_only).unwrap_or(true))
                .cookie_path(session_config.map(|s| s.cookie_path.clone()).unwrap_or_else(|| "/".to_string()))
                .cookie_same_site(SameSite::Lax)
                .cookie_domain(session_config.and_then(|s| s.cookie_domain.clone()))
                .session_lifecycle(
                    PersistentSession::default().session_ttl(
                        session_config
                            .and_then(|s| s.cookie_max_age.map(actix_web::cookie::time::Duration::seconds))
                            .unwrap_or(actix_web::cookie::time::Duration::days(7)),
                    ),
                )
                .build(),
        )
    })
    .keep_alive(std::time::Duration::from_secs(30))
    .bind((host.as_str(), port))
    .map_err(|e| {
        if e.kind() == std::io::ErrorKind::AddrInUse {
            println!("Error: The port {} is already in use.", port);
            println!("Another application is likely running on this port.");
            println!("Please stop the other application or choose a different port.");
            std::process::exit(1);
        }
        e
    })?;

    logger::print_banner(&host, port, tour_config.auto_open);

    server.run().await
}
