//! EmberMark - An Ephemeral Map-Mark Service
//!
//! This is the main entry point for the EmberMark server.
//! It wires the store, sweeper, fanout, push registry, and HTTP surface.

use embermark::events::Fanout;
use embermark::geocode::{NominatimGeocoder, ReverseGeocoder};
use embermark::http::{self, AppState};
use embermark::push::{PushRegistry, VapidConfig};
use embermark::store::{start_expiry_sweeper, MarkStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Origin allowed by CORS; permissive when unset
    public_origin: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: embermark::DEFAULT_HOST.to_string(),
            port: embermark::DEFAULT_PORT,
            public_origin: std::env::var("PUBLIC_ORIGIN").ok(),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    if i + 1 < args.len() {
                        config.host = args[i + 1].clone();
                        i += 2;
                    } else {
                        eprintln!("Error: --host requires a value");
                        std::process::exit(1);
                    }
                }
                "--port" | "-p" => {
                    if i + 1 < args.len() {
                        config.port = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid port number");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --port requires a value");
                        std::process::exit(1);
                    }
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("EmberMark version {}", embermark::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn print_help() {
    println!(
        r#"
EmberMark - An Ephemeral Map-Mark Service

USAGE:
    embermark [OPTIONS]

OPTIONS:
    -h, --host <HOST>    Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>    Port to listen on (default: 8080)
    -v, --version        Print version information
        --help           Print this help message

ENVIRONMENT:
    PUBLIC_ORIGIN        Origin allowed by CORS (permissive when unset)
    VAPID_PUBLIC_KEY     Web push credential; push is disabled without it
    VAPID_PRIVATE_KEY    Web push credential; push is disabled without it
    VAPID_SUBJECT        Contact for push services (default: mailto:admin@example.com)
    RUST_LOG             Tracing filter (default: embermark=info)

EXAMPLES:
    embermark                      # Start on 127.0.0.1:8080
    embermark --port 9090          # Start on port 9090
    embermark --host 0.0.0.0       # Listen on all interfaces
"#
    );
}

fn print_banner(config: &Config, push_enabled: bool) {
    println!(
        r#"
EmberMark v{} - Ephemeral Map Marks
──────────────────────────────────────────────
Server started on {}
Mark TTL: 30 minutes, sweep every 10 seconds
Push delivery: {}

Use Ctrl+C to shutdown gracefully.
"#,
        embermark::VERSION,
        config.bind_address(),
        if push_enabled { "enabled" } else { "disabled" },
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("embermark=info,tower_http=warn")),
        )
        .with_target(false)
        .init();

    // One outbound HTTP client shared by push delivery and geocoding
    let client = reqwest::Client::new();

    // Create the store and the event fanout (shared across all handlers)
    let store = Arc::new(MarkStore::new());
    let fanout = Fanout::new();

    // The push enablement latch is decided once, here
    let push = Arc::new(PushRegistry::new(client.clone(), VapidConfig::from_env()));
    print_banner(&config, push.is_enabled());

    let geocoder: Arc<dyn ReverseGeocoder> = Arc::new(NominatimGeocoder::new(client));

    // Start the background expiry sweeper
    let _sweeper = start_expiry_sweeper(Arc::clone(&store), fanout.clone());

    let state = AppState {
        store,
        fanout,
        push,
        geocoder,
    };
    let app = http::router(state).layer(http::cors_layer(config.public_origin.clone()));

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("listening on {}", config.bind_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Shutdown signal received, stopping server...");
}
