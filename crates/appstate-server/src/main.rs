//! AppState server binary.
//!
//! # Usage
//!
//! ```bash
//! # Two users, default limits
//! appstate-server --bind 0.0.0.0:4455 --user tok-alice=alice --user tok-bob=bob
//!
//! # Smaller values, bigger permission cache
//! appstate-server --max-value-size 20000 --permission-cache-capacity 65536
//! ```

use appstate_core::{CoreConfig, DEFAULT_MAX_VALUE_SIZE, DEFAULT_PERMISSION_CACHE_CAPACITY};
use appstate_proto::DEFAULT_MAX_FRAME_SIZE;
use appstate_server::{DEFAULT_BIND_ADDRESS, Server, ServerConfig, UserEntry};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// AppState shared-state server
#[derive(Parser, Debug)]
#[command(name = "appstate-server")]
#[command(about = "Shared application state server with compare-and-swap updates")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = DEFAULT_BIND_ADDRESS)]
    bind: String,

    /// Largest stored value in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_VALUE_SIZE)]
    max_value_size: usize,

    /// Largest request frame in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    max_frame_size: usize,

    /// Cached permission decisions (0 disables the cache)
    #[arg(long, default_value_t = DEFAULT_PERMISSION_CACHE_CAPACITY)]
    permission_cache_capacity: usize,

    /// Known user as TOKEN=NAME (repeatable)
    #[arg(short, long = "user", value_name = "TOKEN=NAME")]
    users: Vec<UserEntry>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("AppState server starting");
    tracing::info!("Binding to {}", args.bind);

    if args.users.is_empty() {
        tracing::warn!("No users configured - every caller is anonymous");
    }

    let config = ServerConfig {
        bind_address: args.bind,
        max_frame_size: args.max_frame_size,
        core: CoreConfig {
            max_value_size: args.max_value_size,
            permission_cache_capacity: args.permission_cache_capacity,
        },
        users: args.users,
    };

    let server = Server::bind(config).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
