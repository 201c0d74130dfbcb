//! AppState command-line client.
//!
//! # Usage
//!
//! ```bash
//! appstate --token tok-alice new-app demo --read-mode any --write-mode admin-only
//! appstate --token tok-alice set demo motd "hello"
//! appstate get demo motd
//! appstate --token tok-bob incr demo visits
//! appstate --token tok-alice ban demo mallory
//! ```

#![allow(clippy::print_stdout)]

use appstate_client::{ClientError, StateClient, TcpChannel};
use appstate_core::SystemEnv;
use appstate_proto::{AccessMode, AuthToken};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// AppState command-line client
#[derive(Parser, Debug)]
#[command(name = "appstate")]
#[command(about = "Manage AppState applications and read or write their state")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:4455")]
    server: String,

    /// Bearer token (anonymous if omitted)
    #[arg(short, long, env = "APPSTATE_TOKEN")]
    token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the server protocol version
    Version,

    /// Register an application with yourself as admin
    NewApp {
        /// Application name
        app_id: String,
        /// Who may read (any, admin-only, authorized-only, unbanned-only)
        #[arg(long, default_value = "any")]
        read_mode: AccessMode,
        /// Who may write
        #[arg(long, default_value = "any")]
        write_mode: AccessMode,
    },

    /// Delete an application and all of its state
    DeleteApp {
        /// Application name
        app_id: String,
    },

    /// Add a user to the authorized list
    Authorize {
        /// Application name
        app_id: String,
        /// Target user
        user: String,
    },

    /// Remove a user from the authorized list
    Unauthorize {
        /// Application name
        app_id: String,
        /// Target user
        user: String,
    },

    /// Add a user to the banned list
    Ban {
        /// Application name
        app_id: String,
        /// Target user
        user: String,
    },

    /// Remove a user from the banned list
    Unban {
        /// Application name
        app_id: String,
        /// Target user
        user: String,
    },

    /// Print a value
    Get {
        /// Application name
        app_id: String,
        /// State key
        key: String,
    },

    /// Store a string value
    Set {
        /// Application name
        app_id: String,
        /// State key
        key: String,
        /// Value
        value: String,
    },

    /// Remove a value
    Delete {
        /// Application name
        app_id: String,
        /// State key
        key: String,
    },

    /// Atomically add to an integer counter, creating it at zero
    Incr {
        /// Application name
        app_id: String,
        /// State key
        key: String,
        /// Amount to add
        #[arg(long, default_value_t = 1, allow_hyphen_values = true)]
        by: i64,
    },

    /// Print permission cache statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();

    let channel = TcpChannel::connect(&args.server).await?;
    let mut client = StateClient::new(channel, SystemEnv::new());
    if let Some(token) = args.token {
        client.login(AuthToken::new(token));
    }

    run(&mut client, args.command).await?;
    Ok(())
}

async fn run(client: &mut StateClient<TcpChannel, SystemEnv>, command: Cmd) -> Result<(), ClientError> {
    match command {
        Cmd::Version => println!("{}", client.version().await?),
        Cmd::NewApp { app_id, read_mode, write_mode } => {
            let app = client.register_app(&app_id, read_mode, write_mode).await?;
            println!("registered {app_id} ({app})");
        },
        Cmd::DeleteApp { app_id } => {
            client.join(&app_id).await?;
            client.delete_app().await?;
            println!("deleted {app_id}");
        },
        Cmd::Authorize { app_id, user } => {
            client.join(&app_id).await?;
            client.authorize(&user).await?;
        },
        Cmd::Unauthorize { app_id, user } => {
            client.join(&app_id).await?;
            client.unauthorize(&user).await?;
        },
        Cmd::Ban { app_id, user } => {
            client.join(&app_id).await?;
            client.ban(&user).await?;
        },
        Cmd::Unban { app_id, user } => {
            client.join(&app_id).await?;
            client.unban(&user).await?;
        },
        Cmd::Get { app_id, key } => {
            client.join(&app_id).await?;
            let value: ciborium::Value = client.get(&key).await?;
            println!("{}", render(&value));
        },
        Cmd::Set { app_id, key, value } => {
            client.join(&app_id).await?;
            client.set(&key, &value).await?;
        },
        Cmd::Delete { app_id, key } => {
            client.join(&app_id).await?;
            client.delete(&key).await?;
        },
        Cmd::Incr { app_id, key, by } => {
            client.join(&app_id).await?;
            let value = client.apply_op(&key, |n: i64| n.saturating_add(by), Some(0)).await?;
            println!("{value}");
        },
        Cmd::Stats => {
            let stats = client.stats().await?;
            println!("hits={} misses={} entries={}", stats.hits, stats.misses, stats.entries);
        },
    }
    Ok(())
}

fn render(value: &ciborium::Value) -> String {
    match value {
        ciborium::Value::Text(text) => text.clone(),
        ciborium::Value::Integer(n) => i128::from(*n).to_string(),
        ciborium::Value::Bool(b) => b.to_string(),
        ciborium::Value::Float(x) => x.to_string(),
        ciborium::Value::Null => "null".to_string(),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_app_modes_default_to_any() {
        let args = Args::try_parse_from(["appstate", "new-app", "demo"]).unwrap();
        let Cmd::NewApp { app_id, read_mode, write_mode } = args.command else {
            panic!("expected new-app, got {:?}", args.command);
        };
        assert_eq!(app_id, "demo");
        assert_eq!((read_mode, write_mode), (AccessMode::Any, AccessMode::Any));
    }

    #[test]
    fn new_app_modes_are_overridable() {
        let args = Args::try_parse_from([
            "appstate",
            "new-app",
            "demo",
            "--write-mode",
            "admin-only",
        ])
        .unwrap();
        let Cmd::NewApp { read_mode, write_mode, .. } = args.command else {
            panic!("expected new-app, got {:?}", args.command);
        };
        assert_eq!((read_mode, write_mode), (AccessMode::Any, AccessMode::AdminOnly));
    }
}
