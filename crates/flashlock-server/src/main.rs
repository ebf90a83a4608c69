use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flashlock_server::{config::Config, create_router, sessions, state::AppState};

struct CliArgs {
    generate_key: bool,
    help: bool,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    CliArgs {
        generate_key: args.iter().any(|a| a == "--generate-key" || a == "-g"),
        help: args.iter().any(|a| a == "--help" || a == "-h"),
    }
}

fn print_help() {
    eprintln!(
        r#"flashlock-server - One-Time Firmware Delivery Server

USAGE:
    flashlock-server [OPTIONS]

OPTIONS:
    -g, --generate-key   Generate a random VAULT_MASTER_KEY for this session
                         (sets RUN_MODE=dev automatically)
    -h, --help           Print this help

ENVIRONMENT VARIABLES:
    RUN_MODE                dev or prod (default: prod)
    VAULT_MASTER_KEY        base64 32-byte key (required in prod)
    BIND_ADDRESS            Listen address (default: 127.0.0.1:8443)
    FIRMWARE_DIR            Encrypted firmware directory (default: ./firmware)
    SESSION_TTL_MINUTES     Session lifetime (default: 15)
    SWEEP_INTERVAL_SECS     Session sweep cadence (default: 300)
    BURNED_RETENTION_SECS   Burned-session retention (default: 600)
    DEVICE_CATALOG_PATH     JSON device catalog override (optional)
    RUST_LOG                Log level (default: flashlock_server=debug)

EXAMPLES:
    # Development with auto-generated key
    flashlock-server --generate-key

    # Production with explicit key
    VAULT_MASTER_KEY=<base64-key> flashlock-server
"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    if args.help {
        print_help();
        return Ok(());
    }

    if args.generate_key {
        let key: [u8; 32] = flashlock_crypto::generate_random_bytes();
        let key_b64 = flashlock_crypto::base64_std_encode(&key);

        std::env::set_var("RUN_MODE", "dev");
        std::env::set_var("VAULT_MASTER_KEY", &key_b64);

        eprintln!("=== flashlock Dev Server ===");
        eprintln!();
        eprintln!("Generated VAULT_MASTER_KEY for this session:");
        eprintln!("  {}", key_b64);
        eprintln!();
        eprintln!("Note: firmware provisioned under this key is unreadable after restart.");
        eprintln!();
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flashlock_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let bind_address = config.bind_address;
    let sweep_interval_secs = config.sweep_interval_secs;
    tracing::info!("Starting flashlock server on {}", bind_address);

    let state = Arc::new(AppState::new(config)?);
    let _sweep_handle = sessions::start_sweep_task(state.authority.clone(), sweep_interval_secs);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Graceful shutdown initiated");
}
