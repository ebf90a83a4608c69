use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flashlock_client::{CancelToken, ClientConfig, FlashAgent, StderrSink};

struct CliArgs {
    device_type: Option<String>,
    help: bool,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().skip(1).collect();
    CliArgs {
        help: args.iter().any(|a| a == "--help" || a == "-h"),
        device_type: args.into_iter().find(|a| !a.starts_with('-')),
    }
}

fn print_help() {
    eprintln!(
        r#"flashlock-client - One-Time Firmware Flash Agent

USAGE:
    flashlock-client <DEVICE_TYPE>

ARGUMENTS:
    <DEVICE_TYPE>        Device family to flash (e.g. MTK6580)

OPTIONS:
    -h, --help           Print this help

ENVIRONMENT VARIABLES:
    FLASHLOCK_SERVER_URL   Server base URL (default: http://127.0.0.1:8443)
    TOOLS_DIR              Flash tool directory (default: ./tools)
    TOOL_INTEGRITY_CHECK   Verify tool hashes, true/false (default: true)
    TOOL_HASHES_PATH       JSON tool hash allowlist (optional)
    CLIENT_KEY_BITS        RSA modulus size (default: 2048)
    OVERWRITE_PASSES       Secure-delete passes (default: 3)
    DATA_DIR               Protected key directory (default: ./.flashlock)
    HTTP_TIMEOUT_SECS      Request timeout (default: 600)
    DEVICE_TOOLS_PATH      JSON device tool table override (optional)
    RUST_LOG               Log level (default: flashlock_client=info)
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

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flashlock_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let device_type = match args.device_type {
        Some(device_type) => device_type,
        None => {
            print_help();
            anyhow::bail!("a device type argument is required");
        }
    };

    let config = ClientConfig::from_env()?;
    let agent = FlashAgent::new(config)?;

    // Ctrl+C cancels cooperatively; the agent kills the tool, scrubs
    // staging, and reports the abort before exiting.
    let cancel = CancelToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Cancellation requested");
            signal_token.cancel();
        }
    });

    match agent.flash(&device_type, &StderrSink, &cancel).await {
        Ok(outcome) => {
            eprintln!("{}", outcome.message);
            if outcome.success {
                Ok(())
            } else {
                anyhow::bail!("flash failed");
            }
        }
        Err(error) => Err(error.into()),
    }
}
