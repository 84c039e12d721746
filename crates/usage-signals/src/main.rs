use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use usage_signals::{Client, Config, Signal};

/// Log an init failure and exit.
fn fatal(msg: &str, error: &dyn std::fmt::Display) -> ! {
    error!(%error, "{msg}");
    std::process::exit(1);
}

fn setup_logging() {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::prelude::*;

    let level = std::env::var("USAGE_SIGNALS_LOG_LEVEL")
        .ok()
        .and_then(|val| {
            val.parse::<LevelFilter>().ok().or_else(|| {
                eprintln!("invalid USAGE_SIGNALS_LOG_LEVEL: {val:?}, defaulting to WARN");
                None
            })
        })
        .unwrap_or(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(level)
        .with(tracing_microjson::JsonLayer::new(std::io::stderr).with_target(true))
        .init();
}

/// Reads one JSON signal per line from stdin, records each, and drains the
/// buffer on EOF.
#[tokio::main]
async fn main() {
    setup_logging();

    let config = Config::from_env().unwrap_or_else(|e| fatal("config error", &e));
    let client = Client::new(config).unwrap_or_else(|e| fatal("failed to start client", &e));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut recorded = 0usize;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match serde_json::from_str::<Signal>(&line) {
                Ok(signal) => {
                    if let Err(e) = client.record_signal(signal) {
                        error!(error = %e, "failed to record signal");
                        break;
                    }
                    recorded += 1;
                }
                Err(e) => warn!(error = %e, "skipping malformed signal line"),
            },
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "failed to read stdin");
                break;
            }
        }
    }

    let outcome = client.close().await;
    info!(recorded, ?outcome, "input closed, client drained");
}
