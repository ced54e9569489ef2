use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use yoman_core::clock::SystemClock;
use yoman_core::config::YomanConfig;
use yoman_transport::LoopbackTransport;

mod app;

/// Hebrew conversational calendar assistant.
#[derive(Parser, Debug)]
#[command(name = "yoman-gateway")]
struct Args {
    /// Config file path (default: ~/.yoman/yoman.toml).
    #[arg(long)]
    config: Option<String>,

    /// Sender phone used by the local REPL.
    #[arg(long, default_value = "+972500000001")]
    phone: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "yoman_gateway=info,yoman_router=info".into()),
        )
        .init();

    let args = Args::parse();
    let config_path = args
        .config
        .or_else(|| std::env::var("YOMAN_CONFIG").ok());
    let config = YomanConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({e}), using defaults");
        YomanConfig::default()
    });

    let clock: Arc<dyn yoman_core::clock::Clock> = Arc::new(SystemClock);
    // Local mode: the loopback transport records outbound traffic, and the
    // REPL below prints it. The production WhatsApp client plugs in here.
    let transport = Arc::new(LoopbackTransport::new());
    let transport_dyn: Arc<dyn yoman_transport::Transport> = transport.clone();
    let app = app::build(config, clock, transport_dyn)?;

    info!("yoman gateway started — type messages below (ctrl-c to exit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut counter: u64 = 0;
    let mut seen_outbound = 0usize;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                counter += 1;
                app.ingress
                    .submit(
                        "local",
                        &args.phone,
                        &line,
                        &format!("local-{counter}"),
                        chrono::Utc::now(),
                    )
                    .await;
                // Give the pipeline a moment, then print what went out.
                tokio::time::sleep(std::time::Duration::from_millis(400)).await;
                let sent = transport.sent();
                for message in &sent[seen_outbound..] {
                    println!("← {}", message.text);
                }
                seen_outbound = sent.len();
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    let _ = app.shutdown_tx.send(true);
    Ok(())
}
