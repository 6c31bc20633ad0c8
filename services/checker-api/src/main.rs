//! Telegram account checker API server
//!
//! Serves batch phone/username lookups over HTTP, scheduling requests
//! across a pool of Telegram accounts. `--check-file` runs a single batch
//! from a file and prints the results instead of serving.

mod config;
mod input;
mod metrics;
mod routes;

use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use account_pool::{
    AccountsFile, BatchProcessor, Executor, IdentifierKind, Pacing, Pool, PoolConfig,
};
use alerts::{spawn_monitor_task, Notifier};
use anyhow::Context;
use telegram_bridge::{BridgeClient, LookupClient};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

struct CliArgs {
    config: Option<String>,
    check_file: Option<PathBuf>,
    kind: IdentifierKind,
}

fn parse_args(args: impl Iterator<Item = String>) -> anyhow::Result<CliArgs> {
    let mut args = args;
    let mut cli = CliArgs {
        config: None,
        check_file: None,
        kind: IdentifierKind::Phone,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                cli.config = Some(args.next().context("--config requires a path")?);
            }
            "--check-file" => {
                cli.check_file = Some(PathBuf::from(
                    args.next().context("--check-file requires a path")?,
                ));
            }
            "--kind" => {
                let kind = args.next().context("--kind requires phone or username")?;
                cli.kind = match kind.as_str() {
                    "phone" | "phones" => IdentifierKind::Phone,
                    "username" | "usernames" => IdentifierKind::Username,
                    other => anyhow::bail!("unknown --kind {other}, expected phone or username"),
                };
            }
            other => anyhow::bail!("unknown argument {other}"),
        }
    }
    Ok(cli)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = parse_args(std::env::args().skip(1))?;

    let config_path = Config::resolve_path(args.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let prometheus = metrics::install_recorder().context("installing metrics recorder")?;

    let accounts_file = Arc::new(AccountsFile::new(config.accounts_file.clone()));
    let accounts = accounts_file
        .load()
        .await
        .with_context(|| format!("loading accounts from {}", config.accounts_file.display()))?;

    let mut events_tx = None;
    let mut monitor = None;
    if let Some(nc) = &config.notifier {
        if let Some(token) = &nc.bot_token {
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            events_tx = Some(tx);
            let notifier = Arc::new(Notifier::new(
                token.clone(),
                nc.chat_id.clone(),
                Some(Duration::from_secs(nc.cooldown_secs)),
            ));
            monitor = Some((rx, notifier, Duration::from_secs(nc.check_interval_secs)));
        } else {
            warn!("notifier configured without a bot token, alerts disabled");
        }
    }

    let pool = Arc::new(Pool::new(accounts, PoolConfig::default(), events_tx));

    let mut notifier_handle = None;
    if let Some((rx, notifier, check_interval)) = monitor {
        spawn_monitor_task(rx, notifier.clone(), pool.clone(), check_interval);
        notifier_handle = Some(notifier);
    }

    let client: Arc<dyn LookupClient> = Arc::new(
        BridgeClient::new(&config.bridge.url, config.bridge.timeout())
            .context("building bridge client")?,
    );

    let ready = routes::verify_sessions(&pool, &client).await;
    let total = pool.enabled_accounts().len();
    if ready == 0 {
        warn!("no sessions verified, serving in degraded state");
    }
    if let Some(notifier) = &notifier_handle {
        notifier
            .send_info(&format!("Checker started: {ready}/{total} sessions ready"))
            .await;
    }

    let executor = Arc::new(Executor::new(pool.clone(), client.clone()));
    let processor = Arc::new(BatchProcessor::new(
        pool.clone(),
        executor,
        Pacing::default(),
    ));

    if let Some(path) = args.check_file {
        let identifiers = input::load_identifiers(&path)
            .with_context(|| format!("loading identifiers from {}", path.display()))?;
        info!(
            kind = args.kind.label(),
            count = identifiers.len(),
            "running one-shot batch"
        );
        let results = processor.process(args.kind, identifiers).await;
        let results: serde_json::Map<String, serde_json::Value> = results
            .into_iter()
            .map(|(id, outcome)| (id, outcome.to_json()))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::Value::Object(results))
                .context("serializing results")?
        );
        accounts_file
            .save(&pool.snapshot_for_save())
            .await
            .context("persisting account state")?;
        return Ok(());
    }

    let state = routes::AppState {
        pool: pool.clone(),
        processor,
        accounts_file: accounts_file.clone(),
        client,
        started_at: Instant::now(),
        prometheus,
    };
    let app = routes::build_router(state, config.server.max_connections);

    let listener = tokio::net::TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.server.listen_addr))?;
    info!(addr = %config.server.listen_addr, "listening");

    let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = drain_tx.send(());
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.context("server error")?;
        }
        _ = async {
            let _ = drain_rx.await;
            tokio::time::sleep(DRAIN_TIMEOUT).await;
        } => {
            warn!("drain timeout elapsed, forcing shutdown");
        }
    }

    info!("persisting account state");
    accounts_file
        .save(&pool.snapshot_for_save())
        .await
        .context("persisting account state")?;
    if let Some(notifier) = &notifier_handle {
        notifier.send_info("Checker shut down").await;
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<CliArgs> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn defaults_to_server_mode() {
        let cli = parse(&[]).expect("parse");
        assert!(cli.config.is_none());
        assert!(cli.check_file.is_none());
        assert_eq!(cli.kind, IdentifierKind::Phone);
    }

    #[test]
    fn parses_config_and_check_file() {
        let cli = parse(&[
            "--config",
            "/etc/checker.toml",
            "--check-file",
            "ids.txt",
            "--kind",
            "username",
        ])
        .expect("parse");
        assert_eq!(cli.config.as_deref(), Some("/etc/checker.toml"));
        assert_eq!(cli.check_file, Some(PathBuf::from("ids.txt")));
        assert_eq!(cli.kind, IdentifierKind::Username);
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!(parse(&["--kind", "emails"]).is_err());
    }

    #[test]
    fn rejects_missing_flag_value() {
        assert!(parse(&["--config"]).is_err());
    }

    #[test]
    fn rejects_unknown_argument() {
        assert!(parse(&["--verbose"]).is_err());
    }
}
