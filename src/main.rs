//! codeur-watch: polls Codeur.com RSS feeds and posts new missions to a
//! Discord webhook.
//!
//! Modes: daemon (default), `--once`, `--test`, `--stats`, `--reset`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use codeur_watch::config::{Config, DEFAULT_CONFIG_PATH};
use codeur_watch::ingest::rss::HttpFeedSource;
use codeur_watch::monitor::{Monitor, MonitorSettings};
use codeur_watch::notify::discord::DiscordNotifier;
use codeur_watch::store::SeenStore;
use codeur_watch::telemetry::{self, Spans};

#[derive(Debug, Parser)]
#[command(name = "codeur-watch", version, about = "Codeur.com missions to Discord")]
struct Args {
    /// Configuration file (.yaml, .yml, .toml or .json)
    #[arg(short, long, env = "CODEUR_WATCH_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Run a single check and exit
    #[arg(long, group = "mode")]
    once: bool,

    /// Send a test message to the webhook and exit
    #[arg(long, group = "mode")]
    test: bool,

    /// Print statistics about seen missions and exit
    #[arg(long, group = "mode")]
    stats: bool,

    /// Forget every seen mission and exit
    #[arg(long, group = "mode")]
    reset: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    telemetry::init_tracing();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "fatal");
            eprintln!("💥 Erreur fatale : {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let cfg = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let spans = Spans::new();
    let mut store = SeenStore::load(&cfg.storage.data_file, spans.store.clone())
        .with_retention_days(cfg.surveillance.retention_days);

    if args.stats {
        print_stats(&store);
        return Ok(ExitCode::SUCCESS);
    }

    if args.reset {
        return Ok(match store.reset() {
            Ok(()) => {
                println!("✅ Base de données réinitialisée");
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!("❌ Échec de la réinitialisation : {e}");
                ExitCode::FAILURE
            }
        });
    }

    let webhook = cfg.webhook_url()?;
    let notifier = DiscordNotifier::from_config(webhook, &cfg.discord, spans.notifier.clone());
    let source = HttpFeedSource::new(spans.feeds.clone()).context("building the HTTP client")?;
    let mut monitor = Monitor::new(
        MonitorSettings::from(&cfg),
        store,
        Box::new(source),
        Box::new(notifier),
        spans.monitor.clone(),
    );

    if args.test {
        return Ok(match monitor.test_webhook().await {
            Ok(()) => {
                println!("✅ Test réussi !");
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!("❌ Test échoué : {e}");
                ExitCode::FAILURE
            }
        });
    }

    if args.once {
        let report = tokio::select! {
            report = monitor.run_cycle() => report,
            _ = shutdown_signal() => {
                println!("🛑 Arrêt du programme");
                return Ok(ExitCode::from(130));
            }
        };
        println!(
            "✅ Vérification terminée : {} nouvelle(s) mission(s), {} envoyée(s)",
            report.new_items, report.delivered
        );
        let all_feeds_failed = report.feeds_processed.is_empty() && !report.feeds_failed.is_empty();
        return Ok(if report.persisted && !all_feeds_failed {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let every = Duration::from_secs(cfg.surveillance.check_interval_minutes.saturating_mul(60));
    println!(
        "🚀 Surveillance de {} flux toutes les {} minute(s). Ctrl+C pour arrêter.",
        cfg.rss_feeds.len(),
        cfg.surveillance.check_interval_minutes
    );
    monitor.run_forever(every, shutdown_signal()).await;
    println!("🛑 Surveillance arrêtée");
    Ok(ExitCode::SUCCESS)
}

fn print_stats(store: &SeenStore) {
    let stats = store.statistics();
    println!("📊 Statistiques ({})", store.path().display());
    println!("Total de missions vues : {}", stats.total_seen);
    if !stats.counts_by_feed.is_empty() {
        println!("Par flux :");
        for (feed, count) in &stats.counts_by_feed {
            println!("  - {feed} : {count}");
        }
    }
    if let Some(title) = &stats.oldest_title {
        println!("Plus ancienne : {title}");
    }
    if let Some(title) = &stats.newest_title {
        println!("Plus récente : {title}");
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
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
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown requested");
}
