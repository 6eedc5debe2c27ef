use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use onebot_client::OneBotClient;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use wall_publisher::bots::{BotRegistry, BotSupervisor, ConnectionRegistry};
use wall_publisher::config::{AppConfig, LoadOutcome};
use wall_publisher::credentials::{
    BotCookieRefresher, CookieBootstrap, CredentialSession, GatewayEndpoint, KeepAliveMonitor,
    PublishEndpoint, QrLogin,
};
use wall_publisher::database::{self, SqliteSubmissionStore};
use wall_publisher::logging::init_logging;
use wall_publisher::notification::{AlertSink, BotGroupAlert, LogAlert};
use wall_publisher::publisher::{
    HttpImageProber, ImageRepairer, PublishRateLimiter, PublishWorkerPool, SubmissionPublisher,
};
use wall_publisher::render::{HttpRenderer, Renderer, UnavailableRenderer};
use wall_publisher::signature::SignatureCache;
use wall_publisher::utils::http_client::{build_http_client, install_rustls_provider};

#[derive(Debug, Parser)]
#[command(name = "wall-publisher", version, about = "Publishes approved wall submissions")]
struct Args {
    /// Path to the TOML config file; a default one is written if missing.
    #[arg(short, long, env = "WALL_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Override the log filter from the config file.
    #[arg(long, env = "WALL_LOG")]
    log_filter: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = match AppConfig::load_or_init(&args.config)? {
        LoadOutcome::Loaded(config) => config,
        LoadOutcome::Created => {
            eprintln!(
                "Wrote a default config to {}; edit it and start again.",
                args.config.display()
            );
            return Ok(());
        }
    };

    let filter = args.log_filter.as_deref().unwrap_or(&config.logging.filter);
    let log_dir = config.logging.dir.as_deref().map(PathBuf::from);
    let (logging, _log_guard) = init_logging(filter, log_dir.as_deref())?;

    install_rustls_provider();
    let cancel = CancellationToken::new();
    logging.start_retention_cleanup(config.logging.retention_days, cancel.child_token());

    info!(config = %args.config.display(), "wall-publisher starting");

    // Database
    let pool = database::init_pool(&config.database.url).await?;
    database::run_migrations(&pool).await?;
    let store = Arc::new(SqliteSubmissionStore::new(pool.clone()).with_claim_ttl(config.worker.claim_ttl()));

    // Bot connections
    let bot_http = build_http_client(config.bots.timeout());
    let mut clients = Vec::with_capacity(config.bots.endpoints.len());
    for endpoint in &config.bots.endpoints {
        clients.push(OneBotClient::new(
            bot_http.clone(),
            &endpoint.url,
            endpoint.access_token.clone(),
        )?);
    }
    let registry = Arc::new(ConnectionRegistry::new());
    let bots: Arc<dyn BotRegistry> = registry.clone();
    let supervisor = BotSupervisor::new(
        registry.clone(),
        clients,
        Duration::from_secs(config.bots.probe_interval_secs.max(1)),
        config.bots.timeout(),
    );
    let supervisor_task = tokio::spawn(supervisor.run(cancel.child_token()));

    // Signing keys
    let signatures = Arc::new(SignatureCache::new(bots.clone(), config.bots.timeout()));
    {
        let signatures = signatures.clone();
        tokio::spawn(async move {
            if !signatures.warm_up().await {
                warn!("Signature cache still empty after warm-up; repairs will refresh on demand");
            }
        });
    }

    // Alerts
    let alerts: Arc<dyn AlertSink> = if config.bots.manage_group > 0 {
        Arc::new(BotGroupAlert::new(
            bots.clone(),
            config.bots.manage_group,
            config.bots.timeout(),
        ))
    } else {
        Arc::new(LogAlert)
    };
    info!(sink = alerts.sink_type(), "Alert sink configured");

    // Credential session
    let session_http = build_http_client(config.session.policy().timeout);
    let endpoint: Arc<dyn PublishEndpoint> =
        Arc::new(GatewayEndpoint::new(session_http.clone(), &config.session.gateway_url)?);
    let bot_refresher = || {
        BotCookieRefresher::new(
            bots.clone(),
            config.session.cookie_domain.clone(),
            config.bots.timeout(),
        )
        .with_signatures(signatures.clone())
    };
    let session = Arc::new(CredentialSession::with_placeholder(
        endpoint.clone(),
        config.session.policy(),
        Arc::new(bot_refresher().with_alerts(alerts.clone())),
    )?);

    let qr = QrLogin::new(endpoint.clone(), config.session.policy().timeout).with_polling(
        Duration::from_secs(config.bootstrap.qr_poll_interval_secs.max(1)),
        config.bootstrap.qr_max_polls,
    );
    let bootstrap = CookieBootstrap::new(Arc::new(bot_refresher()), qr, config.bootstrap_policy());
    let bootstrap_rx = bootstrap.spawn(session.clone());

    // The monitor raises its own alerts, so its refresher stays silent.
    let monitor = Arc::new(KeepAliveMonitor::new(
        session.clone(),
        Arc::new(bot_refresher()),
        alerts.clone(),
        config.session.keep_alive(),
    ));
    let monitor_task = {
        let monitor = monitor.clone();
        let cancel = cancel.child_token();
        tokio::spawn(async move {
            // Periodic checks start once the bootstrap has installed a cookie.
            match bootstrap_rx.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "Keep-alive starts without a bootstrapped cookie"),
                Err(_) => warn!("Cookie bootstrap task ended without reporting"),
            }
            if let Some(handle) = monitor.start(cancel) {
                let _ = handle.await;
            }
        })
    };

    // Publisher
    let render_http = build_http_client(Duration::from_secs(config.render.timeout_secs));
    let renderer: Arc<dyn Renderer> = match config.render.url.as_deref() {
        Some(url) => Arc::new(HttpRenderer::new(render_http, url)?),
        None => {
            warn!("render.url is not set; every publish attempt will fail");
            Arc::new(UnavailableRenderer)
        }
    };
    let prober = Arc::new(HttpImageProber::new(
        build_http_client(Duration::ZERO),
        config.bots.timeout(),
    ));
    let publisher = SubmissionPublisher::new(
        store,
        session.clone(),
        renderer,
        ImageRepairer::new(prober, signatures.clone()),
        bots.clone(),
        Arc::new(PublishRateLimiter::new(config.worker.rate_limit())),
        config.worker.retry_policy(),
        config.bots.timeout(),
    )
    .with_show_author(config.wall.show_author);

    let workers = PublishWorkerPool::new(
        config.worker.pool_config(),
        Arc::new(publisher),
        cancel.child_token(),
    );
    workers.start();

    info!(workers = config.worker.workers, "wall-publisher running");
    shutdown_signal().await;
    info!("Shutdown requested");

    cancel.cancel();
    workers.stop().await;
    if let Err(e) = supervisor_task.await {
        error!(error = %e, "Bot supervisor task panicked");
    }
    monitor_task.abort();
    pool.close().await;

    info!("wall-publisher stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
