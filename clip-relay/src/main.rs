use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use clip_relay::api::{ApiServer, AppState};
use clip_relay::browser::{CdpSurfaceFactory, GenloginSessionProvider};
use clip_relay::config::{AppConfig, load_tenants_file};
use clip_relay::logging::init_logging;
use clip_relay::monitor::YoutubeSource;
use clip_relay::pipeline::{
    Acquirer, Aria2Transport, FfmpegTool, MediaTool, Normalizer, PipelineStages, Publisher,
};
use clip_relay::resolver::{Resolver, YtDlpProvider};
use clip_relay::scheduler::{Collaborators, Supervisor};
use clip_relay::utils::http_client::{build_client, install_rustls_provider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    install_rustls_provider();

    let config = AppConfig::from_env_or_default();
    let (logging_config, _log_guard) =
        init_logging(&config.log_dir).context("Failed to initialize logging")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "clip-relay starting");

    let shutdown = CancellationToken::new();
    logging_config.start_retention_cleanup(shutdown.clone());

    tokio::fs::create_dir_all(&config.pipeline.work_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.pipeline.work_dir.display()))?;
    tokio::fs::create_dir_all(&config.pipeline.output_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.pipeline.output_dir.display()))?;

    let client = build_client(config.monitor.request_timeout())?;

    let media: Arc<dyn MediaTool> = Arc::new(FfmpegTool::new(
        config.tools.ffmpeg.clone(),
        config.tools.ffprobe.clone(),
        shutdown.clone(),
    ));
    let provider = Arc::new(YtDlpProvider::new(
        config.tools.ytdlp.clone(),
        client.clone(),
        shutdown.clone(),
    ));
    let transport = Arc::new(Aria2Transport::new(
        config.tools.aria2c.clone(),
        config.pipeline.connections,
        shutdown.clone(),
    ));

    let stages = PipelineStages {
        resolver: Arc::new(Resolver::new(provider, &config.resolver)),
        acquirer: Arc::new(Acquirer::new(transport, media.clone())),
        normalizer: Arc::new(Normalizer::new(media, config.pipeline.target_duration())),
        publisher: Publisher::new(&config.publish),
        work_dir: config.pipeline.work_dir.clone(),
        output_dir: config.pipeline.output_dir.clone(),
    };

    let collaborators = Collaborators {
        source: Arc::new(YoutubeSource::new(
            client.clone(),
            config.monitor.api_base.clone(),
            config.monitor.page_size,
        )),
        sessions: Arc::new(GenloginSessionProvider::new(
            client.clone(),
            config.session_api_base.clone(),
        )),
        surfaces: Arc::new(CdpSurfaceFactory::new(config.publish.clone())),
        stages,
    };

    let supervisor = Supervisor::spawn(
        config.supervisor.clone(),
        config.monitor.period(),
        collaborators,
        shutdown.clone(),
    );

    match load_tenants_file(&config.profiles_file).await {
        Ok(file) => {
            let report = supervisor.load_tenant_file(file).await?;
            tracing::info!(
                loaded = report.loaded,
                skipped = report.skipped_lines,
                "Profiles loaded"
            );
        }
        Err(e) => tracing::warn!("No profiles loaded: {}", e),
    }

    let state = AppState::new(supervisor.clone(), config.profiles_file.clone())
        .with_logging(logging_config.clone());
    let server_token = CancellationToken::new();
    let server = ApiServer::new(config.api.clone(), state, server_token.clone());
    let mut server_task = tokio::spawn(async move { server.run().await });

    let server_exit = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            tracing::info!("Shutdown requested, stopping all tenants");
            None
        }
        result = &mut server_task => Some(result),
    };

    match supervisor.stop_all().await {
        Ok(stopped) => tracing::info!(stopped, "Tenants stopped"),
        Err(e) => tracing::warn!("Failed to stop tenants: {}", e),
    }
    server_token.cancel();
    shutdown.cancel();

    let server_result = match server_exit {
        Some(result) => result,
        None => server_task.await,
    };
    match server_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("API server error: {}", e),
        Err(e) => tracing::error!("API server task failed: {}", e),
    }

    tracing::info!("clip-relay stopped");
    Ok(())
}
