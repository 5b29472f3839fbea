// audiograb - video URL to stored audio
// Module declarations

use std::sync::Arc;

pub mod audio;
pub mod config;
pub mod fetch;
pub mod logging;
pub mod pipeline;
pub mod server;
pub mod state;
pub mod tools;

use audio::Ffmpeg;
use config::Config;
use fetch::YtDlp;
use pipeline::Pipeline;
use server::ServerError;
use state::MediaStorage;

/// Build the pipeline with the real external tools
pub fn build_pipeline(config: &Config) -> Result<Pipeline, ServerError> {
    std::fs::create_dir_all(&config.media_root)?;
    std::fs::create_dir_all(&config.scratch_dir)?;

    let db = state::init_db(&config.db_path())?;
    let storage = MediaStorage::new(&config.media_root);

    Ok(Pipeline::new(
        Arc::new(YtDlp::new(&config.ytdlp_program, config.audio_quality_kbps)),
        Arc::new(Ffmpeg::new(&config.ffmpeg_program)),
        db,
        storage,
        &config.scratch_dir,
    )
    .with_policy(config.scratch_policy)
    .with_scratch_ttl(config.scratch_ttl))
}

/// Load configuration, open the database and serve until Ctrl-C
pub async fn run() -> Result<(), ServerError> {
    let config = Config::from_env()?;
    logging::init(config.log_format);

    let pipeline = build_pipeline(&config).map_err(|e| {
        log::error!("Failed to initialize: {}", e);
        e
    })?;
    let app = server::router(pipeline);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    log::info!(
        "audiograb listening on http://{} (media {}, scratch {})",
        config.bind,
        config.media_root.display(),
        config.scratch_dir.display()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("audiograb stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
