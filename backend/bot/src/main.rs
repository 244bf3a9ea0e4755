use std::sync::Arc;

use anyhow::Result;
use teloxide::Bot;
use tracing::error;
use tracing_subscriber::EnvFilter;
use voxrelay_config::{EngineKind, Settings};
use voxrelay_core::Transcriber;
use voxrelay_pipeline::{FfmpegNormalizer, HttpFetcher, Pipeline, PipelineConfig};
use voxrelay_telegram::{TelegramAdapter, TelegramFileGateway};

#[tokio::main]
async fn main() {
    // JSON logs on stderr, warn by default, overridable via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            std::process::exit(1);
        }
    };

    let engine = match build_engine(&settings) {
        Ok(engine) => engine,
        Err(err) => {
            error!(error = %err, "unable to initialize transcription engine");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(settings.telegram_token.clone());
    let pipeline = Arc::new(Pipeline::new(
        Arc::new(TelegramFileGateway::new(bot.clone())),
        Arc::new(HttpFetcher::new()),
        FfmpegNormalizer::new(&settings.ffmpeg_path, settings.sample_rate),
        engine,
        PipelineConfig {
            sample_rate: settings.sample_rate,
            max_clip_secs: settings.max_clip_secs,
            stage_timeout_secs: settings.stage_timeout_secs,
        },
    ));

    if let Err(err) = TelegramAdapter::new(bot, pipeline).start().await {
        error!(error = %err, "telegram adapter terminated");
        std::process::exit(1);
    }
}

fn build_engine(settings: &Settings) -> Result<Arc<dyn Transcriber>> {
    match &settings.engine {
        EngineKind::Vosk { model_path } => build_local_engine(model_path),
        EngineKind::Google { api_key, language } => Ok(Arc::new(
            voxrelay_pipeline::GoogleSpeechTranscriber::new(api_key.clone(), language.clone()),
        )),
    }
}

#[cfg(feature = "vosk")]
fn build_local_engine(model_path: &str) -> Result<Arc<dyn Transcriber>> {
    Ok(Arc::new(voxrelay_pipeline::VoskTranscriber::load(
        model_path,
    )?))
}

#[cfg(not(feature = "vosk"))]
fn build_local_engine(_model_path: &str) -> Result<Arc<dyn Transcriber>> {
    anyhow::bail!("built without the vosk feature; set ENGINE=google or rebuild with --features vosk")
}
