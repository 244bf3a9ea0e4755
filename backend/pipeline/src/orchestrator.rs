use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use bytes::Bytes;
use tokio_stream::StreamExt;
use tracing::{debug, error, info};
use uuid::Uuid;
use voxrelay_core::{
    AudioEncoding, AudioFetcher, AudioKind, AudioPayload, ByteStream, FileGateway, InboundMessage,
    InputKind, Outcome, SkipReason, Stage, StageError, Transcriber, Transcription,
};

use crate::normalizer::FfmpegNormalizer;
use crate::resolver::Resolver;

/// Tunables for a pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Canonical PCM sample rate, also declared to cloud engines.
    pub sample_rate: u32,
    /// Maximum accepted clip duration in seconds. 0 disables the cap.
    pub max_clip_secs: u32,
    /// Per-stage timeout in seconds. 0 disables timeouts.
    pub stage_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            max_clip_secs: 60,
            stage_timeout_secs: 120,
        }
    }
}

/// Composes resolve → fetch → normalize → transcribe into one per-message
/// operation producing exactly one [`Outcome`].
///
/// Holds no mutable state: every invocation is independent and may run
/// concurrently with any other. The engine handle is the only shared
/// resource, and it is read-only after startup.
pub struct Pipeline {
    resolver: Resolver,
    fetcher: Arc<dyn AudioFetcher>,
    normalizer: FfmpegNormalizer,
    engine: Arc<dyn Transcriber>,
    sample_rate: u32,
    stage_timeout: Option<Duration>,
}

impl Pipeline {
    pub fn new(
        gateway: Arc<dyn FileGateway>,
        fetcher: Arc<dyn AudioFetcher>,
        normalizer: FfmpegNormalizer,
        engine: Arc<dyn Transcriber>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            resolver: Resolver::new(gateway, config.max_clip_secs),
            fetcher,
            normalizer,
            engine,
            sample_rate: config.sample_rate,
            stage_timeout: match config.stage_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    /// Runs the whole pipeline for one inbound message.
    pub async fn run(&self, message: &InboundMessage) -> Outcome {
        let run_id = Uuid::new_v4();
        let outcome = match self.try_run(message).await {
            Ok(transcription) => Outcome::Success(transcription),
            Err(RunError::Skip(reason)) => Outcome::Skip(reason),
            Err(RunError::Stage(err)) => Outcome::Failure(err),
        };

        match &outcome {
            Outcome::Success(t) => info!(
                %run_id,
                chat_id = message.chat_id,
                message_id = message.message_id,
                engine = self.engine.name(),
                chars = t.text.len(),
                "transcribed clip"
            ),
            Outcome::Skip(reason) => debug!(
                %run_id,
                chat_id = message.chat_id,
                message_id = message.message_id,
                reason = %reason,
                "ignoring message"
            ),
            Outcome::Failure(err) => error!(
                %run_id,
                chat_id = message.chat_id,
                message_id = message.message_id,
                stage = err.stage.as_str(),
                error = %err.cause,
                "pipeline run failed"
            ),
        }
        outcome
    }

    async fn try_run(&self, message: &InboundMessage) -> Result<Transcription, RunError> {
        let audio = self.resolver.eligible_audio(message)?;

        let location = self
            .resolver
            .resolve(audio)
            .await
            .map_err(|err| StageError::new(Stage::Resolve, err))?;

        let stream = self
            .fetcher
            .fetch(&location)
            .await
            .map_err(|err| StageError::new(Stage::Fetch, err))?;

        let payload = match self.engine.input_kind() {
            InputKind::CanonicalPcm => {
                let pcm = self
                    .normalizer
                    .spawn(stream)
                    .map_err(|err| StageError::new(Stage::Normalize, err))?;
                // On timeout the PcmStream is dropped, which kills the child
                // and closes its pipes.
                let data = self.bounded(Stage::Normalize, pcm.read_to_end()).await?;
                AudioPayload::Pcm {
                    data,
                    sample_rate: self.sample_rate,
                }
            }
            InputKind::EncodedNative => {
                let data = self.bounded(Stage::Fetch, buffer_stream(stream)).await?;
                AudioPayload::Encoded {
                    data,
                    encoding: source_encoding(audio.kind),
                    sample_rate: self.sample_rate,
                }
            }
        };

        let transcription = self
            .bounded(Stage::Transcribe, self.engine.transcribe(payload))
            .await?;
        Ok(transcription)
    }

    /// Runs one stage future under the configured timeout, tagging any error
    /// with the stage name.
    async fn bounded<T, F>(&self, stage: Stage, fut: F) -> Result<T, StageError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let result = match self.stage_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .unwrap_or_else(|_| Err(anyhow!("stage timed out after {limit:?}"))),
            None => fut.await,
        };
        result.map_err(|err| StageError::new(stage, err))
    }
}

/// Encoding declared to engines that consume the original encoded bytes.
fn source_encoding(kind: AudioKind) -> AudioEncoding {
    match kind {
        AudioKind::Voice => AudioEncoding::OggOpus,
        AudioKind::File => AudioEncoding::Mp3,
    }
}

/// Buffers an entire byte stream. Used for engines that take the original
/// encoded clip in one request.
async fn buffer_stream(mut stream: ByteStream) -> anyhow::Result<Bytes> {
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("audio download stream failed")?;
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}

enum RunError {
    Skip(SkipReason),
    Stage(StageError),
}

impl From<SkipReason> for RunError {
    fn from(reason: SkipReason) -> Self {
        RunError::Skip(reason)
    }
}

impl From<StageError> for RunError {
    fn from(err: StageError) -> Self {
        RunError::Stage(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use voxrelay_core::{
        reply_text_for, AudioKind, AudioRef, FetchableLocation, FAILURE_REPLY,
    };

    struct StubGateway;

    #[async_trait]
    impl FileGateway for StubGateway {
        async fn resolve_file(&self, file_id: &str) -> Result<FetchableLocation> {
            Ok(FetchableLocation {
                url: format!("stub://{file_id}"),
            })
        }
    }

    struct FailingGateway;

    #[async_trait]
    impl FileGateway for FailingGateway {
        async fn resolve_file(&self, _file_id: &str) -> Result<FetchableLocation> {
            bail!("file gateway unavailable")
        }
    }

    /// Serves the clip named by the resolved URL: `stub://<id>` yields the
    /// bytes `clip <id>` in two chunks.
    struct EchoFetcher;

    #[async_trait]
    impl AudioFetcher for EchoFetcher {
        async fn fetch(&self, location: &FetchableLocation) -> Result<ByteStream> {
            let id = location.url.trim_start_matches("stub://").to_string();
            let chunks = vec![
                Ok(Bytes::from_static(b"clip ")),
                Ok(Bytes::from(id.into_bytes())),
            ];
            Ok(Box::pin(tokio_stream::iter(chunks)))
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl AudioFetcher for FailingFetcher {
        async fn fetch(&self, _location: &FetchableLocation) -> Result<ByteStream> {
            bail!("connect timed out")
        }
    }

    struct FixedFetcher(Vec<u8>);

    #[async_trait]
    impl AudioFetcher for FixedFetcher {
        async fn fetch(&self, _location: &FetchableLocation) -> Result<ByteStream> {
            let chunk = Bytes::from(self.0.clone());
            Ok(Box::pin(tokio_stream::iter(vec![Ok(chunk)])))
        }
    }

    /// Echoes the PCM it receives back as text. Makes cross-contamination
    /// between concurrent runs observable.
    struct EchoEngine;

    #[async_trait]
    impl Transcriber for EchoEngine {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn input_kind(&self) -> InputKind {
            InputKind::CanonicalPcm
        }
        async fn transcribe(&self, payload: AudioPayload) -> Result<Transcription> {
            let AudioPayload::Pcm { data, .. } = payload else {
                bail!("expected pcm");
            };
            Ok(Transcription {
                text: String::from_utf8_lossy(&data).into_owned(),
                confidence: None,
            })
        }
    }

    struct FixedEngine {
        kind: InputKind,
        text: &'static str,
    }

    #[async_trait]
    impl Transcriber for FixedEngine {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn input_kind(&self) -> InputKind {
            self.kind
        }
        async fn transcribe(&self, _payload: AudioPayload) -> Result<Transcription> {
            Ok(Transcription {
                text: self.text.to_string(),
                confidence: Some(1.0),
            })
        }
    }

    struct BrokenEngine;

    #[async_trait]
    impl Transcriber for BrokenEngine {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn input_kind(&self) -> InputKind {
            InputKind::CanonicalPcm
        }
        async fn transcribe(&self, _payload: AudioPayload) -> Result<Transcription> {
            bail!("quota exceeded")
        }
    }

    fn passthrough() -> FfmpegNormalizer {
        FfmpegNormalizer::with_argv("cat", vec![])
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            sample_rate: 16_000,
            max_clip_secs: 60,
            stage_timeout_secs: 10,
        }
    }

    fn pipeline(
        gateway: Arc<dyn FileGateway>,
        fetcher: Arc<dyn AudioFetcher>,
        normalizer: FfmpegNormalizer,
        engine: Arc<dyn Transcriber>,
    ) -> Pipeline {
        Pipeline::new(gateway, fetcher, normalizer, engine, config())
    }

    fn voice_message(file_id: &str, duration_secs: u32) -> InboundMessage {
        InboundMessage {
            chat_id: 100,
            message_id: 1,
            audio: Some(AudioRef {
                kind: AudioKind::Voice,
                file_id: file_id.to_string(),
                duration_secs,
            }),
        }
    }

    #[tokio::test]
    async fn message_without_audio_is_skipped() {
        let p = pipeline(
            Arc::new(StubGateway),
            Arc::new(EchoFetcher),
            passthrough(),
            Arc::new(EchoEngine),
        );
        let msg = InboundMessage {
            chat_id: 100,
            message_id: 1,
            audio: None,
        };
        let outcome = p.run(&msg).await;
        assert!(outcome.is_skip());
        assert_eq!(reply_text_for(&outcome), None);
    }

    #[tokio::test]
    async fn over_cap_clip_is_skipped_not_failed() {
        let p = pipeline(
            Arc::new(StubGateway),
            Arc::new(EchoFetcher),
            passthrough(),
            Arc::new(EchoEngine),
        );
        let outcome = p.run(&voice_message("long", 120)).await;
        assert!(matches!(
            outcome,
            Outcome::Skip(SkipReason::TooLong {
                duration_secs: 120,
                limit_secs: 60
            })
        ));
    }

    #[tokio::test]
    async fn gateway_error_fails_at_resolve() {
        let p = pipeline(
            Arc::new(FailingGateway),
            Arc::new(EchoFetcher),
            passthrough(),
            Arc::new(EchoEngine),
        );
        let outcome = p.run(&voice_message("a", 5)).await;
        assert_eq!(outcome.failed_stage(), Some(Stage::Resolve));
    }

    #[tokio::test]
    async fn network_error_fails_at_fetch_with_generic_reply() {
        let p = pipeline(
            Arc::new(StubGateway),
            Arc::new(FailingFetcher),
            passthrough(),
            Arc::new(EchoEngine),
        );
        let outcome = p.run(&voice_message("a", 5)).await;
        assert_eq!(outcome.failed_stage(), Some(Stage::Fetch));
        // The user sees only the fixed text, never the network error.
        let reply = reply_text_for(&outcome).unwrap();
        assert_eq!(reply, FAILURE_REPLY);
        assert!(!reply.contains("timed out"));
    }

    #[tokio::test]
    async fn missing_transcoder_fails_at_normalize() {
        let p = pipeline(
            Arc::new(StubGateway),
            Arc::new(EchoFetcher),
            FfmpegNormalizer::new("/nonexistent/transcoder-binary", 16_000),
            Arc::new(EchoEngine),
        );
        let outcome = p.run(&voice_message("a", 5)).await;
        assert_eq!(outcome.failed_stage(), Some(Stage::Normalize));
    }

    #[tokio::test]
    async fn transcoder_crash_fails_at_normalize_not_transcribe() {
        let p = pipeline(
            Arc::new(StubGateway),
            Arc::new(EchoFetcher),
            FfmpegNormalizer::with_argv("false", vec![]),
            Arc::new(EchoEngine),
        );
        let outcome = p.run(&voice_message("a", 5)).await;
        assert_eq!(outcome.failed_stage(), Some(Stage::Normalize));
    }

    #[tokio::test]
    async fn hung_transcoder_is_cut_off_by_the_stage_timeout() {
        let p = Pipeline::new(
            Arc::new(StubGateway),
            Arc::new(EchoFetcher),
            FfmpegNormalizer::with_argv("sleep", vec!["5".to_string()]),
            Arc::new(EchoEngine),
            PipelineConfig {
                stage_timeout_secs: 1,
                ..config()
            },
        );
        let outcome = p.run(&voice_message("a", 5)).await;
        assert_eq!(outcome.failed_stage(), Some(Stage::Normalize));
    }

    #[tokio::test]
    async fn engine_error_fails_at_transcribe() {
        let p = pipeline(
            Arc::new(StubGateway),
            Arc::new(EchoFetcher),
            passthrough(),
            Arc::new(BrokenEngine),
        );
        let outcome = p.run(&voice_message("a", 5)).await;
        assert_eq!(outcome.failed_stage(), Some(Stage::Transcribe));
        assert_eq!(reply_text_for(&outcome), Some(FAILURE_REPLY));
    }

    #[tokio::test]
    async fn known_fixture_transcribes_to_expected_text() {
        let p = pipeline(
            Arc::new(StubGateway),
            Arc::new(FixedFetcher(vec![0x4f, 0x67, 0x67, 0x53])),
            passthrough(),
            Arc::new(FixedEngine {
                kind: InputKind::CanonicalPcm,
                text: "hola mundo",
            }),
        );
        let outcome = p.run(&voice_message("fixture", 3)).await;
        match outcome {
            Outcome::Success(t) => assert_eq!(t.text, "hola mundo"),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn silent_clip_produces_a_wellformed_result() {
        let p = pipeline(
            Arc::new(StubGateway),
            Arc::new(FixedFetcher(vec![0u8; 3200])),
            passthrough(),
            Arc::new(FixedEngine {
                kind: InputKind::CanonicalPcm,
                text: "",
            }),
        );
        let outcome = p.run(&voice_message("silence", 1)).await;
        match outcome {
            Outcome::Success(t) => assert_eq!(t.text, ""),
            other => panic!("expected (empty) success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn encoded_native_engine_bypasses_the_normalizer() {
        // A normalizer that would fail if it were ever spawned.
        let p = pipeline(
            Arc::new(StubGateway),
            Arc::new(EchoFetcher),
            FfmpegNormalizer::new("/nonexistent/transcoder-binary", 16_000),
            Arc::new(FixedEngine {
                kind: InputKind::EncodedNative,
                text: "direct",
            }),
        );
        let outcome = p.run(&voice_message("a", 5)).await;
        match outcome {
            Outcome::Success(t) => assert_eq!(t.text, "direct"),
            other => panic!("expected success, got {other:?}"),
        }
    }

    /// Reports the encoding it was handed as the transcript text.
    struct EncodingEchoEngine;

    #[async_trait]
    impl Transcriber for EncodingEchoEngine {
        fn name(&self) -> &'static str {
            "encoding-echo"
        }
        fn input_kind(&self) -> InputKind {
            InputKind::EncodedNative
        }
        async fn transcribe(&self, payload: AudioPayload) -> Result<Transcription> {
            let AudioPayload::Encoded { encoding, .. } = payload else {
                bail!("expected encoded audio");
            };
            Ok(Transcription {
                text: format!("{encoding:?}"),
                confidence: None,
            })
        }
    }

    #[tokio::test]
    async fn declared_encoding_follows_the_attachment_kind() {
        let p = pipeline(
            Arc::new(StubGateway),
            Arc::new(EchoFetcher),
            passthrough(),
            Arc::new(EncodingEchoEngine),
        );

        let outcome = p.run(&voice_message("v", 5)).await;
        match outcome {
            Outcome::Success(t) => assert_eq!(t.text, "OggOpus"),
            other => panic!("expected success, got {other:?}"),
        }

        let mut msg = voice_message("a", 5);
        msg.audio.as_mut().unwrap().kind = AudioKind::File;
        let outcome = p.run(&msg).await;
        match outcome {
            Outcome::Success(t) => assert_eq!(t.text, "Mp3"),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mid_download_error_fails_the_pcm_path() {
        struct BrokenStreamFetcher;

        #[async_trait]
        impl AudioFetcher for BrokenStreamFetcher {
            async fn fetch(&self, _location: &FetchableLocation) -> Result<ByteStream> {
                Ok(Box::pin(tokio_stream::iter(vec![
                    Ok(Bytes::from_static(b"abc")),
                    Err(std::io::Error::other("connection reset")),
                ])))
            }
        }

        let p = pipeline(
            Arc::new(StubGateway),
            Arc::new(BrokenStreamFetcher),
            passthrough(),
            Arc::new(EchoEngine),
        );
        let outcome = p.run(&voice_message("a", 5)).await;
        // Truncated audio never passes as a success.
        assert_eq!(outcome.failed_stage(), Some(Stage::Normalize));
    }

    #[tokio::test]
    async fn concurrent_runs_do_not_cross_contaminate() {
        let p = Arc::new(pipeline(
            Arc::new(StubGateway),
            Arc::new(EchoFetcher),
            passthrough(),
            Arc::new(EchoEngine),
        ));

        let mut handles = Vec::new();
        for i in 0..16 {
            let p = Arc::clone(&p);
            handles.push(tokio::spawn(async move {
                let mut msg = voice_message(&format!("clip-{i}"), 5);
                msg.chat_id = 1000 + i as i64;
                (i, p.run(&msg).await)
            }));
        }

        for handle in handles {
            let (i, outcome) = handle.await.unwrap();
            match outcome {
                Outcome::Success(t) => assert_eq!(t.text, format!("clip clip-{i}")),
                other => panic!("run {i} did not succeed: {other:?}"),
            }
        }
    }
}
