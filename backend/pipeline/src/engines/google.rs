use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use voxrelay_core::{AudioEncoding, AudioPayload, InputKind, Transcriber, Transcription};

// v1p1beta1 rather than v1: the MP3 encoding is only accepted there.
const RECOGNIZE_URL: &str = "https://speech.googleapis.com/v1p1beta1/speech:recognize";

/// Cloud engine: one synchronous Google Speech recognition request per clip.
///
/// Consumes the original encoded bytes with an explicit encoding declaration,
/// so no PCM normalization step is needed.
pub struct GoogleSpeechTranscriber {
    client: Client,
    api_key: String,
    language: String,
}

impl GoogleSpeechTranscriber {
    pub fn new(api_key: String, language: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            language,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognizeRequest {
    config: RecognitionConfig,
    audio: RecognitionAudio,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig {
    encoding: &'static str,
    sample_rate_hertz: u32,
    language_code: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionAudio {
    /// Base64-encoded audio bytes.
    content: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<SpeechRecognitionResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeechRecognitionResult {
    #[serde(default)]
    alternatives: Vec<SpeechRecognitionAlternative>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeechRecognitionAlternative {
    #[serde(default)]
    transcript: String,
    confidence: Option<f32>,
}

/// Extracts the first result's top alternative.
fn top_hypothesis(response: RecognizeResponse) -> Result<Transcription> {
    let alternative = response
        .results
        .into_iter()
        .next()
        .and_then(|result| result.alternatives.into_iter().next());
    match alternative {
        Some(alt) => Ok(Transcription {
            text: alt.transcript,
            confidence: alt.confidence,
        }),
        None => bail!("no transcription results"),
    }
}

fn encoding_name(encoding: AudioEncoding) -> &'static str {
    match encoding {
        AudioEncoding::OggOpus => "OGG_OPUS",
        AudioEncoding::Mp3 => "MP3",
    }
}

#[async_trait]
impl Transcriber for GoogleSpeechTranscriber {
    fn name(&self) -> &'static str {
        "google"
    }

    fn input_kind(&self) -> InputKind {
        InputKind::EncodedNative
    }

    async fn transcribe(&self, payload: AudioPayload) -> Result<Transcription> {
        let AudioPayload::Encoded {
            data,
            encoding,
            sample_rate,
        } = payload
        else {
            bail!("google engine requires the original encoded audio");
        };

        let request = RecognizeRequest {
            config: RecognitionConfig {
                encoding: encoding_name(encoding),
                sample_rate_hertz: sample_rate,
                language_code: self.language.clone(),
            },
            audio: RecognitionAudio {
                content: base64::engine::general_purpose::STANDARD.encode(&data),
            },
        };

        debug!(bytes = data.len(), "sending recognition request");
        let response = self
            .client
            .post(RECOGNIZE_URL)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .context("recognition request failed")?
            .error_for_status()
            .context("recognition request returned an error status")?
            .json::<RecognizeResponse>()
            .await
            .context("malformed recognition response")?;

        top_hypothesis(response)
    }
}
