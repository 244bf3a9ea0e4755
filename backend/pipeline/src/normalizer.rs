use std::process::Stdio;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio_stream::StreamExt;
use tracing::warn;
use voxrelay_core::ByteStream;

/// Converts arbitrary encoded audio into canonical PCM (mono, fixed sample
/// rate, s16le) by piping it through an external transcoder process.
pub struct FfmpegNormalizer {
    program: String,
    args: Vec<String>,
}

impl FfmpegNormalizer {
    /// Standard transcoder invocation: quiet input parsing, stdin source,
    /// target sample rate, mono, raw s16le output on stdout.
    pub fn new(program: impl Into<String>, sample_rate: u32) -> Self {
        let args: Vec<String> = vec![
            "-nostdin".into(),
            "-loglevel".into(),
            "quiet".into(),
            "-i".into(),
            "-".into(),
            "-ar".into(),
            sample_rate.to_string(),
            "-ac".into(),
            "1".into(),
            "-f".into(),
            "s16le".into(),
            "-".into(),
        ];
        Self {
            program: program.into(),
            args,
        }
    }

    /// Arbitrary argv. Used by tests to substitute a passthrough command.
    pub(crate) fn with_argv(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Spawns the transcoder and starts feeding it the input stream.
    ///
    /// The returned [`PcmStream`] is readable immediately; the subprocess keeps
    /// running while its output is drained. Input copying happens on a
    /// separate task so neither pipe buffer can deadlock the other, and the
    /// write side is closed once the source stream is exhausted. A source
    /// stream error ends the feed and is reported by
    /// [`PcmStream::read_to_end`]; a transcoder that stops reading is left to
    /// fail via its exit status.
    pub fn spawn(&self, mut input: ByteStream) -> Result<PcmStream> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn transcoder {:?}", self.program))?;

        let mut stdin = child
            .stdin
            .take()
            .context("transcoder stdin not captured")?;
        let stdout = child
            .stdout
            .take()
            .context("transcoder stdout not captured")?;

        let feeder = tokio::spawn(async move {
            while let Some(chunk) = input.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        warn!(error = %err, "audio stream failed mid-download");
                        return Err(err);
                    }
                };
                if let Err(err) = stdin.write_all(&chunk).await {
                    // The transcoder stopped reading; draining its output will
                    // report the real failure.
                    warn!(error = %err, "transcoder closed its input early");
                    break;
                }
            }
            if let Err(err) = stdin.shutdown().await {
                warn!(error = %err, "failed to close transcoder input");
            }
            Ok(())
        });

        Ok(PcmStream {
            stdout,
            child,
            feeder,
        })
    }
}

/// Streaming handle over the transcoder's PCM output.
#[derive(Debug)]
pub struct PcmStream {
    stdout: ChildStdout,
    child: Child,
    feeder: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl PcmStream {
    /// Drains the full PCM output, then reaps the subprocess.
    ///
    /// A mid-download error on the source stream and a non-zero transcoder
    /// exit status both surface here as normalization errors, rather than
    /// letting truncated or garbled PCM masquerade as a transcription result.
    pub async fn read_to_end(mut self) -> Result<Vec<u8>> {
        let mut pcm = Vec::new();
        self.stdout
            .read_to_end(&mut pcm)
            .await
            .context("failed reading transcoder output")?;
        self.feeder
            .await
            .context("transcoder feed task panicked")?
            .context("audio stream failed mid-download")?;
        let status = self
            .child
            .wait()
            .await
            .context("failed waiting for transcoder")?;
        if !status.success() {
            bail!("transcoder exited with {status}");
        }
        Ok(pcm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn stream_of(chunks: Vec<Vec<u8>>) -> ByteStream {
        Box::pin(tokio_stream::iter(
            chunks.into_iter().map(|c| Ok(Bytes::from(c))),
        ))
    }

    fn passthrough() -> FfmpegNormalizer {
        // cat with no args echoes stdin to stdout.
        FfmpegNormalizer::with_argv("cat", vec![])
    }

    #[tokio::test]
    async fn spawn_failure_is_an_error() {
        let normalizer = FfmpegNormalizer::new("/nonexistent/transcoder-binary", 16_000);
        let err = normalizer.spawn(stream_of(vec![vec![1, 2, 3]])).unwrap_err();
        assert!(err.to_string().contains("spawn"));
    }

    #[tokio::test]
    async fn passthrough_round_trips_silent_pcm() {
        // A silent clip: all-zero PCM of valid (even) length.
        let silence = vec![0u8; 3200];
        let pcm = passthrough()
            .spawn(stream_of(vec![silence.clone()]))
            .unwrap()
            .read_to_end()
            .await
            .unwrap();
        assert_eq!(pcm, silence);
    }

    #[tokio::test]
    async fn chunked_input_is_concatenated() {
        let pcm = passthrough()
            .spawn(stream_of(vec![b"abc".to_vec(), b"def".to_vec()]))
            .unwrap()
            .read_to_end()
            .await
            .unwrap();
        assert_eq!(pcm, b"abcdef");
    }

    #[tokio::test]
    async fn nonzero_exit_surfaces_as_error() {
        // `false` ignores stdin, writes nothing, exits 1.
        let normalizer = FfmpegNormalizer::with_argv("false", vec![]);
        let err = normalizer
            .spawn(stream_of(vec![vec![0u8; 16]]))
            .unwrap()
            .read_to_end()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exited"));
    }

    #[tokio::test]
    async fn mid_download_error_surfaces_after_the_drain() {
        let broken: ByteStream = Box::pin(tokio_stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(std::io::Error::other("connection reset")),
        ]));
        let err = passthrough()
            .spawn(broken)
            .unwrap()
            .read_to_end()
            .await
            .unwrap_err();
        // Truncated input must not pass as a successful normalization.
        assert!(err.to_string().contains("mid-download"));
    }
}
