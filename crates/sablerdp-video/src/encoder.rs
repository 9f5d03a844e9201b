//! The encoder subprocess and its reader tasks.
//!
//! One ffmpeg process per streaming run, owned by the pipeline: raw RGB24
//! frames in on stdin, fragmented MP4 out on stdout. The stdout reader
//! chunks the output, always appends it to a session-scoped temp file (the
//! full recording) and offers each chunk to a bounded queue; overruns are
//! counted, not fatal. The stderr reader drains diagnostics at debug level.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt as _, AsyncReadExt as _, AsyncWriteExt as _};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::chunk::VideoChunk;
use crate::stats::PipelineStatsCollector;
use crate::{VideoError, VideoResult};

/// Chunk granularity of the stdout reader.
const CHUNK_SIZE: usize = 64 * 1024;

/// How long `stop` waits for the encoder to exit after stdin closes before
/// killing it.
const ENCODER_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// How many seconds of chunks the bounded queue holds at the nominal FPS.
const QUEUE_SECONDS: u32 = 20;

#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub width: u16,
    pub height: u16,
    pub fps: u32,
    /// Bound of the chunk queue; `None` sizes it to [`QUEUE_SECONDS`] at
    /// the nominal FPS.
    pub chunk_queue_len: Option<usize>,
}

impl EncoderSettings {
    fn queue_len(&self) -> usize {
        self.chunk_queue_len
            .unwrap_or((self.fps.max(1) * QUEUE_SECONDS) as usize)
    }

    /// The ffmpeg invocation: raw RGB24 on stdin at the nominal FPS,
    /// low-latency fragmented MP4 on stdout — ultrafast preset, zero-latency
    /// tune, 4:2:0, a keyframe every 15 frames, closed GOP, no B-frames,
    /// one-frame fragments.
    fn command(&self) -> Command {
        let frag_duration_us = 1_000_000 / self.fps.max(1);

        let mut command = Command::new("ffmpeg");
        command
            .arg("-y")
            .args(["-f", "rawvideo"])
            .args(["-pix_fmt", "rgb24"])
            .args(["-s", &format!("{}x{}", self.width, self.height)])
            .args(["-r", &self.fps.to_string()])
            .args(["-i", "pipe:0"])
            .args(["-c:v", "libx264"])
            .args(["-preset", "ultrafast"])
            .args(["-tune", "zerolatency"])
            .args(["-pix_fmt", "yuv420p"])
            .args(["-crf", "28"])
            .args(["-g", "15"])
            .args(["-keyint_min", "15"])
            .args(["-bf", "0"])
            .args(["-flags", "+cgop"])
            .args(["-f", "mp4"])
            .args(["-movflags", "frag_keyframe+empty_moov+default_base_moof"])
            .args(["-frag_duration", &frag_duration_us.to_string()])
            .args(["-min_frag_duration", "0"])
            .arg("pipe:1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        command
    }
}

/// A single encoder run.
///
/// The pipeline owns the subprocess exclusively: only it writes stdin, and
/// its two reader tasks are the only consumers of stdout and stderr. They
/// are children of this value's lifetime and are shut down with it.
pub struct VideoPipeline {
    settings: EncoderSettings,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout_task: JoinHandle<std::io::Result<()>>,
    stderr_task: JoinHandle<()>,
    chunks_rx: Option<mpsc::Receiver<VideoChunk>>,
    temp_path: PathBuf,
    stats: Arc<PipelineStatsCollector>,
    last_stdin_write: Arc<Mutex<Option<Instant>>>,
    started_at: Instant,
}

impl VideoPipeline {
    /// Spawns the encoder and its reader tasks.
    pub fn spawn(settings: EncoderSettings, stats: Arc<PipelineStatsCollector>) -> VideoResult<Self> {
        let temp_file = tempfile::Builder::new()
            .prefix("sablerdp-recording-")
            .suffix(".mp4")
            .tempfile()
            .map_err(VideoError::Io)?;
        // The path is managed manually: kept for remux on a clean stop,
        // unlinked in both cases.
        let (_, temp_path) = temp_file.keep().map_err(|e| VideoError::Io(e.error))?;

        info!(
            width = settings.width,
            height = settings.height,
            fps = settings.fps,
            temp = %temp_path.display(),
            "Starting streaming encoder (fragmented MP4)"
        );

        let mut child = settings.command().spawn().map_err(VideoError::Spawn)?;

        let stdin = child.stdin.take().ok_or(VideoError::EncoderExited)?;
        let stdout = child.stdout.take().ok_or(VideoError::EncoderExited)?;
        let stderr = child.stderr.take().ok_or(VideoError::EncoderExited)?;

        let (chunks_tx, chunks_rx) = mpsc::channel(settings.queue_len());

        let last_stdin_write = Arc::new(Mutex::new(None::<Instant>));
        let started_at = Instant::now();

        let stdout_task = tokio::spawn(stdout_reader(
            stdout,
            temp_path.clone(),
            chunks_tx,
            Arc::clone(&stats),
            Arc::clone(&last_stdin_write),
            started_at,
        ));

        let stderr_task = tokio::spawn(async move {
            let mut lines = tokio::io::BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "sablerdp::encoder", "{line}");
            }
        });

        Ok(Self {
            settings,
            child,
            stdin: Some(stdin),
            stdout_task,
            stderr_task,
            chunks_rx: Some(chunks_rx),
            temp_path,
            stats,
            last_stdin_write,
            started_at,
        })
    }

    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    /// Takes the consumer end of the chunk queue.
    ///
    /// There is at most one logical consumer; fan-out is the caller's
    /// responsibility.
    pub fn take_chunk_receiver(&mut self) -> Option<mpsc::Receiver<VideoChunk>> {
        self.chunks_rx.take()
    }

    /// Writes one raw RGB24 frame to encoder stdin.
    ///
    /// The write is blocking I/O against a pipe; callers run it from a task
    /// where suspending is acceptable (the capture loop).
    pub async fn send_frame(&mut self, rgb: &[u8]) -> VideoResult<()> {
        let expected = usize::from(self.settings.width) * usize::from(self.settings.height) * 3;
        debug_assert_eq!(rgb.len(), expected);

        let stdin = self.stdin.as_mut().ok_or(VideoError::EncoderExited)?;

        let write_start = Instant::now();

        let result = async {
            stdin.write_all(rgb).await?;
            stdin.flush().await
        }
        .await;

        match result {
            Ok(()) => {
                *lock(&self.last_stdin_write) = Some(Instant::now());
                self.stats.frame_encoded(write_start.elapsed());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Err(VideoError::BrokenPipe(e)),
            Err(e) => Err(VideoError::Io(e)),
        }
    }

    /// Stops the run: closes stdin, waits for the encoder (killing it after
    /// a bounded timeout), drains the readers and closes the temp file.
    ///
    /// When `record_to` is set, the temp recording is remuxed (stream copy,
    /// no re-encode) into that path. The temp file is unlinked either way —
    /// except after a remux failure, where it is preserved for diagnosis.
    pub async fn stop(mut self, record_to: Option<&Path>) -> VideoResult<()> {
        // EOF on stdin lets ffmpeg finalize the last fragment.
        drop(self.stdin.take());

        match tokio::time::timeout(ENCODER_EXIT_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "Encoder exited"),
            Ok(Err(e)) => warn!(error = %e, "Failed to await the encoder"),
            Err(_elapsed) => {
                warn!("Encoder did not exit in time; killing it");
                let _ = self.child.kill().await;
            }
        }

        // The readers finish once the pipes close.
        if let Err(e) = self.stdout_task.await {
            warn!(error = %e, "Encoder stdout reader panicked");
        }
        if let Err(e) = self.stderr_task.await {
            warn!(error = %e, "Encoder stderr reader panicked");
        }

        let result = match record_to {
            Some(path) => match remux(&self.temp_path, path).await {
                Ok(()) => {
                    info!(path = %path.display(), "Recording saved");
                    Ok(())
                }
                Err(e) => {
                    // Keep the temp file around for diagnosis.
                    error!(error = %e, temp = %self.temp_path.display(), "Remux failed; temp recording preserved");
                    return Err(e);
                }
            },
            None => Ok(()),
        };

        if let Err(e) = tokio::fs::remove_file(&self.temp_path).await {
            debug!(error = %e, "Failed to unlink the temp recording");
        }

        result
    }

    /// Kills the run without finalizing anything; used on error paths.
    pub async fn abort(mut self) {
        drop(self.stdin.take());
        let _ = self.child.kill().await;
        self.stdout_task.abort();
        self.stderr_task.abort();
        let _ = tokio::fs::remove_file(&self.temp_path).await;
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

async fn stdout_reader(
    mut stdout: tokio::process::ChildStdout,
    temp_path: PathBuf,
    chunks_tx: mpsc::Sender<VideoChunk>,
    stats: Arc<PipelineStatsCollector>,
    last_stdin_write: Arc<Mutex<Option<Instant>>>,
    started_at: Instant,
) -> std::io::Result<()> {
    let mut recording = tokio::fs::File::create(&temp_path).await?;
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut sequence = 0u64;

    loop {
        let read = stdout.read(&mut buffer).await?;
        if read == 0 {
            break;
        }

        // Encoder output latency: last stdin write to this stdout data.
        if let Some(write_instant) = lock(&last_stdin_write).take() {
            stats.encoder_latency_sample(write_instant.elapsed());
        }

        let data = buffer[..read].to_vec();

        // The temp file gets everything: it is the full recording.
        recording.write_all(&data).await?;

        let chunk = VideoChunk {
            data,
            sequence,
            timestamp: started_at.elapsed(),
        };
        sequence += 1;
        stats.chunk_produced();

        // Offer to the bounded queue; a slow consumer loses chunks, the
        // recording does not.
        match chunks_tx.try_send(chunk) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                stats.chunk_dropped();
                debug!("Video chunk queue full; dropping the chunk");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // No consumer; the recording keeps going.
            }
        }
    }

    recording.flush().await?;

    Ok(())
}

/// Stream-copies the fragmented MP4 recording into its final container.
async fn remux(source: &Path, destination: &Path) -> VideoResult<()> {
    let output = Command::new("ffmpeg")
        .arg("-y")
        .args(["-i", &source.to_string_lossy()])
        .args(["-c", "copy"])
        .arg(destination)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| VideoError::Remux(format!("failed to run ffmpeg: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let last_line = stderr.lines().last().unwrap_or("unknown error");
        return Err(VideoError::Remux(format!(
            "ffmpeg exited with {}: {last_line}",
            output.status
        )));
    }

    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_length_defaults_to_twenty_seconds_of_chunks() {
        let settings = EncoderSettings {
            width: 1280,
            height: 800,
            fps: 30,
            chunk_queue_len: None,
        };
        assert_eq!(settings.queue_len(), 600);

        let bounded = EncoderSettings {
            chunk_queue_len: Some(10),
            ..settings
        };
        assert_eq!(bounded.queue_len(), 10);
    }

    #[tokio::test]
    async fn queue_overrun_drops_chunks_and_counts_them() {
        // The queue logic without a real encoder: a bounded channel, one
        // producer, no consumer.
        let stats = PipelineStatsCollector::new();
        let (tx, _rx) = mpsc::channel::<VideoChunk>(10);

        for sequence in 0..100u64 {
            let chunk = VideoChunk {
                data: vec![0xAB; 16],
                sequence,
                timestamp: Duration::from_millis(sequence),
            };
            stats.chunk_produced();

            if tx.try_send(chunk).is_err() {
                stats.chunk_dropped();
            }
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.chunks_produced, 100);
        assert_eq!(snapshot.queue_drops, 90);
    }

    #[tokio::test]
    async fn chunk_sequences_are_contiguous() {
        let (tx, mut rx) = mpsc::channel::<VideoChunk>(16);

        for sequence in 0..16u64 {
            tx.try_send(VideoChunk {
                data: Vec::new(),
                sequence,
                timestamp: Duration::from_millis(sequence),
            })
            .unwrap();
        }
        drop(tx);

        let mut expected = 0u64;
        while let Some(chunk) = rx.recv().await {
            assert_eq!(chunk.sequence, expected);
            expected += 1;
        }
        assert_eq!(expected, 16);
    }
}
