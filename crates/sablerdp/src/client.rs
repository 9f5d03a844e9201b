//! The `RdpClient` façade: connection lifecycle, the background reader and
//! capture tasks, input injection, screenshots and the streaming API.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::ReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use sablerdp_async::{
    connect_begin, connect_finalize, mark_as_upgraded, split_tokio_framed, TokioFramed,
};
use sablerdp_connector::{encode_share_data, AuthIdentity, ClientConnector, Config, DesktopSize};
use sablerdp_core::WriteBuf;
use sablerdp_graphics::image_processing::RgbImage;
use sablerdp_input::{keymap, MouseButton, DOUBLE_CLICK_INTERVAL};
use sablerdp_pdu::input::{InputEvent, InputEventPdu};
use sablerdp_pdu::mcs::{DisconnectProviderUltimatum, DisconnectReason};
use sablerdp_pdu::rdp::client_info::PerformanceFlags;
use sablerdp_pdu::rdp::headers::ShareDataPdu;
use sablerdp_pdu::rdp::refresh_rectangle::RefreshRectanglePdu;
use sablerdp_pdu::x224::X224;
use sablerdp_session::surface::DisplaySurface;
use sablerdp_session::{ActiveStage, ActiveStageOutput};
use sablerdp_video::{EncoderSettings, PipelineStats, PipelineStatsCollector, VideoChunk, VideoError, VideoPipeline};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::stream::DynStream;

/// A key to press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// An RDP scancode, with the `0xE000` prefix for extended keys.
    Scancode(u16),
    /// A web-style key code such as `"Enter"` or `"KeyA"`.
    Code(&'static str),
    /// A character, sent as a unicode event.
    Char(char),
}

/// A snapshot of the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStatus {
    pub connected: bool,
    pub desktop_size: (u16, u16),
    pub streaming: bool,
}

struct WriterContext {
    framed: TokioFramed<tokio::io::WriteHalf<DynStream>>,
    buf: WriteBuf,
    user_channel_id: u16,
    io_channel_id: u16,
    share_id: u32,
}

struct StreamingState {
    pipeline: VideoPipeline,
    record_to: Option<PathBuf>,
}

/// A headless RDP session.
///
/// All operations are awaitable and safe to call from multiple tasks; input
/// producers serialize on one writer lock, so a second `send_key` does not
/// start before the first event PDU is fully written to the socket.
pub struct RdpClient {
    desktop_size: DesktopSize,
    fps: u32,
    chunk_queue_len: Option<usize>,

    connected: Arc<AtomicBool>,
    surface: Arc<Mutex<DisplaySurface>>,
    writer: Arc<Mutex<WriterContext>>,
    streaming: Arc<Mutex<Option<StreamingState>>>,
    chunks: Arc<Mutex<Option<mpsc::Receiver<VideoChunk>>>>,
    stats: Arc<PipelineStatsCollector>,
    encoder_restarted: Arc<AtomicBool>,

    reader_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    capture_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl RdpClient {
    /// Establishes the session and begins streaming.
    ///
    /// Runs the whole connection sequence — TCP, X.224 negotiation, TLS
    /// upgrade, CredSSP, MCS, licensing, capability exchange, finalization —
    /// under `config.connect_timeout`, with `config.step_timeout` bounding
    /// every individual step.
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        tokio::time::timeout(config.connect_timeout, Self::connect_inner(config))
            .await
            .map_err(|_| ClientError::Timeout("connect"))?
    }

    async fn connect_inner(config: ClientConfig) -> ClientResult<Self> {
        let address = (config.host.as_str(), config.port);
        let tcp = tokio::time::timeout(config.step_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| ClientError::Timeout("TCP connect"))??;
        tcp.set_nodelay(true)?;

        let client_address = tcp
            .local_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|_| String::from("0.0.0.0"));

        info!(host = %config.host, port = config.port, "Connected to RDP server");

        let connector_config = Config {
            desktop_size: DesktopSize {
                width: config.width,
                height: config.height,
            },
            credentials: AuthIdentity {
                username: config.username.clone(),
                password: config.password.clone(),
                domain: config.domain.clone(),
            },
            enable_tls: true,
            enable_credssp: true,
            client_build: 0,
            client_name: hostname(),
            keyboard_type: 4, // IBM enhanced, 101- or 102-key
            keyboard_subtype: 0,
            keyboard_functional_keys_count: 12,
            ime_file_name: String::new(),
            dig_product_id: String::new(),
            client_address,
            performance_flags: if config.fast {
                Config::fast_path_performance_flags()
            } else {
                PerformanceFlags::empty()
            },
        };

        let mut connector = ClientConnector::new(connector_config);

        // Pre-upgrade steps over the raw socket.
        let mut framed = TokioFramed::<TcpStream>::new(tcp);
        let should_upgrade = connect_begin(&mut framed, &mut connector, config.step_timeout).await?;

        // In-place TLS upgrade of the same socket.
        let (tcp, leftover) = framed.into_inner();

        let (stream, server_public_key): (DynStream, Vec<u8>) = if connector.should_perform_security_upgrade() {
            let (tls, key) = tokio::time::timeout(
                config.step_timeout,
                sablerdp_tls::upgrade(tcp, &config.host, &config.tls),
            )
            .await
            .map_err(|_| ClientError::Timeout("TLS handshake"))??;

            info!("TLS handshake complete");
            (Box::new(tls), key)
        } else {
            (Box::new(tcp), Vec::new())
        };

        let upgraded = mark_as_upgraded(should_upgrade, &mut connector);

        let mut framed = TokioFramed::<DynStream>::new_with_leftover(stream, leftover);

        let connection_result =
            connect_finalize(upgraded, &mut framed, connector, server_public_key, config.step_timeout).await?;

        info!(
            user_channel_id = connection_result.user_channel_id,
            io_channel_id = connection_result.io_channel_id,
            share_id = connection_result.share_id,
            "Session active"
        );

        let desktop_size = connection_result.desktop_size;

        let (framed_read, framed_write) = split_tokio_framed(framed);

        let connected = Arc::new(AtomicBool::new(true));
        let surface = Arc::new(Mutex::new(DisplaySurface::new(
            desktop_size.width,
            desktop_size.height,
            config.fps,
        )));
        let stats = Arc::new(PipelineStatsCollector::new());

        let writer = Arc::new(Mutex::new(WriterContext {
            framed: framed_write,
            buf: WriteBuf::new(),
            user_channel_id: connection_result.user_channel_id,
            io_channel_id: connection_result.io_channel_id,
            share_id: connection_result.share_id,
        }));

        let client = Self {
            desktop_size,
            fps: config.fps,
            chunk_queue_len: config.chunk_queue_len,
            connected: Arc::clone(&connected),
            surface: Arc::clone(&surface),
            writer: Arc::clone(&writer),
            streaming: Arc::new(Mutex::new(None)),
            chunks: Arc::new(Mutex::new(None)),
            stats: Arc::clone(&stats),
            encoder_restarted: Arc::new(AtomicBool::new(false)),
            reader_task: std::sync::Mutex::new(None),
            capture_task: std::sync::Mutex::new(None),
        };

        // The active loop: one reader task owns the socket's read half.
        let active_stage = ActiveStage::new(&connection_result);
        let reader = tokio::spawn(active_loop(
            framed_read,
            active_stage,
            Arc::clone(&surface),
            Arc::clone(&writer),
            Arc::clone(&stats),
            Arc::clone(&connected),
        ));
        *client.reader_task.lock().expect("reader task lock") = Some(reader);

        // Streaming is always on: the encoder starts with the session.
        client.start_streaming(config.record_to.clone()).await?;

        Ok(client)
    }

    /// A consistent RGB snapshot of the screen with the pointer composited.
    pub async fn screenshot(&self) -> ClientResult<RgbImage> {
        self.ensure_connected()?;

        let mut surface = self.surface.lock().await;
        Ok(surface.screenshot())
    }

    /// Saves a screenshot as a binary PPM file.
    pub async fn save_screenshot(&self, path: impl AsRef<std::path::Path>) -> ClientResult<()> {
        let image = self.screenshot().await?;

        let mut contents = format!("P6\n{} {}\n255\n", image.width(), image.height()).into_bytes();
        contents.extend_from_slice(image.data());

        tokio::fs::write(path, contents).await?;
        Ok(())
    }

    pub async fn mouse_move(&self, x: u16, y: u16) -> ClientResult<()> {
        let (x, y) = self.clamp(x, y);
        self.send_input(sablerdp_input::mouse_move(x, y).into_vec()).await
    }

    pub async fn mouse_button_down(&self, x: u16, y: u16, button: MouseButton) -> ClientResult<()> {
        let (x, y) = self.clamp(x, y);
        self.send_input(sablerdp_input::mouse_button_down(button, x, y).into_vec())
            .await
    }

    pub async fn mouse_button_up(&self, x: u16, y: u16, button: MouseButton) -> ClientResult<()> {
        let (x, y) = self.clamp(x, y);
        self.send_input(sablerdp_input::mouse_button_up(button, x, y).into_vec())
            .await
    }

    /// A click: move, button down, button up, in one input PDU.
    pub async fn mouse_click(&self, x: u16, y: u16, button: MouseButton) -> ClientResult<()> {
        let (x, y) = self.clamp(x, y);
        self.send_input(sablerdp_input::mouse_click(button, x, y).into_vec()).await
    }

    /// Two clicks within the double-click interval.
    pub async fn mouse_double_click(&self, x: u16, y: u16, button: MouseButton) -> ClientResult<()> {
        self.mouse_click(x, y, button).await?;
        tokio::time::sleep(DOUBLE_CLICK_INTERVAL / 4).await;
        self.mouse_click(x, y, button).await
    }

    pub async fn mouse_drag(
        &self,
        from: (u16, u16),
        to: (u16, u16),
        button: MouseButton,
    ) -> ClientResult<()> {
        let from = self.clamp(from.0, from.1);
        let to = self.clamp(to.0, to.1);
        self.send_input(sablerdp_input::mouse_drag(button, from.0, from.1, to.0, to.1).into_vec())
            .await
    }

    pub async fn mouse_wheel(&self, x: u16, y: u16, delta: i16) -> ClientResult<()> {
        let (x, y) = self.clamp(x, y);
        self.send_input(sablerdp_input::mouse_wheel(x, y, delta).into_vec()).await
    }

    /// Presses and/or releases one key.
    pub async fn send_key(&self, key: Key, press: bool, release: bool) -> ClientResult<()> {
        let mut events: Vec<InputEvent> = Vec::new();

        match key {
            Key::Scancode(scancode) => {
                if press {
                    events.extend(sablerdp_input::key_down(scancode));
                }
                if release {
                    events.extend(sablerdp_input::key_up(scancode));
                }
            }
            Key::Code(code) => {
                let scancode = keymap::scancode_for_key(code)
                    .ok_or_else(|| ClientError::Session(unknown_key_error(code)))?;
                if press {
                    events.extend(sablerdp_input::key_down(scancode));
                }
                if release {
                    events.extend(sablerdp_input::key_up(scancode));
                }
            }
            Key::Char(character) => {
                // Unicode events carry press and release together.
                events.extend(sablerdp_input::unicode_character(character));
            }
        }

        if events.is_empty() {
            return Ok(());
        }

        self.send_input(events).await
    }

    /// Types each code point of `text` as unicode events.
    pub async fn send_text(&self, text: &str) -> ClientResult<()> {
        self.send_input(sablerdp_input::unicode_text(text)).await
    }

    /// Asks the server to repaint the entire desktop.
    pub async fn refresh_screen(&self) -> ClientResult<()> {
        self.ensure_connected()?;

        let pdu = ShareDataPdu::RefreshRectangle(RefreshRectanglePdu::full_desktop(
            self.desktop_size.width,
            self.desktop_size.height,
        ));

        self.send_share_data(pdu).await
    }

    /// Starts the encoder subprocess and the capture loop.
    ///
    /// Called automatically by [`RdpClient::connect`]; callable again after
    /// [`RdpClient::stop_streaming`].
    pub async fn start_streaming(&self, record_to: Option<PathBuf>) -> ClientResult<()> {
        self.ensure_connected()?;

        let mut streaming = self.streaming.lock().await;
        if streaming.is_some() {
            debug!("Streaming already active");
            return Ok(());
        }

        let mut pipeline = VideoPipeline::spawn(
            EncoderSettings {
                width: self.desktop_size.width,
                height: self.desktop_size.height,
                fps: self.fps,
                chunk_queue_len: self.chunk_queue_len,
            },
            Arc::clone(&self.stats),
        )?;

        *self.chunks.lock().await = pipeline.take_chunk_receiver();
        *streaming = Some(StreamingState { pipeline, record_to });
        drop(streaming);

        let capture = tokio::spawn(capture_loop(
            Arc::clone(&self.surface),
            Arc::clone(&self.streaming),
            Arc::clone(&self.chunks),
            Arc::clone(&self.stats),
            Arc::clone(&self.connected),
            Arc::clone(&self.encoder_restarted),
            self.fps,
        ));

        if let Some(previous) = self
            .capture_task
            .lock()
            .expect("capture task lock")
            .replace(capture)
        {
            previous.abort();
        }

        Ok(())
    }

    /// Stops the encoder, finalizing the recording when one was requested.
    pub async fn stop_streaming(&self) -> ClientResult<()> {
        if let Some(task) = self.capture_task.lock().expect("capture task lock").take() {
            task.abort();
        }

        let state = self.streaming.lock().await.take();
        *self.chunks.lock().await = None;

        if let Some(state) = state {
            state.pipeline.stop(state.record_to.as_deref()).await?;
        }

        Ok(())
    }

    /// Awaits the next encoded video chunk, or `None` on timeout.
    ///
    /// There is at most one logical consumer; fanning chunks out to several
    /// consumers is the caller's responsibility.
    pub async fn get_next_video_chunk(&self, timeout: Duration) -> ClientResult<Option<VideoChunk>> {
        let mut chunks = self.chunks.lock().await;
        let receiver = chunks.as_mut().ok_or(ClientError::StreamingDisabled)?;

        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Some(chunk)) => Ok(Some(chunk)),
            // The encoder run ended.
            Ok(None) => Ok(None),
            Err(_elapsed) => Ok(None),
        }
    }

    /// A snapshot of the pipeline counters and latency averages.
    pub async fn get_pipeline_stats(&self) -> PipelineStats {
        let surface_stats = self.surface.lock().await.stats();
        self.stats.set_bitmaps_applied(surface_stats.bitmaps_applied);
        self.stats.snapshot()
    }

    pub async fn status(&self) -> ClientStatus {
        ClientStatus {
            connected: self.connected.load(Ordering::Acquire),
            desktop_size: (self.desktop_size.width, self.desktop_size.height),
            streaming: self.streaming.lock().await.is_some(),
        }
    }

    /// Closes the session cleanly: stops streaming (flushing the recording
    /// when configured), notifies the server, and tears the tasks down. The
    /// socket and the encoder are closed even on error paths.
    pub async fn disconnect(&self) -> ClientResult<()> {
        let was_connected = self.connected.swap(false, Ordering::AcqRel);

        let stop_result = self.stop_streaming().await;

        if was_connected {
            // Best effort: the server may already be gone.
            let ultimatum = DisconnectProviderUltimatum::from_reason(DisconnectReason::UserRequested);
            let mut writer = self.writer.lock().await;
            writer.buf.clear();
            if sablerdp_core::encode_buf(&X224(ultimatum), &mut writer.buf).is_ok() {
                let context = &mut *writer;
                let _ = sablerdp_async::FramedWrite::write_all(&mut context.framed, context.buf.filled()).await;
            }
        }

        if let Some(task) = self.reader_task.lock().expect("reader task lock").take() {
            task.abort();
        }

        info!("Disconnected");

        stop_result
    }

    fn ensure_connected(&self) -> ClientResult<()> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    /// Out-of-range coordinates are clamped to the desktop.
    fn clamp(&self, x: u16, y: u16) -> (u16, u16) {
        (
            x.min(self.desktop_size.width.saturating_sub(1)),
            y.min(self.desktop_size.height.saturating_sub(1)),
        )
    }

    async fn send_input(&self, events: Vec<InputEvent>) -> ClientResult<()> {
        self.ensure_connected()?;
        self.send_share_data(ShareDataPdu::Input(InputEventPdu(events))).await
    }

    async fn send_share_data(&self, pdu: ShareDataPdu) -> ClientResult<()> {
        // One writer lock serializes every producer; it is held until the
        // PDU is fully written.
        let mut writer = self.writer.lock().await;

        writer.buf.clear();
        encode_share_data(
            writer.user_channel_id,
            writer.io_channel_id,
            writer.share_id,
            pdu,
            &mut writer.buf,
        )?;

        let context = &mut *writer;
        sablerdp_async::FramedWrite::write_all(&mut context.framed, context.buf.filled())
            .await
            .map_err(ClientError::Transport)?;

        Ok(())
    }
}

/// The single reader task: pulls framed messages off the socket forever and
/// dispatches them by type.
///
/// Frame processing (RLE decompression included) is CPU-heavy, so each
/// frame is handed to a worker thread and the result is transported back
/// here; the network side of the loop stays cooperative.
async fn write_response_frame(writer: Arc<Mutex<WriterContext>>, response: &[u8]) -> std::io::Result<()> {
    let mut writer = writer.lock().await;
    let context = &mut *writer;
    sablerdp_async::FramedWrite::write_all(&mut context.framed, response).await
}

async fn active_loop(
    mut framed: TokioFramed<ReadHalf<DynStream>>,
    active_stage: ActiveStage,
    surface: Arc<Mutex<DisplaySurface>>,
    writer: Arc<Mutex<WriterContext>>,
    stats: Arc<PipelineStatsCollector>,
    connected: Arc<AtomicBool>,
) {
    let mut active_stage = Some(active_stage);

    loop {
        let (action, frame) = match framed.read_pdu().await {
            Ok(frame) => frame,
            Err(error) => {
                if connected.load(Ordering::Acquire) {
                    error!(%error, "Active loop read failed");
                    connected.store(false, Ordering::Release);
                }
                return;
            }
        };

        let mut stage = active_stage.take().expect("active stage is always returned");
        let surface_for_worker = Arc::clone(&surface);
        let stats_for_worker = Arc::clone(&stats);

        let worker = tokio::task::spawn_blocking(move || {
            let mut surface = surface_for_worker.blocking_lock();
            let apply_start = Instant::now();

            let result = stage.process(&mut surface, action, &frame);

            if let Ok(outputs) = &result {
                if outputs
                    .iter()
                    .any(|output| matches!(output, ActiveStageOutput::GraphicsUpdate(_)))
                {
                    stats_for_worker.bitmap_applied(apply_start.elapsed());
                    stats_for_worker.set_bitmaps_applied(surface.stats().bitmaps_applied);
                }
            }

            (stage, result)
        });

        let outputs = match worker.await {
            Ok((stage, Ok(outputs))) => {
                active_stage = Some(stage);
                outputs
            }
            Ok((_, Err(error))) => {
                error!(%error, "Active loop processing failed");
                connected.store(false, Ordering::Release);
                return;
            }
            Err(join_error) => {
                error!(%join_error, "Active loop worker failed");
                connected.store(false, Ordering::Release);
                return;
            }
        };

        for output in outputs {
            match output {
                ActiveStageOutput::ResponseFrame(response) => {
                    if let Err(error) = write_response_frame(Arc::clone(&writer), &response).await {
                        error!(%error, "Active loop write failed");
                        connected.store(false, Ordering::Release);
                        return;
                    }
                }
                ActiveStageOutput::Terminate(reason) => {
                    info!(reason = reason.description(), "Session terminated by the server");
                    connected.store(false, Ordering::Release);
                    return;
                }
                ActiveStageOutput::DeactivateAll => {
                    // Deactivation-reactivation (e.g. a server-side
                    // resolution change) is not supported; fail loudly
                    // rather than desynchronize.
                    error!("Server deactivated the share; ending the session");
                    connected.store(false, Ordering::Release);
                    return;
                }
                ActiveStageOutput::GraphicsUpdate(_) | ActiveStageOutput::PointerUpdate => {}
            }
        }
    }
}

/// The capture loop: at the nominal FPS, composites the pointer into the
/// final surface (lazily) and feeds the encoder.
#[expect(clippy::too_many_arguments)]
async fn capture_loop(
    surface: Arc<Mutex<DisplaySurface>>,
    streaming: Arc<Mutex<Option<StreamingState>>>,
    chunks: Arc<Mutex<Option<mpsc::Receiver<VideoChunk>>>>,
    stats: Arc<PipelineStatsCollector>,
    connected: Arc<AtomicBool>,
    encoder_restarted: Arc<AtomicBool>,
    fps: u32,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(1) / fps.max(1));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        if !connected.load(Ordering::Acquire) {
            return;
        }

        // Snapshot under the lock, encode outside it.
        let frame = {
            let mut surface = surface.lock().await;
            surface.composited().data().to_vec()
        };

        stats.frame_received();

        let mut streaming_guard = streaming.lock().await;
        let Some(state) = streaming_guard.as_mut() else {
            return;
        };

        match state.pipeline.send_frame(&frame).await {
            Ok(()) => {}
            Err(VideoError::BrokenPipe(_) | VideoError::EncoderExited) => {
                let record_to = state.record_to.clone();
                let settings = state.pipeline.settings().clone();

                let failed = streaming_guard.take().expect("checked above");
                failed.pipeline.abort().await;

                // One restart attempt; a second failure disables streaming
                // for this session. The connection itself is unaffected.
                if encoder_restarted.swap(true, Ordering::AcqRel) {
                    error!("Encoder pipe broke again; streaming disabled for this session");
                    return;
                }

                warn!("Encoder pipe broke; restarting the encoder once");

                match VideoPipeline::spawn(settings, Arc::clone(&stats)) {
                    Ok(mut pipeline) => {
                        *chunks.lock().await = pipeline.take_chunk_receiver();
                        *streaming_guard = Some(StreamingState { pipeline, record_to });
                    }
                    Err(error) => {
                        error!(%error, "Encoder restart failed; streaming disabled for this session");
                        return;
                    }
                }
            }
            Err(error) => {
                debug!(%error, "Frame write failed");
            }
        }
    }
}

fn unknown_key_error(code: &str) -> sablerdp_session::SessionError {
    use sablerdp_session::SessionErrorExt as _;
    sablerdp_session::SessionError::reason("sendKey", format!("unknown key code: {code}"))
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| String::from("sablerdp"))
}
