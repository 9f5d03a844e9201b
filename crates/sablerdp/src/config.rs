use std::path::PathBuf;
use std::time::Duration;

use sablerdp_tls::TlsOptions;

/// Everything [`crate::RdpClient::connect`] needs to know.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
    /// Requested desktop width in pixels.
    pub width: u16,
    /// Requested desktop height in pixels.
    pub height: u16,
    /// Trade session niceties (wallpaper, animations, themes, cursor
    /// shadow) for responsiveness.
    pub fast: bool,
    /// Persist the session recording to this path on disconnect.
    pub record_to: Option<PathBuf>,
    /// Nominal capture and encoding frame rate.
    pub fps: u32,
    /// TLS upgrade knobs; certificate verification is off by default.
    pub tls: TlsOptions,
    /// Overall deadline for `connect`.
    pub connect_timeout: Duration,
    /// Timeout applied to every individual step of the connection
    /// sequence.
    pub step_timeout: Duration,
    /// Bound of the video chunk queue; `None` sizes it to about 20 seconds
    /// of chunks at the nominal frame rate.
    pub chunk_queue_len: Option<usize>,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 3389,
            username: username.into(),
            password: password.into(),
            domain: None,
            width: 1280,
            height: 800,
            fast: true,
            record_to: None,
            fps: 30,
            tls: TlsOptions::default(),
            connect_timeout: Duration::from_secs(30),
            step_timeout: Duration::from_secs(10),
            chunk_queue_len: None,
        }
    }
}
