//! A headless RDP client library for programmatic automation.
//!
//! Establishes an authenticated, encrypted session to an RDP server,
//! decodes the inbound graphics stream into a live raster surface,
//! re-encodes that surface as streamable video, and injects synthesized
//! mouse and keyboard events back to the server.
//!
//! The tiers are re-exported for consumers that need to drop below the
//! [`RdpClient`] façade.

#[macro_use]
extern crate tracing;

mod client;
mod config;
mod error;
mod stream;

pub use client::{ClientStatus, Key, RdpClient};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};

pub use sablerdp_graphics::image_processing::RgbImage;
pub use sablerdp_input::MouseButton;
pub use sablerdp_video::{PipelineStats, VideoChunk};

pub use sablerdp_connector as connector;
pub use sablerdp_core as core;
pub use sablerdp_graphics as graphics;
pub use sablerdp_input as input;
pub use sablerdp_nla as nla;
pub use sablerdp_pdu as pdu;
pub use sablerdp_session as session;
pub use sablerdp_tls as tls;
pub use sablerdp_video as video;
