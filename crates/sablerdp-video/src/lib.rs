//! The live display pipeline's encoding half: a library-owned ffmpeg
//! subprocess turning raw RGB frames into fragmented MP4, chunked into a
//! bounded queue for streaming consumers and appended to a rolling
//! session-scoped recording file.

#[macro_use]
extern crate tracing;

mod chunk;
mod encoder;
mod stats;

pub use chunk::VideoChunk;
pub use encoder::{EncoderSettings, VideoPipeline};
pub use stats::{PipelineStats, PipelineStatsCollector};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("failed to spawn the encoder subprocess")]
    Spawn(#[source] std::io::Error),
    #[error("the encoder pipe broke")]
    BrokenPipe(#[source] std::io::Error),
    #[error("the encoder exited unexpectedly")]
    EncoderExited,
    #[error("remux failed: {0}")]
    Remux(String),
    #[error("I/O error in the video pipeline")]
    Io(#[from] std::io::Error),
}

pub type VideoResult<T> = Result<T, VideoError>;
