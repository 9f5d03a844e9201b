//! Server-to-client output PDUs: bitmap updates, slow-path updates,
//! Fast-Path framing and pointer updates.

pub mod bitmap;
pub mod fast_path;
pub mod pointer;
pub mod update;
