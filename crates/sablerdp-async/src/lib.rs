//! `Framed` transport over tokio streams and the async drivers wrapping the
//! sans-io connection state machines.

#[macro_use]
extern crate tracing;

mod connector;
mod framed;

pub use bytes;

pub use self::connector::*;
pub use self::framed::*;
