//! Type-erased byte stream: the session runs over a plain TCP socket or an
//! in-place upgraded TLS stream, and everything above reads and writes the
//! same boxed stream.

use tokio::io::{AsyncRead, AsyncWrite};

pub(crate) trait AsyncReadWrite: AsyncRead + AsyncWrite + Unpin + Send + Sync {}

impl<T> AsyncReadWrite for T where T: AsyncRead + AsyncWrite + Unpin + Send + Sync {}

pub(crate) type DynStream = Box<dyn AsyncReadWrite>;
