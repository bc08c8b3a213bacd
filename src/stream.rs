//! # Client streams
use std::{
    io::{self, IoSlice},
    pin::Pin,
    task::{Context, Poll},
};

use pin_project::pin_project;
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::TcpStream,
};
#[cfg(feature = "tls")]
use tokio_rustls::server::TlsStream;

#[pin_project(project = ClientStreamProj)]
/// The transport of a websocket connection
pub enum ClientStream {
    /// A normal TCP stream
    Plain(TcpStream),
    /// A TLS Server stream
    #[cfg(feature = "tls")]
    Rustls(Box<TlsStream<TcpStream>>),
}

macro_rules! project_fn {
    ($key:ident($($arg:ident: $ty:ty),*) -> $res:ty) => {
        fn $key(self: Pin<&mut Self>, $($arg: $ty),*) -> Poll<$res> {
            match self.project() {
                ClientStreamProj::Plain(pointer) => Pin::new(pointer).$key($($arg),*),
                #[cfg(feature = "tls")]
                ClientStreamProj::Rustls(pointer) => Pin::new(pointer).$key($($arg),*),
            }
        }
    };
}

impl AsyncRead for ClientStream {
    project_fn!(poll_read(cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> io::Result<()>);
}

impl AsyncWrite for ClientStream {
    project_fn!(poll_write(cx: &mut Context<'_>, buf: &[u8]) -> io::Result<usize>);
    project_fn!(poll_flush(cx: &mut Context<'_>) -> io::Result<()>);
    project_fn!(poll_shutdown(cx: &mut Context<'_>) -> io::Result<()>);
    project_fn!(poll_write_vectored(cx: &mut Context<'_>, bufs: &[IoSlice<'_>]) -> io::Result<usize>);

    fn is_write_vectored(&self) -> bool {
        match self {
            ClientStream::Plain(stream) => stream.is_write_vectored(),
            #[cfg(feature = "tls")]
            ClientStream::Rustls(stream) => stream.is_write_vectored(),
        }
    }
}
