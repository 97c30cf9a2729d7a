//! Buffered blocking connection to the server.
use std::{
    io::{Read, Write},
    net::TcpStream,
    time::Duration,
};

use bytes::{Buf, BufMut, BytesMut};

use crate::{
    Result,
    error::Error,
    protocol::{
        BackendProtocol,
        frontend::{self, FrontendProtocol},
    },
};

#[cfg(feature = "tls")]
use crate::{common::debug, connection::TlsMode, protocol::SSL_REQUEST_CODE};

const DEFAULT_BUF_CAPACITY: usize = 1024;
const READ_CHUNK: usize = 8 * 1024;

enum Io {
    Plain(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<native_tls::TlsStream<TcpStream>>),
}

impl Io {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Io::Plain(s) => s.read(buf),
            #[cfg(feature = "tls")]
            Io::Tls(s) => s.read(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Io::Plain(s) => s.write_all(buf),
            #[cfg(feature = "tls")]
            Io::Tls(s) => s.write_all(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Io::Plain(s) => s.flush(),
            #[cfg(feature = "tls")]
            Io::Tls(s) => s.flush(),
        }
    }

    fn socket(&self) -> &TcpStream {
        match self {
            Io::Plain(s) => s,
            #[cfg(feature = "tls")]
            Io::Tls(s) => s.get_ref(),
        }
    }
}

/// Buffered blocking stream speaking the message framing, plain or TLS.
pub(crate) struct BufferedStream {
    io: Io,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl BufferedStream {
    pub(crate) fn connect(host: &str, port: u16, timeout: Option<Duration>) -> Result<Self> {
        let socket = TcpStream::connect((host, port))?;
        socket.set_read_timeout(timeout)?;
        socket.set_write_timeout(timeout)?;
        Ok(Self {
            io: Io::Plain(socket),
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
        })
    }

    /// Negotiate TLS by sending the 8-byte SSL request.
    ///
    /// A single `S` response upgrades the stream, anything else is fatal.
    /// Under `verify-ca` the certificate chain is checked against the
    /// trust roots (plus `ca_file` when given), `verify-full` additionally
    /// matches the hostname.
    #[cfg(feature = "tls")]
    pub(crate) fn secure(&mut self, host: &str, mode: TlsMode, ca_file: Option<&std::path::Path>) -> Result<()> {
        let Io::Plain(socket) = &mut self.io else {
            return Err(Error::Interface("stream is already secured".into()));
        };

        let mut request = [0u8; 8];
        request[..4].copy_from_slice(&8i32.to_be_bytes());
        request[4..].copy_from_slice(&SSL_REQUEST_CODE.to_be_bytes());
        socket.write_all(&request)?;
        socket.flush()?;

        let mut response = [0u8; 1];
        socket.read_exact(&mut response)?;
        if response != [b'S'] {
            debug!("ssl negotiation response: {:?}", response[0] as char);
            return Err(Error::Interface("Server refuses SSL".into()));
        }

        let mut builder = native_tls::TlsConnector::builder();
        if let Some(path) = ca_file {
            let pem = std::fs::read(path)?;
            builder.add_root_certificate(native_tls::Certificate::from_pem(&pem)?);
        }
        if mode == TlsMode::VerifyCa {
            // chain is still verified, only the hostname check is waived
            builder.danger_accept_invalid_hostnames(true);
        }
        let connector = builder.build()?;

        let Io::Plain(plain) = &self.io else { unreachable!("checked above") };
        let socket = plain.try_clone()?;
        let tls = connector
            .connect(host, socket)
            .map_err(|err| match err {
                native_tls::HandshakeError::Failure(e) => Error::Tls(e),
                native_tls::HandshakeError::WouldBlock(_) => {
                    Error::Interface("tls handshake interrupted".into())
                }
            })?;
        self.io = Io::Tls(Box::new(tls));
        Ok(())
    }

    /// Buffer a frontend message.
    ///
    /// Note that sends are buffered, callers must also call
    /// [`flush`][Self::flush] afterwards.
    pub(crate) fn send<F: FrontendProtocol>(&mut self, msg: F) {
        frontend::write(msg, &mut self.write_buf);
    }

    /// Buffer the startup message, which carries no message-type byte.
    pub(crate) fn send_startup(&mut self, msg: frontend::Startup) {
        msg.write(&mut self.write_buf);
    }

    /// Write out and flush everything buffered.
    pub(crate) fn flush(&mut self) -> Result<()> {
        if !self.write_buf.is_empty() {
            let buf = self.write_buf.split();
            self.io.write_all(&buf)?;
        }
        self.io.flush()?;
        Ok(())
    }

    /// Receive one backend message, blocking until it is complete.
    pub(crate) fn recv<B: BackendProtocol>(&mut self) -> Result<B> {
        loop {
            if let Some(mut header) = self.read_buf.get(..5) {
                let msgtype = header.get_u8();
                let len = header.get_i32() as usize;

                if self.read_buf.len() - 1/*msgtype*/ >= len {
                    self.read_buf.advance(5);
                    let body = self.read_buf.split_to(len - 4).freeze();
                    return Ok(B::decode(msgtype, body)?);
                }
            }
            self.read_socket()?;
        }
    }

    fn read_socket(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.io.read(&mut chunk)?;
        if n == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            )));
        }
        self.read_buf.extend_from_slice(&chunk[..n]);
        Ok(())
    }

    /// Best-effort socket shutdown after `Terminate`.
    pub(crate) fn shutdown(&mut self) {
        let _ = self.io.socket().shutdown(std::net::Shutdown::Both);
    }
}

impl std::fmt::Debug for BufferedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        #[cfg(feature = "tls")]
        let tls = matches!(self.io, Io::Tls(_));
        #[cfg(not(feature = "tls"))]
        let tls = false;
        f.debug_struct("BufferedStream").field("tls", &tls).finish()
    }
}
