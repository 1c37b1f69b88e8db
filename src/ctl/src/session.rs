use std::io::ErrorKind;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};

use protocol::{ClientError, Message};

use crate::config::Target;
use crate::error::CtlError;

/// Sends one request to a branch and returns its non-error response.
pub trait Transport {
    fn call(&mut self, branch: u32, message: &Message) -> Result<Message, CtlError>;
}

/// Dials the addressed branch afresh for every request.
pub struct TcpTransport {
    target: Target,
}

impl TcpTransport {
    pub fn new(target: Target) -> Self {
        TcpTransport { target }
    }

    fn connect(&self, branch: u32) -> Result<TcpStream, CtlError> {
        let addr = self.target.addr_for(branch)?;
        let resolved: Vec<SocketAddr> = addr.to_socket_addrs()?.collect();

        let mut last_error = None;
        for candidate in resolved {
            match TcpStream::connect_timeout(&candidate, self.target.connect_timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    stream.set_read_timeout(self.target.request_timeout)?;
                    stream.set_write_timeout(self.target.request_timeout)?;
                    return Ok(stream);
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    last_error = Some(CtlError::Client(ClientError::ConnectTimeout(addr.clone())));
                }
                Err(e) => last_error = Some(CtlError::Io(e)),
            }
        }
        Err(last_error.unwrap_or(CtlError::UnknownBranch(branch)))
    }
}

impl Transport for TcpTransport {
    fn call(&mut self, branch: u32, message: &Message) -> Result<Message, CtlError> {
        let mut stream = self.connect(branch)?;
        let exchange = message.send(&mut stream).and_then(|_| Message::receive(&mut stream));
        let response = match exchange {
            Ok(response) => response,
            // Socket timeouts surface as WouldBlock on Unix and TimedOut on Windows.
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(CtlError::Timeout {
                    addr: self.target.addr_for(branch)?,
                    after: self.target.request_timeout.unwrap_or_default(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        Ok(response.into_result()?)
    }
}
