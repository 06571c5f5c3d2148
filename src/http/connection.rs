use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::handler::ImageHandler;
use crate::http::parser::{ParseError, parse_http_request};
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseWriter;

const READ_CHUNK: usize = 8192;

/// Upper bound on the request line plus headers.
const MAX_HEADER_BYTES: usize = 16 * 1024;

pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    buffer: BytesMut,
    state: ConnectionState,
    handler: Arc<ImageHandler>,
    max_body: usize,
    read_timeout: Duration,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Closed,
}

/// What came off the wire for one request.
pub enum ReadOutcome {
    Request(Request),
    /// The bytes can't become a request; answer with this status and close
    Rejected(StatusCode),
    /// Client went away or stayed idle past the read timeout
    Closed,
}

impl Connection {
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        handler: Arc<ImageHandler>,
        max_body: usize,
        read_timeout: Duration,
    ) -> Self {
        Self {
            stream,
            peer,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            state: ConnectionState::Reading,
            handler,
            max_body,
            read_timeout,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            let state = std::mem::replace(&mut self.state, ConnectionState::Closed);

            self.state = match state {
                ConnectionState::Reading => match self.read_request().await? {
                    ReadOutcome::Request(req) => ConnectionState::Processing(req),
                    ReadOutcome::Rejected(status) => {
                        let response = Response::empty(status).with_connection_close();
                        ConnectionState::Writing(ResponseWriter::new(&response), false)
                    }
                    ReadOutcome::Closed => ConnectionState::Closed,
                },

                ConnectionState::Processing(req) => {
                    let keep_alive = req.keep_alive();
                    let mut response = self.handler.handle(req).await;
                    if !keep_alive {
                        response = response.with_connection_close();
                    }

                    tracing::debug!(
                        peer = %self.peer,
                        status = response.status.as_u16(),
                        keep_alive,
                        "Response ready"
                    );

                    ConnectionState::Writing(ResponseWriter::new(&response), keep_alive)
                }

                ConnectionState::Writing(mut writer, keep_alive) => {
                    writer.write_to_stream(&mut self.stream).await?;

                    if keep_alive {
                        ConnectionState::Reading // go back for next request
                    } else {
                        ConnectionState::Closed
                    }
                }

                ConnectionState::Closed => {
                    let _ = self.stream.shutdown().await;
                    break;
                }
            };
        }

        Ok(())
    }

    pub async fn read_request(&mut self) -> anyhow::Result<ReadOutcome> {
        loop {
            // Try parsing whatever we already have
            match parse_http_request(&self.buffer, self.max_body) {
                Ok((request, consumed)) => {
                    let _ = self.buffer.split_to(consumed);
                    return Ok(ReadOutcome::Request(request));
                }

                Err(ParseError::Incomplete) => {
                    if self.buffer.len() > MAX_HEADER_BYTES + self.max_body {
                        tracing::debug!(peer = %self.peer, "Request exceeds buffer limit");
                        return Ok(ReadOutcome::Rejected(StatusCode::BadRequest));
                    }
                }

                Err(e) => {
                    tracing::debug!(peer = %self.peer, error = ?e, "Rejecting unparseable request");
                    return Ok(ReadOutcome::Rejected(StatusCode::BadRequest));
                }
            }

            let n = match timeout(self.read_timeout, self.stream.read_buf(&mut self.buffer)).await {
                Ok(read) => read?,
                Err(_) => {
                    tracing::debug!(peer = %self.peer, buffered = self.buffer.len(), "Read timed out");
                    return Ok(ReadOutcome::Closed);
                }
            };

            if n == 0 {
                // Client closed connection
                return Ok(ReadOutcome::Closed);
            }
        }
    }
}

/// Answer a connection that was not admitted with 503 and close it.
pub async fn reject_overloaded(mut stream: TcpStream) -> anyhow::Result<()> {
    let response = Response::empty(StatusCode::ServiceUnavailable).with_connection_close();
    ResponseWriter::new(&response)
        .write_to_stream(&mut stream)
        .await?;
    stream.shutdown().await?;
    Ok(())
}
