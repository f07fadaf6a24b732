use std::io;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::broker::engine::unique_topics;
use crate::transport::command::{Command, subscribe_ack};
use crate::utils::error::Problem;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Io(#[from] io::Error),

    #[error("broker rejected the command: {0}")]
    Problem(#[from] Problem),

    #[error("unexpected response from broker: {0:?}")]
    UnexpectedResponse(String),
}

/// A single connection to the broker.
///
/// Each connection carries exactly one command, so `publish` and `subscribe`
/// consume the client.
#[derive(Debug)]
pub struct Client {
    stream: TcpStream,
}

impl Client {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Publishes `data` to `topic` and waits for the broker to close the connection.
    pub async fn publish(
        mut self,
        topic: &str,
        data: impl Into<Bytes>,
    ) -> Result<(), ClientError> {
        let command = Command::Publish {
            topic: topic.to_string(),
            data: data.into(),
        };
        self.stream.write_all(&command.encode()).await?;

        let mut response = Vec::new();
        self.stream.read_to_end(&mut response).await?;
        if response.is_empty() {
            Ok(())
        } else {
            Err(parse_problem(&response))
        }
    }

    /// Subscribes to `topics` and returns once the broker acknowledged them.
    pub async fn subscribe<S: AsRef<str>>(
        mut self,
        topics: &[S],
    ) -> Result<Subscriber, ClientError> {
        let topics: Vec<String> = unique_topics(topics)
            .into_iter()
            .map(str::to_string)
            .collect();
        let command = Command::Subscribe {
            topics: topics.clone(),
        };
        self.stream.write_all(&command.encode()).await?;

        let ack = subscribe_ack(&topics).into_bytes();
        let mut buf = BytesMut::with_capacity(ack.len());
        loop {
            if buf.first() == Some(&b'{') {
                let mut rest = Vec::new();
                self.stream.read_to_end(&mut rest).await?;
                buf.extend_from_slice(&rest);
                return Err(parse_problem(&buf));
            }
            if buf.len() >= ack.len() {
                if !buf.starts_with(&ack) {
                    return Err(unexpected(&buf));
                }
                let _ = buf.split_to(ack.len());
                return Ok(Subscriber {
                    stream: self.stream,
                    buf,
                });
            }
            if !ack.starts_with(&buf) {
                return Err(unexpected(&buf));
            }
            if self.stream.read_buf(&mut buf).await? == 0 {
                return Err(unexpected(&buf));
            }
        }
    }
}

/// A subscribed connection. Payloads arrive back to back without framing.
#[derive(Debug)]
pub struct Subscriber {
    stream: TcpStream,
    buf: BytesMut,
}

impl Subscriber {
    /// Whatever payload bytes are available next, or `None` once the broker closed.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, ClientError> {
        if self.buf.is_empty() && self.stream.read_buf(&mut self.buf).await? == 0 {
            return Ok(None);
        }
        Ok(Some(self.buf.split().freeze()))
    }

    /// Exactly `len` payload bytes.
    pub async fn recv_exact(&mut self, len: usize) -> Result<Bytes, ClientError> {
        while self.buf.len() < len {
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
        }
        Ok(self.buf.split_to(len).freeze())
    }

    /// Copies payload bytes to `out` as they arrive until the broker closes.
    ///
    /// Nothing is added between payloads; chunk boundaries are read
    /// boundaries, not message boundaries.
    pub async fn forward<W>(&mut self, out: &mut W) -> Result<(), ClientError>
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(chunk) = self.next_chunk().await? {
            out.write_all(&chunk).await?;
            out.flush().await?;
        }
        Ok(())
    }

    /// Closes the connection, which ends the subscription on the broker.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Interprets a non-empty broker response as a problem detail.
pub fn parse_problem(response: &[u8]) -> ClientError {
    match serde_json::from_slice::<Problem>(response.trim_ascii()) {
        Ok(problem) => ClientError::Problem(problem),
        Err(_) => unexpected(response),
    }
}

fn unexpected(response: &[u8]) -> ClientError {
    ClientError::UnexpectedResponse(String::from_utf8_lossy(response).into_owned())
}
