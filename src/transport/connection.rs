//! Per-connection protocol state machine.
//!
//! ```text
//! AwaitingCommand -> Dispatching -> PublishAndClose ----------------------------> Closed
//!                               \-> Retaining -> AckSent -> Streaming -> Draining -> Closed
//! ```
//!
//! A reader task owns the read half of the connection for its whole life. It
//! hands chunks to the handler through a one-slot mailbox and drops chunks
//! while the slot is occupied; EOF and read errors are always delivered. The
//! first chunk is the command. While streaming, later chunks are ignored and
//! the terminal event ends the stream.
//!
//! Subscribing spawns one listener task per topic. Listeners forward topic
//! messages into a bounded outbound queue that the handler drains onto the
//! socket, so only the handler ever writes. When streaming ends, for any
//! reason, every topic is released first and the listeners are then
//! cancelled and awaited.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{Instrument, debug, error, info, warn};

use crate::broker::Broker;
use crate::transport::command::{Command, subscribe_ack};
use crate::utils::error::BrokerError;

const INTAKE_CAPACITY: usize = 1;

#[derive(Debug)]
pub(super) enum Inbound {
    Data(Bytes),
    Closed(io::Result<()>),
}

/// Serves one connection until it is closed.
///
/// Works over any byte stream, so the handler can be driven by a TCP socket
/// or by an in-memory pipe.
pub async fn handle_connection<S>(broker: Arc<Broker>, stream: S)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let (intake, inbound) = mpsc::channel(INTAKE_CAPACITY);
    let _reader = AbortOnDrop(tokio::spawn(
        read_loop(read_half, intake, broker.settings().read_buffer_size).in_current_span(),
    ));

    let mut connection = Connection {
        broker,
        inbound,
        writer: write_half,
    };
    connection.serve().await;

    if let Err(err) = connection.writer.shutdown().await {
        debug!(error = %err, "connection already closed");
    }
    debug!("connection closed");
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct Connection<S> {
    broker: Arc<Broker>,
    inbound: mpsc::Receiver<Inbound>,
    writer: WriteHalf<S>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn serve(&mut self) {
        let raw = match self.inbound.recv().await {
            Some(Inbound::Data(raw)) => raw,
            Some(Inbound::Closed(Err(err))) => {
                debug!(error = %err, "connection failed before a command arrived");
                return;
            }
            Some(Inbound::Closed(Ok(()))) | None => {
                debug!("connection closed before a command arrived");
                return;
            }
        };

        if let Err(err) = self.dispatch(&raw).await {
            self.write_problem(err).await;
        }
    }

    async fn dispatch(&mut self, raw: &[u8]) -> Result<(), BrokerError> {
        match Command::parse(raw)? {
            Command::Publish { topic, data } => {
                let size = data.len();
                let delivered = self.broker.publish(&topic, data)?;
                info!(topic = %topic, size, delivered, "published");
                Ok(())
            }
            Command::Subscribe { topics } => self.subscribe(&topics).await,
        }
    }

    async fn subscribe(&mut self, topics: &[String]) -> Result<(), BrokerError> {
        let subscriptions = self.broker.subscribe(topics);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (outbound_tx, mut outbound) =
            mpsc::channel(self.broker.settings().outbound_capacity.max(1));

        let mut names = Vec::with_capacity(subscriptions.len());
        let mut leases = Vec::with_capacity(subscriptions.len());
        let mut listeners = JoinSet::new();
        for subscription in subscriptions {
            let (lease, receiver) = subscription.into_parts();
            let name = lease.topic().name().to_string();
            listeners.spawn(
                listen(
                    name.clone(),
                    receiver,
                    outbound_tx.clone(),
                    cancel_rx.clone(),
                )
                .in_current_span(),
            );
            names.push(name);
            leases.push(lease);
        }
        drop(outbound_tx);

        let result = self.stream(&names, &mut outbound).await;

        drop(leases);
        let _ = cancel_tx.send(true);
        listeners.shutdown().await;
        info!(topics = ?names, "unsubscribed");

        result
    }

    async fn stream(
        &mut self,
        names: &[String],
        outbound: &mut mpsc::Receiver<Bytes>,
    ) -> Result<(), BrokerError> {
        self.writer
            .write_all(subscribe_ack(names).as_bytes())
            .await
            .map_err(|err| BrokerError::io("cannot write to connection", err))?;
        info!(topics = ?names, "subscribed");

        loop {
            tokio::select! {
                inbound = self.inbound.recv() => match inbound {
                    Some(Inbound::Data(_)) => continue,
                    Some(Inbound::Closed(Ok(()))) | None => return Ok(()),
                    Some(Inbound::Closed(Err(err))) => {
                        return Err(BrokerError::io("cannot read from connection", err));
                    }
                },
                Some(payload) = outbound.recv() => {
                    self.writer
                        .write_all(&payload)
                        .await
                        .map_err(|err| BrokerError::io("cannot write to connection", err))?;
                }
            }
        }
    }

    async fn write_problem(&mut self, err: BrokerError) {
        let problem = err.into_problem();
        debug!(kind = %problem.kind, detail = %problem.detail, "command rejected");

        let line = match problem.to_json_line() {
            Ok(line) => line,
            Err(err) => {
                error!(error = %err, "cannot encode problem");
                return;
            }
        };
        if let Err(err) = self.writer.write_all(&line).await {
            error!(error = %err, "cannot write to connection");
        }
    }
}

pub(super) async fn read_loop<R>(
    mut reader: R,
    intake: mpsc::Sender<Inbound>,
    buffer_size: usize,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; buffer_size.max(1)];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                let _ = intake.send(Inbound::Closed(Ok(()))).await;
                return;
            }
            Ok(n) => match intake.try_send(Inbound::Data(Bytes::copy_from_slice(&buf[..n]))) {
                Ok(()) | Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Closed(_)) => return,
            },
            Err(err) => {
                let _ = intake.send(Inbound::Closed(Err(err))).await;
                return;
            }
        }
    }
}

async fn listen(
    topic: String,
    mut receiver: broadcast::Receiver<Bytes>,
    outbound: mpsc::Sender<Bytes>,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.changed() => break,
            message = receiver.recv() => match message {
                Ok(payload) => {
                    if outbound.send(payload).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(topic = %topic, skipped, "subscriber lagged, oldest messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!(topic = %topic, "listener stopped");
}
