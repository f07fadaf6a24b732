//! TCP acceptor.
//!
//! Accepts connections and runs one [`handle_connection`] task per
//! connection, each inside a span tagged with a connection id and the peer
//! address. Accept failures are logged and the loop keeps going.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

use crate::broker::Broker;
use crate::transport::connection::handle_connection;
use crate::utils::error::BrokerError;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Server {
    listener: TcpListener,
    broker: Arc<Broker>,
}

impl Server {
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        broker: Arc<Broker>,
    ) -> Result<Self, BrokerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| BrokerError::io("cannot listen on address", err))?;
        Ok(Self { listener, broker })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The broker shared by every connection this server accepts.
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Accepts connections until the task running it is dropped.
    pub async fn run(self) {
        if let Ok(addr) = self.local_addr() {
            info!(%addr, "pub/sub server listening");
        }

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    error!(error = %err, "cannot accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            if let Err(err) = stream.set_nodelay(true) {
                debug!(error = %err, %peer, "cannot disable Nagle's algorithm");
            }

            let id = format!("client-{}", Uuid::new_v4());
            let span = info_span!("connection", %id, %peer);
            let broker = self.broker.clone();
            tokio::spawn(
                async move {
                    debug!("connection accepted");
                    handle_connection(broker, stream).await;
                }
                .instrument(span),
            );
        }
    }
}
