//! In-memory transports for tests.
//!
//! Used by the test suites of this workspace; not meant for production wiring.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::transport;
use crate::transport::Delivery;
use crate::transport::Transport;

/// A duplex channel transport using tokio mpsc channels.
///
/// Messages sent via `send()` appear on the peer's `recv()` and vice versa.
/// With echo enabled, a side also receives its own messages, the way a page
/// sees every message it posts to itself.
pub struct DuplexChannelTransport {
    tx: mpsc::UnboundedSender<Delivery>,
    echo: Option<mpsc::UnboundedSender<Delivery>>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Delivery>>>,
}

impl DuplexChannelTransport {
    /// Creates a pair of transports connected to each other.
    ///
    /// Messages sent on `a` are received by `b` and vice versa.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = Self {
            tx: tx_a,
            echo: None,
            rx: Arc::new(Mutex::new(rx_b)),
        };

        let b = Self {
            tx: tx_b,
            echo: None,
            rx: Arc::new(Mutex::new(rx_a)),
        };

        (a, b)
    }

    /// Like `pair()`, but the first transport also hears its own messages.
    pub fn broadcast_pair() -> (Self, Self, Injector) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let injector = Injector { tx: tx_b.clone() };

        let page = Self {
            tx: tx_a,
            echo: Some(tx_b.clone()),
            rx: Arc::new(Mutex::new(rx_b)),
        };

        let plugin = Self {
            tx: tx_b,
            echo: None,
            rx: Arc::new(Mutex::new(rx_a)),
        };

        (page, plugin, injector)
    }
}

#[async_trait::async_trait]
impl Transport for DuplexChannelTransport {
    async fn send(&self, payload: &[u8]) -> transport::Result<()> {
        if let Some(echo) = &self.echo {
            let _ = echo.send(Delivery::page(payload));
        }
        self.tx
            .send(Delivery::page(payload))
            .map_err(|_| transport::Error::ConnectionLost("Channel closed".into()))
    }

    async fn recv(&self) -> transport::Result<Option<Delivery>> {
        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await)
    }
}

/// Pushes arbitrary deliveries into the page side of a `broadcast_pair()`.
#[derive(Clone)]
pub struct Injector {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl Injector {
    pub fn inject(&self, delivery: Delivery) {
        let _ = self.tx.send(delivery);
    }
}

/// A transport whose channel is already gone.
pub struct ClosedTransport;

#[async_trait::async_trait]
impl Transport for ClosedTransport {
    async fn send(&self, _payload: &[u8]) -> transport::Result<()> {
        Err(transport::Error::ConnectionLost("plugin not installed".into()))
    }

    async fn recv(&self) -> transport::Result<Option<Delivery>> {
        Ok(None)
    }
}
