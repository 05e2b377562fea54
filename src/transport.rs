//! The seam between the session logic and a Bluetooth stack.

use async_trait::async_trait;
use bluest::Uuid;
use std::time::Duration;
use tokio::sync::mpsc;

/// A device seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub address: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Client: Client;

    /// Listen for advertisements for `window` and return every device seen.
    async fn scan(&self, window: Duration) -> anyhow::Result<Vec<Advertisement>>;

    /// Connect to a previously advertised device and resolve its endpoints.
    async fn connect(&self, address: &str) -> anyhow::Result<Self::Client>;
}

/// A connected device.
#[async_trait]
pub trait Client: Send + Sync + 'static {
    /// Endpoints discovered on the device.
    fn endpoints(&self) -> Vec<Uuid>;

    async fn read(&self, endpoint: Uuid) -> anyhow::Result<Vec<u8>>;

    async fn write(&self, endpoint: Uuid, data: &[u8]) -> anyhow::Result<()>;

    /// Start notifications. Each notification arrives on the returned channel, which
    /// closes on [`Client::unsubscribe`] or when the link goes down.
    async fn subscribe(&self, endpoint: Uuid) -> anyhow::Result<mpsc::Receiver<Vec<u8>>>;

    async fn unsubscribe(&self, endpoint: Uuid) -> anyhow::Result<()>;

    /// Resolves once the device drops the link on its own.
    async fn disconnected(&self);

    async fn disconnect(&self) -> anyhow::Result<()>;
}
