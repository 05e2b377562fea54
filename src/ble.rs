//! [`Transport`] over the host's Bluetooth adapter, using bluest.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use bluest::{Adapter, AdvertisingDevice, Characteristic, Device, Uuid};
use futures_util::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::transport::{Advertisement, Client, Transport};

pub struct BluestTransport {
    adapter: Adapter,
    /// Devices seen in the latest scan plus any still connected, by address.
    /// Connecting needs the handle from the scan.
    seen: Mutex<HashMap<String, Device>>,
}

impl BluestTransport {
    const CONNECT_TIMEOUT_S: u64 = 30;

    /// Open the default adapter and wait until it is powered.
    pub async fn new() -> anyhow::Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or(anyhow!("Default adapter not found"))?;
        adapter.wait_available().await?;
        Ok(Self {
            adapter,
            seen: Mutex::new(HashMap::new()),
        })
    }

    async fn advertisement(found: &AdvertisingDevice) -> Advertisement {
        let name = match &found.adv_data.local_name {
            Some(name) => Some(name.clone()),
            None => found.device.name_async().await.ok(),
        };
        Advertisement {
            address: address_of(&found.device.id()),
            name,
            rssi: found.rssi,
        }
    }

    async fn discover(device: &Device) -> anyhow::Result<HashMap<Uuid, Characteristic>> {
        let mut characteristics = HashMap::new();
        for service in device.discover_services().await? {
            for characteristic in service.discover_characteristics().await? {
                characteristics.insert(characteristic.uuid(), characteristic);
            }
        }
        Ok(characteristics)
    }
}

fn address_of(id: &impl fmt::Display) -> String {
    id.to_string()
}

/// Devices from the latest scan, plus the earlier ones named in `keep`.
fn refresh_seen<D>(
    previous: HashMap<String, D>,
    scanned: HashMap<String, D>,
    keep: &HashSet<String>,
) -> HashMap<String, D> {
    let mut seen = scanned;
    for (address, device) in previous {
        if keep.contains(&address) {
            seen.entry(address).or_insert(device);
        }
    }
    seen
}

#[async_trait]
impl Transport for BluestTransport {
    type Client = BluestClient;

    async fn scan(&self, window: Duration) -> anyhow::Result<Vec<Advertisement>> {
        let mut found = HashMap::new();
        let mut scanned = HashMap::new();
        let mut events = self.adapter.scan(&[]).await?;
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);

        loop {
            let next = tokio::select! {
                _ = &mut deadline => break,
                next = events.next() => next,
            };
            let Some(device) = next else {
                break;
            };
            let advertisement = Self::advertisement(&device).await;
            scanned.insert(advertisement.address.clone(), device.device);
            found.insert(advertisement.address.clone(), advertisement);
        }

        let mut seen = self.seen.lock().await;
        let previous = std::mem::take(&mut *seen);
        let mut connected = HashSet::new();
        for (address, device) in &previous {
            if !scanned.contains_key(address) && device.is_connected().await {
                connected.insert(address.clone());
            }
        }
        *seen = refresh_seen(previous, scanned, &connected);
        debug!(devices = seen.len(), "scan finished");

        Ok(found.into_values().collect())
    }

    async fn connect(&self, address: &str) -> anyhow::Result<BluestClient> {
        let device = self
            .seen
            .lock()
            .await
            .get(address)
            .cloned()
            .ok_or_else(|| anyhow!("Device {address} has not been seen in a scan"))?;

        let connect_timeout = Duration::from_secs(Self::CONNECT_TIMEOUT_S);
        if !device.is_connected().await {
            timeout(connect_timeout, self.adapter.connect_device(&device))
                .await
                .map_err(|_| anyhow!("Timed out connecting to {address}"))??;
        }

        let characteristics = timeout(connect_timeout, Self::discover(&device))
            .await
            .map_err(|_| anyhow!("Timed out discovering {address}"))??;
        debug!(address, characteristics = characteristics.len(), "connected");

        Ok(BluestClient {
            adapter: self.adapter.clone(),
            device,
            characteristics,
            notifications: Mutex::new(HashMap::new()),
        })
    }
}

pub struct BluestClient {
    adapter: Adapter,
    device: Device,
    characteristics: HashMap<Uuid, Characteristic>,
    notifications: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl BluestClient {
    const LINK_POLL_S: u64 = 1;
    const NOTIFICATION_BUFFER: usize = 16;

    fn characteristic(&self, uuid: Uuid) -> anyhow::Result<&Characteristic> {
        self.characteristics
            .get(&uuid)
            .ok_or(anyhow!("The device does not have characteristic {uuid}"))
    }
}

#[async_trait]
impl Client for BluestClient {
    fn endpoints(&self) -> Vec<Uuid> {
        self.characteristics.keys().copied().collect()
    }

    async fn read(&self, endpoint: Uuid) -> anyhow::Result<Vec<u8>> {
        Ok(self.characteristic(endpoint)?.read().await?)
    }

    async fn write(&self, endpoint: Uuid, data: &[u8]) -> anyhow::Result<()> {
        self.characteristic(endpoint)?.write(data).await?;
        Ok(())
    }

    async fn subscribe(&self, endpoint: Uuid) -> anyhow::Result<mpsc::Receiver<Vec<u8>>> {
        let characteristic = self.characteristic(endpoint)?.clone();
        let (tx, rx) = mpsc::channel(Self::NOTIFICATION_BUFFER);

        let task = tokio::spawn(async move {
            let mut notifications = match characteristic.notify().await {
                Ok(notifications) => notifications,
                Err(err) => {
                    warn!(%endpoint, "Failed to enable notifications: {err}");
                    return;
                }
            };
            while let Some(notification) = notifications.next().await {
                match notification {
                    Ok(data) => {
                        if tx.send(data).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(%endpoint, "Notification error: {err}");
                        break;
                    }
                }
            }
            debug!(%endpoint, "End of notification stream");
        });

        if let Some(previous) = self.notifications.lock().await.insert(endpoint, task) {
            previous.abort();
        }
        Ok(rx)
    }

    async fn unsubscribe(&self, endpoint: Uuid) -> anyhow::Result<()> {
        if let Some(task) = self.notifications.lock().await.remove(&endpoint) {
            task.abort();
        }
        Ok(())
    }

    async fn disconnected(&self) {
        while self.device.is_connected().await {
            tokio::time::sleep(Duration::from_secs(Self::LINK_POLL_S)).await;
        }
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        for (_, task) in self.notifications.lock().await.drain() {
            task.abort();
        }
        self.adapter.disconnect_device(&self.device).await?;
        Ok(())
    }
}
