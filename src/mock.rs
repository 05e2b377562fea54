//! Scripted in-memory transport.
//!
//! Every endpoint is a circular list of canned payloads behind a cursor, which is how the
//! log register of a real device behaves. Touching the clock endpoint rewinds the log
//! cursor like the hardware does.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use bluest::Uuid;
use tokio::sync::{mpsc, Notify};

use crate::device::{LOG_UUID, SEC_UUID};
use crate::transport::{Advertisement, Client, Transport};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Operations a client performed against a [`MockDevice`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Connect,
    Read(Uuid),
    Write(Uuid, Vec<u8>),
    Subscribe(Uuid),
    Unsubscribe(Uuid),
    Disconnect,
}

#[derive(Debug, Default)]
struct Register {
    records: Vec<Vec<u8>>,
    cursor: usize,
}

impl Register {
    fn next(&mut self) -> Option<Vec<u8>> {
        let record = self.records.get(self.cursor)?.clone();
        self.cursor = (self.cursor + 1) % self.records.len();
        Some(record)
    }
}

#[derive(Debug)]
pub struct MockDevice {
    advertisement: Advertisement,
    registers: Mutex<HashMap<Uuid, Register>>,
    journal: Mutex<Vec<MockCall>>,
    subscribers: Mutex<HashMap<Uuid, mpsc::Sender<Vec<u8>>>>,
    link: Mutex<Option<Arc<Notify>>>,
    connect_failures: AtomicU32,
    connect_attempts: AtomicU32,
}

impl MockDevice {
    fn new(advertisement: Advertisement) -> Self {
        Self {
            advertisement,
            registers: Mutex::new(HashMap::new()),
            journal: Mutex::new(Vec::new()),
            subscribers: Mutex::new(HashMap::new()),
            link: Mutex::new(None),
            connect_failures: AtomicU32::new(0),
            connect_attempts: AtomicU32::new(0),
        }
    }

    /// Payloads returned by successive reads of `endpoint`, wrapping around.
    pub fn set_records(&self, endpoint: Uuid, records: Vec<Vec<u8>>) {
        lock(&self.registers).insert(endpoint, Register { records, cursor: 0 });
    }

    /// Make the next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.connect_failures.store(count, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn journal(&self) -> Vec<MockCall> {
        lock(&self.journal).clone()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.link).is_some()
    }

    /// Drop the link from the device side.
    pub fn drop_link(&self) {
        lock(&self.subscribers).clear();
        if let Some(link) = lock(&self.link).take() {
            link.notify_one();
        }
    }

    /// Close the notification stream of `endpoint` while the link stays up.
    pub fn end_notifications(&self, endpoint: Uuid) {
        lock(&self.subscribers).remove(&endpoint);
    }

    /// Push a notification to a subscribed client. Returns `false` if nobody is subscribed.
    pub async fn notify(&self, endpoint: Uuid, data: Vec<u8>) -> bool {
        let subscriber = lock(&self.subscribers).get(&endpoint).cloned();
        match subscriber {
            Some(tx) => tx.send(data).await.is_ok(),
            None => false,
        }
    }

    fn record(&self, call: MockCall) {
        lock(&self.journal).push(call);
    }

    fn read(&self, endpoint: Uuid) -> anyhow::Result<Vec<u8>> {
        let mut registers = lock(&self.registers);
        let record = registers
            .get_mut(&endpoint)
            .and_then(Register::next)
            .ok_or_else(|| anyhow!("nothing to read on {endpoint}"))?;
        if endpoint == SEC_UUID {
            Self::rewind_log(&mut registers);
        }
        Ok(record)
    }

    fn write(&self, endpoint: Uuid, data: &[u8]) -> anyhow::Result<()> {
        let mut registers = lock(&self.registers);
        let register = registers
            .get_mut(&endpoint)
            .ok_or_else(|| anyhow!("no endpoint {endpoint}"))?;
        register.records = vec![data.to_vec()];
        register.cursor = 0;
        if endpoint == SEC_UUID {
            Self::rewind_log(&mut registers);
        }
        Ok(())
    }

    fn rewind_log(registers: &mut HashMap<Uuid, Register>) {
        if let Some(log) = registers.get_mut(&LOG_UUID) {
            log.cursor = 0;
        }
    }
}

#[derive(Debug, Default)]
pub struct MockTransport {
    devices: Mutex<Vec<Arc<MockDevice>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device that shows up in every scan.
    pub fn add_device(&self, advertisement: Advertisement) -> Arc<MockDevice> {
        let device = Arc::new(MockDevice::new(advertisement));
        lock(&self.devices).push(device.clone());
        device
    }

    fn device(&self, address: &str) -> Option<Arc<MockDevice>> {
        lock(&self.devices)
            .iter()
            .find(|device| device.advertisement.address == address)
            .cloned()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Client = MockClient;

    async fn scan(&self, window: Duration) -> anyhow::Result<Vec<Advertisement>> {
        tokio::time::sleep(window).await;
        Ok(lock(&self.devices)
            .iter()
            .map(|device| device.advertisement.clone())
            .collect())
    }

    async fn connect(&self, address: &str) -> anyhow::Result<MockClient> {
        let device = self
            .device(address)
            .ok_or_else(|| anyhow!("device {address} not found"))?;
        device.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = device
            .connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(anyhow!("connection to {address} refused"));
        }

        let link = Arc::new(Notify::new());
        *lock(&device.link) = Some(link.clone());
        device.record(MockCall::Connect);
        Ok(MockClient { device, link })
    }
}

#[derive(Debug)]
pub struct MockClient {
    device: Arc<MockDevice>,
    link: Arc<Notify>,
}

#[async_trait]
impl Client for MockClient {
    fn endpoints(&self) -> Vec<Uuid> {
        lock(&self.device.registers).keys().copied().collect()
    }

    async fn read(&self, endpoint: Uuid) -> anyhow::Result<Vec<u8>> {
        self.device.record(MockCall::Read(endpoint));
        self.device.read(endpoint)
    }

    async fn write(&self, endpoint: Uuid, data: &[u8]) -> anyhow::Result<()> {
        self.device.record(MockCall::Write(endpoint, data.to_vec()));
        self.device.write(endpoint, data)
    }

    async fn subscribe(&self, endpoint: Uuid) -> anyhow::Result<mpsc::Receiver<Vec<u8>>> {
        self.device.record(MockCall::Subscribe(endpoint));
        let (tx, rx) = mpsc::channel(16);
        lock(&self.device.subscribers).insert(endpoint, tx);
        Ok(rx)
    }

    async fn unsubscribe(&self, endpoint: Uuid) -> anyhow::Result<()> {
        self.device.record(MockCall::Unsubscribe(endpoint));
        lock(&self.device.subscribers).remove(&endpoint);
        Ok(())
    }

    async fn disconnected(&self) {
        self.link.notified().await;
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        self.device.record(MockCall::Disconnect);
        lock(&self.device.subscribers).clear();
        let mut link = lock(&self.device.link);
        if link.as_ref().is_some_and(|current| Arc::ptr_eq(current, &self.link)) {
            *link = None;
        }
        Ok(())
    }
}
