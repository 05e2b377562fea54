use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info, warn};

use crate::characteristic::{CharacteristicReader, ReadMode};
use crate::config::SessionConfig;
use crate::device::{DeviceFamily, EndpointRole};
use crate::error::SessionError;
use crate::event::{DeviceEvent, DisconnectReason, EventSender};
use crate::frame::schemas::encode_time_of_day;
use crate::log_readout::CursorEpoch;
use crate::shutdown::{stop_channel, StopSignal};
use crate::transport::{Advertisement, Client, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for the device to advertise.
    Discovering,
    Connecting,
    Ready,
    /// Stopped on request. Terminal.
    Disconnected,
    /// Abandoned after too many failed attempts. Terminal.
    GivingUp,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::GivingUp)
    }
}

/// Connection lifecycle of one physical device.
#[derive(Debug)]
pub struct ConnectionSession {
    address: String,
    family: &'static DeviceFamily,
    config: SessionConfig,
    state: ConnectionState,
    failed_attempts: u32,
    auto_reconnect: bool,
}

impl ConnectionSession {
    pub fn new(address: String, family: &'static DeviceFamily, config: SessionConfig) -> Self {
        Self {
            address,
            family,
            config,
            state: ConnectionState::Discovering,
            failed_attempts: 0,
            auto_reconnect: true,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// Start connecting if `advertisement` is this device. Returns `true` on transition.
    pub fn advertised(&mut self, advertisement: &Advertisement) -> bool {
        if self.state != ConnectionState::Discovering
            || advertisement.address != self.address
            || !self.family.matches(advertisement)
        {
            return false;
        }
        self.state = ConnectionState::Connecting;
        true
    }

    pub fn connected(&mut self) {
        self.state = ConnectionState::Ready;
        self.failed_attempts = 0;
    }

    /// Record a failed attempt. Returns the delay before the next attempt, or the error that
    /// ends the session.
    pub fn connect_failed(&mut self, err: &anyhow::Error) -> Result<Duration, SessionError> {
        self.failed_attempts += 1;
        let failure = SessionError::Connection {
            address: self.address.clone(),
            reason: format!("{err:#}"),
        };
        warn!(attempt = self.failed_attempts, "{failure}");

        if self.failed_attempts >= self.config.max_attempts {
            self.state = ConnectionState::GivingUp;
            return Err(SessionError::ExhaustedRetries {
                address: self.address.clone(),
                attempts: self.failed_attempts,
            });
        }
        self.state = ConnectionState::Connecting;
        Ok(self.config.retry_delay)
    }

    /// The device dropped the link. Returns the delay before reconnecting, or `None` if
    /// reconnecting has been disabled.
    pub fn peer_disconnected(&mut self) -> Option<Duration> {
        if self.auto_reconnect && self.state == ConnectionState::Ready {
            self.state = ConnectionState::Connecting;
            Some(self.config.retry_delay)
        } else {
            self.state = ConnectionState::Disconnected;
            None
        }
    }

    pub fn stop(&mut self) {
        self.auto_reconnect = false;
        if !self.state.is_terminal() {
            self.state = ConnectionState::Disconnected;
        }
    }

    /// Drive the session until it is stopped or gives up. The last event sent is always
    /// [`DeviceEvent::Disconnected`].
    ///
    /// A session still in `Discovering` connects right away, the caller has already matched
    /// the advertisement.
    pub async fn run<T: Transport>(
        mut self,
        transport: Arc<T>,
        events: EventSender,
        mut stop: StopSignal,
    ) -> ConnectionState {
        if self.state == ConnectionState::Discovering {
            self.state = ConnectionState::Connecting;
        }

        while self.state == ConnectionState::Connecting {
            debug!(address = %self.address, attempt = self.failed_attempts + 1, "connecting");
            let attempt = tokio::select! {
                attempt = transport.connect(&self.address) => Some(attempt),
                _ = stop.stopped() => None,
            };
            let Some(attempt) = attempt else {
                self.stop();
                break;
            };

            let delay = match attempt {
                Ok(client) => {
                    self.connected();
                    if self.serve(client, &events, &mut stop).await {
                        let _ = events.send(DeviceEvent::ConnectionLost {
                            address: self.address.clone(),
                        });
                        self.peer_disconnected()
                    } else {
                        self.stop();
                        None
                    }
                }
                Err(err) => match self.connect_failed(&err) {
                    Ok(delay) => Some(delay),
                    Err(err) => {
                        error!("{err}");
                        None
                    }
                },
            };

            if let Some(delay) = delay {
                if !stop.sleep(delay).await {
                    self.stop();
                }
            }
        }

        let reason = match self.state {
            ConnectionState::GivingUp => DisconnectReason::GaveUp,
            _ => DisconnectReason::Stopped,
        };
        info!(address = %self.address, ?reason, "session ended");
        let _ = events.send(DeviceEvent::Disconnected {
            address: self.address.clone(),
            reason,
        });
        self.state
    }

    /// Run readers on a fresh connection until the link drops or stop is requested.
    /// Returns `true` if the device dropped the link.
    async fn serve<C: Client>(
        &mut self,
        client: C,
        events: &EventSender,
        stop: &mut StopSignal,
    ) -> bool {
        let client = Arc::new(client);
        let available = client.endpoints();
        let cursor = CursorEpoch::default();

        if self.config.sync_time_of_day {
            self.sync_time_of_day(client.as_ref(), &available, &cursor).await;
        }

        info!(address = %self.address, family = self.family.name, "device ready");
        let _ = events.send(DeviceEvent::Ready {
            address: self.address.clone(),
        });

        let (readers_stop, readers_signal) = stop_channel();
        let mut readers = Vec::new();
        let mut subscribed = Vec::new();
        let endpoints: &'static [_] = self.family.endpoints;
        for endpoint in endpoints.iter().filter(|e| available.contains(&e.uuid)) {
            if ReadMode::for_endpoint(endpoint, &self.config.reader) == ReadMode::Notify {
                subscribed.push(endpoint.uuid);
            }
            let reader = CharacteristicReader::new(
                self.address.clone(),
                endpoint,
                client.clone(),
                events.clone(),
                cursor.clone(),
            );
            readers.push(tokio::spawn(
                reader.run(self.config.reader.clone(), readers_signal.clone()),
            ));
        }
        debug!(address = %self.address, readers = readers.len(), "readers started");

        let lost = tokio::select! {
            _ = client.disconnected() => true,
            _ = stop.stopped() => false,
        };
        if lost {
            warn!(address = %self.address, "connection lost");
        } else {
            info!(address = %self.address, "disconnecting");
        }

        for uuid in subscribed {
            if let Err(err) = client.unsubscribe(uuid).await {
                debug!(address = %self.address, %uuid, "unsubscribe failed: {err:#}");
            }
        }
        readers_stop.stop();
        for reader in readers {
            if let Err(err) = reader.await {
                error!(address = %self.address, "reader task failed: {err}");
            }
        }
        if let Err(err) = client.disconnect().await {
            debug!(address = %self.address, "disconnect failed: {err:#}");
        }
        lost
    }

    async fn sync_time_of_day<C: Client>(
        &self,
        client: &C,
        available: &[bluest::Uuid],
        cursor: &CursorEpoch,
    ) {
        let Some(clock) = self
            .family
            .endpoint(EndpointRole::Clock)
            .filter(|clock| available.contains(&clock.uuid))
        else {
            return;
        };
        let seconds = seconds_of_day_utc();
        match client.write(clock.uuid, &encode_time_of_day(seconds)).await {
            Ok(()) => {
                cursor.advance();
                info!(address = %self.address, seconds, "device clock set");
            }
            Err(err) => warn!(address = %self.address, "setting device clock failed: {err:#}"),
        }
    }
}

fn seconds_of_day_utc() -> i32 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    // always below 86400
    (now.as_secs() % 86_400) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{BLUEBATTERY, LIVE_UUID, LOG_UUID, SEC_UUID};
    use crate::event::{event_channel, EventReceiver};
    use crate::mock::{MockCall, MockDevice, MockTransport};
    use crate::shutdown::StopHandle;

    const ADDRESS: &str = "C4:7A:00:00:00:01";

    fn advertisement(address: &str, name: &str) -> Advertisement {
        Advertisement {
            address: address.to_string(),
            name: Some(name.to_string()),
            rssi: Some(-70),
        }
    }

    fn session() -> ConnectionSession {
        ConnectionSession::new(ADDRESS.to_string(), &BLUEBATTERY, SessionConfig::default())
    }

    fn events(rx: &mut EventReceiver) -> Vec<DeviceEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn lifecycle(events: &[DeviceEvent]) -> Vec<DeviceEvent> {
        events
            .iter()
            .filter(|event| !matches!(event, DeviceEvent::Frame { .. }))
            .cloned()
            .collect()
    }

    fn mock_device() -> (Arc<MockTransport>, Arc<MockDevice>) {
        let transport = Arc::new(MockTransport::new());
        let device = transport.add_device(advertisement(ADDRESS, "BlueBattery_1"));
        device.set_records(SEC_UUID, vec![vec![0, 0, 0x0e, 0x10]]);
        device.set_records(LIVE_UUID, vec![hex::decode("0007326403e8fffc18").unwrap()]);
        (transport, device)
    }

    fn start(
        transport: &Arc<MockTransport>,
        config: SessionConfig,
    ) -> (StopHandle, EventReceiver, tokio::task::JoinHandle<ConnectionState>) {
        let (events, rx) = event_channel();
        let (stop, signal) = stop_channel();
        let session = ConnectionSession::new(ADDRESS.to_string(), &BLUEBATTERY, config);
        let task = tokio::spawn(session.run(transport.clone(), events, signal));
        (stop, rx, task)
    }

    #[test]
    fn test_advertisement_must_match_address_and_family() {
        let mut session = session();
        assert!(!session.advertised(&advertisement("C4:7A:00:00:00:02", "BlueBattery_2")));
        assert!(!session.advertised(&advertisement(ADDRESS, "SomethingElse")));
        assert_eq!(session.state(), ConnectionState::Discovering);

        assert!(session.advertised(&advertisement(ADDRESS, "BlueBattery_1")));
        assert_eq!(session.state(), ConnectionState::Connecting);
        assert!(!session.advertised(&advertisement(ADDRESS, "BlueBattery_1")));
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let mut session = session();
        let err = anyhow::anyhow!("refused");
        for attempt in 1..5 {
            assert_eq!(session.connect_failed(&err), Ok(Duration::from_secs(10)));
            assert_eq!(session.failed_attempts(), attempt);
        }
        assert_eq!(
            session.connect_failed(&err),
            Err(SessionError::ExhaustedRetries {
                address: ADDRESS.to_string(),
                attempts: 5
            })
        );
        assert_eq!(session.state(), ConnectionState::GivingUp);
    }

    #[test]
    fn test_connect_resets_failures() {
        let mut session = session();
        let err = anyhow::anyhow!("refused");
        session.connect_failed(&err).unwrap();
        session.connect_failed(&err).unwrap();
        session.connected();
        assert_eq!(session.failed_attempts(), 0);
        assert_eq!(session.state(), ConnectionState::Ready);
    }

    #[test]
    fn test_peer_disconnect_reconnects_unless_stopped() {
        let mut session = session();
        session.connected();
        assert_eq!(session.peer_disconnected(), Some(Duration::from_secs(10)));
        assert_eq!(session.state(), ConnectionState::Connecting);

        session.connected();
        session.stop();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(session.peer_disconnected(), None);
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_stop_keeps_giving_up() {
        let mut session = ConnectionSession::new(
            ADDRESS.to_string(),
            &BLUEBATTERY,
            SessionConfig {
                max_attempts: 1,
                ..SessionConfig::default()
            },
        );
        assert!(session.connect_failed(&anyhow::anyhow!("refused")).is_err());
        session.stop();
        assert_eq!(session.state(), ConnectionState::GivingUp);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_gives_up() {
        let (transport, device) = mock_device();
        device.fail_next_connects(u32::MAX);
        let (_stop, mut rx, task) = start(&transport, SessionConfig::default());

        assert_eq!(task.await.unwrap(), ConnectionState::GivingUp);
        assert_eq!(device.connect_attempts(), 5);
        assert_eq!(
            events(&mut rx),
            vec![DeviceEvent::Disconnected {
                address: ADDRESS.to_string(),
                reason: DisconnectReason::GaveUp
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_recovers_after_failures() {
        let (transport, device) = mock_device();
        device.fail_next_connects(2);
        let (stop, mut rx, task) = start(&transport, SessionConfig::default());

        // attempts at 0s, 10s, 20s
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(device.connect_attempts(), 3);
        assert!(device.is_connected());

        stop.stop();
        assert_eq!(task.await.unwrap(), ConnectionState::Disconnected);
        let events = events(&mut rx);
        assert_eq!(
            lifecycle(&events),
            vec![
                DeviceEvent::Ready {
                    address: ADDRESS.to_string()
                },
                DeviceEvent::Disconnected {
                    address: ADDRESS.to_string(),
                    reason: DisconnectReason::Stopped
                },
            ]
        );
        assert!(events.iter().any(|event| matches!(event, DeviceEvent::Frame { .. })));
        assert_eq!(device.journal().last(), Some(&MockCall::Disconnect));
        assert!(!device.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reconnects_after_link_loss() {
        let (transport, device) = mock_device();
        let (stop, mut rx, task) = start(&transport, SessionConfig::default());

        tokio::time::sleep(Duration::from_secs(5)).await;
        device.drop_link();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!device.is_connected());

        // reconnect after the retry delay
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(device.is_connected());
        assert_eq!(device.connect_attempts(), 2);

        stop.stop();
        assert_eq!(task.await.unwrap(), ConnectionState::Disconnected);
        let address = ADDRESS.to_string();
        assert_eq!(
            lifecycle(&events(&mut rx)),
            vec![
                DeviceEvent::Ready {
                    address: address.clone()
                },
                DeviceEvent::ConnectionLost {
                    address: address.clone()
                },
                DeviceEvent::Ready {
                    address: address.clone()
                },
                DeviceEvent::Disconnected {
                    address,
                    reason: DisconnectReason::Stopped
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_retry_delay() {
        let (transport, device) = mock_device();
        device.fail_next_connects(1);
        let (stop, mut rx, task) = start(&transport, SessionConfig::default());

        tokio::time::sleep(Duration::from_secs(1)).await;
        stop.stop();
        assert_eq!(task.await.unwrap(), ConnectionState::Disconnected);
        assert_eq!(device.connect_attempts(), 1);
        assert_eq!(
            events(&mut rx),
            vec![DeviceEvent::Disconnected {
                address: ADDRESS.to_string(),
                reason: DisconnectReason::Stopped
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_unsubscribes_before_disconnect() {
        let (transport, device) = mock_device();
        let config = SessionConfig {
            reader: crate::config::ReaderConfig {
                live_notify: true,
                ..Default::default()
            },
            ..SessionConfig::default()
        };
        let (stop, _rx, task) = start(&transport, config);

        tokio::time::sleep(Duration::from_secs(1)).await;
        stop.stop();
        task.await.unwrap();

        let journal = device.journal();
        let unsubscribe = journal
            .iter()
            .position(|call| *call == MockCall::Unsubscribe(LIVE_UUID))
            .unwrap();
        let disconnect = journal
            .iter()
            .position(|call| *call == MockCall::Disconnect)
            .unwrap();
        assert!(journal.contains(&MockCall::Subscribe(LIVE_UUID)));
        assert!(unsubscribe < disconnect);
        assert!(!journal.contains(&MockCall::Read(LOG_UUID)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_of_day_sync_rewinds_log() {
        let (transport, device) = mock_device();
        let config = SessionConfig {
            sync_time_of_day: true,
            ..SessionConfig::default()
        };
        let (stop, _rx, task) = start(&transport, config);

        tokio::time::sleep(Duration::from_secs(1)).await;
        stop.stop();
        task.await.unwrap();

        let journal = device.journal();
        assert!(matches!(&journal[1], MockCall::Write(uuid, data) if *uuid == SEC_UUID && data.len() == 4));
    }
}
