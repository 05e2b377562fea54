use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ScannerConfig;
use crate::device::{DeviceFamily, KNOWN_FAMILIES};
use crate::event::{DeviceEvent, DisconnectReason, EventSender};
use crate::session::{ConnectionSession, ConnectionState};
use crate::shutdown::{stop_channel, StopHandle, StopSignal};
use crate::transport::Transport;

struct TrackedSession {
    stop: StopHandle,
    task: JoinHandle<ConnectionState>,
}

/// Finds devices of the known families and keeps one session running per address.
pub struct DeviceScanner<T: Transport> {
    transport: Arc<T>,
    families: Vec<&'static DeviceFamily>,
    config: ScannerConfig,
    events: EventSender,
    sessions: HashMap<String, TrackedSession>,
}

impl<T: Transport> DeviceScanner<T> {
    pub fn new(transport: Arc<T>, config: ScannerConfig, events: EventSender) -> Self {
        Self {
            transport,
            families: KNOWN_FAMILIES.to_vec(),
            config,
            events,
            sessions: HashMap::new(),
        }
    }

    pub fn with_families(mut self, families: Vec<&'static DeviceFamily>) -> Self {
        self.families = families;
        self
    }

    /// Whether a session for `address` is tracked. Finished sessions stay tracked until
    /// the next scan evicts them.
    pub fn is_tracking(&self, address: &str) -> bool {
        self.sessions.contains_key(address)
    }

    /// Scan once and start a session for every new matching device. Returns the number of
    /// sessions started.
    pub async fn scan_once(&mut self) -> anyhow::Result<usize> {
        let advertisements = self.transport.scan(self.config.scan_window).await?;
        debug!(seen = advertisements.len(), "scan finished");
        tokio::time::sleep(self.config.settle_delay).await;

        self.evict_finished();

        let mut started = 0;
        for advertisement in advertisements {
            if self.sessions.contains_key(&advertisement.address) {
                continue;
            }
            let Some(family) = self
                .families
                .iter()
                .copied()
                .find(|family| family.matches(&advertisement))
            else {
                continue;
            };

            let mut session = ConnectionSession::new(
                advertisement.address.clone(),
                family,
                self.config.session.clone(),
            );
            if !session.advertised(&advertisement) {
                continue;
            }

            info!(
                address = %advertisement.address,
                name = ?advertisement.name,
                rssi = ?advertisement.rssi,
                family = family.name,
                "starting session"
            );
            let (stop, signal) = stop_channel();
            let task = tokio::spawn(session.run(
                self.transport.clone(),
                self.events.clone(),
                signal,
            ));
            self.sessions
                .insert(advertisement.address, TrackedSession { stop, task });
            started += 1;
        }
        Ok(started)
    }

    fn evict_finished(&mut self) {
        self.sessions.retain(|address, tracked| {
            let finished = tracked.task.is_finished();
            if finished {
                debug!(%address, "session finished, forgetting device");
            }
            !finished
        });
    }

    /// Scan until stopped, then shut every session down.
    pub async fn run(mut self, mut stop: StopSignal) {
        let families: Vec<&str> = self.families.iter().map(|family| family.name).collect();
        info!(?families, "scanner started");

        loop {
            let scanned = tokio::select! {
                scanned = self.scan_once() => scanned,
                _ = stop.stopped() => break,
            };
            match scanned {
                Ok(started) => debug!(started, tracked = self.sessions.len(), "scan pass done"),
                Err(err) => warn!("scan failed: {err:#}"),
            }
            if !stop.sleep(self.config.scan_interval).await {
                break;
            }
        }

        self.shutdown().await;
        info!("scanner stopped");
    }

    /// Stop every session and wait for each, up to the shutdown grace. Sessions that miss it
    /// are aborted and reported as [`DisconnectReason::Aborted`].
    pub async fn shutdown(&mut self) {
        for tracked in self.sessions.values() {
            tracked.stop.stop();
        }

        let grace = self.config.shutdown_grace;
        for (address, mut tracked) in self.sessions.drain() {
            match tokio::time::timeout(grace, &mut tracked.task).await {
                Ok(Ok(state)) => debug!(%address, ?state, "session stopped"),
                Ok(Err(err)) => {
                    error!(%address, "session task failed: {err}");
                    let _ = self.events.send(DeviceEvent::Disconnected {
                        address,
                        reason: DisconnectReason::Aborted,
                    });
                }
                Err(_) => {
                    warn!(%address, "session did not stop in time, aborting");
                    tracked.task.abort();
                    let _ = self.events.send(DeviceEvent::Disconnected {
                        address,
                        reason: DisconnectReason::Aborted,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::device::{AdvertisementFilter, BLUEBATTERY, SEC_UUID};
    use crate::event::{event_channel, EventReceiver};
    use crate::mock::MockTransport;
    use crate::transport::Advertisement;

    fn advertisement(address: &str, name: &str) -> Advertisement {
        Advertisement {
            address: address.to_string(),
            name: Some(name.to_string()),
            rssi: Some(-55),
        }
    }

    fn disconnects(rx: &mut EventReceiver) -> Vec<(String, DisconnectReason)> {
        let mut found = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let DeviceEvent::Disconnected { address, reason } = event {
                found.push((address, reason));
            }
        }
        found
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_one_session_per_matching_device() {
        let transport = Arc::new(MockTransport::new());
        transport
            .add_device(advertisement("C4:7A:00:00:00:01", "BlueBattery_1"))
            .set_records(SEC_UUID, vec![vec![0, 0, 0, 1]]);
        transport
            .add_device(advertisement("C4:7A:00:00:00:02", "BlueBattery_2"))
            .set_records(SEC_UUID, vec![vec![0, 0, 0, 2]]);
        transport.add_device(advertisement("00:11:22:33:44:55", "Headphones"));

        let (events, mut rx) = event_channel();
        let mut scanner = DeviceScanner::new(transport, ScannerConfig::default(), events);
        assert_eq!(scanner.scan_once().await.unwrap(), 2);
        assert!(scanner.is_tracking("C4:7A:00:00:00:01"));
        assert!(!scanner.is_tracking("00:11:22:33:44:55"));

        // running sessions are left alone
        assert_eq!(scanner.scan_once().await.unwrap(), 0);

        scanner.shutdown().await;
        let mut stopped = disconnects(&mut rx);
        stopped.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            stopped,
            vec![
                ("C4:7A:00:00:00:01".to_string(), DisconnectReason::Stopped),
                ("C4:7A:00:00:00:02".to_string(), DisconnectReason::Stopped),
            ]
        );
        assert!(!scanner.is_tracking("C4:7A:00:00:00:01"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_sessions_are_retried() {
        let transport = Arc::new(MockTransport::new());
        let device = transport.add_device(advertisement("C4:7A:00:00:00:01", "BlueBattery_1"));
        device.fail_next_connects(5);

        let (events, mut rx) = event_channel();
        let mut scanner = DeviceScanner::new(transport, ScannerConfig::default(), events);
        assert_eq!(scanner.scan_once().await.unwrap(), 1);

        // five attempts, 10s apart
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(
            disconnects(&mut rx),
            vec![("C4:7A:00:00:00:01".to_string(), DisconnectReason::GaveUp)]
        );
        assert!(scanner.is_tracking("C4:7A:00:00:00:01"));

        assert_eq!(scanner.scan_once().await.unwrap(), 1);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(device.is_connected());
        assert_eq!(device.connect_attempts(), 6);

        scanner.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_family_filters() {
        static BY_ADDRESS: DeviceFamily = DeviceFamily {
            name: "by-address",
            filters: &[AdvertisementFilter::AddressPrefix("c4:7a")],
            endpoints: &[],
        };
        let transport = Arc::new(MockTransport::new());
        transport.add_device(advertisement("C4:7A:00:00:00:09", "Unnamed"));
        let (events, _rx) = event_channel();
        let mut scanner = DeviceScanner::new(transport.clone(), ScannerConfig::default(), events)
            .with_families(vec![&BY_ADDRESS]);
        assert_eq!(scanner.scan_once().await.unwrap(), 1);
        scanner.shutdown().await;

        let (events, _rx) = event_channel();
        let mut scanner = DeviceScanner::new(transport, ScannerConfig::default(), events)
            .with_families(vec![&BLUEBATTERY]);
        assert_eq!(scanner.scan_once().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_all_sessions() {
        let transport = Arc::new(MockTransport::new());
        let device = transport.add_device(advertisement("C4:7A:00:00:00:01", "BlueBattery_1"));
        device.set_records(SEC_UUID, vec![vec![0, 0, 0, 1]]);

        let (events, mut rx) = event_channel();
        let (stop, signal) = stop_channel();
        let scanner = DeviceScanner::new(transport, ScannerConfig::default(), events);
        let task = tokio::spawn(scanner.run(signal));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(device.is_connected());
        stop.stop();
        task.await.unwrap();

        assert!(!device.is_connected());
        assert_eq!(
            disconnects(&mut rx),
            vec![("C4:7A:00:00:00:01".to_string(), DisconnectReason::Stopped)]
        );
    }
}
