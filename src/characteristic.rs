use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{LogConfig, ReaderConfig};
use crate::device::{Endpoint, EndpointRole};
use crate::event::{DeviceEvent, EventSender};
use crate::frame::{DecodeContext, DecodedFrame};
use crate::log_readout::{CursorEpoch, LogReadoutSession, SweepStep};
use crate::router::FrameTypeRouter;
use crate::shutdown::StopSignal;
use crate::transport::Client;

/// How a reader drives its endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Read every period.
    Poll(Duration),
    /// Subscribe and decode each notification.
    Notify,
    /// Drain the circular log, then idle.
    Sweep,
}

impl ReadMode {
    pub fn for_endpoint(endpoint: &Endpoint, config: &ReaderConfig) -> Self {
        match endpoint.role {
            EndpointRole::Live if config.live_notify => ReadMode::Notify,
            EndpointRole::Live => ReadMode::Poll(config.live_period),
            EndpointRole::Clock => ReadMode::Poll(config.clock_period),
            EndpointRole::Log => ReadMode::Sweep,
        }
    }
}

/// Reads one endpoint of a connected device and publishes the decoded frames.
///
/// Decode and read failures are logged and skipped, they never end the reader. The reader
/// ends when its stop signal fires.
pub struct CharacteristicReader<C: Client> {
    address: String,
    endpoint: &'static Endpoint,
    router: FrameTypeRouter,
    context: DecodeContext,
    client: Arc<C>,
    events: EventSender,
    cursor: CursorEpoch,
}

impl<C: Client> CharacteristicReader<C> {
    pub fn new(
        address: String,
        endpoint: &'static Endpoint,
        client: Arc<C>,
        events: EventSender,
        cursor: CursorEpoch,
    ) -> Self {
        Self {
            address,
            endpoint,
            router: FrameTypeRouter::new(endpoint),
            context: DecodeContext::default(),
            client,
            events,
            cursor,
        }
    }

    pub fn mode(&self, config: &ReaderConfig) -> ReadMode {
        ReadMode::for_endpoint(self.endpoint, config)
    }

    pub async fn run(mut self, config: ReaderConfig, mut stop: StopSignal) {
        let mode = self.mode(&config);
        debug!(address = %self.address, endpoint = self.endpoint.name, ?mode, "reader started");
        match mode {
            ReadMode::Poll(period) => self.poll(period, &mut stop).await,
            ReadMode::Notify => self.listen(config.live_period, &mut stop).await,
            ReadMode::Sweep => self.sweep(&config.log, &mut stop).await,
        }
        debug!(address = %self.address, endpoint = self.endpoint.name, "reader stopped");
    }

    async fn poll(&mut self, period: Duration, stop: &mut StopSignal) {
        loop {
            if let Some(frames) = self.read_frames(stop).await {
                self.publish(frames);
            }
            if !stop.sleep(period).await {
                return;
            }
        }
    }

    /// Decode notifications until stopped. A closed stream or a failed subscribe is retried
    /// after `retry`, the link itself is watched by the session.
    async fn listen(&mut self, retry: Duration, stop: &mut StopSignal) {
        loop {
            let mut notifications = match self.client.subscribe(self.endpoint.uuid).await {
                Ok(notifications) => notifications,
                Err(err) => {
                    warn!(address = %self.address, endpoint = self.endpoint.name, "subscribe failed: {err:#}");
                    if !stop.sleep(retry).await {
                        return;
                    }
                    continue;
                }
            };

            loop {
                let payload = tokio::select! {
                    payload = notifications.recv() => payload,
                    _ = stop.stopped() => return,
                };
                match payload {
                    Some(bytes) => {
                        if let Some(frames) = self.decode(&bytes) {
                            self.publish(frames);
                        }
                    }
                    None => break,
                }
            }

            debug!(address = %self.address, endpoint = self.endpoint.name, "notifications ended, resubscribing");
            if !stop.sleep(retry).await {
                return;
            }
        }
    }

    async fn sweep(&mut self, config: &LogConfig, stop: &mut StopSignal) {
        if !stop.sleep(config.initial_delay).await {
            return;
        }

        let mut session = LogReadoutSession::new(config.max_frames);
        loop {
            session.restart();
            session.sync_cursor(self.cursor.current());
            info!(address = %self.address, "log sweep started");

            loop {
                if session.sync_cursor(self.cursor.current()) {
                    info!(address = %self.address, "log cursor rewound, sweep restarted");
                }
                let frames = self.read_frames(stop).await;
                if stop.is_stopped() {
                    return;
                }

                let mut step = SweepStep::Continue;
                for frame in frames.unwrap_or_default() {
                    step = session.observe(&frame);
                    self.publish_one(frame);
                    if step == SweepStep::Complete {
                        break;
                    }
                }
                if step == SweepStep::Complete {
                    break;
                }

                if !stop.sleep(config.read_period).await {
                    return;
                }
            }

            info!(
                address = %self.address,
                frames = session.state().frames_seen,
                "log sweep complete"
            );
            if !stop.sleep(config.idle_interval).await {
                return;
            }
        }
    }

    /// One read of the endpoint. `None` if stopped, or if the read or the decode failed.
    async fn read_frames(&mut self, stop: &mut StopSignal) -> Option<Vec<DecodedFrame>> {
        let read = tokio::select! {
            read = self.client.read(self.endpoint.uuid) => read,
            _ = stop.stopped() => return None,
        };
        match read {
            Ok(bytes) => {
                if self.endpoint.role == EndpointRole::Clock {
                    self.cursor.advance();
                }
                self.decode(&bytes)
            }
            Err(err) => {
                warn!(address = %self.address, endpoint = self.endpoint.name, "read failed: {err:#}");
                None
            }
        }
    }

    fn decode(&mut self, bytes: &[u8]) -> Option<Vec<DecodedFrame>> {
        let payload = hex::encode(bytes);
        debug!(address = %self.address, endpoint = self.endpoint.name, %payload, "received");
        match self.router.dispatch(bytes, &mut self.context) {
            Ok(frames) => Some(frames),
            Err(err) => {
                warn!(address = %self.address, endpoint = self.endpoint.name, %payload, "dropping payload: {err}");
                None
            }
        }
    }

    fn publish(&self, frames: Vec<DecodedFrame>) {
        for frame in frames {
            self.publish_one(frame);
        }
    }

    fn publish_one(&self, frame: DecodedFrame) {
        // The receiver only goes away on shutdown.
        let _ = self.events.send(DeviceEvent::Frame {
            address: self.address.clone(),
            frame,
        });
    }
}
