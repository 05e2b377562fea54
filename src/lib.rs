//! Read live values and the day log from BlueBattery battery computers over Bluetooth Low Energy
//!
//! A BlueBattery device exposes three GATT characteristics:
//!
//! - a live register carrying current measurements, prefixed by a (type, length) pair that
//!   selects one of many fixed record layouts
//! - a log register that returns one stored day record per read and silently wraps around
//!   after the newest one
//! - a seconds-of-day register, which also rewinds the log cursor when it is read or written
//!
//! Payloads are decoded into [`DecodedFrame`]s by declarative [`FrameSchema`]s. A
//! [`DeviceScanner`] finds devices, runs one [`ConnectionSession`] per device and reports
//! everything it reads as [`DeviceEvent`]s.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use bluebattery::{BluestTransport, DeviceScanner, ScannerConfig, event_channel, stop_channel};
//! #
//! # #[tokio::main]
//! # pub async fn main() -> anyhow::Result<()> {
//!     let transport = Arc::new(BluestTransport::new().await?);
//!     let (events, mut received) = event_channel();
//!     let (_stop, signal) = stop_channel();
//!     tokio::spawn(DeviceScanner::new(transport, ScannerConfig::default(), events).run(signal));
//!     while let Some(event) = received.recv().await {
//!         println!("{event:?}");
//!     }
//! #   Ok(())
//! # }
//! ```

mod ble;
mod characteristic;
mod config;
mod device;
mod error;
mod event;
pub mod frame;
mod log_readout;
pub mod mock;
mod router;
mod scanner;
mod session;
mod shutdown;
mod transport;

pub use ble::{BluestClient, BluestTransport};
pub use characteristic::{CharacteristicReader, ReadMode};
pub use config::{LogConfig, ReaderConfig, ScannerConfig, SessionConfig};
pub use device::{
    AdvertisementFilter, DeviceFamily, Endpoint, EndpointRole, BLUEBATTERY, KNOWN_FAMILIES,
    LIVE_UUID, LOG_UUID, SEC_UUID,
};
pub use error::{FrameError, SessionError};
pub use event::{event_channel, DeviceEvent, DisconnectReason, EventReceiver, EventSender};
pub use frame::{DecodeContext, DecodedFrame, FrameKind, FrameSchema, Value};
pub use log_readout::{CursorEpoch, LogReadoutSession, LogSweepState, SweepStep};
pub use router::{FrameTypeRouter, Routing};
pub use scanner::DeviceScanner;
pub use session::{ConnectionSession, ConnectionState};
pub use shutdown::{stop_channel, StopHandle, StopSignal};
pub use transport::{Advertisement, Client, Transport};
