use std::time::Duration;

/// Timing of the log sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Pause between two reads of the log endpoint during a sweep.
    pub read_period: Duration,
    /// Wait after connecting before the first sweep, so the clock has been read.
    pub initial_delay: Duration,
    /// Wait after a completed sweep before starting the next one.
    pub idle_interval: Duration,
    /// Upper bound on frames per sweep.
    pub max_frames: u32,
}

impl LogConfig {
    const READ_PERIOD_S: u64 = 1;
    const INITIAL_DELAY_S: u64 = 30;
    const IDLE_INTERVAL_S: u64 = 60 * 60;
    // 60 days, three log frame types
    const MAX_FRAMES: u32 = 60 * 3;
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            read_period: Duration::from_secs(Self::READ_PERIOD_S),
            initial_delay: Duration::from_secs(Self::INITIAL_DELAY_S),
            idle_interval: Duration::from_secs(Self::IDLE_INTERVAL_S),
            max_frames: Self::MAX_FRAMES,
        }
    }
}

/// How each endpoint of a connected device is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    pub live_period: Duration,
    /// Subscribe to live notifications instead of polling.
    pub live_notify: bool,
    pub clock_period: Duration,
    pub log: LogConfig,
}

impl ReaderConfig {
    const LIVE_PERIOD_S: u64 = 1;
    const CLOCK_PERIOD_S: u64 = 10 * 60;
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            live_period: Duration::from_secs(Self::LIVE_PERIOD_S),
            live_notify: false,
            clock_period: Duration::from_secs(Self::CLOCK_PERIOD_S),
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Consecutive failed connection attempts before the device is abandoned.
    pub max_attempts: u32,
    /// Fixed pause before every reconnection attempt.
    pub retry_delay: Duration,
    /// Write the host's time of day (UTC) to the device clock once connected.
    pub sync_time_of_day: bool,
    pub reader: ReaderConfig,
}

impl SessionConfig {
    const MAX_ATTEMPTS: u32 = 5;
    const RETRY_DELAY_S: u64 = 10;
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::MAX_ATTEMPTS,
            retry_delay: Duration::from_secs(Self::RETRY_DELAY_S),
            sync_time_of_day: false,
            reader: ReaderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerConfig {
    /// How long one scan listens for advertisements.
    pub scan_window: Duration,
    /// Pause after a scan so discovery has settled before connecting.
    pub settle_delay: Duration,
    /// Pause between two scans.
    pub scan_interval: Duration,
    /// How long each session may take to acknowledge shutdown before it is aborted.
    pub shutdown_grace: Duration,
    pub session: SessionConfig,
}

impl ScannerConfig {
    const SCAN_WINDOW_S: u64 = 5;
    const SETTLE_DELAY_S: u64 = 2;
    const SCAN_INTERVAL_S: u64 = 20;
    const SHUTDOWN_GRACE_S: u64 = 10;
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scan_window: Duration::from_secs(Self::SCAN_WINDOW_S),
            settle_delay: Duration::from_secs(Self::SETTLE_DELAY_S),
            scan_interval: Duration::from_secs(Self::SCAN_INTERVAL_S),
            shutdown_grace: Duration::from_secs(Self::SHUTDOWN_GRACE_S),
            session: SessionConfig::default(),
        }
    }
}
