use std::time::Duration;

use tokio::sync::watch;

/// Owner side of a stop signal.
#[derive(Debug)]
pub struct StopHandle(watch::Sender<bool>);

/// Cloneable receiver side of a stop signal.
#[derive(Debug, Clone)]
pub struct StopSignal(watch::Receiver<bool>);

pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle(tx), StopSignal(rx))
}

impl StopHandle {
    pub fn stop(&self) {
        self.0.send_replace(true);
    }

    /// A new receiver for this handle.
    pub fn signal(&self) -> StopSignal {
        StopSignal(self.0.subscribe())
    }
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once stop is requested or the handle is dropped.
    pub async fn stopped(&mut self) {
        // Err means the handle is gone, which counts as stop.
        let _ = self.0.wait_for(|stopped| *stopped).await;
    }

    /// Sleep for `duration` unless stopped first. Returns `true` if the full duration elapsed.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.stopped() => false,
        }
    }
}
