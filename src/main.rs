use std::sync::Arc;

use bluebattery::{
    event_channel, stop_channel, BluestTransport, DeviceEvent, DeviceScanner, ScannerConfig,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let transport = Arc::new(BluestTransport::new().await?);
    let (events, mut received) = event_channel();
    let (stop, signal) = stop_channel();

    let scanner = tokio::spawn(DeviceScanner::new(transport, ScannerConfig::default(), events).run(signal));
    let printer = tokio::spawn(async move {
        while let Some(event) = received.recv().await {
            log_event(&event);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Stopping");
    stop.stop();
    scanner.await?;
    printer.await?;

    Ok(())
}

fn log_event(event: &DeviceEvent) {
    match event {
        DeviceEvent::Frame { address, frame } => {
            let fields = frame
                .fields
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join(" ");
            info!(%address, output = %frame.output_id, "{fields}");
        }
        DeviceEvent::Ready { address } => info!(%address, "Ready"),
        DeviceEvent::ConnectionLost { address } => warn!(%address, "Connection lost"),
        DeviceEvent::Disconnected { address, reason } => info!(%address, ?reason, "Disconnected"),
    }
}
