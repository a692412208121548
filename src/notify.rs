//! Outbound delivery of change notices.
//!
//! Delivery is best-effort: one attempt per destination, failures are logged
//! and never reach the poll loop.

use crate::error::Result;

pub trait NotificationSink: Send + Sync {
    fn deliver(&self, destination: &str, text: &str) -> Result<()>;
}

/// Prints notices on stdout, prefixed with their destination.
pub struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn deliver(&self, destination: &str, text: &str) -> Result<()> {
        println!("[{}]\n{}", destination, text);
        Ok(())
    }
}

/// Send `text` to every destination, returning how many deliveries succeeded.
pub fn broadcast(sink: &dyn NotificationSink, destinations: &[String], text: &str) -> usize {
    if destinations.is_empty() {
        tracing::info!("No destinations configured, notice not delivered:\n{}", text);
        return 0;
    }

    let mut delivered = 0;
    for destination in destinations {
        match sink.deliver(destination, text) {
            Ok(()) => delivered += 1,
            Err(e) => tracing::warn!("Could not deliver notice to {}: {}", destination, e),
        }
    }
    delivered
}
