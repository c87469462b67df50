use std::time::Duration;

use tokio::sync::watch;

/// Connectivity flag doubling as the startup gate
///
/// Callers waiting in [`ConnectionStatus::wait_connected`] are released by
/// the first `Connected` (or read-only connected) state and blocked again
/// while the session is disconnected or expired.
#[derive(Debug)]
pub struct ConnectionStatus {
    connected: watch::Sender<bool>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStatus {
    pub fn new() -> Self {
        let (connected, _) = watch::channel(false);
        Self { connected }
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Returns `true` if the status changed.
    pub fn mark_connected(&self) -> bool {
        self.connected.send_if_modified(|connected| !std::mem::replace(connected, true))
    }

    /// Returns `true` if the status changed.
    pub fn mark_disconnected(&self) -> bool {
        self.connected.send_if_modified(|connected| std::mem::replace(connected, false))
    }

    /// Wait until connected. `false` if `timeout` elapsed first.
    pub async fn wait_connected(
        &self,
        timeout: Duration,
    ) -> bool {
        let mut rx = self.connected.subscribe();
        let connected = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|connected| *connected)).await,
            Ok(Ok(_))
        );
        connected
    }
}
