//! Port-forward tunnels as owned resources.
//!
//! A [`Tunnel`] is the local end of a port-forward: an OS-assigned port on
//! the loopback interface plus the background task that bridges accepted
//! connections to the pod. Dropping a tunnel stops forwarding; [`Tunnels`]
//! keeps every tunnel opened during a run alive until [`Tunnels::shutdown`].

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// An open port-forward
pub struct Tunnel {
    local_port: u16,
    target: String,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Tunnel {
    /// Wrap a forwarding task listening on `local_port`.
    ///
    /// `cancel` must stop `task`; `task` may be `None` when nothing runs
    /// locally (e.g. a tunnel managed elsewhere).
    pub fn new(
        local_port: u16,
        target: impl Into<String>,
        cancel: CancellationToken,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            local_port,
            target: target.into(),
            cancel,
            task,
        }
    }

    /// Local port accepting connections
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// `namespace/pod:port` this tunnel reaches
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Base URL of the tunnel's local end
    pub fn url(&self) -> String {
        format!("http://localhost:{}/", self.local_port)
    }

    /// Stop forwarding and wait for the forwarding task to finish
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        debug!(port = self.local_port, target = %self.target, "Tunnel closed");
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tunnel")
            .field("local_port", &self.local_port)
            .field("target", &self.target)
            .finish()
    }
}

/// Every tunnel opened on behalf of one environment
#[derive(Debug, Default)]
pub struct Tunnels {
    open: Mutex<Vec<Tunnel>>,
}

impl Tunnels {
    /// Keep `tunnel` open until shutdown; returns its base URL
    pub fn register(&self, tunnel: Tunnel) -> String {
        let url = tunnel.url();
        info!(port = tunnel.local_port(), target = %tunnel.target(), "Tunnel opened");
        self.open.lock().push(tunnel);
        url
    }

    /// Number of open tunnels
    pub fn len(&self) -> usize {
        self.open.lock().len()
    }

    /// Whether no tunnel is open
    pub fn is_empty(&self) -> bool {
        self.open.lock().is_empty()
    }

    /// Close every registered tunnel
    pub async fn shutdown(&self) {
        let tunnels = std::mem::take(&mut *self.open.lock());
        if tunnels.is_empty() {
            return;
        }
        info!(count = tunnels.len(), "Closing tunnels");
        for tunnel in tunnels {
            tunnel.shutdown().await;
        }
    }
}
