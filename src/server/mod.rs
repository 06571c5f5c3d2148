//! Listener lifecycle and connection dispatch
//!
//! [`Server`] owns the listening socket. [`listener`] holds the accept loop
//! that gates every connection through the admission semaphore before
//! handing it to its own task.

pub mod listener;

use crate::config::Config;
use crate::handler::ImageHandler;
use anyhow::Context;
use listener::{AcceptContext, run_accept_loop};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Semaphore, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

/// HTTP server with an explicit start/stop lifecycle.
///
/// All lifecycle operations take the same lock, so a `start` can never run
/// while a `stop` is still waiting for the accept loop to finish.
pub struct Server {
    context: AcceptContext,
    state: Mutex<Lifecycle>,
}

#[derive(Default)]
struct Lifecycle {
    running: Option<Running>,
    disposed: bool,
}

struct Running {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    accept_loop: JoinHandle<()>,
}

impl Server {
    pub fn new(cfg: &Config) -> Self {
        let context = AcceptContext {
            handler: Arc::new(ImageHandler::from_config(cfg)),
            admission: Arc::new(Semaphore::new(cfg.server.max_in_flight)),
            max_in_flight: cfg.server.max_in_flight,
            max_body: cfg.limits.max_body_bytes,
            read_timeout: cfg.server.read_timeout(),
        };

        Self {
            context,
            state: Mutex::new(Lifecycle::default()),
        }
    }

    /// Bind `addr` and start accepting connections.
    ///
    /// Returns the bound address. When the server is already running this
    /// does nothing and returns the address it is bound to.
    pub async fn start(&self, addr: &str) -> anyhow::Result<SocketAddr> {
        let mut state = self.state.lock().await;

        if state.disposed {
            anyhow::bail!("server has been disposed");
        }
        if let Some(running) = &state.running {
            return Ok(running.addr);
        }

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        let bound = listener.local_addr()?;
        info!("Listening on {}", bound);

        let (shutdown, shutdown_rx) = oneshot::channel();
        let accept_loop = tokio::spawn(run_accept_loop(listener, shutdown_rx, self.context.clone()));

        state.running = Some(Running {
            addr: bound,
            shutdown,
            accept_loop,
        });

        Ok(bound)
    }

    /// Stop accepting connections.
    ///
    /// Closes the listening socket and waits for the accept loop to exit.
    /// Connections already dispatched run to completion. Does nothing when
    /// the server is not running.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        Self::stop_locked(&mut state).await;
    }

    /// Stop the server for good. Safe to call more than once.
    pub async fn dispose(&self) {
        let mut state = self.state.lock().await;
        if state.disposed {
            return;
        }
        state.disposed = true;
        Self::stop_locked(&mut state).await;
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running.is_some()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.state.lock().await.running.as_ref().map(|r| r.addr)
    }

    /// Connections currently being served.
    pub fn in_flight(&self) -> usize {
        self.context.max_in_flight - self.context.admission.available_permits()
    }

    async fn stop_locked(state: &mut Lifecycle) {
        let Some(running) = state.running.take() else {
            return;
        };

        // The loop may already have exited if its task panicked.
        let _ = running.shutdown.send(());
        if let Err(e) = running.accept_loop.await {
            tracing::error!(error = %e, "Accept loop ended abnormally");
        }

        info!("Stopped listening on {}", running.addr);
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(running) = self.state.get_mut().running.take() {
            running.accept_loop.abort();
        }
    }
}
