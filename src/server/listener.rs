use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, oneshot};
use tracing::{debug, info, warn};

use crate::handler::ImageHandler;
use crate::http::connection::{Connection, reject_overloaded};

/// Pause after a failed accept so errors like EMFILE don't spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Everything a dispatched connection needs.
#[derive(Clone)]
pub struct AcceptContext {
    pub handler: Arc<ImageHandler>,
    pub admission: Arc<Semaphore>,
    pub max_in_flight: usize,
    pub max_body: usize,
    pub read_timeout: Duration,
}

/// Accept connections until `shutdown` fires.
///
/// Accept failures are logged and the loop keeps going. The listener is
/// dropped, closing the socket, when this returns.
pub async fn run_accept_loop(
    listener: TcpListener,
    mut shutdown: oneshot::Receiver<()>,
    ctx: AcceptContext,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received, accept loop exiting");
                break;
            }

            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => dispatch(socket, peer, &ctx),
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

/// Hand an accepted socket to its own task without waiting on it.
///
/// A connection that finds no free admission permit gets 503 instead.
fn dispatch(socket: TcpStream, peer: SocketAddr, ctx: &AcceptContext) {
    let permit = match ctx.admission.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            warn!(peer = %peer, limit = ctx.max_in_flight, "Server saturated, rejecting connection");
            tokio::spawn(async move {
                if let Err(e) = reject_overloaded(socket).await {
                    debug!(peer = %peer, error = %e, "Failed to send 503");
                }
            });
            return;
        }
    };

    debug!("Accepted connection from {}", peer);

    let handler = ctx.handler.clone();
    let max_body = ctx.max_body;
    let read_timeout = ctx.read_timeout;

    tokio::spawn(async move {
        let _permit = permit;
        let mut conn = Connection::new(socket, peer, handler, max_body, read_timeout);
        if let Err(e) = conn.run().await {
            tracing::error!("Connection error from {}: {}", peer, e);
        }
    });
}
