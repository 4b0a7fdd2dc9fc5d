//! Local stand-in for the remote confirmation service.
//!
//! `POST /echo` takes a JSON transaction array and answers with the subset it
//! confirms. With `drop_rate > 0` entries are dropped at random (seeded), the
//! same way a lossy link drops packets, so partial confirmation can be
//! exercised without a real peer.

use std::{
    io,
    net::SocketAddr,
    sync::{Arc, Mutex},
    thread,
};

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use log::{debug, info, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::json;
use tokio::sync::oneshot;

use crate::tx::Transaction;

pub const ECHO_PATH: &str = "/echo";

#[derive(Clone, Debug, PartialEq)]
pub struct PeerConfig {
    /// Probability in `0.0..=1.0` that a single transaction is left unconfirmed.
    pub drop_rate: f64,
    pub seed: u64,
    /// Wrap the answer as `{"method": "POST", "data": [..]}`.
    pub envelope: bool,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            drop_rate: 0.0,
            seed: 0xEC40_0001,
            envelope: false,
        }
    }
}

struct PeerState {
    config: PeerConfig,
    rng: Mutex<StdRng>,
}

pub fn router(config: PeerConfig) -> Router {
    let state = Arc::new(PeerState {
        rng: Mutex::new(StdRng::seed_from_u64(config.seed)),
        config,
    });
    Router::new()
        .route(ECHO_PATH, post(echo_handler))
        .with_state(state)
}

async fn echo_handler(
    State(state): State<Arc<PeerState>>,
    Json(batch): Json<Vec<Transaction>>,
) -> Response {
    let received = batch.len();
    let confirmed: Vec<Transaction> = if state.config.drop_rate > 0.0 {
        let mut rng = state.rng.lock().unwrap_or_else(|p| p.into_inner());
        batch
            .into_iter()
            .filter(|_| rng.gen::<f64>() >= state.config.drop_rate)
            .collect()
    } else {
        batch
    };
    info!("confirmed {}/{} transactions", confirmed.len(), received);

    if state.config.envelope {
        Json(json!({ "method": "POST", "data": confirmed })).into_response()
    } else {
        Json(confirmed).into_response()
    }
}

pub async fn serve(listener: tokio::net::TcpListener, config: PeerConfig) -> io::Result<()> {
    axum::serve(listener, router(config)).await
}

/// Handle to a peer running on a background thread. Dropping it stops the
/// peer: the listener closes and the runtime thread exits.
#[derive(Debug)]
pub struct PeerHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl PeerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}{}", self.addr, ECHO_PATH)
    }
}

impl Drop for PeerHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // the thread may already be gone
            let _ = shutdown.send(());
        }
    }
}

/// Start an echo peer on an ephemeral loopback port.
pub fn spawn(config: PeerConfig) -> io::Result<PeerHandle> {
    spawn_router(router(config))
}

/// Serve `app` on an ephemeral loopback port from a dedicated runtime thread.
pub fn spawn_router(app: Router) -> io::Result<PeerHandle> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;
    let (shutdown, stop) = oneshot::channel::<()>();

    thread::Builder::new()
        .name(format!("echo-peer-{}", addr.port()))
        .spawn(move || {
            runtime.block_on(async move {
                let listener = match tokio::net::TcpListener::from_std(listener) {
                    Ok(l) => l,
                    Err(err) => {
                        warn!("echo peer on {addr}: {err}");
                        return;
                    }
                };
                let stopped = async {
                    let _ = stop.await;
                };
                if let Err(err) = axum::serve(listener, app)
                    .with_graceful_shutdown(stopped)
                    .await
                {
                    warn!("echo peer on {addr} stopped: {err}");
                }
                debug!("echo peer on {addr} shut down");
            })
        })?;
    Ok(PeerHandle {
        addr,
        shutdown: Some(shutdown),
    })
}
