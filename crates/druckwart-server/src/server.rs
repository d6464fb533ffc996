// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// TCP accept loop for the reservation service.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use druckwart_core::error::{DruckwartError, Result};
use druckwart_ledger::Ledger;

use crate::http;
use crate::routes::{self, ApiState};

/// The reservation service.
///
/// Binds a TCP listener and serves the reservation API until [`stop`] is
/// called.  Each connection is handled in its own spawned task; the ledger
/// serializes access behind the shared [`ApiState`].
///
/// [`stop`]: ReservationServer::stop
pub struct ReservationServer {
    bind_addr: SocketAddr,
    /// Address actually bound (differs from `bind_addr` when port 0 is used).
    local_addr: Option<SocketAddr>,
    shutdown_signal: Arc<Notify>,
    task_handle: Option<JoinHandle<()>>,
}

impl ReservationServer {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            local_addr: None,
            shutdown_signal: Arc::new(Notify::new()),
            task_handle: None,
        }
    }

    /// The bound address, once [`start`] has succeeded.
    ///
    /// [`start`]: ReservationServer::start
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind the listener and spawn the accept loop.
    pub async fn start(&mut self, ledger: Arc<Mutex<Ledger>>, api_key: &str) -> Result<()> {
        if self.task_handle.is_some() {
            debug!(addr = %self.bind_addr, "server already running");
            return Ok(());
        }

        let listener = TcpListener::bind(self.bind_addr)
            .await
            .map_err(|e| DruckwartError::HttpServer(format!("bind {}: {e}", self.bind_addr)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| DruckwartError::HttpServer(format!("local_addr: {e}")))?;
        self.local_addr = Some(local_addr);

        info!(addr = %local_addr, "reservation service listening");

        let shutdown = Arc::clone(&self.shutdown_signal);
        let state = Arc::new(ApiState::new(ledger, api_key));

        let handle = tokio::spawn(async move {
            Self::accept_loop(listener, shutdown, state).await;
        });
        self.task_handle = Some(handle);
        Ok(())
    }

    /// Signal the accept loop to exit and await its completion.  Connections
    /// already being handled are allowed to finish.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.task_handle.take() else {
            return Ok(());
        };

        info!("stopping reservation service");
        self.shutdown_signal.notify_one();
        handle
            .await
            .map_err(|e| DruckwartError::HttpServer(format!("task join: {e}")))?;
        info!("reservation service stopped");
        Ok(())
    }

    async fn accept_loop(listener: TcpListener, shutdown: Arc<Notify>, state: Arc<ApiState>) {
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!("accept loop received shutdown signal");
                    break;
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            debug!(peer = %peer_addr, "incoming connection");
                            let state = Arc::clone(&state);
                            tokio::spawn(async move {
                                if let Err(e) =
                                    Self::handle_connection(stream, peer_addr, &state).await
                                {
                                    warn!(
                                        peer = %peer_addr,
                                        error = %e,
                                        "connection handler error"
                                    );
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(
        mut stream: TcpStream,
        peer_addr: SocketAddr,
        state: &ApiState,
    ) -> Result<()> {
        let Some(request) = http::read_request(&mut stream).await? else {
            debug!(peer = %peer_addr, "empty request");
            return Ok(());
        };

        let (status, body) = routes::dispatch(&request, state);
        debug!(
            peer = %peer_addr,
            method = %request.method,
            path = %request.path,
            status,
            "request served"
        );
        http::send_json_response(&mut stream, status, &body).await
    }
}
