//! TCP listener: accepts panel connections and runs one session per
//! connection.
//!
//! The server is passive in the transport sense (panels dial in) but active
//! in the application sense: sessions initiate outbound commands through
//! [`Session::send_command`] and publish decoded inbound messages on the
//! notification channel.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{GatewayConfig, IntegrationConfig};
use crate::error::Result;
use crate::session::{PanelEvent, Session};
use crate::types::{SessionId, SessionStats};

/// The panel-integration gateway.
pub struct Gateway {
    config: GatewayConfig,
    integration: Arc<IntegrationConfig>,
    sessions: DashMap<SessionId, Arc<Session>>,
    events_tx: mpsc::Sender<PanelEvent>,
    shutdown: CancellationToken,
}

impl Gateway {
    /// Build a gateway and the receiving end of its notification channel.
    pub fn new(config: GatewayConfig) -> (Arc<Self>, mpsc::Receiver<PanelEvent>) {
        let (events_tx, events_rx) = mpsc::channel(config.events_buffer);
        let integration = Arc::new(config.integration.clone());
        let gateway = Arc::new(Self {
            config,
            integration,
            sessions: DashMap::new(),
            events_tx,
            shutdown: CancellationToken::new(),
        });
        (gateway, events_rx)
    }

    /// Bind the configured address and accept connections until shutdown.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on an already-bound listener until shutdown.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        info!(%addr, "gateway listening for panels");

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(%peer, error = %e, "failed to set TCP_NODELAY");
                    }
                    let session = Session::attach(
                        stream,
                        Some(peer),
                        self.config.timing.clone(),
                        Arc::clone(&self.integration),
                        self.events_tx.clone(),
                        &self.shutdown,
                    );
                    info!(session = %session.id(), %peer, "panel connected");
                    self.sessions.insert(session.id(), Arc::clone(&session));

                    let gateway = Arc::clone(&self);
                    tokio::spawn(async move {
                        let id = session.id();
                        if let Err(e) = Arc::clone(&session).run().await {
                            warn!(session = %id, error = %e, "session ended with error");
                        }
                        gateway.sessions.remove(&id);
                    });
                }
            }
        }

        for entry in self.sessions.iter() {
            entry.value().shutdown();
        }
        info!("gateway stopped");
        Ok(())
    }

    /// Request shutdown; cascades to every session.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn session(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|entry| Arc::clone(&entry))
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|entry| Arc::clone(&entry)).collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Sum of per-session counters across live sessions.
    pub fn aggregate_stats(&self) -> SessionStats {
        let mut total = SessionStats::default();
        for entry in self.sessions.iter() {
            let stats = entry.value().stats();
            total.frames_in += stats.frames_in;
            total.frames_out += stats.frames_out;
            total.packets_dropped += stats.packets_dropped;
            total.transactions_aborted += stats.transactions_aborted;
        }
        total
    }
}
