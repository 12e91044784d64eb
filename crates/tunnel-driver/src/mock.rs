//! In-memory provider session for tests
//!
//! Records every open and close in order, and lets a test push
//! connections into a specific tunnel or end a tunnel from the provider
//! side.

use crate::error::{AcceptError, TunnelError};
use crate::session::{BoxedConn, ProviderTunnel, Session, TunnelConfig};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

/// Something that happened on the mock session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A tunnel was opened
    Opened {
        /// Tunnel id
        id: String,
        /// Labels it was opened with
        labels: BTreeMap<String, String>,
    },
    /// A tunnel was closed through [`ProviderTunnel::close`]
    Closed {
        /// Tunnel id
        id: String,
    },
}

enum Incoming {
    Conn(DuplexStream),
    Fail(String),
    End,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    events: Vec<SessionEvent>,
    fail_next_listen: Option<String>,
    open: HashMap<String, mpsc::UnboundedSender<Incoming>>,
}

/// Mock provider session
#[derive(Clone, Default)]
pub struct MockSession {
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSession").finish_non_exhaustive()
    }
}

impl MockSession {
    /// Create a new mock session
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `listen` call fail with `reason`
    pub fn fail_next_listen(&self, reason: impl Into<String>) {
        self.state().fail_next_listen = Some(reason.into());
    }

    /// Every open/close so far, in order
    pub fn events(&self) -> Vec<SessionEvent> {
        self.state().events.clone()
    }

    /// Ids of tunnels that are currently open
    pub fn open_tunnels(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state().open.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Id of the most recently opened tunnel
    pub fn last_opened(&self) -> Option<String> {
        self.state().events.iter().rev().find_map(|e| match e {
            SessionEvent::Opened { id, .. } => Some(id.clone()),
            SessionEvent::Closed { .. } => None,
        })
    }

    /// Number of close calls observed for `id`
    pub fn close_count(&self, id: &str) -> usize {
        self.state()
            .events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Closed { id: closed } if closed == id))
            .count()
    }

    /// Pushes a new connection into tunnel `id` and returns the client end.
    ///
    /// Returns `None` if the tunnel is not open.
    pub fn connect(&self, id: &str) -> Option<DuplexStream> {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let state = self.state();
        let tx = state.open.get(id)?;
        tx.send(Incoming::Conn(server)).ok()?;
        Some(client)
    }

    /// Makes the next accept on tunnel `id` fail without closing the tunnel
    pub fn fail_accept(&self, id: &str, reason: impl Into<String>) -> bool {
        self.state()
            .open
            .get(id)
            .is_some_and(|tx| tx.send(Incoming::Fail(reason.into())).is_ok())
    }

    /// Closes tunnel `id` from the provider side
    pub fn end_tunnel(&self, id: &str) -> bool {
        match self.state().open.remove(id) {
            Some(tx) => tx.send(Incoming::End).is_ok(),
            None => false,
        }
    }
}

#[async_trait::async_trait]
impl Session for MockSession {
    async fn listen(&self, config: TunnelConfig) -> Result<Box<dyn ProviderTunnel>, TunnelError> {
        let mut state = self.state();
        if let Some(reason) = state.fail_next_listen.take() {
            return Err(TunnelError::Listen(reason));
        }

        state.next_id += 1;
        let id = format!("tn_{}", state.next_id);
        let (tx, rx) = mpsc::unbounded_channel();
        state.open.insert(id.clone(), tx);
        state.events.push(SessionEvent::Opened {
            id: id.clone(),
            labels: config.labels.clone(),
        });

        Ok(Box::new(MockTunnel {
            id,
            labels: config.labels,
            rx,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockTunnel {
    id: String,
    labels: BTreeMap<String, String>,
    rx: mpsc::UnboundedReceiver<Incoming>,
    state: Arc<Mutex<MockState>>,
}

#[async_trait::async_trait]
impl ProviderTunnel for MockTunnel {
    fn id(&self) -> &str {
        &self.id
    }

    fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    async fn accept(&mut self) -> Result<BoxedConn, AcceptError> {
        match self.rx.recv().await {
            Some(Incoming::Conn(conn)) => Ok(Box::new(conn)),
            Some(Incoming::Fail(reason)) => Err(AcceptError::Transport(reason)),
            Some(Incoming::End) | None => Err(AcceptError::Closed),
        }
    }

    async fn close(&mut self) -> Result<(), TunnelError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.open.remove(&self.id);
        state.events.push(SessionEvent::Closed { id: self.id.clone() });
        self.rx.close();
        Ok(())
    }
}
