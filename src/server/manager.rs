//! The connection event loop.
//!
//! One accept task per listening socket hands new streams to the manager,
//! which owns the connection table. Every connection runs as its own task on
//! the same single-threaded runtime and reports activity and closure back
//! through the event channel. A periodic sweep closes connections that have
//! been idle longer than their host's timeout; closed slots are compacted at
//! the end of each loop iteration.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::http::connection::Connection;
use crate::server::ServerError;
use crate::server::binding::Binding;

pub type ConnId = u64;

/// How often idle connections are looked for.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub enum ConnEvent {
    Accepted {
        stream: TcpStream,
        peer: SocketAddr,
        binding: Arc<Binding>,
    },
    /// Bytes moved on the connection.
    Active(ConnId),
    /// The connection task finished and dropped its socket.
    Closed(ConnId),
}

struct Slot {
    peer: SocketAddr,
    last_active: Instant,
    timeout: Duration,
    task: AbortHandle,
    closed: bool,
}

pub struct ConnectionManager {
    listeners: Vec<(Arc<Binding>, TcpListener)>,
    slots: HashMap<ConnId, Slot>,
    next_id: ConnId,
    sweep_every: Duration,
}

fn listen(addr: SocketAddr, backlog: u32) -> std::io::Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}

impl ConnectionManager {
    /// Opens one listening socket per distinct address in `config`.
    pub fn bind(config: &Config) -> Result<Self, ServerError> {
        Self::bind_all(Binding::group(&config.servers), config.backlog)
    }

    pub fn bind_all(bindings: Vec<Binding>, backlog: u32) -> Result<Self, ServerError> {
        let mut listeners = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let addr = binding.addr();
            let listener = listen(addr, backlog).map_err(|source| ServerError::Bind { addr, source })?;
            info!(
                addr = %listener.local_addr().unwrap_or(addr),
                hosts = binding.hosts().len(),
                "Listening"
            );
            listeners.push((Arc::new(binding), listener));
        }

        Ok(Self {
            listeners,
            slots: HashMap::new(),
            next_id: 0,
            sweep_every: SWEEP_INTERVAL,
        })
    }

    pub fn with_sweep_interval(mut self, every: Duration) -> Self {
        self.sweep_every = every;
        self
    }

    /// Addresses actually bound, in binding order.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|(_, l)| l.local_addr().ok())
            .collect()
    }

    /// Serves until an accept task dies, which is reported as an internal
    /// fault.
    pub async fn run(mut self) -> Result<(), ServerError> {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut acceptors = JoinSet::new();
        for (binding, listener) in std::mem::take(&mut self.listeners) {
            acceptors.spawn(accept_loop(listener, binding, tx.clone()));
        }

        let mut sweep = interval(self.sweep_every);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(event) = rx.recv() => self.handle(event, &tx),
                _ = sweep.tick() => self.sweep(Instant::now()),
                Some(joined) = acceptors.join_next() => {
                    let reason = match joined {
                        Ok(()) => "accept loop stopped".to_string(),
                        Err(e) => format!("accept loop failed: {e}"),
                    };
                    error!(%reason, "Listener lost");
                    self.shutdown();
                    return Err(ServerError::Internal(reason));
                }
            }
            self.compact();
        }
    }

    fn handle(&mut self, event: ConnEvent, tx: &mpsc::UnboundedSender<ConnEvent>) {
        match event {
            ConnEvent::Accepted {
                stream,
                peer,
                binding,
            } => {
                let id = self.next_id;
                self.next_id += 1;
                let timeout = binding.timeout();

                let connection = Connection::new(id, stream, peer, binding, tx.clone());
                let events = tx.clone();
                let task = tokio::spawn(async move {
                    if let Err(e) = connection.run().await {
                        debug!(%peer, error = %e, "Connection error");
                    }
                    let _ = events.send(ConnEvent::Closed(id));
                });

                debug!(%peer, id, "Accepted connection");
                self.slots.insert(
                    id,
                    Slot {
                        peer,
                        last_active: Instant::now(),
                        timeout,
                        task: task.abort_handle(),
                        closed: false,
                    },
                );
            }
            ConnEvent::Active(id) => {
                if let Some(slot) = self.slots.get_mut(&id) {
                    slot.last_active = Instant::now();
                }
            }
            ConnEvent::Closed(id) => {
                if let Some(slot) = self.slots.get_mut(&id) {
                    slot.closed = true;
                }
            }
        }
    }

    fn sweep(&mut self, now: Instant) {
        for (id, slot) in self.slots.iter_mut().filter(|(_, s)| !s.closed) {
            if now.duration_since(slot.last_active) > slot.timeout {
                info!(peer = %slot.peer, id, "Connection timed out");
                slot.task.abort();
                slot.closed = true;
            }
        }
    }

    fn compact(&mut self) {
        let before = self.slots.len();
        self.slots.retain(|_, slot| !slot.closed);
        let removed = before - self.slots.len();
        if removed > 0 {
            debug!(removed, active = self.slots.len(), "Reclaimed connections");
        }
    }

    fn shutdown(&mut self) {
        for slot in self.slots.values_mut() {
            slot.task.abort();
            slot.closed = true;
        }
        self.compact();
    }

    pub fn active(&self) -> usize {
        self.slots.values().filter(|s| !s.closed).count()
    }
}

async fn accept_loop(
    listener: TcpListener,
    binding: Arc<Binding>,
    tx: mpsc::UnboundedSender<ConnEvent>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let event = ConnEvent::Accepted {
                    stream,
                    peer,
                    binding: binding.clone(),
                };
                if tx.send(event).is_err() {
                    return;
                }
            }
            Err(e) => {
                // Usually descriptor exhaustion; back off instead of spinning.
                warn!(addr = %binding.addr(), error = %e, "Accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConnectionManager {
        ConnectionManager {
            listeners: Vec::new(),
            slots: HashMap::new(),
            next_id: 0,
            sweep_every: SWEEP_INTERVAL,
        }
    }

    fn idle_slot(timeout: Duration) -> Slot {
        let task = tokio::spawn(std::future::pending::<()>());
        Slot {
            peer: "127.0.0.1:1".parse().unwrap(),
            last_active: Instant::now(),
            timeout,
            task: task.abort_handle(),
            closed: false,
        }
    }

    #[tokio::test]
    async fn sweep_closes_only_idle_connections() {
        let mut manager = manager();
        manager.slots.insert(1, idle_slot(Duration::from_secs(5)));
        manager.slots.insert(2, idle_slot(Duration::from_secs(60)));

        let later = Instant::now() + Duration::from_secs(10);
        manager.sweep(later);
        assert_eq!(manager.active(), 1);
        assert!(manager.slots[&1].closed);

        manager.compact();
        assert_eq!(manager.slots.len(), 1);
        assert!(manager.slots.contains_key(&2));
    }

    #[tokio::test]
    async fn timed_out_task_is_aborted() {
        let mut manager = manager();
        let task = tokio::spawn(std::future::pending::<()>());
        manager.slots.insert(
            7,
            Slot {
                peer: "127.0.0.1:1".parse().unwrap(),
                last_active: Instant::now(),
                timeout: Duration::from_millis(1),
                task: task.abort_handle(),
                closed: false,
            },
        );

        manager.sweep(Instant::now() + Duration::from_secs(1));
        assert!(task.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn activity_refreshes_the_deadline() {
        let mut manager = manager();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut slot = idle_slot(Duration::from_secs(5));
        slot.last_active -= Duration::from_secs(4);
        manager.slots.insert(3, slot);

        manager.handle(ConnEvent::Active(3), &tx);
        manager.sweep(Instant::now() + Duration::from_secs(2));
        assert_eq!(manager.active(), 1);

        manager.handle(ConnEvent::Closed(3), &tx);
        manager.compact();
        assert!(manager.slots.is_empty());
    }
}
