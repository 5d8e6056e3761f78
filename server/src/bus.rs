//! Outbound fan-out to connected clients.

use arena_shared::Packet;
use indexmap::IndexMap;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Packets a connection may have queued before it counts as lagging
pub const OUTBOUND_QUEUE_LEN: usize = 1024;

/// Creates the outbound queue for one connection
pub fn outbound_channel() -> (mpsc::Sender<Packet>, mpsc::Receiver<Packet>) {
    mpsc::channel(OUTBOUND_QUEUE_LEN)
}

/// Who receives an outbound packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience<'a> {
    /// The originating connection only
    Reply(&'a str),
    /// Every connection except the originator
    Others(&'a str),
    /// Every connection
    All,
}

/// Per-connection outbound queues
///
/// Sending never blocks. Each queue holds at most `OUTBOUND_QUEUE_LEN`
/// packets and is drained by the connection's writer task. When a queue is
/// full the packet is dropped and the connection is marked as lagging until
/// the owner collects it with `take_lagging`. A queue whose receiver is gone
/// is skipped.
#[derive(Default)]
pub struct BroadcastBus {
    outbound: IndexMap<String, mpsc::Sender<Packet>>,
    lagging: Vec<String>,
}

impl BroadcastBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: &str, sender: mpsc::Sender<Packet>) {
        self.outbound.insert(id.to_string(), sender);
    }

    pub fn unregister(&mut self, id: &str) -> bool {
        self.lagging.retain(|lagging| lagging != id);
        self.outbound.shift_remove(id).is_some()
    }

    pub fn publish(&mut self, audience: Audience<'_>, packet: Packet) {
        match audience {
            Audience::Reply(id) => self.send_to(id, packet),
            Audience::Others(exclude) => self.fan_out(Some(exclude), packet),
            Audience::All => self.fan_out(None, packet),
        }
    }

    pub fn send_to(&mut self, id: &str, packet: Packet) {
        let result = match self.outbound.get(id) {
            Some(sender) => sender.try_send(packet),
            None => {
                debug!("No outbound queue for {}", id);
                return;
            }
        };
        self.record(id, result);
    }

    fn fan_out(&mut self, exclude: Option<&str>, packet: Packet) {
        let mut full = Vec::new();
        for (id, sender) in &self.outbound {
            if Some(id.as_str()) == exclude {
                continue;
            }
            match sender.try_send(packet.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => full.push(id.clone()),
                Err(TrySendError::Closed(_)) => debug!("Outbound queue for {} is closed", id),
            }
        }
        for id in full {
            self.mark_lagging(&id);
        }
    }

    fn record(&mut self, id: &str, result: Result<(), TrySendError<Packet>>) {
        match result {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.mark_lagging(id),
            Err(TrySendError::Closed(_)) => debug!("Outbound queue for {} is closed", id),
        }
    }

    fn mark_lagging(&mut self, id: &str) {
        if !self.lagging.iter().any(|lagging| lagging == id) {
            warn!("Outbound queue for {} is full, dropping packets", id);
            self.lagging.push(id.to_string());
        }
    }

    /// Returns and clears the connections whose queue overflowed
    pub fn take_lagging(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lagging)
    }

    /// Returns the number of registered connections
    pub fn len(&self) -> usize {
        self.outbound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty()
    }
}
