//! Peer-addressed packet host.
//!
//! A `Host` is owned by the simulation thread and polled with a timeout.
//! I/O tasks (the WebTransport adapter) and in-process loopback peers feed
//! it through a `crossbeam-channel`; outbound bytes go back to each peer
//! over its own link.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;

pub type PeerId = u64;

/// How a payload should travel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Ordered and retransmitted
    Reliable,
    /// Fire-and-forget, may be dropped or reordered
    Unreliable,
}

/// Payload queued for a remote peer
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub data: Vec<u8>,
    pub delivery: Delivery,
}

/// Result of polling a `Host`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Connect(PeerId),
    Receive { peer: PeerId, data: Vec<u8> },
    Disconnect(PeerId),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Unknown peer {0}")]
    UnknownPeer(PeerId),
    #[error("Peer {0} is gone")]
    PeerGone(PeerId),
}

enum LinkEvent {
    Opened { peer: PeerId, link: PeerLink },
    Data { peer: PeerId, data: Vec<u8> },
    Closed { peer: PeerId },
}

enum PeerLink {
    /// Session driven by an I/O task
    Remote(mpsc::UnboundedSender<Outgoing>),
    /// Another host in this process, which knows us as `as_peer`
    Loopback {
        remote: Sender<LinkEvent>,
        as_peer: PeerId,
    },
}

pub struct Host {
    events_tx: Sender<LinkEvent>,
    events_rx: Receiver<LinkEvent>,
    peers: FxHashMap<PeerId, PeerLink>,
    next_peer: Arc<AtomicU64>,
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

impl Host {
    pub fn new() -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            events_tx,
            events_rx,
            peers: FxHashMap::default(),
            next_peer: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Handle for I/O tasks to open sessions on this host
    pub fn acceptor(&self) -> Acceptor {
        Acceptor {
            events_tx: self.events_tx.clone(),
            next_peer: Arc::clone(&self.next_peer),
        }
    }

    /// Wire two hosts together; returns each side's id for the other
    pub fn connect_loopback(a: &mut Host, b: &mut Host) -> (PeerId, PeerId) {
        let b_on_a = a.next_peer.fetch_add(1, Ordering::Relaxed);
        let a_on_b = b.next_peer.fetch_add(1, Ordering::Relaxed);
        let _ = a.events_tx.send(LinkEvent::Opened {
            peer: b_on_a,
            link: PeerLink::Loopback {
                remote: b.events_tx.clone(),
                as_peer: a_on_b,
            },
        });
        let _ = b.events_tx.send(LinkEvent::Opened {
            peer: a_on_b,
            link: PeerLink::Loopback {
                remote: a.events_tx.clone(),
                as_peer: b_on_a,
            },
        });
        (b_on_a, a_on_b)
    }

    /// Next event, waiting at most `timeout`
    pub fn poll(&mut self, timeout: Duration) -> Option<HostEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let event = match self
                .events_rx
                .recv_timeout(deadline.saturating_duration_since(Instant::now()))
            {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return None,
            };
            if let Some(event) = self.handle(event) {
                return Some(event);
            }
        }
    }

    fn handle(&mut self, event: LinkEvent) -> Option<HostEvent> {
        match event {
            LinkEvent::Opened { peer, link } => {
                self.peers.insert(peer, link);
                Some(HostEvent::Connect(peer))
            }
            LinkEvent::Data { peer, data } => self
                .peers
                .contains_key(&peer)
                .then_some(HostEvent::Receive { peer, data }),
            LinkEvent::Closed { peer } => self
                .peers
                .remove(&peer)
                .map(|_| HostEvent::Disconnect(peer)),
        }
    }

    pub fn transmit(&self, peer: PeerId, data: &[u8], delivery: Delivery) -> Result<(), TransportError> {
        match self.peers.get(&peer) {
            Some(PeerLink::Remote(tx)) => tx
                .send(Outgoing {
                    data: data.to_vec(),
                    delivery,
                })
                .map_err(|_| TransportError::PeerGone(peer)),
            Some(PeerLink::Loopback { remote, as_peer }) => remote
                .send(LinkEvent::Data {
                    peer: *as_peer,
                    data: data.to_vec(),
                })
                .map_err(|_| TransportError::PeerGone(peer)),
            None => Err(TransportError::UnknownPeer(peer)),
        }
    }

    /// Close the link; a `Disconnect` for `peer` follows on the next poll
    pub fn disconnect(&self, peer: PeerId) -> bool {
        let Some(link) = self.peers.get(&peer) else {
            return false;
        };
        if let PeerLink::Loopback { remote, as_peer } = link {
            let _ = remote.send(LinkEvent::Closed { peer: *as_peer });
        }
        let _ = self.events_tx.send(LinkEvent::Closed { peer });
        true
    }

    pub fn is_connected(&self, peer: PeerId) -> bool {
        self.peers.contains_key(&peer)
    }

    pub fn peers(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.peers.keys().copied()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        for link in self.peers.values() {
            if let PeerLink::Loopback { remote, as_peer } = link {
                let _ = remote.send(LinkEvent::Closed { peer: *as_peer });
            }
        }
    }
}

/// Opens sessions on a `Host` from I/O tasks
#[derive(Clone)]
pub struct Acceptor {
    events_tx: Sender<LinkEvent>,
    next_peer: Arc<AtomicU64>,
}

impl Acceptor {
    /// Register a new remote peer
    pub fn open(&self) -> PeerSession {
        let peer = self.next_peer.fetch_add(1, Ordering::Relaxed);
        let (tx, outgoing) = mpsc::unbounded_channel();
        let _ = self.events_tx.send(LinkEvent::Opened {
            peer,
            link: PeerLink::Remote(tx),
        });
        PeerSession {
            inbound: PeerInbound {
                peer,
                events_tx: self.events_tx.clone(),
            },
            outgoing,
        }
    }
}

/// I/O side of one remote peer. Dropping it disconnects the peer.
pub struct PeerSession {
    inbound: PeerInbound,
    outgoing: mpsc::UnboundedReceiver<Outgoing>,
}

impl PeerSession {
    pub fn peer(&self) -> PeerId {
        self.inbound.peer
    }

    pub fn inbound(&self) -> PeerInbound {
        self.inbound.clone()
    }

    /// Next payload for the peer; `None` once the host dropped the link
    pub async fn recv(&mut self) -> Option<Outgoing> {
        self.outgoing.recv().await
    }
}

impl Drop for PeerSession {
    fn drop(&mut self) {
        let _ = self.inbound.events_tx.send(LinkEvent::Closed {
            peer: self.inbound.peer,
        });
    }
}

/// Delivers a peer's inbound payloads to the host
#[derive(Clone)]
pub struct PeerInbound {
    peer: PeerId,
    events_tx: Sender<LinkEvent>,
}

impl PeerInbound {
    pub fn deliver(&self, data: Vec<u8>) -> bool {
        self.events_tx
            .send(LinkEvent::Data {
                peer: self.peer,
                data,
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(50);

    #[test]
    fn test_loopback_connect_and_transmit() {
        let mut a = Host::new();
        let mut b = Host::new();
        let (b_on_a, a_on_b) = Host::connect_loopback(&mut a, &mut b);

        assert_eq!(a.poll(WAIT), Some(HostEvent::Connect(b_on_a)));
        assert_eq!(b.poll(WAIT), Some(HostEvent::Connect(a_on_b)));

        a.transmit(b_on_a, b"hello", Delivery::Reliable).unwrap();
        assert_eq!(
            b.poll(WAIT),
            Some(HostEvent::Receive {
                peer: a_on_b,
                data: b"hello".to_vec()
            })
        );
        assert_eq!(b.poll(Duration::ZERO), None);
    }

    #[test]
    fn test_disconnect_reaches_both_sides() {
        let mut a = Host::new();
        let mut b = Host::new();
        let (b_on_a, a_on_b) = Host::connect_loopback(&mut a, &mut b);
        a.poll(WAIT);
        b.poll(WAIT);

        assert!(a.disconnect(b_on_a));
        assert_eq!(a.poll(WAIT), Some(HostEvent::Disconnect(b_on_a)));
        assert_eq!(b.poll(WAIT), Some(HostEvent::Disconnect(a_on_b)));
        assert!(matches!(
            a.transmit(b_on_a, b"late", Delivery::Reliable),
            Err(TransportError::UnknownPeer(_))
        ));
    }

    #[test]
    fn test_dropped_host_disconnects_loopback() {
        let mut a = Host::new();
        let mut b = Host::new();
        let (_, a_on_b) = Host::connect_loopback(&mut a, &mut b);
        a.poll(WAIT);
        b.poll(WAIT);
        drop(a);
        assert_eq!(b.poll(WAIT), Some(HostEvent::Disconnect(a_on_b)));
    }

    #[tokio::test]
    async fn test_acceptor_session() {
        let mut host = Host::new();
        let mut session = host.acceptor().open();
        let peer = session.peer();
        assert_eq!(host.poll(WAIT), Some(HostEvent::Connect(peer)));

        assert!(session.inbound().deliver(vec![1, 2, 3]));
        assert_eq!(
            host.poll(WAIT),
            Some(HostEvent::Receive {
                peer,
                data: vec![1, 2, 3]
            })
        );

        host.transmit(peer, &[9], Delivery::Unreliable).unwrap();
        let out = session.recv().await.unwrap();
        assert_eq!(out.data, vec![9]);
        assert_eq!(out.delivery, Delivery::Unreliable);

        drop(session);
        assert_eq!(host.poll(WAIT), Some(HostEvent::Disconnect(peer)));
    }
}
