//! Typed packet channel over a `Host`.

use std::fmt::Debug;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::protocol::{decode, encode, ClientPacket, DecodeError, EncodeError, ServerPacket};
use super::transport::{Delivery, Host, PeerId, TransportError};
use crate::util::VerifyStructure;

#[derive(Debug, thiserror::Error)]
pub enum TelegraphError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("Malformed packet")]
    Malformed,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Outcome of a multi-peer transmit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sent {
    /// Peers the packet was handed to
    pub peers: usize,
    /// Encoded size of one copy
    pub size: usize,
}

/// Receives `Rx` packets and transmits `Tx` packets
pub struct Telegraph<Rx, Tx> {
    _packets: PhantomData<fn(Tx) -> Rx>,
}

pub type ServerTelegraph = Telegraph<ClientPacket, ServerPacket>;
pub type ClientTelegraph = Telegraph<ServerPacket, ClientPacket>;

impl<Rx, Tx> Default for Telegraph<Rx, Tx> {
    fn default() -> Self {
        Self {
            _packets: PhantomData,
        }
    }
}

impl<Rx, Tx> Telegraph<Rx, Tx>
where
    Rx: DeserializeOwned + VerifyStructure + Debug,
    Tx: Serialize,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&self, packet: &Tx) -> Result<Vec<u8>, TelegraphError> {
        Ok(encode(packet)?)
    }

    /// Send to one peer; returns the encoded size
    pub fn transmit(
        &self,
        host: &Host,
        peer: PeerId,
        packet: &Tx,
        delivery: Delivery,
    ) -> Result<usize, TelegraphError> {
        let data = self.encode(packet)?;
        host.transmit(peer, &data, delivery)?;
        Ok(data.len())
    }

    /// Encode once and send to every peer in `peers`. Peers that went away
    /// are skipped.
    pub fn transmit_to(
        &self,
        host: &Host,
        peers: impl IntoIterator<Item = PeerId>,
        packet: &Tx,
        delivery: Delivery,
    ) -> Result<Sent, TelegraphError> {
        let data = self.encode(packet)?;
        let mut sent = Sent {
            peers: 0,
            size: data.len(),
        };
        for peer in peers {
            match host.transmit(peer, &data, delivery) {
                Ok(()) => sent.peers += 1,
                Err(e) => tracing::debug!("Skipping peer {}: {}", peer, e),
            }
        }
        Ok(sent)
    }

    /// Decode and verify an inbound payload
    pub fn receive(&self, data: &[u8]) -> Result<Rx, TelegraphError> {
        let packet: Rx = decode(data).map_err(|e| {
            tracing::warn!("Dropping undecodable packet: {}", e);
            e
        })?;
        if !packet.verify_structure() {
            tracing::warn!("Dropping malformed packet: {:?}", packet);
            return Err(TelegraphError::Malformed);
        }
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::transport::HostEvent;
    use std::time::Duration;

    #[test]
    fn test_transmit_and_receive() {
        let mut server = Host::new();
        let mut client = Host::new();
        let (client_peer, _) = Host::connect_loopback(&mut server, &mut client);
        server.poll(Duration::from_millis(50));
        client.poll(Duration::from_millis(50));

        let telegraph = ServerTelegraph::new();
        let size = telegraph
            .transmit(&server, client_peer, &ServerPacket::Broadcast("hi".into()), Delivery::Reliable)
            .unwrap();
        assert!(size > 0);

        let Some(HostEvent::Receive { data, .. }) = client.poll(Duration::from_millis(50)) else {
            panic!("Wrong event type");
        };
        let packet = ClientTelegraph::new().receive(&data).unwrap();
        assert_eq!(packet, ServerPacket::Broadcast("hi".into()));
    }

    #[test]
    fn test_receive_rejects_malformed() {
        let telegraph = ServerTelegraph::new();
        assert!(matches!(telegraph.receive(&[1, 0, 0, 0]), Err(TelegraphError::Decode(_))));

        let mut oversized = vec![7, 0, 0, 0];
        oversized.extend_from_slice(&u64::MAX.to_le_bytes());
        assert!(matches!(telegraph.receive(&oversized), Err(TelegraphError::Decode(_))));

        let blank = encode(&ClientPacket::ReqJoin("  ".into())).unwrap();
        assert!(matches!(telegraph.receive(&blank), Err(TelegraphError::Malformed)));
    }

    #[test]
    fn test_transmit_to_skips_unknown_peers() {
        let mut server = Host::new();
        let mut client = Host::new();
        let (client_peer, _) = Host::connect_loopback(&mut server, &mut client);
        server.poll(Duration::from_millis(50));

        let sent = ServerTelegraph::new()
            .transmit_to(&server, [client_peer, 99], &ServerPacket::RCon("ok".into()), Delivery::Reliable)
            .unwrap();
        assert_eq!(sent.peers, 1);
        assert!(sent.size > 0);
    }
}
