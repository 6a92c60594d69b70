//! Networking: packets, the typed telegraph, the transport host and the
//! WebTransport adapter.

pub mod framing;
pub mod protocol;
pub mod telegraph;
pub mod tls;
pub mod transport;
pub mod webtransport;

pub use protocol::{ClientPacket, ServerPacket};
pub use telegraph::{ClientTelegraph, Sent, ServerTelegraph, Telegraph, TelegraphError};
pub use transport::{Delivery, Host, HostEvent, PeerId};
