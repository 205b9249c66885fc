pub mod band_header;
pub mod packet;

pub use band_header::{BlockHeader, SubbandHeader};
pub use packet::ComponentPacket;
