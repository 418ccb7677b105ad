pub mod error;
pub mod factory;
pub mod header;
pub mod packet;
pub mod types;

pub const PKT_MAX_SIZE: usize = 1024;

pub const MAX_UNITS: usize = 5;
pub const MAX_HOOPS: usize = 4;

pub const CB_NUM_FE_CHANS: u16 = 256;
pub const CB_NUM_ANAIN_CHANS: u16 = 16;
pub const CB_NUM_ANALOG_CHANS: u16 = CB_NUM_FE_CHANS + CB_NUM_ANAIN_CHANS;
pub const CB_NUM_ANAOUT_CHANS: u16 = 4;
pub const CB_NUM_AUDIO_CHANS: u16 = 2;
pub const CB_NUM_ANAIN_AND_AUDIO_CHANS: u16 = CB_NUM_ANAIN_CHANS + CB_NUM_AUDIO_CHANS;
pub const CB_NUM_DIGIN_CHANS: u16 = 1;
pub const CB_NUM_SERIAL_CHANS: u16 = 1;
pub const CB_NUM_DIGOUT_CHANS: u16 = 4;

pub use error::PacketError;
pub use header::{Header, WireVersion};
pub use packet::Packet;
