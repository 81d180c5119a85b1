//! Serial control channel for the hexapod: the physical link plus the chat
//! command grammar that maps phrases to single-character device codes.

pub use link::SerialLink;

pub mod chat;
mod link;
