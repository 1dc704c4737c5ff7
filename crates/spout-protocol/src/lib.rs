//! # spout-protocol
//!
//! Wire format for the Spout server-push engine.
//!
//! Spout delivers messages as a `text/event-stream` body. This crate defines
//! the immutable [`Message`] envelope and the codec that turns it into event
//! blocks (and back, for clients and tests).
//!
//! ## Example
//!
//! ```rust
//! use spout_protocol::{codec, Message};
//!
//! let message = Message::new("7", "a\nb", "update");
//! let encoded = codec::encode_stamped(&message, 3000);
//! assert_eq!(
//!     &encoded[..],
//!     b"id: 7\nretry: 3000\nevent: update\ndata: a\ndata: b\n\n"
//! );
//! ```

pub mod codec;
pub mod message;

pub use codec::{decode_from, encode, encode_stamped, EventCodec, ProtocolError};
pub use message::{Message, HEARTBEAT_EVENT};
