//! # spout-transport
//!
//! Transport seam between the Spout hub and a streaming HTTP response.
//!
//! A transport opens a stream by subscribing through the hub, then drains the
//! subscription into an [`EventSink`] until either side goes away:
//!
//! ```rust,ignore
//! use spout_transport::{drain, open_stream, ChannelSink};
//!
//! let (mut sink, body) = ChannelSink::new(16);
//! let subscription = open_stream(&hub, request, &sink).await?;
//! tokio::spawn(async move { drain(&hub, subscription, &mut sink, codec).await });
//! // `body` feeds the HTTP response.
//! ```

pub mod sink;
pub mod stream;
pub mod traits;

pub use sink::{body_stream, BodyChunk, ChannelSink};
pub use stream::{drain, open_stream, DrainOutcome, DrainReport};
pub use traits::{EventSink, TransportError};
