//! # NetBridge Wire
//!
//! The byte-level protocol between a coordinator and its workers.
//!
//! - [`codec`]: `[u32 LE length][JSON body]` frames, plus a sans-IO
//!   [`FrameDecoder`] for partial reads
//! - [`envelope`]: [`TaskEnvelope`] and [`ResultEnvelope`], tied together by a
//!   correlation id
//! - [`connection`]: [`Connection`], a framed compio stream with
//!   cancellation-safe writes
//!
//! ```rust,no_run
//! use compio::net::TcpStream;
//! use netbridge_core::correlation::CorrelationId;
//! use netbridge_wire::{Connection, ResultEnvelope, TaskEnvelope};
//!
//! #[compio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stream = TcpStream::connect("127.0.0.1:1300").await?;
//!     let mut conn = Connection::new(stream);
//!
//!     while let Some(task) = conn.recv::<TaskEnvelope<String>>().await? {
//!         let answer = task.payload.to_uppercase();
//!         conn.send(&ResultEnvelope::completed(task.id, answer)).await?;
//!     }
//!     Ok(())
//! }
//! ```

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod codec;
pub mod connection;
pub mod envelope;

pub use codec::{decode, decode_payload, encode, encode_with_limit, CodecError, FrameDecoder};
pub use connection::Connection;
pub use envelope::{peek_id, ResultEnvelope, TaskEnvelope, TaskOutcome};
