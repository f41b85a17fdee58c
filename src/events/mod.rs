//! Event stream messages
//!
//! Decoding of the envelopes and change notifications delivered by the
//! catalog's event stream.

mod message;

pub use message::*;
