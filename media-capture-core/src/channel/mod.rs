//! Best-effort delivery of sample buffers from capture threads to consumers.
//!
//! ```text
//! [capture thread] → SampleRouter::dispatch ─┬→ bounded queue → SampleChannel (preview)
//!                                            └→ bounded queue → SampleChannel (recording)
//! ```
//!
//! The producer never blocks: a full queue loses a buffer instead.

pub mod router;
pub mod sample_channel;
