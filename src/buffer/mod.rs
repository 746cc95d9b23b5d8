//! Shared ingestion buffer subsystem.
//!
//! # Data Flow
//! ```text
//! net::receive (multiplexer thread)
//!     → SharedIngestionBuffer::enqueue (bulk, all-or-nothing)
//!     → circular storage behind a mutex
//!     → consumers drain via dequeue/drain (any thread)
//! ```
//!
//! # Design Decisions
//! - Capacity is fixed at creation; nothing is ever evicted
//! - A chunk either fits entirely or is rejected with `BufferFull`
//! - "Full" is a dedicated error, never an end-of-stream sentinel

pub mod ring;

pub use ring::{BufferFull, SharedIngestionBuffer};
