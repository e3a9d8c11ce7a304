// src/output/mod.rs

//! Captured output as data.
//!
//! - [`record`] defines [`OutputRecord`], one tagged chunk of text.
//! - [`queue`] defines [`OutputQueue`], the unbounded FIFO that capture
//!   workers feed and viewers drain.

pub mod queue;
pub mod record;

pub use queue::OutputQueue;
pub use record::OutputRecord;
