//! Deadline notification engine.
//!
//! classifier → guard → emitter, driven one pass at a time by `scan`.

pub mod classifier;
pub mod emitter;
pub mod guard;
pub mod scan;
pub mod sources;
