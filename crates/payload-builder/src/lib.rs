//! Single-build payload jobs and the payload tracker (C8 + C9).

pub mod builder;
pub mod tracker;

pub use builder::{BuiltPayload, PayloadBuilder, SimpleReceipt};
pub use tracker::{GetResult, PayloadTracker, TrackedState, TrackerError};
