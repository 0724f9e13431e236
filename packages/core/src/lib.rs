//! Verity Core — detection data model, request statuses, and the broker wire codec.

pub mod messages;
pub mod types;

pub use messages::{WireCodec, WireError};
pub use types::{DetectionRequest, Label, OwnerId, RequestId, Status, StatusRecord, Verdict};
