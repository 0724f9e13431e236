//! Broker wire codec for task and result frames.
//!
//! The worker pool speaks JSON over two named queues: task frames go out on
//! the request queue, result frames come back on the response queue. The
//! codec owns both directions plus the frame-size limit the broker imposes
//! on outbound messages. Inbound frames without a usable `request_id` are
//! rejected at decode time since a result that cannot be correlated is
//! useless to the engine.

use serde_json::Value;

use crate::types::{DetectionRequest, StatusRecord};

/// Default cap on an encoded task frame, in bytes.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;

/// Errors from encoding or decoding broker frames.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("failed to encode task frame: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode result frame: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("task frame is {size} bytes, exceeding the {max}-byte limit")]
    FrameTooLarge { size: usize, max: usize },

    #[error("result frame carries a missing or nil request id")]
    MissingRequestId,
}

/// Encodes task frames and decodes result frames.
///
/// Cheap to clone; the engine encodes eagerly at submission time and the
/// bridge decodes everything arriving on the response queue.
#[derive(Debug, Clone)]
pub struct WireCodec {
    max_frame_bytes: usize,
}

impl WireCodec {
    /// Creates a codec enforcing the given outbound frame-size limit.
    #[must_use]
    pub fn new(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }

    /// Encodes a work item into a task frame.
    ///
    /// The frame carries exactly `{request_id, content, detector_name}`;
    /// the server-local owner never leaves the process.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::FrameTooLarge`] when the encoded frame exceeds
    /// the configured limit, or [`WireError::Encode`] on serialization
    /// failure. Either way nothing is handed to the broker.
    pub fn encode_task(&self, item: &DetectionRequest) -> Result<Value, WireError> {
        let bytes = serde_json::to_vec(item).map_err(WireError::Encode)?;
        if bytes.len() > self.max_frame_bytes {
            return Err(WireError::FrameTooLarge {
                size: bytes.len(),
                max: self.max_frame_bytes,
            });
        }
        serde_json::from_slice(&bytes).map_err(WireError::Encode)
    }

    /// Decodes a result frame into a status record.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Decode`] for malformed frames and
    /// [`WireError::MissingRequestId`] for frames whose id is nil; the
    /// bridge logs and drops both.
    pub fn decode_result(&self, payload: &Value) -> Result<StatusRecord, WireError> {
        let record: StatusRecord =
            serde_json::from_value(payload.clone()).map_err(WireError::Decode)?;
        if record.request_id.is_nil() {
            return Err(WireError::MissingRequestId);
        }
        Ok(record)
    }
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}
