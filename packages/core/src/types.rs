//! Detection data model shared by the engine, the bridge, and the front door.
//!
//! All wire-facing types serialize to snake_case JSON field names, and
//! [`Status`] variants serialize as their exact `SCREAMING_SNAKE_CASE`
//! strings, matching what the worker pool produces and consumes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a detection request.
///
/// Minted by the correlation engine when a submission is accepted; callers
/// never supply their own (the front door rejects bodies that carry one).
/// Once minted the id is immutable and is the sole correlation key between
/// a submission and its asynchronous result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Mints a fresh random id.
    #[must_use]
    pub fn mint() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns true for the all-zero id, which no minted id ever is.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for RequestId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Opaque owner key attached to a submission.
///
/// Used only to filter mass status queries; never crosses the broker wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(Uuid);

impl OwnerId {
    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for OwnerId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OwnerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle status of a detection request.
///
/// `Pending` through `Failed` follow the normal worker round trip.
/// `ParsingFailed` and `TransportFailed` are local synthetic terminals the
/// bridge or engine emits when the work item never reached the worker pool.
/// `Rejected` is reserved for front-door validation failures and `Unknown`
/// is the synthetic answer for ids the store has never seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Pending,
    InProgress,
    Finished,
    Failed,
    Rejected,
    ParsingFailed,
    TransportFailed,
    Unknown,
}

impl Status {
    /// The exact wire string for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Rejected => "REJECTED",
            Self::ParsingFailed => "PARSING_FAILED",
            Self::TransportFailed => "TRANSPORT_FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Whether this status ends the request lifecycle.
    ///
    /// Terminality is advisory: the store itself never validates
    /// transitions, writers are expected not to resurrect terminal records.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished
                | Self::Failed
                | Self::Rejected
                | Self::ParsingFailed
                | Self::TransportFailed
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "FINISHED" => Ok(Self::Finished),
            "FAILED" => Ok(Self::Failed),
            "REJECTED" => Ok(Self::Rejected),
            "PARSING_FAILED" => Ok(Self::ParsingFailed),
            "TRANSPORT_FAILED" => Ok(Self::TransportFailed),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Error returned when parsing an unrecognized status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized status string: {0}")]
pub struct UnknownStatus(pub String);

/// One classification label with its probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    /// Label name, e.g. `ai-generated` or `human-generated`.
    pub label: String,
    /// Probability of the label being true, in `[0, 1]`.
    pub probability: f64,
}

/// Terminal classification result: an ordered sequence of labeled probabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub labels: Vec<Label>,
}

/// A unit of work submitted for asynchronous detection.
///
/// The `owner` field is server-local bookkeeping for mass-query filtering;
/// it is excluded from serialization so task frames on the broker carry
/// exactly `{request_id, content, detector_name}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRequest {
    pub request_id: RequestId,
    pub content: String,
    pub detector_name: String,
    #[serde(skip)]
    pub owner: Option<OwnerId>,
}

/// The persisted status of one detection request, keyed by `request_id`.
///
/// `owner` is server-local (see [`DetectionRequest::owner`]) and does not
/// appear in the serialized form; result frames from the worker pool never
/// carry it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub request_id: RequestId,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(skip)]
    pub owner: Option<OwnerId>,
}

impl StatusRecord {
    /// The record written when a submission is accepted.
    #[must_use]
    pub fn pending(request_id: RequestId, owner: Option<OwnerId>) -> Self {
        Self {
            request_id,
            status: Status::Pending,
            verdict: None,
            owner,
        }
    }

    /// A verdict-less record with the given status.
    #[must_use]
    pub fn bare(request_id: RequestId, status: Status) -> Self {
        Self {
            request_id,
            status,
            verdict: None,
            owner: None,
        }
    }

    /// The synthetic answer for an id the store has never seen.
    #[must_use]
    pub fn unknown(request_id: RequestId) -> Self {
        Self::bare(request_id, Status::Unknown)
    }
}
