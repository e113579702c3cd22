use bytes::Bytes;
use rusoto_core::RusotoError;
use rusoto_dynamodb::{DeleteItemError, GetItemError, PutItemError, ScanError};
use thiserror::Error;

/// Enumerates high-level errors returned by this library.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The caller did not supply a usable identity header.
    #[error("UserID header is required")]
    MissingIdentity,

    /// The request body could not be parsed.
    #[error("Invalid request body")]
    MalformedBody { source: serde_json::Error },

    /// A path parameter was not a well-formed id.
    #[error("{0} is not a valid id")]
    InvalidId(String),

    /// A required field was absent or blank after trimming.
    #[error("{field} is required in request body")]
    MissingField { field: &'static str },

    /// A numeric field or parameter fell below its lower bound.
    #[error("{name} must be a number greater than 0")]
    NonPositive { name: &'static str },

    #[error("{field} must be in the format of YYYY-MM-DD")]
    MalformedDate { field: &'static str },

    #[error("startDate must not be before today")]
    StartDateInPast,

    #[error("endDate must not be before startDate")]
    EndDateBeforeStartDate,

    #[error("workoutTypes must not be empty")]
    MissingWorkoutTypes,

    #[error("workouts must not be empty")]
    MissingWorkouts,

    #[error("Unable to recommend a class to yourself")]
    SelfRecommendation,

    #[error("username and password must be provided")]
    MissingCredentials,

    #[error("type must be forMe, byMe, or all")]
    InvalidRecommendationKind,

    /// Another record already satisfies the uniqueness predicate.
    #[error("{message}")]
    Duplicate { message: String },

    #[error("Unable to find {kind} {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Unauthorized to view this {kind}")]
    Unauthorized { kind: &'static str },

    #[error("Must be the owner of the {kind} to delete it")]
    NotOwner { kind: &'static str },

    /// Represents a failure to query the table.
    #[error("Unable to scan the table: {source}")]
    ScanFailed { source: RusotoError<ScanError> },

    #[error("Unable to get item: {source}")]
    GetFailed { source: RusotoError<GetItemError> },

    /// Represents a failure to persist a record.
    #[error("Unable to save item: {source}")]
    PutFailed { source: RusotoError<PutItemError> },

    #[error("Unable to delete item: {source}")]
    DeleteFailed { source: RusotoError<DeleteItemError> },

    /// A stored item is missing attributes or holds ones we cannot decode.
    #[error("Stored {kind} {id} could not be decoded")]
    CorruptItem { kind: &'static str, id: String },

    #[error("Unable to serialize {what}: {source}")]
    Serialization {
        what: &'static str,
        source: serde_json::Error,
    },

    /// The upstream API could not be reached at all.
    #[error("Unable to reach Peloton: {source}")]
    UpstreamUnreachable { source: reqwest::Error },

    /// The upstream API answered with a non-success status. The body, when
    /// present, is passed through to the caller unchanged.
    #[error("Error communicating with Peloton: {status}")]
    UpstreamStatus { status: u16, body: Option<Bytes> },

    #[error("Unable to parse Peloton response: {source}")]
    MalformedUpstreamBody { source: serde_json::Error },
}
