use serde::Serialize;
use warp::reject;

use crate::errors::BackendError;

/// A failed operation plus the context it failed in, carried through warp's
/// rejection machinery until `format_rejection` turns it into an envelope.
#[derive(Debug)]
pub struct Rejection {
    pub(crate) context: Context,
    pub(crate) error: BackendError,
}

impl Rejection {
    pub fn new(context: Context, error: BackendError) -> Self {
        Rejection { context, error }
    }

    pub fn flatten(&self, status: u16) -> FlattenedRejection {
        FlattenedRejection {
            status,
            context: self.context.clone(),
            message: format!("{}", self.error),
        }
    }
}

impl reject::Reject for Rejection {}

/// The error envelope every failure serializes to: a status, the operation
/// it arose in, and one user-facing message.
#[derive(Debug, Serialize)]
pub struct FlattenedRejection {
    pub(crate) status: u16,
    #[serde(flatten)]
    pub(crate) context: Context,
    pub(crate) message: String,
}

/// The envelope reported when warp rejects a query string before any
/// handler runs.
pub(crate) fn invalid_query() -> FlattenedRejection {
    FlattenedRejection {
        status: 400,
        context: Context::Request,
        message: "invalid query string".to_owned(),
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Context {
    Request,
    Login,
    Workouts,
    Filters,
    Categories,
    UserInfo { id: String },
    Bookmark,
    Unbookmark,
    CreateProgram,
    Programs,
    Program { id: String },
    DeleteProgram { id: String },
    CreateChallenge,
    Challenges,
    Challenge { id: String },
    DeleteChallenge { id: String },
    Recommend,
    Recommendations,
    Recommendation { id: String },
    DeleteRecommendation { id: String },
}
