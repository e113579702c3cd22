use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;
use warp::{
    http::StatusCode,
    reject,
    reply::{json, with_header, with_status, Reply},
};

use crate::challenge::{self, Challenge, NewChallenge};
use crate::creation;
use crate::environment::Environment;
use crate::errors::BackendError;
use crate::log::debug;
use crate::peloton::{Credentials, FiltersQuery, WorkoutsQuery};
use crate::program::{self, NewProgram, Program};
use crate::recommendation::{self, Direction, NewRecommendation, Recommendation};
use crate::routes::{
    query::RecommendationsQuery,
    rejection::{Context, Rejection},
    response::{json_reply, SuccessResponse},
};
use crate::store::{self, Item};

const SERVER_TIMING_HEADER: &str = "server-timing";
type RouteResult = Result<Box<dyn Reply>, reject::Rejection>;

macro_rules! timed {
    ($($expression:stmt)*) => {
        let start = Instant::now();

        // TODO when `try` blocks are stabilized, we can wrap the body
        // and return the headers even on errors
        let result = { $($expression)* };

        Ok(Box::new(with_header(
            result,
            SERVER_TIMING_HEADER,
            format_server_timing(start.elapsed()),
        )) as Box<dyn Reply>)
    };
}

pub async fn login(environment: Environment, body: Bytes) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::Login, e);

        let mut credentials: Credentials = parse_body(&body).map_err(&error_handler)?;
        credentials.username = credentials.username.trim().to_owned();
        credentials.password = credentials.password.trim().to_owned();

        if credentials.username.is_empty() || credentials.password.is_empty() {
            return Err(error_handler(BackendError::MissingCredentials).into());
        }

        debug!(environment.logger, "Logging in upstream...");
        let reply = environment
            .peloton
            .login(&credentials)
            .await
            .map_err(&error_handler)?;

        json_reply(
            StatusCode::OK,
            &reply.cookies,
            serialize(&reply.body).map_err(&error_handler)?,
        )
    }
}

pub async fn workouts(
    environment: Environment,
    cookie: Option<String>,
    query: WorkoutsQuery,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::Workouts, e);

        debug!(environment.logger, "Browsing the class catalog...");
        let reply = environment
            .peloton
            .workouts(&query, cookie.as_deref())
            .await
            .map_err(&error_handler)?;

        json_reply(
            StatusCode::OK,
            &reply.cookies,
            serialize(&reply.body).map_err(&error_handler)?,
        )
    }
}

pub async fn filters(
    environment: Environment,
    cookie: Option<String>,
    query: FiltersQuery,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::Filters, e);

        let reply = environment
            .peloton
            .filters(&query, cookie.as_deref())
            .await
            .map_err(&error_handler)?;

        json_reply(
            StatusCode::OK,
            &reply.cookies,
            serialize(&reply.body).map_err(&error_handler)?,
        )
    }
}

pub async fn categories(environment: Environment) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::Categories, e);

        let reply = environment
            .peloton
            .categories()
            .await
            .map_err(&error_handler)?;

        json_reply(
            StatusCode::OK,
            &reply.cookies,
            serialize(&reply.body).map_err(&error_handler)?,
        )
    }
}

pub async fn user_info(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::UserInfo { id: id.clone() }, e);

        debug!(environment.logger, "Retrieving user info..."; "id" => &id);
        let reply = environment
            .peloton
            .user_info(id.trim())
            .await
            .map_err(&error_handler)?;

        json_reply(
            StatusCode::OK,
            &reply.cookies,
            serialize(&reply.body).map_err(&error_handler)?,
        )
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BookmarkRequest {
    ride_id: String,
}

pub async fn bookmark(
    environment: Environment,
    cookie: Option<String>,
    body: Bytes,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::Bookmark, e);

        let ride_id = parse_ride_id(&body).map_err(&error_handler)?;

        debug!(environment.logger, "Bookmarking class..."; "ride_id" => &ride_id);
        let reply = environment
            .peloton
            .bookmark(&ride_id, cookie.as_deref())
            .await
            .map_err(&error_handler)?;

        json_reply(StatusCode::OK, &reply.cookies, reply.body.to_vec())
    }
}

pub async fn unbookmark(
    environment: Environment,
    cookie: Option<String>,
    body: Bytes,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::Unbookmark, e);

        let ride_id = parse_ride_id(&body).map_err(&error_handler)?;

        debug!(environment.logger, "Removing bookmark..."; "ride_id" => &ride_id);
        let reply = environment
            .peloton
            .unbookmark(&ride_id, cookie.as_deref())
            .await
            .map_err(&error_handler)?;

        json_reply(StatusCode::OK, &reply.cookies, reply.body.to_vec())
    }
}

pub async fn create_program(
    environment: Environment,
    identity: Option<String>,
    body: Bytes,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::CreateProgram, e);

        let created_by = require_identity(identity).map_err(&error_handler)?;
        let new: NewProgram = parse_body(&body).map_err(&error_handler)?;

        debug!(environment.logger, "Creating program..."; "created_by" => &created_by);

        let now = OffsetDateTime::now_utc();
        let program = Program::new(Uuid::new_v4(), created_by, now.format("%FT%TZ"), new);

        let created = creation::create(environment.store.as_ref(), program, now.date())
            .await
            .map_err(&error_handler)?;

        with_status(json(&created), StatusCode::OK)
    }
}

pub async fn programs(environment: Environment, identity: Option<String>) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::Programs, e);

        let user = require_identity(identity).map_err(&error_handler)?;

        debug!(environment.logger, "Listing programs..."; "user" => &user);
        let items = environment
            .store
            .scan(&Program::visible_to(&user))
            .await
            .map_err(&error_handler)?;

        let programs: Vec<Program> = items
            .iter()
            .map(Program::from_item)
            .collect::<Result<_, _>>()
            .map_err(&error_handler)?;

        json(&programs)
    }
}

pub async fn program(environment: Environment, id: String, identity: Option<String>) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::Program { id: id.clone() }, e);

        let user = require_identity(identity).map_err(&error_handler)?;
        let item = load(&environment, &id, program::KIND)
            .await
            .map_err(&error_handler)?;
        let program = Program::from_item(&item).map_err(&error_handler)?;

        if !program.readable_by(&user) {
            return Err(error_handler(BackendError::Unauthorized { kind: program::KIND }).into());
        }

        with_status(json(&program), StatusCode::OK)
    }
}

pub async fn delete_program(
    environment: Environment,
    id: String,
    identity: Option<String>,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::DeleteProgram { id: id.clone() }, e);

        let user = require_identity(identity).map_err(&error_handler)?;
        let item = load(&environment, &id, program::KIND)
            .await
            .map_err(&error_handler)?;
        let program = Program::from_item(&item).map_err(&error_handler)?;

        if !program.owned_by(&user) {
            return Err(error_handler(BackendError::NotOwner { kind: program::KIND }).into());
        }

        debug!(environment.logger, "Deleting program..."; "id" => &id);
        environment
            .store
            .delete(&program.id)
            .await
            .map_err(&error_handler)?;

        deleted(program::KIND)
    }
}

pub async fn create_challenge(
    environment: Environment,
    identity: Option<String>,
    body: Bytes,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::CreateChallenge, e);

        let created_by = require_identity(identity).map_err(&error_handler)?;
        let new: NewChallenge = parse_body(&body).map_err(&error_handler)?;

        debug!(environment.logger, "Creating challenge..."; "created_by" => &created_by);

        let challenge = Challenge::new(Uuid::new_v4(), created_by, new);

        let created = creation::create(
            environment.store.as_ref(),
            challenge,
            OffsetDateTime::now_utc().date(),
        )
        .await
        .map_err(&error_handler)?;

        with_status(json(&created), StatusCode::OK)
    }
}

pub async fn challenges(environment: Environment, identity: Option<String>) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::Challenges, e);

        let user = require_identity(identity).map_err(&error_handler)?;

        debug!(environment.logger, "Listing challenges..."; "user" => &user);
        let items = environment
            .store
            .scan(&Challenge::visible_to(&user))
            .await
            .map_err(&error_handler)?;

        let challenges: Vec<Challenge> = items
            .iter()
            .map(Challenge::from_item)
            .collect::<Result<_, _>>()
            .map_err(&error_handler)?;

        json(&challenges)
    }
}

pub async fn challenge(
    environment: Environment,
    id: String,
    identity: Option<String>,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::Challenge { id: id.clone() }, e);

        let user = require_identity(identity).map_err(&error_handler)?;
        let item = load(&environment, &id, challenge::KIND)
            .await
            .map_err(&error_handler)?;
        let challenge = Challenge::from_item(&item).map_err(&error_handler)?;

        if !challenge.readable_by(&user) {
            return Err(error_handler(BackendError::Unauthorized {
                kind: challenge::KIND,
            })
            .into());
        }

        with_status(json(&challenge), StatusCode::OK)
    }
}

pub async fn delete_challenge(
    environment: Environment,
    id: String,
    identity: Option<String>,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::DeleteChallenge { id: id.clone() }, e);

        let user = require_identity(identity).map_err(&error_handler)?;
        let item = load(&environment, &id, challenge::KIND)
            .await
            .map_err(&error_handler)?;
        let challenge = Challenge::from_item(&item).map_err(&error_handler)?;

        if !challenge.owned_by(&user) {
            return Err(error_handler(BackendError::NotOwner {
                kind: challenge::KIND,
            })
            .into());
        }

        debug!(environment.logger, "Deleting challenge..."; "id" => &id);
        environment
            .store
            .delete(&challenge.id)
            .await
            .map_err(&error_handler)?;

        deleted(challenge::KIND)
    }
}

pub async fn recommend(
    environment: Environment,
    identity: Option<String>,
    body: Bytes,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::Recommend, e);

        let created_by = require_identity(identity).map_err(&error_handler)?;
        let new: NewRecommendation = parse_body(&body).map_err(&error_handler)?;

        debug!(environment.logger, "Recommending class..."; "created_by" => &created_by);

        let recommendation = Recommendation::new(Uuid::new_v4(), created_by, new);

        let created = creation::create(
            environment.store.as_ref(),
            recommendation,
            OffsetDateTime::now_utc().date(),
        )
        .await
        .map_err(&error_handler)?;

        with_status(json(&created), StatusCode::OK)
    }
}

pub async fn recommendations(
    environment: Environment,
    identity: Option<String>,
    query: RecommendationsQuery,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::Recommendations, e);

        let user = require_identity(identity).map_err(&error_handler)?;
        let direction = Direction::parse(query.direction.as_deref()).map_err(&error_handler)?;

        debug!(environment.logger, "Listing recommendations..."; "user" => &user, "direction" => format!("{:?}", direction));
        let items = environment
            .store
            .scan(&Recommendation::involving(&user, direction))
            .await
            .map_err(&error_handler)?;

        let recommendations: Vec<Recommendation> = items
            .iter()
            .map(Recommendation::from_item)
            .collect::<Result<_, _>>()
            .map_err(&error_handler)?;

        json(&recommendations)
    }
}

pub async fn recommendation(
    environment: Environment,
    id: String,
    identity: Option<String>,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::Recommendation { id: id.clone() }, e);

        let user = require_identity(identity).map_err(&error_handler)?;
        let item = load(&environment, &id, recommendation::KIND)
            .await
            .map_err(&error_handler)?;
        let recommendation = Recommendation::from_item(&item).map_err(&error_handler)?;

        if !recommendation.involves(&user) {
            return Err(error_handler(BackendError::Unauthorized {
                kind: recommendation::KIND,
            })
            .into());
        }

        with_status(json(&recommendation), StatusCode::OK)
    }
}

pub async fn delete_recommendation(
    environment: Environment,
    id: String,
    identity: Option<String>,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::DeleteRecommendation { id: id.clone() }, e);

        let user = require_identity(identity).map_err(&error_handler)?;
        let item = load(&environment, &id, recommendation::KIND)
            .await
            .map_err(&error_handler)?;
        let recommendation = Recommendation::from_item(&item).map_err(&error_handler)?;

        // Either party may remove a recommendation, unlike the owner-only
        // rule programs and challenges follow.
        if !recommendation.involves(&user) {
            return Err(error_handler(BackendError::NotOwner {
                kind: recommendation::KIND,
            })
            .into());
        }

        debug!(environment.logger, "Deleting recommendation..."; "id" => &id);
        environment
            .store
            .delete(&recommendation.id)
            .await
            .map_err(&error_handler)?;

        deleted(recommendation::KIND)
    }
}

/// Loads a record of the expected kind, treating wrong-kind items the same
/// as absent ones.
async fn load(environment: &Environment, id: &str, kind: &'static str) -> Result<Item, BackendError> {
    let parsed =
        Uuid::parse_str(id.trim()).map_err(|_| BackendError::InvalidId(id.to_owned()))?;

    environment
        .store
        .get(&parsed)
        .await?
        .filter(|item| {
            store::get_string(item, store::KIND_ATTRIBUTE).as_deref() == Some(kind)
        })
        .ok_or_else(|| BackendError::NotFound {
            kind,
            id: id.to_owned(),
        })
}

fn require_identity(header: Option<String>) -> Result<String, BackendError> {
    let identity = header.unwrap_or_default();
    let identity = identity.trim();

    if identity.is_empty() {
        Err(BackendError::MissingIdentity)
    } else {
        Ok(identity.to_owned())
    }
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, BackendError> {
    serde_json::from_slice(body).map_err(|source| BackendError::MalformedBody { source })
}

fn parse_ride_id(body: &Bytes) -> Result<String, BackendError> {
    let request: BookmarkRequest = parse_body(body)?;
    let ride_id = request.ride_id.trim();

    if ride_id.is_empty() {
        Err(BackendError::MissingField { field: "ride_id" })
    } else {
        Ok(ride_id.to_owned())
    }
}

fn serialize<T: serde::Serialize>(body: &T) -> Result<Vec<u8>, BackendError> {
    serde_json::to_vec(body).map_err(|source| BackendError::Serialization {
        what: "response",
        source,
    })
}

fn deleted(kind: &str) -> warp::reply::WithStatus<warp::reply::Json> {
    with_status(
        json(&SuccessResponse::Deleted {
            status: StatusCode::OK.as_u16(),
            message: format!("{} deleted", kind),
        }),
        StatusCode::OK,
    )
}

fn format_server_timing(elapsed: Duration) -> String {
    format!("handler;dur={}", elapsed.as_secs_f64() * 1000.0)
}
