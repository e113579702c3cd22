use std::sync::Arc;

use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, with_status, Reply};

use crate::errors::BackendError;
use crate::log::{error, Logger};

pub mod admin;
mod handlers;
mod query;
mod rejection;
mod response;

pub use internal::*;

/// The maximum body size to accept. This should be enforced by the HTTP
/// gateway, so on the Rust side it's set to an unreasonably large number.
const MAX_CONTENT_LENGTH: u64 = 2 * 1024 * 1024 * 1024;

pub async fn format_rejection(
    logger: Arc<Logger>,
    rej: reject::Rejection,
) -> Result<Box<dyn Reply>, reject::Rejection> {
    if let Some(r) = rej.find::<rejection::Rejection>() {
        let e = &r.error;
        let status = status_code_for(e);
        error!(logger, "Backend error"; "context" => ?r.context, "error" => ?e, "status" => %status, "message" => %e);

        // Upstream failures that arrived with a body pass it through
        // unchanged, status and all.
        if let BackendError::UpstreamStatus {
            body: Some(body), ..
        } = e
        {
            return Ok(Box::new(response::json_reply(status, &[], body.to_vec())));
        }

        return Ok(Box::new(with_status(
            json(&r.flatten(status.as_u16())),
            status,
        )));
    }

    if rej.find::<reject::InvalidQuery>().is_some() {
        return Ok(Box::new(with_status(
            json(&rejection::invalid_query()),
            StatusCode::BAD_REQUEST,
        )));
    }

    Err(rej)
}

fn status_code_for(e: &BackendError) -> StatusCode {
    use BackendError::*;

    match e {
        MissingIdentity
        | MalformedBody { .. }
        | InvalidId(..)
        | MissingField { .. }
        | NonPositive { .. }
        | MalformedDate { .. }
        | StartDateInPast
        | EndDateBeforeStartDate
        | MissingWorkoutTypes
        | MissingWorkouts
        | SelfRecommendation
        | MissingCredentials
        | InvalidRecommendationKind
        | Duplicate { .. }
        | NotFound { .. } => StatusCode::BAD_REQUEST,
        Unauthorized { .. } | NotOwner { .. } => StatusCode::UNAUTHORIZED,
        UpstreamStatus { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
        ScanFailed { .. }
        | GetFailed { .. }
        | PutFailed { .. }
        | DeleteFailed { .. }
        | CorruptItem { .. }
        | Serialization { .. }
        | UpstreamUnreachable { .. }
        | MalformedUpstreamBody { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

mod internal {
    use bytes::Bytes;
    use warp::filters::BoxedFilter;
    use warp::path::end;
    use warp::path::param as par;
    use warp::Filter;
    use warp::Reply;
    use warp::{delete, get as g, path as p, post, query};

    use super::{handlers, query as q, MAX_CONTENT_LENGTH};
    use crate::environment::Environment;
    use crate::peloton::{FiltersQuery, WorkoutsQuery};

    type Route = BoxedFilter<(Box<dyn Reply>,)>;

    /// The header the hosting layer stamps the caller's identity into.
    const IDENTITY_HEADER: &str = "userid";

    fn identity(
    ) -> impl Filter<Extract = (Option<String>,), Error = warp::Rejection> + Copy {
        warp::header::optional::<String>(IDENTITY_HEADER)
    }

    fn cookie() -> impl Filter<Extract = (Option<String>,), Error = warp::Rejection> + Copy
    {
        warp::header::optional::<String>("cookie")
    }

    fn body() -> impl Filter<Extract = (Bytes,), Error = warp::Rejection> + Clone {
        warp::body::content_length_limit(MAX_CONTENT_LENGTH).and(warp::body::bytes())
    }

    macro_rules! route_filter {
    ($route_variable:ident; $first:expr) => (let $route_variable = $route_variable.and($first););
    ($route_variable:ident; $first:expr, $($rest:expr),+) => (
        let $route_variable = $route_variable.and($first);
        route_filter!($route_variable; $($rest),+);
    )
}

    macro_rules! route {
    ($name:ident => $handler:ident, $route_variable:ident; $($filters:expr),+) => (
        pub fn $name(environment: Environment) -> Route {
            let $route_variable = warp::any().map(move || environment.clone());

            route_filter!($route_variable; $($filters),+);

            $route_variable.and_then(handlers::$handler)
                .boxed()
        }
    );
}

    route!(make_login_route => login, rt; p("login"), end(), post(), body());
    route!(make_workouts_route => workouts, rt; p("workouts"), end(), g(), cookie(), query::<WorkoutsQuery>());
    route!(make_filters_route => filters, rt; p("filters"), end(), g(), cookie(), query::<FiltersQuery>());
    route!(make_categories_route => categories, rt; p("categories"), end(), g());
    route!(make_user_info_route => user_info, rt; p("users"), par::<String>(), end(), g());
    route!(make_bookmark_route => bookmark, rt; p("bookmarks"), end(), post(), cookie(), body());
    route!(make_unbookmark_route => unbookmark, rt; p("bookmarks"), end(), delete(), cookie(), body());
    route!(make_create_program_route => create_program, rt; p("programs"), end(), post(), identity(), body());
    route!(make_programs_route => programs, rt; p("programs"), end(), g(), identity());
    route!(make_program_route => program, rt; p("programs"), par::<String>(), end(), g(), identity());
    route!(make_delete_program_route => delete_program, rt; p("programs"), par::<String>(), end(), delete(), identity());
    route!(make_create_challenge_route => create_challenge, rt; p("challenges"), end(), post(), identity(), body());
    route!(make_challenges_route => challenges, rt; p("challenges"), end(), g(), identity());
    route!(make_challenge_route => challenge, rt; p("challenges"), par::<String>(), end(), g(), identity());
    route!(make_delete_challenge_route => delete_challenge, rt; p("challenges"), par::<String>(), end(), delete(), identity());
    route!(make_recommend_route => recommend, rt; p("recommendations"), end(), post(), identity(), body());
    route!(make_recommendations_route => recommendations, rt; p("recommendations"), end(), g(), identity(), query::<q::RecommendationsQuery>());
    route!(make_recommendation_route => recommendation, rt; p("recommendations"), par::<String>(), end(), g(), identity());
    route!(make_delete_recommendation_route => delete_recommendation, rt; p("recommendations"), par::<String>(), end(), delete(), identity());
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use bytes::Bytes;
    use serde_json::{json, Value};
    use slog::{o, Discard};
    use url::Url;
    use uuid::Uuid;
    use warp::filters::BoxedFilter;
    use warp::http::Response;
    use warp::Filter;

    use super::*;
    use crate::environment::Environment;
    use crate::peloton::Peloton;
    use crate::store::mock::MockStore;

    type App = BoxedFilter<(Box<dyn Reply>,)>;

    fn environment() -> Environment {
        let logger = Arc::new(Logger::root(Discard, o!()));
        let peloton = Arc::new(Peloton::new(
            Url::parse("http://127.0.0.1:9").expect("parse test URL"),
        ));

        Environment::new(logger, Arc::new(MockStore::new()), peloton)
    }

    /// The full main-server route chain, rejections and all.
    fn app(environment: Environment) -> App {
        let logger = environment.logger.clone();

        make_login_route(environment.clone())
            .or(make_workouts_route(environment.clone()))
            .or(make_filters_route(environment.clone()))
            .or(make_categories_route(environment.clone()))
            .or(make_user_info_route(environment.clone()))
            .or(make_bookmark_route(environment.clone()))
            .or(make_unbookmark_route(environment.clone()))
            .or(make_create_program_route(environment.clone()))
            .or(make_programs_route(environment.clone()))
            .or(make_program_route(environment.clone()))
            .or(make_delete_program_route(environment.clone()))
            .or(make_create_challenge_route(environment.clone()))
            .or(make_challenges_route(environment.clone()))
            .or(make_challenge_route(environment.clone()))
            .or(make_delete_challenge_route(environment.clone()))
            .or(make_recommend_route(environment.clone()))
            .or(make_recommendations_route(environment.clone()))
            .or(make_recommendation_route(environment.clone()))
            .or(make_delete_recommendation_route(environment))
            .recover(move |r| format_rejection(logger.clone(), r))
            .map(|reply| Box::new(reply) as Box<dyn Reply>)
            .boxed()
    }

    fn program_body() -> Value {
        json!({
            "name": "P1",
            "numWeeks": 4,
            "workouts": [[{ "id": "w1", "title": "30 min climb" }]],
            "public": false
        })
    }

    fn challenge_body() -> Value {
        json!({
            "name": "C1",
            "difficulty": 5.0,
            "numWorkoutGoal": 10,
            "startDate": "2999-01-01",
            "endDate": "2999-02-01",
            "workoutTypes": ["cycling"],
            "public": false
        })
    }

    fn recommendation_body(recommended_for: &str, workout_id: &str) -> Value {
        json!({
            "recommendedFor": recommended_for,
            "workout": { "id": workout_id, "title": "30 min climb" }
        })
    }

    async fn post(filter: &App, path: &str, user: Option<&str>, body: &Value) -> Response<Bytes> {
        let mut request = warp::test::request().method("POST").path(path).json(body);

        if let Some(user) = user {
            request = request.header("UserID", user);
        }

        request.reply(filter).await
    }

    async fn get(filter: &App, path: &str, user: &str) -> Response<Bytes> {
        warp::test::request()
            .method("GET")
            .path(path)
            .header("UserID", user)
            .reply(filter)
            .await
    }

    async fn delete(filter: &App, path: &str, user: &str) -> Response<Bytes> {
        warp::test::request()
            .method("DELETE")
            .path(path)
            .header("UserID", user)
            .reply(filter)
            .await
    }

    fn parse(response: &Response<Bytes>) -> Value {
        serde_json::from_slice(response.body()).expect("parse response body as JSON")
    }

    #[tokio::test]
    async fn creation_requires_an_identity() {
        let filter = app(environment());

        let response = post(&filter, "/programs", None, &program_body()).await;

        assert_eq!(response.status(), 400);
        let body = parse(&response);
        assert_eq!(body["status"], 400);
        assert_eq!(body["message"], "UserID header is required");
    }

    #[tokio::test]
    async fn blank_identities_are_rejected_too() {
        let filter = app(environment());

        let response = post(&filter, "/programs", Some("   "), &program_body()).await;

        assert_eq!(response.status(), 400);
        assert_eq!(parse(&response)["message"], "UserID header is required");
    }

    #[tokio::test]
    async fn created_programs_echo_back_with_server_fields() {
        let filter = app(environment());

        let response = post(&filter, "/programs", Some("u1"), &program_body()).await;

        assert_eq!(response.status(), 200);
        let body = parse(&response);
        assert_eq!(body["name"], "P1");
        assert_eq!(body["createdBy"], "u1");
        assert!(Uuid::parse_str(body["id"].as_str().expect("id is a string")).is_ok());
        assert_ne!(body["createdDate"], "");
    }

    #[tokio::test]
    async fn creating_and_fetching_round_trips() {
        let filter = app(environment());

        let created = parse(&post(&filter, "/programs", Some("u1"), &program_body()).await);
        let id = created["id"].as_str().expect("id is a string").to_owned();

        let response = get(&filter, &format!("/programs/{}", id), "u1").await;

        assert_eq!(response.status(), 200);
        let fetched = parse(&response);
        assert_eq!(fetched["id"], created["id"]);
        assert_eq!(fetched["name"], "P1");
        assert_eq!(fetched["numWeeks"], 4);
        assert_eq!(fetched["workouts"][0][0]["id"], "w1");
        assert_eq!(fetched["createdBy"], "u1");
        assert_eq!(fetched["createdDate"], created["createdDate"]);
    }

    #[tokio::test]
    async fn private_programs_are_hidden_from_non_owners() {
        let filter = app(environment());

        let created = parse(&post(&filter, "/programs", Some("u1"), &program_body()).await);
        let id = created["id"].as_str().expect("id is a string").to_owned();

        let response = get(&filter, &format!("/programs/{}", id), "u2").await;

        assert_eq!(response.status(), 401);
        assert_eq!(
            parse(&response)["message"],
            "Unauthorized to view this program"
        );
    }

    #[tokio::test]
    async fn public_program_names_are_unique_across_owners() {
        let filter = app(environment());

        let mut body = program_body();
        body["public"] = json!(true);

        assert_eq!(post(&filter, "/programs", Some("u1"), &body).await.status(), 200);

        let response = post(&filter, "/programs", Some("u2"), &body).await;

        assert_eq!(response.status(), 400);
        assert_eq!(
            parse(&response)["message"],
            "A program with the name P1 already exists"
        );
    }

    #[tokio::test]
    async fn private_program_names_are_scoped_per_owner() {
        let filter = app(environment());

        assert_eq!(
            post(&filter, "/programs", Some("u1"), &program_body()).await.status(),
            200
        );

        let repeat = post(&filter, "/programs", Some("u1"), &program_body()).await;
        assert_eq!(repeat.status(), 400);
        assert_eq!(
            parse(&repeat)["message"],
            "A program with the name P1 already exists"
        );

        assert_eq!(
            post(&filter, "/programs", Some("u2"), &program_body()).await.status(),
            200
        );
    }

    #[tokio::test]
    async fn names_are_scoped_by_kind() {
        let filter = app(environment());

        let mut program = program_body();
        program["public"] = json!(true);
        let mut challenge = challenge_body();
        challenge["name"] = json!("P1");
        challenge["public"] = json!(true);

        assert_eq!(post(&filter, "/programs", Some("u1"), &program).await.status(), 200);
        assert_eq!(
            post(&filter, "/challenges", Some("u1"), &challenge).await.status(),
            200
        );
    }

    #[tokio::test]
    async fn listing_starts_empty() {
        let filter = app(environment());

        let response = get(&filter, "/programs", "u1").await;

        assert_eq!(response.status(), 200);
        assert_eq!(parse(&response), json!([]));
    }

    #[tokio::test]
    async fn listings_respect_visibility() {
        let filter = app(environment());

        let mut public = program_body();
        public["name"] = json!("P2");
        public["public"] = json!(true);

        post(&filter, "/programs", Some("u1"), &program_body()).await;
        post(&filter, "/programs", Some("u1"), &public).await;

        let mine = parse(&get(&filter, "/programs", "u1").await);
        assert_eq!(mine.as_array().expect("array").len(), 2);

        let theirs = parse(&get(&filter, "/programs", "u2").await);
        let names: Vec<_> = theirs
            .as_array()
            .expect("array")
            .iter()
            .map(|p| p["name"].as_str().expect("name").to_owned())
            .collect();
        assert_eq!(names, vec!["P2"]);
    }

    #[tokio::test]
    async fn malformed_bodies_are_bad_requests() {
        let filter = app(environment());

        let response = warp::test::request()
            .method("POST")
            .path("/programs")
            .header("UserID", "u1")
            .body("not json")
            .reply(&filter)
            .await;

        assert_eq!(response.status(), 400);
        assert_eq!(parse(&response)["message"], "Invalid request body");
    }

    #[tokio::test]
    async fn challenge_dates_must_be_ordered() {
        let filter = app(environment());

        let mut body = challenge_body();
        body["startDate"] = json!("2999-02-01");
        body["endDate"] = json!("2999-01-01");

        let response = post(&filter, "/challenges", Some("u1"), &body).await;

        assert_eq!(response.status(), 400);
        assert_eq!(
            parse(&response)["message"],
            "endDate must not be before startDate"
        );
    }

    #[tokio::test]
    async fn challenges_may_not_start_in_the_past() {
        let filter = app(environment());

        let mut body = challenge_body();
        body["startDate"] = json!("2000-01-01");
        body["endDate"] = json!("2000-02-01");

        let response = post(&filter, "/challenges", Some("u1"), &body).await;

        assert_eq!(response.status(), 400);
        assert_eq!(parse(&response)["message"], "startDate must not be before today");
    }

    #[tokio::test]
    async fn recommending_to_yourself_is_rejected() {
        let filter = app(environment());

        let response = post(
            &filter,
            "/recommendations",
            Some("u1"),
            &recommendation_body("u1", "w1"),
        )
        .await;

        assert_eq!(response.status(), 400);
        assert_eq!(
            parse(&response)["message"],
            "Unable to recommend a class to yourself"
        );
    }

    #[tokio::test]
    async fn recommendations_are_unique_per_triple() {
        let filter = app(environment());

        let body = recommendation_body("u2", "w1");

        assert_eq!(
            post(&filter, "/recommendations", Some("u1"), &body).await.status(),
            200
        );

        let repeat = post(&filter, "/recommendations", Some("u1"), &body).await;
        assert_eq!(repeat.status(), 400);
        assert_eq!(parse(&repeat)["message"], "That recommendation already exists");

        // A different class to the same person is fine.
        assert_eq!(
            post(
                &filter,
                "/recommendations",
                Some("u1"),
                &recommendation_body("u2", "w2")
            )
            .await
            .status(),
            200
        );
    }

    #[tokio::test]
    async fn recommendation_listings_select_a_direction() {
        let filter = app(environment());

        post(
            &filter,
            "/recommendations",
            Some("u1"),
            &recommendation_body("u2", "w1"),
        )
        .await;

        let for_u2 = parse(&get(&filter, "/recommendations", "u2").await);
        assert_eq!(for_u2.as_array().expect("array").len(), 1);

        let by_u2 = parse(&get(&filter, "/recommendations?type=byme", "u2").await);
        assert_eq!(by_u2, json!([]));

        let by_u1 = parse(&get(&filter, "/recommendations?type=byme", "u1").await);
        assert_eq!(by_u1.as_array().expect("array").len(), 1);

        let all_u1 = parse(&get(&filter, "/recommendations?type=all", "u1").await);
        assert_eq!(all_u1.as_array().expect("array").len(), 1);

        let unknown = get(&filter, "/recommendations?type=sideways", "u1").await;
        assert_eq!(unknown.status(), 400);
        assert_eq!(
            parse(&unknown)["message"],
            "type must be forMe, byMe, or all"
        );
    }

    #[tokio::test]
    async fn deleting_requires_ownership() {
        let filter = app(environment());

        let created = parse(&post(&filter, "/programs", Some("u1"), &program_body()).await);
        let id = created["id"].as_str().expect("id is a string").to_owned();

        let denied = delete(&filter, &format!("/programs/{}", id), "u2").await;
        assert_eq!(denied.status(), 401);
        assert_eq!(
            parse(&denied)["message"],
            "Must be the owner of the program to delete it"
        );

        let allowed = delete(&filter, &format!("/programs/{}", id), "u1").await;
        assert_eq!(allowed.status(), 200);
        assert_eq!(parse(&allowed)["message"], "program deleted");

        let gone = get(&filter, &format!("/programs/{}", id), "u1").await;
        assert_eq!(gone.status(), 400);
    }

    #[tokio::test]
    async fn recipients_may_delete_their_recommendations() {
        let filter = app(environment());

        let created = parse(
            &post(
                &filter,
                "/recommendations",
                Some("u1"),
                &recommendation_body("u2", "w1"),
            )
            .await,
        );
        let id = created["id"].as_str().expect("id is a string").to_owned();

        let response = delete(&filter, &format!("/recommendations/{}", id), "u2").await;

        assert_eq!(response.status(), 200);
        assert_eq!(parse(&response)["message"], "recommendation deleted");
    }

    #[tokio::test]
    async fn deleting_the_missing_reports_not_found() {
        let filter = app(environment());

        let response = delete(
            &filter,
            &format!("/programs/{}", Uuid::new_v4()),
            "u1",
        )
        .await;

        assert_eq!(response.status(), 400);
        let body = parse(&response);
        assert_eq!(body["status"], 400);
        assert!(body["message"]
            .as_str()
            .expect("message is a string")
            .starts_with("Unable to find program"));
    }

    #[tokio::test]
    async fn malformed_ids_are_bad_requests() {
        let filter = app(environment());

        let response = get(&filter, "/programs/not-a-uuid", "u1").await;

        assert_eq!(response.status(), 400);
        assert_eq!(parse(&response)["message"], "not-a-uuid is not a valid id");
    }

    #[tokio::test]
    async fn login_requires_credentials() {
        let filter = app(environment());

        let response = post(
            &filter,
            "/login",
            None,
            &json!({ "username_or_email": "  ", "password": "" }),
        )
        .await;

        assert_eq!(response.status(), 400);
        assert_eq!(
            parse(&response)["message"],
            "username and password must be provided"
        );
    }

    #[tokio::test]
    async fn bookmarking_requires_a_ride_id() {
        let filter = app(environment());

        let response = post(&filter, "/bookmarks", None, &json!({ "ride_id": "" })).await;

        assert_eq!(response.status(), 400);
        assert_eq!(
            parse(&response)["message"],
            "ride_id is required in request body"
        );
    }

    #[tokio::test]
    async fn an_unreachable_upstream_is_a_server_error() {
        // The test environment points at a closed port.
        let filter = app(environment());

        let response = get(&filter, "/categories", "u1").await;

        assert_eq!(response.status(), 500);
    }
}
