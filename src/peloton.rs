use bytes::Bytes;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::BackendError;
use crate::workout::Workout;

const DEFAULT_BASE_URL: &str = "https://api.onepeloton.com";

/// Every request carries the platform header the upstream API expects from
/// its web clients.
const PLATFORM_HEADER: (&str, &str) = ("Peloton-Platform", "web");

/// A successful upstream reply: the reshaped body plus any session cookies
/// the upstream asked to set, which are forwarded back to the caller.
pub struct Upstream<T> {
    pub body: T,
    pub cookies: Vec<String>,
}

/// A client for the upstream fitness API.
pub struct Peloton {
    client: Client,
    base: Url,
}

impl Peloton {
    /// Creates a new instance.
    pub fn new(base: Url) -> Self {
        Self {
            client: Client::new(),
            base,
        }
    }

    pub fn from_env() -> Self {
        use crate::config::get_optional_variable;

        let base = get_optional_variable("BACKEND_UPSTREAM_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());

        Peloton::new(Url::parse(&base).unwrap_or_else(|_| panic!("parse {} as URL", base)))
    }

    /// Logs a caller in and returns the session the upstream created.
    pub async fn login(&self, credentials: &Credentials) -> Result<Upstream<Session>, BackendError> {
        let body = serde_json::to_value(credentials).map_err(|source| {
            BackendError::Serialization {
                what: "login request",
                source,
            }
        })?;

        let (bytes, cookies) = self
            .request(Method::POST, "/auth/login", &[], None, Some(body))
            .await?;

        Ok(Upstream {
            body: parse(&bytes)?,
            cookies,
        })
    }

    /// Browses the archived class catalog, joining instructor names onto the
    /// returned workouts.
    pub async fn workouts(
        &self,
        query: &WorkoutsQuery,
        cookie: Option<&str>,
    ) -> Result<Upstream<WorkoutCatalog>, BackendError> {
        let parameters = workouts_parameters(query)?;

        let (bytes, cookies) = self
            .request(Method::GET, "/api/v2/ride/archived", &parameters, cookie, None)
            .await?;

        let mut catalog: WorkoutCatalog = parse(&bytes)?;
        attach_instructor_names(&mut catalog);

        Ok(Upstream {
            body: catalog,
            cookies,
        })
    }

    pub async fn filters(
        &self,
        query: &FiltersQuery,
        cookie: Option<&str>,
    ) -> Result<Upstream<FilterCatalog>, BackendError> {
        let mut parameters = vec![("library_type", "on_demand".to_owned())];
        if let Some(include) = query.include_icon_images {
            parameters.push(("include_icon_images", include.to_string()));
        }
        if let Some(category) = &query.browse_category {
            parameters.push(("browse_category", category.clone()));
        }

        let (bytes, cookies) = self
            .request(Method::GET, "/api/ride/filters", &parameters, cookie, None)
            .await?;

        Ok(Upstream {
            body: parse(&bytes)?,
            cookies,
        })
    }

    pub async fn categories(&self) -> Result<Upstream<CategoryCatalog>, BackendError> {
        let parameters = vec![("library_type", "on_demand".to_owned())];

        let (bytes, cookies) = self
            .request(Method::GET, "/api/browse_categories", &parameters, None, None)
            .await?;

        Ok(Upstream {
            body: parse(&bytes)?,
            cookies,
        })
    }

    pub async fn user_info(&self, user_id: &str) -> Result<Upstream<UserInfo>, BackendError> {
        let path = format!("/api/user/{}", user_id);

        let (bytes, cookies) = self.request(Method::GET, &path, &[], None, None).await?;

        Ok(Upstream {
            body: parse(&bytes)?,
            cookies,
        })
    }

    /// Bookmarks a class. The upstream body passes through unchanged.
    pub async fn bookmark(
        &self,
        ride_id: &str,
        cookie: Option<&str>,
    ) -> Result<Upstream<Bytes>, BackendError> {
        self.favorites("/api/favorites/create", ride_id, cookie).await
    }

    /// Removes a bookmark. The upstream body passes through unchanged.
    pub async fn unbookmark(
        &self,
        ride_id: &str,
        cookie: Option<&str>,
    ) -> Result<Upstream<Bytes>, BackendError> {
        self.favorites("/api/favorites/delete", ride_id, cookie).await
    }

    async fn favorites(
        &self,
        path: &str,
        ride_id: &str,
        cookie: Option<&str>,
    ) -> Result<Upstream<Bytes>, BackendError> {
        let body = serde_json::json!({ "ride_id": ride_id });

        let (bytes, cookies) = self
            .request(Method::POST, path, &[], cookie, Some(body))
            .await?;

        Ok(Upstream {
            body: bytes,
            cookies,
        })
    }

    /// One round trip to the upstream API. Non-success statuses become
    /// `UpstreamStatus` carrying the upstream body for passthrough.
    async fn request(
        &self,
        method: Method,
        path: &str,
        parameters: &[(&str, String)],
        cookie: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Result<(Bytes, Vec<String>), BackendError> {
        let mut url = self.base.clone();
        url.set_path(path);

        let mut builder = self
            .client
            .request(method, url)
            .header(PLATFORM_HEADER.0, PLATFORM_HEADER.1);

        if !parameters.is_empty() {
            builder = builder.query(parameters);
        }
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder
            .send()
            .await
            .map_err(|source| BackendError::UpstreamUnreachable { source })?;

        let status = response.status();
        let cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok().map(ToOwned::to_owned))
            .collect();

        let bytes = response
            .bytes()
            .await
            .map_err(|source| BackendError::UpstreamUnreachable { source })?;

        if status.as_u16() > 399 {
            let body = if bytes.is_empty() { None } else { Some(bytes) };

            return Err(BackendError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok((bytes, cookies))
    }
}

fn parse<T: DeserializeOwned>(bytes: &Bytes) -> Result<T, BackendError> {
    serde_json::from_slice(bytes).map_err(|source| BackendError::MalformedUpstreamBody { source })
}

/// Login credentials, forwarded to the upstream API verbatim.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Credentials {
    #[serde(rename = "username_or_email")]
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Session {
    pub user_id: String,
    pub session_id: String,
}

/// Catalog browse parameters, forwarded to the upstream API after
/// validation. `category` becomes the upstream's `browse_category`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WorkoutsQuery {
    pub category: Option<String>,
    pub content_format: Option<String>,
    pub is_favorite_ride: Option<bool>,
    pub has_workout: Option<bool>,
    pub duration: Option<u32>,
    pub class_type_id: Option<String>,
    pub instructor_id: Option<String>,
    pub super_genre_id: Option<String>,
    pub limit: Option<u32>,
    pub page: Option<u32>,
    pub sort_by: Option<String>,
    pub desc: Option<bool>,
}

fn workouts_parameters(
    query: &WorkoutsQuery,
) -> Result<Vec<(&'static str, String)>, BackendError> {
    let mut parameters = vec![];

    if let Some(category) = &query.category {
        parameters.push(("browse_category", category.clone()));
    }
    if let Some(format) = &query.content_format {
        parameters.push(("content_format", format.clone()));
    }
    if let Some(favorite) = query.is_favorite_ride {
        parameters.push(("is_favorite_ride", favorite.to_string()));
    }
    if let Some(has_workout) = query.has_workout {
        parameters.push(("has_workout", has_workout.to_string()));
    }
    if let Some(duration) = query.duration {
        if duration < 1 {
            return Err(BackendError::NonPositive { name: "duration" });
        }
        parameters.push(("duration", duration.to_string()));
    }
    if let Some(class_type) = &query.class_type_id {
        parameters.push(("class_type_id", class_type.clone()));
    }
    if let Some(instructor) = &query.instructor_id {
        parameters.push(("instructor_id", instructor.clone()));
    }
    if let Some(genre) = &query.super_genre_id {
        parameters.push(("super_genre_id", genre.clone()));
    }
    if let Some(limit) = query.limit {
        if limit < 1 {
            return Err(BackendError::NonPositive { name: "limit" });
        }
        parameters.push(("limit", limit.to_string()));
    }
    if let Some(page) = query.page {
        parameters.push(("page", page.to_string()));
    }
    if let Some(sort_by) = &query.sort_by {
        parameters.push(("sort_by", sort_by.clone()));
    }
    if let Some(desc) = query.desc {
        parameters.push(("desc", desc.to_string()));
    }

    Ok(parameters)
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct FiltersQuery {
    pub include_icon_images: Option<bool>,
    pub browse_category: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Instructor {
    pub id: String,
    pub name: String,
}

/// One page of the archived class catalog, as the upstream returns it.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkoutCatalog {
    pub data: Vec<Workout>,
    pub page: i32,
    pub total: i32,
    pub count: i32,
    pub page_count: i32,
    pub instructors: Vec<Instructor>,
}

/// The upstream only ships instructor ids on each workout; the client wants
/// names, so they are joined on locally.
fn attach_instructor_names(catalog: &mut WorkoutCatalog) {
    for workout in &mut catalog.data {
        if let Some(instructor) = catalog
            .instructors
            .iter()
            .find(|i| i.id == workout.instructor_id)
        {
            workout.instructor_name = instructor.name.clone();
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterValue {
    pub value: String,
    pub display_name: String,
    pub list_order: i32,
    pub display_image_url: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogFilter {
    pub name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub user_specific: bool,
    pub values: Vec<FilterValue>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SortValue {
    pub sort: String,
    pub desc: bool,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SortOption {
    pub value: SortValue,
    pub display_name: String,
    pub slug: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterCatalog {
    pub filters: Vec<CatalogFilter>,
    pub sorts: Vec<SortOption>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub list_order: i32,
    pub icon_url: String,
    pub portal_image_url: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CategoryCatalog {
    pub browse_categories: Vec<Category>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkoutCount {
    pub name: String,
    pub count: i32,
    pub icon_url: String,
}

/// The subset of the upstream user profile the client consumes.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub location: String,
    pub total_workouts: i32,
    pub workout_counts: Vec<WorkoutCount>,
}
