use serde::Deserialize;

/// Query parameters accepted by the recommendation listing.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RecommendationsQuery {
    #[serde(rename = "type")]
    pub direction: Option<String>,
}
