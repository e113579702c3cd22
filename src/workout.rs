use serde::{Deserialize, Serialize};

/// A snapshot of an upstream class. Workouts are embedded in programs and
/// recommendations rather than stored as records of their own, so the field
/// names follow the upstream wire format.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Workout {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "difficulty_estimate")]
    pub difficulty: f32,
    pub duration: i32,
    pub image_url: String,
    pub instructor_id: String,
    pub instructor_name: String,
    pub original_air_time: i64,
}
