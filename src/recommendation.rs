use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

use crate::creation::Resource;
use crate::errors::BackendError;
use crate::store::{
    self, binary_attribute, string_attribute, Condition, Filter, Item, Value,
};
use crate::workout::Workout;

pub const KIND: &str = "recommendation";

const CREATED_BY: &str = "CreatedBy";
const RECOMMENDED_FOR: &str = "RecommendedFor";
const WORKOUT: &str = "Workout";

/// Which side of a recommendation a listing should select.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Direction {
    ForMe,
    ByMe,
    All,
}

impl Direction {
    /// Parses the `type` query parameter. An absent or blank value selects
    /// recommendations made for the caller.
    pub fn parse(raw: Option<&str>) -> Result<Self, BackendError> {
        let normalized = raw.unwrap_or("").trim().to_lowercase();

        match normalized.as_str() {
            "" | "forme" => Ok(Direction::ForMe),
            "byme" => Ok(Direction::ByMe),
            "all" => Ok(Direction::All),
            _ => Err(BackendError::InvalidRecommendationKind),
        }
    }
}

/// The client-supplied half of a recommendation.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewRecommendation {
    pub recommended_for: String,
    pub workout: Workout,
}

/// One user recommending a class to another.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: Uuid,
    pub created_by: String,
    pub recommended_for: String,
    pub workout: Workout,
}

impl Recommendation {
    pub fn new(id: Uuid, created_by: String, new: NewRecommendation) -> Self {
        Recommendation {
            id,
            created_by,
            recommended_for: new.recommended_for.trim().to_owned(),
            workout: new.workout,
        }
    }

    pub fn from_item(item: &Item) -> Result<Self, BackendError> {
        let raw_id = store::get_string(item, store::ID_ATTRIBUTE).unwrap_or_default();
        let corrupt = || BackendError::CorruptItem {
            kind: KIND,
            id: raw_id.clone(),
        };

        let id = Uuid::parse_str(&raw_id).map_err(|_| corrupt())?;

        let workout = match store::get_binary(item, WORKOUT) {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|_| corrupt())?,
            None => Workout::default(),
        };

        Ok(Recommendation {
            id,
            created_by: store::get_string(item, CREATED_BY).unwrap_or_default(),
            recommended_for: store::get_string(item, RECOMMENDED_FOR).unwrap_or_default(),
            workout,
        })
    }

    /// The predicate for listing the caller's recommendations in the given
    /// direction.
    pub fn involving(user: &str, direction: Direction) -> Filter {
        let kind = Condition::new(store::KIND_ATTRIBUTE, Value::S(KIND.to_owned()));
        let for_me = Condition::new(RECOMMENDED_FOR, Value::S(user.to_owned()));
        let by_me = Condition::new(CREATED_BY, Value::S(user.to_owned()));

        match direction {
            Direction::ForMe => Filter::all(vec![kind, for_me]),
            Direction::ByMe => Filter::all(vec![kind, by_me]),
            Direction::All => Filter::new(vec![kind], vec![for_me, by_me]),
        }
    }

    /// Both parties to a recommendation may read it — and, unlike programs
    /// and challenges, the recipient may also delete it.
    pub fn involves(&self, user: &str) -> bool {
        self.created_by == user || self.recommended_for == user
    }
}

impl Resource for Recommendation {
    const KIND: &'static str = KIND;

    fn validate(&self, _today: Date) -> Result<(), BackendError> {
        if self.recommended_for.is_empty() {
            return Err(BackendError::MissingField {
                field: "recommendedFor",
            });
        }
        if self.recommended_for == self.created_by {
            return Err(BackendError::SelfRecommendation);
        }

        Ok(())
    }

    fn conflict_filter(&self) -> Result<Filter, BackendError> {
        let workout =
            serde_json::to_vec(&self.workout).map_err(|source| BackendError::Serialization {
                what: "workout",
                source,
            })?;

        Ok(Filter::all(vec![
            Condition::new(store::KIND_ATTRIBUTE, Value::S(KIND.to_owned())),
            Condition::new(CREATED_BY, Value::S(self.created_by.clone())),
            Condition::new(RECOMMENDED_FOR, Value::S(self.recommended_for.clone())),
            Condition::new(WORKOUT, Value::B(workout)),
        ]))
    }

    fn conflict_message(&self) -> String {
        "That recommendation already exists".to_owned()
    }

    fn to_item(&self) -> Result<Item, BackendError> {
        let workout =
            serde_json::to_vec(&self.workout).map_err(|source| BackendError::Serialization {
                what: "workout",
                source,
            })?;

        let mut item = Item::new();
        item.insert(
            store::ID_ATTRIBUTE.to_owned(),
            string_attribute(self.id.to_string()),
        );
        item.insert(store::KIND_ATTRIBUTE.to_owned(), string_attribute(KIND));
        item.insert(
            CREATED_BY.to_owned(),
            string_attribute(self.created_by.clone()),
        );
        item.insert(
            RECOMMENDED_FOR.to_owned(),
            string_attribute(self.recommended_for.clone()),
        );
        item.insert(WORKOUT.to_owned(), binary_attribute(workout));

        Ok(item)
    }
}
