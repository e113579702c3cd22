use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

use crate::creation::{name_conflict_filter, Resource};
use crate::errors::BackendError;
use crate::store::{
    self, bool_attribute, number_attribute, string_attribute, string_set_attribute, Condition,
    Filter, Item, Value,
};

pub const KIND: &str = "challenge";

/// The calendar format challenge dates arrive in.
const DATE_FORMAT: &str = "%F";

const NAME: &str = "Name";
const DESCRIPTION: &str = "Description";
const PUBLIC: &str = "Public";
const EQUIPMENT_NEEDED: &str = "EquipmentNeeded";
const DIFFICULTY: &str = "Difficulty";
const START_DATE: &str = "StartDate";
const END_DATE: &str = "EndDate";
const NUM_WORKOUT_GOAL: &str = "NumWorkoutGoal";
const WORKOUT_TYPES: &str = "WorkoutTypes";
const CREATED_BY: &str = "CreatedBy";

/// The client-supplied half of a challenge.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewChallenge {
    pub name: String,
    pub description: String,
    pub public: bool,
    pub equipment_needed: Vec<String>,
    pub difficulty: f32,
    pub start_date: String,
    pub end_date: String,
    pub num_workout_goal: i32,
    pub workout_types: Vec<String>,
}

/// A time-boxed workout challenge with a goal count.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: Uuid,
    pub created_by: String,
    pub name: String,
    pub description: String,
    pub public: bool,
    pub equipment_needed: Vec<String>,
    pub difficulty: f32,
    pub start_date: String,
    pub end_date: String,
    pub num_workout_goal: i32,
    pub workout_types: Vec<String>,
}

impl Challenge {
    pub fn new(id: Uuid, created_by: String, new: NewChallenge) -> Self {
        Challenge {
            id,
            created_by,
            name: new.name.trim().to_owned(),
            description: new.description.trim().to_owned(),
            public: new.public,
            equipment_needed: new.equipment_needed,
            difficulty: new.difficulty,
            start_date: new.start_date.trim().to_owned(),
            end_date: new.end_date.trim().to_owned(),
            num_workout_goal: new.num_workout_goal,
            workout_types: new.workout_types,
        }
    }

    pub fn from_item(item: &Item) -> Result<Self, BackendError> {
        let raw_id = store::get_string(item, store::ID_ATTRIBUTE).unwrap_or_default();
        let id = Uuid::parse_str(&raw_id).map_err(|_| BackendError::CorruptItem {
            kind: KIND,
            id: raw_id,
        })?;

        Ok(Challenge {
            id,
            created_by: store::get_string(item, CREATED_BY).unwrap_or_default(),
            name: store::get_string(item, NAME).unwrap_or_default(),
            description: store::get_string(item, DESCRIPTION).unwrap_or_default(),
            public: store::get_bool(item, PUBLIC).unwrap_or_default(),
            equipment_needed: store::get_string_set(item, EQUIPMENT_NEEDED).unwrap_or_default(),
            difficulty: store::get_float(item, DIFFICULTY).unwrap_or_default(),
            start_date: store::get_string(item, START_DATE).unwrap_or_default(),
            end_date: store::get_string(item, END_DATE).unwrap_or_default(),
            num_workout_goal: store::get_integer(item, NUM_WORKOUT_GOAL).unwrap_or_default(),
            workout_types: store::get_string_set(item, WORKOUT_TYPES).unwrap_or_default(),
        })
    }

    /// The predicate for listing: everything public plus the caller's own.
    pub fn visible_to(user: &str) -> Filter {
        Filter::new(
            vec![Condition::new(
                store::KIND_ATTRIBUTE,
                Value::S(KIND.to_owned()),
            )],
            vec![
                Condition::new(PUBLIC, Value::Bool(true)),
                Condition::new(CREATED_BY, Value::S(user.to_owned())),
            ],
        )
    }

    pub fn readable_by(&self, user: &str) -> bool {
        self.public || self.created_by == user
    }

    pub fn owned_by(&self, user: &str) -> bool {
        self.created_by == user
    }
}

impl Resource for Challenge {
    const KIND: &'static str = KIND;

    fn validate(&self, today: Date) -> Result<(), BackendError> {
        if self.name.is_empty() {
            return Err(BackendError::MissingField { field: "name" });
        }
        if self.difficulty <= 0.0 {
            return Err(BackendError::NonPositive { name: "difficulty" });
        }
        if self.num_workout_goal < 1 {
            return Err(BackendError::NonPositive {
                name: "numWorkoutGoal",
            });
        }

        if self.start_date.is_empty() {
            return Err(BackendError::MissingField { field: "startDate" });
        }
        let start = Date::parse(&self.start_date, DATE_FORMAT)
            .map_err(|_| BackendError::MalformedDate { field: "startDate" })?;
        if start < today {
            return Err(BackendError::StartDateInPast);
        }

        if self.end_date.is_empty() {
            return Err(BackendError::MissingField { field: "endDate" });
        }
        let end = Date::parse(&self.end_date, DATE_FORMAT)
            .map_err(|_| BackendError::MalformedDate { field: "endDate" })?;
        if end < start {
            return Err(BackendError::EndDateBeforeStartDate);
        }

        if self.workout_types.is_empty() {
            return Err(BackendError::MissingWorkoutTypes);
        }

        Ok(())
    }

    fn conflict_filter(&self) -> Result<Filter, BackendError> {
        Ok(name_conflict_filter(
            KIND,
            &self.name,
            self.public,
            &self.created_by,
        ))
    }

    fn conflict_message(&self) -> String {
        format!("A challenge with the name {} already exists", self.name)
    }

    fn to_item(&self) -> Result<Item, BackendError> {
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
        item.insert(NAME.to_owned(), string_attribute(self.name.clone()));
        item.insert(
            DESCRIPTION.to_owned(),
            string_attribute(self.description.clone()),
        );
        item.insert(PUBLIC.to_owned(), bool_attribute(self.public));
        item.insert(
            EQUIPMENT_NEEDED.to_owned(),
            string_set_attribute(self.equipment_needed.clone()),
        );
        item.insert(DIFFICULTY.to_owned(), number_attribute(self.difficulty));
        item.insert(
            START_DATE.to_owned(),
            string_attribute(self.start_date.clone()),
        );
        item.insert(END_DATE.to_owned(), string_attribute(self.end_date.clone()));
        item.insert(
            NUM_WORKOUT_GOAL.to_owned(),
            number_attribute(self.num_workout_goal),
        );
        item.insert(
            WORKOUT_TYPES.to_owned(),
            string_set_attribute(self.workout_types.clone()),
        );

        Ok(item)
    }
}
