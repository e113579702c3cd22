use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

use crate::creation::{name_conflict_filter, Resource};
use crate::errors::BackendError;
use crate::store::{
    self, binary_attribute, bool_attribute, number_attribute, string_attribute,
    string_set_attribute, Condition, Filter, Item, Value,
};
use crate::workout::Workout;

pub const KIND: &str = "program";

const NAME: &str = "Name";
const DESCRIPTION: &str = "Description";
const PUBLIC: &str = "Public";
const EQUIPMENT_NEEDED: &str = "EquipmentNeeded";
const NUM_WEEKS: &str = "NumWeeks";
const WORKOUTS: &str = "Workouts";
const CREATED_BY: &str = "CreatedBy";
const CREATED_DATE: &str = "CreatedDate";

/// The client-supplied half of a program. Missing fields deserialize to
/// their defaults so the validator can report them individually.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewProgram {
    pub name: String,
    pub description: String,
    pub public: bool,
    pub equipment_needed: Vec<String>,
    pub num_weeks: i32,
    pub workouts: Vec<Vec<Workout>>,
}

/// A user-built workout program: a week-by-week schedule of classes.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub public: bool,
    pub equipment_needed: Vec<String>,
    pub num_weeks: i32,
    pub workouts: Vec<Vec<Workout>>,
    pub created_by: String,
    pub created_date: String,
}

impl Program {
    /// Stamps the server-assigned fields onto a submission. The caller's
    /// identity always overrides anything the client put in the body.
    pub fn new(id: Uuid, created_by: String, created_date: String, new: NewProgram) -> Self {
        Program {
            id,
            name: new.name.trim().to_owned(),
            description: new.description.trim().to_owned(),
            public: new.public,
            equipment_needed: new.equipment_needed,
            num_weeks: new.num_weeks,
            workouts: new.workouts,
            created_by,
            created_date,
        }
    }

    pub fn from_item(item: &Item) -> Result<Self, BackendError> {
        let raw_id = store::get_string(item, store::ID_ATTRIBUTE).unwrap_or_default();
        let corrupt = || BackendError::CorruptItem {
            kind: KIND,
            id: raw_id.clone(),
        };

        let id = Uuid::parse_str(&raw_id).map_err(|_| corrupt())?;

        let workouts = match store::get_binary(item, WORKOUTS) {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|_| corrupt())?,
            None => vec![],
        };

        Ok(Program {
            id,
            name: store::get_string(item, NAME).unwrap_or_default(),
            description: store::get_string(item, DESCRIPTION).unwrap_or_default(),
            public: store::get_bool(item, PUBLIC).unwrap_or_default(),
            equipment_needed: store::get_string_set(item, EQUIPMENT_NEEDED).unwrap_or_default(),
            num_weeks: store::get_integer(item, NUM_WEEKS).unwrap_or_default(),
            workouts,
            created_by: store::get_string(item, CREATED_BY).unwrap_or_default(),
            created_date: store::get_string(item, CREATED_DATE).unwrap_or_default(),
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

impl Resource for Program {
    const KIND: &'static str = KIND;

    fn validate(&self, _today: Date) -> Result<(), BackendError> {
        if self.name.is_empty() {
            return Err(BackendError::MissingField { field: "name" });
        }
        if self.num_weeks < 1 {
            return Err(BackendError::NonPositive { name: "numWeeks" });
        }
        if self.workouts.is_empty() {
            return Err(BackendError::MissingWorkouts);
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
        format!("A program with the name {} already exists", self.name)
    }

    fn to_item(&self) -> Result<Item, BackendError> {
        let workouts =
            serde_json::to_vec(&self.workouts).map_err(|source| BackendError::Serialization {
                what: "workouts",
                source,
            })?;

        let mut item = Item::new();
        item.insert(
            store::ID_ATTRIBUTE.to_owned(),
            string_attribute(self.id.to_string()),
        );
        item.insert(
            store::KIND_ATTRIBUTE.to_owned(),
            string_attribute(KIND),
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
        item.insert(NUM_WEEKS.to_owned(), number_attribute(self.num_weeks));
        item.insert(WORKOUTS.to_owned(), binary_attribute(workouts));
        item.insert(
            CREATED_BY.to_owned(),
            string_attribute(self.created_by.clone()),
        );
        item.insert(
            CREATED_DATE.to_owned(),
            string_attribute(self.created_date.clone()),
        );

        Ok(item)
    }
}

#[cfg(test)]
mod test {
    use time::date;

    use super::*;

    fn program(new: NewProgram) -> Program {
        Program::new(
            Uuid::new_v4(),
            "u1".to_owned(),
            "2021-06-01T00:00:00Z".to_owned(),
            new,
        )
    }

    fn valid() -> NewProgram {
        NewProgram {
            name: "P1".to_owned(),
            num_weeks: 4,
            workouts: vec![vec![Workout::default()]],
            ..NewProgram::default()
        }
    }

    #[test]
    fn a_valid_program_passes() {
        assert!(program(valid()).validate(date!(2021 - 06 - 01)).is_ok());
    }

    #[test]
    fn blank_names_are_rejected() {
        let error = program(NewProgram {
            name: "   ".to_owned(),
            ..valid()
        })
        .validate(date!(2021 - 06 - 01))
        .expect_err("blank name");

        assert_eq!(format!("{}", error), "name is required in request body");
    }

    #[test]
    fn week_counts_start_at_one() {
        let error = program(NewProgram {
            num_weeks: 0,
            ..valid()
        })
        .validate(date!(2021 - 06 - 01))
        .expect_err("zero weeks");

        assert_eq!(
            format!("{}", error),
            "numWeeks must be a number greater than 0"
        );
    }

    #[test]
    fn an_empty_schedule_is_rejected() {
        let error = program(NewProgram {
            workouts: vec![],
            ..valid()
        })
        .validate(date!(2021 - 06 - 01))
        .expect_err("no workouts");

        assert!(matches!(error, BackendError::MissingWorkouts));
    }

    #[test]
    fn items_round_trip() {
        let original = program(valid());

        let decoded =
            Program::from_item(&original.to_item().expect("encode item")).expect("decode item");

        assert_eq!(decoded.id, original.id);
        assert_eq!(decoded.name, original.name);
        assert_eq!(decoded.num_weeks, original.num_weeks);
        assert_eq!(decoded.workouts, original.workouts);
        assert_eq!(decoded.created_by, original.created_by);
        assert_eq!(decoded.created_date, original.created_date);
    }

    #[test]
    fn the_identity_stamp_wins() {
        let subject = program(valid());

        assert_eq!(subject.created_by, "u1");
        assert!(subject.owned_by("u1"));
        assert!(!subject.readable_by("u2"));
    }
}
