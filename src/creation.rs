use time::Date;

use crate::errors::BackendError;
use crate::store::{Condition, Filter, Item, Store, Value};

/// A record that can go through the create-with-uniqueness-guard workflow.
///
/// Each implementation supplies its business rules and the predicate that
/// decides which existing records would conflict with it; the workflow
/// itself is identical across kinds.
pub trait Resource {
    /// The kind discriminator stored alongside the record and used in
    /// user-facing messages.
    const KIND: &'static str;

    /// Applies the field-level and cross-field rules, in order. The first
    /// violated rule is returned; later rules are not evaluated.
    fn validate(&self, today: Date) -> Result<(), BackendError>;

    /// The visibility-scoped predicate a conflicting record would match.
    fn conflict_filter(&self) -> Result<Filter, BackendError>;

    /// The user-facing message reported when a conflict exists.
    fn conflict_message(&self) -> String;

    /// Encodes the record as a stored item.
    fn to_item(&self) -> Result<Item, BackendError>;
}

/// Validates a record, checks the table for conflicts, and persists it.
///
/// The scan and the put are two separate calls with no transaction between
/// them, so two concurrent creations can both pass the conflict check and
/// both write. TODO guard the put with a conditional write on the conflict
/// predicate.
pub async fn create<R: Resource>(
    store: &dyn Store,
    resource: R,
    today: Date,
) -> Result<R, BackendError> {
    resource.validate(today)?;

    let conflicts = store.scan(&resource.conflict_filter()?).await?;
    if !conflicts.is_empty() {
        return Err(BackendError::Duplicate {
            message: resource.conflict_message(),
        });
    }

    store.put(resource.to_item()?).await?;

    Ok(resource)
}

/// The name-uniqueness predicate shared by programs and challenges: a public
/// record's name must be unique among all public records of its kind, a
/// private record's name among its owner's records of that kind.
pub(crate) fn name_conflict_filter(
    kind: &'static str,
    name: &str,
    public: bool,
    created_by: &str,
) -> Filter {
    let mut conditions = vec![
        Condition::new(crate::store::KIND_ATTRIBUTE, Value::S(kind.to_owned())),
        Condition::new("Name", Value::S(name.to_owned())),
    ];

    if public {
        conditions.push(Condition::new("Public", Value::Bool(true)));
    } else {
        conditions.push(Condition::new("CreatedBy", Value::S(created_by.to_owned())));
    }

    Filter::all(conditions)
}
