use std::collections::HashMap;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use rusoto_dynamodb::{
    AttributeValue, DeleteItemInput, DynamoDb, DynamoDbClient, GetItemInput, PutItemInput,
    ScanInput,
};
use uuid::Uuid;

use crate::errors::BackendError;

#[cfg(test)]
pub(crate) mod mock;

/// The partition key every record is stored under.
pub const ID_ATTRIBUTE: &str = "Id";

/// Discriminates record kinds within the single table.
pub const KIND_ATTRIBUTE: &str = "Kind";

/// A single stored record, as the table represents it.
pub type Item = HashMap<String, AttributeValue>;

/// A comparand in a filter condition.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    S(String),
    Bool(bool),
    B(Vec<u8>),
}

/// An equality test against a named attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub attribute: &'static str,
    pub value: Value,
}

impl Condition {
    pub fn new(attribute: &'static str, value: Value) -> Self {
        Condition { attribute, value }
    }
}

/// A scan predicate. Every condition in `all` must hold; at least one
/// condition in `any` must hold unless `any` is empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    pub all: Vec<Condition>,
    pub any: Vec<Condition>,
}

impl Filter {
    pub fn all(conditions: Vec<Condition>) -> Self {
        Filter {
            all: conditions,
            any: vec![],
        }
    }

    pub fn new(all: Vec<Condition>, any: Vec<Condition>) -> Self {
        Filter { all, any }
    }
}

pub trait Store: Send + Sync {
    /// Returns every item matching the filter.
    fn scan(&self, filter: &Filter) -> BoxFuture<'_, Result<Vec<Item>, BackendError>>;

    /// Loads the item stored under the given id, if any.
    fn get(&self, id: &Uuid) -> BoxFuture<'_, Result<Option<Item>, BackendError>>;

    /// Persists the given item under its `Id` attribute.
    fn put(&self, item: Item) -> BoxFuture<'_, Result<(), BackendError>>;

    /// Deletes the item stored under the given id.
    fn delete(&self, id: &Uuid) -> BoxFuture<'_, Result<(), BackendError>>;
}

/// A store backed by a single DynamoDB table.
pub struct DynamoStore {
    client: DynamoDbClient,
    table: String,
}

impl DynamoStore {
    /// Creates a new instance.
    pub fn new(client: DynamoDbClient, table: String) -> Self {
        Self { client, table }
    }

    pub fn from_env() -> Result<Self, rusoto_core::request::TlsError> {
        use rusoto_core::request::HttpClient;
        use rusoto_core::Region;
        use rusoto_credential::StaticProvider;

        use crate::config::{get_optional_variable, get_variable};

        let access_key = get_variable("BACKEND_TABLE_ACCESS_KEY");
        let secret_access_key = get_variable("BACKEND_TABLE_SECRET_ACCESS_KEY");

        let name = get_variable("BACKEND_TABLE_REGION");
        let region = match get_optional_variable("BACKEND_TABLE_ENDPOINT") {
            Some(endpoint) => Region::Custom { name, endpoint },
            None => name
                .parse()
                .unwrap_or_else(|_| panic!("parse {} as region", name)),
        };

        let client = DynamoDbClient::new_with(
            HttpClient::new()?,
            StaticProvider::new_minimal(access_key, secret_access_key),
            region,
        );

        Ok(DynamoStore::new(client, get_variable("BACKEND_TABLE_NAME")))
    }
}

impl Store for DynamoStore {
    fn scan(&self, filter: &Filter) -> BoxFuture<'_, Result<Vec<Item>, BackendError>> {
        scan(self, filter.clone()).boxed()
    }

    fn get(&self, id: &Uuid) -> BoxFuture<'_, Result<Option<Item>, BackendError>> {
        get(self, *id).boxed()
    }

    fn put(&self, item: Item) -> BoxFuture<'_, Result<(), BackendError>> {
        put(self, item).boxed()
    }

    fn delete(&self, id: &Uuid) -> BoxFuture<'_, Result<(), BackendError>> {
        delete(self, *id).boxed()
    }
}

async fn scan(store: &DynamoStore, filter: Filter) -> Result<Vec<Item>, BackendError> {
    let (expression, names, values) = render_filter(&filter);

    let input = ScanInput {
        table_name: store.table.clone(),
        filter_expression: Some(expression),
        expression_attribute_names: Some(names),
        expression_attribute_values: Some(values),
        ..Default::default()
    };

    let output = store
        .client
        .scan(input)
        .await
        .map_err(|source| BackendError::ScanFailed { source })?;

    Ok(output.items.unwrap_or_default())
}

async fn get(store: &DynamoStore, id: Uuid) -> Result<Option<Item>, BackendError> {
    let input = GetItemInput {
        table_name: store.table.clone(),
        key: key_for(&id),
        ..Default::default()
    };

    let output = store
        .client
        .get_item(input)
        .await
        .map_err(|source| BackendError::GetFailed { source })?;

    Ok(output.item.filter(|item| !item.is_empty()))
}

async fn put(store: &DynamoStore, item: Item) -> Result<(), BackendError> {
    let input = PutItemInput {
        table_name: store.table.clone(),
        item,
        ..Default::default()
    };

    store
        .client
        .put_item(input)
        .await
        .map(|_| ())
        .map_err(|source| BackendError::PutFailed { source })
}

async fn delete(store: &DynamoStore, id: Uuid) -> Result<(), BackendError> {
    let input = DeleteItemInput {
        table_name: store.table.clone(),
        key: key_for(&id),
        ..Default::default()
    };

    store
        .client
        .delete_item(input)
        .await
        .map(|_| ())
        .map_err(|source| BackendError::DeleteFailed { source })
}

fn key_for(id: &Uuid) -> Item {
    let mut key = Item::new();
    key.insert(ID_ATTRIBUTE.to_owned(), string_attribute(id.to_string()));
    key
}

/// Renders a filter as a DynamoDB filter expression with placeholder maps.
/// Attribute names always go through `ExpressionAttributeNames` since several
/// of ours (`Name`, `Public`) are reserved words.
fn render_filter(filter: &Filter) -> (String, HashMap<String, String>, Item) {
    let mut names = HashMap::new();
    let mut values = Item::new();
    let mut parts = vec![];
    let mut alternatives = vec![];

    for (index, condition) in filter.all.iter().chain(filter.any.iter()).enumerate() {
        names.insert(format!("#a{}", index), condition.attribute.to_owned());
        values.insert(format!(":v{}", index), attribute_for(&condition.value));

        let rendered = format!("#a{} = :v{}", index, index);
        if index < filter.all.len() {
            parts.push(rendered);
        } else {
            alternatives.push(rendered);
        }
    }

    if !alternatives.is_empty() {
        parts.push(format!("({})", alternatives.join(" or ")));
    }

    (parts.join(" and "), names, values)
}

fn attribute_for(value: &Value) -> AttributeValue {
    match value {
        Value::S(s) => string_attribute(s.clone()),
        Value::Bool(b) => bool_attribute(*b),
        Value::B(b) => binary_attribute(b.clone()),
    }
}

pub fn string_attribute(value: impl Into<String>) -> AttributeValue {
    AttributeValue {
        s: Some(value.into()),
        ..Default::default()
    }
}

pub fn bool_attribute(value: bool) -> AttributeValue {
    AttributeValue {
        bool: Some(value),
        ..Default::default()
    }
}

pub fn number_attribute(value: impl ToString) -> AttributeValue {
    AttributeValue {
        n: Some(value.to_string()),
        ..Default::default()
    }
}

pub fn binary_attribute(value: Vec<u8>) -> AttributeValue {
    AttributeValue {
        b: Some(Bytes::from(value)),
        ..Default::default()
    }
}

pub fn string_set_attribute(values: Vec<String>) -> AttributeValue {
    AttributeValue {
        ss: Some(values),
        ..Default::default()
    }
}

pub fn get_string(item: &Item, name: &str) -> Option<String> {
    item.get(name).and_then(|a| a.s.clone())
}

pub fn get_bool(item: &Item, name: &str) -> Option<bool> {
    item.get(name).and_then(|a| a.bool)
}

pub fn get_integer(item: &Item, name: &str) -> Option<i32> {
    item.get(name)
        .and_then(|a| a.n.as_ref())
        .and_then(|n| n.parse().ok())
}

pub fn get_float(item: &Item, name: &str) -> Option<f32> {
    item.get(name)
        .and_then(|a| a.n.as_ref())
        .and_then(|n| n.parse().ok())
}

pub fn get_binary(item: &Item, name: &str) -> Option<Bytes> {
    item.get(name).and_then(|a| a.b.clone())
}

pub fn get_string_set(item: &Item, name: &str) -> Option<Vec<String>> {
    item.get(name).and_then(|a| a.ss.clone())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn render_joins_required_conditions_with_and() {
        let filter = Filter::all(vec![
            Condition::new("Name", Value::S("P1".to_owned())),
            Condition::new("Public", Value::Bool(true)),
        ]);

        let (expression, names, values) = render_filter(&filter);

        assert_eq!(expression, "#a0 = :v0 and #a1 = :v1");
        assert_eq!(names["#a0"], "Name");
        assert_eq!(names["#a1"], "Public");
        assert_eq!(values[":v0"].s.as_deref(), Some("P1"));
        assert_eq!(values[":v1"].bool, Some(true));
    }

    #[test]
    fn render_parenthesizes_alternatives() {
        let filter = Filter::new(
            vec![Condition::new("Kind", Value::S("program".to_owned()))],
            vec![
                Condition::new("Public", Value::Bool(true)),
                Condition::new("CreatedBy", Value::S("u1".to_owned())),
            ],
        );

        let (expression, names, ..) = render_filter(&filter);

        assert_eq!(expression, "#a0 = :v0 and (#a1 = :v1 or #a2 = :v2)");
        assert_eq!(names["#a1"], "Public");
        assert_eq!(names["#a2"], "CreatedBy");
    }
}
