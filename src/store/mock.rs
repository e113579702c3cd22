use std::collections::HashMap;
use std::sync::RwLock;

use futures::future::{BoxFuture, FutureExt};
use uuid::Uuid;

use crate::errors::BackendError;
use crate::store::{Condition, Filter, Item, Store, Value, ID_ATTRIBUTE};

/// An in-memory store for tests, keyed like the real table.
#[derive(Default)]
pub(crate) struct MockStore {
    pub(crate) items: RwLock<HashMap<String, Item>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap().len()
    }
}

impl Store for MockStore {
    fn scan(&self, filter: &Filter) -> BoxFuture<'_, Result<Vec<Item>, BackendError>> {
        let filter = filter.clone();

        async move {
            let items = self.items.read().unwrap();

            Ok(items
                .values()
                .filter(|item| matches(item, &filter))
                .cloned()
                .collect())
        }
        .boxed()
    }

    fn get(&self, id: &Uuid) -> BoxFuture<'_, Result<Option<Item>, BackendError>> {
        let id = id.to_string();

        async move { Ok(self.items.read().unwrap().get(&id).cloned()) }.boxed()
    }

    fn put(&self, item: Item) -> BoxFuture<'_, Result<(), BackendError>> {
        async move {
            let id = crate::store::get_string(&item, ID_ATTRIBUTE)
                .expect("mock store items must carry an Id attribute");
            self.items.write().unwrap().insert(id, item);

            Ok(())
        }
        .boxed()
    }

    fn delete(&self, id: &Uuid) -> BoxFuture<'_, Result<(), BackendError>> {
        let id = id.to_string();

        async move {
            self.items.write().unwrap().remove(&id);

            Ok(())
        }
        .boxed()
    }
}

/// Structural equivalent of the filter expressions the real store renders.
pub(crate) fn matches(item: &Item, filter: &Filter) -> bool {
    let required = filter.all.iter().all(|c| holds(item, c));
    let alternatives = filter.any.is_empty() || filter.any.iter().any(|c| holds(item, c));

    required && alternatives
}

fn holds(item: &Item, condition: &Condition) -> bool {
    let attribute = match item.get(condition.attribute) {
        Some(attribute) => attribute,
        None => return false,
    };

    match &condition.value {
        Value::S(s) => attribute.s.as_deref() == Some(s),
        Value::Bool(b) => attribute.bool == Some(*b),
        Value::B(b) => attribute.b.as_deref() == Some(b.as_slice()),
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;
    use crate::store::{bool_attribute, string_attribute};

    fn item(name: &str, public: bool, owner: &str) -> Item {
        let mut item = Item::new();
        item.insert("Name".to_owned(), string_attribute(name));
        item.insert("Public".to_owned(), bool_attribute(public));
        item.insert("CreatedBy".to_owned(), string_attribute(owner));
        item
    }

    #[test]
    fn every_required_condition_must_hold() {
        let subject = item("P1", true, "u1");

        let filter = Filter::all(vec![
            Condition::new("Name", Value::S("P1".to_owned())),
            Condition::new("Public", Value::Bool(false)),
        ]);

        assert!(!matches(&subject, &filter));
    }

    #[test]
    fn missing_attributes_never_match() {
        let subject = Item::new();

        let filter = Filter::all(vec![Condition::new("Name", Value::S("P1".to_owned()))]);

        assert!(!matches(&subject, &filter));
    }

    proptest! {
        /// A filter with alternatives agrees with evaluating the required
        /// and alternative halves separately, whatever the item contents.
        #[test]
        fn alternatives_are_a_disjunction(
            name in "[a-c]{1,2}",
            owner in "[a-c]{1,2}",
            public in any::<bool>(),
            want_name in "[a-c]{1,2}",
            want_owner in "[a-c]{1,2}",
            want_public in any::<bool>(),
        ) {
            let subject = item(&name, public, &owner);
            let required = vec![Condition::new("Name", Value::S(want_name))];
            let alternatives = vec![
                Condition::new("Public", Value::Bool(want_public)),
                Condition::new("CreatedBy", Value::S(want_owner)),
            ];

            let combined = matches(
                &subject,
                &Filter::new(required.clone(), alternatives.clone()),
            );
            let by_parts = matches(&subject, &Filter::all(required))
                && alternatives
                    .iter()
                    .any(|c| matches(&subject, &Filter::all(vec![c.clone()])));

            prop_assert_eq!(combined, by_parts);
        }
    }
}
