use std::sync::Arc;

use slog::Logger;

use crate::peloton::Peloton;
use crate::store::Store;

/// Everything a route handler needs, constructed once in `main` and cloned
/// into each route.
#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub store: Arc<dyn Store>,
    pub peloton: Arc<Peloton>,
}

impl Environment {
    pub fn new(logger: Arc<Logger>, store: Arc<dyn Store>, peloton: Arc<Peloton>) -> Self {
        Self {
            logger,
            store,
            peloton,
        }
    }
}
