//! In-memory read-model store.

use std::{
    collections::HashMap,
    convert::Infallible,
    fmt,
    hash::Hash,
    sync::{Arc, PoisonError, RwLock},
};

use super::{ReadModelStore, RowNotFound, Versioned};

/// Read-model rows in a shared hash map.
///
/// Cloning shares the rows, so a clone handed to the repository and one kept
/// by the query side see the same data.
#[derive(Debug)]
pub struct Store<Id, Row> {
    rows: Arc<RwLock<HashMap<Id, Versioned<Row>>>>,
}

impl<Id, Row> Clone for Store<Id, Row> {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
        }
    }
}

impl<Id, Row> Default for Store<Id, Row> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id, Row> Store<Id, Row> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<Id, Row> Store<Id, Row>
where
    Id: Eq + Hash + fmt::Debug,
    Row: Clone,
{
    /// Fetch a row that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`RowNotFound`] if no row is stored for `id`.
    pub fn require(&self, id: &Id) -> Result<Versioned<Row>, RowNotFound> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| RowNotFound::new(id))
    }

    /// Current row without its version, if present.
    #[must_use]
    pub fn row(&self, id: &Id) -> Option<Row> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|versioned| versioned.row.clone())
    }
}

impl<Id, Row> ReadModelStore<Id, Row> for Store<Id, Row>
where
    Id: Clone + Eq + Hash + Send + Sync,
    Row: Clone + Send + Sync,
{
    type Error = Infallible;

    fn get(&self, id: &Id) -> Result<Option<Versioned<Row>>, Self::Error> {
        Ok(self
            .rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned())
    }

    fn modify<T, F>(&self, id: &Id, f: F) -> Result<T, Self::Error>
    where
        F: FnOnce(&mut Option<Versioned<Row>>) -> T,
    {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        let mut slot = rows.remove(id);
        let result = f(&mut slot);
        if let Some(row) = slot {
            rows.insert(id.clone(), row);
        }
        Ok(result)
    }
}
