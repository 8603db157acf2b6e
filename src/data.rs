// Shared record collection with change notification

use crate::csv_reader::CsvData;
use crate::error::SeriesError;
use crate::value::Value;
use anyhow::{anyhow, Result};
use serde_json::Value as JsonValue;
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// What happened to a data collection. Indices refer to the collection
/// after the change, except for `Removed`, which refers to it before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Inserted { index: usize, count: usize },
    Removed { index: usize, count: usize },
    /// `removed` records at `index` were replaced by `inserted` new ones.
    Spliced {
        index: usize,
        removed: usize,
        inserted: usize,
    },
    Replaced { index: usize },
    Reset,
}

/// Receives change notifications from a `Data` collection.
pub trait DataObserver {
    fn data_changed(&self, data: &Data, change: Change) -> Result<(), SeriesError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

struct Inner {
    records: RefCell<Vec<Value>>,
    observers: RefCell<Vec<(SubscriptionId, Weak<dyn DataObserver>)>>,
    next_id: Cell<u64>,
}

/// Shared, mutable, ordered sequence of records.
///
/// Cloning a `Data` clones the handle, not the records; every clone observes
/// the same sequence. Mutations notify observers before returning.
#[derive(Clone)]
pub struct Data {
    inner: Rc<Inner>,
}

impl Default for Data {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.records.borrow().iter()).finish()
    }
}

impl From<Vec<Value>> for Data {
    fn from(records: Vec<Value>) -> Self {
        Self::new(records)
    }
}

impl Data {
    pub fn new(records: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(Inner {
                records: RefCell::new(records),
                observers: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Create Data from a JSON array of records
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let array = value
            .as_array()
            .ok_or_else(|| anyhow!("Input data must be a JSON array"))?;

        Ok(Self::new(array.iter().cloned().map(Value::from).collect()))
    }

    /// Create Data from parsed CSV, one object record per row.
    /// Finite numeric cells become numbers and empty cells become null.
    /// Cells such as `NaN` or `inf` stay strings.
    pub fn from_csv(csv: CsvData) -> Self {
        let records = csv
            .rows
            .into_iter()
            .map(|row| {
                Value::object(csv.headers.iter().zip(row).map(|(header, cell)| {
                    let value = if cell.trim().is_empty() {
                        Value::Null
                    } else if let Some(n) = cell.trim().parse::<f64>().ok().filter(|n| n.is_finite()) {
                        Value::Number(n)
                    } else {
                        Value::String(cell)
                    };
                    (header.clone(), value)
                }))
            })
            .collect();
        Self::new(records)
    }

    /// Identity comparison: true when both handles share one sequence.
    pub fn ptr_eq(&self, other: &Data) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn len(&self) -> usize {
        self.inner.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.records.borrow().get(index).cloned()
    }

    /// Borrow the records. Must not be held across a mutation.
    pub fn records(&self) -> Ref<'_, Vec<Value>> {
        self.inner.records.borrow()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.records.borrow().clone()
    }

    pub fn subscribe(&self, observer: Weak<dyn DataObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);
        self.inner.observers.borrow_mut().push((id, observer));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner
            .observers
            .borrow_mut()
            .retain(|(existing, _)| *existing != id);
    }

    pub fn observer_count(&self) -> usize {
        self.inner
            .observers
            .borrow()
            .iter()
            .filter(|(_, o)| o.strong_count() > 0)
            .count()
    }

    /// Every live observer is notified; the first error is returned.
    fn notify(&self, change: Change) -> Result<(), SeriesError> {
        let observers: Vec<Weak<dyn DataObserver>> = {
            let mut list = self.inner.observers.borrow_mut();
            list.retain(|(_, o)| o.strong_count() > 0);
            list.iter().map(|(_, o)| o.clone()).collect()
        };

        let mut first_error = None;
        for observer in observers.iter().filter_map(Weak::upgrade) {
            if let Err(e) = observer.data_changed(self, change) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn check_index(&self, index: usize, len: usize) -> Result<(), SeriesError> {
        if index > len {
            return Err(SeriesError::OutOfBounds { index, len });
        }
        Ok(())
    }

    pub fn push(&self, record: Value) -> Result<(), SeriesError> {
        let index = {
            let mut records = self.inner.records.borrow_mut();
            records.push(record);
            records.len() - 1
        };
        self.notify(Change::Inserted { index, count: 1 })
    }

    pub fn extend<I: IntoIterator<Item = Value>>(&self, items: I) -> Result<(), SeriesError> {
        let (index, count) = {
            let mut records = self.inner.records.borrow_mut();
            let index = records.len();
            records.extend(items);
            (index, records.len() - index)
        };
        if count == 0 {
            return Ok(());
        }
        self.notify(Change::Inserted { index, count })
    }

    pub fn insert(&self, index: usize, record: Value) -> Result<(), SeriesError> {
        self.check_index(index, self.len())?;
        self.inner.records.borrow_mut().insert(index, record);
        self.notify(Change::Inserted { index, count: 1 })
    }

    pub fn remove(&self, index: usize) -> Result<Value, SeriesError> {
        let len = self.len();
        if index >= len {
            return Err(SeriesError::OutOfBounds { index, len });
        }
        let removed = self.inner.records.borrow_mut().remove(index);
        self.notify(Change::Removed { index, count: 1 })?;
        Ok(removed)
    }

    /// Replace one record, returning the previous one.
    pub fn set(&self, index: usize, record: Value) -> Result<Value, SeriesError> {
        let previous = {
            let mut records = self.inner.records.borrow_mut();
            let len = records.len();
            let slot = records
                .get_mut(index)
                .ok_or(SeriesError::OutOfBounds { index, len })?;
            std::mem::replace(slot, record)
        };
        self.notify(Change::Replaced { index })?;
        Ok(previous)
    }

    /// Remove `delete_count` records at `index` and insert `items` there.
    /// Observers see a single change covering both sides.
    pub fn splice<I: IntoIterator<Item = Value>>(
        &self,
        index: usize,
        delete_count: usize,
        items: I,
    ) -> Result<Vec<Value>, SeriesError> {
        let len = self.len();
        self.check_index(index, len)?;
        let end = (index + delete_count).min(len);

        let (removed, inserted) = {
            let mut records = self.inner.records.borrow_mut();
            let before = records.len();
            let removed: Vec<Value> = records.splice(index..end, items).collect();
            let inserted = records.len() + removed.len() - before;
            (removed, inserted)
        };

        let change = match (removed.len(), inserted) {
            (0, 0) => return Ok(removed),
            (count, 0) => Change::Removed { index, count },
            (0, count) => Change::Inserted { index, count },
            (removed_count, inserted_count) => Change::Spliced {
                index,
                removed: removed_count,
                inserted: inserted_count,
            },
        };
        self.notify(change).map(|_| removed)
    }

    pub fn clear(&self) -> Result<(), SeriesError> {
        self.inner.records.borrow_mut().clear();
        self.notify(Change::Reset)
    }

    /// Replace every record in place, keeping this handle's identity.
    pub fn replace_all(&self, records: Vec<Value>) -> Result<(), SeriesError> {
        *self.inner.records.borrow_mut() = records;
        self.notify(Change::Reset)
    }
}
