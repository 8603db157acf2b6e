// Column: a named value extractor bound to a shared data collection

use crate::data::{Change, Data, DataObserver, SubscriptionId};
use crate::error::{EvalError, SeriesError};
use crate::parser::{parse, ParsedExpression};
use crate::value::{max_value, min_value, Value, ValueKind};
use crate::{ColumnOptions, FailurePolicy};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

/// How a column reads one value off a record.
#[derive(Debug, Clone, Default)]
struct Binding {
    name: Option<String>,
    expression: Option<String>,
    parsed: Option<ParsedExpression>,
    /// Key of a plain property read, cached when the expression is assigned.
    property: Option<String>,
}

impl Binding {
    fn get_value(&self, record: &Value) -> Result<Option<Value>, EvalError> {
        if record.is_null() {
            return Ok(None);
        }
        if let Some(key) = &self.property {
            // Absent key reads as null; a present key passes its value through
            return Ok(Some(if record.has_key(key) {
                record.get(key).cloned().unwrap_or(Value::Null)
            } else {
                Value::Null
            }));
        }
        if let Some(parsed) = &self.parsed {
            return parsed.evaluate(record).map(Some);
        }
        if let Some(name) = &self.name {
            return Ok(record.get(name).cloned());
        }
        Ok(None)
    }
}

type Listener = Rc<dyn Fn(&Column)>;

#[derive(Default)]
struct State {
    binding: Binding,
    options: ColumnOptions,
    data: Option<(Data, SubscriptionId)>,
    values: Vec<Option<Value>>,
    kind: Option<ValueKind>,
    min: Option<Value>,
    max: Option<Value>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_listener: u64,
}

impl State {
    fn label(&self) -> String {
        self.binding
            .name
            .clone()
            .or_else(|| self.binding.expression.clone())
            .unwrap_or_default()
    }

    fn evaluate_at(&self, record: &Value, index: usize) -> Result<Option<Value>, SeriesError> {
        match self.binding.get_value(record) {
            Ok(value) => Ok(value),
            Err(source) => match self.options.on_error {
                FailurePolicy::Abort => Err(SeriesError::Column {
                    column: self.label(),
                    index,
                    source,
                }),
                FailurePolicy::Skip => {
                    warn!(column = %self.label(), index, error = %source, "skipping record");
                    Ok(None)
                }
            },
        }
    }

    fn clear_derived(&mut self) {
        self.values.clear();
        self.kind = None;
        self.min = None;
        self.max = None;
    }

    fn rescan_extremes(&mut self) {
        self.min = min_value(self.values.iter().flatten()).cloned();
        self.max = max_value(self.values.iter().flatten()).cloned();
    }

    /// Evaluate `count` records starting at `index`. Derived state is cleared
    /// when one of them aborts.
    fn evaluate_range(
        &mut self,
        records: &[Value],
        index: usize,
        count: usize,
    ) -> Result<Vec<Option<Value>>, SeriesError> {
        let mut fresh = Vec::with_capacity(count);
        for (offset, record) in records[index..index + count].iter().enumerate() {
            match self.evaluate_at(record, index + offset) {
                Ok(value) => fresh.push(value),
                Err(e) => {
                    self.clear_derived();
                    return Err(e);
                }
            }
        }
        Ok(fresh)
    }

    /// Fold only the new values into the running extremes.
    fn fold_extremes(&mut self, fresh: &[Option<Value>]) {
        self.min = min_value(self.min.iter().chain(fresh.iter().flatten())).cloned();
        self.max = max_value(self.max.iter().chain(fresh.iter().flatten())).cloned();
    }

    fn touches_extreme(&self, removed: &[Option<Value>]) -> bool {
        removed
            .iter()
            .flatten()
            .any(|v| Some(v) == self.min.as_ref() || Some(v) == self.max.as_ref())
    }

    /// Type is sampled from the first value only.
    fn refresh_kind(&mut self) {
        self.kind = self.values.first().cloned().flatten().and_then(|v| v.kind());
    }

    fn recompute_all(&mut self, records: &[Value]) -> Result<(), SeriesError> {
        let values = records
            .iter()
            .enumerate()
            .map(|(index, record)| self.evaluate_at(record, index))
            .collect::<Result<Vec<_>, _>>();

        match values {
            Ok(values) => {
                self.values = values;
                self.refresh_kind();
                self.rescan_extremes();
                Ok(())
            }
            Err(e) => {
                self.clear_derived();
                Err(e)
            }
        }
    }

    fn apply_change(&mut self, records: &[Value], change: Change) -> Result<(), SeriesError> {
        match change {
            Change::Inserted { index, count } if self.values.len() + count == records.len() => {
                let fresh = self.evaluate_range(records, index, count)?;
                self.fold_extremes(&fresh);
                self.values.splice(index..index, fresh);
                self.refresh_kind();
                Ok(())
            }
            Change::Removed { index, count } if self.values.len() == records.len() + count => {
                let removed: Vec<Option<Value>> = self.values.drain(index..index + count).collect();
                if self.touches_extreme(&removed) {
                    self.rescan_extremes();
                }
                self.refresh_kind();
                Ok(())
            }
            Change::Spliced {
                index,
                removed,
                inserted,
            } if self.values.len() + inserted == records.len() + removed => {
                let fresh = self.evaluate_range(records, index, inserted)?;
                let gone: Vec<Option<Value>> = self.values.splice(index..index + removed, fresh.iter().cloned()).collect();
                if self.touches_extreme(&gone) {
                    self.rescan_extremes();
                } else {
                    self.fold_extremes(&fresh);
                }
                self.refresh_kind();
                Ok(())
            }
            Change::Replaced { index } if self.values.len() == records.len() => {
                match self.evaluate_at(&records[index], index) {
                    Ok(value) => {
                        self.values[index] = value;
                        self.refresh_kind();
                        self.rescan_extremes();
                        Ok(())
                    }
                    Err(e) => {
                        self.clear_derived();
                        Err(e)
                    }
                }
            }
            // Reset, or the values fell out of step after an aborted recompute
            _ => self.recompute_all(records),
        }
    }
}

/// A named, derived view over a shared data collection.
///
/// `Column` is a handle: clones refer to the same column, and a series hands
/// out the same column for a given name for its whole lifetime. The column
/// never owns or copies its data; it observes the collection it is bound to
/// and keeps `values`, `kind`, `min` and `max` consistent with it before any
/// mutation returns.
#[derive(Clone)]
pub struct Column {
    inner: Rc<ColumnInner>,
}

struct ColumnInner {
    me: Weak<ColumnInner>,
    state: RefCell<State>,
}

impl DataObserver for ColumnInner {
    fn data_changed(&self, data: &Data, change: Change) -> Result<(), SeriesError> {
        let result = {
            let mut state = self.state.borrow_mut();
            trace!(column = %state.label(), ?change, "recomputing column");
            let records = data.records();
            state.apply_change(&records, change)
        };
        self.notify_listeners();
        result
    }
}

impl ColumnInner {
    fn notify_listeners(&self) {
        let listeners: Vec<Listener> = self
            .state
            .borrow()
            .listeners
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        if listeners.is_empty() {
            return;
        }
        if let Some(inner) = self.me.upgrade() {
            let column = Column { inner };
            for listener in listeners {
                listener(&column);
            }
        }
    }

    /// Recompute from scratch against the bound data, if any.
    fn refresh(&self) -> Result<(), SeriesError> {
        let result = {
            let mut state = self.state.borrow_mut();
            match state.data.as_ref().map(|(data, _)| data.clone()) {
                Some(data) => {
                    let records = data.records();
                    state.recompute_all(&records)
                }
                None => {
                    state.clear_derived();
                    Ok(())
                }
            }
        };
        self.notify_listeners();
        result
    }
}

impl Default for Column {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Column")
            .field("name", &state.binding.name)
            .field("expression", &state.binding.expression)
            .field("type", &state.kind)
            .field("min", &state.min)
            .field("max", &state.max)
            .finish()
    }
}

impl Column {
    pub fn new() -> Self {
        Self::with_options(ColumnOptions::default())
    }

    pub fn with_options(options: ColumnOptions) -> Self {
        let inner = Rc::new_cyclic(|me| ColumnInner {
            me: me.clone(),
            state: RefCell::new(State {
                options,
                ..State::default()
            }),
        });
        Self { inner }
    }

    /// Column that reads `record[name]` until an expression is assigned.
    pub fn named(name: impl Into<String>) -> Self {
        let column = Self::new();
        column.inner.state.borrow_mut().binding.name = Some(name.into());
        column
    }

    pub fn ptr_eq(&self, other: &Column) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn name(&self) -> Option<String> {
        self.inner.state.borrow().binding.name.clone()
    }

    pub fn set_name(&self, name: Option<&str>) -> Result<(), SeriesError> {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.binding.name.as_deref() == name {
                return Ok(());
            }
            state.binding.name = name.map(str::to_string);
        }
        self.inner.refresh()
    }

    pub fn expression(&self) -> Option<String> {
        self.inner.state.borrow().binding.expression.clone()
    }

    /// Assign the expression feeding this column.
    ///
    /// `None` or an empty string clears it. The text is parsed once here; a
    /// bare key is recognized and cached so `get_value` reads it directly.
    /// Parse errors are returned immediately and leave the previous
    /// expression in place. Assigning the current text again is a no-op.
    pub fn set_expression(&self, expression: Option<&str>) -> Result<(), SeriesError> {
        let expression = expression.filter(|e| !e.is_empty());
        {
            let mut state = self.inner.state.borrow_mut();
            if state.binding.expression.as_deref() == expression {
                return Ok(());
            }

            match expression {
                Some(text) => {
                    let parsed = parse(text)?;
                    let property = parsed.simple_property().map(str::to_string);
                    debug!(
                        expression = text,
                        simple = property.is_some(),
                        "column expression assigned"
                    );
                    state.binding.expression = Some(text.to_string());
                    if property.is_some() {
                        state.binding.property = property;
                        state.binding.parsed = None;
                    } else {
                        state.binding.property = None;
                        state.binding.parsed = Some(parsed);
                    }
                }
                None => {
                    state.binding.expression = None;
                    state.binding.property = None;
                    state.binding.parsed = None;
                }
            }
        }
        self.inner.refresh()
    }

    /// Cached key when the expression is a plain property read.
    pub fn simple_property(&self) -> Option<String> {
        self.inner.state.borrow().binding.property.clone()
    }

    pub fn options(&self) -> ColumnOptions {
        self.inner.state.borrow().options
    }

    pub fn set_options(&self, options: ColumnOptions) -> Result<(), SeriesError> {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.options == options {
                return Ok(());
            }
            state.options = options;
        }
        self.inner.refresh()
    }

    /// The collection this column is bound to. Identity-equal to the
    /// handle passed to `set_data`.
    pub fn data(&self) -> Option<Data> {
        self.inner
            .state
            .borrow()
            .data
            .as_ref()
            .map(|(data, _)| data.clone())
    }

    /// Bind to `data`, releasing any previous collection, and recompute.
    pub fn set_data(&self, data: Data) -> Result<(), SeriesError> {
        {
            let mut state = self.inner.state.borrow_mut();
            if let Some((current, _)) = &state.data {
                if current.ptr_eq(&data) {
                    return Ok(());
                }
            }
            if let Some((previous, id)) = state.data.take() {
                previous.unsubscribe(id);
            }
            let observer: Rc<dyn DataObserver> = self.inner.clone();
            let id = data.subscribe(Rc::downgrade(&observer));
            state.data = Some((data, id));
        }
        self.inner.refresh()
    }

    pub fn clear_data(&self) {
        {
            let mut state = self.inner.state.borrow_mut();
            if let Some((previous, id)) = state.data.take() {
                previous.unsubscribe(id);
            }
            state.clear_derived();
        }
        self.inner.notify_listeners();
    }

    /// Read this column's value off one record.
    ///
    /// `None` is "undefined": a null record, an unset binding, or a bare
    /// name that the record lacks. A cached property key instead yields
    /// `Some(Value::Null)` when the key is absent.
    pub fn get_value(&self, record: &Value) -> Result<Option<Value>, EvalError> {
        self.inner.state.borrow().binding.get_value(record)
    }

    /// One entry per record of the bound data.
    pub fn values(&self) -> Vec<Option<Value>> {
        self.inner.state.borrow().values.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.state.borrow().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Kind of the first value. Later values are not consulted, so a null
    /// first value leaves the type undefined.
    pub fn kind(&self) -> Option<ValueKind> {
        self.inner.state.borrow().kind
    }

    /// `kind` rendered as a runtime class name such as `"Number"`.
    pub fn type_name(&self) -> Option<String> {
        self.kind().map(|k| k.to_string())
    }

    pub fn min(&self) -> Option<Value> {
        self.inner.state.borrow().min.clone()
    }

    pub fn max(&self) -> Option<Value> {
        self.inner.state.borrow().max.clone()
    }

    /// Call `listener` after every change to this column's derived state.
    /// The listener must not mutate the column it observes.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Column) + 'static,
    {
        let mut state = self.inner.state.borrow_mut();
        let id = SubscriptionId(state.next_listener);
        state.next_listener += 1;
        state.listeners.push((id, Rc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner
            .state
            .borrow_mut()
            .listeners
            .retain(|(existing, _)| *existing != id);
    }
}
