// DataSeries: owned data plus a registry of columns and styling

use crate::column::Column;
use crate::data::Data;
use crate::error::SeriesError;
use crate::value::Value;
use crate::ColumnOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

pub const DEFAULT_COLOR: &str = "steelblue";
pub const DEFAULT_POINT_RADIUS: f64 = 3.0;
pub const DEFAULT_LINE_WIDTH: f64 = 1.5;

/// Descriptor naming the expression that feeds a column.
///
/// Accepts `{"<-": "expr"}`, `{"<->": "expr"}` or `{"expression": "expr"}`.
/// The forward binding wins when both are present; the two-way form is only
/// ever read from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingSpec {
    #[serde(
        rename = "<-",
        alias = "expression",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub forward: Option<String>,
    #[serde(rename = "<->", default, skip_serializing_if = "Option::is_none")]
    pub two_way: Option<String>,
}

impl BindingSpec {
    pub fn forward(expression: impl Into<String>) -> Self {
        Self {
            forward: Some(expression.into()),
            two_way: None,
        }
    }

    pub fn two_way(expression: impl Into<String>) -> Self {
        Self {
            forward: None,
            two_way: Some(expression.into()),
        }
    }

    pub fn expression(&self) -> Option<&str> {
        self.forward
            .as_deref()
            .filter(|e| !e.is_empty())
            .or_else(|| self.two_way.as_deref())
            .filter(|e| !e.is_empty())
    }
}

/// Serialized form of a series, used for hydration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesSpec {
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
    #[serde(default)]
    pub columns: BTreeMap<String, BindingSpec>,
    pub color: Option<String>,
    pub point_color: Option<String>,
    pub line_color: Option<String>,
    pub point_radius: Option<f64>,
    pub line_width: Option<f64>,
    #[serde(default)]
    pub options: ColumnOptions,
}

/// Per-column report of the derived aggregates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub expression: Option<String>,
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    pub min: Option<Value>,
    pub max: Option<Value>,
    pub count: usize,
}

/// A single set of data to be plotted on a chart.
///
/// The series owns its data, an arbitrary sequence of records with no
/// assumed shape. Columns, defined with [`DataSeries::define_column`], give
/// the records meaning: each column reads one value per record and keeps
/// its type, min and max current as the data changes. All columns share
/// the series's data by reference.
#[derive(Debug)]
pub struct DataSeries {
    data: Data,
    columns: BTreeMap<String, Column>,
    options: ColumnOptions,
    color: Option<String>,
    point_color: Option<String>,
    line_color: Option<String>,
    point_radius: Option<f64>,
    line_width: Option<f64>,
}

impl Default for DataSeries {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSeries {
    pub fn new() -> Self {
        Self::with_options(ColumnOptions::default())
    }

    /// Series whose columns are created with `options`.
    pub fn with_options(options: ColumnOptions) -> Self {
        Self {
            data: Data::default(),
            columns: BTreeMap::new(),
            options,
            color: None,
            point_color: None,
            line_color: None,
            point_radius: None,
            line_width: None,
        }
    }

    /// Handle to the series's records. Columns hold this same handle.
    pub fn data(&self) -> Data {
        self.data.clone()
    }

    /// Replace the data wholesale. Every column rebinds to the new sequence
    /// and recomputes; the first column error is returned after all columns
    /// have been rebound.
    pub fn set_data(&mut self, data: impl Into<Data>) -> Result<(), SeriesError> {
        self.data = data.into();
        debug!(records = self.data.len(), columns = self.columns.len(), "series data replaced");

        let mut first_error = None;
        for column in self.columns.values() {
            if let Err(e) = column.set_data(self.data.clone()) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn push(&self, record: Value) -> Result<(), SeriesError> {
        self.data.push(record)
    }

    pub fn extend<I: IntoIterator<Item = Value>>(&self, records: I) -> Result<(), SeriesError> {
        self.data.extend(records)
    }

    /// Define, or retarget, the column called `name`.
    ///
    /// The first call creates and registers the column and binds it to this
    /// series's data. Later calls return the same column with its expression
    /// overwritten, so references already handed out stay valid.
    pub fn define_column(&mut self, name: &str, binding: &BindingSpec) -> Result<Column, SeriesError> {
        let column = match self.columns.get(name) {
            Some(existing) => existing.clone(),
            None => Column::with_options(self.options),
        };

        column.set_name(Some(name))?;
        column.set_expression(binding.expression())?;

        let bound = column
            .data()
            .map(|data| data.ptr_eq(&self.data))
            .unwrap_or(false);

        if !self.columns.contains_key(name) {
            debug!(column = name, expression = ?binding.expression(), "column defined");
            self.columns.insert(name.to_string(), column.clone());
        }

        if !bound {
            column.set_data(self.data.clone())?;
        }
        Ok(column)
    }

    /// Defined columns by name. Use `define_column` to add to it.
    pub fn columns(&self) -> &BTreeMap<String, Column> {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<Column> {
        self.columns.get(name).cloned()
    }

    /// Define every column in `columns`, as hydration does.
    pub fn define_columns(&mut self, columns: &BTreeMap<String, BindingSpec>) -> Result<(), SeriesError> {
        for (name, binding) in columns {
            self.define_column(name, binding)?;
        }
        Ok(())
    }

    /// Build a series from its serialized form.
    pub fn from_spec(spec: SeriesSpec) -> Result<Self, SeriesError> {
        let mut series = Self::with_options(spec.options);
        series.color = spec.color;
        series.point_color = spec.point_color;
        series.line_color = spec.line_color;
        series.point_radius = spec.point_radius;
        series.line_width = spec.line_width;
        series.set_data(spec.data.into_iter().map(Value::from).collect::<Vec<_>>())?;
        series.define_columns(&spec.columns)?;
        Ok(series)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let spec: SeriesSpec =
            serde_json::from_str(json).context("Failed to parse series JSON")?;
        Self::from_spec(spec).context("Failed to build series")
    }

    pub fn summary(&self) -> Vec<ColumnSummary> {
        self.columns
            .iter()
            .map(|(name, column)| ColumnSummary {
                name: name.clone(),
                expression: column.expression(),
                type_name: column.type_name(),
                min: column.min(),
                max: column.max(),
                count: column.len(),
            })
            .collect()
    }

    //
    // Style properties
    //

    pub fn color(&self) -> &str {
        self.color
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_COLOR)
    }

    pub fn set_color(&mut self, color: Option<String>) {
        self.color = color;
    }

    /// Falls back to `color`.
    pub fn point_color(&self) -> &str {
        self.point_color
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| self.color())
    }

    pub fn set_point_color(&mut self, color: Option<String>) {
        self.point_color = color;
    }

    /// Falls back to `color`.
    pub fn line_color(&self) -> &str {
        self.line_color
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| self.color())
    }

    pub fn set_line_color(&mut self, color: Option<String>) {
        self.line_color = color;
    }

    pub fn point_radius(&self) -> f64 {
        self.point_radius
            .filter(|r| *r != 0.0 && !r.is_nan())
            .unwrap_or(DEFAULT_POINT_RADIUS)
    }

    pub fn set_point_radius(&mut self, radius: Option<f64>) {
        self.point_radius = radius;
    }

    pub fn line_width(&self) -> f64 {
        self.line_width
            .filter(|w| *w != 0.0 && !w.is_nan())
            .unwrap_or(DEFAULT_LINE_WIDTH)
    }

    pub fn set_line_width(&mut self, width: Option<f64>) {
        self.line_width = width;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_starts_empty() {
        let series = DataSeries::new();
        assert!(series.data().is_empty());
        assert!(series.columns().is_empty());
        assert!(series.data().ptr_eq(&series.data()));
    }

    #[test]
    fn test_define_column_then_set_data() {
        let mut series = DataSeries::new();
        series
            .define_column("foo", &BindingSpec::forward("bar"))
            .unwrap();
        series
            .set_data(Data::from_json(&json!([{"bar": 1}, {"bar": 2}, {"bar": 3}])).unwrap())
            .unwrap();

        let column = series.column("foo").unwrap();
        assert!(column.data().unwrap().ptr_eq(&series.data()));
        assert_eq!(column.expression(), Some("bar".to_string()));
        assert_eq!(column.name(), Some("foo".to_string()));
        assert_eq!(column.max(), Some(Value::Number(3.0)));
    }

    #[test]
    fn test_define_column_is_idempotent() {
        let mut series = DataSeries::new();
        let first = series
            .define_column("foo", &BindingSpec::forward("a"))
            .unwrap();
        let second = series
            .define_column("foo", &BindingSpec::forward("b"))
            .unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(series.columns().len(), 1);
        assert_eq!(first.expression(), Some("b".to_string()));
    }

    #[test]
    fn test_retarget_recomputes() {
        let mut series = DataSeries::new();
        series
            .set_data(Data::from_json(&json!([{"a": 1, "b": 100}])).unwrap())
            .unwrap();
        let column = series
            .define_column("y", &BindingSpec::forward("a"))
            .unwrap();
        assert_eq!(column.max(), Some(Value::Number(1.0)));

        series.define_column("y", &BindingSpec::forward("b")).unwrap();
        assert_eq!(column.max(), Some(Value::Number(100.0)));
    }

    #[test]
    fn test_set_data_rebinds_columns() {
        let mut series = DataSeries::new();
        let column = series
            .define_column("x", &BindingSpec::forward("x"))
            .unwrap();
        let old = series.data();

        series
            .set_data(Data::from_json(&json!([{"x": 4}])).unwrap())
            .unwrap();
        assert!(!column.data().unwrap().ptr_eq(&old));
        assert!(column.data().unwrap().ptr_eq(&series.data()));
        assert_eq!(column.min(), Some(Value::Number(4.0)));
    }

    #[test]
    fn test_push_through_series() {
        let mut series = DataSeries::new();
        let column = series
            .define_column("foo", &BindingSpec::forward("foo"))
            .unwrap();
        series
            .set_data(Data::from_json(&json!([{"foo": 1}, {"foo": 2}, {"foo": 0}])).unwrap())
            .unwrap();
        series.push(Value::from(json!({"foo": -1}))).unwrap();
        assert_eq!(column.min(), Some(Value::Number(-1.0)));
        assert_eq!(column.len(), 4);
    }

    #[test]
    fn test_parse_error_does_not_register() {
        let mut series = DataSeries::new();
        let result = series.define_column("bad", &BindingSpec::forward("a +"));
        assert!(matches!(result, Err(SeriesError::Parse(_))));
        assert!(series.column("bad").is_none());
    }

    #[test]
    fn test_binding_spec_forms() {
        let forward: BindingSpec = serde_json::from_value(json!({"<-": "a"})).unwrap();
        assert_eq!(forward.expression(), Some("a"));

        let two_way: BindingSpec = serde_json::from_value(json!({"<->": "b"})).unwrap();
        assert_eq!(two_way.expression(), Some("b"));

        let both: BindingSpec = serde_json::from_value(json!({"<-": "a", "<->": "b"})).unwrap();
        assert_eq!(both.expression(), Some("a"));

        let empty_forward: BindingSpec =
            serde_json::from_value(json!({"<-": "", "<->": "b"})).unwrap();
        assert_eq!(empty_forward.expression(), Some("b"));

        let named: BindingSpec = serde_json::from_value(json!({"expression": "c"})).unwrap();
        assert_eq!(named.expression(), Some("c"));

        assert_eq!(BindingSpec::default().expression(), None);
    }

    #[test]
    fn test_binding_without_expression_uses_name() {
        let mut series = DataSeries::new();
        series
            .set_data(Data::from_json(&json!([{"height": 170}])).unwrap())
            .unwrap();
        let column = series
            .define_column("height", &BindingSpec::default())
            .unwrap();
        assert_eq!(column.expression(), None);
        assert_eq!(column.max(), Some(Value::Number(170.0)));
    }

    #[test]
    fn test_style_defaults() {
        let mut series = DataSeries::new();
        assert_eq!(series.color(), "steelblue");
        assert_eq!(series.point_color(), "steelblue");
        assert_eq!(series.line_color(), "steelblue");
        assert_eq!(series.point_radius(), 3.0);
        assert_eq!(series.line_width(), 1.5);

        series.set_color(Some("red".to_string()));
        assert_eq!(series.point_color(), "red");
        assert_eq!(series.line_color(), "red");

        series.set_line_color(Some("green".to_string()));
        series.set_point_radius(Some(5.0));
        series.set_line_width(Some(0.0));
        assert_eq!(series.line_color(), "green");
        assert_eq!(series.point_color(), "red");
        assert_eq!(series.point_radius(), 5.0);
        assert_eq!(series.line_width(), 1.5);
    }

    #[test]
    fn test_from_json_str() {
        let series = DataSeries::from_json_str(
            r#"{
                "data": [{"bar": 1}, {"bar": 2}, {"bar": 3}],
                "columns": {"foo": {"<-": "bar"}},
                "lineColor": "orange",
                "pointRadius": 4
            }"#,
        )
        .unwrap();

        let column = series.column("foo").unwrap();
        assert_eq!(column.expression(), Some("bar".to_string()));
        assert!(column.data().unwrap().ptr_eq(&series.data()));
        assert_eq!(column.max(), Some(Value::Number(3.0)));
        assert_eq!(series.line_color(), "orange");
        assert_eq!(series.point_radius(), 4.0);
    }

    #[test]
    fn test_from_json_str_rejects_bad_expression() {
        let result = DataSeries::from_json_str(r#"{"columns": {"foo": {"<-": "bar.nope()"}}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_summary() {
        let mut series = DataSeries::new();
        series
            .set_data(Data::from_json(&json!([{"a": 2}, {"a": 8}])).unwrap())
            .unwrap();
        series.define_column("a", &BindingSpec::forward("a")).unwrap();
        series
            .define_column("double", &BindingSpec::forward("a * 2"))
            .unwrap();

        let summary = series.summary();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].name, "a");
        assert_eq!(summary[1].name, "double");
        assert_eq!(summary[1].max, Some(Value::Number(16.0)));
        assert_eq!(summary[1].type_name, Some("Number".to_string()));
        assert_eq!(summary[1].count, 2);
    }
}
