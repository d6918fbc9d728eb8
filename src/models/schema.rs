//! Explicit table schemas and the storage-neutral row representation.
//!
//! A [`TableSchema`] lists every field with its semantic kind and constraints,
//! names the natural key, and optionally a partition field. Stores and the upsert
//! engine work only with [`Row`]s checked against a schema; typed records convert
//! through [`StoredRecord`].

use crate::errors::{DataHubError, Result};
use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
    /// Maximum length in characters, text fields only.
    pub max_len: Option<usize>,
}

impl FieldDef {
    pub const fn text(name: &'static str, max_len: usize) -> Self {
        Self { name, kind: FieldKind::Text, nullable: true, max_len: Some(max_len) }
    }

    pub const fn integer(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Integer, nullable: true, max_len: None }
    }

    pub const fn float(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Float, nullable: true, max_len: None }
    }

    pub const fn date(name: &'static str) -> Self {
        Self { name, kind: FieldKind::Date, nullable: true, max_len: None }
    }

    pub const fn required(self) -> Self {
        Self { nullable: false, ..self }
    }
}

#[derive(Debug)]
pub struct TableSchema {
    pub name: &'static str,
    pub fields: &'static [FieldDef],
    pub natural_key: &'static [&'static str],
    /// Rows sharing this field's value are stored and committed together.
    pub partition_key: Option<&'static str>,
}

/// One cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
}

impl FieldValue {
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            FieldValue::Null => None,
            FieldValue::Text(_) => Some(FieldKind::Text),
            FieldValue::Integer(_) => Some(FieldKind::Integer),
            FieldValue::Float(_) => Some(FieldKind::Float),
            FieldValue::Date(_) => Some(FieldKind::Date),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Canonical text used when the value is part of a key.
    fn key_part(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Integer(v) => Some(v.to_string()),
            FieldValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            FieldValue::Null | FieldValue::Float(_) => None,
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(d: NaiveDate) -> Self {
        FieldValue::Date(d)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Values in schema field order.
pub type Row = Vec<FieldValue>;

/// Natural key of a row, one canonical string per key field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey(pub Vec<String>);

impl RowKey {
    pub fn single(value: &str) -> Self {
        RowKey(vec![value.to_string()])
    }
}

impl std::fmt::Display for RowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl TableSchema {
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    fn require_index(&self, name: &str) -> Result<usize> {
        self.index_of(name).ok_or_else(|| {
            DataHubError::StoreError(format!("{} has no field {}", self.name, name))
        })
    }

    pub fn key_of(&self, row: &Row) -> Result<RowKey> {
        let mut parts = Vec::with_capacity(self.natural_key.len());
        for name in self.natural_key {
            let idx = self.require_index(name)?;
            let part = row
                .get(idx)
                .and_then(FieldValue::key_part)
                .filter(|p| !p.is_empty())
                .ok_or_else(|| {
                    DataHubError::StoreError(format!("{}: empty key field {}", self.name, name))
                })?;
            parts.push(part);
        }
        Ok(RowKey(parts))
    }

    /// Partition value of a row, `None` for unpartitioned tables.
    pub fn partition_of(&self, row: &Row) -> Result<Option<String>> {
        match self.partition_key {
            None => Ok(None),
            Some(name) => {
                let idx = self.require_index(name)?;
                row.get(idx)
                    .and_then(FieldValue::key_part)
                    .filter(|p| !p.is_empty())
                    .map(Some)
                    .ok_or_else(|| {
                        DataHubError::StoreError(format!(
                            "{}: empty partition field {}",
                            self.name, name
                        ))
                    })
            }
        }
    }

    /// Checks arity, kinds, nullability and text length.
    pub fn validate(&self, row: &Row) -> Result<()> {
        if row.len() != self.fields.len() {
            return Err(DataHubError::StoreError(format!(
                "{}: expected {} fields, got {}",
                self.name,
                self.fields.len(),
                row.len()
            )));
        }
        for (field, value) in self.fields.iter().zip(row) {
            match value.kind() {
                None if !field.nullable => {
                    return Err(DataHubError::StoreError(format!(
                        "{}.{} must not be null",
                        self.name, field.name
                    )));
                }
                Some(kind) if kind != field.kind => {
                    return Err(DataHubError::StoreError(format!(
                        "{}.{}: expected {:?}, got {:?}",
                        self.name, field.name, field.kind, kind
                    )));
                }
                _ => {}
            }
            if let (FieldValue::Text(s), Some(max)) = (value, field.max_len) {
                if s.chars().count() > max {
                    return Err(DataHubError::StoreError(format!(
                        "{}.{}: value longer than {} characters",
                        self.name, field.name, max
                    )));
                }
            }
        }
        self.key_of(row).map(|_| ())
    }
}

/// A typed record that maps onto one schema.
pub trait StoredRecord: Sized {
    fn schema() -> &'static TableSchema;

    fn to_row(&self) -> Row;

    fn from_row(row: &Row) -> Result<Self>;
}

/// Typed accessors over a row, by field name.
pub struct RowReader<'a> {
    schema: &'static TableSchema,
    row: &'a Row,
}

impl<'a> RowReader<'a> {
    pub fn new(schema: &'static TableSchema, row: &'a Row) -> Self {
        Self { schema, row }
    }

    fn value(&self, name: &str) -> Result<&'a FieldValue> {
        let idx = self.schema.require_index(name)?;
        self.row.get(idx).ok_or_else(|| {
            DataHubError::StoreError(format!("{}: row has no value for {}", self.schema.name, name))
        })
    }

    fn mismatch(&self, name: &str, expected: &str) -> DataHubError {
        DataHubError::StoreError(format!("{}.{} is not {}", self.schema.name, name, expected))
    }

    pub fn opt_text(&self, name: &str) -> Result<Option<String>> {
        match self.value(name)? {
            FieldValue::Null => Ok(None),
            FieldValue::Text(s) => Ok(Some(s.clone())),
            _ => Err(self.mismatch(name, "text")),
        }
    }

    pub fn text(&self, name: &str) -> Result<String> {
        self.opt_text(name)?.ok_or_else(|| self.mismatch(name, "text"))
    }

    pub fn integer(&self, name: &str) -> Result<i64> {
        match self.value(name)? {
            FieldValue::Integer(v) => Ok(*v),
            _ => Err(self.mismatch(name, "an integer")),
        }
    }

    pub fn float(&self, name: &str) -> Result<f64> {
        match self.value(name)? {
            FieldValue::Float(v) => Ok(*v),
            FieldValue::Integer(v) => Ok(*v as f64),
            _ => Err(self.mismatch(name, "a float")),
        }
    }

    pub fn date(&self, name: &str) -> Result<NaiveDate> {
        match self.value(name)? {
            FieldValue::Date(d) => Ok(*d),
            _ => Err(self.mismatch(name, "a date")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static SAMPLE: TableSchema = TableSchema {
        name: "sample",
        fields: &[
            FieldDef::text("code", 6).required(),
            FieldDef::date("date").required(),
            FieldDef::integer("close"),
        ],
        natural_key: &["code", "date"],
        partition_key: Some("code"),
    };

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    #[test]
    fn composite_key_renders_dates_canonically() {
        let row: Row = vec!["005930".into(), day(3).into(), 100i64.into()];
        let key = SAMPLE.key_of(&row).unwrap();
        assert_eq!(key, RowKey(vec!["005930".into(), "2025-01-03".into()]));
        assert_eq!(SAMPLE.partition_of(&row).unwrap(), Some("005930".to_string()));
    }

    #[test]
    fn validate_rejects_wrong_kind_and_missing_required() {
        let wrong_kind: Row = vec!["005930".into(), day(3).into(), "100".into()];
        assert!(SAMPLE.validate(&wrong_kind).is_err());

        let null_key: Row = vec![FieldValue::Null, day(3).into(), 100i64.into()];
        assert!(SAMPLE.validate(&null_key).is_err());

        let too_long: Row = vec!["0059300".into(), day(3).into(), FieldValue::Null];
        assert!(SAMPLE.validate(&too_long).is_err());

        let short: Row = vec!["005930".into(), day(3).into()];
        assert!(SAMPLE.validate(&short).is_err());

        let ok: Row = vec!["005930".into(), day(3).into(), FieldValue::Null];
        assert!(SAMPLE.validate(&ok).is_ok());
    }

    #[test]
    fn empty_text_key_is_rejected() {
        let row: Row = vec!["".into(), day(3).into(), 1i64.into()];
        assert!(SAMPLE.key_of(&row).is_err());
    }
}
