use chrono::NaiveDate;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid digit pattern"));

// 날짜 변환: "2025.06.02" / "2025-06-02" / "2025/06/02"
pub fn parse_locale_date(text: &str) -> Option<NaiveDate> {
    let normalized = text.trim().replace(['.', '/'], "-");
    NaiveDate::parse_from_str(normalized.trim_end_matches('-'), "%Y-%m-%d").ok()
}

/// Parses thousands-separated integer text such as `"1,234,500"` or `"-3,100"`.
pub fn parse_grouped_int(text: &str) -> Option<i64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned
        .parse::<i64>()
        .ok()
        .or_else(|| cleaned.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v.trunc() as i64))
}

pub fn parse_grouped_float(text: &str) -> Option<f64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// First run of digits after dropping thousands separators, read as an unsigned
/// magnitude. `"▲1,250"` gives 1250; text without digits gives `None`.
pub fn extract_magnitude(text: &str) -> Option<i64> {
    let cleaned = text.replace(',', "");
    DIGITS
        .find(&cleaned)
        .and_then(|m| m.as_str().parse::<i64>().ok())
}

// 디버그 모드에서 처리 종목 수 제한
pub fn limit_entities<T>(entities: &mut Vec<T>, max_entities: usize) {
    if entities.len() > max_entities {
        info!("Limiting {} entities to {}", entities.len(), max_entities);
        entities.truncate(max_entities);
    }
}

// Arrow 변환 도구
pub mod arrow_utils {
    use crate::errors::{DataHubError, Result};
    use crate::models::schema::{FieldDef, FieldKind, FieldValue, Row, TableSchema};
    use arrow::array::ArrayRef;
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::ipc::reader::FileReader;
    use arrow::ipc::writer::FileWriter;
    use arrow::record_batch::RecordBatch;
    use arrow_array::{Array, Date32Array, Float64Array, Int64Array, StringArray};
    use chrono::{Datelike, NaiveDate};
    use std::fs::File;
    use std::path::Path;
    use std::sync::Arc;

    /// Days between 0001-01-01 and 1970-01-01.
    const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

    pub fn date_to_days(date: NaiveDate) -> i32 {
        date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
    }

    pub fn days_to_date(days: i32) -> Option<NaiveDate> {
        NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
    }

    fn data_type(kind: FieldKind) -> DataType {
        match kind {
            FieldKind::Text => DataType::Utf8,
            FieldKind::Integer => DataType::Int64,
            FieldKind::Float => DataType::Float64,
            FieldKind::Date => DataType::Date32,
        }
    }

    pub fn schema_to_arrow(schema: &TableSchema) -> Schema {
        Schema::new(
            schema
                .fields
                .iter()
                .map(|f| Field::new(f.name, data_type(f.kind), f.nullable))
                .collect::<Vec<_>>(),
        )
    }

    fn mismatch(schema: &TableSchema, field: &FieldDef, value: &FieldValue) -> DataHubError {
        DataHubError::ArrowError(format!(
            "{}.{}: cannot store {:?} as {:?}",
            schema.name, field.name, value, field.kind
        ))
    }

    fn build_column(schema: &TableSchema, field: &FieldDef, idx: usize, rows: &[Row]) -> Result<ArrayRef> {
        let array: ArrayRef = match field.kind {
            FieldKind::Text => {
                let mut values = Vec::with_capacity(rows.len());
                for row in rows {
                    values.push(match row.get(idx) {
                        Some(FieldValue::Text(s)) => Some(s.as_str()),
                        Some(FieldValue::Null) | None => None,
                        Some(other) => return Err(mismatch(schema, field, other)),
                    });
                }
                Arc::new(StringArray::from(values))
            }
            FieldKind::Integer => {
                let mut values = Vec::with_capacity(rows.len());
                for row in rows {
                    values.push(match row.get(idx) {
                        Some(FieldValue::Integer(v)) => Some(*v),
                        Some(FieldValue::Null) | None => None,
                        Some(other) => return Err(mismatch(schema, field, other)),
                    });
                }
                Arc::new(Int64Array::from(values))
            }
            FieldKind::Float => {
                let mut values = Vec::with_capacity(rows.len());
                for row in rows {
                    values.push(match row.get(idx) {
                        Some(FieldValue::Float(v)) => Some(*v),
                        Some(FieldValue::Integer(v)) => Some(*v as f64),
                        Some(FieldValue::Null) | None => None,
                        Some(other) => return Err(mismatch(schema, field, other)),
                    });
                }
                Arc::new(Float64Array::from(values))
            }
            FieldKind::Date => {
                let mut values = Vec::with_capacity(rows.len());
                for row in rows {
                    values.push(match row.get(idx) {
                        Some(FieldValue::Date(d)) => Some(date_to_days(*d)),
                        Some(FieldValue::Null) | None => None,
                        Some(other) => return Err(mismatch(schema, field, other)),
                    });
                }
                Arc::new(Date32Array::from(values))
            }
        };
        Ok(array)
    }

    /// Converts rows in schema order into one record batch.
    pub fn rows_to_record_batch(schema: &TableSchema, rows: &[Row]) -> Result<RecordBatch> {
        let columns = schema
            .fields
            .iter()
            .enumerate()
            .map(|(idx, field)| build_column(schema, field, idx, rows))
            .collect::<Result<Vec<_>>>()?;

        RecordBatch::try_new(Arc::new(schema_to_arrow(schema)), columns)
            .map_err(|e| DataHubError::ArrowError(e.to_string()))
    }

    fn downcast<'a, T: 'static>(column: &'a ArrayRef, schema: &TableSchema, name: &str) -> Result<&'a T> {
        column.as_any().downcast_ref::<T>().ok_or_else(|| {
            DataHubError::ArrowError(format!("Failed to downcast {}.{} column", schema.name, name))
        })
    }

    /// Reads a record batch back into rows, matching columns by name.
    pub fn record_batch_to_rows(schema: &TableSchema, batch: &RecordBatch) -> Result<Vec<Row>> {
        let mut rows: Vec<Row> = (0..batch.num_rows())
            .map(|_| Vec::with_capacity(schema.fields.len()))
            .collect();

        for field in schema.fields {
            let column = batch.column_by_name(field.name).ok_or_else(|| {
                DataHubError::ArrowError(format!("Missing column {}.{}", schema.name, field.name))
            })?;

            match field.kind {
                FieldKind::Text => {
                    let array = downcast::<StringArray>(column, schema, field.name)?;
                    for (i, row) in rows.iter_mut().enumerate() {
                        row.push(if array.is_null(i) {
                            FieldValue::Null
                        } else {
                            FieldValue::Text(array.value(i).to_string())
                        });
                    }
                }
                FieldKind::Integer => {
                    let array = downcast::<Int64Array>(column, schema, field.name)?;
                    for (i, row) in rows.iter_mut().enumerate() {
                        row.push(if array.is_null(i) {
                            FieldValue::Null
                        } else {
                            FieldValue::Integer(array.value(i))
                        });
                    }
                }
                FieldKind::Float => {
                    let array = downcast::<Float64Array>(column, schema, field.name)?;
                    for (i, row) in rows.iter_mut().enumerate() {
                        row.push(if array.is_null(i) {
                            FieldValue::Null
                        } else {
                            FieldValue::Float(array.value(i))
                        });
                    }
                }
                FieldKind::Date => {
                    let array = downcast::<Date32Array>(column, schema, field.name)?;
                    for (i, row) in rows.iter_mut().enumerate() {
                        if array.is_null(i) {
                            row.push(FieldValue::Null);
                            continue;
                        }
                        let date = days_to_date(array.value(i)).ok_or_else(|| {
                            DataHubError::ArrowError(format!(
                                "{}.{}: day {} out of range",
                                schema.name,
                                field.name,
                                array.value(i)
                            ))
                        })?;
                        row.push(FieldValue::Date(date));
                    }
                }
            }
        }

        Ok(rows)
    }

    /// Writes all rows of one table (or partition) to an Arrow IPC file.
    pub fn save_rows_to_arrow(schema: &TableSchema, rows: &[Row], path: &Path) -> Result<()> {
        let batch = rows_to_record_batch(schema, rows)?;
        let file = File::create(path)?;

        let mut writer = FileWriter::try_new(file, batch.schema().as_ref())
            .map_err(|e| DataHubError::ArrowError(e.to_string()))?;
        writer.write(&batch)
            .map_err(|e| DataHubError::ArrowError(e.to_string()))?;
        writer.finish()
            .map_err(|e| DataHubError::ArrowError(e.to_string()))?;

        Ok(())
    }

    pub fn read_rows_from_arrow(schema: &TableSchema, path: &Path) -> Result<Vec<Row>> {
        let file = File::open(path)?;
        let reader = FileReader::try_new(file, None)
            .map_err(|e| DataHubError::ArrowError(e.to_string()))?;

        let mut rows = Vec::new();
        for batch in reader {
            let batch = batch.map_err(|e| DataHubError::ArrowError(e.to_string()))?;
            rows.extend(record_batch_to_rows(schema, &batch)?);
        }
        Ok(rows)
    }

    /// Field names stored in an existing file, for compatibility checks.
    pub fn read_field_names(path: &Path) -> Result<Vec<String>> {
        let file = File::open(path)?;
        let reader = FileReader::try_new(file, None)
            .map_err(|e| DataHubError::ArrowError(e.to_string()))?;
        Ok(reader
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect())
    }
}
