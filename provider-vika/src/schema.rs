//! Datasheet field schema
//!
//! Vika columns carry display names (the receiving sheet uses Chinese column
//! titles). The rest of the workspace works with stable logical keys such as
//! `packageNo`, so every record crossing the connector is translated here and
//! its values coerced to the column's declared type.

use serde_json::{Map, Number, Value};
use std::collections::HashMap;

/// Receiving datasheet (abnormal package records)
pub const RECEIVING_DATASHEET_ID: &str = "dstsnDVylQhjuBiSEo";

/// Shipping datasheet
pub const SHIPPING_DATASHEET_ID: &str = "dstl0nkkjrg2hlXfRk";

/// Declared type of a datasheet column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Number,
    Boolean,
    DateTime,
    Attachment,
}

#[derive(Debug, Clone, PartialEq)]
struct FieldDef {
    key: String,
    column: String,
    field_type: FieldType,
}

/// Bidirectional logical-key / column-name mapping for one datasheet.
///
/// Keys without a mapping pass through unchanged in both directions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSchema {
    fields: Vec<FieldDef>,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(
        mut self,
        key: impl Into<String>,
        column: impl Into<String>,
        field_type: FieldType,
    ) -> Self {
        self.fields.push(FieldDef {
            key: key.into(),
            column: column.into(),
            field_type,
        });
        self
    }

    /// Schema of the receiving sheet that holds abnormal packages
    pub fn receiving() -> Self {
        Self::new()
            .with_field("entryDate", "入仓时间", FieldType::DateTime)
            .with_field("customerId", "客户代码", FieldType::Text)
            .with_field("packageNo", "入仓包裹单号", FieldType::Text)
            .with_field("packageQty", "单个包裹数量", FieldType::Number)
            .with_field("remark", "备注", FieldType::Text)
            .with_field("abnormalPhotos", "异常图片", FieldType::Attachment)
            .with_field("abnormal", "异常", FieldType::Boolean)
    }

    pub fn shipping() -> Self {
        Self::new()
            .with_field("barcode", "产品条码", FieldType::Text)
            .with_field("processed", "处理完成", FieldType::Boolean)
            .with_field("cartons", "箱数", FieldType::Number)
            .with_field("qty", "每箱数量", FieldType::Number)
            .with_field("weight", "重量", FieldType::Number)
            .with_field("spec", "箱规", FieldType::Text)
            .with_field("remark", "备注", FieldType::Text)
            .with_field("createdAt", "提交时间", FieldType::DateTime)
            .with_field("changeLabels", "换标标签", FieldType::Text)
            .with_field("fbaLabels", "FBA标签", FieldType::Text)
    }

    /// Known schema for a datasheet id; unknown sheets get a pass-through schema.
    pub fn for_datasheet(datasheet_id: &str) -> Self {
        match datasheet_id {
            RECEIVING_DATASHEET_ID => Self::receiving(),
            SHIPPING_DATASHEET_ID => Self::shipping(),
            _ => Self::default(),
        }
    }

    /// Column name for a logical key
    pub fn column<'a>(&'a self, key: &'a str) -> &'a str {
        self.fields
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.column.as_str())
            .unwrap_or(key)
    }

    fn by_column(&self, column: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.column == column)
    }

    /// Translate a datasheet row into logical keys, coercing typed columns.
    pub fn to_logical(&self, fields: Map<String, Value>) -> HashMap<String, Value> {
        fields
            .into_iter()
            .map(|(column, value)| match self.by_column(&column) {
                Some(def) => (def.key.clone(), coerce(def.field_type, value)),
                None => (column, value),
            })
            .collect()
    }

    /// Translate logical keys into column names for writes.
    pub fn to_columns(&self, fields: Map<String, Value>) -> Map<String, Value> {
        fields
            .into_iter()
            .map(|(key, value)| (self.column(&key).to_string(), value))
            .collect()
    }
}

/// Coerce a raw cell value to the column's declared type.
///
/// Values that cannot be converted are returned unchanged.
pub fn coerce(field_type: FieldType, value: Value) -> Value {
    match field_type {
        FieldType::Number => coerce_number(value),
        FieldType::Boolean => Value::Bool(coerce_bool(&value)),
        FieldType::Text | FieldType::DateTime | FieldType::Attachment => value,
    }
}

fn coerce_number(value: Value) -> Value {
    let Value::String(raw) = &value else {
        return value;
    };
    let s = raw.trim();
    if s.is_empty() {
        return Value::Null;
    }
    let parsed = if s.contains('.') {
        s.parse::<f64>().ok().and_then(Number::from_f64)
    } else {
        s.parse::<i64>().ok().map(Number::from)
    };
    parsed.map(Value::Number).unwrap_or(value)
}

fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "y" | "on" => true,
            "false" | "0" | "no" | "n" | "off" | "" => false,
            _ => true,
        },
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
