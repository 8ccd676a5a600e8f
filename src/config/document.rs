//! Comment-preserving document codec.
//!
//! # Responsibilities
//! - Parse configuration text into semantic data plus preserved formatting
//! - Serialize semantic data back to text, reusing preserved formatting
//! - Pick the on-disk format from the file extension
//!
//! # Design Decisions
//! - Semantic data is a `serde_json::Value` so validation reads one shape
//!   regardless of the file format
//! - Formatting is an opaque `toml_edit` document carried next to the data;
//!   validation never looks at it
//! - Serializing reconciles the data into a copy of the preserved document:
//!   unchanged leaves keep their decor, changed leaves keep the comments
//!   around them, removed keys disappear, new keys are appended
//! - Without formatting the same path runs against an empty document, so
//!   clean output and round-trip output never drift apart

use std::path::Path;

use json_comments::StripComments;
use serde_json::{Map, Number, Value};
use toml_edit::{Array, DocumentMut, InlineTable, Item, Table};

/// Key `toml` uses when a datetime is deserialized into a self-describing map.
const TOML_DATETIME_KEY: &str = "$__toml_private_datetime";

/// On-disk representation of a configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentFormat {
    /// TOML, comments and layout preserved across a round-trip.
    #[default]
    Toml,
    /// JSON. `//` and `/* */` comments are accepted on read; output is
    /// plain JSON without formatting.
    Json,
}

impl DocumentFormat {
    /// `.json` files are JSON; everything else is read as TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => DocumentFormat::Json,
            _ => DocumentFormat::Toml,
        }
    }
}

/// Error decoding configuration text.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error(transparent)]
    TomlSyntax(#[from] toml_edit::TomlError),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Error encoding a document to text.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("document root must be a table")]
    RootNotTable,
    #[error("null value at `{0}` cannot be represented in TOML")]
    Null(String),
    #[error("integer at `{0}` does not fit in a TOML integer")]
    IntegerOutOfRange(String),
    #[error("invalid datetime at `{0}`")]
    Datetime(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Preserved formatting of a parsed document.
///
/// Opaque on purpose: callers carry it around, only the codec reads it.
#[derive(Debug, Clone)]
pub struct Formatting(DocumentMut);

/// Semantic configuration data paired with the formatting it was parsed from.
///
/// Equality considers the semantic data only.
#[derive(Debug, Clone, Default)]
pub struct Document {
    value: Value,
    formatting: Option<Formatting>,
}

impl Document {
    /// A plain document with no preserved formatting.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            formatting: None,
        }
    }

    /// Parse `text` in the given format.
    pub fn parse(text: &str, format: DocumentFormat) -> Result<Self, DecodeError> {
        match format {
            DocumentFormat::Toml => {
                let formatting: DocumentMut = text.parse()?;
                let value: Value = toml::from_str(text)?;
                Ok(Self {
                    value,
                    formatting: Some(Formatting(formatting)),
                })
            }
            DocumentFormat::Json => {
                let value = serde_json::from_reader(StripComments::new(text.as_bytes()))?;
                Ok(Self::new(value))
            }
        }
    }

    /// Serialize in the given format.
    ///
    /// Output is deterministic for a given document.
    pub fn stringify(&self, format: DocumentFormat) -> Result<String, EncodeError> {
        match format {
            DocumentFormat::Toml => {
                let root = self.value.as_object().ok_or(EncodeError::RootNotTable)?;
                let mut doc = self
                    .formatting
                    .as_ref()
                    .map(|f| f.0.clone())
                    .unwrap_or_default();
                reconcile_table(doc.as_table_mut(), root, "")?;
                Ok(doc.to_string())
            }
            DocumentFormat::Json => Ok(serde_json::to_string_pretty(&self.value)?),
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn formatting(&self) -> Option<&Formatting> {
        self.formatting.as_ref()
    }

    pub fn has_formatting(&self) -> bool {
        self.formatting.is_some()
    }

    /// Same formatting, different data.
    pub fn with_value(&self, value: Value) -> Self {
        Self {
            value,
            formatting: self.formatting.clone(),
        }
    }

    /// Drop the preserved formatting; the next save emits clean output.
    pub fn without_formatting(self) -> Self {
        Self::new(self.value)
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn reconcile_table(table: &mut Table, data: &Map<String, Value>, path: &str) -> Result<(), EncodeError> {
    let stale: Vec<String> = table
        .iter()
        .map(|(key, _)| key.to_string())
        .filter(|key| !data.contains_key(key))
        .collect();
    for key in stale {
        table.remove(&key);
    }

    for (key, value) in data {
        let here = join(path, key);
        match table.get_mut(key) {
            Some(Item::Table(child)) if value.is_object() => {
                if let Value::Object(map) = value {
                    reconcile_table(child, map, &here)?;
                }
            }
            Some(Item::Value(existing)) => reconcile_value(existing, value, &here)?,
            Some(item) => {
                if item_to_json(item) != *value {
                    *item = to_item(value, &here)?;
                }
            }
            None => {
                table.insert(key, to_item(value, &here)?);
            }
        }
    }
    Ok(())
}

fn reconcile_inline(table: &mut InlineTable, data: &Map<String, Value>, path: &str) -> Result<(), EncodeError> {
    let stale: Vec<String> = table
        .iter()
        .map(|(key, _)| key.to_string())
        .filter(|key| !data.contains_key(key))
        .collect();
    for key in stale {
        table.remove(&key);
    }

    for (key, value) in data {
        let here = join(path, key);
        match table.get_mut(key) {
            Some(existing) => reconcile_value(existing, value, &here)?,
            None => {
                table.insert(key.as_str(), to_value(value, &here)?);
            }
        }
    }
    Ok(())
}

fn reconcile_value(existing: &mut toml_edit::Value, value: &Value, path: &str) -> Result<(), EncodeError> {
    if let (toml_edit::Value::InlineTable(inline), Value::Object(map)) = (&mut *existing, value) {
        if !is_datetime(map) {
            return reconcile_inline(inline, map, path);
        }
    }
    if let (toml_edit::Value::Array(array), Value::Array(items)) = (&mut *existing, value) {
        if array.len() == items.len() {
            for (index, (slot, item)) in array.iter_mut().zip(items).enumerate() {
                reconcile_value(slot, item, &format!("{path}[{index}]"))?;
            }
            return Ok(());
        }
    }
    if value_to_json(existing) == *value {
        return Ok(());
    }

    let decor = existing.decor().clone();
    *existing = to_value(value, path)?;
    *existing.decor_mut() = decor;
    Ok(())
}

fn is_datetime(map: &Map<String, Value>) -> bool {
    map.len() == 1 && map.get(TOML_DATETIME_KEY).is_some_and(Value::is_string)
}

fn to_item(value: &Value, path: &str) -> Result<Item, EncodeError> {
    match value {
        Value::Object(map) if !is_datetime(map) => {
            let mut table = Table::new();
            // Parents that only hold sub-tables get no header of their own.
            table.set_implicit(!map.is_empty() && map.values().all(Value::is_object));
            for (key, child) in map {
                table.insert(key, to_item(child, &join(path, key))?);
            }
            Ok(Item::Table(table))
        }
        other => Ok(Item::Value(to_value(other, path)?)),
    }
}

fn to_value(value: &Value, path: &str) -> Result<toml_edit::Value, EncodeError> {
    Ok(match value {
        Value::Null => return Err(EncodeError::Null(path.to_string())),
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into()
            } else if n.is_u64() {
                return Err(EncodeError::IntegerOutOfRange(path.to_string()));
            } else {
                match n.as_f64() {
                    Some(f) => f.into(),
                    None => return Err(EncodeError::IntegerOutOfRange(path.to_string())),
                }
            }
        }
        Value::String(s) => s.as_str().into(),
        Value::Array(items) => {
            let mut array = Array::new();
            for (index, item) in items.iter().enumerate() {
                array.push(to_value(item, &format!("{path}[{index}]"))?);
            }
            array.into()
        }
        Value::Object(map) if is_datetime(map) => {
            let raw = map.get(TOML_DATETIME_KEY).and_then(Value::as_str).unwrap_or_default();
            let datetime: toml_edit::Datetime = raw
                .parse()
                .map_err(|_| EncodeError::Datetime(path.to_string()))?;
            datetime.into()
        }
        Value::Object(map) => {
            let mut table = InlineTable::new();
            for (key, child) in map {
                table.insert(key.as_str(), to_value(child, &join(path, key))?);
            }
            table.into()
        }
    })
}

fn item_to_json(item: &Item) -> Value {
    match item {
        Item::None => Value::Null,
        Item::Value(value) => value_to_json(value),
        Item::Table(table) => Value::Object(
            table
                .iter()
                .map(|(key, child)| (key.to_string(), item_to_json(child)))
                .collect(),
        ),
        Item::ArrayOfTables(tables) => Value::Array(
            tables
                .iter()
                .map(|table| {
                    Value::Object(
                        table
                            .iter()
                            .map(|(key, child)| (key.to_string(), item_to_json(child)))
                            .collect(),
                    )
                })
                .collect(),
        ),
    }
}

fn value_to_json(value: &toml_edit::Value) -> Value {
    match value {
        toml_edit::Value::String(s) => Value::String(s.value().clone()),
        toml_edit::Value::Integer(i) => Value::from(*i.value()),
        toml_edit::Value::Float(f) => Number::from_f64(*f.value())
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml_edit::Value::Boolean(b) => Value::Bool(*b.value()),
        toml_edit::Value::Datetime(d) => {
            let mut map = Map::new();
            map.insert(TOML_DATETIME_KEY.to_string(), Value::String(d.value().to_string()));
            Value::Object(map)
        }
        toml_edit::Value::Array(array) => Value::Array(array.iter().map(value_to_json).collect()),
        toml_edit::Value::InlineTable(table) => Value::Object(
            table
                .iter()
                .map(|(key, child)| (key.to_string(), value_to_json(child)))
                .collect(),
        ),
    }
}
