//! Fields and schemas.
//!
//! Schemas are immutable once constructed. Lookup maps are built eagerly in
//! the constructor, derived schemas (after alias, join, projection) are new
//! values.
use std::fmt;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::errors::{QuarryError, Result, field_not_found};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    Integer,
    Float,
    String,
    Boolean,
    Date,
    DateTime,
    Time,
    Record,
    Binary,
    /// Type of a NULL literal or of a value only known at execution time.
    Null,
}

impl DataType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Float)
    }

    /// Check if a value of `other` may be used where `self` is expected.
    ///
    /// NULL is compatible with everything, integers and floats are
    /// compatible with each other.
    pub fn is_compatible_with(&self, other: &DataType) -> bool {
        self == other
            || *self == DataType::Null
            || *other == DataType::Null
            || (self.is_numeric() && other.is_numeric())
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::String => "STRING",
            Self::Boolean => "BOOLEAN",
            Self::Date => "DATE",
            Self::DateTime => "DATETIME",
            Self::Time => "TIME",
            Self::Record => "RECORD",
            Self::Binary => "BINARY",
            Self::Null => "NULL",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    Required,
    #[default]
    Nullable,
    Repeated,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub datatype: DataType,
    #[serde(default)]
    pub mode: FieldMode,
    /// Nested fields, only for RECORD fields.
    #[serde(default)]
    pub fields: Vec<Field>,
    /// Name of the schema owning this field, used for qualified lookups.
    #[serde(default, skip_serializing)]
    pub schema_name: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Field {
            name: name.into(),
            datatype,
            mode: FieldMode::Nullable,
            fields: Vec::new(),
            schema_name: None,
        }
    }

    pub fn with_mode(mut self, mode: FieldMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_fields(mut self, fields: Vec<Field>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_schema_name(mut self, schema_name: Option<String>) -> Self {
        self.schema_name = schema_name;
        self
    }

    /// Name qualified by the owning schema if there is one.
    pub fn path(&self) -> String {
        match &self.schema_name {
            Some(schema) => format!("{schema}.{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Get a nested field by name.
    pub fn nested(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path(), self.datatype)?;
        match self.mode {
            FieldMode::Required => write!(f, " REQUIRED"),
            FieldMode::Repeated => write!(f, " REPEATED"),
            FieldMode::Nullable => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Schema {
    name: Option<String>,
    fields: Vec<Field>,
    /// Unqualified name -> positions.
    by_name: HashMap<String, Vec<usize>>,
    /// Qualified path -> positions.
    by_path: HashMap<String, Vec<usize>>,
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.fields == other.fields
    }
}

impl Eq for Schema {}

impl Schema {
    pub fn new(fields: impl IntoIterator<Item = Field>) -> Self {
        Self::build(None, fields.into_iter().collect())
    }

    pub fn named(name: impl Into<String>, fields: impl IntoIterator<Item = Field>) -> Self {
        Self::build(Some(name.into()), fields.into_iter().collect())
    }

    pub fn empty() -> Self {
        Self::new([])
    }

    fn build(name: Option<String>, fields: Vec<Field>) -> Self {
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_path: HashMap<String, Vec<usize>> = HashMap::new();

        for (idx, field) in fields.iter().enumerate() {
            by_name.entry(field.name.clone()).or_default().push(idx);
            let qualifier = field.schema_name.as_ref().or(name.as_ref());
            if let Some(qualifier) = qualifier {
                by_path
                    .entry(format!("{qualifier}.{}", field.name))
                    .or_default()
                    .push(idx);
            }
        }

        Schema {
            name,
            fields,
            by_name,
            by_path,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<Field> {
        self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Same fields under a different schema name.
    pub fn with_name(&self, name: Option<String>) -> Self {
        Self::build(name, self.fields.clone())
    }

    /// Re-qualify every field under `name`, used for aliasing a relation.
    pub fn qualified(&self, name: &str) -> Self {
        let fields = self
            .fields
            .iter()
            .map(|f| f.clone().with_schema_name(Some(name.to_string())))
            .collect();
        Self::build(Some(name.to_string()), fields)
    }

    /// Qualify fields that don't already have an owning schema.
    pub fn qualify_unowned(&self, name: &str) -> Self {
        let fields = self
            .fields
            .iter()
            .map(|f| match f.schema_name {
                Some(_) => f.clone(),
                None => f.clone().with_schema_name(Some(name.to_string())),
            })
            .collect();
        Self::build(Some(name.to_string()), fields)
    }

    /// Concatenate fields of two schemas, left first.
    ///
    /// Fields keep their qualifiers. Unqualified fields pick up the name of
    /// their source schema if it has one.
    pub fn merge(left: &Schema, right: &Schema) -> Schema {
        let qualify = |schema: &Schema| -> Vec<Field> {
            schema
                .fields
                .iter()
                .map(|f| match (&f.schema_name, &schema.name) {
                    (None, Some(name)) => f.clone().with_schema_name(Some(name.clone())),
                    _ => f.clone(),
                })
                .collect::<Vec<_>>()
        };

        let mut fields = qualify(left);
        fields.extend(qualify(right));

        Self::build(None, fields)
    }

    /// Resolve a field by name or `qualifier.name`, returning its position.
    pub fn resolve(&self, path: &str) -> Result<(usize, &Field)> {
        let candidates = match self.by_path.get(path) {
            Some(positions) => Some(positions),
            None => self.by_name.get(path),
        };

        match candidates.map(|c| c.as_slice()) {
            Some([idx]) => Ok((*idx, &self.fields[*idx])),
            Some(positions) if !positions.is_empty() => Err(QuarryError::AmbiguousField {
                path: path.to_string(),
                candidates: positions.iter().map(|idx| self.fields[*idx].path()).collect(),
            }),
            _ => {
                let names = self
                    .by_name
                    .keys()
                    .chain(self.by_path.keys())
                    .map(|s| s.as_str());
                Err(field_not_found(path, names))
            }
        }
    }

    /// Position of a field in the schema.
    pub fn field_position(&self, path: &str) -> Result<usize> {
        self.resolve(path).map(|(idx, _)| idx)
    }

    /// Positions selected by `*` or `qualifier.*`.
    pub fn select_all(&self, qualifier: Option<&str>) -> Result<Vec<usize>> {
        let Some(qualifier) = qualifier else {
            return Ok((0..self.fields.len()).collect());
        };

        let positions: Vec<_> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| {
                f.schema_name.as_deref().or(self.name.as_deref()) == Some(qualifier)
            })
            .map(|(idx, _)| idx)
            .collect();

        if positions.is_empty() {
            let qualifiers = self
                .fields
                .iter()
                .filter_map(|f| f.schema_name.as_deref().or(self.name.as_deref()));
            return Err(field_not_found(format!("{qualifier}.*"), qualifiers));
        }

        Ok(positions)
    }

    /// Like `resolve`, but a missing field is `None` instead of an error.
    pub fn try_resolve(&self, path: &str) -> Result<Option<(usize, &Field)>> {
        match self.resolve(path) {
            Ok(found) => Ok(Some(found)),
            Err(QuarryError::FieldNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{name}")?;
        }
        write!(f, "(")?;
        for (idx, field) in self.fields.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{field}")?;
        }
        write!(f, ")")
    }
}
