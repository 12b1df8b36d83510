//! Schema representation types.
//!
//! These types describe the structure of database tables. The schema
//! extractor produces them for the desired state, and the lock file stores
//! them for the state the last generated migration left behind.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Logical column types understood by the diff engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnType {
    /// Integer (16-bit).
    SmallInt,
    /// Integer (32-bit).
    Integer,
    /// Big integer (64-bit).
    BigInt,
    /// Auto-incrementing 16-bit integer.
    SmallSerial,
    /// Auto-incrementing 32-bit integer.
    Serial,
    /// Auto-incrementing 64-bit integer.
    BigSerial,
    /// Floating point (single precision).
    Real,
    /// Floating point (double precision).
    Double,
    /// Exact numeric with precision and scale.
    Numeric(u8, u8),
    /// Unbounded text.
    Text,
    /// Variable-length character string.
    Varchar(u32),
    /// Fixed-length character string.
    Char(u32),
    /// Boolean.
    Boolean,
    /// Date only.
    Date,
    /// Time only.
    Time,
    /// Timestamp without time zone.
    Timestamp,
    /// Timestamp with time zone.
    TimestampTz,
    /// Time interval.
    Interval,
    /// UUID.
    Uuid,
    /// ULID, stored with the same width as a UUID.
    Ulid,
    /// JSON stored as text.
    Json,
    /// Binary JSON.
    Jsonb,
    /// Binary data.
    Bytea,
    /// Array of another column type.
    Array(Box<ColumnType>),
}

/// Error returned when a column type string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid column type '{input}': {reason}")]
pub struct ParseColumnTypeError {
    input: String,
    reason: &'static str,
}

impl ColumnType {
    /// Creates an array type of `inner`.
    #[must_use]
    pub fn array(inner: ColumnType) -> Self {
        Self::Array(Box::new(inner))
    }

    /// Returns true for the auto-incrementing integer types.
    #[must_use]
    pub fn is_serial(&self) -> bool {
        matches!(self, Self::SmallSerial | Self::Serial | Self::BigSerial)
    }

    /// Returns the width rank of plain integer types.
    fn integer_rank(&self) -> Option<u8> {
        match self {
            Self::SmallInt => Some(1),
            Self::Integer => Some(2),
            Self::BigInt => Some(3),
            _ => None,
        }
    }

    /// Decimal digits needed to hold any value of a plain integer type.
    fn integer_digits(&self) -> Option<u8> {
        match self {
            Self::SmallInt => Some(5),
            Self::Integer => Some(10),
            Self::BigInt => Some(19),
            _ => None,
        }
    }

    /// Returns true if every value of `self` converts to `target` without
    /// loss.
    ///
    /// This is a deliberately small allow-list. Anything not listed here is
    /// treated as a change that needs a human to write the migration.
    #[must_use]
    pub fn widens_to(&self, target: &ColumnType) -> bool {
        if self == target {
            return true;
        }
        if let (Some(from), Some(to)) = (self.integer_rank(), target.integer_rank()) {
            return to > from;
        }
        match (self, target) {
            (Self::SmallInt, Self::Real | Self::Double) | (Self::Integer, Self::Double) => true,
            (Self::Real, Self::Double) => true,
            (Self::SmallInt | Self::Integer | Self::BigInt, Self::Numeric(p, s)) => self
                .integer_digits()
                .is_some_and(|digits| p.saturating_sub(*s) >= digits),
            (Self::Numeric(p, s), Self::Numeric(p2, s2)) => {
                s2 >= s && p2.saturating_sub(*s2) >= p.saturating_sub(*s)
            }
            (Self::Varchar(n), Self::Varchar(m)) => m >= n,
            (Self::Varchar(_), Self::Text) => true,
            (Self::Array(a), Self::Array(b)) => a.widens_to(b),
            _ => false,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SmallInt => f.write_str("smallint"),
            Self::Integer => f.write_str("integer"),
            Self::BigInt => f.write_str("bigint"),
            Self::SmallSerial => f.write_str("smallserial"),
            Self::Serial => f.write_str("serial"),
            Self::BigSerial => f.write_str("bigserial"),
            Self::Real => f.write_str("real"),
            Self::Double => f.write_str("double"),
            Self::Numeric(p, s) => write!(f, "numeric({p},{s})"),
            Self::Text => f.write_str("text"),
            Self::Varchar(n) => write!(f, "varchar({n})"),
            Self::Char(n) => write!(f, "char({n})"),
            Self::Boolean => f.write_str("boolean"),
            Self::Date => f.write_str("date"),
            Self::Time => f.write_str("time"),
            Self::Timestamp => f.write_str("timestamp"),
            Self::TimestampTz => f.write_str("timestamptz"),
            Self::Interval => f.write_str("interval"),
            Self::Uuid => f.write_str("uuid"),
            Self::Ulid => f.write_str("ulid"),
            Self::Json => f.write_str("json"),
            Self::Jsonb => f.write_str("jsonb"),
            Self::Bytea => f.write_str("bytea"),
            Self::Array(inner) => write!(f, "{inner}[]"),
        }
    }
}

impl FromStr for ColumnType {
    type Err = ParseColumnTypeError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let err = |reason| ParseColumnTypeError {
            input: input.to_string(),
            reason,
        };
        let s = input.trim();

        if let Some(inner) = s.strip_suffix("[]") {
            return inner.parse().map(Self::array).map_err(|e| ParseColumnTypeError {
                input: input.to_string(),
                reason: e.reason,
            });
        }

        let (name, args) = match s.find('(') {
            Some(open) => {
                let close = s.strip_suffix(')').ok_or_else(|| err("unclosed parameter list"))?;
                let args: Vec<&str> = close[open + 1..].split(',').map(str::trim).collect();
                (&s[..open], Some(args))
            }
            None => (s, None),
        };

        match (name, args.as_deref()) {
            ("smallint", None) => Ok(Self::SmallInt),
            ("integer", None) => Ok(Self::Integer),
            ("bigint", None) => Ok(Self::BigInt),
            ("smallserial", None) => Ok(Self::SmallSerial),
            ("serial", None) => Ok(Self::Serial),
            ("bigserial", None) => Ok(Self::BigSerial),
            ("real", None) => Ok(Self::Real),
            ("double", None) => Ok(Self::Double),
            ("text", None) => Ok(Self::Text),
            ("boolean", None) => Ok(Self::Boolean),
            ("date", None) => Ok(Self::Date),
            ("time", None) => Ok(Self::Time),
            ("timestamp", None) => Ok(Self::Timestamp),
            ("timestamptz", None) => Ok(Self::TimestampTz),
            ("interval", None) => Ok(Self::Interval),
            ("uuid", None) => Ok(Self::Uuid),
            ("ulid", None) => Ok(Self::Ulid),
            ("json", None) => Ok(Self::Json),
            ("jsonb", None) => Ok(Self::Jsonb),
            ("bytea", None) => Ok(Self::Bytea),
            ("varchar", Some([n])) => n
                .parse()
                .map(Self::Varchar)
                .map_err(|_| err("length must be a positive integer")),
            ("char", Some([n])) => n
                .parse()
                .map(Self::Char)
                .map_err(|_| err("length must be a positive integer")),
            ("numeric", Some([p, s])) => {
                let precision: u8 = p.parse().map_err(|_| err("precision must be 0-255"))?;
                let scale: u8 = s.parse().map_err(|_| err("scale must be 0-255"))?;
                if scale > precision {
                    return Err(err("scale exceeds precision"));
                }
                Ok(Self::Numeric(precision, scale))
            }
            (_, Some(_)) => Err(err("unexpected parameters")),
            _ => Err(err("unknown type name")),
        }
    }
}

impl TryFrom<String> for ColumnType {
    type Error = ParseColumnTypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ColumnType> for String {
    fn from(value: ColumnType) -> Self {
        value.to_string()
    }
}

/// A foreign key reference from a column to another table's column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Reference {
    /// Referenced table name.
    pub table: String,
    /// Referenced column name.
    pub column: String,
}

fn default_nullable() -> bool {
    true
}

/// Schema definition for a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Logical data type.
    #[serde(rename = "type")]
    pub ty: ColumnType,
    /// Whether the column allows NULL values.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// Default value as a raw SQL expression.
    #[serde(default)]
    pub default: Option<String>,
    /// Whether this column is part of the primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// Foreign key reference, if any.
    #[serde(default)]
    pub references: Option<Reference>,
}

impl Column {
    /// Creates a new nullable column.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            default: None,
            primary_key: false,
            references: None,
        }
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the column as nullable.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Sets the default value expression.
    #[must_use]
    pub fn default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Marks the column as (part of) the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false; // Primary keys are always NOT NULL
        self
    }

    /// Adds a foreign key reference.
    #[must_use]
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(Reference {
            table: table.into(),
            column: column.into(),
        });
        self
    }
}

/// Schema definition for an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Index {
    /// Index name.
    pub name: String,
    /// Columns included in the index.
    pub columns: Vec<String>,
    /// Whether this is a unique index.
    #[serde(default)]
    pub unique: bool,
}

impl Index {
    /// Creates a new non-unique index.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    /// Makes this a unique index.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Complete schema definition for a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Column definitions, in declaration order.
    pub columns: Vec<Column>,
    /// Indexes keyed by name.
    #[serde(default, with = "by_name")]
    pub indexes: BTreeMap<String, Index>,
}

impl Table {
    /// Creates a new table schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indexes: BTreeMap::new(),
        }
    }

    /// Adds a column to the table.
    #[must_use]
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: Index) -> Self {
        self.indexes.insert(index.name.clone(), index);
        self
    }

    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Gets a mutable column by name.
    #[must_use]
    pub fn get_column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Returns the primary key column names in declaration order.
    #[must_use]
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Returns true if `column` alone identifies a row, so a foreign key
    /// may reference it: it is the whole primary key, or it has a
    /// single-column unique index.
    #[must_use]
    pub fn is_key(&self, column: &str) -> bool {
        self.primary_key() == [column]
            || self
                .indexes
                .values()
                .any(|index| index.unique && index.columns == [column])
    }

    /// Returns the names of other tables this table references.
    #[must_use]
    pub fn referenced_tables(&self) -> BTreeSet<&str> {
        self.columns
            .iter()
            .filter_map(|c| c.references.as_ref())
            .map(|r| r.table.as_str())
            .filter(|t| *t != self.name)
            .collect()
    }
}

/// The complete database schema at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaSnapshot {
    /// Tables keyed by name, sorted for deterministic iteration.
    #[serde(with = "by_name")]
    pub tables: BTreeMap<String, Table>,
}

impl SchemaSnapshot {
    /// Creates a new empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table to the snapshot.
    #[must_use]
    pub fn table(mut self, table: Table) -> Self {
        self.add_table(table);
        self
    }

    /// Adds or replaces a table.
    pub fn add_table(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    /// Gets a table by name.
    #[must_use]
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Gets a mutable table by name.
    #[must_use]
    pub fn get_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    /// Returns table names in order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Returns true if the snapshot has no tables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Checks that the snapshot is well formed.
    ///
    /// Returns a message describing the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        let mut index_names = BTreeSet::new();

        for (key, table) in &self.tables {
            if table.name.is_empty() {
                return Err("table with an empty name".to_string());
            }
            if *key != table.name {
                return Err(format!("table '{}' stored under key '{}'", table.name, key));
            }

            let mut column_names = BTreeSet::new();
            for column in &table.columns {
                if column.name.is_empty() {
                    return Err(format!("table '{}' has a column with an empty name", key));
                }
                if !column_names.insert(column.name.as_str()) {
                    return Err(format!(
                        "column '{}' appears more than once in table '{}'",
                        column.name, key
                    ));
                }
                if let Some(reference) = &column.references {
                    let target = self.tables.get(&reference.table).ok_or_else(|| {
                        format!(
                            "column '{}.{}' references missing table '{}'",
                            key, column.name, reference.table
                        )
                    })?;
                    if target.get_column(&reference.column).is_none() {
                        return Err(format!(
                            "column '{}.{}' references missing column '{}.{}'",
                            key, column.name, reference.table, reference.column
                        ));
                    }
                }
            }

            for (index_key, index) in &table.indexes {
                if *index_key != index.name {
                    return Err(format!(
                        "index '{}' stored under key '{}' in table '{}'",
                        index.name, index_key, key
                    ));
                }
                if !index_names.insert(index.name.as_str()) {
                    return Err(format!("index name '{}' is used more than once", index.name));
                }
                if index.columns.is_empty() {
                    return Err(format!("index '{}' has no columns", index.name));
                }
                if let Some(missing) = index
                    .columns
                    .iter()
                    .find(|c| !column_names.contains(c.as_str()))
                {
                    return Err(format!(
                        "index '{}' covers missing column '{}.{}'",
                        index.name, key, missing
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Serializes a name-keyed map as an array of its values and rejects
/// duplicate names when reading it back.
pub(crate) mod by_name {
    use std::collections::BTreeMap;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{Index, Table};

    pub trait Named {
        fn name(&self) -> &str;
    }

    impl Named for Table {
        fn name(&self) -> &str {
            &self.name
        }
    }

    impl Named for Index {
        fn name(&self) -> &str {
            &self.name
        }
    }

    pub fn serialize<S, T>(map: &BTreeMap<String, T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        serializer.collect_seq(map.values())
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<BTreeMap<String, T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Named,
    {
        let items = Vec::<T>::deserialize(deserializer)?;
        let mut map = BTreeMap::new();
        for item in items {
            let name = item.name().to_string();
            if map.insert(name.clone(), item).is_some() {
                return Err(D::Error::custom(format!("duplicate entry '{name}'")));
            }
        }
        Ok(map)
    }
}
