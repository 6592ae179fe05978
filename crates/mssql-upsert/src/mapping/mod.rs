//! Explicit type-to-table mapping registration.
//!
//! A [`ClassMap`] is the ordered, immutable description of a type's persisted
//! columns. It is built once at startup through [`ClassMapBuilder`] and shared
//! by every operation on the mapped type. Registration order is the column
//! order: table DDL, table type DDL, the generated procedure, and bulk
//! parameter encoding all derive from this one list and are never re-ordered
//! independently.

pub mod types;

use std::fmt;
use std::sync::Arc;

use crate::core::value::SqlValue;
use crate::error::{Result, UpsertError};

pub use types::ColumnType;

/// Accessor that extracts a property's value from an instance.
pub type GetFn<T> = Arc<dyn Fn(&T) -> SqlValue + Send + Sync>;

/// Accessor that assigns a decoded value into an instance.
pub type SetFn<T> = Arc<dyn Fn(&mut T, SqlValue) + Send + Sync>;

/// Mapping of one persisted property to one column.
///
/// Built once at mapping time, immutable thereafter.
pub struct PropertyMapping<T> {
    name: String,
    column_type: ColumnType,
    is_key: bool,
    get: GetFn<T>,
    set: SetFn<T>,
}

impl<T> PropertyMapping<T> {
    /// Column/property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Semantic SQL type of the column.
    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    /// Whether this property is part of the merge key.
    pub fn is_key(&self) -> bool {
        self.is_key
    }

    /// Extract this property's value from an instance.
    pub fn get(&self, instance: &T) -> SqlValue {
        (self.get)(instance)
    }

    /// Assign a decoded value into an instance.
    pub fn set(&self, instance: &mut T, value: SqlValue) {
        (self.set)(instance, value)
    }
}

impl<T> Clone for PropertyMapping<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            column_type: self.column_type,
            is_key: self.is_key,
            get: Arc::clone(&self.get),
            set: Arc::clone(&self.set),
        }
    }
}

impl<T> fmt::Debug for PropertyMapping<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyMapping")
            .field("name", &self.name)
            .field("column_type", &self.column_type)
            .field("is_key", &self.is_key)
            .finish()
    }
}

/// Type-erased column description consumed by the schema generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,

    /// Semantic SQL type.
    pub column_type: ColumnType,

    /// Whether the column is part of the merge key.
    pub is_key: bool,
}

/// Ordered, immutable description of a type's persisted shape.
pub struct ClassMap<T> {
    type_name: String,
    properties: Vec<PropertyMapping<T>>,
    extra_criteria: Option<String>,
}

impl<T> ClassMap<T> {
    /// Start building a map for a type. `type_name` doubles as the default
    /// table name.
    pub fn builder(type_name: impl Into<String>) -> ClassMapBuilder<T> {
        ClassMapBuilder {
            type_name: type_name.into(),
            properties: Vec::new(),
            extra_criteria: None,
        }
    }

    /// The mapped type's name (default table name).
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// All property mappings in declaration order.
    pub fn properties(&self) -> &[PropertyMapping<T>] {
        &self.properties
    }

    /// The key subset of the property mappings, in declaration order.
    pub fn key_properties(&self) -> impl Iterator<Item = &PropertyMapping<T>> {
        self.properties.iter().filter(|p| p.is_key)
    }

    /// Whether any property is declared as a key. Key-less maps describe
    /// append-only types: they get no primary key and an insert-only
    /// procedure.
    pub fn has_keys(&self) -> bool {
        self.properties.iter().any(|p| p.is_key)
    }

    /// Additional predicate narrowing which target rows are eligible for
    /// matching during the merge.
    pub fn extra_criteria(&self) -> Option<&str> {
        self.extra_criteria.as_deref()
    }

    /// Type-erased column list, in declaration order. This is the single
    /// ordered list every generated artifact derives from.
    pub fn column_specs(&self) -> Vec<ColumnSpec> {
        self.properties
            .iter()
            .map(|p| ColumnSpec {
                name: p.name.clone(),
                column_type: p.column_type,
                is_key: p.is_key,
            })
            .collect()
    }
}

impl<T> Clone for ClassMap<T> {
    fn clone(&self) -> Self {
        Self {
            type_name: self.type_name.clone(),
            properties: self.properties.clone(),
            extra_criteria: self.extra_criteria.clone(),
        }
    }
}

impl<T> fmt::Debug for ClassMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassMap")
            .field("type_name", &self.type_name)
            .field("properties", &self.properties)
            .field("extra_criteria", &self.extra_criteria)
            .finish()
    }
}

/// Builder for [`ClassMap`]. Registration order defines column order.
pub struct ClassMapBuilder<T> {
    type_name: String,
    properties: Vec<PropertyMapping<T>>,
    extra_criteria: Option<String>,
}

impl<T> ClassMapBuilder<T> {
    /// Register a non-key column.
    pub fn column<G, S>(
        self,
        name: impl Into<String>,
        column_type: ColumnType,
        get: G,
        set: S,
    ) -> Self
    where
        G: Fn(&T) -> SqlValue + Send + Sync + 'static,
        S: Fn(&mut T, SqlValue) + Send + Sync + 'static,
    {
        self.push(name.into(), column_type, false, get, set)
    }

    /// Register a key column. Key columns drive merge matching and form the
    /// table's primary key.
    pub fn key<G, S>(
        self,
        name: impl Into<String>,
        column_type: ColumnType,
        get: G,
        set: S,
    ) -> Self
    where
        G: Fn(&T) -> SqlValue + Send + Sync + 'static,
        S: Fn(&mut T, SqlValue) + Send + Sync + 'static,
    {
        self.push(name.into(), column_type, true, get, set)
    }

    /// Set an extra predicate appended to the merge's ON clause, narrowing
    /// which target rows are eligible for matching (e.g. a tenant filter).
    /// The fragment may reference the `target` and `source` aliases.
    pub fn extra_criteria(mut self, criteria: impl Into<String>) -> Self {
        self.extra_criteria = Some(criteria.into());
        self
    }

    fn push<G, S>(
        mut self,
        name: String,
        column_type: ColumnType,
        is_key: bool,
        get: G,
        set: S,
    ) -> Self
    where
        G: Fn(&T) -> SqlValue + Send + Sync + 'static,
        S: Fn(&mut T, SqlValue) + Send + Sync + 'static,
    {
        self.properties.push(PropertyMapping {
            name,
            column_type,
            is_key,
            get: Arc::new(get),
            set: Arc::new(set),
        });
        self
    }

    /// Finish the map. Fails fast on an empty property list or duplicate
    /// property names.
    pub fn build(self) -> Result<ClassMap<T>> {
        if self.properties.is_empty() {
            return Err(UpsertError::Config(format!(
                "ClassMap for {} has no properties",
                self.type_name
            )));
        }

        for (i, prop) in self.properties.iter().enumerate() {
            crate::core::identifier::validate_identifier(&prop.name)?;
            if self.properties[..i].iter().any(|p| p.name == prop.name) {
                return Err(UpsertError::Config(format!(
                    "ClassMap for {} declares property {} more than once",
                    self.type_name, prop.name
                )));
            }
        }

        crate::core::identifier::validate_identifier(&self.type_name)?;

        Ok(ClassMap {
            type_name: self.type_name,
            properties: self.properties,
            extra_criteria: self.extra_criteria,
        })
    }
}
