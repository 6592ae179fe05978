//! Activation of typed instances from result rows.
//!
//! A query may project any subset of the mapped columns (criteria-filtered
//! reads select all of them, but nothing requires that), so activation
//! matches mapped property names against the columns actually present in the
//! result set and tolerates missing or extra columns.

use tiberius::Row;

use crate::core::value::SqlValue;
use crate::error::Result;
use crate::mapping::ClassMap;

/// Column name to decoded value lookup for one result row.
///
/// Names match case-sensitively. Separating the lookup from the driver row
/// keeps activation pure and testable.
#[derive(Debug, Clone, Default)]
pub struct RowLookup {
    values: Vec<(String, SqlValue)>,
}

impl RowLookup {
    pub fn new(values: Vec<(String, SqlValue)>) -> Self {
        Self { values }
    }

    /// Look up a decoded value by exact property name.
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Decode a driver row into a lookup, driven by the map's column types.
    ///
    /// Mapped properties with no matching result column are simply absent
    /// from the lookup.
    pub(crate) fn from_row<T>(map: &ClassMap<T>, row: &Row) -> Result<Self> {
        let mut values = Vec::with_capacity(map.properties().len());
        for prop in map.properties() {
            let idx = row
                .columns()
                .iter()
                .position(|col| col.name() == prop.name());
            if let Some(idx) = idx {
                let value = prop.column_type().decode(row, idx)?;
                values.push((prop.name().to_string(), value));
            }
        }
        Ok(Self { values })
    }
}

/// Build a typed instance from a row lookup.
///
/// Starts from `T::default()` and applies every mapped property present in
/// the lookup, NULLs included (the mapping's `set` accessor decides what a
/// NULL means for its field). Properties absent from the result set are left
/// at their default value; no type coercion is attempted.
pub fn activate<T: Default>(map: &ClassMap<T>, lookup: &RowLookup) -> T {
    let mut instance = T::default();
    for prop in map.properties() {
        if let Some(value) = lookup.get(prop.name()) {
            prop.set(&mut instance, value.clone());
        }
    }
    instance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::SqlNullType;
    use crate::mapping::{ClassMap, ColumnType};

    #[derive(Debug, Default, PartialEq)]
    struct Person {
        id: i32,
        name: String,
        score: Option<f64>,
    }

    fn person_map() -> ClassMap<Person> {
        ClassMap::<Person>::builder("Person")
            .key(
                "Id",
                ColumnType::Int,
                |p| p.id.into(),
                |p, v| {
                    if let Some(id) = v.as_i32() {
                        p.id = id;
                    }
                },
            )
            .column(
                "Name",
                ColumnType::NVarChar(Some(200)),
                |p| p.name.clone().into(),
                |p, v| {
                    if let Some(name) = v.into_string() {
                        p.name = name;
                    }
                },
            )
            .column(
                "Score",
                ColumnType::Float,
                |p| match p.score {
                    Some(s) => s.into(),
                    None => SqlValue::Null(SqlNullType::F64),
                },
                |p, v| p.score = v.as_f64(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_activate_full_row() {
        let map = person_map();
        let lookup = RowLookup::new(vec![
            ("Id".to_string(), SqlValue::I32(3)),
            ("Name".to_string(), SqlValue::String("Ada".to_string())),
            ("Score".to_string(), SqlValue::F64(12.5)),
        ]);

        let person = activate(&map, &lookup);
        assert_eq!(
            person,
            Person {
                id: 3,
                name: "Ada".to_string(),
                score: Some(12.5),
            }
        );
    }

    #[test]
    fn test_activate_missing_columns_left_at_default() {
        let map = person_map();
        let lookup = RowLookup::new(vec![("Id".to_string(), SqlValue::I32(9))]);

        let person = activate(&map, &lookup);
        assert_eq!(person.id, 9);
        assert_eq!(person.name, "");
        assert_eq!(person.score, None);
    }

    #[test]
    fn test_activate_null_passed_to_accessor() {
        let map = person_map();
        let lookup = RowLookup::new(vec![
            ("Id".to_string(), SqlValue::I32(1)),
            ("Score".to_string(), SqlValue::Null(SqlNullType::F64)),
        ]);

        let person = activate(&map, &lookup);
        assert_eq!(person.score, None);
    }

    #[test]
    fn test_activate_extra_columns_ignored() {
        let map = person_map();
        let lookup = RowLookup::new(vec![
            ("Id".to_string(), SqlValue::I32(2)),
            ("Unmapped".to_string(), SqlValue::String("x".to_string())),
        ]);

        let person = activate(&map, &lookup);
        assert_eq!(person.id, 2);
    }

    #[test]
    fn test_lookup_names_are_case_sensitive() {
        let map = person_map();
        let lookup = RowLookup::new(vec![("id".to_string(), SqlValue::I32(5))]);

        let person = activate(&map, &lookup);
        assert_eq!(person.id, 0);
    }

    #[test]
    fn test_encode_activate_round_trip_preserves_order_and_values() {
        let map = person_map();
        let source = Person {
            id: 11,
            name: "Grace".to_string(),
            score: None,
        };

        // Encode through every mapping in map order, then activate back.
        let lookup = RowLookup::new(
            map.properties()
                .iter()
                .map(|p| (p.name().to_string(), p.get(&source)))
                .collect(),
        );
        let rebuilt = activate(&map, &lookup);
        assert_eq!(rebuilt, source);
    }
}
