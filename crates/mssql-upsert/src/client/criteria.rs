//! Criteria parameter binding.
//!
//! Callers supply a boolean SQL fragment with named `@placeholders` and a
//! list of name/value pairs. The fragment is rewritten to the driver's
//! positional `@PN` markers and the values are bound as real parameters;
//! values are never interpolated into the SQL text.

use tiberius::ToSql;

use crate::core::value::SqlValue;
use crate::error::{Result, UpsertError};

/// One named criteria parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Placeholder name, without the leading `@`.
    pub name: String,

    /// Bound value.
    pub value: SqlValue,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Rewrite `@name` placeholders to positional `@PN` markers and collect the
/// bound values in marker order.
///
/// Placeholders are numbered by first appearance; a name referenced twice
/// binds once. `@@` passes through untouched (system functions such as
/// `@@ROWCOUNT`), as does anything inside a single-quoted string literal.
/// A placeholder with no matching parameter is a configuration error.
pub(crate) fn bind(criteria: &str, params: &[Parameter]) -> Result<(String, Vec<Box<dyn ToSql>>)> {
    let mut sql = String::with_capacity(criteria.len());
    // Names in first-appearance order; index + 1 is the @PN position.
    let mut bound: Vec<&Parameter> = Vec::new();

    let mut chars = criteria.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if c == '\'' {
            // String literal: copy verbatim through the closing quote. A
            // doubled quote is the T-SQL escape and stays inside the literal.
            sql.push(c);
            while let Some((_, lc)) = chars.next() {
                sql.push(lc);
                if lc == '\'' {
                    if let Some((_, '\'')) = chars.peek() {
                        chars.next();
                        sql.push('\'');
                    } else {
                        break;
                    }
                }
            }
            continue;
        }

        if c != '@' {
            sql.push(c);
            continue;
        }

        if let Some((_, '@')) = chars.peek() {
            chars.next();
            sql.push_str("@@");
            continue;
        }

        let mut name = String::new();
        while let Some((_, nc)) = chars.peek() {
            if nc.is_ascii_alphanumeric() || *nc == '_' {
                name.push(*nc);
                chars.next();
            } else {
                break;
            }
        }

        if name.is_empty() {
            sql.push('@');
            continue;
        }

        let position = match bound.iter().position(|p| p.name == name) {
            Some(idx) => idx + 1,
            None => {
                let param = params.iter().find(|p| p.name == name).ok_or_else(|| {
                    UpsertError::Config(format!(
                        "Criteria references undeclared parameter @{}",
                        name
                    ))
                })?;
                bound.push(param);
                bound.len()
            }
        };

        sql.push_str(&format!("@P{}", position));
    }

    let values = bound.iter().map(|p| p.value.to_sql_param()).collect();
    Ok((sql, values))
}
