//! # Catalog Interface
//!
//! The catalog is the planner's read-only window onto the database: row counts,
//! declared index collations, index range probes and positional column fetches
//! for sampling. The planner never writes through it.
//!
//! ## Trait Design
//!
//! `Catalog` sits behind a trait object (`&dyn Catalog`) so that a storage engine
//! can plug in its own metadata. `InMemoryCatalog` keeps whole tables in memory;
//! it backs the tests and the HTTP service.
//!
//! ## Index Probes
//!
//! `probe_index` returns how many rows of the table fall inside a range over the
//! index collation. A range narrower than the collation is a prefix probe: a
//! range over the first column covers every key sharing that leading value.

use crate::error::{PlanError, Result};
use crate::expr::TableName;
use crate::range::SelectableRange;
use crate::value::ScalarValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One column of an index collation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollationColumn {
    pub column: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

impl CollationColumn {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }
}

/// A declared index: its name and ordered collation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub collation: Vec<CollationColumn>,
}

impl IndexDef {
    /// Ascending index over `columns`, in the given order.
    pub fn ascending(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            collation: columns.iter().map(|c| CollationColumn::asc(*c)).collect(),
        }
    }

    pub fn columns(&self) -> Vec<String> {
        self.collation.iter().map(|c| c.column.clone()).collect()
    }

    pub fn all_ascending(&self) -> bool {
        self.collation.iter().all(|c| c.ascending)
    }

    pub fn leading_column(&self) -> Option<&str> {
        self.collation.first().map(|c| c.column.as_str())
    }
}

/// Read-only table and index metadata.
pub trait Catalog: Send + Sync {
    /// Current number of rows of a base table.
    fn row_count(&self, table: &TableName) -> Result<u64>;

    /// Indexes declared on a base table.
    fn indexes(&self, table: &TableName) -> Result<Vec<IndexDef>>;

    /// Number of rows whose index key lies in `range`.
    fn probe_index(&self, table: &TableName, index: &str, range: &SelectableRange) -> Result<u64>;

    /// Values of one column at the given row positions (`0..row_count`).
    fn fetch_column(
        &self,
        table: &TableName,
        column: &str,
        positions: &[u64],
    ) -> Result<Vec<ScalarValue>>;
}

/// A table held entirely in memory, row-major.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryTable {
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<ScalarValue>>,
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
}

impl InMemoryTable {
    fn column_position(&self, table: &TableName, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| PlanError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            })
    }

    fn value(&self, row: usize, col: usize) -> ScalarValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .cloned()
            .unwrap_or(ScalarValue::Null)
    }
}

/// In-memory catalog for tests and the planning service.
///
/// Tables are keyed by their qualified name. Index probes scan the rows, so this
/// is only meant for small fixtures.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    tables: HashMap<TableName, InMemoryTable>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(
        &mut self,
        name: TableName,
        columns: Vec<String>,
        rows: Vec<Vec<ScalarValue>>,
    ) {
        self.tables.insert(
            name,
            InMemoryTable {
                columns,
                rows,
                indexes: Vec::new(),
            },
        );
    }

    /// Insert a fully described table, indexes included. Index columns are
    /// checked against the table's columns.
    pub fn insert_table(&mut self, name: TableName, table: InMemoryTable) -> Result<()> {
        for index in &table.indexes {
            for col in &index.collation {
                table.column_position(&name, &col.column)?;
            }
        }
        self.tables.insert(name, table);
        Ok(())
    }

    pub fn add_index(&mut self, table: &TableName, index: IndexDef) -> Result<()> {
        let entry = self.tables.get_mut(table).ok_or_else(|| PlanError::UnknownTable {
            table: table.to_string(),
        })?;
        for col in &index.collation {
            entry.column_position(table, &col.column)?;
        }
        entry.indexes.push(index);
        Ok(())
    }

    fn table(&self, table: &TableName) -> Result<&InMemoryTable> {
        self.tables.get(table).ok_or_else(|| PlanError::UnknownTable {
            table: table.to_string(),
        })
    }
}

impl Catalog for InMemoryCatalog {
    fn row_count(&self, table: &TableName) -> Result<u64> {
        Ok(self.table(table)?.rows.len() as u64)
    }

    fn indexes(&self, table: &TableName) -> Result<Vec<IndexDef>> {
        Ok(self.table(table)?.indexes.clone())
    }

    fn probe_index(&self, table: &TableName, index: &str, range: &SelectableRange) -> Result<u64> {
        let t = self.table(table)?;
        let def = t
            .indexes
            .iter()
            .find(|i| i.name == index)
            .ok_or_else(|| PlanError::UnknownIndex {
                table: table.to_string(),
                index: index.to_string(),
            })?;
        let key_columns = def
            .collation
            .iter()
            .map(|c| t.column_position(table, &c.column))
            .collect::<Result<Vec<_>>>()?;
        let count = (0..t.rows.len())
            .filter(|row| {
                let key: Vec<ScalarValue> = key_columns.iter().map(|c| t.value(*row, *c)).collect();
                range.intersects(&key)
            })
            .count();
        Ok(count as u64)
    }

    fn fetch_column(
        &self,
        table: &TableName,
        column: &str,
        positions: &[u64],
    ) -> Result<Vec<ScalarValue>> {
        let t = self.table(table)?;
        let col = t.column_position(table, column)?;
        Ok(positions.iter().map(|p| t.value(*p as usize, col)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::CompareOp;

    fn catalog() -> (InMemoryCatalog, TableName) {
        let name = TableName::new("t");
        let mut cat = InMemoryCatalog::new();
        let rows = (0..10)
            .map(|i| vec![ScalarValue::Int64(i % 3), ScalarValue::Int64(i)])
            .collect();
        cat.add_table(name.clone(), vec!["a".into(), "b".into()], rows);
        cat.add_index(&name, IndexDef::ascending("t_ab", &["a", "b"])).unwrap();
        (cat, name)
    }

    #[test]
    fn test_prefix_probe_counts_matching_keys() {
        let (cat, t) = catalog();
        let a_is_1 = SelectableRange::construct(CompareOp::Eq, vec![ScalarValue::Int64(1)]).unwrap();
        assert_eq!(cat.probe_index(&t, "t_ab", &a_is_1).unwrap(), 3);
        let point = SelectableRange::construct(
            CompareOp::Eq,
            vec![ScalarValue::Int64(1), ScalarValue::Int64(4)],
        )
        .unwrap();
        assert_eq!(cat.probe_index(&t, "t_ab", &point).unwrap(), 1);
    }

    #[test]
    fn test_unknown_names_are_errors() {
        let (mut cat, t) = catalog();
        assert!(matches!(
            cat.row_count(&TableName::new("missing")),
            Err(PlanError::UnknownTable { .. })
        ));
        assert!(matches!(
            cat.add_index(&t, IndexDef::ascending("bad", &["zzz"])),
            Err(PlanError::UnknownColumn { .. })
        ));
        assert!(matches!(
            cat.probe_index(&t, "nope", &SelectableRange::full(1)),
            Err(PlanError::UnknownIndex { .. })
        ));
    }

    #[test]
    fn test_fetch_column_by_position() {
        let (cat, t) = catalog();
        let values = cat.fetch_column(&t, "b", &[0, 9, 42]).unwrap();
        assert_eq!(
            values,
            vec![ScalarValue::Int64(0), ScalarValue::Int64(9), ScalarValue::Null]
        );
    }
}
