//! In-process warehouse backend.
//!
//! Mirrors the Postgres behaviour the pipeline relies on: NOT NULL and type
//! checks on insert, atomic batches, primary/unique/foreign key validation,
//! `TRUNCATE ... CASCADE` reaching dependent tables. Used for `--dry-run` and
//! by the test suites.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use super::schema::{Column, ForeignKey, Index, TableSchema, UniqueKey};
use super::warehouse::{Cell, Warehouse};

#[derive(Debug, Clone)]
struct MemoryTable {
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
    primary_key: Option<Vec<usize>>,
    uniques: BTreeMap<String, usize>,
    foreign_keys: Vec<ForeignKey>,
    indexes: BTreeSet<String>,
    inserts_since_truncate: usize,
}

impl MemoryTable {
    fn new(schema: &TableSchema) -> Self {
        Self {
            columns: schema.columns.to_vec(),
            rows: Vec::new(),
            primary_key: None,
            uniques: BTreeMap::new(),
            foreign_keys: Vec::new(),
            indexes: BTreeSet::new(),
            inserts_since_truncate: 0,
        }
    }

    fn position(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| anyhow!("column \"{column}\" does not exist"))
    }

    fn constraint_names(&self, table: &str) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self.uniques.keys().cloned().collect();
        names.extend(self.foreign_keys.iter().map(|fk| fk.name.to_string()));
        if self.primary_key.is_some() {
            names.insert(format!("{table}_pkey"));
        }
        names
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, MemoryTable>,
    failing_batches: HashSet<(String, usize)>,
}

impl MemoryState {
    fn table(&self, name: &str) -> Result<&MemoryTable> {
        self.tables
            .get(name)
            .ok_or_else(|| anyhow!("relation \"{name}\" does not exist"))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemoryTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| anyhow!("relation \"{name}\" does not exist"))
    }

    fn name_taken(&self, name: &str) -> bool {
        self.tables
            .iter()
            .any(|(table, t)| t.constraint_names(table).contains(name))
    }

    /// Tables whose foreign keys point at `table`, transitively.
    fn dependents(&self, table: &str) -> Vec<String> {
        let mut out = vec![table.to_string()];
        let mut i = 0;
        while i < out.len() {
            let current = out[i].clone();
            for (name, t) in &self.tables {
                if t.foreign_keys.iter().any(|fk| fk.references == current) && !out.contains(name)
                {
                    out.push(name.clone());
                }
            }
            i += 1;
        }
        out
    }

    fn key_values(&self, table: &str, column: &str) -> Result<HashSet<String>> {
        let t = self.table(table)?;
        let idx = t.position(column)?;
        Ok(t.rows.iter().map(|r| key_of(&r[idx])).collect())
    }

    fn check_foreign_key(&self, fk: &ForeignKey, idx: usize, rows: &[Vec<Cell>]) -> Result<()> {
        let referenced = self.key_values(fk.references, fk.references_column)?;
        for row in rows {
            if row[idx].is_null() {
                continue;
            }
            if !referenced.contains(&key_of(&row[idx])) {
                bail!(
                    "insert or update violates foreign key constraint \"{}\": {:?} not present in {}",
                    fk.name,
                    row[idx],
                    fk.references
                );
            }
        }
        Ok(())
    }
}

fn key_of(cell: &Cell) -> String {
    format!("{cell:?}")
}

fn composite_key(row: &[Cell], columns: &[usize]) -> String {
    columns.iter().map(|&i| key_of(&row[i])).collect::<Vec<_>>().join("|")
}

fn check_distinct(rows: &[Vec<Cell>], columns: &[usize], constraint: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for row in rows {
        // NULLs never collide under UNIQUE
        if columns.iter().any(|&i| row[i].is_null()) {
            continue;
        }
        if !seen.insert(composite_key(row, columns)) {
            bail!("duplicate key value violates unique constraint \"{constraint}\"");
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    state: Mutex<MemoryState>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes the `batch`-th insert (0-based, counted since the table was last
    /// created or truncated) into `table` fail.
    pub fn fail_batch(&self, table: &str, batch: usize) {
        self.lock().failing_batches.insert((table.to_string(), batch));
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.lock().tables.contains_key(table)
    }

    pub fn rows(&self, table: &str) -> Vec<Vec<Cell>> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn constraints(&self, table: &str) -> BTreeSet<String> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.constraint_names(table))
            .unwrap_or_default()
    }

    pub fn indexes(&self, table: &str) -> BTreeSet<String> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.indexes.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.has_table(table))
    }

    async fn create_table(&self, schema: &TableSchema) -> Result<()> {
        self.lock()
            .tables
            .entry(schema.name.to_string())
            .or_insert_with(|| MemoryTable::new(schema));
        Ok(())
    }

    async fn truncate(&self, schema: &TableSchema) -> Result<()> {
        let mut state = self.lock();
        state.table(schema.name)?;
        for name in state.dependents(schema.name) {
            let t = state.table_mut(&name)?;
            t.rows.clear();
            t.inserts_since_truncate = 0;
        }
        Ok(())
    }

    async fn insert_batch(&self, schema: &TableSchema, rows: Vec<Vec<Cell>>) -> Result<()> {
        let mut state = self.lock();
        let batch_no = {
            let t = state.table_mut(schema.name)?;
            t.inserts_since_truncate += 1;
            t.inserts_since_truncate - 1
        };
        if state
            .failing_batches
            .contains(&(schema.name.to_string(), batch_no))
        {
            bail!("injected failure for {} batch {batch_no}", schema.name);
        }

        let t = state.table(schema.name)?;
        for row in &rows {
            if row.len() != t.columns.len() {
                bail!(
                    "INSERT has {} expressions but {} has {} columns",
                    row.len(),
                    schema.name,
                    t.columns.len()
                );
            }
            for (cell, column) in row.iter().zip(&t.columns) {
                if cell.sql_type() != column.sql_type {
                    bail!(
                        "column \"{}\" is of type {} but expression is of type {}",
                        column.name,
                        column.sql_type.as_sql(),
                        cell.sql_type().as_sql()
                    );
                }
                if cell.is_null() && !column.nullable {
                    bail!(
                        "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                        column.name,
                        schema.name
                    );
                }
            }
        }

        let mut combined = t.rows.clone();
        combined.extend(rows.iter().cloned());
        if let Some(pk) = &t.primary_key {
            check_distinct(&combined, pk, &format!("{}_pkey", schema.name))?;
        }
        for (name, idx) in &t.uniques {
            check_distinct(&combined, &[*idx], name)?;
        }
        for fk in &t.foreign_keys {
            state.check_foreign_key(fk, t.position(fk.column)?, &rows)?;
        }

        state.table_mut(schema.name)?.rows.extend(rows);
        Ok(())
    }

    async fn has_primary_key(&self, table: &str) -> Result<bool> {
        Ok(self.lock().table(table)?.primary_key.is_some())
    }

    async fn add_primary_key(&self, schema: &TableSchema) -> Result<()> {
        let mut state = self.lock();
        let name = schema.primary_key_name();
        let t = state.table(schema.name)?;
        if t.primary_key.is_some() {
            bail!("multiple primary keys for table \"{}\" are not allowed", schema.name);
        }
        let columns = schema
            .primary_key
            .iter()
            .map(|c| t.position(c))
            .collect::<Result<Vec<_>>>()?;
        for &i in &columns {
            if t.rows.iter().any(|r| r[i].is_null()) {
                bail!("column \"{}\" contains null values", t.columns[i].name);
            }
        }
        check_distinct(&t.rows, &columns, &name)?;
        state.table_mut(schema.name)?.primary_key = Some(columns);
        Ok(())
    }

    async fn constraint_exists(&self, table: &str, constraint: &str) -> Result<bool> {
        Ok(self
            .lock()
            .tables
            .get(table)
            .is_some_and(|t| t.constraint_names(table).contains(constraint)))
    }

    async fn add_unique(&self, schema: &TableSchema, key: &UniqueKey) -> Result<()> {
        let mut state = self.lock();
        if state.name_taken(key.name) {
            bail!("relation \"{}\" already exists", key.name);
        }
        let t = state.table(schema.name)?;
        let idx = t.position(key.column)?;
        check_distinct(&t.rows, &[idx], key.name)?;
        state
            .table_mut(schema.name)?
            .uniques
            .insert(key.name.to_string(), idx);
        Ok(())
    }

    async fn add_foreign_key(&self, schema: &TableSchema, fk: &ForeignKey) -> Result<()> {
        let mut state = self.lock();
        if state.name_taken(fk.name) {
            bail!(
                "constraint \"{}\" for relation \"{}\" already exists",
                fk.name,
                schema.name
            );
        }
        let referenced = state.table(fk.references)?;
        let ref_idx = referenced.position(fk.references_column)?;
        let referenced_is_keyed = referenced.primary_key.as_deref() == Some(&[ref_idx][..])
            || referenced.uniques.values().any(|&i| i == ref_idx);
        if !referenced_is_keyed {
            bail!(
                "there is no unique constraint matching given keys for referenced table \"{}\"",
                fk.references
            );
        }
        let t = state.table(schema.name)?;
        let idx = t.position(fk.column)?;
        state.check_foreign_key(fk, idx, &t.rows)?;
        state.table_mut(schema.name)?.foreign_keys.push(*fk);
        Ok(())
    }

    async fn ensure_index(&self, schema: &TableSchema, index: &Index) -> Result<()> {
        let mut state = self.lock();
        let t = state.table_mut(schema.name)?;
        t.position(index.column)?;
        t.indexes.insert(index.name.to_string());
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let mut state = self.lock();
        state.tables.remove(table);
        // CASCADE drops the constraints that pointed at it
        for t in state.tables.values_mut() {
            t.foreign_keys.retain(|fk| fk.references != table);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::schema::{DIM_GENRE, FACT_GENRE_BRIDGE};

    fn genre(id: i32, name: &str) -> Vec<Cell> {
        vec![Cell::Int(Some(id)), Cell::Text(Some(name.to_string()))]
    }

    #[tokio::test]
    async fn rejects_nulls_in_required_columns() {
        let wh = MemoryWarehouse::new();
        wh.create_table(&DIM_GENRE).await.unwrap();
        let err = wh
            .insert_batch(
                &DIM_GENRE,
                vec![vec![Cell::Int(Some(1)), Cell::Text(None)]],
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not-null"));
        assert!(wh.rows("dim_genre").is_empty());
    }

    #[tokio::test]
    async fn failed_batch_leaves_no_partial_rows() {
        let wh = MemoryWarehouse::new();
        wh.create_table(&DIM_GENRE).await.unwrap();
        wh.add_primary_key(&DIM_GENRE).await.unwrap();
        let err = wh
            .insert_batch(&DIM_GENRE, vec![genre(1, "Drama"), genre(1, "Comedy")])
            .await;
        assert!(err.is_err());
        assert!(wh.rows("dim_genre").is_empty());
    }

    #[tokio::test]
    async fn truncate_cascades_to_referencing_tables() {
        let wh = MemoryWarehouse::new();
        wh.create_table(&DIM_GENRE).await.unwrap();
        wh.create_table(&FACT_GENRE_BRIDGE).await.unwrap();
        wh.add_primary_key(&DIM_GENRE).await.unwrap();
        wh.insert_batch(&DIM_GENRE, vec![genre(1, "Drama")])
            .await
            .unwrap();
        wh.add_foreign_key(&FACT_GENRE_BRIDGE, &FACT_GENRE_BRIDGE.foreign_keys[1])
            .await
            .unwrap();
        wh.insert_batch(
            &FACT_GENRE_BRIDGE,
            vec![vec![Cell::Int(Some(1)), Cell::Int(Some(1))]],
        )
        .await
        .unwrap();

        wh.truncate(&DIM_GENRE).await.unwrap();
        assert!(wh.rows("fact_genre_bridge").is_empty());
    }
}
