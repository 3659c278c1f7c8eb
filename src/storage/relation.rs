// Relations are ordered collections of named columns sharing one tuple
// count. The database is a name -> relation catalog, populated at import and
// read-only for the lifetime of the process afterwards.

use std::collections::HashMap;

use crate::error::{DbError, Result};
use crate::storage::Column;
use crate::types::ScalarKind;

#[derive(Debug)]
pub struct Relation {
    pub name: String,
    pub nr_tuples: usize,
    columns: Vec<Column>,
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Relation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nr_tuples: 0,
            columns: Vec::new(),
            names: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add a column. Insertion order is preserved for display.
    pub fn insert(&mut self, name: impl Into<String>, kind: ScalarKind) -> &mut Column {
        let name = name.into();
        assert!(
            !self.index.contains_key(&name),
            "duplicate column '{name}' in relation '{}'",
            self.name
        );
        self.index.insert(name.clone(), self.columns.len());
        self.names.push(name);
        self.columns.push(Column::new(kind));
        self.columns.last_mut().expect("just pushed")
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.index
            .get(name)
            .map(|&i| &self.columns[i])
            .ok_or_else(|| {
                DbError::Schema(format!("no column '{name}' in relation '{}'", self.name))
            })
    }

    pub fn column_mut(&mut self, name: &str) -> Result<&mut Column> {
        match self.index.get(name) {
            Some(&i) => Ok(&mut self.columns[i]),
            None => Err(DbError::Schema(format!(
                "no column '{name}' in relation '{}'",
                self.name
            ))),
        }
    }

    pub fn column_at(&self, i: usize) -> &Column {
        &self.columns[i]
    }

    pub fn column_mut_at(&mut self, i: usize) -> &mut Column {
        &mut self.columns[i]
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

#[derive(Default)]
pub struct Database {
    relations: HashMap<String, Relation>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, relation: Relation) {
        self.relations.insert(relation.name.clone(), relation);
    }

    pub fn get(&self, name: &str) -> Result<&Relation> {
        self.relations
            .get(name)
            .ok_or_else(|| DbError::Schema(format!("no relation '{name}'")))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Relation> {
        self.relations
            .get_mut(name)
            .ok_or_else(|| DbError::Schema(format!("no relation '{name}'")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }
}
