//! Relation schemas and the registry consulted during capture. Schemas are
//! immutable after construction and shared via `Arc` across plans.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::SchemaError;
use crate::plan::QueryPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    Boolean,
    Date,
    Timestamp,
    /// Computed columns whose type is not tracked.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub ctype: ColumnType,
    /// Alias of the relation this column originally came from, when it
    /// differs from the owning schema's alias (set for join-combined
    /// schemas so references keep their side's qualifier).
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    alias: String,
    columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new<N, A, I, S>(name: N, alias: A, columns: I) -> Result<Self, SchemaError>
    where
        N: Into<String>,
        A: Into<String>,
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
    {
        let defs = columns
            .into_iter()
            .map(|(n, t)| ColumnDef {
                name: n.into(),
                ctype: t,
                source: None,
            })
            .collect();
        Self::from_defs(name, alias, defs)
    }

    pub(crate) fn from_defs<N, A>(
        name: N,
        alias: A,
        columns: Vec<ColumnDef>,
    ) -> Result<Self, SchemaError>
    where
        N: Into<String>,
        A: Into<String>,
    {
        let name = name.into();
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(SchemaError::DuplicateColumn {
                    column: col.name.clone(),
                    table: name.clone(),
                });
            }
        }
        Ok(TableSchema {
            name,
            alias: alias.into(),
            columns,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.column(name).map(|c| c.ctype)
    }

    /// Qualifier to use when referencing `column` from this schema.
    pub fn qualifier_for(&self, column: &str) -> &str {
        self.column(column)
            .and_then(|c| c.source.as_deref())
            .unwrap_or(&self.alias)
    }
}

/// Per-process bookkeeping of base relations. Read-only after registration;
/// schemas handed out are `Arc`-shared and freely aliasable across plans.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    tables: HashMap<String, Arc<TableSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: TableSchema) -> Result<(), SchemaError> {
        if self.tables.contains_key(schema.name()) {
            return Err(SchemaError::DuplicateRelation(schema.name().to_string()));
        }
        self.tables
            .insert(schema.name().to_string(), Arc::new(schema));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<TableSchema>, SchemaError> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownRelation(name.to_string()))
    }

    /// Start a plan over a registered base relation.
    pub fn plan(&self, name: &str) -> Result<QueryPlan, SchemaError> {
        Ok(QueryPlan::from_schema(self.get(name)?))
    }
}
