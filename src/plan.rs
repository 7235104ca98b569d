//! Fluent, append-only query-plan builder. Each operation captures its
//! closures against the live schema, validates placement rules, and appends
//! exactly one stage. The plan is consumed by an emitter; once compiled it
//! rejects further appends (clone it to keep building).

use std::cell::Cell;
use std::sync::Arc;

use log::debug;

use crate::capture::{self, Scope};
use crate::emitter::{self, Dialect};
use crate::errors::{CaptureError, CompileError, PlanOrderError, SchemaError};
use crate::metamodel::{Expr, Literal, SortKey};
use crate::schema::{ColumnDef, ColumnType, TableSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    AsOf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanStage {
    Filter(Expr),
    Select(Vec<Expr>),
    Extend {
        /// Columns carried over from the pre-extend schema, in order.
        passthrough: Vec<Expr>,
        added: Vec<Expr>,
    },
    Distinct,
    GroupBy {
        keys: Vec<Expr>,
        aggregates: Vec<Expr>,
    },
    Having(Expr),
    Join {
        kind: JoinKind,
        right: Box<QueryPlan>,
        on: Expr,
    },
    OrderBy(Vec<SortKey>),
    Qualify(Expr),
    Limit(u64),
    Offset(u64),
}

/// A named common-table-expression registered on a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub recursive: bool,
    pub plan: QueryPlan,
}

#[derive(Debug, PartialEq)]
pub struct QueryPlan {
    pub(crate) base: Arc<TableSchema>,
    /// Schema the next capture resolves against; replaced by select, extend,
    /// group_by and joins.
    pub(crate) current: Arc<TableSchema>,
    pub(crate) stages: Vec<PlanStage>,
    pub(crate) ctes: Vec<Cte>,
    pub(crate) has_window: bool,
    grouped: bool,
    finalized: Cell<bool>,
}

impl Clone for QueryPlan {
    /// A cloned plan is an independent builder: the finalized flag does not
    /// carry over.
    fn clone(&self) -> Self {
        QueryPlan {
            base: Arc::clone(&self.base),
            current: Arc::clone(&self.current),
            stages: self.stages.clone(),
            ctes: self.ctes.clone(),
            has_window: self.has_window,
            grouped: self.grouped,
            finalized: Cell::new(false),
        }
    }
}

impl QueryPlan {
    pub fn table<N, A, I, S>(name: N, alias: A, columns: I) -> Result<Self, SchemaError>
    where
        N: Into<String>,
        A: Into<String>,
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
    {
        Ok(Self::from_schema(Arc::new(TableSchema::new(
            name, alias, columns,
        )?)))
    }

    pub fn from_schema(schema: Arc<TableSchema>) -> Self {
        QueryPlan {
            base: Arc::clone(&schema),
            current: schema,
            stages: Vec::new(),
            ctes: Vec::new(),
            has_window: false,
            grouped: false,
            finalized: Cell::new(false),
        }
    }

    /// Schema the next capture will resolve against.
    pub fn schema(&self) -> &TableSchema {
        &self.current
    }

    fn check_open(&self) -> Result<(), PlanOrderError> {
        if self.finalized.get() {
            return Err(PlanOrderError::PlanFinalized);
        }
        Ok(())
    }

    pub fn filter<F>(mut self, predicate: F) -> Result<Self, CompileError>
    where
        F: FnOnce(&Scope) -> Result<Expr, CaptureError>,
    {
        self.check_open()?;
        let expr = {
            let scope = Scope::new(&self.current);
            predicate(&scope)?
        };
        capture::check_condition(&expr, "filter")?;
        self.stages.push(PlanStage::Filter(expr));
        Ok(self)
    }

    /// Replace the output column set. Bindings become output aliases; plain
    /// column references keep their name; anything else needs a binding.
    pub fn select<F>(mut self, targets: F) -> Result<Self, CompileError>
    where
        F: FnOnce(&Scope) -> Result<Vec<Expr>, CaptureError>,
    {
        self.check_open()?;
        let exprs = {
            let scope = Scope::new(&self.current);
            targets(&scope)?
        };
        let defs = self.projection_defs(&exprs, "select")?;
        self.current = Arc::new(derived_schema(&self.current, defs)?);
        self.stages.push(PlanStage::Select(exprs));
        Ok(self)
    }

    /// Append computed columns without dropping the existing ones.
    pub fn extend<F>(mut self, targets: F) -> Result<Self, CompileError>
    where
        F: FnOnce(&Scope) -> Result<Vec<Expr>, CaptureError>,
    {
        self.check_open()?;
        let added = {
            let scope = Scope::new(&self.current);
            targets(&scope)?
        };
        let passthrough: Vec<Expr> = self
            .current
            .columns()
            .iter()
            .map(|c| Expr::Column {
                name: c.name.clone(),
                table: self.current.qualifier_for(&c.name).to_string(),
            })
            .collect();
        let mut defs: Vec<ColumnDef> = self.current.columns().to_vec();
        defs.extend(self.projection_defs(&added, "extend")?);
        self.current = Arc::new(derived_schema(&self.current, defs)?);
        self.stages.push(PlanStage::Extend { passthrough, added });
        Ok(self)
    }

    fn projection_defs(
        &mut self,
        exprs: &[Expr],
        context: &'static str,
    ) -> Result<Vec<ColumnDef>, CompileError> {
        let mut defs = Vec::with_capacity(exprs.len());
        for expr in exprs {
            capture::check_target(expr)?;
            let name = match expr {
                Expr::Binding { name, .. } => name.clone(),
                Expr::Column { name, .. } => name.clone(),
                _ => return Err(CaptureError::UnnamedExpression { context }.into()),
            };
            if capture::contains_window(expr) {
                self.has_window = true;
            }
            defs.push(ColumnDef {
                name,
                ctype: infer_type(expr, &self.current),
                source: None,
            });
        }
        Ok(defs)
    }

    /// Aggregate over grouping keys. The active schema becomes exactly
    /// `keys ∪ aggregates` by their bound names.
    pub fn group_by<K, A>(mut self, keys: K, aggregates: A) -> Result<Self, CompileError>
    where
        K: FnOnce(&Scope) -> Result<Vec<Expr>, CaptureError>,
        A: FnOnce(&Scope) -> Result<Vec<Expr>, CaptureError>,
    {
        self.check_open()?;
        let (keys, aggregates) = {
            let scope = Scope::new(&self.current);
            (keys(&scope)?, aggregates(&scope)?)
        };
        let mut defs = Vec::with_capacity(keys.len() + aggregates.len());
        for key in &keys {
            capture::check_target(key)?;
            let name = match key {
                Expr::Binding { name, .. } => name.clone(),
                Expr::Column { name, .. } => name.clone(),
                _ => {
                    return Err(CaptureError::UnnamedExpression {
                        context: "group_by key",
                    }
                    .into())
                }
            };
            defs.push(ColumnDef {
                name,
                ctype: infer_type(key, &self.current),
                source: None,
            });
        }
        for agg in &aggregates {
            capture::check_target(agg)?;
            let name = output_name(agg).ok_or(CaptureError::UnnamedExpression {
                context: "group_by aggregate",
            })?;
            if !capture::contains_aggregate(agg) {
                return Err(CaptureError::NotAggregate { name }.into());
            }
            defs.push(ColumnDef {
                name,
                ctype: infer_type(agg, &self.current),
                source: None,
            });
        }
        self.current = Arc::new(derived_schema(&self.current, defs)?);
        self.grouped = true;
        debug!(
            "group_by over '{}': {} key(s), {} aggregate(s)",
            self.base.name(),
            keys.len(),
            aggregates.len()
        );
        self.stages.push(PlanStage::GroupBy { keys, aggregates });
        Ok(self)
    }

    /// Post-aggregation filter; only legal after `group_by`.
    pub fn having<F>(mut self, predicate: F) -> Result<Self, CompileError>
    where
        F: FnOnce(&Scope) -> Result<Expr, CaptureError>,
    {
        self.check_open()?;
        if !self.grouped {
            return Err(PlanOrderError::HavingWithoutGroupBy.into());
        }
        let expr = {
            let scope = Scope::new(&self.current);
            predicate(&scope)?
        };
        capture::check_condition(&expr, "having")?;
        self.stages.push(PlanStage::Having(expr));
        Ok(self)
    }

    pub fn join<F>(self, right: QueryPlan, on: F) -> Result<Self, CompileError>
    where
        F: FnOnce(&Scope, &Scope) -> Result<Expr, CaptureError>,
    {
        self.join_with(JoinKind::Inner, right, on)
    }

    pub fn left_join<F>(self, right: QueryPlan, on: F) -> Result<Self, CompileError>
    where
        F: FnOnce(&Scope, &Scope) -> Result<Expr, CaptureError>,
    {
        self.join_with(JoinKind::Left, right, on)
    }

    pub fn right_join<F>(self, right: QueryPlan, on: F) -> Result<Self, CompileError>
    where
        F: FnOnce(&Scope, &Scope) -> Result<Expr, CaptureError>,
    {
        self.join_with(JoinKind::Right, right, on)
    }

    pub fn outer_join<F>(self, right: QueryPlan, on: F) -> Result<Self, CompileError>
    where
        F: FnOnce(&Scope, &Scope) -> Result<Expr, CaptureError>,
    {
        self.join_with(JoinKind::Full, right, on)
    }

    pub fn asof_join<F>(self, right: QueryPlan, on: F) -> Result<Self, CompileError>
    where
        F: FnOnce(&Scope, &Scope) -> Result<Expr, CaptureError>,
    {
        self.join_with(JoinKind::AsOf, right, on)
    }

    fn join_with<F>(mut self, kind: JoinKind, right: QueryPlan, on: F) -> Result<Self, CompileError>
    where
        F: FnOnce(&Scope, &Scope) -> Result<Expr, CaptureError>,
    {
        self.check_open()?;
        let left_alias = self.current.alias().to_string();
        let right_alias = effective_alias(&right);
        if !left_alias.is_empty() && left_alias == right_alias {
            return Err(SchemaError::DuplicateRelation(right_alias).into());
        }
        let on_expr = {
            let left_scope = Scope::new(&self.current);
            let right_scope = Scope::new(&right.current);
            on(&left_scope, &right_scope)?
        };
        capture::check_condition(&on_expr, "join")?;
        // Column union; duplicate names must be renamed on one side first.
        let mut defs: Vec<ColumnDef> = self
            .current
            .columns()
            .iter()
            .map(|c| ColumnDef {
                name: c.name.clone(),
                ctype: c.ctype,
                source: nonempty(self.current.qualifier_for(&c.name)),
            })
            .collect();
        for c in right.current.columns() {
            if self.current.has_column(&c.name) {
                return Err(SchemaError::DuplicateColumn {
                    column: c.name.clone(),
                    table: right.current.name().to_string(),
                }
                .into());
            }
            defs.push(ColumnDef {
                name: c.name.clone(),
                ctype: c.ctype,
                source: Some(right_alias.clone()),
            });
        }
        self.current = Arc::new(TableSchema::from_defs(
            self.current.name().to_string(),
            left_alias,
            defs,
        )?);
        self.stages.push(PlanStage::Join {
            kind,
            right: Box::new(right),
            on: on_expr,
        });
        Ok(self)
    }

    /// Sort keys capture ascending by default; wrap with `desc` to reverse.
    pub fn order_by<F>(mut self, keys: F) -> Result<Self, CompileError>
    where
        F: FnOnce(&Scope) -> Result<Vec<SortKey>, CaptureError>,
    {
        self.check_open()?;
        let keys = {
            let scope = Scope::new(&self.current);
            keys(&scope)?
        };
        let mut normalized = Vec::with_capacity(keys.len());
        for key in keys {
            capture::check_target(&key.expr)?;
            // A binding adds nothing to a sort key; keep the inner expression.
            let expr = match key.expr {
                Expr::Binding { expr, .. } => *expr,
                other => other,
            };
            normalized.push(SortKey {
                expr,
                ascending: key.ascending,
            });
        }
        self.stages.push(PlanStage::OrderBy(normalized));
        Ok(self)
    }

    /// Post-window filter; only legal once a stage introduced a window
    /// expression.
    pub fn qualify<F>(mut self, predicate: F) -> Result<Self, CompileError>
    where
        F: FnOnce(&Scope) -> Result<Expr, CaptureError>,
    {
        self.check_open()?;
        if !self.has_window {
            return Err(PlanOrderError::QualifyWithoutWindow.into());
        }
        let expr = {
            let scope = Scope::new(&self.current);
            predicate(&scope)?
        };
        capture::check_condition(&expr, "qualify")?;
        self.stages.push(PlanStage::Qualify(expr));
        Ok(self)
    }

    pub fn distinct(mut self) -> Result<Self, CompileError> {
        self.check_open()?;
        self.stages.push(PlanStage::Distinct);
        Ok(self)
    }

    /// Without a preceding `order_by` the retained rows are
    /// engine-determined, not user-determined.
    pub fn limit(mut self, n: u64) -> Result<Self, CompileError> {
        self.check_open()?;
        self.stages.push(PlanStage::Limit(n));
        Ok(self)
    }

    pub fn offset(mut self, n: u64) -> Result<Self, CompileError> {
        self.check_open()?;
        self.stages.push(PlanStage::Offset(n));
        Ok(self)
    }

    /// Register `plan` as an ordinary common table expression, emitted
    /// before the main query body.
    pub fn let_cte(mut self, name: impl Into<String>, plan: QueryPlan) -> Result<Self, CompileError> {
        self.check_open()?;
        self.ctes.push(Cte {
            name: name.into(),
            recursive: false,
            plan,
        });
        Ok(self)
    }

    /// Register `plan` as a recursive common table expression.
    pub fn recurse(mut self, name: impl Into<String>, plan: QueryPlan) -> Result<Self, CompileError> {
        self.check_open()?;
        self.ctes.push(Cte {
            name: name.into(),
            recursive: true,
            plan,
        });
        Ok(self)
    }

    /// Render the plan as query text for `dialect`. Finalizes the plan:
    /// later stage appends fail with `PlanOrderError::PlanFinalized`.
    pub fn compile(&self, dialect: Dialect) -> Result<String, CompileError> {
        self.finalized.set(true);
        debug!(
            "compiling plan over '{}' ({} stage(s)) for {:?}",
            self.base.name(),
            self.stages.len(),
            dialect
        );
        Ok(emitter::emit(self, dialect)?)
    }
}

fn nonempty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Alias to qualify a plan's columns with when it appears as the right side
/// of a join. Derived schemas drop their alias, so fall back to the base's.
pub(crate) fn effective_alias(plan: &QueryPlan) -> String {
    if plan.current.alias().is_empty() {
        plan.base.alias().to_string()
    } else {
        plan.current.alias().to_string()
    }
}

/// Derived relations carry no alias of their own: references against them
/// emit unqualified, which SQL resolves through the enclosing scope.
fn derived_schema(prev: &TableSchema, defs: Vec<ColumnDef>) -> Result<TableSchema, SchemaError> {
    TableSchema::from_defs(prev.name().to_string(), "", defs)
}

/// Output column name an expression contributes, when it has one.
pub(crate) fn output_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Binding { name, .. } => Some(name.clone()),
        Expr::Column { name, .. } => Some(name.clone()),
        Expr::Call(fc) => Some(fc.function.name().to_ascii_lowercase()),
        Expr::Over(w) => Some(w.function.function.name().to_ascii_lowercase()),
        _ => None,
    }
}

pub(crate) fn infer_type(expr: &Expr, schema: &TableSchema) -> ColumnType {
    match expr {
        Expr::Column { name, .. } => schema.column_type(name).unwrap_or(ColumnType::Unknown),
        Expr::Literal(lit) => match lit {
            Literal::Int(_) => ColumnType::Integer,
            Literal::Float(_) => ColumnType::Float,
            Literal::Str(_) => ColumnType::Text,
            Literal::Bool(_) => ColumnType::Boolean,
            Literal::Null | Literal::List(_) => ColumnType::Unknown,
        },
        Expr::Binary { left, op, .. } => {
            use crate::metamodel::BinaryOp::*;
            match op {
                Eq | NotEq | Lt | LtEq | Gt | GtEq | In | NotIn | Is | IsNot | And | Or => {
                    ColumnType::Boolean
                }
                _ => infer_type(left, schema),
            }
        }
        Expr::Unary { .. } => ColumnType::Boolean,
        Expr::If { body, .. } => infer_type(body, schema),
        Expr::Call(fc) => call_type(fc, schema),
        Expr::Over(w) => call_type(&w.function, schema),
        Expr::Binding { expr, .. } => infer_type(expr, schema),
    }
}

fn call_type(fc: &crate::metamodel::FunctionCall, schema: &TableSchema) -> ColumnType {
    use crate::functions::Function::*;
    match &fc.function {
        Count | Rank | RowNumber | DenseRank => ColumnType::Integer,
        Avg => ColumnType::Float,
        Sum | Min | Max => fc
            .args
            .first()
            .map(|a| infer_type(a, schema))
            .unwrap_or(ColumnType::Unknown),
        Custom(_) => ColumnType::Unknown,
    }
}
