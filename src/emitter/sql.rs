//! SQL generator. Folds plan stages into SELECT blocks; a stage that needs
//! its own scope wraps the block so far as a derived subquery with a
//! deterministic ordinal alias (q0, q1, ...). Binary expressions emit fully
//! parenthesized so the captured associativity survives regardless of the
//! target's operator precedence.

use super::dialect::SqlDialect;
use crate::errors::CodeGenError;
use crate::metamodel::{Expr, Frame, FrameBound, FrameMode, Literal, SortKey};
use crate::plan::{effective_alias, JoinKind, PlanStage, QueryPlan};

pub fn emit_sql(plan: &QueryPlan, dialect: &dyn SqlDialect) -> Result<String, CodeGenError> {
    let mut emitter = SqlEmitter {
        dialect,
        next_alias: 0,
    };
    let mut out = String::new();
    if !plan.ctes.is_empty() {
        let recursive = plan.ctes.iter().any(|c| c.recursive);
        let mut parts = Vec::with_capacity(plan.ctes.len());
        for cte in &plan.ctes {
            parts.push(format!(
                "{} AS ({})",
                emitter.dialect.quote_ident(&cte.name),
                emitter.emit_query(&cte.plan)?
            ));
        }
        out.push_str("WITH ");
        if recursive {
            out.push_str("RECURSIVE ");
        }
        out.push_str(&parts.join(", "));
        out.push(' ');
    }
    out.push_str(&emitter.emit_query(plan)?);
    Ok(out)
}

enum Source {
    Table { name: String, alias: String },
    Derived { sql: String, alias: String },
}

struct JoinPart {
    kind: JoinKind,
    source: Source,
    on: Expr,
}

struct Block {
    from: Source,
    joins: Vec<JoinPart>,
    distinct: bool,
    projection: Vec<Expr>,
    wheres: Vec<Expr>,
    group: Vec<Expr>,
    having: Option<Expr>,
    qualify: Vec<Expr>,
    order: Vec<SortKey>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Block {
    fn new(from: Source) -> Self {
        Block {
            from,
            joins: Vec::new(),
            distinct: false,
            projection: Vec::new(),
            wheres: Vec::new(),
            group: Vec::new(),
            having: None,
            qualify: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    fn has_projection(&self) -> bool {
        !self.projection.is_empty() || !self.group.is_empty()
    }

    fn has_pagination(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }

    /// Alias to qualify unqualified references with: only meaningful when
    /// the single FROM source is a derived subquery.
    fn derived_alias(&self) -> Option<&str> {
        match (&self.from, self.joins.is_empty()) {
            (Source::Derived { alias, .. }, true) => Some(alias),
            _ => None,
        }
    }
}

struct SqlEmitter<'a> {
    dialect: &'a dyn SqlDialect,
    next_alias: usize,
}

impl SqlEmitter<'_> {
    fn emit_query(&mut self, plan: &QueryPlan) -> Result<String, CodeGenError> {
        let mut block = Block::new(Source::Table {
            name: plan.base.name().to_string(),
            alias: plan.base.alias().to_string(),
        });
        for stage in &plan.stages {
            match stage {
                PlanStage::Filter(pred) => {
                    if block.has_projection()
                        || block.having.is_some()
                        || !block.qualify.is_empty()
                        || block.has_pagination()
                    {
                        self.wrap(&mut block)?;
                    }
                    block.wheres.push(pred.clone());
                }
                PlanStage::Select(exprs) => {
                    if block.has_projection() {
                        self.wrap(&mut block)?;
                    }
                    block.projection = exprs.clone();
                }
                PlanStage::Extend { passthrough, added } => {
                    if block.has_projection() {
                        self.wrap(&mut block)?;
                    }
                    block.projection = passthrough.iter().chain(added).cloned().collect();
                }
                PlanStage::Distinct => {
                    // DISTINCT evaluates before LIMIT/OFFSET within a block;
                    // deduping already-retained rows needs its own scope.
                    if block.has_pagination() {
                        self.wrap(&mut block)?;
                    }
                    block.distinct = true;
                }
                PlanStage::GroupBy { keys, aggregates } => {
                    if block.has_projection() {
                        self.wrap(&mut block)?;
                    }
                    block.group = keys.iter().map(strip_binding).cloned().collect();
                    block.projection = keys.iter().chain(aggregates).cloned().collect();
                }
                PlanStage::Having(pred) => {
                    if !block.group.is_empty() && block.having.is_none() {
                        block.having = Some(pred.clone());
                    } else {
                        // Detached from its GROUP BY block; renders as a
                        // plain filter over the derived grouped output.
                        if block.has_projection() || block.has_pagination() {
                            self.wrap(&mut block)?;
                        }
                        block.wheres.push(pred.clone());
                    }
                }
                PlanStage::Join { kind, right, on } => {
                    if block.has_projection() || !block.order.is_empty() || block.has_pagination()
                    {
                        self.wrap(&mut block)?;
                    }
                    let source = if right.stages.is_empty() && right.ctes.is_empty() {
                        Source::Table {
                            name: right.base.name().to_string(),
                            alias: effective_alias(right),
                        }
                    } else {
                        Source::Derived {
                            sql: self.emit_query(right)?,
                            alias: effective_alias(right),
                        }
                    };
                    block.joins.push(JoinPart {
                        kind: *kind,
                        source,
                        on: on.clone(),
                    });
                }
                PlanStage::OrderBy(keys) => {
                    if !block.order.is_empty() || block.has_pagination() {
                        self.wrap(&mut block)?;
                    }
                    block.order = keys.clone();
                }
                PlanStage::Qualify(pred) => {
                    if !self.dialect.supports_qualify() {
                        return Err(CodeGenError::Unsupported {
                            construct: "qualify",
                            dialect: self.dialect.name(),
                        });
                    }
                    if block.has_pagination() {
                        self.wrap(&mut block)?;
                    }
                    block.qualify.push(pred.clone());
                }
                PlanStage::Limit(n) => {
                    if block.limit.is_some() {
                        self.wrap(&mut block)?;
                    }
                    block.limit = Some(*n);
                }
                PlanStage::Offset(n) => {
                    if block.has_pagination() {
                        self.wrap(&mut block)?;
                    }
                    block.offset = Some(*n);
                }
            }
        }
        self.render(&block)
    }

    fn wrap(&mut self, block: &mut Block) -> Result<(), CodeGenError> {
        let sql = self.render(block)?;
        let alias = format!("q{}", self.next_alias);
        self.next_alias += 1;
        *block = Block::new(Source::Derived { sql, alias });
        Ok(())
    }

    fn render(&self, block: &Block) -> Result<String, CodeGenError> {
        let mut sql = String::from("SELECT ");
        if block.distinct {
            sql.push_str("DISTINCT ");
        }
        if block.projection.is_empty() {
            sql.push('*');
        } else {
            let items = block
                .projection
                .iter()
                .map(|e| self.emit_expr(e, block))
                .collect::<Result<Vec<_>, _>>()?;
            sql.push_str(&items.join(", "));
        }
        sql.push_str(" FROM ");
        sql.push_str(&self.render_source(&block.from));
        for join in &block.joins {
            sql.push(' ');
            sql.push_str(self.dialect.join_keyword(join.kind));
            sql.push(' ');
            sql.push_str(&self.render_source(&join.source));
            sql.push_str(" ON ");
            sql.push_str(&self.emit_expr(&join.on, block)?);
        }
        if !block.wheres.is_empty() {
            let preds = block
                .wheres
                .iter()
                .map(|p| self.emit_expr(p, block))
                .collect::<Result<Vec<_>, _>>()?;
            sql.push_str(" WHERE ");
            sql.push_str(&preds.join(" AND "));
        }
        if !block.group.is_empty() {
            let keys = block
                .group
                .iter()
                .map(|k| self.emit_expr(k, block))
                .collect::<Result<Vec<_>, _>>()?;
            sql.push_str(" GROUP BY ");
            sql.push_str(&keys.join(", "));
        }
        if let Some(having) = &block.having {
            sql.push_str(" HAVING ");
            sql.push_str(&self.emit_expr(having, block)?);
        }
        if !block.qualify.is_empty() {
            let preds = block
                .qualify
                .iter()
                .map(|p| self.emit_expr(p, block))
                .collect::<Result<Vec<_>, _>>()?;
            sql.push_str(" QUALIFY ");
            sql.push_str(&preds.join(" AND "));
        }
        if !block.order.is_empty() {
            let keys = block
                .order
                .iter()
                .map(|k| {
                    Ok(format!(
                        "{} {}",
                        self.emit_expr(&k.expr, block)?,
                        if k.ascending { "ASC" } else { "DESC" }
                    ))
                })
                .collect::<Result<Vec<_>, CodeGenError>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }
        if let Some(limit) = block.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = block.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        Ok(sql)
    }

    fn render_source(&self, source: &Source) -> String {
        match source {
            Source::Table { name, alias } => {
                let name = self.dialect.quote_ident(name);
                if alias.is_empty() {
                    name
                } else {
                    format!("{} {}", name, self.dialect.quote_ident(alias))
                }
            }
            Source::Derived { sql, alias } => {
                format!("({}) {}", sql, self.dialect.quote_ident(alias))
            }
        }
    }

    fn emit_column(&self, name: &str, table: &str, block: &Block) -> String {
        let column = self.dialect.quote_ident(name);
        if !table.is_empty() {
            return format!("{}.{}", self.dialect.quote_ident(table), column);
        }
        match block.derived_alias() {
            Some(alias) => format!("{}.{}", self.dialect.quote_ident(alias), column),
            None => column,
        }
    }

    fn emit_expr(&self, expr: &Expr, block: &Block) -> Result<String, CodeGenError> {
        Ok(match expr {
            Expr::Literal(lit) => self.emit_literal(lit),
            Expr::Column { name, table } => self.emit_column(name, table, block),
            Expr::Binary { left, op, right } => format!(
                "({} {} {})",
                self.emit_expr(left, block)?,
                op.sql_token(),
                self.emit_expr(right, block)?
            ),
            Expr::Unary { operand, .. } => format!("(NOT {})", self.emit_expr(operand, block)?),
            Expr::If { test, body, orelse } => format!(
                "CASE WHEN {} THEN {} ELSE {} END",
                self.emit_expr(test, block)?,
                self.emit_expr(body, block)?,
                self.emit_expr(orelse, block)?
            ),
            Expr::Call(fc) => self.emit_call(fc, block)?,
            Expr::Over(w) => {
                let mut parts = Vec::new();
                if !w.partition_by.is_empty() {
                    let keys = w
                        .partition_by
                        .iter()
                        .map(|e| self.emit_expr(e, block))
                        .collect::<Result<Vec<_>, _>>()?;
                    parts.push(format!("PARTITION BY {}", keys.join(", ")));
                }
                if !w.order_by.is_empty() {
                    let keys = w
                        .order_by
                        .iter()
                        .map(|k| {
                            Ok(format!(
                                "{} {}",
                                self.emit_expr(&k.expr, block)?,
                                if k.ascending { "ASC" } else { "DESC" }
                            ))
                        })
                        .collect::<Result<Vec<_>, CodeGenError>>()?;
                    parts.push(format!("ORDER BY {}", keys.join(", ")));
                }
                if let Some(frame) = &w.frame {
                    parts.push(frame_clause(frame));
                }
                format!(
                    "{} OVER ({})",
                    self.emit_call(&w.function, block)?,
                    parts.join(" ")
                )
            }
            Expr::Binding { name, expr } => format!(
                "{} AS {}",
                self.emit_expr(expr, block)?,
                self.dialect.quote_ident(name)
            ),
        })
    }

    fn emit_call(
        &self,
        fc: &crate::metamodel::FunctionCall,
        block: &Block,
    ) -> Result<String, CodeGenError> {
        let args = fc
            .args
            .iter()
            .map(|a| self.emit_expr(a, block))
            .collect::<Result<Vec<_>, _>>()?;
        if fc.distinct {
            Ok(format!(
                "{}(DISTINCT {})",
                fc.function.name(),
                args.join(", ")
            ))
        } else {
            Ok(format!("{}({})", fc.function.name(), args.join(", ")))
        }
    }

    fn emit_literal(&self, lit: &Literal) -> String {
        match lit {
            Literal::Int(v) => v.to_string(),
            Literal::Float(v) => float_token(*v),
            Literal::Str(s) => self.dialect.quote_string(s),
            Literal::Bool(b) => self.dialect.emit_bool(*b),
            Literal::Null => self.dialect.emit_null(),
            Literal::List(items) => {
                let rendered: Vec<String> = items.iter().map(|i| self.emit_literal(i)).collect();
                format!("({})", rendered.join(", "))
            }
        }
    }
}

/// Fractionless floats keep a trailing `.0` so the token stays typed.
pub(super) fn float_token(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        v.to_string()
    }
}

fn strip_binding(expr: &Expr) -> &Expr {
    match expr {
        Expr::Binding { expr, .. } => expr,
        other => other,
    }
}

fn frame_clause(frame: &Frame) -> String {
    let mode = match frame.mode {
        FrameMode::Rows => "ROWS",
        FrameMode::Range => "RANGE",
    };
    format!(
        "{} BETWEEN {} AND {}",
        mode,
        frame_bound(frame.start, true),
        frame_bound(frame.end, false)
    )
}

fn frame_bound(bound: FrameBound, is_start: bool) -> String {
    match bound {
        FrameBound::Unbounded => {
            if is_start {
                "UNBOUNDED PRECEDING".to_string()
            } else {
                "UNBOUNDED FOLLOWING".to_string()
            }
        }
        FrameBound::Bounded(0) => "CURRENT ROW".to_string(),
        FrameBound::Bounded(n) if n < 0 => format!("{} PRECEDING", -n),
        FrameBound::Bounded(n) => format!("{} FOLLOWING", n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{rows, unbounded};

    #[test]
    fn frame_bounds_render_by_position() {
        let f = rows(unbounded(), 0);
        assert_eq!(
            frame_clause(&f),
            "ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW"
        );
        let f = rows(-3, unbounded());
        assert_eq!(
            frame_clause(&f),
            "ROWS BETWEEN 3 PRECEDING AND UNBOUNDED FOLLOWING"
        );
        let f = rows(-1, 1);
        assert_eq!(frame_clause(&f), "ROWS BETWEEN 1 PRECEDING AND 1 FOLLOWING");
    }

    #[test]
    fn float_tokens_keep_decimal_point() {
        assert_eq!(float_token(2.0), "2.0");
        assert_eq!(float_token(-3.0), "-3.0");
        assert_eq!(float_token(2.5), "2.5");
    }
}
