//! relq — an embedded query-expression compiler.
//!
//! Queries are described through a restricted, closure-based mini-language:
//! builder methods on [`QueryPlan`] hand each closure a schema-aware
//! [`Scope`], the closure assembles dialect-neutral [`Expr`] nodes with the
//! capture combinators, and `compile` renders the accumulated logical plan
//! as query text for a target [`Dialect`] (analytical SQL or a Pure-style
//! relation pipeline). The compiler only produces text; executing it is the
//! caller's concern.
//!
//! ```
//! use relq::{lit, ColumnType, Dialect, QueryPlan};
//!
//! let plan = QueryPlan::table(
//!     "employees",
//!     "e",
//!     [("id", ColumnType::Integer), ("salary", ColumnType::Float)],
//! )
//! .unwrap()
//! .filter(|e| Ok(e.col("salary")?.gt(lit(50_000))))
//! .unwrap()
//! .limit(5)
//! .unwrap();
//!
//! let sql = plan.compile(Dialect::DuckDb).unwrap();
//! assert_eq!(sql, "SELECT * FROM employees e WHERE (e.salary > 50000) LIMIT 5");
//! ```

pub mod capture;
pub mod emitter;
pub mod errors;
pub mod functions;
pub mod metamodel;
pub mod plan;
pub mod schema;

pub use capture::{
    asc, avg, bind, call, count, count_distinct, count_star, dense_rank, desc, lit, max, min,
    null, range, rank, row_number, rows, sum, unbounded, when, window, Scope,
};
pub use emitter::Dialect;
pub use errors::{CaptureError, CodeGenError, CompileError, PlanOrderError, SchemaError};
pub use functions::Function;
pub use metamodel::{
    BinaryOp, Expr, Frame, FrameBound, FrameMode, FunctionCall, Literal, SortKey, UnaryOp,
    WindowExpr,
};
pub use plan::{Cte, JoinKind, PlanStage, QueryPlan};
pub use schema::{ColumnDef, ColumnType, SchemaRegistry, TableSchema};

/// Render a plan for a dialect. Equivalent to [`QueryPlan::compile`].
pub fn compile(plan: &QueryPlan, dialect: Dialect) -> Result<String, CompileError> {
    plan.compile(dialect)
}
