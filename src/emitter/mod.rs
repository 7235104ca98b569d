//! Dialect code generators. Pure functions from a finalized plan to query
//! text; identical plan + dialect always produce byte-identical output.

pub mod dialect;
pub mod pure;
pub mod sql;

pub use dialect::Dialect;

use crate::errors::CodeGenError;
use crate::plan::QueryPlan;
use dialect::DuckDbDialect;

pub fn emit(plan: &QueryPlan, dialect: Dialect) -> Result<String, CodeGenError> {
    match dialect {
        Dialect::DuckDb => sql::emit_sql(plan, &DuckDbDialect),
        Dialect::Pure => pure::emit_pure(plan),
    }
}
