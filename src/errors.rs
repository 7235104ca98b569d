//! Error taxonomy for the compiler. Every error is reported synchronously at
//! the call that triggers it: capture errors at capture time, plan-order
//! errors at builder-call time, codegen errors at emit time.

/// Closure body used a construct outside the supported expression grammar.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("column '{name}' not found in relation '{table}'")]
    UnknownColumn { name: String, table: String },
    #[error("binding '{name}' must appear at the top level of a capture")]
    NestedBinding { name: String },
    #[error("binding '{name}' is not allowed in a {context} expression")]
    MisplacedBinding { name: String, context: &'static str },
    #[error("{context} target needs an output name: wrap it with bind(name, expr)")]
    UnnamedExpression { context: &'static str },
    #[error("window() requires an aggregate or ranking call, got {got}")]
    NotAFunction { got: &'static str },
    #[error("group_by aggregate '{name}' does not contain an aggregate call")]
    NotAggregate { name: String },
    #[error("function '{function}' expects {expected} argument(s), got {got}")]
    WrongArity { function: String, expected: String, got: usize },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("relation '{0}' is already registered")]
    DuplicateRelation(String),
    #[error("unknown relation '{0}'")]
    UnknownRelation(String),
    #[error("duplicate column '{column}' in relation '{table}'")]
    DuplicateColumn { column: String, table: String },
}

/// A builder operation was used out of its required sequence.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PlanOrderError {
    #[error("having() requires a preceding group_by()")]
    HavingWithoutGroupBy,
    #[error("qualify() requires a preceding window expression")]
    QualifyWithoutWindow,
    #[error("plan is already compiled; clone it to keep building")]
    PlanFinalized,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CodeGenError {
    #[error("{construct} is not supported by the {dialect} dialect")]
    Unsupported {
        construct: &'static str,
        dialect: &'static str,
    },
}

/// Umbrella error returned by the plan builder and `compile`.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    PlanOrder(#[from] PlanOrderError),
    #[error(transparent)]
    CodeGen(#[from] CodeGenError),
}
