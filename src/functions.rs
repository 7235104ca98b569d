//! Built-in function dispatch. Closed tagged enum for the functions the
//! emitters know how to shape, plus a `Custom` pass-through variant so
//! unregistered names flow to the emitter uninterpreted.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::errors::CaptureError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Function {
    Sum,
    Avg,
    Count,
    Min,
    Max,
    Rank,
    RowNumber,
    DenseRank,
    /// Scalar or user-defined function passed through by name.
    Custom(String),
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::Sum => "SUM",
            Function::Avg => "AVG",
            Function::Count => "COUNT",
            Function::Min => "MIN",
            Function::Max => "MAX",
            Function::Rank => "RANK",
            Function::RowNumber => "ROW_NUMBER",
            Function::DenseRank => "DENSE_RANK",
            Function::Custom(name) => name,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            Function::Sum | Function::Avg | Function::Count | Function::Min | Function::Max
        )
    }

    pub fn is_ranking(&self) -> bool {
        matches!(
            self,
            Function::Rank | Function::RowNumber | Function::DenseRank
        )
    }
}

/// Arity contract for a registered scalar function.
#[derive(Debug, Clone, Copy)]
pub struct ScalarSignature {
    pub min_args: usize,
    pub max_args: usize,
}

impl ScalarSignature {
    fn new(min_args: usize, max_args: usize) -> Self {
        ScalarSignature { min_args, max_args }
    }

    pub fn expected(&self) -> String {
        if self.min_args == self.max_args {
            self.min_args.to_string()
        } else if self.max_args == usize::MAX {
            format!("at least {}", self.min_args)
        } else {
            format!("{} to {}", self.min_args, self.max_args)
        }
    }
}

static SCALAR_REGISTRY: Lazy<HashMap<&'static str, ScalarSignature>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("left", ScalarSignature::new(2, 2));
    m.insert("right", ScalarSignature::new(2, 2));
    m.insert("upper", ScalarSignature::new(1, 1));
    m.insert("lower", ScalarSignature::new(1, 1));
    m.insert("length", ScalarSignature::new(1, 1));
    m.insert("abs", ScalarSignature::new(1, 1));
    m.insert("round", ScalarSignature::new(1, 2));
    m.insert("concat", ScalarSignature::new(1, usize::MAX));
    m.insert("coalesce", ScalarSignature::new(1, usize::MAX));
    m
});

/// Look up a registered scalar function signature by name.
pub fn scalar_signature(name: &str) -> Option<ScalarSignature> {
    SCALAR_REGISTRY.get(name).copied()
}

/// Validate an argument count against the registry, if the name is known.
pub fn check_arity(name: &str, got: usize) -> Result<(), CaptureError> {
    if let Some(sig) = scalar_signature(name) {
        if got < sig.min_args || got > sig.max_args {
            return Err(CaptureError::WrongArity {
                function: name.to_string(),
                expected: sig.expected(),
                got,
            });
        }
    }
    Ok(())
}
