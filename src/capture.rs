//! Expression-capture front end. Builder methods hand closures a
//! schema-aware [`Scope`]; the closure body assembles [`Expr`] nodes through
//! the combinators here. Column references are validated at the `col` call,
//! never deferred to emission.

use log::debug;

use crate::errors::CaptureError;
use crate::functions::{self, Function};
use crate::metamodel::{
    BinaryOp, Expr, Frame, FrameBound, FrameMode, FunctionCall, Literal, SortKey, UnaryOp,
    WindowExpr,
};
use crate::schema::TableSchema;

/// One in-scope relation, handed to a capture closure positionally.
pub struct Scope<'a> {
    schema: &'a TableSchema,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(schema: &'a TableSchema) -> Self {
        Scope { schema }
    }

    /// Reference a declared column of this scope's relation.
    pub fn col(&self, name: &str) -> Result<Expr, CaptureError> {
        if !self.schema.has_column(name) {
            return Err(CaptureError::UnknownColumn {
                name: name.to_string(),
                table: self.schema.name().to_string(),
            });
        }
        Ok(Expr::Column {
            name: name.to_string(),
            table: self.schema.qualifier_for(name).to_string(),
        })
    }

    pub fn alias(&self) -> &str {
        self.schema.alias()
    }
}

pub fn lit(value: impl Into<Literal>) -> Expr {
    Expr::Literal(value.into())
}

pub fn null() -> Expr {
    Expr::Literal(Literal::Null)
}

/// Pair an expression with an explicit output name (rename or computed
/// column definition). Only legal at the top level of a capture result.
pub fn bind(name: impl Into<String>, expr: Expr) -> Expr {
    Expr::Binding {
        name: name.into(),
        expr: Box::new(expr),
    }
}

/// Conditional expression; emitted as CASE WHEN.
pub fn when(test: Expr, body: Expr, orelse: Expr) -> Expr {
    Expr::If {
        test: Box::new(test),
        body: Box::new(body),
        orelse: Box::new(orelse),
    }
}

impl Expr {
    fn binary(self, op: BinaryOp, rhs: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(rhs),
        }
    }

    pub fn add(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Add, rhs)
    }

    pub fn sub(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Sub, rhs)
    }

    pub fn mul(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Mul, rhs)
    }

    pub fn div(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Div, rhs)
    }

    pub fn rem(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Mod, rhs)
    }

    pub fn pow(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Pow, rhs)
    }

    pub fn bit_or(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::BitOr, rhs)
    }

    pub fn bit_and(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::BitAnd, rhs)
    }

    pub fn eq(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Eq, rhs)
    }

    pub fn neq(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::NotEq, rhs)
    }

    pub fn lt(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Lt, rhs)
    }

    pub fn lte(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::LtEq, rhs)
    }

    pub fn gt(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Gt, rhs)
    }

    pub fn gte(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::GtEq, rhs)
    }

    /// Left-associative when chained: `a.and(b).and(c)` folds to
    /// `((a AND b) AND c)`.
    pub fn and(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::And, rhs)
    }

    pub fn or(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Or, rhs)
    }

    pub fn not(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self),
        }
    }

    pub fn is_null(self) -> Expr {
        self.binary(BinaryOp::Is, null())
    }

    pub fn is_not_null(self) -> Expr {
        self.binary(BinaryOp::IsNot, null())
    }

    pub fn is_in<I, L>(self, items: I) -> Expr
    where
        I: IntoIterator<Item = L>,
        L: Into<Literal>,
    {
        let list = Literal::List(items.into_iter().map(Into::into).collect());
        self.binary(BinaryOp::In, Expr::Literal(list))
    }

    pub fn not_in<I, L>(self, items: I) -> Expr
    where
        I: IntoIterator<Item = L>,
        L: Into<Literal>,
    {
        let list = Literal::List(items.into_iter().map(Into::into).collect());
        self.binary(BinaryOp::NotIn, Expr::Literal(list))
    }
}

fn aggregate(function: Function, args: Vec<Expr>, distinct: bool) -> Expr {
    Expr::Call(FunctionCall {
        function,
        args,
        distinct,
    })
}

pub fn sum(expr: Expr) -> Expr {
    aggregate(Function::Sum, vec![expr], false)
}

pub fn avg(expr: Expr) -> Expr {
    aggregate(Function::Avg, vec![expr], false)
}

pub fn min(expr: Expr) -> Expr {
    aggregate(Function::Min, vec![expr], false)
}

pub fn max(expr: Expr) -> Expr {
    aggregate(Function::Max, vec![expr], false)
}

pub fn count(expr: Expr) -> Expr {
    aggregate(Function::Count, vec![expr], false)
}

/// Argument-free count; sugar for `COUNT(1)`.
pub fn count_star() -> Expr {
    aggregate(Function::Count, vec![lit(1)], false)
}

pub fn count_distinct(expr: Expr) -> Expr {
    aggregate(Function::Count, vec![expr], true)
}

pub fn rank() -> Expr {
    aggregate(Function::Rank, Vec::new(), false)
}

pub fn row_number() -> Expr {
    aggregate(Function::RowNumber, Vec::new(), false)
}

pub fn dense_rank() -> Expr {
    aggregate(Function::DenseRank, Vec::new(), false)
}

/// Call a scalar or user-defined function by name. Registered names get
/// their arity checked; unregistered names pass through uninterpreted.
pub fn call(name: &str, args: Vec<Expr>) -> Result<Expr, CaptureError> {
    functions::check_arity(name, args.len())?;
    if functions::scalar_signature(name).is_none() {
        debug!("passing through unregistered function '{}'", name);
    }
    Ok(aggregate(Function::Custom(name.to_string()), args, false))
}

/// Attach a window specification to an aggregate or ranking call.
pub fn window(
    func: Expr,
    partition_by: Vec<Expr>,
    order_by: Vec<SortKey>,
    frame: Option<Frame>,
) -> Result<Expr, CaptureError> {
    match func {
        Expr::Call(function) => Ok(Expr::Over(WindowExpr {
            function,
            partition_by,
            order_by,
            frame,
        })),
        other => Err(CaptureError::NotAFunction {
            got: describe(&other),
        }),
    }
}

pub fn rows(start: impl Into<FrameBound>, end: impl Into<FrameBound>) -> Frame {
    Frame {
        mode: FrameMode::Rows,
        start: start.into(),
        end: end.into(),
    }
}

pub fn range(start: impl Into<FrameBound>, end: impl Into<FrameBound>) -> Frame {
    Frame {
        mode: FrameMode::Range,
        start: start.into(),
        end: end.into(),
    }
}

pub fn unbounded() -> FrameBound {
    FrameBound::Unbounded
}

pub fn asc(expr: Expr) -> SortKey {
    SortKey {
        expr,
        ascending: true,
    }
}

pub fn desc(expr: Expr) -> SortKey {
    SortKey {
        expr,
        ascending: false,
    }
}

pub(crate) fn describe(expr: &Expr) -> &'static str {
    match expr {
        Expr::Literal(_) => "a literal",
        Expr::Column { .. } => "a column reference",
        Expr::Binary { .. } => "a binary expression",
        Expr::Unary { .. } => "a unary expression",
        Expr::If { .. } => "a conditional expression",
        Expr::Call(_) => "a function call",
        Expr::Over(_) => "a window expression",
        Expr::Binding { .. } => "a binding",
    }
}

/// Predicate-position capture: bindings are illegal anywhere in the tree.
pub(crate) fn check_condition(expr: &Expr, context: &'static str) -> Result<(), CaptureError> {
    if let Expr::Binding { name, .. } = expr {
        return Err(CaptureError::MisplacedBinding {
            name: name.clone(),
            context,
        });
    }
    no_nested_bindings(expr)
}

/// Projection-position capture: a binding is legal at the top level only.
pub(crate) fn check_target(expr: &Expr) -> Result<(), CaptureError> {
    match expr {
        Expr::Binding { expr, .. } => no_nested_bindings(expr),
        other => no_nested_bindings(other),
    }
}

/// A `Binding` anywhere below the entry node is nested, hence illegal.
fn no_nested_bindings(expr: &Expr) -> Result<(), CaptureError> {
    match expr {
        Expr::Literal(_) | Expr::Column { .. } => Ok(()),
        Expr::Binary { left, right, .. } => {
            no_nested_bindings(left)?;
            no_nested_bindings(right)
        }
        Expr::Unary { operand, .. } => no_nested_bindings(operand),
        Expr::If { test, body, orelse } => {
            no_nested_bindings(test)?;
            no_nested_bindings(body)?;
            no_nested_bindings(orelse)
        }
        Expr::Call(fc) => fc.args.iter().try_for_each(no_nested_bindings),
        Expr::Over(w) => {
            w.function.args.iter().try_for_each(no_nested_bindings)?;
            w.partition_by.iter().try_for_each(no_nested_bindings)?;
            w.order_by
                .iter()
                .try_for_each(|k| no_nested_bindings(&k.expr))
        }
        Expr::Binding { name, .. } => Err(CaptureError::NestedBinding { name: name.clone() }),
    }
}

pub(crate) fn any_node(expr: &Expr, pred: &dyn Fn(&Expr) -> bool) -> bool {
    if pred(expr) {
        return true;
    }
    match expr {
        Expr::Literal(_) | Expr::Column { .. } => false,
        Expr::Binary { left, right, .. } => any_node(left, pred) || any_node(right, pred),
        Expr::Unary { operand, .. } => any_node(operand, pred),
        Expr::If { test, body, orelse } => {
            any_node(test, pred) || any_node(body, pred) || any_node(orelse, pred)
        }
        Expr::Call(fc) => fc.args.iter().any(|a| any_node(a, pred)),
        Expr::Over(w) => {
            w.function.args.iter().any(|a| any_node(a, pred))
                || w.partition_by.iter().any(|a| any_node(a, pred))
                || w.order_by.iter().any(|k| any_node(&k.expr, pred))
        }
        Expr::Binding { expr, .. } => any_node(expr, pred),
    }
}

pub(crate) fn contains_window(expr: &Expr) -> bool {
    any_node(expr, &|e| matches!(e, Expr::Over(_)))
}

pub(crate) fn contains_aggregate(expr: &Expr) -> bool {
    any_node(expr, &|e| {
        matches!(e, Expr::Call(fc) if fc.function.is_aggregate())
    })
}
