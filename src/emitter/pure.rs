//! Relational-algebra ("Pure"-style) generator. Renders the plan as a
//! left-to-right pipeline of named operators, one per stage:
//! `$table->filter(x | ...)->select(~[...])->groupBy(~[...], ~[...])->...`.
//! Constructs the notation has no operator for (windows, qualify, recursive
//! CTEs) fail with a structured `CodeGenError` instead of partial output.

use crate::errors::CodeGenError;
use crate::functions::Function;
use crate::metamodel::{BinaryOp, Expr, FunctionCall, Literal};
use crate::plan::{effective_alias, JoinKind, PlanStage, QueryPlan};

fn unsupported(construct: &'static str) -> CodeGenError {
    CodeGenError::Unsupported {
        construct,
        dialect: "pure",
    }
}

pub fn emit_pure(plan: &QueryPlan) -> Result<String, CodeGenError> {
    let mut out = String::new();
    for cte in &plan.ctes {
        if cte.recursive {
            return Err(unsupported("recursive common table expression"));
        }
        out.push_str(&format!("let {} = {};\n", cte.name, pipeline(&cte.plan)?));
    }
    out.push_str(&pipeline(plan)?);
    Ok(out)
}

fn pipeline(plan: &QueryPlan) -> Result<String, CodeGenError> {
    let mut code = format!("${}", plan.base.name());
    for stage in &plan.stages {
        match stage {
            PlanStage::Filter(pred) | PlanStage::Having(pred) => {
                code.push_str(&format!("->filter(x | {})", scalar(pred)?));
            }
            PlanStage::Select(exprs) => code.push_str(&select_code(exprs)?),
            PlanStage::Extend { added, .. } => {
                let items = added
                    .iter()
                    .map(extend_item)
                    .collect::<Result<Vec<_>, _>>()?;
                code.push_str(&format!("->extend(~[{}])", items.join(", ")));
            }
            PlanStage::Distinct => code.push_str("->distinct()"),
            PlanStage::GroupBy { keys, aggregates } => {
                let key_names = keys.iter().map(key_name).collect::<Result<Vec<_>, _>>()?;
                let aggs = aggregates
                    .iter()
                    .map(aggregate_item)
                    .collect::<Result<Vec<_>, _>>()?;
                if aggs.is_empty() {
                    code.push_str(&format!("->groupBy(~[{}])", key_names.join(", ")));
                } else {
                    code.push_str(&format!(
                        "->groupBy(~[{}], ~[{}])",
                        key_names.join(", "),
                        aggs.join(", ")
                    ));
                }
            }
            PlanStage::Join { kind, right, on } => {
                let join_kind = match kind {
                    JoinKind::Inner => "INNER",
                    JoinKind::Left => "LEFT",
                    JoinKind::Right => return Err(unsupported("right join")),
                    JoinKind::Full => return Err(unsupported("full outer join")),
                    JoinKind::AsOf => return Err(unsupported("asof join")),
                };
                let right_alias = effective_alias(right);
                let condition = expr_with(on, &|table| {
                    if table == right_alias {
                        "y"
                    } else {
                        "x"
                    }
                })?;
                code = format!(
                    "{}->join({}, JoinKind.{}, {{x, y | {}}})",
                    code,
                    pipeline(right)?,
                    join_kind,
                    condition
                );
            }
            PlanStage::OrderBy(keys) => {
                let mut items = Vec::with_capacity(keys.len());
                for key in keys {
                    let name = match &key.expr {
                        Expr::Column { name, .. } => name,
                        _ => return Err(unsupported("computed sort key")),
                    };
                    let direction = if key.ascending { "ascending" } else { "descending" };
                    items.push(format!("{}(~{})", direction, name));
                }
                code.push_str(&format!("->sort({})", items.join(", ")));
            }
            PlanStage::Qualify(_) => return Err(unsupported("qualify")),
            PlanStage::Limit(n) => code.push_str(&format!("->limit({n})")),
            PlanStage::Offset(n) => code.push_str(&format!("->drop({n})")),
        }
    }
    Ok(code)
}

/// Projection: plain references select by name, renames become an explicit
/// rename operator after the base projection, computed bindings extend first.
fn select_code(exprs: &[Expr]) -> Result<String, CodeGenError> {
    let mut extends: Vec<String> = Vec::new();
    let mut names: Vec<String> = Vec::new();
    let mut renames: Vec<(String, String)> = Vec::new();
    for expr in exprs {
        match expr {
            Expr::Column { name, .. } => names.push(name.clone()),
            Expr::Binding { name, expr } => match &**expr {
                Expr::Column { name: source, .. } => {
                    names.push(source.clone());
                    if source != name {
                        renames.push((source.clone(), name.clone()));
                    }
                }
                computed => {
                    extends.push(format!("{}:x|{}", name, scalar(computed)?));
                    names.push(name.clone());
                }
            },
            _ => return Err(unsupported("unnamed projection expression")),
        }
    }
    let mut code = String::new();
    if !extends.is_empty() {
        code.push_str(&format!("->extend(~[{}])", extends.join(", ")));
    }
    code.push_str(&format!("->select(~[{}])", names.join(", ")));
    for (old, new) in renames {
        code.push_str(&format!("->rename(~{}, ~{})", old, new));
    }
    Ok(code)
}

fn extend_item(expr: &Expr) -> Result<String, CodeGenError> {
    match expr {
        Expr::Binding { name, expr } => Ok(format!("{}:x|{}", name, scalar(expr)?)),
        Expr::Column { name, .. } => Ok(format!("{}:x|$x.{}", name, name)),
        _ => Err(unsupported("unnamed projection expression")),
    }
}

fn key_name(expr: &Expr) -> Result<String, CodeGenError> {
    match expr {
        Expr::Column { name, .. } => Ok(name.clone()),
        Expr::Binding { expr, .. } => match &**expr {
            Expr::Column { name, .. } => Ok(name.clone()),
            _ => Err(unsupported("computed grouping key")),
        },
        _ => Err(unsupported("computed grouping key")),
    }
}

fn aggregate_item(expr: &Expr) -> Result<String, CodeGenError> {
    let (name, inner) = match expr {
        Expr::Binding { name, expr } => (name.clone(), &**expr),
        Expr::Call(fc) => (fc.function.name().to_ascii_lowercase(), expr),
        _ => return Err(unsupported("unnamed aggregate expression")),
    };
    Ok(format!("{}:x|{}", name, scalar(inner)?))
}

fn scalar(expr: &Expr) -> Result<String, CodeGenError> {
    expr_with(expr, &|_| "x")
}

/// `var` maps a captured table qualifier to the lambda variable in scope.
fn expr_with(expr: &Expr, var: &dyn Fn(&str) -> &'static str) -> Result<String, CodeGenError> {
    Ok(match expr {
        Expr::Column { name, table } => format!("${}.{}", var(table), name),
        Expr::Literal(lit) => literal(lit)?,
        Expr::Binary { left, op, right } => format!(
            "({} {} {})",
            expr_with(left, var)?,
            pure_op(*op)?,
            expr_with(right, var)?
        ),
        Expr::Unary { operand, .. } => format!("!({})", expr_with(operand, var)?),
        Expr::If { test, body, orelse } => format!(
            "if({}, |{}, |{})",
            expr_with(test, var)?,
            expr_with(body, var)?,
            expr_with(orelse, var)?
        ),
        Expr::Call(fc) => call_code(fc, var)?,
        Expr::Over(_) => return Err(unsupported("window expression")),
        Expr::Binding { expr, .. } => expr_with(expr, var)?,
    })
}

fn call_code(fc: &FunctionCall, var: &dyn Fn(&str) -> &'static str) -> Result<String, CodeGenError> {
    let fname = match &fc.function {
        Function::Sum => "sum",
        Function::Avg => "average",
        Function::Count => "count",
        Function::Min => "min",
        Function::Max => "max",
        Function::Rank => "rank",
        Function::RowNumber => "rowNumber",
        Function::DenseRank => "denseRank",
        Function::Custom(name) => name,
    };
    // Argument-free count ranges over the whole group.
    if fc.function == Function::Count
        && !fc.distinct
        && fc.args == [Expr::Literal(Literal::Int(1))]
    {
        return Ok("$x->count()".to_string());
    }
    let mut args = fc.args.iter().map(|a| expr_with(a, var));
    let receiver = match args.next() {
        Some(first) => first?,
        None => return Ok(format!("{}()", fname)),
    };
    let rest = args.collect::<Result<Vec<_>, _>>()?;
    if fc.distinct {
        if fc.function == Function::Count {
            return Ok(format!("{}->distinct()->count()", receiver));
        }
        return Err(unsupported("distinct aggregate"));
    }
    Ok(format!("{}->{}({})", receiver, fname, rest.join(", ")))
}

fn pure_op(op: BinaryOp) -> Result<&'static str, CodeGenError> {
    Ok(match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Eq | BinaryOp::Is => "==",
        BinaryOp::NotEq | BinaryOp::IsNot => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::LtEq => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::GtEq => ">=",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
        BinaryOp::Pow => return Err(unsupported("power operator")),
        BinaryOp::BitOr | BinaryOp::BitAnd => return Err(unsupported("bitwise operator")),
        BinaryOp::In | BinaryOp::NotIn => return Err(unsupported("membership predicate")),
    })
}

fn literal(lit: &Literal) -> Result<String, CodeGenError> {
    Ok(match lit {
        Literal::Int(v) => v.to_string(),
        Literal::Float(v) => super::sql::float_token(*v),
        Literal::Str(s) => format!("\"{}\"", s.replace('"', "\\\"")),
        Literal::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        Literal::Null => "null".to_string(),
        Literal::List(_) => return Err(unsupported("list literal")),
    })
}
