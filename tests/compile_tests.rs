use relq::{
    asc, bind, call, count_star, desc, lit, row_number, rows, sum, unbounded, when, window,
    CaptureError, CodeGenError, ColumnType, CompileError, Dialect, PlanOrderError, QueryPlan,
    SchemaRegistry, TableSchema,
};

fn employees() -> QueryPlan {
    QueryPlan::table(
        "employees",
        "e",
        [
            ("id", ColumnType::Integer),
            ("name", ColumnType::Text),
            ("department_id", ColumnType::Integer),
            ("salary", ColumnType::Float),
        ],
    )
    .expect("schema")
}

fn departments() -> QueryPlan {
    QueryPlan::table(
        "departments",
        "d",
        [
            ("dept_id", ColumnType::Integer),
            ("dept_name", ColumnType::Text),
        ],
    )
    .expect("schema")
}

#[test]
fn select_with_bindings_golden() {
    let _ = env_logger::builder().is_test(true).try_init();
    let plan = employees()
        .select(|e| Ok(vec![bind("id", e.col("id")?), bind("name", e.col("name")?)]))
        .unwrap();
    let sql = plan.compile(Dialect::DuckDb).unwrap();
    assert_eq!(sql, "SELECT e.id AS id, e.name AS name FROM employees e");
}

#[test]
fn filter_order_limit_clause_order() {
    let plan = employees()
        .filter(|e| Ok(e.col("salary")?.gt(lit(50_000))))
        .unwrap()
        .order_by(|e| Ok(vec![asc(e.col("salary")?)]))
        .unwrap()
        .limit(5)
        .unwrap();
    let sql = plan.compile(Dialect::DuckDb).unwrap();
    assert_eq!(
        sql,
        "SELECT * FROM employees e WHERE (e.salary > 50000) ORDER BY e.salary ASC LIMIT 5"
    );
    let where_pos = sql.find(" WHERE ").unwrap();
    let order_pos = sql.find(" ORDER BY ").unwrap();
    let limit_pos = sql.find(" LIMIT ").unwrap();
    assert!(where_pos < order_pos && order_pos < limit_pos);
}

#[test]
fn emission_is_idempotent() {
    let plan = employees()
        .filter(|e| Ok(e.col("salary")?.gt(lit(1))))
        .unwrap();
    let first = plan.compile(Dialect::DuckDb).unwrap();
    let second = plan.compile(Dialect::DuckDb).unwrap();
    assert_eq!(first, second);
}

#[test]
fn literal_tokens_round_trip() {
    let plan = employees()
        .extend(|_| {
            Ok(vec![
                bind("i", lit(42)),
                bind("f", lit(2.5)),
                bind("g", lit(2.0)),
                bind("s", lit("O'Brien")),
                bind("b", lit(true)),
                bind("n", relq::null()),
            ])
        })
        .unwrap();
    let sql = plan.compile(Dialect::DuckDb).unwrap();
    assert!(sql.contains("42 AS i"));
    assert!(sql.contains("2.5 AS f"));
    assert!(sql.contains("2.0 AS g"));
    assert!(sql.contains("'O''Brien' AS s"));
    assert!(sql.contains("TRUE AS b"));
    assert!(sql.contains("NULL AS n"));
}

#[test]
fn nested_binding_in_projection_is_rejected() {
    let err = employees()
        .select(|e| Ok(vec![bind("a", bind("b", e.col("id")?))]))
        .unwrap_err();
    assert_eq!(
        err,
        CompileError::Capture(CaptureError::NestedBinding { name: "b".into() })
    );
}

#[test]
fn distinct_after_limit_wraps_subquery() {
    let plan = employees().limit(2).unwrap().distinct().unwrap();
    assert_eq!(
        plan.compile(Dialect::DuckDb).unwrap(),
        "SELECT DISTINCT * FROM (SELECT * FROM employees e LIMIT 2) q0"
    );
    // The other way round there is nothing retained yet to dedupe.
    let plan = employees().distinct().unwrap().limit(2).unwrap();
    assert_eq!(
        plan.compile(Dialect::DuckDb).unwrap(),
        "SELECT DISTINCT * FROM employees e LIMIT 2"
    );
}

#[test]
fn binary_operators_emit_sql_tokens() {
    let cases: Vec<(
        fn(relq::Expr, relq::Expr) -> relq::Expr,
        &str,
    )> = vec![
        (relq::Expr::add, "(e.salary + e.id)"),
        (relq::Expr::sub, "(e.salary - e.id)"),
        (relq::Expr::mul, "(e.salary * e.id)"),
        (relq::Expr::div, "(e.salary / e.id)"),
        (relq::Expr::rem, "(e.salary % e.id)"),
        (relq::Expr::pow, "(e.salary ^ e.id)"),
        (relq::Expr::bit_or, "(e.salary | e.id)"),
        (relq::Expr::bit_and, "(e.salary & e.id)"),
        (relq::Expr::eq, "(e.salary = e.id)"),
        (relq::Expr::neq, "(e.salary != e.id)"),
        (relq::Expr::lt, "(e.salary < e.id)"),
        (relq::Expr::lte, "(e.salary <= e.id)"),
        (relq::Expr::gt, "(e.salary > e.id)"),
        (relq::Expr::gte, "(e.salary >= e.id)"),
        (relq::Expr::and, "(e.salary AND e.id)"),
        (relq::Expr::or, "(e.salary OR e.id)"),
    ];
    for (combine, expected) in cases {
        let plan = employees()
            .filter(|e| Ok(combine(e.col("salary")?, e.col("id")?)))
            .unwrap();
        let sql = plan.compile(Dialect::DuckDb).unwrap();
        assert!(sql.contains(expected), "{sql} missing {expected}");
    }
}

#[test]
fn membership_and_null_predicates() {
    let plan = employees()
        .filter(|e| Ok(e.col("id")?.is_in([1, 2, 3])))
        .unwrap();
    let sql = plan.compile(Dialect::DuckDb).unwrap();
    assert!(sql.contains("(e.id IN (1, 2, 3))"));

    let plan = employees()
        .filter(|e| Ok(e.col("name")?.is_not_null()))
        .unwrap();
    let sql = plan.compile(Dialect::DuckDb).unwrap();
    assert!(sql.contains("(e.name IS NOT NULL)"));
}

#[test]
fn conditional_renders_case_when() {
    let plan = employees()
        .extend(|e| {
            Ok(vec![bind(
                "band",
                when(e.col("salary")?.gt(lit(100_000)), lit("high"), lit("low")),
            )])
        })
        .unwrap();
    let sql = plan.compile(Dialect::DuckDb).unwrap();
    assert!(
        sql.contains("CASE WHEN (e.salary > 100000) THEN 'high' ELSE 'low' END AS band"),
        "{sql}"
    );
}

#[test]
fn group_by_having_golden() {
    let plan = employees()
        .group_by(
            |e| Ok(vec![e.col("department_id")?]),
            |e| Ok(vec![bind("total", sum(e.col("salary")?)), count_star()]),
        )
        .unwrap()
        .having(|g| Ok(g.col("total")?.gt(lit(100_000))))
        .unwrap();
    let sql = plan.compile(Dialect::DuckDb).unwrap();
    assert_eq!(
        sql,
        "SELECT e.department_id, SUM(e.salary) AS total, COUNT(1) \
         FROM employees e GROUP BY e.department_id HAVING (total > 100000)"
    );
}

#[test]
fn having_without_group_by_is_a_plan_order_error() {
    let err = employees()
        .having(|e| Ok(e.col("salary")?.gt(lit(1))))
        .unwrap_err();
    assert_eq!(
        err,
        CompileError::PlanOrder(PlanOrderError::HavingWithoutGroupBy)
    );
}

#[test]
fn unknown_column_fails_capture() {
    let err = employees()
        .filter(|e| Ok(e.col("bonus")?.gt(lit(0))))
        .unwrap_err();
    assert_eq!(
        err,
        CompileError::Capture(CaptureError::UnknownColumn {
            name: "bonus".into(),
            table: "employees".into(),
        })
    );
}

#[test]
fn select_after_group_by_wraps_subquery() {
    let plan = employees()
        .group_by(
            |e| Ok(vec![e.col("department_id")?]),
            |e| Ok(vec![bind("total", sum(e.col("salary")?))]),
        )
        .unwrap()
        .select(|g| Ok(vec![g.col("total")?]))
        .unwrap();
    let sql = plan.compile(Dialect::DuckDb).unwrap();
    assert_eq!(
        sql,
        "SELECT q0.total FROM (SELECT e.department_id, SUM(e.salary) AS total \
         FROM employees e GROUP BY e.department_id) q0"
    );
}

#[test]
fn window_function_with_frame() {
    let plan = employees()
        .extend(|e| {
            Ok(vec![bind(
                "running",
                window(
                    sum(e.col("salary")?),
                    vec![e.col("department_id")?],
                    vec![asc(e.col("id")?)],
                    Some(rows(unbounded(), 0)),
                )?,
            )])
        })
        .unwrap();
    let sql = plan.compile(Dialect::DuckDb).unwrap();
    assert!(
        sql.contains(
            "SUM(e.salary) OVER (PARTITION BY e.department_id ORDER BY e.id ASC \
             ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW) AS running"
        ),
        "{sql}"
    );
}

#[test]
fn qualify_renders_after_window() {
    let plan = employees()
        .extend(|e| {
            Ok(vec![bind(
                "rn",
                window(
                    row_number(),
                    vec![e.col("department_id")?],
                    vec![desc(e.col("salary")?)],
                    None,
                )?,
            )])
        })
        .unwrap()
        .qualify(|e| Ok(e.col("rn")?.lte(lit(2))))
        .unwrap();
    let sql = plan.compile(Dialect::DuckDb).unwrap();
    assert!(sql.contains(" QUALIFY (rn <= 2)"), "{sql}");
    assert!(sql.contains("ROW_NUMBER() OVER (PARTITION BY e.department_id ORDER BY e.salary DESC) AS rn"));
}

#[test]
fn join_golden() {
    let plan = employees()
        .join(departments(), |e, d| {
            Ok(e.col("department_id")?.eq(d.col("dept_id")?))
        })
        .unwrap()
        .select(|s| Ok(vec![bind("who", s.col("name")?), s.col("dept_name")?]))
        .unwrap();
    let sql = plan.compile(Dialect::DuckDb).unwrap();
    assert_eq!(
        sql,
        "SELECT e.name AS who, d.dept_name FROM employees e \
         INNER JOIN departments d ON (e.department_id = d.dept_id)"
    );
}

#[test]
fn left_and_asof_join_keywords() {
    let plan = employees()
        .left_join(departments(), |e, d| {
            Ok(e.col("department_id")?.eq(d.col("dept_id")?))
        })
        .unwrap();
    let sql = plan.compile(Dialect::DuckDb).unwrap();
    assert!(sql.contains(" LEFT JOIN departments d ON "));

    let plan = employees()
        .asof_join(departments(), |e, d| {
            Ok(e.col("department_id")?.gte(d.col("dept_id")?))
        })
        .unwrap();
    let sql = plan.compile(Dialect::DuckDb).unwrap();
    assert!(sql.contains(" ASOF JOIN departments d ON "));
}

#[test]
fn pagination_order_is_preserved() {
    // offset-then-limit folds into one block; limit-then-offset must not.
    let plan = employees().offset(20).unwrap().limit(10).unwrap();
    assert_eq!(
        plan.compile(Dialect::DuckDb).unwrap(),
        "SELECT * FROM employees e LIMIT 10 OFFSET 20"
    );

    let plan = employees().limit(10).unwrap().offset(3).unwrap();
    assert_eq!(
        plan.compile(Dialect::DuckDb).unwrap(),
        "SELECT * FROM (SELECT * FROM employees e LIMIT 10) q0 OFFSET 3"
    );
}

#[test]
fn cte_renders_with_clause() {
    let top = employees()
        .filter(|e| Ok(e.col("salary")?.gt(lit(100_000))))
        .unwrap();
    let plan = QueryPlan::table("top_earners", "t", [("id", ColumnType::Integer)])
        .unwrap()
        .let_cte("top_earners", top)
        .unwrap()
        .select(|t| Ok(vec![t.col("id")?]))
        .unwrap();
    let sql = plan.compile(Dialect::DuckDb).unwrap();
    assert_eq!(
        sql,
        "WITH top_earners AS (SELECT * FROM employees e WHERE (e.salary > 100000)) \
         SELECT t.id FROM top_earners t"
    );
}

#[test]
fn recursive_cte_uses_recursive_keyword() {
    let seed = employees().limit(1).unwrap();
    let plan = QueryPlan::table("chain", "c", [("id", ColumnType::Integer)])
        .unwrap()
        .recurse("chain", seed)
        .unwrap();
    let sql = plan.compile(Dialect::DuckDb).unwrap();
    assert!(sql.starts_with("WITH RECURSIVE chain AS ("), "{sql}");
}

#[test]
fn custom_function_passes_through() {
    let plan = employees()
        .extend(|e| Ok(vec![bind("initials", call("left", vec![e.col("name")?, lit(1)])?)]))
        .unwrap();
    let sql = plan.compile(Dialect::DuckDb).unwrap();
    assert!(sql.contains("left(e.name, 1) AS initials"), "{sql}");
}

#[test]
fn registry_plans_share_schemas() {
    let mut registry = SchemaRegistry::new();
    registry
        .register(
            TableSchema::new("employees", "e", [("id", ColumnType::Integer)]).unwrap(),
        )
        .unwrap();
    let a = registry.plan("employees").unwrap().limit(1).unwrap();
    let b = registry.plan("employees").unwrap().limit(2).unwrap();
    assert_eq!(
        a.compile(Dialect::DuckDb).unwrap(),
        "SELECT * FROM employees e LIMIT 1"
    );
    assert_eq!(
        b.compile(Dialect::DuckDb).unwrap(),
        "SELECT * FROM employees e LIMIT 2"
    );
}

#[test]
fn pure_pipeline_golden() {
    let plan = employees()
        .filter(|e| Ok(e.col("salary")?.gt(lit(50_000))))
        .unwrap()
        .select(|e| Ok(vec![e.col("id")?, bind("employee_name", e.col("name")?)]))
        .unwrap()
        .order_by(|s| Ok(vec![desc(s.col("employee_name")?)]))
        .unwrap()
        .limit(3)
        .unwrap();
    let code = plan.compile(Dialect::Pure).unwrap();
    assert_eq!(
        code,
        "$employees->filter(x | ($x.salary > 50000))->select(~[id, name])\
         ->rename(~name, ~employee_name)->sort(descending(~employee_name))->limit(3)"
    );
}

#[test]
fn pure_group_by_golden() {
    let plan = employees()
        .group_by(
            |e| Ok(vec![e.col("department_id")?]),
            |e| Ok(vec![bind("total", sum(e.col("salary")?)), count_star()]),
        )
        .unwrap();
    let code = plan.compile(Dialect::Pure).unwrap();
    assert_eq!(
        code,
        "$employees->groupBy(~[department_id], ~[total:x|$x.salary->sum(), count:x|$x->count()])"
    );
}

#[test]
fn pure_join_golden() {
    let plan = employees()
        .join(departments(), |e, d| {
            Ok(e.col("department_id")?.eq(d.col("dept_id")?))
        })
        .unwrap();
    let code = plan.compile(Dialect::Pure).unwrap();
    assert_eq!(
        code,
        "$employees->join($departments, JoinKind.INNER, {x, y | ($x.department_id == $y.dept_id)})"
    );
}

#[test]
fn pure_offset_uses_drop() {
    let plan = employees().offset(4).unwrap();
    assert_eq!(plan.compile(Dialect::Pure).unwrap(), "$employees->drop(4)");
}

#[test]
fn pure_cte_renders_let_binding() {
    let top = employees()
        .filter(|e| Ok(e.col("salary")?.gt(lit(100_000))))
        .unwrap();
    let plan = QueryPlan::table("top_earners", "t", [("id", ColumnType::Integer)])
        .unwrap()
        .let_cte("top_earners", top)
        .unwrap();
    let code = plan.compile(Dialect::Pure).unwrap();
    assert_eq!(
        code,
        "let top_earners = $employees->filter(x | ($x.salary > 100000));\n$top_earners"
    );
}

#[test]
fn pure_float_literals_keep_decimal_point() {
    let plan = employees()
        .filter(|e| Ok(e.col("salary")?.gt(lit(2.0))))
        .unwrap();
    assert_eq!(
        plan.compile(Dialect::Pure).unwrap(),
        "$employees->filter(x | ($x.salary > 2.0))"
    );
}

#[test]
fn pure_rejects_window_expressions() {
    let plan = employees()
        .extend(|e| {
            Ok(vec![bind(
                "rn",
                window(row_number(), vec![e.col("department_id")?], vec![], None)?,
            )])
        })
        .unwrap();
    let err = plan.compile(Dialect::Pure).unwrap_err();
    assert_eq!(
        err,
        CompileError::CodeGen(CodeGenError::Unsupported {
            construct: "window expression",
            dialect: "pure",
        })
    );
}

#[test]
fn binding_aliases_appear_in_both_dialects() {
    let make = || {
        employees()
            .select(|e| Ok(vec![bind("employee_id", e.col("id")?)]))
            .unwrap()
    };
    let sql = make().compile(Dialect::DuckDb).unwrap();
    assert!(sql.contains("e.id AS employee_id"));
    let pure = make().compile(Dialect::Pure).unwrap();
    assert!(pure.contains("->rename(~id, ~employee_id)"));
}
