use quarry_core::expr::{col, desc, div, eq, func, lit, minus, null, param, plus};
use quarry_core::{ExecutionConfig, LogicalOperator, QuarryError, Value, row};
use rstests::{employees, run};

#[test]
fn unknown_field_suggests_closest() {
    let err = employees()
        .query(LogicalOperator::load("employees").project([col("nmae")]))
        .unwrap_err();
    match err {
        QuarryError::FieldNotFound { path, suggestion } => {
            assert_eq!("nmae", path);
            assert_eq!(Some("name".to_string()), suggestion);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn ambiguous_field_in_self_join() {
    let err = employees()
        .query(
            LogicalOperator::load("employees")
                .alias("a")
                .join(LogicalOperator::load("employees").alias("b"), None)
                .project([col("id")]),
        )
        .unwrap_err();
    assert!(matches!(err, QuarryError::AmbiguousField { .. }), "{err}");
}

#[test]
fn type_mismatch() {
    let err = employees()
        .query(LogicalOperator::load("employees").project([plus(col("id"), lit(true))]))
        .unwrap_err();
    assert!(matches!(err, QuarryError::TypeMismatch { .. }), "{err}");
}

#[test]
fn unknown_function() {
    let err = employees()
        .query(LogicalOperator::load("employees").project([func("nope", [col("id")])]))
        .unwrap_err();
    assert!(matches!(err, QuarryError::FunctionNotFound(name) if name == "nope"));
}

#[test]
fn unknown_relation() {
    let err = employees().query(LogicalOperator::load("nope")).unwrap_err();
    assert!(matches!(err, QuarryError::RelationNotFound(name) if name == "nope"));
}

#[test]
fn errors_surface_lazily() {
    let query = employees()
        .query(
            LogicalOperator::load("employees")
                .project([div(lit(1), plus(col("id"), lit(-4567)))]),
        )
        .unwrap();

    let mut rows = query.execute(Vec::new()).unwrap();
    assert!(rows.next().unwrap().is_ok());
    assert!(matches!(rows.next(), Some(Err(QuarryError::Execution(_)))));
}

#[test]
fn errors_in_skipped_rows_surface() {
    // Tom's row divides by zero and falls inside the skipped range.
    let query = employees()
        .query(
            LogicalOperator::load("employees")
                .project([div(lit(1), minus(col("id"), lit(1234)))])
                .slice(Some(1), None),
        )
        .unwrap();

    let mut rows = query.execute(Vec::new()).unwrap();
    assert!(matches!(rows.next(), Some(Err(QuarryError::Execution(_)))));
    assert_eq!(row![0], rows.next().unwrap().unwrap());

    let err = run(
        &employees(),
        LogicalOperator::load("employees")
            .project([div(lit(1), minus(col("id"), lit(1234)))])
            .slice(Some(1), None),
    )
    .unwrap_err();
    assert!(matches!(err, QuarryError::Execution(_)), "{err}");
}

#[test]
fn sort_direction_outside_order_by() {
    for op in [
        LogicalOperator::load("employees").project([desc(col("id"))]),
        LogicalOperator::load("employees").select(desc(eq(col("id"), lit(1)))),
    ] {
        let err = employees().query(op).unwrap_err();
        assert!(matches!(err, QuarryError::InvalidPlan(_)), "{err}");
    }

    let rows = run(
        &employees(),
        LogicalOperator::load("employees")
            .order_by([desc(col("id"))])
            .project([col("id")]),
    )
    .unwrap();
    assert_eq!(vec![row![8901], row![4567], row![1234]], rows);
}

#[test]
fn union_arity_mismatch() {
    let err = employees()
        .query(
            LogicalOperator::load("employees")
                .project([col("id")])
                .union_all(LogicalOperator::load("").project([null(), null()])),
        )
        .unwrap_err();
    assert!(matches!(err, QuarryError::InvalidPlan(_)), "{err}");
}

#[test]
fn missing_parameter() {
    let query = employees()
        .query(LogicalOperator::load("employees").select(eq(col("id"), param(0))))
        .unwrap();

    let mut rows = query.execute(Vec::new()).unwrap();
    assert!(matches!(rows.next(), Some(Err(QuarryError::Execution(_)))));

    let rows: Vec<_> = query
        .execute(vec![Value::from(8901)])
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(vec![row![8901, "Mark", 1234]], rows);
}

#[test]
fn config_from_json() {
    let config: ExecutionConfig =
        serde_json::from_str(r#"{"join_buffer_size": 16, "force_nested_block_join": true}"#)
            .unwrap();
    assert_eq!(8, config.join_side_budget());

    let rows = rstests::run_with_config(
        &employees(),
        LogicalOperator::load("employees").alias("e").join(
            LogicalOperator::load("employees").alias("m"),
            eq(col("m.id"), col("e.manager_id")),
        ),
        config,
    )
    .unwrap();
    assert_eq!(2, rows.len());

    let rows = run(&employees(), LogicalOperator::load("employees")).unwrap();
    assert_eq!(3, rows.len());
}
