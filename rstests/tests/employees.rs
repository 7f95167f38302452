use quarry_core::expr::{col, eq, func, null};
use quarry_core::{LogicalOperator, Value, row};
use rstests::{employees, run};

#[test]
fn project_single_field() {
    let rows = run(
        &employees(),
        LogicalOperator::load("employees").project([col("name")]),
    )
    .unwrap();
    assert_eq!(vec![row!["Tom"], row!["Sally"], row!["Mark"]], rows);
}

#[test]
fn select_null_manager() {
    let rows = run(
        &employees(),
        LogicalOperator::load("employees").select(eq(col("manager_id"), null())),
    )
    .unwrap();
    assert_eq!(vec![row![1234, "Tom", Value::Null]], rows);
}

#[test]
fn count_per_manager() {
    let rows = run(
        &employees(),
        LogicalOperator::load("employees")
            .project([col("manager_id"), func("count", [])])
            .group_by([col("manager_id")]),
    )
    .unwrap();
    assert_eq!(vec![row![Value::Null, 1], row![1234, 2]], rows);
}

#[test]
fn self_join_on_manager() {
    let rows = run(
        &employees(),
        LogicalOperator::load("employees").alias("e").join(
            LogicalOperator::load("employees").alias("m"),
            eq(col("m.id"), col("e.manager_id")),
        ),
    )
    .unwrap();
    assert_eq!(
        vec![
            row![4567, "Sally", 1234, 1234, "Tom", Value::Null],
            row![8901, "Mark", 1234, 1234, "Tom", Value::Null],
        ],
        rows
    );
}

#[test]
fn slice_middle_row() {
    let rows = run(
        &employees(),
        LogicalOperator::load("employees").slice(Some(1), Some(2)),
    )
    .unwrap();
    assert_eq!(vec![row![4567, "Sally", 1234]], rows);
}

#[test]
fn self_join_schema_is_qualified() {
    let query = employees()
        .query(
            LogicalOperator::load("employees").alias("e").join(
                LogicalOperator::load("employees").alias("m"),
                eq(col("m.id"), col("e.manager_id")),
            ),
        )
        .unwrap();
    let paths: Vec<_> = query.schema().fields().iter().map(|f| f.path()).collect();
    assert_eq!(
        vec!["e.id", "e.name", "e.manager_id", "m.id", "m.name", "m.manager_id"],
        paths
    );
}
