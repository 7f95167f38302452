use quarry_core::expr::{col, eq, func, gt, lit};
use quarry_core::{LogicalOperator, QuarryError, row};
use rstests::{employees, run};

fn managed() -> LogicalOperator {
    LogicalOperator::load("employees").select(eq(col("manager_id"), lit(1234)))
}

#[test]
fn view_matches_inlined_plan() {
    let dataset = employees();
    dataset.create_view("managed", managed()).unwrap();

    let via_view = run(
        &dataset,
        LogicalOperator::load("managed").project([col("name")]),
    )
    .unwrap();
    let inlined = run(&dataset, managed().project([col("name")])).unwrap();

    assert_eq!(inlined, via_view);
    assert_eq!(vec![row!["Sally"], row!["Mark"]], via_view);
}

#[test]
fn view_over_view() {
    let dataset = employees();
    dataset.create_view("managed", managed()).unwrap();
    dataset
        .create_view("big_ids", LogicalOperator::load("managed").select(gt(col("id"), lit(5000))))
        .unwrap();

    let rows = run(&dataset, LogicalOperator::load("big_ids").project([col("name")])).unwrap();
    assert_eq!(vec![row!["Mark"]], rows);
}

#[test]
fn view_referenced_twice() {
    let dataset = employees();
    dataset.create_view("managed", managed()).unwrap();

    let rows = run(
        &dataset,
        LogicalOperator::load("managed")
            .alias("a")
            .join(
                LogicalOperator::load("managed").alias("b"),
                eq(col("a.manager_id"), col("b.manager_id")),
            )
            .project([func("count", [])]),
    )
    .unwrap();
    assert_eq!(vec![row![4]], rows);
}

#[test]
fn view_shadows_relation() {
    let dataset = employees();
    dataset
        .create_view(
            "employees",
            LogicalOperator::load("employees").select(eq(col("name"), lit("Tom"))),
        )
        .unwrap();

    let rows = run(&dataset, LogicalOperator::load("employees").project([col("id")])).unwrap();
    assert_eq!(vec![row![1234]], rows);
}

#[test]
fn shadowing_view_with_fewer_fields() {
    let dataset = employees();
    dataset
        .create_view(
            "employees",
            LogicalOperator::load("employees").project([col("name")]),
        )
        .unwrap();

    let query = dataset.query(LogicalOperator::load("employees")).unwrap();
    assert_eq!(1, query.schema().len());
    let rows = run(&dataset, LogicalOperator::load("employees")).unwrap();
    assert_eq!(vec![row!["Tom"], row!["Sally"], row!["Mark"]], rows);
}

#[test]
fn dropped_view_is_gone() {
    let dataset = employees();
    dataset.create_view("managed", managed()).unwrap();
    assert!(dataset.drop_view("managed"));

    let err = run(&dataset, LogicalOperator::load("managed")).unwrap_err();
    assert!(matches!(err, QuarryError::RelationNotFound(name) if name == "managed"));
}

#[test]
fn view_from_query_keeps_schema() {
    let dataset = employees();
    let query = dataset.query(managed().project([col("id"), col("name")])).unwrap();
    query.create_view("managed_names");

    let view = dataset
        .query(LogicalOperator::load("managed_names"))
        .unwrap();
    assert_eq!(query.schema(), view.schema());
}
