// Copyright 2025 RelCalc Project Authors. Licensed under Apache-2.0.

//! End-to-end tests of the SQL front end through the `Database` facade.

use relcalc::catalog::ColumnCatalog;
use relcalc::types::{DataType, DataValue, Row};
use relcalc::Database;

fn database() -> Database {
    let db = Database::new();
    db.create_table(
        "emp",
        vec![
            ColumnCatalog::new("id", DataType::Number),
            ColumnCatalog::new("name", DataType::String),
            ColumnCatalog::new("dept", DataType::String),
            ColumnCatalog::new("salary", DataType::Number),
        ],
        vec![
            vec![1.into(), "ann".into(), "eng".into(), 120.into()],
            vec![2.into(), "bob".into(), "eng".into(), 100.into()],
            vec![3.into(), "cho".into(), "ops".into(), 90.into()],
            vec![4.into(), "dee".into(), "sales".into(), 80.into()],
        ],
    )
    .unwrap();
    db.create_table(
        "dept",
        vec![
            ColumnCatalog::new("dept", DataType::String),
            ColumnCatalog::new("city", DataType::String),
        ],
        vec![
            vec!["eng".into(), "graz".into()],
            vec!["ops".into(), "wien".into()],
        ],
    )
    .unwrap();
    db
}

fn num(n: i32) -> DataValue {
    n.into()
}

#[test]
fn projection_and_filter() {
    let db = database();
    let chunk = db
        .run("SELECT DISTINCT name FROM emp WHERE salary >= 100")
        .unwrap();
    assert_eq!(
        chunk.sorted_rows(),
        vec![vec!["ann".into()], vec!["bob".into()]]
    );
}

#[test]
fn natural_join_and_order() {
    let db = database();
    let chunk = db
        .run("SELECT DISTINCT name, city FROM emp NATURAL JOIN dept ORDER BY name DESC")
        .unwrap();
    assert_eq!(
        chunk.rows().to_vec(),
        vec![
            vec!["cho".into(), "wien".into()],
            vec!["bob".into(), "graz".into()],
            vec!["ann".into(), "graz".into()],
        ]
    );
}

#[test]
fn left_outer_join_keeps_unmatched() {
    let db = database();
    let chunk = db
        .run("SELECT DISTINCT name, city FROM emp LEFT JOIN dept ON emp.dept = dept.dept")
        .unwrap();
    assert!(chunk
        .rows()
        .iter()
        .any(|row: &Row| row == &vec!["dee".into(), DataValue::Null]));
    assert_eq!(chunk.len(), 4);
}

#[test]
fn group_by_having_order() {
    let db = database();
    let chunk = db
        .run(
            "SELECT DISTINCT dept, count(*), sum(salary) FROM emp \
             GROUP BY dept HAVING count(*) > 1",
        )
        .unwrap();
    assert_eq!(
        chunk.rows().to_vec(),
        vec![vec!["eng".into(), num(2), num(220)]]
    );
}

#[test]
fn set_operation() {
    let db = database();
    let chunk = db
        .run(
            "SELECT DISTINCT dept FROM emp EXCEPT SELECT DISTINCT dept FROM dept",
        )
        .unwrap();
    assert_eq!(chunk.rows().to_vec(), vec![vec!["sales".into()]]);
}

#[test]
fn limit_offset() {
    let db = database();
    let chunk = db
        .run("SELECT DISTINCT id FROM emp ORDER BY id LIMIT 2 OFFSET 1")
        .unwrap();
    assert_eq!(chunk.rows().to_vec(), vec![vec![num(2)], vec![num(3)]]);
}

#[test]
fn missing_distinct_warns_but_translates() {
    let db = database();
    let plan = db.translate_sql("SELECT name FROM emp").unwrap();
    let warnings = plan.collect_warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("DISTINCT"));
}

#[test]
fn unknown_table_fails() {
    let db = database();
    assert!(db.run("SELECT DISTINCT a FROM nope").is_err());
}

#[test]
fn subquery_in_from() {
    let db = database();
    let chunk = db
        .run(
            "SELECT DISTINCT name FROM (SELECT DISTINCT name, salary FROM emp) AS t \
             WHERE salary > 110",
        )
        .unwrap();
    assert_eq!(chunk.rows().to_vec(), vec![vec!["ann".into()]]);
}
