use tempfile::TempDir;

use super::*;
use crate::parser;

fn setup() -> (TempDir, Db) {
    let temp_dir = tempfile::tempdir().unwrap();
    let db = Db::new(temp_dir.path()).unwrap();
    (temp_dir, db)
}

/// Run a batch of statements, failing the test on the first error
fn run(db: &mut Db, sql: &str) -> Vec<QueryResult> {
    let statements = parser::parse(sql).unwrap_or_else(|e| panic!("parse {:?}: {}", sql, e));
    statements
        .into_iter()
        .map(|s| {
            db.execute(s)
                .unwrap_or_else(|e| panic!("execute {:?}: {}", sql, e))
        })
        .collect()
}

/// Run a single statement, returning its result
fn try_run(db: &mut Db, sql: &str) -> DbResult<QueryResult> {
    let mut statements = parser::parse(sql).map_err(DbError::SqlSyntax)?;
    assert_eq!(statements.len(), 1);
    db.execute(statements.remove(0))
}

fn rows_of(result: &QueryResult) -> &Vec<Vec<String>> {
    match result {
        QueryResult::ResultSet(_, rows) => rows,
        other => panic!("expected a result set, got {:?}", other),
    }
}

#[test]
fn test_insert_and_select_in_order() {
    let (_temp, mut db) = setup();

    run(
        &mut db,
        r#"CREATE TABLE t (a INT, b CHAR(4) NULLABLE);
           INSERT INTO t VALUES (1,"foo"),(2,NULL);"#,
    );
    let results = run(&mut db, "SELECT * FROM t;");

    assert_eq!(
        results[0],
        QueryResult::ResultSet(
            vec!["a".to_string(), "b".to_string()],
            vec![
                vec!["1".to_string(), "foo".to_string()],
                vec!["2".to_string(), "null".to_string()],
            ],
        )
    );
}

#[test]
fn test_index_lookup() {
    let (_temp, mut db) = setup();

    run(
        &mut db,
        r#"CREATE TABLE t (a INT, b CHAR(4) NULLABLE);
           INSERT INTO t VALUES (1,"foo"),(2,NULL);
           CREATE INDEX ix ON t(a);"#,
    );

    let results = run(&mut db, "SELECT * FROM t WHERE a=2;");
    assert_eq!(
        *rows_of(&results[0]),
        vec![vec!["2".to_string(), "null".to_string()]]
    );
}

#[test]
fn test_update_rollback_restores_value() {
    let (_temp, mut db) = setup();

    run(
        &mut db,
        r#"CREATE TABLE t (a INT, b CHAR(4) NULLABLE);
           INSERT INTO t VALUES (1,"foo");
           BEGIN;
           UPDATE t SET b="bar" WHERE a=1;
           ROLLBACK;"#,
    );

    let results = run(&mut db, "SELECT b FROM t WHERE a=1;");
    assert_eq!(*rows_of(&results[0]), vec![vec!["foo".to_string()]]);
}

#[test]
fn test_chars_overflow_leaves_state_unchanged() {
    let (_temp, mut db) = setup();

    run(
        &mut db,
        r#"CREATE TABLE t (a INT, b CHAR(4) NULLABLE);
           INSERT INTO t VALUES (1,"foo");"#,
    );

    let err = try_run(&mut db, r#"INSERT INTO t VALUES (3,"toolong");"#).unwrap_err();
    assert_eq!(err.code(), "SCHEMA_FIELD_MISSING");

    let results = run(&mut db, "SELECT * FROM t;");
    assert_eq!(rows_of(&results[0]).len(), 1);
}

#[test]
fn test_invalid_date_rejected() {
    let (_temp, mut db) = setup();

    run(&mut db, "CREATE TABLE d (x DATE);");

    // "2021-02-29" fails calendar validation, stays CHARS, and then fails
    // the type check against the DATE column
    let err = try_run(&mut db, r#"INSERT INTO d VALUES ("2021-02-29");"#).unwrap_err();
    assert_eq!(err.code(), "SCHEMA_FIELD_TYPE_MISMATCH");

    let results = run(&mut db, "SELECT * FROM d;");
    assert!(rows_of(&results[0]).is_empty());
}

#[test]
fn test_duplicate_index_rejected() {
    let (_temp, mut db) = setup();

    run(
        &mut db,
        "CREATE TABLE t (a INT, b CHAR(4) NULLABLE); CREATE INDEX ix2 ON t(a);",
    );

    let err = try_run(&mut db, "CREATE INDEX ix3 ON t(a);").unwrap_err();
    assert_eq!(err.code(), "SCHEMA_INDEX_EXIST");
}

#[test]
fn test_valid_date_round_trip() {
    let (_temp, mut db) = setup();

    run(
        &mut db,
        r#"CREATE TABLE d (x DATE);
           INSERT INTO d VALUES ("2020-02-29"),("2038-1-31");"#,
    );

    let results = run(&mut db, "SELECT x FROM d ORDER BY x;");
    assert_eq!(
        *rows_of(&results[0]),
        vec![
            vec!["2020-02-29".to_string()],
            vec!["2038-01-31".to_string()]
        ]
    );
}

#[test]
fn test_statement_atomicity_of_multi_row_insert() {
    let (_temp, mut db) = setup();

    run(&mut db, "CREATE TABLE t (a INT, b CHAR(4) NULLABLE);");

    // Second row is illegal; the first row must not survive
    let err = try_run(
        &mut db,
        r#"INSERT INTO t VALUES (1,"ok"),(2,"toolong");"#,
    )
    .unwrap_err();
    assert_eq!(err.code(), "SCHEMA_FIELD_MISSING");

    let results = run(&mut db, "SELECT * FROM t;");
    assert!(rows_of(&results[0]).is_empty());
}

#[test]
fn test_explicit_transaction_keeps_earlier_statements() {
    let (_temp, mut db) = setup();

    run(
        &mut db,
        r#"CREATE TABLE t (a INT, b CHAR(4) NULLABLE);
           BEGIN;
           INSERT INTO t VALUES (1,"a");"#,
    );

    // A failing statement inside the transaction
    let err = try_run(&mut db, r#"INSERT INTO t VALUES (2,"toolong");"#).unwrap_err();
    assert_eq!(err.code(), "SCHEMA_FIELD_MISSING");

    // The earlier insert is still pending and commits fine
    run(&mut db, "COMMIT;");
    let results = run(&mut db, "SELECT * FROM t;");
    assert_eq!(rows_of(&results[0]).len(), 1);
}

#[test]
fn test_delete_and_rollback() {
    let (_temp, mut db) = setup();

    run(
        &mut db,
        r#"CREATE TABLE t (a INT, b CHAR(4) NULLABLE);
           INSERT INTO t VALUES (1,"a"),(2,"b"),(3,"c");
           BEGIN;
           DELETE FROM t WHERE a > 1;"#,
    );

    // Inside the transaction only one row remains visible
    let results = run(&mut db, "SELECT * FROM t;");
    assert_eq!(rows_of(&results[0]).len(), 1);

    run(&mut db, "ROLLBACK;");
    let results = run(&mut db, "SELECT * FROM t;");
    assert_eq!(rows_of(&results[0]).len(), 3);
}

#[test]
fn test_delete_commit_is_durable() {
    let (_temp, mut db) = setup();

    run(
        &mut db,
        r#"CREATE TABLE t (a INT, b CHAR(4) NULLABLE);
           INSERT INTO t VALUES (1,"a"),(2,"b");
           DELETE FROM t WHERE a = 1;"#,
    );

    let results = run(&mut db, "SELECT * FROM t;");
    assert_eq!(
        *rows_of(&results[0]),
        vec![vec!["2".to_string(), "b".to_string()]]
    );
}

#[test]
fn test_where_null_semantics() {
    let (_temp, mut db) = setup();

    run(
        &mut db,
        r#"CREATE TABLE t (a INT, b CHAR(4) NULLABLE);
           INSERT INTO t VALUES (1,"x"),(2,NULL);"#,
    );

    // NULL never equals anything, including NULL
    let results = run(&mut db, "SELECT * FROM t WHERE b = 'x';");
    assert_eq!(rows_of(&results[0]).len(), 1);

    let results = run(&mut db, "SELECT * FROM t WHERE b IS NULL;");
    assert_eq!(rows_of(&results[0]).len(), 1);
    assert_eq!(rows_of(&results[0])[0][0], "2");

    let results = run(&mut db, "SELECT * FROM t WHERE b IS NOT NULL;");
    assert_eq!(rows_of(&results[0]).len(), 1);
    assert_eq!(rows_of(&results[0])[0][0], "1");
}

#[test]
fn test_in_predicate() {
    let (_temp, mut db) = setup();

    run(
        &mut db,
        "CREATE TABLE t (a INT, b CHAR(4) NULLABLE); \
         INSERT INTO t VALUES (1,'a'),(2,'b'),(3,'c'),(4,'d');",
    );

    let results = run(&mut db, "SELECT a FROM t WHERE a IN (2, 4);");
    assert_eq!(
        *rows_of(&results[0]),
        vec![vec!["2".to_string()], vec!["4".to_string()]]
    );
}

#[test]
fn test_projection_variants() {
    let (_temp, mut db) = setup();

    run(
        &mut db,
        "CREATE TABLE t (a INT, b CHAR(4) NULLABLE); INSERT INTO t VALUES (1,'x');",
    );

    let results = run(&mut db, "SELECT b, a FROM t; SELECT t.a FROM t; SELECT t.* FROM t;");

    let QueryResult::ResultSet(headers, rows) = &results[0] else {
        panic!();
    };
    assert_eq!(headers, &vec!["b".to_string(), "a".to_string()]);
    assert_eq!(rows[0], vec!["x".to_string(), "1".to_string()]);

    let QueryResult::ResultSet(headers, _) = &results[1] else {
        panic!();
    };
    assert_eq!(headers, &vec!["t.a".to_string()]);

    let QueryResult::ResultSet(headers, _) = &results[2] else {
        panic!();
    };
    assert_eq!(headers, &vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn test_unknown_column_and_table_errors() {
    let (_temp, mut db) = setup();

    run(&mut db, "CREATE TABLE t (a INT);");

    let err = try_run(&mut db, "SELECT nope FROM t;").unwrap_err();
    assert_eq!(err.code(), "SCHEMA_FIELD_NOT_EXIST");

    let err = try_run(&mut db, "SELECT * FROM missing;").unwrap_err();
    assert_eq!(err.code(), "SCHEMA_TABLE_NAME_ILLEGAL");

    let err = try_run(&mut db, "UPDATE t SET a = 1 WHERE other.a = 1;").unwrap_err();
    assert_eq!(err.code(), "SCHEMA_TABLE_NAME_ILLEGAL");

    let err = try_run(&mut db, "SELECT * FROM;").unwrap_err();
    assert_eq!(err.code(), "SQL_SYNTAX");
}

#[test]
fn test_aggregates() {
    let (_temp, mut db) = setup();

    run(
        &mut db,
        "CREATE TABLE s (name CHAR(8), grade INT, score FLOAT NULLABLE); \
         INSERT INTO s VALUES ('ann',1,90.0),('bob',1,80.0),('cat',2,70.0),('dan',2,NULL);",
    );

    let results = run(&mut db, "SELECT COUNT(*), COUNT(score), AVG(score), MAX(grade), MIN(grade), SUM(grade) FROM s;");
    assert_eq!(
        *rows_of(&results[0]),
        vec![vec![
            "4".to_string(),
            "3".to_string(),
            "80".to_string(),
            "2".to_string(),
            "1".to_string(),
            "6".to_string(),
        ]]
    );
}

#[test]
fn test_group_by_with_order() {
    let (_temp, mut db) = setup();

    run(
        &mut db,
        "CREATE TABLE s (name CHAR(8), grade INT, score FLOAT NULLABLE); \
         INSERT INTO s VALUES ('ann',1,90.0),('bob',1,80.0),('cat',2,70.0),('dan',2,NULL);",
    );

    let results = run(
        &mut db,
        "SELECT grade, COUNT(*) FROM s GROUP BY grade ORDER BY grade DESC;",
    );
    assert_eq!(
        *rows_of(&results[0]),
        vec![
            vec!["2".to_string(), "2".to_string()],
            vec!["1".to_string(), "2".to_string()],
        ]
    );
}

#[test]
fn test_order_by_limit_offset() {
    let (_temp, mut db) = setup();

    run(
        &mut db,
        "CREATE TABLE t (a INT); \
         INSERT INTO t VALUES (3),(1),(4),(1),(5),(9),(2),(6);",
    );

    let results = run(&mut db, "SELECT a FROM t ORDER BY a DESC LIMIT 3 OFFSET 1;");
    assert_eq!(
        *rows_of(&results[0]),
        vec![
            vec!["6".to_string()],
            vec!["5".to_string()],
            vec!["4".to_string()]
        ]
    );
}

#[test]
fn test_show_tables_desc_drop() {
    let (_temp, mut db) = setup();

    run(
        &mut db,
        "CREATE TABLE t (a INT, b CHAR(4) NULLABLE); CREATE TABLE u (x DATE);",
    );

    let results = run(&mut db, "SHOW TABLES;");
    assert_eq!(
        results[0],
        QueryResult::List(vec!["t".to_string(), "u".to_string()])
    );

    let results = run(&mut db, "DESC t;");
    assert_eq!(
        results[0],
        QueryResult::ResultSet(
            vec!["Field".to_string(), "Type".to_string(), "Null".to_string()],
            vec![
                vec!["a".to_string(), "INT".to_string(), "NO".to_string()],
                vec!["b".to_string(), "CHAR(4)".to_string(), "YES".to_string()],
            ],
        )
    );

    run(&mut db, "DROP TABLE u;");
    let results = run(&mut db, "SHOW TABLES;");
    assert_eq!(results[0], QueryResult::List(vec!["t".to_string()]));

    let err = try_run(&mut db, "DROP TABLE u;").unwrap_err();
    assert_eq!(err.code(), "SCHEMA_TABLE_NAME_ILLEGAL");
}

#[test]
fn test_create_duplicate_table_code() {
    let (_temp, mut db) = setup();

    run(&mut db, "CREATE TABLE t (a INT);");
    let err = try_run(&mut db, "CREATE TABLE t (a INT);").unwrap_err();
    assert_eq!(err.code(), "SCHEMA_TABLE_EXIST");
}

#[test]
fn test_update_through_index_maintains_lookup() {
    let (_temp, mut db) = setup();

    run(
        &mut db,
        "CREATE TABLE t (a INT, b CHAR(4) NULLABLE); \
         CREATE INDEX ix ON t(a); \
         INSERT INTO t VALUES (1,'x'),(2,'y'); \
         UPDATE t SET a = 10 WHERE a = 1;",
    );

    let results = run(&mut db, "SELECT b FROM t WHERE a = 10;");
    assert_eq!(*rows_of(&results[0]), vec![vec!["x".to_string()]]);

    let results = run(&mut db, "SELECT b FROM t WHERE a = 1;");
    assert!(rows_of(&results[0]).is_empty());
}

#[test]
fn test_persistence_across_reopen() {
    let temp_dir = tempfile::tempdir().unwrap();

    {
        let mut db = Db::new(temp_dir.path()).unwrap();
        run(
            &mut db,
            "CREATE TABLE t (a INT, b CHAR(8) NULLABLE); \
             CREATE INDEX ix ON t(a); \
             INSERT INTO t VALUES (1,'one'),(2,'two'); \
             SYNC;",
        );
    }

    let mut db = Db::new(temp_dir.path()).unwrap();
    let results = run(&mut db, "SELECT b FROM t WHERE a = 2;");
    assert_eq!(*rows_of(&results[0]), vec![vec!["two".to_string()]]);
}

#[test]
fn test_load_data_infile() {
    let (temp_dir, mut db) = setup();

    run(&mut db, "CREATE TABLE t (a INT, b CHAR(8) NULLABLE, x DATE);");

    let data_path = temp_dir.path().join("rows.csv");
    std::fs::write(
        &data_path,
        "1,alpha,2021-01-01\n2,null,2022-06-15\nbad,beta,2021-01-01\n3,gamma,2021-13-99\n4,delta,2023-03-03\n",
    )
    .unwrap();

    let result = try_run(
        &mut db,
        &format!("LOAD DATA INFILE '{}' INTO TABLE t;", data_path.display()),
    )
    .unwrap();
    // Two malformed rows are rejected, three load
    assert_eq!(result, QueryResult::RowsAffected(3));

    let results = run(&mut db, "SELECT a FROM t ORDER BY a;");
    assert_eq!(
        *rows_of(&results[0]),
        vec![
            vec!["1".to_string()],
            vec!["2".to_string()],
            vec!["4".to_string()]
        ]
    );

    let results = run(&mut db, "SELECT b FROM t WHERE a = 2;");
    assert_eq!(*rows_of(&results[0]), vec![vec!["null".to_string()]]);
}

#[test]
fn test_float_epsilon_in_where() {
    let (_temp, mut db) = setup();

    run(
        &mut db,
        "CREATE TABLE t (v FLOAT); INSERT INTO t VALUES (1.5),(2.5);",
    );

    // Within the 1e-6 tolerance the comparison counts as equal
    let results = run(&mut db, "SELECT v FROM t WHERE v = 1.5;");
    assert_eq!(rows_of(&results[0]).len(), 1);

    let results = run(&mut db, "SELECT v FROM t WHERE v > 2.0;");
    assert_eq!(*rows_of(&results[0]), vec![vec!["2.5".to_string()]]);
}

#[test]
fn test_help_and_exit() {
    let (_temp, mut db) = setup();

    let result = try_run(&mut db, "HELP;").unwrap();
    assert!(matches!(result, QueryResult::Message(_)));

    let result = try_run(&mut db, "EXIT;").unwrap();
    assert_eq!(result, QueryResult::Exit);
}

#[test]
fn test_drop_index_then_full_scan_still_works() {
    let (_temp, mut db) = setup();

    run(
        &mut db,
        "CREATE TABLE t (a INT); \
         CREATE INDEX ix ON t(a); \
         INSERT INTO t VALUES (1),(2),(3); \
         DROP INDEX ix ON t;",
    );

    let results = run(&mut db, "SELECT a FROM t WHERE a = 2;");
    assert_eq!(*rows_of(&results[0]), vec![vec!["2".to_string()]]);
}
