use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use super::*;
use crate::catalog::ColumnSpec;
use crate::parser::ast::{ColumnRef, Literal};
use crate::record::AttrType;

fn columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec {
            name: "id".to_string(),
            attr_type: AttrType::Int,
            nullable: false,
        },
        ColumnSpec {
            name: "name".to_string(),
            attr_type: AttrType::Chars(4),
            nullable: true,
        },
        ColumnSpec {
            name: "score".to_string(),
            attr_type: AttrType::Float,
            nullable: true,
        },
    ]
}

fn setup() -> (TempDir, Arc<Mutex<BufferManager>>, Table) {
    let temp_dir = tempfile::tempdir().unwrap();
    let bm = Arc::new(Mutex::new(BufferManager::new()));
    let table = Table::create(Arc::clone(&bm), temp_dir.path(), "t", &columns()).unwrap();
    (temp_dir, bm, table)
}

fn row(id: i32, name: Option<&str>, score: f32) -> Vec<Value> {
    vec![
        Value::Int(id),
        name.map(|s| Value::Chars(s.to_string())).unwrap_or(Value::Null),
        Value::Float(score),
    ]
}

fn eq_condition(column: &str, value: Literal) -> Condition {
    Condition::Compare(
        Operand::Column(ColumnRef::bare(column)),
        CompOp::Eq,
        Operand::Literal(value),
    )
}

fn visible_rows(table: &mut Table, trx: Option<&Trx>) -> Vec<Vec<Value>> {
    let mut rows = Vec::new();
    let mut values = Vec::new();
    table
        .scan_record(trx, None, None, |record| {
            values.push(record.data.clone());
            Ok(())
        })
        .unwrap();
    for data in values {
        rows.push(table.read_values(&data));
    }
    rows
}

#[test]
fn test_create_duplicate_table() {
    let (temp_dir, bm, _table) = setup();
    let result = Table::create(bm, temp_dir.path(), "t", &columns());
    assert!(matches!(result, Err(TableError::SchemaTableExist(_))));
}

#[test]
fn test_insert_and_read_back() {
    let (_temp, _bm, mut table) = setup();
    let mut trx = Trx::new(1);

    table.insert_record(&mut trx, &row(1, Some("foo"), 1.5)).unwrap();
    table.insert_record(&mut trx, &row(2, None, 2.5)).unwrap();

    let rows = visible_rows(&mut table, Some(&trx));
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0], Value::Int(1));
    assert_eq!(rows[0][1], Value::Chars("foo".to_string()));
    assert_eq!(rows[1][1], Value::Null);
}

#[test]
fn test_insert_legality_checks() {
    let (_temp, _bm, mut table) = setup();
    let mut trx = Trx::new(1);

    // Arity
    let result = table.insert_record(&mut trx, &[Value::Int(1)]);
    assert!(matches!(result, Err(TableError::SchemaFieldMissing(_))));

    // Type mismatch
    let result = table.insert_record(
        &mut trx,
        &[
            Value::Chars("x".into()),
            Value::Chars("y".into()),
            Value::Float(0.0),
        ],
    );
    assert!(matches!(result, Err(TableError::SchemaFieldTypeMismatch(_))));

    // CHARS overflow reports the field-missing code
    let result = table.insert_record(&mut trx, &row(1, Some("toolong"), 0.0));
    assert!(matches!(result, Err(TableError::SchemaFieldMissing(_))));

    // NULL into a non-nullable column
    let result = table.insert_record(
        &mut trx,
        &[Value::Null, Value::Null, Value::Null],
    );
    assert!(matches!(result, Err(TableError::SchemaFieldNameIllegal(_))));

    // Nothing stuck around
    assert!(visible_rows(&mut table, Some(&trx)).is_empty());
}

#[test]
fn test_uncommitted_insert_invisible_to_others() {
    let (_temp, _bm, mut table) = setup();
    let mut trx1 = Trx::new(1);

    table.insert_record(&mut trx1, &row(1, Some("a"), 0.0)).unwrap();

    // Own writes are visible
    assert_eq!(visible_rows(&mut table, Some(&trx1)).len(), 1);
    // Another transaction sees nothing
    let trx2 = Trx::new(2);
    assert_eq!(visible_rows(&mut table, Some(&trx2)).len(), 0);
    // A bare scan sees nothing either
    assert_eq!(visible_rows(&mut table, None).len(), 0);
}

fn commit_into(trx: &mut Trx, table: Table) -> Table {
    let mut tables = HashMap::from([("t".to_string(), table)]);
    trx.commit(&mut tables).unwrap();
    tables.remove("t").unwrap()
}

fn rollback_into(trx: &mut Trx, table: Table) -> Table {
    let mut tables = HashMap::from([("t".to_string(), table)]);
    trx.rollback(&mut tables).unwrap();
    tables.remove("t").unwrap()
}

#[test]
fn test_commit_makes_insert_visible() {
    let (_temp, _bm, mut table) = setup();
    let mut trx1 = Trx::new(1);

    table.insert_record(&mut trx1, &row(1, Some("a"), 0.0)).unwrap();
    let mut table = commit_into(&mut trx1, table);

    let trx2 = Trx::new(2);
    assert_eq!(visible_rows(&mut table, Some(&trx2)).len(), 1);
    assert_eq!(visible_rows(&mut table, None).len(), 1);
}

#[test]
fn test_rollback_insert_removes_record() {
    let (_temp, _bm, mut table) = setup();
    let mut trx = Trx::new(1);

    table.insert_record(&mut trx, &row(1, Some("a"), 0.0)).unwrap();
    table.insert_record(&mut trx, &row(2, Some("b"), 0.0)).unwrap();
    let mut table = rollback_into(&mut trx, table);

    assert_eq!(visible_rows(&mut table, None).len(), 0);
    // Heap is really empty, not just invisible
    let mut count = 0;
    table
        .scan_record(None, None, None, |_| {
            count += 1;
            Ok(())
        })
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn test_delete_visibility_and_commit() {
    let (_temp, _bm, mut table) = setup();

    let mut trx1 = Trx::new(1);
    table.insert_record(&mut trx1, &row(1, Some("a"), 0.0)).unwrap();
    table.insert_record(&mut trx1, &row(2, Some("b"), 0.0)).unwrap();
    let mut table = commit_into(&mut trx1, table);

    let mut trx2 = Trx::new(2);
    let deleted = table
        .delete_record(&mut trx2, &[eq_condition("id", Literal::Int(1))])
        .unwrap();
    assert_eq!(deleted, 1);

    // Deleted row is invisible to the deleting transaction pre-commit
    assert_eq!(visible_rows(&mut table, Some(&trx2)).len(), 1);

    let mut table = commit_into(&mut trx2, table);
    let trx3 = Trx::new(3);
    assert_eq!(visible_rows(&mut table, Some(&trx3)).len(), 1);
}

#[test]
fn test_delete_rollback_restores_visibility() {
    let (_temp, _bm, mut table) = setup();

    let mut trx1 = Trx::new(1);
    table.insert_record(&mut trx1, &row(1, Some("a"), 0.0)).unwrap();
    let mut table = commit_into(&mut trx1, table);

    let mut trx2 = Trx::new(2);
    table
        .delete_record(&mut trx2, &[eq_condition("id", Literal::Int(1))])
        .unwrap();
    let mut table = rollback_into(&mut trx2, table);

    assert_eq!(visible_rows(&mut table, None).len(), 1);
}

#[test]
fn test_update_and_rollback() {
    let (_temp, _bm, mut table) = setup();

    let mut trx1 = Trx::new(1);
    table.insert_record(&mut trx1, &row(1, Some("foo"), 0.0)).unwrap();
    let mut table = commit_into(&mut trx1, table);

    let mut trx2 = Trx::new(2);
    let updated = table
        .update_record(
            &mut trx2,
            "name",
            &Value::Chars("bar".to_string()),
            &[eq_condition("id", Literal::Int(1))],
        )
        .unwrap();
    assert_eq!(updated, 1);

    // The updating transaction sees the new value
    let rows = visible_rows(&mut table, Some(&trx2));
    assert_eq!(rows[0][1], Value::Chars("bar".to_string()));

    let mut table = rollback_into(&mut trx2, table);
    let rows = visible_rows(&mut table, None);
    assert_eq!(rows[0][1], Value::Chars("foo".to_string()));
}

#[test]
fn test_update_commit_persists() {
    let (_temp, _bm, mut table) = setup();

    let mut trx1 = Trx::new(1);
    table.insert_record(&mut trx1, &row(1, Some("foo"), 0.0)).unwrap();
    let mut table = commit_into(&mut trx1, table);

    let mut trx2 = Trx::new(2);
    table
        .update_record(
            &mut trx2,
            "score",
            &Value::Float(9.5),
            &[eq_condition("id", Literal::Int(1))],
        )
        .unwrap();
    let mut table = commit_into(&mut trx2, table);

    let rows = visible_rows(&mut table, None);
    assert_eq!(rows[0][2], Value::Float(9.5));
}

#[test]
fn test_update_rejects_foreign_table_qualifier() {
    let (_temp, _bm, mut table) = setup();
    let mut trx = Trx::new(1);

    let condition = Condition::Compare(
        Operand::Column(ColumnRef {
            table: Some("other".to_string()),
            column: "id".to_string(),
        }),
        CompOp::Eq,
        Operand::Literal(Literal::Int(1)),
    );

    let result = table.update_record(&mut trx, "name", &Value::Null, &[condition.clone()]);
    assert!(matches!(result, Err(TableError::SchemaTableNameIllegal(_))));

    let result = table.delete_record(&mut trx, &[condition]);
    assert!(matches!(result, Err(TableError::SchemaTableNameIllegal(_))));
}

#[test]
fn test_update_unknown_column() {
    let (_temp, _bm, mut table) = setup();
    let mut trx = Trx::new(1);

    let result = table.update_record(&mut trx, "nope", &Value::Int(1), &[]);
    assert!(matches!(result, Err(TableError::SchemaFieldNotExist(_))));
}

#[test]
fn test_create_index_and_lookup() {
    let (_temp, _bm, mut table) = setup();

    let mut trx1 = Trx::new(1);
    for i in 0..20 {
        table
            .insert_record(&mut trx1, &row(i, Some("x"), i as f32))
            .unwrap();
    }
    let mut table = commit_into(&mut trx1, table);

    let trx2 = Trx::new(2);
    table.create_index(&trx2, "ix", "id").unwrap();

    let (filter, _) = table
        .build_filter(&[eq_condition("id", Literal::Int(7))])
        .unwrap();
    let mut found = Vec::new();
    table
        .scan_record(Some(&trx2), filter.as_ref(), None, |record| {
            found.push(record.rid);
            Ok(())
        })
        .unwrap();
    assert_eq!(found.len(), 1);
}

#[test]
fn test_create_index_duplicate_name_or_column() {
    let (_temp, _bm, mut table) = setup();
    let trx = Trx::new(1);

    table.create_index(&trx, "ix", "id").unwrap();

    let result = table.create_index(&trx, "ix", "score");
    assert!(matches!(result, Err(TableError::SchemaIndexExist(_))));

    // Same column under a different name is rejected too
    let result = table.create_index(&trx, "ix2", "id");
    assert!(matches!(result, Err(TableError::SchemaIndexExist(_))));
}

#[test]
fn test_create_index_unknown_column() {
    let (_temp, _bm, mut table) = setup();
    let trx = Trx::new(1);

    let result = table.create_index(&trx, "ix", "nope");
    assert!(matches!(result, Err(TableError::SchemaFieldMissing(_))));
}

#[test]
fn test_index_scan_equals_heap_scan() {
    let (_temp, _bm, mut table) = setup();

    let mut trx1 = Trx::new(1);
    for i in 0..50 {
        table
            .insert_record(&mut trx1, &row(i % 7, Some("x"), i as f32))
            .unwrap();
    }
    let mut table = commit_into(&mut trx1, table);

    let mut trx2 = Trx::new(2);
    table
        .delete_record(&mut trx2, &[eq_condition("id", Literal::Int(3))])
        .unwrap();
    let mut table = commit_into(&mut trx2, table);

    // Heap-only RID set before the index exists
    let mut heap_rids = Vec::new();
    table
        .scan_record(None, None, None, |record| {
            heap_rids.push(record.rid);
            Ok(())
        })
        .unwrap();

    let trx3 = Trx::new(3);
    table.create_index(&trx3, "ix", "id").unwrap();

    // Universal predicate through the index must reach the same rows
    let (filter, _) = table
        .build_filter(&[Condition::Compare(
            Operand::Column(ColumnRef::bare("id")),
            CompOp::Ge,
            Operand::Literal(Literal::Int(0)),
        )])
        .unwrap();
    let mut index_rids = Vec::new();
    table
        .scan_record(None, filter.as_ref(), None, |record| {
            index_rids.push(record.rid);
            Ok(())
        })
        .unwrap();

    let mut heap_sorted = heap_rids.clone();
    heap_sorted.sort();
    let mut index_sorted = index_rids.clone();
    index_sorted.sort();
    assert_eq!(heap_sorted, index_sorted);
}

#[test]
fn test_insert_then_delete_commit_is_identity() {
    let (_temp, _bm, mut table) = setup();

    let mut trx = Trx::new(1);
    table.insert_record(&mut trx, &row(1, Some("a"), 0.0)).unwrap();
    table.delete_record(&mut trx, &[]).unwrap();
    let mut table = commit_into(&mut trx, table);

    let mut count = 0;
    table
        .scan_record(None, None, None, |_| {
            count += 1;
            Ok(())
        })
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn test_scan_limit() {
    let (_temp, _bm, mut table) = setup();

    let mut trx = Trx::new(1);
    for i in 0..10 {
        table.insert_record(&mut trx, &row(i, None, 0.0)).unwrap();
    }
    let mut table = commit_into(&mut trx, table);

    let mut count = 0;
    table
        .scan_record(None, None, Some(3), |_| {
            count += 1;
            Ok(())
        })
        .unwrap();
    assert_eq!(count, 3);
}

#[test]
fn test_reopen_table_with_index() {
    let temp_dir = tempfile::tempdir().unwrap();
    let dir: &Path = temp_dir.path();

    {
        let bm = Arc::new(Mutex::new(BufferManager::new()));
        let mut table = Table::create(Arc::clone(&bm), dir, "t", &columns()).unwrap();

        let mut trx = Trx::new(1);
        for i in 0..10 {
            table
                .insert_record(&mut trx, &row(i, Some("x"), 0.5))
                .unwrap();
        }
        let mut table = commit_into(&mut trx, table);
        table.create_index(&Trx::new(2), "ix", "id").unwrap();
        table.sync().unwrap();
        bm.lock().unwrap().flush_all().unwrap();
    }

    let bm = Arc::new(Mutex::new(BufferManager::new()));
    let mut table = Table::open(bm, dir, "t").unwrap();
    assert_eq!(table.meta().indexes.len(), 1);

    let rows = visible_rows(&mut table, None);
    assert_eq!(rows.len(), 10);

    let (filter, _) = table
        .build_filter(&[eq_condition("id", Literal::Int(4))])
        .unwrap();
    let mut found = 0;
    table
        .scan_record(None, filter.as_ref(), None, |_| {
            found += 1;
            Ok(())
        })
        .unwrap();
    assert_eq!(found, 1);
}

#[test]
fn test_drop_index() {
    let (temp_dir, _bm, mut table) = setup();

    table.create_index(&Trx::new(1), "ix", "id").unwrap();
    assert!(index_data_file(temp_dir.path(), "t", "ix").exists());

    table.drop_index("ix").unwrap();
    assert!(table.meta().indexes.is_empty());
    assert!(!index_data_file(temp_dir.path(), "t", "ix").exists());

    assert!(table.drop_index("ix").is_err());
}

#[test]
fn test_destroy_removes_files() {
    let (temp_dir, _bm, mut table) = setup();
    table.create_index(&Trx::new(1), "ix", "id").unwrap();

    table.destroy().unwrap();
    assert!(!table_meta_file(temp_dir.path(), "t").exists());
    assert!(!table_data_file(temp_dir.path(), "t").exists());
    assert!(!index_data_file(temp_dir.path(), "t", "ix").exists());
}

#[test]
fn test_in_check() {
    let (_temp, _bm, mut table) = setup();

    let mut trx = Trx::new(1);
    for i in 0..5 {
        table.insert_record(&mut trx, &row(i, None, 0.0)).unwrap();
    }
    let mut table = commit_into(&mut trx, table);

    let conditions = [Condition::In(
        ColumnRef::bare("id"),
        vec![Literal::Int(1), Literal::Int(3)],
    )];
    let (filter, in_checks) = table.build_filter(&conditions).unwrap();
    assert!(filter.is_none());

    let mut matched = 0;
    let mut all = Vec::new();
    table
        .scan_record(None, None, None, |record| {
            all.push(record.data.clone());
            Ok(())
        })
        .unwrap();
    for data in &all {
        if table.record_matches_in(data, &in_checks) {
            matched += 1;
        }
    }
    assert_eq!(matched, 2);
}
