//! Statement execution: AST in, table operations out.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::ColumnSpec;
use crate::file::BufferManager;
use crate::parser::ast::{
    ColumnRef, Literal, SelectStmt, Selector, Selectors, Statement, is_null_literal,
};
use crate::record::{AttrType, Value, format_float, parse_date};
use crate::table::{Table, TableError};
use crate::trx::Trx;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("SQL syntax error: {0}")]
    SqlSyntax(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No more records")]
    RecordEof,

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Data file error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{0}")]
    Generic(String),
}

impl DbError {
    /// The one-line result code reported to the client
    pub fn code(&self) -> &'static str {
        match self {
            DbError::TableNotFound(_) => "SCHEMA_TABLE_NAME_ILLEGAL",
            DbError::SqlSyntax(_) => "SQL_SYNTAX",
            DbError::InvalidArgument(_) => "INVALID_ARGUMENT",
            DbError::RecordEof => "RECORD_EOF",
            DbError::Io(_) | DbError::Csv(_) => "IOERR",
            DbError::Generic(_) => "GENERIC_ERROR",
            DbError::Table(e) => match e {
                TableError::InvalidArgument(_) => "INVALID_ARGUMENT",
                TableError::SchemaTableExist(_) => "SCHEMA_TABLE_EXIST",
                TableError::SchemaTableNameIllegal(_) => "SCHEMA_TABLE_NAME_ILLEGAL",
                TableError::SchemaIndexExist(_) => "SCHEMA_INDEX_EXIST",
                TableError::SchemaFieldMissing(_) => "SCHEMA_FIELD_MISSING",
                TableError::SchemaFieldNameIllegal(_) => "SCHEMA_FIELD_NAME_ILLEGAL",
                TableError::SchemaFieldTypeMismatch(_) => "SCHEMA_FIELD_TYPE_MISMATCH",
                TableError::SchemaFieldNotExist(_) => "SCHEMA_FIELD_NOT_EXIST",
                TableError::RecordInvalidKey => "RECORD_INVALID_KEY",
                TableError::Io(_) | TableError::File(_) => "IOERR",
                TableError::Catalog(_) | TableError::Record(_) | TableError::Index(_) => "IOERR",
                TableError::Generic(_) => "GENERIC_ERROR",
            },
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Empty,
    RowsAffected(usize),
    ResultSet(Vec<String>, Vec<Vec<String>>),
    List(Vec<String>),
    Message(String),
    Exit,
}

const HELP_TEXT: &str = "\
statements (terminated by ';'):
  CREATE TABLE t (col INT|FLOAT|DATE|CHAR(n) [NULLABLE], ...)
  DROP TABLE t              SHOW TABLES             DESC t
  CREATE INDEX ix ON t(col) DROP INDEX ix ON t
  INSERT INTO t VALUES (...), (...)
  SELECT cols|*|COUNT/AVG/MAX/MIN/SUM FROM t [WHERE ...]
         [GROUP BY col] [ORDER BY col [ASC|DESC]] [LIMIT n] [OFFSET n]
  UPDATE t SET col = value [WHERE ...]
  DELETE FROM t [WHERE ...]
  BEGIN; COMMIT; ROLLBACK;  SYNC;
  LOAD DATA INFILE 'file' INTO TABLE t [FIELDS TERMINATED BY 'x']
  HELP; EXIT;";

/// One database instance: a directory of tables, a shared buffer pool and
/// the current transaction. Statements run one at a time; outside an
/// explicit BEGIN each statement commits (or rolls back) on its own.
pub struct Db {
    base_dir: PathBuf,
    buffer_manager: Arc<Mutex<BufferManager>>,
    tables: HashMap<String, Table>,
    next_trx_id: u32,
    current_trx: Trx,
    in_explicit_trx: bool,
}

impl Db {
    /// Open (creating if needed) the database directory and every table
    /// whose metadata file lives there.
    pub fn new<P: AsRef<Path>>(base_dir: P) -> DbResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;

        let buffer_manager = Arc::new(Mutex::new(BufferManager::new()));

        let mut tables = HashMap::new();
        for entry in fs::read_dir(&base_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_none_or(|e| e != "table") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let table = Table::open(Arc::clone(&buffer_manager), &base_dir, name)?;
            tables.insert(name.to_string(), table);
        }

        info!(dir = %base_dir.display(), tables = tables.len(), "database opened");

        Ok(Self {
            base_dir,
            buffer_manager,
            tables,
            next_trx_id: 2,
            current_trx: Trx::new(1),
            in_explicit_trx: false,
        })
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    fn renew_trx(&mut self) {
        self.current_trx = Trx::new(self.next_trx_id);
        self.next_trx_id += 1;
    }

    fn commit_current(&mut self) -> DbResult<()> {
        self.current_trx.commit(&mut self.tables)?;
        self.renew_trx();
        self.in_explicit_trx = false;
        Ok(())
    }

    fn rollback_current(&mut self) -> DbResult<()> {
        let result = self.current_trx.rollback(&mut self.tables);
        self.renew_trx();
        self.in_explicit_trx = false;
        result?;
        Ok(())
    }

    /// Execute one statement. Outside an explicit transaction the
    /// statement commits on success; on failure its own effects are
    /// unwound while earlier statements of an explicit transaction stay
    /// logged for a later COMMIT/ROLLBACK.
    pub fn execute(&mut self, statement: Statement) -> DbResult<QueryResult> {
        match statement {
            Statement::Begin => {
                // Entering a transaction commits any pending autocommit work
                if !self.in_explicit_trx {
                    self.commit_current()?;
                }
                self.in_explicit_trx = true;
                Ok(QueryResult::Empty)
            }
            Statement::Commit => {
                self.commit_current()?;
                Ok(QueryResult::Empty)
            }
            Statement::Rollback => {
                self.rollback_current()?;
                Ok(QueryResult::Empty)
            }
            Statement::Help => Ok(QueryResult::Message(HELP_TEXT.to_string())),
            Statement::Exit => Ok(QueryResult::Exit),
            other => {
                let mark = self.current_trx.op_count();
                match self.dispatch(other) {
                    Ok(result) => {
                        if !self.in_explicit_trx {
                            self.commit_current()?;
                        }
                        Ok(result)
                    }
                    Err(e) => {
                        // Per-statement atomicity: unwind only this
                        // statement's effects
                        let _ = self.current_trx.rollback_to(mark, &mut self.tables);
                        if !self.in_explicit_trx {
                            self.renew_trx();
                        }
                        Err(e)
                    }
                }
            }
        }
    }

    fn table_mut(&mut self, name: &str) -> DbResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    fn dispatch(&mut self, statement: Statement) -> DbResult<QueryResult> {
        match statement {
            Statement::CreateTable(name, columns) => {
                if self.tables.contains_key(&name) {
                    return Err(TableError::SchemaTableExist(name).into());
                }

                let mut seen = std::collections::HashSet::new();
                for col in &columns {
                    if !seen.insert(col.name.as_str()) {
                        return Err(DbError::InvalidArgument(format!(
                            "duplicate column {}",
                            col.name
                        )));
                    }
                }

                let specs: Vec<ColumnSpec> = columns
                    .iter()
                    .map(|c| ColumnSpec {
                        name: c.name.clone(),
                        attr_type: c.attr_type,
                        nullable: c.nullable,
                    })
                    .collect();

                let table = Table::create(
                    Arc::clone(&self.buffer_manager),
                    &self.base_dir,
                    &name,
                    &specs,
                )?;
                self.tables.insert(name, table);
                Ok(QueryResult::Empty)
            }
            Statement::DropTable(name) => {
                let table = self
                    .tables
                    .remove(&name)
                    .ok_or_else(|| DbError::TableNotFound(name.clone()))?;
                table.destroy()?;
                Ok(QueryResult::Empty)
            }
            Statement::ShowTables => Ok(QueryResult::List(self.table_names())),
            Statement::Desc(name) => {
                let table = self.table_mut(&name)?;
                let headers = vec!["Field".to_string(), "Type".to_string(), "Null".to_string()];
                let rows = table
                    .meta()
                    .user_fields()
                    .iter()
                    .map(|f| {
                        vec![
                            f.name.clone(),
                            f.attr_type.to_string(),
                            (if f.nullable { "YES" } else { "NO" }).to_string(),
                        ]
                    })
                    .collect();
                Ok(QueryResult::ResultSet(headers, rows))
            }
            Statement::CreateIndex {
                index,
                table,
                column,
            } => {
                let trx = &self.current_trx;
                let table = self
                    .tables
                    .get_mut(&table)
                    .ok_or_else(|| DbError::TableNotFound(table.clone()))?;
                table.create_index(trx, &index, &column)?;
                Ok(QueryResult::Empty)
            }
            Statement::DropIndex { index, table } => {
                self.table_mut(&table)?.drop_index(&index)?;
                Ok(QueryResult::Empty)
            }
            Statement::Insert(name, rows) => {
                let table = self
                    .tables
                    .get_mut(&name)
                    .ok_or_else(|| DbError::TableNotFound(name.clone()))?;

                let mut inserted = 0;
                for row in rows {
                    let values: Vec<Value> = row.iter().map(Literal::to_value).collect();
                    table.insert_record(&mut self.current_trx, &values)?;
                    inserted += 1;
                }
                Ok(QueryResult::RowsAffected(inserted))
            }
            Statement::Update {
                table,
                column,
                value,
                conditions,
            } => {
                let table = self
                    .tables
                    .get_mut(&table)
                    .ok_or_else(|| DbError::TableNotFound(table.clone()))?;
                let updated = table.update_record(
                    &mut self.current_trx,
                    &column,
                    &value.to_value(),
                    &conditions,
                )?;
                Ok(QueryResult::RowsAffected(updated))
            }
            Statement::Delete { table, conditions } => {
                let table = self
                    .tables
                    .get_mut(&table)
                    .ok_or_else(|| DbError::TableNotFound(table.clone()))?;
                let deleted = table.delete_record(&mut self.current_trx, &conditions)?;
                Ok(QueryResult::RowsAffected(deleted))
            }
            Statement::Select(select) => self.execute_select(select),
            Statement::Sync => {
                for table in self.tables.values_mut() {
                    table.sync()?;
                }
                self.buffer_manager
                    .lock()
                    .unwrap()
                    .flush_all()
                    .map_err(TableError::from)?;
                Ok(QueryResult::Empty)
            }
            Statement::LoadData {
                path,
                table,
                delimiter,
            } => self.load_data_infile(&path, &table, delimiter),
            Statement::Begin
            | Statement::Commit
            | Statement::Rollback
            | Statement::Help
            | Statement::Exit => unreachable!("handled by execute"),
        }
    }

    // ========== SELECT ==========

    fn execute_select(&mut self, select: SelectStmt) -> DbResult<QueryResult> {
        let trx = &self.current_trx;
        let table = self
            .tables
            .get_mut(&select.table)
            .ok_or_else(|| DbError::TableNotFound(select.table.clone()))?;

        // Resolve and validate every referenced column
        validate_column_refs(table, &select)?;

        let (filter, in_checks) = table.build_filter(&select.conditions)?;

        let mut raw: Vec<Vec<u8>> = Vec::new();
        table.scan_record(Some(trx), filter.as_ref(), None, |record| {
            raw.push(record.data.clone());
            Ok(())
        })?;

        let mut rows: Vec<Vec<Value>> = Vec::new();
        for data in &raw {
            if !table.record_matches_in(data, &in_checks) {
                continue;
            }
            rows.push(table.read_values(data));
        }

        let has_aggregate = match &select.selectors {
            Selectors::All => false,
            Selectors::List(list) => list.iter().any(Selector::is_aggregate),
        };

        if has_aggregate || select.group_by.is_some() {
            aggregate_select(table, &select, rows)
        } else {
            plain_select(table, &select, rows)
        }
    }

    // ========== LOAD DATA INFILE ==========

    /// Bulk-load a delimited file through the regular insert path. Rows
    /// failing parsing or legality checks are skipped with a warning.
    fn load_data_infile(&mut self, path: &str, name: &str, delimiter: u8) -> DbResult<QueryResult> {
        let table = self
            .tables
            .get_mut(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))?;

        let types: Vec<AttrType> = table
            .meta()
            .user_fields()
            .iter()
            .map(|f| f.attr_type)
            .collect();

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        let mut inserted = 0;
        let mut skipped = 0;
        for (line, record) in reader.records().enumerate() {
            let record = record?;

            let values = match parse_data_row(&record, &types) {
                Some(values) => values,
                None => {
                    warn!(file = path, line = line + 1, "skipping malformed row");
                    skipped += 1;
                    continue;
                }
            };

            match table.insert_record(&mut self.current_trx, &values) {
                Ok(_) => inserted += 1,
                Err(e) => {
                    warn!(file = path, line = line + 1, error = %e, "skipping illegal row");
                    skipped += 1;
                }
            }
        }

        if skipped > 0 {
            info!(file = path, inserted, skipped, "load data finished");
        }
        Ok(QueryResult::RowsAffected(inserted))
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        // Heap mutations live in buffer pages and are flushed by the pool;
        // index nodes reach their pages only through an explicit sync
        for table in self.tables.values_mut() {
            let _ = table.sync();
        }
    }
}

/// Parse one delimited data row against the table's column types
fn parse_data_row(record: &csv::StringRecord, types: &[AttrType]) -> Option<Vec<Value>> {
    if record.len() != types.len() {
        return None;
    }

    let mut values = Vec::with_capacity(types.len());
    for (raw, attr_type) in record.iter().zip(types) {
        let raw = raw.trim();
        if is_null_literal(raw) {
            values.push(Value::Null);
            continue;
        }

        let value = match attr_type {
            AttrType::Int => Value::Int(raw.parse().ok()?),
            AttrType::Float => Value::Float(raw.parse().ok()?),
            AttrType::Date => Value::Date(parse_date(raw)?),
            AttrType::Chars(_) => Value::Chars(raw.to_string()),
        };
        values.push(value);
    }
    Some(values)
}

// ========== SELECT helpers ==========

fn validate_column_refs(table: &Table, select: &SelectStmt) -> DbResult<()> {
    let check = |col: &ColumnRef| -> DbResult<()> {
        if let Some(qualifier) = &col.table
            && qualifier != table.name()
        {
            return Err(TableError::SchemaTableNameIllegal(qualifier.clone()).into());
        }
        if col.column != "*" && table.meta().user_field_index(&col.column).is_none() {
            return Err(TableError::SchemaFieldNotExist(col.column.clone()).into());
        }
        Ok(())
    };

    if let Selectors::List(list) = &select.selectors {
        for selector in list {
            if let Some(col) = selector.column() {
                // `t.*` is only valid as a plain projection
                if col.column == "*" && selector.is_aggregate() {
                    return Err(DbError::InvalidArgument(
                        "aggregate over * is only valid for COUNT(*)".into(),
                    ));
                }
                check(col)?;
            }
        }
    }

    for condition in &select.conditions {
        for col in condition.column_refs() {
            check(col)?;
        }
    }

    if let Some(col) = &select.group_by {
        check(col)?;
    }
    if let Some((col, _)) = &select.order_by {
        check(col)?;
    }

    Ok(())
}

/// Ordering used by ORDER BY and GROUP BY: NULL sorts after every value
fn total_value_cmp(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

fn apply_limit_offset(rows: &mut Vec<Vec<String>>, limit: Option<usize>, offset: Option<usize>) {
    if let Some(offset) = offset {
        if offset >= rows.len() {
            rows.clear();
        } else {
            rows.drain(..offset);
        }
    }
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
}

/// Expand selectors into (header, user-field index) pairs for plain
/// projection
fn projection_columns(table: &Table, selectors: &Selectors) -> Vec<(String, usize)> {
    let all = || {
        table
            .meta()
            .user_fields()
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect::<Vec<_>>()
    };

    match selectors {
        Selectors::All => all(),
        Selectors::List(list) => {
            let mut columns = Vec::new();
            for selector in list {
                if let Selector::Column(col) = selector {
                    if col.column == "*" {
                        columns.extend(all());
                    } else if let Some(idx) = table.meta().user_field_index(&col.column) {
                        let header = match &col.table {
                            Some(t) => format!("{}.{}", t, col.column),
                            None => col.column.clone(),
                        };
                        columns.push((header, idx));
                    }
                }
            }
            columns
        }
    }
}

fn plain_select(
    table: &Table,
    select: &SelectStmt,
    mut rows: Vec<Vec<Value>>,
) -> DbResult<QueryResult> {
    if let Some((col, ascending)) = &select.order_by {
        let idx = table
            .meta()
            .user_field_index(&col.column)
            .ok_or_else(|| TableError::SchemaFieldNotExist(col.column.clone()))?;
        rows.sort_by(|a, b| {
            let ord = total_value_cmp(&a[idx], &b[idx]);
            if *ascending { ord } else { ord.reverse() }
        });
    }

    let columns = projection_columns(table, &select.selectors);
    let headers: Vec<String> = columns.iter().map(|(h, _)| h.clone()).collect();

    let mut out: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|(_, idx)| row[*idx].to_string())
                .collect()
        })
        .collect();

    apply_limit_offset(&mut out, select.limit, select.offset);
    Ok(QueryResult::ResultSet(headers, out))
}

/// One aggregate (or group-key) output column
enum AggSpec {
    Key(usize),
    CountAll,
    Count(usize),
    Average(usize),
    Max(usize),
    Min(usize),
    Sum(usize),
}

enum AggState {
    Count(usize),
    Average { sum: f64, n: usize },
    Extreme(Option<Value>),
    SumInt(i64),
    SumFloat(f64),
    Key(Option<Value>),
}

fn agg_specs(table: &Table, select: &SelectStmt) -> DbResult<Vec<(String, AggSpec)>> {
    let resolve = |col: &ColumnRef| -> DbResult<usize> {
        table
            .meta()
            .user_field_index(&col.column)
            .ok_or_else(|| TableError::SchemaFieldNotExist(col.column.clone()).into())
    };

    let list = match &select.selectors {
        Selectors::All => {
            return Err(DbError::InvalidArgument(
                "SELECT * cannot be combined with GROUP BY".into(),
            ));
        }
        Selectors::List(list) => list,
    };

    let mut specs = Vec::with_capacity(list.len());
    for selector in list {
        let (header, spec) = match selector {
            Selector::Column(col) => (col.column.clone(), AggSpec::Key(resolve(col)?)),
            Selector::CountAll => ("COUNT(*)".to_string(), AggSpec::CountAll),
            Selector::Count(col) => (format!("COUNT({})", col.column), AggSpec::Count(resolve(col)?)),
            Selector::Average(col) => {
                let idx = resolve(col)?;
                ensure_numeric(table, idx)?;
                (format!("AVG({})", col.column), AggSpec::Average(idx))
            }
            Selector::Max(col) => (format!("MAX({})", col.column), AggSpec::Max(resolve(col)?)),
            Selector::Min(col) => (format!("MIN({})", col.column), AggSpec::Min(resolve(col)?)),
            Selector::Sum(col) => {
                let idx = resolve(col)?;
                ensure_numeric(table, idx)?;
                (format!("SUM({})", col.column), AggSpec::Sum(idx))
            }
        };
        specs.push((header, spec));
    }
    Ok(specs)
}

fn ensure_numeric(table: &Table, idx: usize) -> DbResult<()> {
    let field = &table.meta().user_fields()[idx];
    match field.attr_type {
        AttrType::Int | AttrType::Float => Ok(()),
        _ => Err(TableError::SchemaFieldTypeMismatch(field.name.clone()).into()),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f as f64),
        _ => None,
    }
}

fn init_states(table: &Table, specs: &[(String, AggSpec)]) -> Vec<AggState> {
    specs
        .iter()
        .map(|(_, spec)| match spec {
            AggSpec::Key(_) => AggState::Key(None),
            AggSpec::CountAll | AggSpec::Count(_) => AggState::Count(0),
            AggSpec::Average(_) => AggState::Average { sum: 0.0, n: 0 },
            AggSpec::Max(_) | AggSpec::Min(_) => AggState::Extreme(None),
            AggSpec::Sum(idx) => {
                if matches!(table.meta().user_fields()[*idx].attr_type, AttrType::Int) {
                    AggState::SumInt(0)
                } else {
                    AggState::SumFloat(0.0)
                }
            }
        })
        .collect()
}

fn fold_row(specs: &[(String, AggSpec)], states: &mut [AggState], row: &[Value]) {
    for ((_, spec), state) in specs.iter().zip(states.iter_mut()) {
        match (spec, state) {
            (AggSpec::Key(idx), AggState::Key(slot)) => {
                if slot.is_none() {
                    *slot = Some(row[*idx].clone());
                }
            }
            (AggSpec::CountAll, AggState::Count(n)) => *n += 1,
            (AggSpec::Count(idx), AggState::Count(n)) => {
                if !row[*idx].is_null() {
                    *n += 1;
                }
            }
            (AggSpec::Average(idx), AggState::Average { sum, n }) => {
                if let Some(v) = numeric(&row[*idx]) {
                    *sum += v;
                    *n += 1;
                }
            }
            (AggSpec::Max(idx), AggState::Extreme(slot)) => {
                let v = &row[*idx];
                if !v.is_null()
                    && slot
                        .as_ref()
                        .is_none_or(|best| total_value_cmp(v, best) == Ordering::Greater)
                {
                    *slot = Some(v.clone());
                }
            }
            (AggSpec::Min(idx), AggState::Extreme(slot)) => {
                let v = &row[*idx];
                if !v.is_null()
                    && slot
                        .as_ref()
                        .is_none_or(|best| total_value_cmp(v, best) == Ordering::Less)
                {
                    *slot = Some(v.clone());
                }
            }
            (AggSpec::Sum(idx), AggState::SumInt(sum)) => {
                if let Value::Int(i) = &row[*idx] {
                    *sum += *i as i64;
                }
            }
            (AggSpec::Sum(idx), AggState::SumFloat(sum)) => {
                if let Some(v) = numeric(&row[*idx]) {
                    *sum += v;
                }
            }
            _ => {}
        }
    }
}

fn finish_states(states: Vec<AggState>) -> Vec<String> {
    states
        .into_iter()
        .map(|state| match state {
            AggState::Count(n) => n.to_string(),
            AggState::Average { sum, n } => {
                if n == 0 {
                    "null".to_string()
                } else {
                    format_float((sum / n as f64) as f32)
                }
            }
            AggState::Extreme(slot) | AggState::Key(slot) => match slot {
                Some(v) => v.to_string(),
                None => "null".to_string(),
            },
            AggState::SumInt(sum) => sum.to_string(),
            AggState::SumFloat(sum) => format_float(sum as f32),
        })
        .collect()
}

/// GROUP BY pipeline: sort rows by the group key, fold each run of equal
/// keys through the aggregate states.
fn aggregate_select(
    table: &Table,
    select: &SelectStmt,
    mut rows: Vec<Vec<Value>>,
) -> DbResult<QueryResult> {
    let specs = agg_specs(table, select)?;
    let headers: Vec<String> = specs.iter().map(|(h, _)| h.clone()).collect();

    let group_idx = match &select.group_by {
        Some(col) => Some(
            table
                .meta()
                .user_field_index(&col.column)
                .ok_or_else(|| TableError::SchemaFieldNotExist(col.column.clone()))?,
        ),
        None => None,
    };

    // Bare columns are only meaningful as the group key
    if group_idx.is_none()
        && specs
            .iter()
            .any(|(_, spec)| matches!(spec, AggSpec::Key(_)))
    {
        return Err(DbError::InvalidArgument(
            "bare column in an aggregate query requires GROUP BY".into(),
        ));
    }

    let mut out: Vec<Vec<String>> = Vec::new();

    match group_idx {
        None => {
            let mut states = init_states(table, &specs);
            for row in &rows {
                fold_row(&specs, &mut states, row);
            }
            out.push(finish_states(states));
        }
        Some(idx) => {
            let mut ascending = true;
            if let Some((order_col, asc)) = &select.order_by
                && table.meta().user_field_index(&order_col.column) == Some(idx)
            {
                ascending = *asc;
            }

            rows.sort_by(|a, b| {
                let ord = total_value_cmp(&a[idx], &b[idx]);
                if ascending { ord } else { ord.reverse() }
            });

            let mut run_start = 0;
            while run_start < rows.len() {
                let mut run_end = run_start + 1;
                while run_end < rows.len()
                    && total_value_cmp(&rows[run_start][idx], &rows[run_end][idx])
                        == Ordering::Equal
                {
                    run_end += 1;
                }

                let mut states = init_states(table, &specs);
                for row in &rows[run_start..run_end] {
                    fold_row(&specs, &mut states, row);
                }
                out.push(finish_states(states));

                run_start = run_end;
            }
        }
    }

    apply_limit_offset(&mut out, select.limit, select.offset);
    Ok(QueryResult::ResultSet(headers, out))
}

#[cfg(test)]
mod tests;
