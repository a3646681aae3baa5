// sluice-core/src/infrastructure/adapters/duckdb.rs

use async_trait::async_trait;
use duckdb::types::Value as DuckValue;
use duckdb::{Config, Connection, params_from_iter};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tracing::{debug, info};

use crate::domain::dataset::{Column, DataType, Dataset, Value};
use crate::domain::error::BoxError;
use crate::domain::pipeline::LoadMode;
use crate::infrastructure::error::{DatabaseError, InfrastructureError};
use crate::ports::component::{Extractor, Loader, StageContext};

// One base connection per database file; callers get clones of it. Opening the
// same file twice from one process is not allowed by DuckDB.
fn catalog() -> &'static Mutex<HashMap<PathBuf, Connection>> {
    static CATALOG: OnceLock<Mutex<HashMap<PathBuf, Connection>>> = OnceLock::new();
    CATALOG.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Connection to `path`, or to a fresh in-memory database when `None` or `:memory:`.
pub fn connect(path: Option<&Path>) -> Result<Connection, InfrastructureError> {
    let path = match path {
        Some(p) if p.as_os_str() != ":memory:" => p,
        _ => return Ok(Connection::open_in_memory_with_flags(Config::default())?),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    // Canonicalize after the parent exists so two spellings share one entry
    let key = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent
            .canonicalize()?
            .join(path.file_name().unwrap_or(path.as_os_str())),
        None => std::env::current_dir()?.join(path),
    };

    let mut cache = catalog()
        .lock()
        .map_err(|_| InfrastructureError::LockPoisoned)?;
    if let Some(base) = cache.get(&key) {
        return Ok(base.try_clone()?);
    }
    let base = Connection::open_with_flags(&key, Config::default())?;
    let conn = base.try_clone()?;
    cache.insert(key, base);
    Ok(conn)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Boolean => "BOOLEAN",
        DataType::Integer => "BIGINT",
        DataType::Float => "DOUBLE",
        DataType::Text => "VARCHAR",
    }
}

/// Collapses DuckDB's type zoo onto the four dataset types.
fn classify(duck_type: &str) -> DataType {
    let t = duck_type.to_ascii_uppercase();
    match t.as_str() {
        "BOOLEAN" => DataType::Boolean,
        "TINYINT" | "SMALLINT" | "INTEGER" | "BIGINT" | "UTINYINT" | "USMALLINT" | "UINTEGER" => {
            DataType::Integer
        }
        "FLOAT" | "DOUBLE" | "REAL" | "HUGEINT" | "UBIGINT" => DataType::Float,
        _ if t.starts_with("DECIMAL") => DataType::Float,
        _ => DataType::Text,
    }
}

fn to_duck(value: &Value) -> DuckValue {
    match value {
        Value::Null => DuckValue::Null,
        Value::Bool(b) => DuckValue::Boolean(*b),
        Value::Int(i) => DuckValue::BigInt(*i),
        Value::Float(f) => DuckValue::Double(*f),
        Value::Text(s) => DuckValue::Text(s.clone()),
    }
}

/// Runs `query` and reads the result as a dataset.
pub fn query_dataset(conn: &Connection, query: &str) -> Result<Dataset, InfrastructureError> {
    // A view gives us the result schema before fetching any rows
    conn.execute_batch(&format!(
        "CREATE OR REPLACE TEMP VIEW __sluice_extract AS {}",
        query.trim().trim_end_matches(';')
    ))?;

    let columns: Vec<Column> = {
        let mut stmt = conn.prepare("PRAGMA table_info('__sluice_extract')")?;
        let info = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>("name")?, row.get::<_, String>("type")?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        info.into_iter()
            .map(|(name, ty)| Column::new(name, classify(&ty)))
            .collect()
    };

    let projection = columns
        .iter()
        .map(|c| format!("CAST({} AS {})", quote_ident(&c.name), sql_type(c.data_type)))
        .collect::<Vec<_>>()
        .join(", ");
    let select = if columns.is_empty() {
        "SELECT * FROM __sluice_extract".to_string()
    } else {
        format!("SELECT {} FROM __sluice_extract", projection)
    };

    let mut stmt = conn.prepare(&select)?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Vec::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            let value = match column.data_type {
                DataType::Boolean => row.get::<_, Option<bool>>(idx)?.map(Value::Bool),
                DataType::Integer => row.get::<_, Option<i64>>(idx)?.map(Value::Int),
                DataType::Float => row.get::<_, Option<f64>>(idx)?.map(Value::Float),
                DataType::Text => row.get::<_, Option<String>>(idx)?.map(Value::Text),
            };
            record.push(value.unwrap_or(Value::Null));
        }
        out.push(record);
    }
    drop(rows);
    drop(stmt);
    conn.execute_batch("DROP VIEW IF EXISTS __sluice_extract")?;

    Ok(Dataset::new(columns, out))
}

/// Writes `data` into `table`, creating it from the dataset's column types.
pub fn write_dataset(
    conn: &mut Connection,
    table: &str,
    data: &Dataset,
    mode: LoadMode,
) -> Result<usize, InfrastructureError> {
    if data.columns.is_empty() {
        return Err(InfrastructureError::Database(DatabaseError::Decode {
            column: table.to_string(),
            reason: "cannot load a dataset without columns".into(),
        }));
    }

    let table_sql = quote_ident(table);
    let column_defs = data
        .columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), sql_type(c.data_type)))
        .collect::<Vec<_>>()
        .join(", ");
    let create = match mode {
        LoadMode::Replace => format!("CREATE OR REPLACE TABLE {} ({})", table_sql, column_defs),
        LoadMode::Append => format!("CREATE TABLE IF NOT EXISTS {} ({})", table_sql, column_defs),
    };
    let placeholders = vec!["?"; data.column_count()].join(", ");
    let insert = format!("INSERT INTO {} VALUES ({})", table_sql, placeholders);

    let tx = conn.transaction()?;
    tx.execute_batch(&create)?;
    {
        let mut stmt = tx.prepare(&insert)?;
        for row in &data.rows {
            stmt.execute(params_from_iter(row.iter().map(to_duck)))?;
        }
    }
    tx.commit()?;
    Ok(data.row_count())
}

/// Pulls a dataset from any DuckDB query, file scans included.
pub struct DuckDbExtractor {
    database: Option<PathBuf>,
    query: String,
}

impl DuckDbExtractor {
    pub fn new(database: Option<PathBuf>, query: impl Into<String>) -> Self {
        Self {
            database,
            query: query.into(),
        }
    }
}

#[async_trait]
impl Extractor for DuckDbExtractor {
    async fn extract(&self, ctx: &mut StageContext) -> Result<Dataset, BoxError> {
        let database = self.database.clone();
        let query = self.query.clone();
        debug!(pipeline = %ctx.pipeline_name, "Running extraction query");

        let data = tokio::task::spawn_blocking(move || -> Result<Dataset, InfrastructureError> {
            let conn = connect(database.as_deref())?;
            query_dataset(&conn, &query)
        })
        .await??;

        if data.is_empty() {
            ctx.warn("query returned no rows");
        }
        Ok(data)
    }
}

pub struct DuckDbLoader {
    database: PathBuf,
    table: String,
    mode: LoadMode,
}

impl DuckDbLoader {
    pub fn new(database: PathBuf, table: impl Into<String>, mode: LoadMode) -> Self {
        Self {
            database,
            table: table.into(),
            mode,
        }
    }
}

#[async_trait]
impl Loader for DuckDbLoader {
    async fn load(&self, data: &Dataset, ctx: &mut StageContext) -> Result<bool, BoxError> {
        let database = self.database.clone();
        let table = self.table.clone();
        let mode = self.mode;
        let data = data.clone();

        let written = tokio::task::spawn_blocking(move || -> Result<usize, InfrastructureError> {
            let mut conn = connect(Some(&database))?;
            write_dataset(&mut conn, &table, &data, mode)
        })
        .await??;

        info!(
            pipeline = %ctx.pipeline_name,
            table = %self.table,
            rows = written,
            "Loaded rows into DuckDB"
        );
        Ok(true)
    }
}
