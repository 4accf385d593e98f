//! SQLite-backed patient loading.
//!
//! Provides [`SqlitePatientRepository`], which executes the schema-driven
//! `Patient` query against a SQLite connection pool and materializes the
//! result set into typed records.

use async_trait::async_trait;
use diapred_core::{DiapredError, PatientRecord, PatientSchema, PatientSource, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Pool builder
// ---------------------------------------------------------------------------

/// Open (or create) a SQLite connection pool.
async fn open_pool(database_url: &str) -> Result<SqlitePool> {
    let connect_opts = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| DiapredError::DataSource(format!("Invalid database URL: {e}")))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    // For in-memory databases every connection gets its own database, so
    // restrict the pool to a single connection to keep a consistent view.
    let max_conns: u32 = if database_url.contains(":memory:") { 1 } else { 5 };

    sqlx::pool::PoolOptions::<Sqlite>::new()
        .max_connections(max_conns)
        .connect_with(connect_opts)
        .await
        .map_err(|e| DiapredError::DataSource(format!("Failed to connect to SQLite: {e}")))
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// Loads `Patient` rows from a SQLite database.
pub struct SqlitePatientRepository {
    pool: SqlitePool,
    schema: PatientSchema,
    query: String,
}

impl SqlitePatientRepository {
    /// Connect to `database_url` and prepare the schema-driven query.
    ///
    /// Connection failure is fatal; there is no retry.
    pub async fn connect(database_url: &str, schema: PatientSchema) -> Result<Self> {
        if schema.feature_columns.len() != PatientSchema::FEATURE_DIM {
            return Err(DiapredError::DataSource(format!(
                "Patient schema declares {} feature columns, expected {}",
                schema.feature_columns.len(),
                PatientSchema::FEATURE_DIM
            )));
        }
        let pool = open_pool(database_url).await?;
        let query = select_statement(&schema);
        Ok(Self { pool, schema, query })
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl PatientSource for SqlitePatientRepository {
    async fn fetch_all(&self) -> Result<Vec<PatientRecord>> {
        let rows = sqlx::query(&self.query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DiapredError::DataSource(format!("Patient query failed: {e}")))?;
        rows.iter()
            .map(|row| patient_from_row(row, &self.schema))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Query & row decoding
// ---------------------------------------------------------------------------

/// Build the fixed SELECT. `Id` and `Output` are cast to REAL; the feature
/// columns are read as stored.
fn select_statement(schema: &PatientSchema) -> String {
    format!(
        "SELECT CAST({id} AS REAL) AS {id}, {features}, CAST({label} AS REAL) AS {label} FROM {table}",
        id = schema.id_column,
        features = schema.feature_columns.join(", "),
        label = schema.label_column,
        table = PatientSchema::TABLE,
    )
}

/// Read one numeric column, treating any non-numeric value as a fatal
/// parse error.
fn read_f32(row: &SqliteRow, column: &str) -> Result<f32> {
    row.try_get::<f64, _>(column)
        .map(|v| v as f32)
        .map_err(|e| DiapredError::DataSource(format!("Invalid value in column '{column}': {e}")))
}

/// Reconstruct a [`PatientRecord`] from a row, in schema column order.
fn patient_from_row(row: &SqliteRow, schema: &PatientSchema) -> Result<PatientRecord> {
    let mut features = [0f32; PatientSchema::FEATURE_DIM];
    for (slot, column) in features.iter_mut().zip(schema.feature_columns.iter()) {
        *slot = read_f32(row, column)?;
    }
    let [pregnancies, glucose, blood_pressure, skin_thickness, insulin, bmi, diabetes_pedigree_function, age] =
        features;

    Ok(PatientRecord {
        id: read_f32(row, &schema.id_column)?,
        pregnancies,
        glucose,
        blood_pressure,
        skin_thickness,
        insulin,
        bmi,
        diabetes_pedigree_function,
        age,
        output: read_f32(row, &schema.label_column)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
