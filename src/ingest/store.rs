//! SQLite storage of the normalized survey records.
//!
//! Each survey year lives in its own schema, attached to the main connection as a
//! separate database (`<schema>.sqlite` next to the main database file).
//!
//! ## Tables
//!
//! - `questions` - the question catalog
//! - `respondents` - one row per respondent, with a `soft_delete` flag
//! - `question_rank_responses` - one row per scored answer and band
//! - `question_open_responses` - one row per non-empty free text answer
//! - `open_response_categories` - manually curated categories of the open responses

use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Transaction};

use crate::ingest::*;

pub const QUESTIONS_TABLE: &str = "questions";

const MEMORY: &str = ":memory:";

/// Tables of a survey schema. `{schema}` is replaced by the validated schema name.
const SURVEY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS {schema}.questions (
    question_id INTEGER PRIMARY KEY,
    question_type TEXT NOT NULL,
    question_text TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS {schema}.respondents (
    respondent_id TEXT PRIMARY KEY,
    collector_id TEXT,
    start_datetime TEXT,
    end_datetime TEXT,
    num_individuals_in_response INTEGER,
    tenure INTEGER,
    minority BOOLEAN,
    any_support BOOLEAN,
    grammar_avg REAL,
    middle_avg REAL,
    high_avg REAL,
    overall_avg REAL,
    soft_delete BOOLEAN NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS {schema}.question_rank_responses (
    respondent_id TEXT NOT NULL REFERENCES respondents(respondent_id),
    question_id INTEGER NOT NULL,
    grammar BOOLEAN NOT NULL,
    middle BOOLEAN NOT NULL,
    high BOOLEAN NOT NULL,
    response_value INTEGER NOT NULL CHECK (response_value BETWEEN 1 AND 4),
    CHECK (grammar + middle + high <= 1)
);

CREATE TABLE IF NOT EXISTS {schema}.question_open_responses (
    respondent_id TEXT NOT NULL REFERENCES respondents(respondent_id),
    question_id INTEGER NOT NULL,
    grammar BOOLEAN NOT NULL,
    middle BOOLEAN NOT NULL,
    high BOOLEAN NOT NULL,
    whole_school BOOLEAN NOT NULL,
    response TEXT NOT NULL,
    CHECK (grammar + middle + high + whole_school <= 1)
);

CREATE TABLE IF NOT EXISTS {schema}.open_response_categories (
    question_id INTEGER NOT NULL,
    sub_question_id TEXT,
    respondent_id TEXT NOT NULL,
    grammar BOOLEAN NOT NULL,
    middle BOOLEAN NOT NULL,
    high BOOLEAN NOT NULL,
    category TEXT NOT NULL,
    sentiment TEXT NOT NULL CHECK (sentiment IN ('positive', 'negative'))
);
"#;

fn to_value(s: &Scalar) -> Value {
    match s {
        Scalar::Null => Value::Null,
        Scalar::Bool(b) => Value::Integer(*b as i64),
        Scalar::Int(i) => Value::Integer(*i),
        Scalar::Real(f) => Value::Real(*f),
        Scalar::Text(t) => Value::Text(t.clone()),
    }
}

pub fn catalog_columns(e: &CatalogEntry) -> Columns {
    vec![
        ("question_id", e.question_id.into()),
        ("question_type", e.question_type.as_str().into()),
        ("question_text", e.text.clone().into()),
    ]
}

fn insert_statement(schema: &str, table: &str, columns: &Columns) -> String {
    let names: Vec<&str> = columns.iter().map(|(n, _)| *n).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO {}.{} ({}) VALUES ({})",
        schema,
        table,
        names.join(", "),
        placeholders.join(", ")
    )
}

/// The file of the schema, next to the main database.
fn schema_file(settings: &StoreSettings) -> String {
    Path::new(&settings.connection)
        .with_file_name(format!("{}.sqlite", settings.schema))
        .to_string_lossy()
        .to_string()
}

/// A connection with the schema of one survey year attached.
pub struct SurveyStore {
    conn: Connection,
    schema: String,
}

impl SurveyStore {
    /// Opens the main database and attaches the schema, creating the tables if needed.
    pub fn open(settings: &StoreSettings) -> BIngestResult<SurveyStore> {
        validate_schema_name(&settings.schema)?;
        if settings.connection == MEMORY {
            return SurveyStore::open_in_memory(&settings.schema);
        }
        let schema_file = schema_file(settings);
        info!(
            "Opening database {} with schema {} ({})",
            settings.connection, settings.schema, schema_file
        );
        let conn = Connection::open(&settings.connection).context(DatabaseSnafu {})?;
        let store = SurveyStore::attach(conn, &settings.schema, &schema_file)?;
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory(schema: &str) -> BIngestResult<SurveyStore> {
        validate_schema_name(schema)?;
        debug!("Opening in-memory database with schema {}", schema);
        let conn = Connection::open_in_memory().context(DatabaseSnafu {})?;
        let store = SurveyStore::attach(conn, schema, MEMORY)?;
        store.init_schema()?;
        Ok(store)
    }

    /// Opens the schema of an existing database read-only. Nothing is created on disk.
    pub fn open_read_only(settings: &StoreSettings) -> BIngestResult<SurveyStore> {
        validate_schema_name(&settings.schema)?;
        if settings.connection == MEMORY {
            return SurveyStore::open_in_memory(&settings.schema);
        }
        let schema_file = schema_file(settings);
        if !Path::new(&schema_file).is_file() {
            return Err(Box::new(IngestError::MissingSchema {
                schema: settings.schema.clone(),
                path: schema_file,
            }));
        }
        info!(
            "Opening schema {} ({}) read-only",
            settings.schema, schema_file
        );
        // The main database is not read, the schema lives in its own file.
        let conn = Connection::open_in_memory().context(DatabaseSnafu {})?;
        SurveyStore::attach(conn, &settings.schema, &format!("file:{}?mode=ro", schema_file))
    }

    fn attach(conn: Connection, schema: &str, file: &str) -> BIngestResult<SurveyStore> {
        conn.execute(&format!("ATTACH DATABASE ?1 AS {}", schema), [file])
            .context(DatabaseSnafu {})?;
        Ok(SurveyStore {
            conn,
            schema: schema.to_string(),
        })
    }

    /// Creates the missing tables of the schema.
    pub fn init_schema(&self) -> BIngestResult<()> {
        self.conn
            .execute_batch(&SURVEY_SCHEMA.replace("{schema}", &self.schema))
            .context(DatabaseSnafu {})?;
        Ok(())
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// The name of a table of the schema, for use in SQL statements.
    pub fn table(&self, table: &str) -> String {
        format!("{}.{}", self.schema, table)
    }

    pub fn fetch_catalog(&self) -> BIngestResult<Vec<CatalogEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT question_id, question_type, question_text FROM {} ORDER BY question_id",
                self.table(QUESTIONS_TABLE)
            ))
            .context(DatabaseSnafu {})?;
        let rows = stmt
            .query_map([], |row| {
                let question_type: String = row.get(1)?;
                Ok(CatalogEntry {
                    question_id: row.get(0)?,
                    question_type: QuestionType::parse(&question_type),
                    text: row.get(2)?,
                })
            })
            .context(DatabaseSnafu {})?;
        let mut res: Vec<CatalogEntry> = Vec::new();
        for r in rows {
            res.push(r.context(DatabaseSnafu {})?);
        }
        debug!("fetch_catalog: {} questions", res.len());
        Ok(res)
    }

    pub fn count(&self, table: &str) -> BIngestResult<i64> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", self.table(table)), [], |row| {
                row.get(0)
            })
            .context(DatabaseSnafu {})?;
        Ok(n)
    }

    /// Starts a transaction. Dropping it without calling [StoreTransaction::commit] rolls
    /// back everything written through it.
    pub fn transaction(&mut self) -> BIngestResult<StoreTransaction<'_>> {
        let tx = self.conn.transaction().context(DatabaseSnafu {})?;
        Ok(StoreTransaction {
            tx,
            schema: self.schema.clone(),
        })
    }
}

pub struct StoreTransaction<'a> {
    tx: Transaction<'a>,
    schema: String,
}

impl<'a> StoreTransaction<'a> {
    pub fn insert(&self, table: &str, columns: &Columns) -> BIngestResult<()> {
        let sql = insert_statement(&self.schema, table, columns);
        let values: Vec<Value> = columns.iter().map(|(_, v)| to_value(v)).collect();
        let mut stmt = self.tx.prepare_cached(&sql).context(DatabaseSnafu {})?;
        stmt.execute(params_from_iter(values.iter()))
            .context(DatabaseSnafu {})?;
        Ok(())
    }

    pub fn delete_all(&self, table: &str) -> BIngestResult<()> {
        let n = self
            .tx
            .execute(&format!("DELETE FROM {}.{}", self.schema, table), [])
            .context(DatabaseSnafu {})?;
        debug!("delete_all: {}: {} rows deleted", table, n);
        Ok(())
    }

    pub fn commit(self) -> BIngestResult<()> {
        self.tx.commit().context(DatabaseSnafu {})?;
        Ok(())
    }
}
