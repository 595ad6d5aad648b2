use log::{debug, info, warn};

use snafu::{prelude::*, Snafu};
use survey_reshape::*;

use std::collections::BTreeMap;
use std::fs;

use text_diff::{diff, print_diff, Difference};

mod config_reader;
mod io_common;
mod io_csv;
mod io_excel;
mod report;
mod store;

pub use crate::ingest::config_reader::*;
use crate::ingest::io_common::RawSurvey;
use crate::ingest::store::{catalog_columns, SurveyStore, QUESTIONS_TABLE};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum IngestError {
    #[snafu(display("The setting {name} was not found. {remediation}"))]
    MissingSetting { name: String, remediation: String },
    #[snafu(display(
        "Invalid schema name {schema:?}: only ASCII letters, digits and underscores are allowed"
    ))]
    InvalidSchemaName { schema: String },
    #[snafu(display("Unknown input type {input_type:?} (expected csv or xlsx)"))]
    UnknownInputType { input_type: String },

    #[snafu(display("Error reading CSV file {path}"))]
    CsvRead { source: csv::Error, path: String },
    #[snafu(display("Error opening Excel file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("The Excel file {path} has no worksheet {worksheet:?}"))]
    MissingWorksheet { path: String, worksheet: String },
    #[snafu(display("The Excel file {path} has no worksheet"))]
    EmptyWorkbook { path: String },
    #[snafu(display("The input {path} does not contain the two header rows"))]
    MissingHeader { path: String },
    #[snafu(display("{path}:{lineno}: {message}"))]
    InvalidRecord {
        path: String,
        lineno: u64,
        message: String,
    },

    #[snafu(display("Error opening JSON file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Unknown expectation field {field:?} (expected description or context)"))]
    UnknownExpectationField { field: String },
    #[snafu(display("Invalid instrument {path}"))]
    Instrument { source: ReshapeError, path: String },

    #[snafu(display("Invalid survey data"))]
    Reshape { source: ReshapeError },
    #[snafu(display("The question catalog of schema {schema} is empty, run load-catalog first"))]
    EmptyCatalog { schema: String },

    #[snafu(display("The schema {schema} does not exist yet ({path}), run load-catalog first"))]
    MissingSchema { schema: String, path: String },
    #[snafu(display("Database error"))]
    Database { source: rusqlite::Error },

    #[snafu(display("Error writing to {path}"))]
    WritingReport {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error serializing the report"))]
    SerializingReport { source: serde_json::Error },
    #[snafu(display("Difference detected between calculated report and reference report"))]
    ReferenceMismatch {},
}

pub type IngestResult<T> = Result<T, IngestError>;
pub type BIngestResult<T> = Result<T, Box<IngestError>>;

/// What was written by an ingest.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct IngestSummary {
    pub rows: usize,
    pub ranked: usize,
    pub open: usize,
    /// Unrecognized ranked answers and their number of occurences.
    pub unrecognized: BTreeMap<String, usize>,
}

impl IngestSummary {
    fn add(&mut self, records: &RowRecords) {
        self.rows += 1;
        self.ranked += records.ranked.len();
        self.open += records.open.len();
        for u in records.unrecognized.iter() {
            *self.unrecognized.entry(u.text.clone()).or_insert(0) += 1;
        }
    }

    fn log(&self) {
        info!(
            "Ingested {} respondents, {} ranked responses, {} open responses",
            self.rows, self.ranked, self.open
        );
        if !self.unrecognized.is_empty() {
            let total: usize = self.unrecognized.values().sum();
            warn!(
                "{} ranked answers were not recognized and were not scored:",
                total
            );
            for (text, count) in self.unrecognized.iter() {
                warn!("  {:?}: {}", text, count);
            }
        }
    }
}

/// A word-level rendering of the difference between the expected and the actual text.
pub fn describe_difference(expected: &str, actual: &str) -> String {
    let (_, changes) = diff(expected, actual, " ");
    changes
        .iter()
        .map(|d| match d {
            Difference::Same(s) => s.clone(),
            Difference::Rem(s) => format!("[-{}-]", s),
            Difference::Add(s) => format!("{{+{}+}}", s),
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn log_reshape_error(err: &ReshapeError) {
    if let ReshapeError::HeaderValidation { mismatches, .. } = err {
        for m in mismatches.iter() {
            if let Some(actual) = &m.actual {
                warn!(
                    "column {}: {}: {}",
                    m.column,
                    m.field.name(),
                    describe_difference(&m.expected, actual)
                );
            }
        }
    }
}

/// Reconciles the header of the survey against the catalog of the store.
pub fn reconcile(
    store: &SurveyStore,
    survey: &RawSurvey,
    instrument: &Instrument,
) -> BIngestResult<(ColumnMap, Vec<CatalogEntry>)> {
    let catalog = store.fetch_catalog()?;
    if catalog.is_empty() {
        return Err(Box::new(IngestError::EmptyCatalog {
            schema: store.schema().to_string(),
        }));
    }
    debug!("reconcile: catalog: {:?}", catalog);
    let columns = reconcile_header(&survey.header, &survey.sub_header, instrument, &catalog)
        .map_err(|e| {
            log_reshape_error(&e);
            e
        })
        .context(ReshapeSnafu {})?;
    Ok((columns, catalog))
}

/// Writes all the records of the survey in a single transaction.
///
/// Nothing is written if the header does not reconcile or if any row fails.
pub fn ingest_survey(
    store: &mut SurveyStore,
    survey: &RawSurvey,
    instrument: &Instrument,
    replace: bool,
) -> BIngestResult<IngestSummary> {
    let (columns, catalog) = reconcile(store, survey, instrument)?;

    let tx = store.transaction()?;
    if replace {
        info!("Deleting the responses already present");
        tx.delete_all(OpenResponse::TABLE)?;
        tx.delete_all(RankedResponse::TABLE)?;
        tx.delete_all(RespondentRecord::TABLE)?;
    }

    let mut summary = IngestSummary::default();
    for (idx, row) in survey.rows.iter().enumerate() {
        debug!("Processing row {}", idx);
        let records = decompose_row(idx, row, &columns, &catalog, instrument)
            .context(ReshapeSnafu {})?;
        tx.insert(RespondentRecord::TABLE, &records.respondent.columns())?;
        for r in records.ranked.iter() {
            tx.insert(RankedResponse::TABLE, &r.columns())?;
        }
        for r in records.open.iter() {
            tx.insert(OpenResponse::TABLE, &r.columns())?;
        }
        summary.add(&records);
    }
    tx.commit()?;
    summary.log();
    Ok(summary)
}

fn read_input(settings: &IngestSettings) -> BIngestResult<RawSurvey> {
    match settings.input_type {
        InputType::Csv => io_csv::read_survey(&settings.input_path),
        InputType::Xlsx => {
            io_excel::read_survey(&settings.input_path, settings.excel_worksheet_name.as_deref())
        }
    }
}

pub fn run_ingest(settings: &IngestSettings) -> BIngestResult<IngestSummary> {
    let instrument = load_instrument(&settings.instrument_path)?;
    info!(
        "Using instrument {:?} from {}",
        instrument.name, settings.instrument_path
    );
    let survey = read_input(settings)?;
    info!(
        "Read {} columns and {} rows from {}",
        survey.header.len(),
        survey.rows.len(),
        settings.input_path
    );
    if settings.check_header {
        let store = SurveyStore::open_read_only(&settings.store)?;
        let (columns, _) = reconcile(&store, &survey, &instrument)?;
        for (idx, c) in columns.iter() {
            info!(
                "column {}: {:?} [{:?}] {:?} {:?}",
                idx, c.description, c.context, c.question_type, c.catalog_id
            );
        }
        return Ok(IngestSummary::default());
    }
    let mut store = SurveyStore::open(&settings.store)?;
    ingest_survey(&mut store, &survey, &instrument, settings.replace)
}

pub fn run_load_catalog(settings: &StoreSettings, path: &str) -> BIngestResult<usize> {
    let entries = io_csv::read_catalog(path)?;
    let mut store = SurveyStore::open(settings)?;
    let tx = store.transaction()?;
    tx.delete_all(QUESTIONS_TABLE)?;
    for e in entries.iter() {
        tx.insert(QUESTIONS_TABLE, &catalog_columns(e))?;
    }
    tx.commit()?;
    info!(
        "Loaded {} questions into the catalog of {}",
        store.count(QUESTIONS_TABLE)?,
        store.schema()
    );
    Ok(entries.len())
}

pub fn run_load_categories(settings: &StoreSettings, path: &str) -> BIngestResult<usize> {
    let tags = io_csv::read_categories(path)?;
    let mut store = SurveyStore::open(settings)?;
    let tx = store.transaction()?;
    tx.delete_all(CategoryTag::TABLE)?;
    for t in tags.iter() {
        tx.insert(CategoryTag::TABLE, &t.columns())?;
    }
    tx.commit()?;
    info!(
        "Loaded {} category tags into {}",
        store.count(CategoryTag::TABLE)?,
        store.schema()
    );
    Ok(tags.len())
}

pub fn run_report(
    settings: &StoreSettings,
    out: Option<String>,
    reference: Option<String>,
    top_words: Option<usize>,
) -> BIngestResult<()> {
    let store = SurveyStore::open(settings)?;
    let rep = report::build_report(&store, top_words.unwrap_or(report::DEFAULT_TOP_WORDS))?;
    let pretty_js = serde_json::to_string_pretty(&rep).context(SerializingReportSnafu {})?;

    match out.as_deref() {
        None | Some("") | Some("stdout") => println!("{}", pretty_js),
        Some(path) => {
            fs::write(path, &pretty_js).context(WritingReportSnafu { path })?;
            info!("Report written to {}", path);
        }
    }

    // The reference report, if provided for comparison
    if let Some(reference_p) = reference {
        let contents =
            fs::read_to_string(&reference_p).context(OpeningJsonSnafu { path: &reference_p })?;
        let reference_js: serde_json::Value =
            serde_json::from_str(&contents).context(ParsingJsonSnafu { path: &reference_p })?;
        let pretty_js_ref =
            serde_json::to_string_pretty(&reference_js).context(SerializingReportSnafu {})?;
        if pretty_js_ref != pretty_js {
            warn!("Found differences with the reference report");
            print_diff(pretty_js_ref.as_str(), pretty_js.as_str(), "\n");
            return Err(Box::new(IngestError::ReferenceMismatch {}));
        }
    }
    Ok(())
}
