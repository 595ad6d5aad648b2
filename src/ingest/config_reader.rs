use crate::ingest::*;

use serde::{Deserialize, Serialize};
use survey_reshape::builder::InstrumentBuilder;

// ********* Settings ***********

/// Where the records are read from and written to.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct StoreSettings {
    /// Path of the main SQLite database, or ":memory:".
    pub connection: String,
    /// The schema of the survey year, attached as its own database.
    pub schema: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum InputType {
    Csv,
    Xlsx,
}

impl InputType {
    pub fn parse(s: Option<&str>) -> IngestResult<InputType> {
        match s {
            None | Some("csv") => Ok(InputType::Csv),
            Some("xlsx") | Some("excel") => Ok(InputType::Xlsx),
            Some(x) => UnknownInputTypeSnafu { input_type: x }.fail(),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct IngestSettings {
    pub store: StoreSettings,
    pub input_path: String,
    pub instrument_path: String,
    pub input_type: InputType,
    pub excel_worksheet_name: Option<String>,
    pub check_header: bool,
    pub replace: bool,
}

fn require(value: Option<String>, name: &str, remediation: &str) -> IngestResult<String> {
    match value {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => MissingSettingSnafu {
            name,
            remediation,
        }
        .fail(),
    }
}

/// Only ASCII letters, digits and underscores: the schema name ends up in SQL statements.
pub fn validate_schema_name(schema: &str) -> IngestResult<()> {
    let valid = !schema.is_empty()
        && !schema.starts_with(|c: char| c.is_ascii_digit())
        && schema.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    ensure!(valid, InvalidSchemaNameSnafu { schema });
    Ok(())
}

impl StoreSettings {
    pub fn new(connection: Option<String>, schema: Option<String>) -> IngestResult<StoreSettings> {
        let schema = require(
            schema,
            "DATABASE_SCHEMA",
            "This should be the schema name into which we're writing the survey results. \
             Unless you know of a reason otherwise, it should be \"sac_survey_202#\"",
        )?;
        validate_schema_name(&schema)?;
        let connection = require(
            connection,
            "DATABASE_CONNECTION_STRING",
            "This should be the path to the SQLite database file, like: surveys.sqlite",
        )?;
        Ok(StoreSettings { connection, schema })
    }
}

impl IngestSettings {
    pub fn new(
        store: StoreSettings,
        input: Option<String>,
        instrument: Option<String>,
        input_type: Option<String>,
        excel_worksheet_name: Option<String>,
        check_header: bool,
        replace: bool,
    ) -> IngestResult<IngestSettings> {
        let input_path = require(
            input,
            "INPUT_FILEPATH",
            "This should be the full filepath to the raw survey results csv.",
        )?;
        let instrument_path = require(
            instrument,
            "SURVEY_INSTRUMENT",
            "This should be the path to the JSON descriptor of the survey year, \
             like: instruments/gvca_2023.json",
        )?;
        Ok(IngestSettings {
            store,
            input_path,
            instrument_path,
            input_type: InputType::parse(input_type.as_deref())?,
            excel_worksheet_name,
            check_header,
            replace,
        })
    }
}

// ********* Instrument descriptor ***********

/// A set of columns: a single index, a list of indices or a half-open range.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnSpec {
    One(usize),
    Many(Vec<usize>),
    Range {
        from: usize,
        to: usize,
        step: Option<usize>,
    },
}

impl ColumnSpec {
    pub fn indices(&self) -> Vec<ColumnIndex> {
        match self {
            ColumnSpec::One(x) => vec![*x],
            ColumnSpec::Many(xs) => xs.clone(),
            ColumnSpec::Range { from, to, step } => {
                (*from..*to).step_by(step.unwrap_or(1).max(1)).collect()
            }
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionFile {
    pub columns: ColumnSpec,
    pub expected: String,
    pub replacement: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SentinelFile {
    pub text: String,
    pub context: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct BackfillFile {
    pub columns: ColumnSpec,
    pub placeholder: String,
    pub context: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ExpectationFile {
    pub columns: ColumnSpec,
    pub expected: String,
    pub field: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondentColumnsFile {
    pub respondent_id: Option<usize>,
    pub collector_id: Option<usize>,
    pub start_date: Option<usize>,
    pub end_date: Option<usize>,
    pub submission_method: Option<usize>,
    pub tenure: Option<usize>,
    pub any_support: Option<usize>,
    pub minority: Option<usize>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionMethodFile {
    pub text: String,
    pub individuals: i64,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentFile {
    pub name: String,
    pub column_count: Option<usize>,
    #[serde(default)]
    pub corrections: Vec<CorrectionFile>,
    #[serde(default)]
    pub open_response_groups: Vec<ColumnSpec>,
    pub positive_prompt: Option<String>,
    pub improvement_prompt: Option<String>,
    #[serde(default)]
    pub scope_sentinels: Vec<SentinelFile>,
    #[serde(default)]
    pub band_backfills: Vec<BackfillFile>,
    #[serde(default)]
    pub expectations: Vec<ExpectationFile>,
    pub respondent_columns: Option<RespondentColumnsFile>,
    #[serde(default)]
    pub submission_methods: Vec<SubmissionMethodFile>,
    #[serde(default)]
    pub middle_answers: Vec<String>,
}

fn expected_field(field: &str) -> IngestResult<ExpectedField> {
    match field {
        "description" => Ok(ExpectedField::Description),
        "context" => Ok(ExpectedField::Context),
        x => UnknownExpectationFieldSnafu { field: x }.fail(),
    }
}

fn respondent_columns(rcf: &Option<RespondentColumnsFile>) -> RespondentColumns {
    let default = RespondentColumns::default();
    match rcf {
        None => default,
        Some(f) => RespondentColumns {
            respondent_id: f.respondent_id.unwrap_or(default.respondent_id),
            collector_id: f.collector_id.unwrap_or(default.collector_id),
            start_date: f.start_date.unwrap_or(default.start_date),
            end_date: f.end_date.unwrap_or(default.end_date),
            submission_method: f.submission_method,
            tenure: f.tenure,
            any_support: f.any_support,
            minority: f.minority,
        },
    }
}

impl InstrumentFile {
    pub fn to_instrument(&self, path: &str) -> IngestResult<Instrument> {
        let mut b = InstrumentBuilder::new(&self.name);
        if let Some(count) = self.column_count {
            b = b.column_count(count);
        }
        for c in self.corrections.iter() {
            b = b.correction(&c.columns.indices(), &c.expected, &c.replacement);
        }
        if let (Some(pos), Some(imp)) = (&self.positive_prompt, &self.improvement_prompt) {
            b = b.open_response_prompts(pos, imp);
        }
        for s in self.scope_sentinels.iter() {
            b = b.scope_sentinel(&s.text, &s.context);
        }
        for g in self.open_response_groups.iter() {
            b = b.open_response_group(&g.indices());
        }
        for bf in self.band_backfills.iter() {
            b = b.band_backfill(&bf.columns.indices(), &bf.placeholder, &bf.context);
        }
        for e in self.expectations.iter() {
            b = b.expect(&e.columns.indices(), &e.expected, expected_field(&e.field)?);
        }
        b = b.respondent_columns(respondent_columns(&self.respondent_columns));
        for m in self.submission_methods.iter() {
            b = b.submission_method(&m.text, m.individuals);
        }
        for a in self.middle_answers.iter() {
            b = b.middle_answer(a);
        }
        b.build().context(InstrumentSnafu { path })
    }
}

pub fn parse_instrument(contents: &str, path: &str) -> IngestResult<Instrument> {
    let file: InstrumentFile =
        serde_json::from_str(contents).context(ParsingJsonSnafu { path })?;
    debug!(
        "parse_instrument: {}: {} expectations, {} corrections",
        path,
        file.expectations.len(),
        file.corrections.len()
    );
    file.to_instrument(path)
}

pub fn load_instrument(path: &str) -> BIngestResult<Instrument> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    Ok(parse_instrument(&contents, path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = r#"{
        "name": "small",
        "columnCount": 8,
        "corrections": [
            {"columns": [4, 5], "expected": "How welcoming is the  school?", "replacement": "How welcoming is the school?"}
        ],
        "openResponseGroups": [{"from": 6, "to": 8}],
        "positivePrompt": "What works?",
        "improvementPrompt": "What to improve?",
        "scopeSentinels": [{"text": "Responses pertinent to Grammar School only", "context": "Grammar School"}],
        "bandBackfills": [{"columns": {"from": 4, "to": 6}, "placeholder": "Response", "context": "High School"}],
        "expectations": [
            {"columns": 0, "expected": "Respondent ID", "field": "description"},
            {"columns": [4, 5], "expected": "How welcoming is the school?", "field": "description"},
            {"columns": {"from": 4, "to": 6}, "expected": "High School", "field": "context"},
            {"columns": [6], "expected": "What works?", "field": "description"}
        ],
        "respondentColumns": {"tenure": 3},
        "submissionMethods": [{"text": "One survey per family", "individuals": 2}],
        "middleAnswers": ["Welcoming"]
    }"#;

    #[test]
    fn descriptor_is_converted() {
        let inst = parse_instrument(DESCRIPTOR, "small.json").unwrap();
        assert_eq!(inst.name, "small");
        assert_eq!(inst.column_count, Some(8));
        assert_eq!(inst.open_responses.groups, vec![vec![6, 7]]);
        assert_eq!(inst.backfills[0].columns, vec![4, 5]);
        assert_eq!(inst.expectations.len(), 4);
        assert_eq!(inst.expectations[0].columns, vec![0]);
        assert_eq!(inst.expectations[2].field, ExpectedField::Context);
        assert_eq!(inst.respondent_columns.respondent_id, 0);
        assert_eq!(inst.respondent_columns.tenure, Some(3));
        assert_eq!(inst.submission_methods[0].individuals, 2);
        assert_eq!(inst.middle_answers, vec!["Welcoming".to_string()]);
    }

    #[test]
    fn shipped_instrument_is_consistent() {
        let inst = parse_instrument(
            include_str!("../../instruments/gvca_2023.json"),
            "gvca_2023.json",
        )
        .unwrap();
        assert_eq!(inst.column_count, Some(136));
        assert_eq!(inst.open_responses.groups.len(), 7);
        assert_eq!(inst.open_responses.sentinels.len(), 4);
        assert_eq!(inst.backfills[2].columns, (122..129).collect::<Vec<usize>>());
        assert_eq!(inst.expectations.len(), 24);
        assert_eq!(inst.respondent_columns.minority, Some(135));
        assert!(inst.middle_answers.is_empty());
    }

    #[test]
    fn range_with_step() {
        let spec: ColumnSpec = serde_json::from_str(r#"{"from": 2, "to": 9, "step": 3}"#).unwrap();
        assert_eq!(spec.indices(), vec![2, 5, 8]);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let js = r#"{"name": "x", "expectations": [{"columns": [0], "expected": "a", "field": "title"}]}"#;
        assert!(matches!(
            parse_instrument(js, "x.json"),
            Err(IngestError::UnknownExpectationField { .. })
        ));
    }

    #[test]
    fn inconsistent_descriptor_is_rejected() {
        let js = DESCRIPTOR.replace(
            r#""expected": "How welcoming is the school?", "field""#,
            r#""expected": "How welcoming is the  school?", "field""#,
        );
        match parse_instrument(&js, "small.json") {
            Err(IngestError::Instrument {
                source: ReshapeError::InconsistentInstrument(issues),
                ..
            }) => assert_eq!(issues.len(), 1),
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(
            parse_instrument("{\"name\": ", "x.json"),
            Err(IngestError::ParsingJson { .. })
        ));
    }

    #[test]
    fn missing_settings_carry_remediation() {
        match StoreSettings::new(Some("db.sqlite".to_string()), None) {
            Err(IngestError::MissingSetting { name, remediation }) => {
                assert_eq!(name, "DATABASE_SCHEMA");
                assert!(remediation.contains("sac_survey_202#"));
            }
            x => panic!("unexpected result {:?}", x),
        }
        assert!(StoreSettings::new(None, Some("sac_survey_2023".to_string())).is_err());
        assert!(StoreSettings::new(Some(":memory:".to_string()), Some("sac_survey_2023".to_string())).is_ok());
    }

    #[test]
    fn schema_names() {
        assert!(validate_schema_name("sac_survey_2023").is_ok());
        assert!(validate_schema_name("sac-survey").is_err());
        assert!(validate_schema_name("x; DROP TABLE questions").is_err());
        assert!(validate_schema_name("2023").is_err());
        assert!(validate_schema_name("").is_err());
    }

    #[test]
    fn input_types() {
        assert_eq!(InputType::parse(None).unwrap(), InputType::Csv);
        assert_eq!(InputType::parse(Some("xlsx")).unwrap(), InputType::Xlsx);
        assert!(InputType::parse(Some("ods")).is_err());
    }
}
