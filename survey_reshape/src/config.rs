// ********* Header and catalog structures ***********

use std::error::Error;
use std::fmt::Display;

/// The position of a column in the survey export. Column 0 is the respondent id.
pub type ColumnIndex = usize;

/// The identifier of a question in the catalog.
pub type QuestionId = i64;

/// The declared type of a catalog question.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum QuestionType {
    /// Ordinal satisfaction-style answers, converted to 1-4.
    Rank,
    /// Free text answers, stored verbatim.
    OpenResponse,
    /// Any other type present in the catalog. Such questions produce no response records.
    Other(String),
}

impl QuestionType {
    pub fn parse(s: &str) -> QuestionType {
        match s {
            "rank" => QuestionType::Rank,
            "open response" | "open_response" => QuestionType::OpenResponse,
            x => QuestionType::Other(x.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            QuestionType::Rank => "rank",
            QuestionType::OpenResponse => "open response",
            QuestionType::Other(s) => s.as_str(),
        }
    }
}

/// One row of the question catalog.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CatalogEntry {
    pub question_id: QuestionId,
    pub question_type: QuestionType,
    pub text: String,
}

/// What is known about one column of the export after reconciliation.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ColumnDescriptor {
    /// The forward-filled primary question text.
    pub description: String,
    /// The sub-header label (grade band, sub-topic, "Response", ...).
    pub context: Option<String>,
    pub question_type: Option<QuestionType>,
    pub catalog_id: Option<QuestionId>,
}

impl ColumnDescriptor {
    pub fn scope(&self) -> Option<Scope> {
        self.context.as_deref().and_then(Scope::from_context)
    }

    pub fn is_rank(&self) -> bool {
        self.question_type == Some(QuestionType::Rank)
    }
}

/// The reconciled and validated header, indexed by column position.
///
/// It can only be built by [crate::reconcile_header], which guarantees that every
/// expectation of the instrument holds.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ColumnMap {
    pub(crate) columns: Vec<ColumnDescriptor>,
}

impl ColumnMap {
    pub fn get(&self, idx: ColumnIndex) -> Option<&ColumnDescriptor> {
        self.columns.get(idx)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ColumnIndex, &ColumnDescriptor)> {
        self.columns.iter().enumerate()
    }

    /// All the columns whose description is exactly the given text, in column order.
    pub fn columns_for(&self, text: &str) -> Vec<(ColumnIndex, &ColumnDescriptor)> {
        self.iter().filter(|(_, c)| c.description == text).collect()
    }
}

/// The grade band (or the whole school) a column pertains to.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Scope {
    Grammar,
    Middle,
    High,
    WholeSchool,
}

impl Scope {
    pub const ALL: [Scope; 4] = [
        Scope::Grammar,
        Scope::Middle,
        Scope::High,
        Scope::WholeSchool,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Scope::Grammar => "Grammar School",
            Scope::Middle => "Middle School",
            Scope::High => "High School",
            Scope::WholeSchool => "Whole School",
        }
    }

    pub fn from_context(context: &str) -> Option<Scope> {
        Scope::ALL.iter().find(|s| s.label() == context).copied()
    }

    pub fn is_band(&self) -> bool {
        !matches!(self, Scope::WholeSchool)
    }
}

/// Mutually exclusive band markers attached to every response record.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct BandFlags {
    pub grammar: bool,
    pub middle: bool,
    pub high: bool,
}

impl BandFlags {
    pub fn from_scope(scope: Option<Scope>) -> BandFlags {
        BandFlags {
            grammar: scope == Some(Scope::Grammar),
            middle: scope == Some(Scope::Middle),
            high: scope == Some(Scope::High),
        }
    }
}

// ********* Instrument descriptor ***********

/// Which field of a column descriptor an expectation checks.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ExpectedField {
    Description,
    Context,
}

impl ExpectedField {
    pub fn name(&self) -> &'static str {
        match self {
            ExpectedField::Description => "question description",
            ExpectedField::Context => "question context",
        }
    }
}

/// Rewrites the description of some columns when it is exactly a known-bad text.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CorrectionRule {
    pub columns: Vec<ColumnIndex>,
    pub expected: String,
    pub replacement: String,
}

/// A page title that was used in place of the context of an open response column.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ScopeSentinel {
    pub text: String,
    pub context: String,
}

/// Open response questions laid out as two pages ("what works" then "what to improve").
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct OpenResponseLayout {
    pub groups: Vec<Vec<ColumnIndex>>,
    pub positive_prompt: String,
    pub improvement_prompt: String,
    pub sentinels: Vec<ScopeSentinel>,
}

/// Columns that cover a single band and only carry a generic placeholder as context.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct BandBackfill {
    pub columns: Vec<ColumnIndex>,
    pub placeholder: String,
    pub context: String,
}

/// The expected text of a field for a set of columns, once the header is reconciled.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Expectation {
    pub columns: Vec<ColumnIndex>,
    pub expected: String,
    pub field: ExpectedField,
}

/// Positions of the columns feeding the respondent record.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RespondentColumns {
    pub respondent_id: ColumnIndex,
    pub collector_id: ColumnIndex,
    pub start_date: ColumnIndex,
    pub end_date: ColumnIndex,
    pub submission_method: Option<ColumnIndex>,
    pub tenure: Option<ColumnIndex>,
    pub any_support: Option<ColumnIndex>,
    pub minority: Option<ColumnIndex>,
}

impl Default for RespondentColumns {
    fn default() -> Self {
        RespondentColumns {
            respondent_id: 0,
            collector_id: 1,
            start_date: 2,
            end_date: 3,
            submission_method: None,
            tenure: None,
            any_support: None,
            minority: None,
        }
    }
}

/// How a household answered the question about how many surveys it submits.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SubmissionMethod {
    pub text: String,
    pub individuals: i64,
}

/// Everything that is specific to one year of the survey.
///
/// Use [crate::builder::InstrumentBuilder] to create one.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Instrument {
    pub name: String,
    pub column_count: Option<usize>,
    pub corrections: Vec<CorrectionRule>,
    pub open_responses: OpenResponseLayout,
    pub backfills: Vec<BandBackfill>,
    pub expectations: Vec<Expectation>,
    pub respondent_columns: RespondentColumns,
    pub submission_methods: Vec<SubmissionMethod>,
    pub middle_answers: Vec<String>,
}

// ********* Output records **********

/// A value written to the store.
#[derive(PartialEq, Debug, Clone)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Scalar::Real(f)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(o: Option<T>) -> Self {
        o.map(|x| x.into()).unwrap_or(Scalar::Null)
    }
}

pub type Columns = Vec<(&'static str, Scalar)>;

/// One respondent, with demographics and averages of the ranked answers.
#[derive(PartialEq, Debug, Clone)]
pub struct RespondentRecord {
    pub respondent_id: String,
    pub collector_id: String,
    pub start_datetime: String,
    pub end_datetime: String,
    pub num_individuals_in_response: Option<i64>,
    pub tenure: Option<i64>,
    pub minority: Option<bool>,
    pub any_support: Option<bool>,
    pub grammar_avg: Option<f64>,
    pub middle_avg: Option<f64>,
    pub high_avg: Option<f64>,
    pub overall_avg: Option<f64>,
}

impl RespondentRecord {
    pub const TABLE: &'static str = "respondents";

    pub fn columns(&self) -> Columns {
        vec![
            ("respondent_id", self.respondent_id.clone().into()),
            ("collector_id", self.collector_id.clone().into()),
            ("start_datetime", self.start_datetime.clone().into()),
            ("end_datetime", self.end_datetime.clone().into()),
            (
                "num_individuals_in_response",
                self.num_individuals_in_response.into(),
            ),
            ("tenure", self.tenure.into()),
            ("minority", self.minority.into()),
            ("any_support", self.any_support.into()),
            ("grammar_avg", self.grammar_avg.into()),
            ("middle_avg", self.middle_avg.into()),
            ("high_avg", self.high_avg.into()),
            ("overall_avg", self.overall_avg.into()),
        ]
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RankedResponse {
    pub respondent_id: String,
    pub question_id: QuestionId,
    pub bands: BandFlags,
    pub response_value: u8,
}

impl RankedResponse {
    pub const TABLE: &'static str = "question_rank_responses";

    pub fn columns(&self) -> Columns {
        vec![
            ("respondent_id", self.respondent_id.clone().into()),
            ("question_id", self.question_id.into()),
            ("grammar", self.bands.grammar.into()),
            ("middle", self.bands.middle.into()),
            ("high", self.bands.high.into()),
            ("response_value", (self.response_value as i64).into()),
        ]
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct OpenResponse {
    pub respondent_id: String,
    pub question_id: QuestionId,
    pub bands: BandFlags,
    pub whole_school: bool,
    pub response: String,
}

impl OpenResponse {
    pub const TABLE: &'static str = "question_open_responses";

    pub fn columns(&self) -> Columns {
        vec![
            ("respondent_id", self.respondent_id.clone().into()),
            ("question_id", self.question_id.into()),
            ("grammar", self.bands.grammar.into()),
            ("middle", self.bands.middle.into()),
            ("high", self.bands.high.into()),
            ("whole_school", self.whole_school.into()),
            ("response", self.response.clone().into()),
        ]
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Sentiment {
    Positive,
    Negative,
}

impl Sentiment {
    pub fn parse(s: &str) -> Option<Sentiment> {
        match s {
            "positive" => Some(Sentiment::Positive),
            "negative" => Some(Sentiment::Negative),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
        }
    }
}

/// A manually curated category attached to an open response.
///
/// Unlike the other records, the band flags are not exclusive here: a tag may apply
/// to several bands when the response does not say which one it is about.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CategoryTag {
    pub question_id: QuestionId,
    pub sub_question_id: Option<String>,
    pub respondent_id: String,
    pub bands: BandFlags,
    pub category: String,
    pub sentiment: Sentiment,
}

impl CategoryTag {
    pub const TABLE: &'static str = "open_response_categories";

    pub fn columns(&self) -> Columns {
        vec![
            ("question_id", self.question_id.into()),
            ("sub_question_id", self.sub_question_id.clone().into()),
            ("respondent_id", self.respondent_id.clone().into()),
            ("grammar", self.bands.grammar.into()),
            ("middle", self.bands.middle.into()),
            ("high", self.bands.high.into()),
            ("category", self.category.clone().into()),
            ("sentiment", self.sentiment.as_str().into()),
        ]
    }
}

/// A non-empty ranked answer that matches none of the known answer forms.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct UnrecognizedAnswer {
    pub column: ColumnIndex,
    pub text: String,
}

/// Everything extracted from a single response row.
#[derive(PartialEq, Debug, Clone)]
pub struct RowRecords {
    pub respondent: RespondentRecord,
    pub ranked: Vec<RankedResponse>,
    pub open: Vec<OpenResponse>,
    pub unrecognized: Vec<UnrecognizedAnswer>,
}

// ******** Errors *********

/// One column that disagrees with the instrument after reconciliation.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ColumnMismatch {
    pub column: ColumnIndex,
    pub field: ExpectedField,
    pub expected: String,
    /// None when the column does not exist or the field is empty.
    pub actual: Option<String>,
}

/// Errors that stop an ingest before (or while) records are produced.
#[derive(PartialEq, Debug, Clone)]
pub enum ReshapeError {
    /// A column description matches several catalog entries.
    AmbiguousCatalog {
        description: String,
        question_ids: Vec<QuestionId>,
    },
    /// The reconciled header disagrees with the instrument. All the mismatches are listed.
    HeaderValidation {
        width: Option<(usize, usize)>,
        mismatches: Vec<ColumnMismatch>,
    },
    /// The instrument contradicts itself (for example a correction that produces a
    /// text that the expectations then reject).
    InconsistentInstrument(Vec<String>),
    /// The instrument cannot be used as is.
    InvalidInstrument(String),
    /// The tenure cell of a row is not a number.
    InvalidTenure { row: usize, value: String },
}

impl Error for ReshapeError {}

impl Display for ReshapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReshapeError::AmbiguousCatalog {
                description,
                question_ids,
            } => write!(
                f,
                "the question catalog is ambiguous: {:?} matches questions {:?}",
                description, question_ids
            ),
            ReshapeError::HeaderValidation { width, mismatches } => {
                write!(f, "the header does not match the instrument")?;
                if let Some((expected, actual)) = width {
                    write!(f, "\n\texpected {} columns, found {}", expected, actual)?;
                }
                for m in mismatches {
                    write!(
                        f,
                        "\n\tcolumn {}: {} is {:?}, expected {:?}",
                        m.column,
                        m.field.name(),
                        m.actual.as_deref().unwrap_or("<missing>"),
                        m.expected
                    )?;
                }
                Ok(())
            }
            ReshapeError::InconsistentInstrument(issues) => {
                write!(f, "the instrument is inconsistent")?;
                for issue in issues {
                    write!(f, "\n\t{}", issue)?;
                }
                Ok(())
            }
            ReshapeError::InvalidInstrument(msg) => write!(f, "invalid instrument: {}", msg),
            ReshapeError::InvalidTenure { row, value } => {
                write!(f, "row {}: tenure {:?} is not a number", row, value)
            }
        }
    }
}
