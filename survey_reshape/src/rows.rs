// Decomposition of one response row into normalized records.

use log::debug;

use crate::config::*;

/// Converts an answer to the 1-4 scale.
///
/// The check is a case-sensitive prefix match: "Extremely ..." and "Strongly ..." are 4,
/// "Somewhat ..." is 2, "Not ..." is 1, the empty string has no value and anything else
/// is the unqualified middle answer (3).
pub fn convert_to_ordinal(value: &str) -> Option<u8> {
    if value.starts_with("Extremely") || value.starts_with("Strongly") {
        return Some(4);
    }
    if value.starts_with("Somewhat") {
        return Some(2);
    }
    if value.starts_with("Not") {
        return Some(1);
    }
    if value.is_empty() {
        return None;
    }
    Some(3)
}

/// "Yes" and "No" only. Anything else is unknown.
pub fn convert_to_bool(value: &str) -> Option<bool> {
    match value {
        "Yes" => Some(true),
        "No" => Some(false),
        _ => None,
    }
}

/// The outcome of reading one ranked answer.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Ordinal {
    Empty,
    Score(u8),
    Unrecognized,
}

/// The answer scale of an instrument.
///
/// Without declared middle answers, every non-empty text is scored (the middle score
/// absorbs unknown text). With them, unknown text is reported as unrecognized.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct AnswerScale {
    middle_answers: Vec<String>,
}

impl AnswerScale {
    pub fn new(middle_answers: &[String]) -> AnswerScale {
        AnswerScale {
            middle_answers: middle_answers.to_vec(),
        }
    }

    pub fn classify(&self, value: &str) -> Ordinal {
        match convert_to_ordinal(value) {
            None => Ordinal::Empty,
            Some(3) if !self.middle_answers.is_empty() => {
                if self.middle_answers.iter().any(|m| m == value) {
                    Ordinal::Score(3)
                } else {
                    Ordinal::Unrecognized
                }
            }
            Some(x) => Ordinal::Score(x),
        }
    }
}

impl Instrument {
    pub fn answer_scale(&self) -> AnswerScale {
        AnswerScale::new(&self.middle_answers)
    }
}

fn cell(row: &[String], idx: ColumnIndex) -> &str {
    row.get(idx).map(|s| s.as_str()).unwrap_or("")
}

fn average(values: &[u8]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        let total: u32 = values.iter().map(|v| *v as u32).sum();
        Some(total as f64 / values.len() as f64)
    }
}

/// Builds the respondent record of a row, and collects the ranked answers that could
/// not be scored.
pub fn build_respondent(
    row_index: usize,
    row: &[String],
    columns: &ColumnMap,
    instrument: &Instrument,
    scale: &AnswerScale,
) -> Result<(RespondentRecord, Vec<UnrecognizedAnswer>), ReshapeError> {
    let mut grammar: Vec<u8> = Vec::new();
    let mut middle: Vec<u8> = Vec::new();
    let mut high: Vec<u8> = Vec::new();
    let mut unrecognized: Vec<UnrecognizedAnswer> = Vec::new();

    for (idx, c) in columns.iter().filter(|(_, c)| c.is_rank()) {
        let value = cell(row, idx);
        let score = match scale.classify(value) {
            Ordinal::Empty => continue,
            Ordinal::Unrecognized => {
                unrecognized.push(UnrecognizedAnswer {
                    column: idx,
                    text: value.to_string(),
                });
                continue;
            }
            Ordinal::Score(x) => x,
        };
        match c.scope() {
            Some(Scope::Grammar) => grammar.push(score),
            Some(Scope::Middle) => middle.push(score),
            Some(Scope::High) => high.push(score),
            _ => {}
        }
    }
    let all: Vec<u8> = grammar
        .iter()
        .chain(middle.iter())
        .chain(high.iter())
        .cloned()
        .collect();

    let rc = &instrument.respondent_columns;
    let num_individuals_in_response = rc.submission_method.and_then(|idx| {
        let value = cell(row, idx);
        instrument
            .submission_methods
            .iter()
            .find(|m| m.text == value)
            .map(|m| m.individuals)
    });
    let tenure = match rc.tenure.map(|idx| cell(row, idx).trim()) {
        None | Some("") => None,
        Some(s) => Some(s.parse::<i64>().map_err(|_| ReshapeError::InvalidTenure {
            row: row_index,
            value: s.to_string(),
        })?),
    };

    let record = RespondentRecord {
        respondent_id: cell(row, rc.respondent_id).to_string(),
        collector_id: cell(row, rc.collector_id).to_string(),
        start_datetime: cell(row, rc.start_date).to_string(),
        end_datetime: cell(row, rc.end_date).to_string(),
        num_individuals_in_response,
        tenure,
        minority: rc.minority.and_then(|idx| convert_to_bool(cell(row, idx))),
        any_support: rc.any_support.and_then(|idx| convert_to_bool(cell(row, idx))),
        grammar_avg: average(&grammar),
        middle_avg: average(&middle),
        high_avg: average(&high),
        overall_avg: average(&all),
    };
    Ok((record, unrecognized))
}

/// One record per band column of the question that has a scored answer in this row.
pub fn extract_ranked(
    respondent_id: &str,
    question: &CatalogEntry,
    row: &[String],
    columns: &ColumnMap,
    scale: &AnswerScale,
) -> Vec<RankedResponse> {
    let mut res: Vec<RankedResponse> = Vec::new();
    for (idx, c) in columns.columns_for(&question.text) {
        if let Ordinal::Score(response_value) = scale.classify(cell(row, idx)) {
            debug!(
                "extract_ranked: question {} column {} {:?}: {}",
                question.question_id, idx, c.context, response_value
            );
            res.push(RankedResponse {
                respondent_id: respondent_id.to_string(),
                question_id: question.question_id,
                bands: BandFlags::from_scope(c.scope()),
                response_value,
            });
        }
    }
    res
}

/// One record per column of the question with a non-empty text in this row.
pub fn extract_open(
    respondent_id: &str,
    question: &CatalogEntry,
    row: &[String],
    columns: &ColumnMap,
) -> Vec<OpenResponse> {
    let mut res: Vec<OpenResponse> = Vec::new();
    for (idx, c) in columns.columns_for(&question.text) {
        let value = cell(row, idx);
        if value.is_empty() {
            continue;
        }
        let scope = c.scope();
        debug!(
            "extract_open: question {} column {} {:?}",
            question.question_id, idx, c.context
        );
        res.push(OpenResponse {
            respondent_id: respondent_id.to_string(),
            question_id: question.question_id,
            bands: BandFlags::from_scope(scope),
            whole_school: scope == Some(Scope::WholeSchool),
            response: value.to_string(),
        });
    }
    res
}

/// Splits one response row into its respondent record and the response records of
/// every catalog question.
pub fn decompose_row(
    row_index: usize,
    row: &[String],
    columns: &ColumnMap,
    catalog: &[CatalogEntry],
    instrument: &Instrument,
) -> Result<RowRecords, ReshapeError> {
    let scale = instrument.answer_scale();
    let (respondent, unrecognized) = build_respondent(row_index, row, columns, instrument, &scale)?;

    let mut ranked: Vec<RankedResponse> = Vec::new();
    let mut open: Vec<OpenResponse> = Vec::new();
    for question in catalog.iter() {
        match question.question_type {
            QuestionType::Rank => ranked.extend(extract_ranked(
                &respondent.respondent_id,
                question,
                row,
                columns,
                &scale,
            )),
            QuestionType::OpenResponse => open.extend(extract_open(
                &respondent.respondent_id,
                question,
                row,
                columns,
            )),
            QuestionType::Other(_) => {}
        }
    }
    debug!(
        "decompose_row: row {}: respondent {:?}: {} ranked, {} open, {} unrecognized",
        row_index,
        respondent.respondent_id,
        ranked.len(),
        open.len(),
        unrecognized.len()
    );
    Ok(RowRecords {
        respondent,
        ranked,
        open,
        unrecognized,
    })
}
