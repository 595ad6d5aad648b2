// Primitives for reading CSV files.

use std::fs::File;
use std::io::Read;

use serde::Deserialize;

use crate::ingest::{io_common::split_header, *};

/// Reads a survey export. Records may have different lengths.
pub fn read_survey(path: &str) -> BIngestResult<RawSurvey> {
    let file = File::open(path)
        .map_err(csv::Error::from)
        .context(CsvReadSnafu { path })?;
    Ok(read_survey_from(file, path)?)
}

pub fn read_survey_from<R: Read>(input: R, path: &str) -> IngestResult<RawSurvey> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input);
    collect_survey(rdr, path)
}

fn collect_survey<R: Read>(mut rdr: csv::Reader<R>, path: &str) -> IngestResult<RawSurvey> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    for line_r in rdr.records() {
        let line = line_r.context(CsvReadSnafu { path })?;
        rows.push(line.iter().map(|s| s.to_string()).collect());
    }
    split_header(rows, path)
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    question_id: QuestionId,
    question_type: String,
    question_text: String,
}

/// Reads a question catalog: question_id,question_type,question_text
pub fn read_catalog(path: &str) -> BIngestResult<Vec<CatalogEntry>> {
    let rdr = csv::Reader::from_path(path).context(CsvReadSnafu { path })?;
    Ok(collect_catalog(rdr, path)?)
}

fn collect_catalog<R: Read>(mut rdr: csv::Reader<R>, path: &str) -> IngestResult<Vec<CatalogEntry>> {
    let mut res: Vec<CatalogEntry> = Vec::new();
    for row_r in rdr.deserialize() {
        let row: CatalogRow = row_r.context(CsvReadSnafu { path })?;
        res.push(CatalogEntry {
            question_id: row.question_id,
            question_type: QuestionType::parse(row.question_type.trim()),
            text: row.question_text,
        });
    }
    debug!("read_catalog: {}: {} questions", path, res.len());
    Ok(res)
}

#[derive(Debug, Deserialize)]
struct CategoryRow {
    question_id: QuestionId,
    sub_question_id: Option<String>,
    respondent_id: String,
    grammar: String,
    middle: String,
    high: String,
    category: String,
    sentiment: String,
}

fn parse_flag(s: &str, path: &str, lineno: u64) -> IngestResult<bool> {
    match s.trim().to_lowercase().as_str() {
        "" | "0" | "f" | "false" | "no" => Ok(false),
        "1" | "t" | "true" | "yes" => Ok(true),
        x => InvalidRecordSnafu {
            path,
            lineno,
            message: format!("{:?} is not a boolean", x),
        }
        .fail(),
    }
}

/// Reads the manually curated categories:
/// question_id,sub_question_id,respondent_id,grammar,middle,high,category,sentiment
pub fn read_categories(path: &str) -> BIngestResult<Vec<CategoryTag>> {
    let rdr = csv::Reader::from_path(path).context(CsvReadSnafu { path })?;
    Ok(collect_categories(rdr, path)?)
}

fn collect_categories<R: Read>(
    mut rdr: csv::Reader<R>,
    path: &str,
) -> IngestResult<Vec<CategoryTag>> {
    let mut res: Vec<CategoryTag> = Vec::new();
    for (idx, row_r) in rdr.deserialize().enumerate() {
        // The header is line 1.
        let lineno = idx as u64 + 2;
        let row: CategoryRow = row_r.context(CsvReadSnafu { path })?;
        let sentiment = Sentiment::parse(row.sentiment.trim()).context(InvalidRecordSnafu {
            path,
            lineno,
            message: format!(
                "sentiment {:?} should be positive or negative",
                row.sentiment
            ),
        })?;
        res.push(CategoryTag {
            question_id: row.question_id,
            sub_question_id: row.sub_question_id.filter(|s| !s.trim().is_empty()),
            respondent_id: row.respondent_id,
            bands: BandFlags {
                grammar: parse_flag(&row.grammar, path, lineno)?,
                middle: parse_flag(&row.middle, path, lineno)?,
                high: parse_flag(&row.high, path, lineno)?,
            },
            category: row.category,
            sentiment,
        });
    }
    debug!("read_categories: {}: {} tags", path, res.len());
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(data: &str) -> csv::Reader<&[u8]> {
        csv::Reader::from_reader(data.as_bytes())
    }

    #[test]
    fn survey_with_ragged_rows() {
        let data = "\
Respondent ID,Collector ID,How welcoming is the school community?,
,,Grammar School,High School
101,9,Extremely welcoming
102,9,,\"Not welcoming, sadly\"
";
        let s = read_survey_from(data.as_bytes(), "survey.csv").unwrap();
        assert_eq!(s.header.len(), 4);
        assert_eq!(s.header[3], "");
        assert_eq!(s.sub_header[2], "Grammar School");
        assert_eq!(s.rows.len(), 2);
        assert_eq!(s.rows[0].len(), 3);
        assert_eq!(s.rows[1][3], "Not welcoming, sadly");
    }

    #[test]
    fn survey_without_sub_header() {
        let data = "Respondent ID,Collector ID\n";
        assert!(matches!(
            read_survey_from(data.as_bytes(), "survey.csv"),
            Err(IngestError::MissingHeader { .. })
        ));
    }

    #[test]
    fn catalog() {
        let data = "\
question_id,question_type,question_text
1,rank,How welcoming is the school community?
2,open response,\"What makes GVCA a good choice for you and your family?\"
3,demographic,How many years have you been at GVCA?
";
        let c = collect_catalog(reader(data), "questions.csv").unwrap();
        assert_eq!(c.len(), 3);
        assert_eq!(c[0].question_type, QuestionType::Rank);
        assert_eq!(c[1].question_type, QuestionType::OpenResponse);
        assert_eq!(c[2].question_type, QuestionType::Other("demographic".to_string()));
    }

    #[test]
    fn catalog_with_bad_id() {
        let data = "question_id,question_type,question_text\nabc,rank,Something\n";
        assert!(matches!(
            collect_catalog(reader(data), "questions.csv"),
            Err(IngestError::CsvRead { .. })
        ));
    }

    #[test]
    fn categories() {
        let data = "\
question_id,sub_question_id,respondent_id,grammar,middle,high,category,sentiment
8,,101,true,false,false,Teachers,positive
8,a,102,1,1,0,Communication,negative
";
        let tags = collect_categories(reader(data), "categories.csv").unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].sub_question_id, None);
        assert!(tags[0].bands.grammar && !tags[0].bands.middle);
        assert_eq!(tags[1].sub_question_id.as_deref(), Some("a"));
        assert!(tags[1].bands.grammar && tags[1].bands.middle && !tags[1].bands.high);
        assert_eq!(tags[1].sentiment, Sentiment::Negative);
    }

    #[test]
    fn categories_with_bad_sentiment() {
        let data = "\
question_id,sub_question_id,respondent_id,grammar,middle,high,category,sentiment
8,,101,true,false,false,Teachers,positive
8,,102,true,false,false,Teachers,neutral
";
        match collect_categories(reader(data), "categories.csv") {
            Err(IngestError::InvalidRecord { lineno, .. }) => assert_eq!(lineno, 3),
            x => panic!("unexpected result {:?}", x),
        }
    }
}
