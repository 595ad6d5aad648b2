use crate::ingest::*;

use std::path::Path;

/// The content of a survey export: the two header rows and the response rows, as text.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RawSurvey {
    pub header: Vec<String>,
    pub sub_header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Splits the rows of a file into the two header rows and the responses.
pub fn split_header(mut rows: Vec<Vec<String>>, path: &str) -> IngestResult<RawSurvey> {
    ensure!(rows.len() >= 2, MissingHeaderSnafu { path });
    let responses = rows.split_off(2);
    let sub_header = rows.pop().unwrap_or_default();
    let header = rows.pop().unwrap_or_default();
    debug!(
        "split_header: {}: {} header columns, {} sub-header columns, {} rows",
        simplify_file_name(path),
        header.len(),
        sub_header.len(),
        responses.len()
    );
    Ok(RawSurvey {
        header,
        sub_header,
        rows: responses,
    })
}

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> Vec<Vec<String>> {
        (0..n).map(|i| vec![format!("r{}", i)]).collect()
    }

    #[test]
    fn header_rows_are_split() {
        let s = split_header(rows(4), "data/survey.csv").unwrap();
        assert_eq!(s.header, vec!["r0".to_string()]);
        assert_eq!(s.sub_header, vec!["r1".to_string()]);
        assert_eq!(s.rows.len(), 2);
    }

    #[test]
    fn header_without_responses() {
        let s = split_header(rows(2), "survey.csv").unwrap();
        assert!(s.rows.is_empty());
    }

    #[test]
    fn missing_sub_header() {
        assert!(matches!(
            split_header(rows(1), "survey.csv"),
            Err(IngestError::MissingHeader { .. })
        ));
    }

    #[test]
    fn file_names() {
        assert_eq!(simplify_file_name("/tmp/data/survey.csv"), "survey.csv");
        assert_eq!(simplify_file_name("survey.csv"), "survey.csv");
    }
}
