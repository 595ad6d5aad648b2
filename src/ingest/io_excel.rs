// Reading of survey exports saved as Excel workbooks.

use calamine::{open_workbook, DataType, Range, Reader, Xlsx};

use crate::ingest::{io_common::split_header, *};

pub fn read_survey(path: &str, worksheet_name: Option<&str>) -> BIngestResult<RawSurvey> {
    let wrange = get_range(path, worksheet_name)?;
    let rows: Vec<Vec<String>> = wrange
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();
    debug!("read_survey: {}: {} rows", path, rows.len());
    Ok(split_header(rows, path)?)
}

/// The text of a cell, as it would appear in a CSV export.
pub fn cell_text(cell: &DataType) -> String {
    match cell {
        DataType::Empty => "".to_string(),
        DataType::String(s) => s.clone(),
        DataType::Int(i) => i.to_string(),
        DataType::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        DataType::Float(f) => f.to_string(),
        DataType::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn get_range(path: &str, worksheet_name: Option<&str>) -> BIngestResult<Range<DataType>> {
    debug!("get_range: path: {:?} worksheet: {:?}", path, worksheet_name);
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;

    // A worksheet name was provided, use it.
    if let Some(worksheet) = worksheet_name {
        let wrange = workbook
            .worksheet_range(worksheet)
            .context(MissingWorksheetSnafu { path, worksheet })?
            .context(OpeningExcelSnafu { path })?;
        return Ok(wrange);
    }
    // Otherwise the responses are on the first worksheet.
    if let Some(first) = workbook.sheet_names().first() {
        info!("Using worksheet {:?} of {}", first, path);
    }
    let wrange = workbook
        .worksheet_range_at(0)
        .context(EmptyWorkbookSnafu { path })?
        .context(OpeningExcelSnafu { path })?;
    Ok(wrange)
}
