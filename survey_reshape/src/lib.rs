/*!
Reshaping of wide-format survey exports into normalized records.

A survey export has one row per respondent and one column per question (or
sub-question). The header is made of two rows written by hand at survey design
time: blank cells mean "same question as the previous column" and the second row
carries a context (grade band, sub-topic) whose meaning depends on the position.

This crate does two things:
- [reconcile_header] turns the two header rows into a validated [ColumnMap], using an
  [Instrument] (the description of one year of the survey) and the question catalog.
- [decompose_row] splits each response row into one [RespondentRecord], ranked
  responses and open responses.

The crate performs no I/O. See the [manual] for the format of instrument descriptors.
*/

mod config;
mod header;
mod rows;

pub mod builder;
pub mod manual;

pub use crate::config::*;
pub use crate::header::{
    apply_corrections, attach_catalog, backfill_band_context, forward_fill,
    infer_open_response_groups, is_positive_position, reconcile_header, validate_columns,
};
pub use crate::rows::{
    build_respondent, convert_to_bool, convert_to_ordinal, decompose_row, extract_open,
    extract_ranked, AnswerScale, Ordinal,
};
