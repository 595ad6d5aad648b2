// Reconciliation of the two header rows into a validated column map.

use log::{debug, info, warn};
use std::collections::HashMap;

use crate::config::*;

/// Builds one descriptor per column. A blank primary cell means "same question as the
/// previous column" (merged cells in the source spreadsheet).
pub fn forward_fill(header: &[String], sub_header: &[String]) -> Vec<ColumnDescriptor> {
    let width = header.len().max(sub_header.len());
    let mut current_question = String::new();
    let mut res: Vec<ColumnDescriptor> = Vec::with_capacity(width);
    for idx in 0..width {
        let question = header.get(idx).map(|s| s.as_str()).unwrap_or("");
        if !question.is_empty() {
            current_question = question.to_string();
        }
        let context = match sub_header.get(idx) {
            Some(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        };
        res.push(ColumnDescriptor {
            description: current_question.clone(),
            context,
            question_type: None,
            catalog_id: None,
        });
    }
    res
}

/// Replaces known-bad descriptions. A rule only touches a column whose description is
/// exactly the expected text.
pub fn apply_corrections(columns: &mut [ColumnDescriptor], rules: &[CorrectionRule]) {
    for rule in rules.iter() {
        for idx in rule.columns.iter() {
            match columns.get_mut(*idx) {
                Some(c) if c.description == rule.expected => {
                    debug!("apply_corrections: column {}: {:?}", idx, rule.replacement);
                    c.description = rule.replacement.clone();
                }
                Some(_) => {}
                None => {
                    warn!("apply_corrections: column {} is beyond the header", idx);
                }
            }
        }
    }
}

/// Whether the column at this position of a group gets the positive prompt.
/// The middle column of an odd group stays with the first half.
pub fn is_positive_position(position: usize, group_len: usize) -> bool {
    2 * position < group_len
}

/// Fixes the open response pages, where the page title ended up as the question text
/// and the question text as the context.
pub fn infer_open_response_groups(columns: &mut [ColumnDescriptor], layout: &OpenResponseLayout) {
    for group in layout.groups.iter() {
        for (position, idx) in group.iter().enumerate() {
            let c = match columns.get_mut(*idx) {
                Some(c) => c,
                None => {
                    warn!(
                        "infer_open_response_groups: column {} is beyond the header",
                        idx
                    );
                    continue;
                }
            };
            if let Some(sentinel) = layout.sentinels.iter().find(|s| s.text == c.description) {
                c.context = Some(sentinel.context.clone());
            }
            c.description = if is_positive_position(position, group.len()) {
                layout.positive_prompt.clone()
            } else {
                layout.improvement_prompt.clone()
            };
            debug!(
                "infer_open_response_groups: column {}: {:?} {:?}",
                idx, c.description, c.context
            );
        }
    }
}

/// Single-band questions were exported without a matrix, so their context is only a
/// placeholder. Replace it with the band.
pub fn backfill_band_context(columns: &mut [ColumnDescriptor], backfills: &[BandBackfill]) {
    for backfill in backfills.iter() {
        for idx in backfill.columns.iter() {
            if let Some(c) = columns.get_mut(*idx) {
                if c.context.as_deref() == Some(backfill.placeholder.as_str()) {
                    c.context = Some(backfill.context.clone());
                }
            }
        }
    }
}

/// Attaches the catalog identifier and type to every column whose description is
/// exactly the text of a catalog question.
pub fn attach_catalog(
    columns: &mut [ColumnDescriptor],
    catalog: &[CatalogEntry],
) -> Result<(), ReshapeError> {
    let mut by_text: HashMap<&str, Vec<&CatalogEntry>> = HashMap::new();
    for entry in catalog.iter() {
        by_text.entry(entry.text.as_str()).or_default().push(entry);
    }
    for (idx, c) in columns.iter_mut().enumerate() {
        match by_text.get(c.description.as_str()).map(|v| v.as_slice()) {
            None | Some([]) => {
                debug!("attach_catalog: column {}: no catalog entry", idx);
            }
            Some([entry]) => {
                c.catalog_id = Some(entry.question_id);
                c.question_type = Some(entry.question_type.clone());
            }
            Some(entries) => {
                return Err(ReshapeError::AmbiguousCatalog {
                    description: c.description.clone(),
                    question_ids: entries.iter().map(|e| e.question_id).collect(),
                });
            }
        }
    }
    Ok(())
}

/// Checks every expectation of the instrument and reports all the mismatches.
pub fn validate_columns(
    columns: &[ColumnDescriptor],
    instrument: &Instrument,
) -> Result<(), ReshapeError> {
    let width = match instrument.column_count {
        Some(count) if count != columns.len() => Some((count, columns.len())),
        _ => None,
    };

    let mut mismatches: Vec<ColumnMismatch> = Vec::new();
    for e in instrument.expectations.iter() {
        for idx in e.columns.iter() {
            let actual: Option<String> = columns.get(*idx).and_then(|c| match e.field {
                ExpectedField::Description => Some(c.description.clone()),
                ExpectedField::Context => c.context.clone(),
            });
            if actual.as_deref() != Some(e.expected.as_str()) {
                mismatches.push(ColumnMismatch {
                    column: *idx,
                    field: e.field,
                    expected: e.expected.clone(),
                    actual,
                });
            }
        }
    }

    if width.is_none() && mismatches.is_empty() {
        Ok(())
    } else {
        mismatches.sort_by_key(|m| m.column);
        Err(ReshapeError::HeaderValidation { width, mismatches })
    }
}

/// Runs the whole reconciliation: forward fill, corrections, open response pages,
/// band backfill, catalog attachment and validation.
pub fn reconcile_header(
    header: &[String],
    sub_header: &[String],
    instrument: &Instrument,
    catalog: &[CatalogEntry],
) -> Result<ColumnMap, ReshapeError> {
    info!(
        "Reconciling {} header columns with instrument {:?}",
        header.len(),
        instrument.name
    );
    let mut columns = forward_fill(header, sub_header);
    apply_corrections(&mut columns, &instrument.corrections);
    infer_open_response_groups(&mut columns, &instrument.open_responses);
    backfill_band_context(&mut columns, &instrument.backfills);
    attach_catalog(&mut columns, catalog)?;
    validate_columns(&columns, instrument)?;

    let resolved = columns.iter().filter(|c| c.catalog_id.is_some()).count();
    info!(
        "Header reconciled: {} columns, {} linked to the catalog",
        columns.len(),
        resolved
    );
    Ok(ColumnMap { columns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::InstrumentBuilder;

    const POSITIVE: &str = "What makes GVCA a good choice for you and your family?";
    const IMPROVE: &str =
        "Please provide us with examples of how GVCA can better serve you and your family.";
    const WELCOMING: &str = "How welcoming is the school community?";

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn column(description: &str, context: Option<&str>) -> ColumnDescriptor {
        ColumnDescriptor {
            description: description.to_string(),
            context: context.map(|s| s.to_string()),
            question_type: None,
            catalog_id: None,
        }
    }

    fn catalog() -> Vec<CatalogEntry> {
        vec![
            CatalogEntry {
                question_id: 7,
                question_type: QuestionType::Rank,
                text: WELCOMING.to_string(),
            },
            CatalogEntry {
                question_id: 8,
                question_type: QuestionType::OpenResponse,
                text: POSITIVE.to_string(),
            },
            CatalogEntry {
                question_id: 9,
                question_type: QuestionType::OpenResponse,
                text: IMPROVE.to_string(),
            },
        ]
    }

    #[test]
    fn forward_fill_propagates_blank_cells() {
        let cols = forward_fill(
            &strings(&["Respondent ID", "Q1", "", "", "Q2"]),
            &strings(&["", "Grammar School", "Middle School", "High School", "Response"]),
        );
        let descriptions: Vec<&str> = cols.iter().map(|c| c.description.as_str()).collect();
        assert_eq!(descriptions, vec!["Respondent ID", "Q1", "Q1", "Q1", "Q2"]);
        assert_eq!(cols[0].context, None);
        assert_eq!(cols[2].context.as_deref(), Some("Middle School"));
    }

    #[test]
    fn forward_fill_pads_short_sub_header() {
        let cols = forward_fill(&strings(&["A", "", "B"]), &strings(&["x"]));
        assert_eq!(cols.len(), 3);
        assert_eq!(cols[1].description, "A");
        assert_eq!(cols[2].context, None);
    }

    #[test]
    fn corrections_only_touch_listed_columns_with_bad_text() {
        let bad = "Given your childrenâ€™s education level";
        let good = "Given your children's education level";
        let mut cols = vec![
            column(bad, None),
            column(bad, None),
            column("Other", None),
            column(bad, None),
        ];
        let rules = vec![CorrectionRule {
            columns: vec![0, 1, 2],
            expected: bad.to_string(),
            replacement: good.to_string(),
        }];
        apply_corrections(&mut cols, &rules);
        assert_eq!(cols[0].description, good);
        assert_eq!(cols[1].description, good);
        assert_eq!(cols[2].description, "Other");
        assert_eq!(cols[3].description, bad);

        // Applying the rules again changes nothing.
        let before = cols.clone();
        apply_corrections(&mut cols, &rules);
        assert_eq!(cols, before);
    }

    fn layout(groups: Vec<Vec<usize>>) -> OpenResponseLayout {
        OpenResponseLayout {
            groups,
            positive_prompt: POSITIVE.to_string(),
            improvement_prompt: IMPROVE.to_string(),
            sentinels: vec![
                ScopeSentinel {
                    text: "Responses pertinent to Grammar School only".to_string(),
                    context: "Grammar School".to_string(),
                },
                ScopeSentinel {
                    text: "Responses generic to the whole school.".to_string(),
                    context: "Whole School".to_string(),
                },
            ],
        }
    }

    #[test]
    fn open_response_groups_split_at_midpoint() {
        for len in [2usize, 4, 5, 6, 7, 8] {
            let mut cols: Vec<ColumnDescriptor> =
                (0..len).map(|_| column("Page title", None)).collect();
            infer_open_response_groups(&mut cols, &layout(vec![(0..len).collect()]));
            let positives = cols.iter().filter(|c| c.description == POSITIVE).count();
            assert_eq!(positives, (len + 1) / 2, "group of length {}", len);
            for (i, c) in cols.iter().enumerate() {
                let expected = if i < (len + 1) / 2 { POSITIVE } else { IMPROVE };
                assert_eq!(c.description, expected, "length {} position {}", len, i);
            }
        }
    }

    #[test]
    fn open_response_sentinels_become_context() {
        let mut cols = vec![
            column("Responses pertinent to Grammar School only", Some("Grammar School")),
            column("Responses generic to the whole school.", Some("What works")),
            column("Responses pertinent to Grammar School only", None),
            column("Something else", Some("Kept")),
        ];
        infer_open_response_groups(&mut cols, &layout(vec![vec![0, 1, 2, 3]]));
        assert_eq!(cols[0].context.as_deref(), Some("Grammar School"));
        assert_eq!(cols[1].context.as_deref(), Some("Whole School"));
        assert_eq!(cols[2].context.as_deref(), Some("Grammar School"));
        assert_eq!(cols[3].context.as_deref(), Some("Kept"));
        assert_eq!(cols[1].description, POSITIVE);
        assert_eq!(cols[2].description, IMPROVE);
    }

    #[test]
    fn open_response_groups_follow_list_order() {
        let mut cols: Vec<ColumnDescriptor> = (0..4).map(|_| column("t", None)).collect();
        infer_open_response_groups(&mut cols, &layout(vec![vec![3, 2, 1, 0]]));
        assert_eq!(cols[3].description, POSITIVE);
        assert_eq!(cols[2].description, POSITIVE);
        assert_eq!(cols[1].description, IMPROVE);
        assert_eq!(cols[0].description, IMPROVE);
    }

    #[test]
    fn backfill_only_replaces_placeholder() {
        let mut cols = vec![
            column("Q", Some("Response")),
            column("Q", Some("Middle School")),
            column("Q", None),
            column("Q", Some("Response")),
        ];
        let backfills = vec![BandBackfill {
            columns: vec![0, 1, 2],
            placeholder: "Response".to_string(),
            context: "Grammar School".to_string(),
        }];
        backfill_band_context(&mut cols, &backfills);
        assert_eq!(cols[0].context.as_deref(), Some("Grammar School"));
        assert_eq!(cols[1].context.as_deref(), Some("Middle School"));
        assert_eq!(cols[2].context, None);
        assert_eq!(cols[3].context.as_deref(), Some("Response"));
    }

    #[test]
    fn catalog_attachment() {
        let mut cols = vec![column("Respondent ID", None), column(WELCOMING, None)];
        attach_catalog(&mut cols, &catalog()).unwrap();
        assert_eq!(cols[0].catalog_id, None);
        assert_eq!(cols[0].question_type, None);
        assert_eq!(cols[1].catalog_id, Some(7));
        assert_eq!(cols[1].question_type, Some(QuestionType::Rank));
    }

    #[test]
    fn ambiguous_catalog_names_the_description() {
        let mut entries = catalog();
        entries.push(CatalogEntry {
            question_id: 70,
            question_type: QuestionType::Rank,
            text: WELCOMING.to_string(),
        });
        let mut cols = vec![column(WELCOMING, None)];
        let res = attach_catalog(&mut cols, &entries);
        assert_eq!(
            res,
            Err(ReshapeError::AmbiguousCatalog {
                description: WELCOMING.to_string(),
                question_ids: vec![7, 70],
            })
        );
    }

    fn small_instrument() -> Instrument {
        InstrumentBuilder::new("small")
            .column_count(4)
            .expect_description(&[0], "Respondent ID")
            .expect_description(&[1, 2, 3], WELCOMING)
            .expect_context(&[1], "Grammar School")
            .expect_context(&[2], "Middle School")
            .expect_context(&[3], "High School")
            .build()
            .unwrap()
    }

    fn small_columns() -> Vec<ColumnDescriptor> {
        vec![
            column("Respondent ID", None),
            column(WELCOMING, Some("Grammar School")),
            column(WELCOMING, Some("Middle School")),
            column(WELCOMING, Some("High School")),
        ]
    }

    #[test]
    fn validation_passes_on_matching_columns() {
        assert_eq!(validate_columns(&small_columns(), &small_instrument()), Ok(()));
    }

    #[test]
    fn validation_names_exactly_the_altered_column() {
        let mut cols = small_columns();
        cols[2].description = "How welcoming is the school?".to_string();
        match validate_columns(&cols, &small_instrument()) {
            Err(ReshapeError::HeaderValidation { width, mismatches }) => {
                assert_eq!(width, None);
                assert_eq!(mismatches.len(), 1);
                assert_eq!(mismatches[0].column, 2);
                assert_eq!(mismatches[0].field, ExpectedField::Description);
                assert_eq!(
                    mismatches[0].actual.as_deref(),
                    Some("How welcoming is the school?")
                );
            }
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[test]
    fn validation_reports_every_mismatch() {
        // A shifted layout breaks many columns at once.
        let mut cols = small_columns();
        cols.insert(1, column("Collector ID", None));
        match validate_columns(&cols, &small_instrument()) {
            Err(ReshapeError::HeaderValidation { width, mismatches }) => {
                assert_eq!(width, Some((4, 5)));
                let failed: Vec<(usize, ExpectedField)> =
                    mismatches.iter().map(|m| (m.column, m.field)).collect();
                assert_eq!(
                    failed,
                    vec![
                        (1, ExpectedField::Description),
                        (1, ExpectedField::Context),
                        (2, ExpectedField::Context),
                        (3, ExpectedField::Context),
                    ]
                );
            }
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[test]
    fn validation_reports_missing_columns() {
        let cols = small_columns()[..2].to_vec();
        let instrument = InstrumentBuilder::new("no width")
            .expect_description(&[0], "Respondent ID")
            .expect_description(&[1, 2, 3], WELCOMING)
            .build()
            .unwrap();
        match validate_columns(&cols, &instrument) {
            Err(ReshapeError::HeaderValidation { mismatches, .. }) => {
                let missing: Vec<usize> = mismatches.iter().map(|m| m.column).collect();
                assert_eq!(missing, vec![2, 3]);
                assert!(mismatches.iter().all(|m| m.actual.is_none()));
            }
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[test]
    fn reconcile_end_to_end() {
        init();
        let instrument = InstrumentBuilder::new("e2e")
            .column_count(6)
            .correction(
                &[1],
                "How welcoming is the school communty?",
                WELCOMING,
            )
            .band_backfill(&[1], "Response", "Grammar School")
            .open_response_prompts(POSITIVE, IMPROVE)
            .scope_sentinel("Responses pertinent to Grammar School only", "Grammar School")
            .scope_sentinel("Responses generic to the whole school.", "Whole School")
            .open_response_group(&[2, 3, 4, 5])
            .expect_description(&[0], "Respondent ID")
            .expect_description(&[1], WELCOMING)
            .expect_description(&[2, 3], POSITIVE)
            .expect_description(&[4, 5], IMPROVE)
            .expect_context(&[1, 2, 4], "Grammar School")
            .expect_context(&[3, 5], "Whole School")
            .build()
            .unwrap();
        let header = strings(&[
            "Respondent ID",
            "How welcoming is the school communty?",
            "Responses pertinent to Grammar School only",
            "Responses generic to the whole school.",
            "Responses pertinent to Grammar School only",
            "Responses generic to the whole school.",
        ]);
        let sub_header = strings(&[
            "",
            "Response",
            "What is going well?",
            "What is going well?",
            "What could be better?",
            "What could be better?",
        ]);
        let map = reconcile_header(&header, &sub_header, &instrument, &catalog()).unwrap();
        assert_eq!(map.len(), 6);
        assert_eq!(map.get(1).unwrap().catalog_id, Some(7));
        assert_eq!(map.get(1).unwrap().scope(), Some(Scope::Grammar));
        assert_eq!(map.get(3).unwrap().catalog_id, Some(8));
        assert_eq!(map.get(3).unwrap().scope(), Some(Scope::WholeSchool));
        assert_eq!(map.get(5).unwrap().catalog_id, Some(9));
        assert_eq!(map.columns_for(IMPROVE).len(), 2);
    }

    #[test]
    fn reconcile_stops_on_ambiguous_catalog_before_validation() {
        let mut entries = catalog();
        entries.push(CatalogEntry {
            question_id: 71,
            question_type: QuestionType::Other("checkbox".to_string()),
            text: "Respondent ID".to_string(),
        });
        entries.push(CatalogEntry {
            question_id: 72,
            question_type: QuestionType::Other("checkbox".to_string()),
            text: "Respondent ID".to_string(),
        });
        let res = reconcile_header(
            &strings(&["Respondent ID", "Something unexpected"]),
            &strings(&["", ""]),
            &small_instrument(),
            &entries,
        );
        assert!(matches!(
            res,
            Err(ReshapeError::AmbiguousCatalog { ref description, .. }) if description == "Respondent ID"
        ));
    }
}
