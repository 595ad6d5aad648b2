pub use crate::config::*;

/// A builder for survey instruments.
///
/// The instrument is checked for consistency when it is built.
///
/// ```
/// use survey_reshape::builder::InstrumentBuilder;
/// # use survey_reshape::ReshapeError;
///
/// let instrument = InstrumentBuilder::new("demo")
///     .expect_description(&[0], "Respondent ID")
///     .expect_description(&[4, 5], "How welcoming is the school community?")
///     .expect_context(&[4], "Grammar School")
///     .expect_context(&[5], "High School")
///     .build()?;
///
/// assert_eq!(instrument.expectations.len(), 4);
/// # Ok::<(), ReshapeError>(())
/// ```
pub struct InstrumentBuilder {
    _instrument: Instrument,
}

impl InstrumentBuilder {
    pub fn new(name: &str) -> InstrumentBuilder {
        InstrumentBuilder {
            _instrument: Instrument {
                name: name.to_string(),
                column_count: None,
                corrections: Vec::new(),
                open_responses: OpenResponseLayout::default(),
                backfills: Vec::new(),
                expectations: Vec::new(),
                respondent_columns: RespondentColumns::default(),
                submission_methods: Vec::new(),
                middle_answers: Vec::new(),
            },
        }
    }

    pub fn column_count(mut self, count: usize) -> InstrumentBuilder {
        self._instrument.column_count = Some(count);
        self
    }

    pub fn correction(
        mut self,
        columns: &[ColumnIndex],
        expected: &str,
        replacement: &str,
    ) -> InstrumentBuilder {
        self._instrument.corrections.push(CorrectionRule {
            columns: columns.to_vec(),
            expected: expected.to_string(),
            replacement: replacement.to_string(),
        });
        self
    }

    /// The two prompts of the open response pages. The first half of each group gets
    /// the positive prompt, the second half the improvement prompt.
    pub fn open_response_prompts(mut self, positive: &str, improvement: &str) -> InstrumentBuilder {
        self._instrument.open_responses.positive_prompt = positive.to_string();
        self._instrument.open_responses.improvement_prompt = improvement.to_string();
        self
    }

    pub fn scope_sentinel(mut self, text: &str, context: &str) -> InstrumentBuilder {
        self._instrument
            .open_responses
            .sentinels
            .push(ScopeSentinel {
                text: text.to_string(),
                context: context.to_string(),
            });
        self
    }

    pub fn open_response_group(mut self, columns: &[ColumnIndex]) -> InstrumentBuilder {
        self._instrument
            .open_responses
            .groups
            .push(columns.to_vec());
        self
    }

    pub fn band_backfill(
        mut self,
        columns: &[ColumnIndex],
        placeholder: &str,
        context: &str,
    ) -> InstrumentBuilder {
        self._instrument.backfills.push(BandBackfill {
            columns: columns.to_vec(),
            placeholder: placeholder.to_string(),
            context: context.to_string(),
        });
        self
    }

    pub fn expect(
        mut self,
        columns: &[ColumnIndex],
        expected: &str,
        field: ExpectedField,
    ) -> InstrumentBuilder {
        self._instrument.expectations.push(Expectation {
            columns: columns.to_vec(),
            expected: expected.to_string(),
            field,
        });
        self
    }

    pub fn expect_description(self, columns: &[ColumnIndex], expected: &str) -> InstrumentBuilder {
        self.expect(columns, expected, ExpectedField::Description)
    }

    pub fn expect_context(self, columns: &[ColumnIndex], expected: &str) -> InstrumentBuilder {
        self.expect(columns, expected, ExpectedField::Context)
    }

    pub fn respondent_columns(mut self, columns: RespondentColumns) -> InstrumentBuilder {
        self._instrument.respondent_columns = columns;
        self
    }

    pub fn submission_method(mut self, text: &str, individuals: i64) -> InstrumentBuilder {
        self._instrument.submission_methods.push(SubmissionMethod {
            text: text.to_string(),
            individuals,
        });
        self
    }

    pub fn middle_answer(mut self, text: &str) -> InstrumentBuilder {
        self._instrument.middle_answers.push(text.to_string());
        self
    }

    pub fn build(self) -> Result<Instrument, ReshapeError> {
        let instrument = self._instrument;
        let layout = &instrument.open_responses;
        if !layout.groups.is_empty()
            && (layout.positive_prompt.is_empty() || layout.improvement_prompt.is_empty())
        {
            return Err(ReshapeError::InvalidInstrument(
                "open response groups require both a positive and an improvement prompt"
                    .to_string(),
            ));
        }
        if let Some(g) = layout.groups.iter().find(|g| g.is_empty()) {
            return Err(ReshapeError::InvalidInstrument(format!(
                "empty open response group: {:?}",
                g
            )));
        }
        if let Some(count) = instrument.column_count {
            let out_of_range: Vec<ColumnIndex> = instrument
                .expectations
                .iter()
                .flat_map(|e| e.columns.iter().cloned())
                .filter(|idx| *idx >= count)
                .collect();
            if !out_of_range.is_empty() {
                return Err(ReshapeError::InvalidInstrument(format!(
                    "expectations refer to columns beyond the {} declared columns: {:?}",
                    count, out_of_range
                )));
            }
        }
        instrument.check_consistency()?;
        Ok(instrument)
    }
}

impl Instrument {
    /// Checks that the correction tables and the expectations agree with each other.
    ///
    /// All the disagreements are reported at once.
    pub fn check_consistency(&self) -> Result<(), ReshapeError> {
        let mut issues: Vec<String> = Vec::new();
        let description_expectations: Vec<&Expectation> = self
            .expectations
            .iter()
            .filter(|e| e.field == ExpectedField::Description)
            .collect();

        for rule in self.corrections.iter() {
            for e in description_expectations.iter() {
                let overlap: Vec<ColumnIndex> = rule
                    .columns
                    .iter()
                    .filter(|idx| e.columns.contains(idx))
                    .cloned()
                    .collect();
                if !overlap.is_empty() && e.expected != rule.replacement {
                    issues.push(format!(
                        "columns {:?}: correction produces {:?} but {:?} is expected",
                        overlap, rule.replacement, e.expected
                    ));
                }
            }
        }

        let layout = &self.open_responses;
        for group in layout.groups.iter() {
            for idx in group.iter() {
                for e in description_expectations.iter() {
                    if e.columns.contains(idx)
                        && e.expected != layout.positive_prompt
                        && e.expected != layout.improvement_prompt
                    {
                        issues.push(format!(
                            "column {}: open response column is expected to be {:?}",
                            idx, e.expected
                        ));
                    }
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ReshapeError::InconsistentInstrument(issues))
        }
    }
}
