/*!

This is the long-form manual for `survey_reshape` and `survey-ingest`.

## Input

The input is the export of a survey, as CSV (UTF-8) or Excel (`.xlsx`):

- row 1: the primary header (question text, blank when the question continues from
  the previous column)
- row 2: the sub-header (grade band, sub-topic, `Response`, ...)
- every following row: one respondent

Column 0 is the respondent identifier, columns 1 to 3 the collector identifier and
the start and end timestamps.

## Instrument descriptors

Each year of the survey is described by a JSON file. The layout of the survey,
the known typos and the expected text of every column change from one year to
the next, so they are data, not code. See `instruments/gvca_2023.json` for a
complete example.

```text
{
  "name": "gvca_2023",
  "columnCount": 136,
  "corrections": [
    {"columns": [12, 24], "expected": "Given your childrenâ€™s ...", "replacement": "Given your children's ..."}
  ],
  "openResponseGroups": [[18, 19, 20, 21]],
  "positivePrompt": "What makes GVCA a good choice for you and your family?",
  "improvementPrompt": "Please provide us with examples of how GVCA can better serve you and your family.",
  "scopeSentinels": [{"text": "Responses pertinent to Grammar School only", "context": "Grammar School"}],
  "bandBackfills": [{"columns": {"from": 11, "to": 18}, "placeholder": "Response", "context": "Grammar School"}],
  "expectations": [{"columns": [0], "expected": "Respondent ID", "field": "description"}],
  "respondentColumns": {"respondentId": 0, "collectorId": 1, "startDate": 2, "endDate": 3,
                        "submissionMethod": 9, "tenure": 133, "anySupport": 134, "minority": 135},
  "submissionMethods": [{"text": "...", "individuals": 1}],
  "middleAnswers": ["Satisfied"]
}
```

Column sets are a single index, a list of indices or a half-open range
`{"from": a, "to": b}` (with an optional `"step"`).

### Reconciliation steps

1. Forward fill: a blank primary cell takes the text of the previous non-blank cell.
   The sub-header cell becomes the context.
2. `corrections`: the description of the listed columns is replaced, but only if it is
   exactly `expected`.
3. `openResponseGroups`: for each group, a description equal to a sentinel sets the context
   to the sentinel's band. Then the first half of the group (in list order) gets the
   positive prompt and the rest the improvement prompt. In a group of odd length, the
   middle column belongs to the first half.
4. `bandBackfills`: a context equal to `placeholder` becomes `context`.
5. Catalog: each description is looked up by exact text in the question catalog. No
   match leaves the column unlinked (metadata and demographics). Several matches stop
   the ingest.
6. `expectations`: every listed column must have the expected description or context.
   All the mismatches are reported together.

The descriptor itself is checked when it is loaded: a correction whose replacement is
not the text that the expectations require for the same columns is an error.

### Answers

Ranked answers are converted to the 1-4 scale by prefix: `Extremely`/`Strongly` is 4,
`Somewhat` is 2, `Not` is 1. Without `middleAnswers`, any other non-empty answer is 3.
When `middleAnswers` is provided, only these texts are 3 and other answers are
reported as unrecognized at the end of the run instead of being scored.

## Store

Records are written to a SQLite database, in a schema attached for the year:

- `respondents`
- `question_rank_responses`
- `question_open_responses`
- `open_response_categories` (loaded by hand with `load-categories`)
- `questions` (the catalog, loaded with `load-catalog`)

An ingest is all or nothing: every record of every row is written in one transaction.

 */
