// Summaries of the normalized tables, the input of the charts and word clouds.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::ingest::store::SurveyStore;
use crate::ingest::*;

pub const DEFAULT_TOP_WORDS: usize = 25;

const TOTAL: &str = "Total";

const BANDS: [&str; 3] = ["Grammar", "Middle", "High"];

const STOP_WORDS: &[&str] = &[
    "a", "about", "all", "also", "am", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "he",
    "her", "him", "his", "how", "i", "if", "in", "into", "is", "it", "its", "it's", "just",
    "me", "more", "my", "no", "not", "of", "on", "one", "or", "other", "our", "out", "she",
    "so", "some", "than", "that", "the", "their", "them", "then", "there", "these", "they",
    "this", "to", "too", "up", "us", "very", "was", "we", "were", "what", "when", "which",
    "who", "will", "with", "would", "you", "your",
];

/// The distribution of the ranked answers of a group, weighted by the number of
/// individuals behind each response.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakdown {
    pub label: String,
    pub responses: f64,
    /// Share of the responses at each value, from 1 to 4.
    pub proportions: Vec<f64>,
    pub average: Option<f64>,
}

/// The answers to one question, split by grade band. Bands without answers are
/// kept, with zero proportions.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionBandBreakdown {
    pub question_id: QuestionId,
    pub bands: Vec<Breakdown>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemographicBreakdown {
    pub question_id: QuestionId,
    pub dimension: String,
    pub groups: Vec<Breakdown>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandShare {
    pub band: String,
    pub total: i64,
    /// Absent when no tag of the category applies to the band.
    pub share_positive: Option<f64>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub question_id: QuestionId,
    pub sub_question_id: Option<String>,
    pub category: String,
    pub total: i64,
    pub share_positive: f64,
    pub bands: Vec<BandShare>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct WordCount {
    pub word: String,
    pub count: usize,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordFrequencies {
    pub question_id: QuestionId,
    pub responses: usize,
    pub words: Vec<WordCount>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyReport {
    pub schema: String,
    pub respondents: i64,
    pub by_question: Vec<Breakdown>,
    pub by_band: Vec<Breakdown>,
    pub by_question_band: Vec<QuestionBandBreakdown>,
    pub by_demographic: Vec<DemographicBreakdown>,
    pub categories: Vec<CategorySummary>,
    pub word_frequencies: Vec<WordFrequencies>,
}

fn round(x: f64, decimals: i32) -> f64 {
    let m = 10f64.powi(decimals);
    (x * m).round() / m
}

/// Weighted counts of the answers at each value.
#[derive(PartialEq, Debug, Clone, Copy, Default)]
struct Tally {
    weights: [f64; 4],
}

impl Tally {
    fn add(&mut self, value: u8, weight: f64) {
        if (1..=4).contains(&value) {
            self.weights[(value - 1) as usize] += weight;
        }
    }

    fn breakdown(&self, label: &str) -> Breakdown {
        let total: f64 = self.weights.iter().sum();
        let proportions = self
            .weights
            .iter()
            .map(|w| if total > 0.0 { round(w / total, 4) } else { 0.0 })
            .collect();
        let average = if total > 0.0 {
            let score: f64 = self
                .weights
                .iter()
                .enumerate()
                .map(|(i, w)| (i + 1) as f64 * w)
                .sum();
            Some(round(score / total, 2))
        } else {
            None
        };
        Breakdown {
            label: label.to_string(),
            responses: total,
            proportions,
            average,
        }
    }
}

/// One scored answer joined with its respondent.
#[derive(Debug, Clone)]
struct RankedRow {
    question_id: QuestionId,
    bands: BandFlags,
    value: u8,
    weight: f64,
    any_support: Option<bool>,
    minority: Option<bool>,
    tenure: Option<i64>,
}

fn fetch_ranked(store: &SurveyStore) -> BIngestResult<Vec<RankedRow>> {
    let sql = format!(
        "SELECT r.question_id, r.grammar, r.middle, r.high, r.response_value,
                COALESCE(p.num_individuals_in_response, 1), p.any_support, p.minority, p.tenure
         FROM {} AS r JOIN {} AS p ON r.respondent_id = p.respondent_id
         WHERE NOT p.soft_delete",
        store.table(RankedResponse::TABLE),
        store.table(RespondentRecord::TABLE)
    );
    let mut stmt = store.conn().prepare(&sql).context(DatabaseSnafu {})?;
    let rows = stmt
        .query_map([], |row| {
            let weight: i64 = row.get(5)?;
            Ok(RankedRow {
                question_id: row.get(0)?,
                bands: BandFlags {
                    grammar: row.get(1)?,
                    middle: row.get(2)?,
                    high: row.get(3)?,
                },
                value: row.get(4)?,
                weight: weight as f64,
                any_support: row.get(6)?,
                minority: row.get(7)?,
                tenure: row.get(8)?,
            })
        })
        .context(DatabaseSnafu {})?;
    let mut res: Vec<RankedRow> = Vec::new();
    for r in rows {
        res.push(r.context(DatabaseSnafu {})?);
    }
    Ok(res)
}

fn by_question(rows: &[RankedRow]) -> Vec<Breakdown> {
    let mut per_question: BTreeMap<QuestionId, Tally> = BTreeMap::new();
    let mut total = Tally::default();
    for r in rows.iter() {
        per_question
            .entry(r.question_id)
            .or_default()
            .add(r.value, r.weight);
        total.add(r.value, r.weight);
    }
    let mut res: Vec<Breakdown> = per_question
        .iter()
        .map(|(qid, t)| t.breakdown(&qid.to_string()))
        .collect();
    res.push(total.breakdown(TOTAL));
    res
}

fn band_index(bands: &BandFlags) -> Option<usize> {
    [bands.grammar, bands.middle, bands.high]
        .iter()
        .position(|flag| *flag)
}

fn by_band(rows: &[RankedRow]) -> Vec<Breakdown> {
    let mut bands = [Tally::default(); 3];
    let mut total = Tally::default();
    for r in rows.iter() {
        if let Some(idx) = band_index(&r.bands) {
            bands[idx].add(r.value, r.weight);
        }
        total.add(r.value, r.weight);
    }
    let mut res: Vec<Breakdown> = BANDS
        .iter()
        .zip(bands.iter())
        .map(|(l, t)| t.breakdown(l))
        .collect();
    res.push(total.breakdown(TOTAL));
    res
}

fn by_question_band(rows: &[RankedRow]) -> Vec<QuestionBandBreakdown> {
    let mut per_question: BTreeMap<QuestionId, [Tally; 3]> = BTreeMap::new();
    for r in rows.iter() {
        if let Some(idx) = band_index(&r.bands) {
            per_question.entry(r.question_id).or_default()[idx].add(r.value, r.weight);
        }
    }
    per_question
        .iter()
        .map(|(qid, tallies)| QuestionBandBreakdown {
            question_id: *qid,
            bands: BANDS
                .iter()
                .zip(tallies.iter())
                .map(|(l, t)| t.breakdown(l))
                .collect(),
        })
        .collect()
}

fn demographic(
    rows: &[RankedRow],
    dimension: &str,
    labels: (&str, &str),
    key: impl Fn(&RankedRow) -> Option<bool>,
) -> Vec<DemographicBreakdown> {
    let mut per_question: BTreeMap<QuestionId, (Tally, Tally)> = BTreeMap::new();
    for r in rows.iter() {
        if let Some(k) = key(r) {
            let e = per_question.entry(r.question_id).or_default();
            if k {
                e.0.add(r.value, r.weight);
            } else {
                e.1.add(r.value, r.weight);
            }
        }
    }
    per_question
        .iter()
        .map(|(qid, (yes, no))| DemographicBreakdown {
            question_id: *qid,
            dimension: dimension.to_string(),
            groups: vec![yes.breakdown(labels.0), no.breakdown(labels.1)],
        })
        .collect()
}

fn by_demographic(rows: &[RankedRow]) -> Vec<DemographicBreakdown> {
    let mut res = demographic(
        rows,
        "support",
        ("Received Support", "Did not Receive Support"),
        |r| r.any_support,
    );
    res.extend(demographic(
        rows,
        "minority",
        ("Minority", "Not Minority"),
        |r| r.minority,
    ));
    res.extend(demographic(
        rows,
        "tenure",
        ("First Year Family", "Returning Family"),
        |r| r.tenure.map(|t| t == 1),
    ));
    res
}

fn share(part: i64, total: i64) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some(round(part as f64 / total as f64, 4))
    }
}

/// Categories with at least three tags.
fn categories(store: &SurveyStore) -> BIngestResult<Vec<CategorySummary>> {
    let sql = format!(
        "SELECT question_id, sub_question_id, category,
                COUNT(*),
                SUM(sentiment = 'positive'),
                SUM(grammar), SUM(grammar AND sentiment = 'positive'),
                SUM(middle), SUM(middle AND sentiment = 'positive'),
                SUM(high), SUM(high AND sentiment = 'positive')
         FROM {}
         GROUP BY question_id, sub_question_id, category
         HAVING COUNT(*) > 2
         ORDER BY question_id, sub_question_id, COUNT(*) DESC, category",
        store.table(CategoryTag::TABLE)
    );
    let mut stmt = store.conn().prepare(&sql).context(DatabaseSnafu {})?;
    let rows = stmt
        .query_map([], |row| {
            let total: i64 = row.get(3)?;
            let positive: i64 = row.get(4)?;
            let mut bands: Vec<BandShare> = Vec::new();
            for (idx, band) in BANDS.iter().enumerate() {
                let band_total: i64 = row.get(5 + 2 * idx)?;
                let band_positive: i64 = row.get(6 + 2 * idx)?;
                bands.push(BandShare {
                    band: band.to_string(),
                    total: band_total,
                    share_positive: share(band_positive, band_total),
                });
            }
            Ok(CategorySummary {
                question_id: row.get(0)?,
                sub_question_id: row.get(1)?,
                category: row.get(2)?,
                total,
                share_positive: share(positive, total).unwrap_or(0.0),
                bands,
            })
        })
        .context(DatabaseSnafu {})?;
    let mut res: Vec<CategorySummary> = Vec::new();
    for r in rows {
        res.push(r.context(DatabaseSnafu {})?);
    }
    Ok(res)
}

/// Lower-cased words of a response, without punctuation and stop words.
pub fn words(response: &str, stop_words: &HashSet<&str>) -> Vec<String> {
    response
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\''))
        .filter(|w| w.chars().count() > 1 && !stop_words.contains(w))
        .map(|w| w.to_string())
        .collect()
}

fn word_frequencies(store: &SurveyStore, top: usize) -> BIngestResult<Vec<WordFrequencies>> {
    let sql = format!(
        "SELECT o.question_id, o.response
         FROM {} AS o JOIN {} AS p ON o.respondent_id = p.respondent_id
         WHERE NOT p.soft_delete AND lower(trim(o.response)) <> 'n/a'
         ORDER BY o.question_id",
        store.table(OpenResponse::TABLE),
        store.table(RespondentRecord::TABLE)
    );
    let mut stmt = store.conn().prepare(&sql).context(DatabaseSnafu {})?;
    let rows = stmt
        .query_map([], |row| {
            let qid: QuestionId = row.get(0)?;
            let response: String = row.get(1)?;
            Ok((qid, response))
        })
        .context(DatabaseSnafu {})?;

    let stop_words: HashSet<&str> = STOP_WORDS.iter().cloned().collect();
    let mut per_question: BTreeMap<QuestionId, (usize, HashMap<String, usize>)> = BTreeMap::new();
    for r in rows {
        let (qid, response) = r.context(DatabaseSnafu {})?;
        let e = per_question.entry(qid).or_default();
        e.0 += 1;
        for w in words(&response, &stop_words) {
            *e.1.entry(w).or_insert(0) += 1;
        }
    }

    Ok(per_question
        .into_iter()
        .map(|(question_id, (responses, counts))| {
            let mut words: Vec<WordCount> = counts
                .into_iter()
                .map(|(word, count)| WordCount { word, count })
                .collect();
            words.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.word.cmp(&b.word)));
            words.truncate(top);
            WordFrequencies {
                question_id,
                responses,
                words,
            }
        })
        .collect())
}

pub fn build_report(store: &SurveyStore, top_words: usize) -> BIngestResult<SurveyReport> {
    let respondents: i64 = store
        .conn()
        .query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE NOT soft_delete",
                store.table(RespondentRecord::TABLE)
            ),
            [],
            |row| row.get(0),
        )
        .context(DatabaseSnafu {})?;
    let ranked = fetch_ranked(store)?;
    info!(
        "Building the report of {} from {} respondents and {} ranked responses",
        store.schema(),
        respondents,
        ranked.len()
    );
    Ok(SurveyReport {
        schema: store.schema().to_string(),
        respondents,
        by_question: by_question(&ranked),
        by_band: by_band(&ranked),
        by_question_band: by_question_band(&ranked),
        by_demographic: by_demographic(&ranked),
        categories: categories(store)?,
        word_frequencies: word_frequencies(store, top_words)?,
    })
}
