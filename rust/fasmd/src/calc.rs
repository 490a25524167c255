use crate::params::{as_object, optional_id, optional_number, optional_str, InputError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};

/// Weighted aggregates are in percentage points (0-100). Dividing by this
/// maps them onto the 0-10 grading scale.
pub const SCALE_DIVISOR: f64 = 10.0;

/// Per-criterion raw scores keyed by criteria id. `None` means not graded yet.
pub type ScoreMap = HashMap<String, Option<f64>>;

// Absorbs binary representation error so exact .xx5 values round up.
const ROUNDING_EPSILON: f64 = 1e-9;

/// Round half up to 2 decimal places: `Int(100*x + 0.5) / 100`.
pub fn round_off_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5 + ROUNDING_EPSILON).floor() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criterion {
    pub criteria_id: String,
    pub weight: f64,
    pub max_score: f64,
}

impl Criterion {
    pub fn new(criteria_id: impl Into<String>, weight: f64, max_score: f64) -> Self {
        Self {
            criteria_id: criteria_id.into(),
            weight,
            max_score,
        }
    }

    /// `(raw / maxScore) * weight`, or 0 when any input is unusable.
    pub fn contribution(&self, raw_score: Option<f64>) -> f64 {
        let Some(raw) = raw_score.filter(|v| v.is_finite()) else {
            return 0.0;
        };
        if !self.max_score.is_finite() || self.max_score <= 0.0 {
            return 0.0;
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return 0.0;
        }
        if raw <= 0.0 {
            return 0.0;
        }
        (raw / self.max_score) * self.weight
    }
}

/// Clamp a freshly edited score into `[0, maxScore]` before it is stored.
pub fn clamp_score(raw_value: f64, max_score: f64) -> f64 {
    if !raw_value.is_finite() || !max_score.is_finite() || max_score <= 0.0 {
        return 0.0;
    }
    raw_value.clamp(0.0, max_score)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionContribution {
    pub criteria_id: String,
    pub raw_score: Option<f64>,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub contributions: Vec<CriterionContribution>,
    pub aggregate_percent: f64,
    pub total: f64,
    pub graded_count: usize,
    pub ungraded_count: usize,
}

impl ScoreSummary {
    pub fn is_complete(&self) -> bool {
        !self.contributions.is_empty() && self.ungraded_count == 0
    }

    /// The total only once every criterion carries a score. Live display uses
    /// `total`; anything sent for recording goes through this.
    pub fn finalized_total(&self) -> Option<f64> {
        self.is_complete().then_some(self.total)
    }

    pub fn ungraded_ids(&self) -> Vec<String> {
        self.contributions
            .iter()
            .filter(|c| c.raw_score.is_none())
            .map(|c| c.criteria_id.clone())
            .collect()
    }
}

pub fn summarize(criteria: &[Criterion], scores: &ScoreMap) -> ScoreSummary {
    let mut contributions: Vec<CriterionContribution> = Vec::with_capacity(criteria.len());
    let mut aggregate = 0.0_f64;
    let mut graded_count = 0_usize;
    let mut ungraded_count = 0_usize;

    for c in criteria {
        let raw_score = scores
            .get(&c.criteria_id)
            .copied()
            .flatten()
            .filter(|v| v.is_finite());
        if raw_score.is_some() {
            graded_count += 1;
        } else {
            ungraded_count += 1;
        }
        let contribution = c.contribution(raw_score);
        aggregate += contribution;
        contributions.push(CriterionContribution {
            criteria_id: c.criteria_id.clone(),
            raw_score,
            contribution,
        });
    }

    ScoreSummary {
        contributions,
        aggregate_percent: round_off_2_decimals(aggregate),
        total: round_off_2_decimals(aggregate / SCALE_DIVISOR),
        graded_count,
        ungraded_count,
    }
}

/// Weighted rubric total on the 0-10 scale. Never fails; unusable input
/// contributes 0.
pub fn compute_total(criteria: &[Criterion], scores: &ScoreMap) -> f64 {
    summarize(criteria, scores).total
}

/// `instructor * instructorWeight/100 + mean(peers) * peerWeight/100`.
/// A missing instructor score or an empty peer list contributes 0.
pub fn combine_final_score(
    instructor_score: Option<f64>,
    peer_scores: &[f64],
    instructor_weight: f64,
    peer_weight: f64,
) -> f64 {
    let instructor = instructor_score.filter(|v| v.is_finite()).unwrap_or(0.0);
    let peers: Vec<f64> = peer_scores.iter().copied().filter(|v| v.is_finite()).collect();
    let peer_avg = if peers.is_empty() {
        0.0
    } else {
        peers.iter().sum::<f64>() / (peers.len() as f64)
    };
    round_off_2_decimals(instructor * instructor_weight / 100.0 + peer_avg * peer_weight / 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaFeedback {
    pub criteria_id: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingPayload {
    pub final_score: f64,
    pub criteria_feedbacks: Vec<CriteriaFeedback>,
}

pub fn build_grading_payload(
    criteria: &[Criterion],
    scores: &ScoreMap,
    comments: &HashMap<String, String>,
) -> Result<GradingPayload, InputError> {
    if criteria.is_empty() {
        return Err(InputError::new("incomplete", "rubric has no criteria"));
    }
    let summary = summarize(criteria, scores);
    let Some(final_score) = summary.finalized_total() else {
        return Err(
            InputError::new("incomplete", "every criterion must be graded before submitting")
                .with_details(json!({ "ungraded": summary.ungraded_ids() })),
        );
    };

    let criteria_feedbacks = summary
        .contributions
        .iter()
        .map(|c| CriteriaFeedback {
            criteria_id: c.criteria_id.clone(),
            score: c.raw_score.unwrap_or(0.0),
            comment: comments.get(&c.criteria_id).cloned(),
        })
        .collect();

    Ok(GradingPayload {
        final_score,
        criteria_feedbacks,
    })
}

pub fn parse_criteria(raw: Option<&serde_json::Value>) -> Result<Vec<Criterion>, InputError> {
    let Some(raw) = raw else {
        return Err(InputError::bad_params("missing criteria"));
    };
    let Some(items) = raw.as_array() else {
        return Err(InputError::bad_params("criteria must be an array"));
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<Criterion> = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let obj = as_object(item, "criterion")?;
        let Some(criteria_id) = optional_id(obj, "criteriaId", "criterion")? else {
            return Err(InputError::bad_params("criterion.criteriaId is required")
                .with_details(json!({ "index": i })));
        };
        if !seen.insert(criteria_id.clone()) {
            return Err(InputError::bad_params("duplicate criteriaId")
                .with_details(json!({ "criteriaId": criteria_id })));
        }
        // Missing numbers stay representable; scoring treats them as 0.
        let weight = optional_number(obj, "weight", "criterion")?.unwrap_or(0.0);
        let max_score = optional_number(obj, "maxScore", "criterion")?.unwrap_or(0.0);
        out.push(Criterion {
            criteria_id,
            weight,
            max_score,
        });
    }
    Ok(out)
}

/// Accepts `{ "<criteriaId>": number | null }` or
/// `[{ "criteriaId": .., "rawScore": number | null }]`.
pub fn parse_scores(raw: Option<&serde_json::Value>) -> Result<ScoreMap, InputError> {
    let mut out: ScoreMap = HashMap::new();
    let Some(raw) = raw else {
        return Ok(out);
    };
    if raw.is_null() {
        return Ok(out);
    }

    if let Some(obj) = raw.as_object() {
        for (id, v) in obj {
            let score = if v.is_null() {
                None
            } else {
                Some(v.as_f64().ok_or_else(|| {
                    InputError::bad_params("scores values must be numbers or null")
                        .with_details(json!({ "criteriaId": id }))
                })?)
            };
            out.insert(id.clone(), score);
        }
        return Ok(out);
    }

    let Some(items) = raw.as_array() else {
        return Err(InputError::bad_params("scores must be an object or an array"));
    };
    for item in items {
        let obj = as_object(item, "score entry")?;
        let Some(id) = optional_id(obj, "criteriaId", "score entry")? else {
            return Err(InputError::bad_params("score entry.criteriaId is required"));
        };
        let score = optional_number(obj, "rawScore", "score entry")?;
        out.insert(id, score);
    }
    Ok(out)
}

pub fn parse_comments(
    raw: Option<&serde_json::Value>,
) -> Result<HashMap<String, String>, InputError> {
    let mut out: HashMap<String, String> = HashMap::new();
    let Some(raw) = raw else {
        return Ok(out);
    };
    if raw.is_null() {
        return Ok(out);
    }
    let obj = as_object(raw, "comments")?;
    for key in obj.keys() {
        if let Some(text) = optional_str(obj, key, "comments")? {
            let t = text.trim();
            if !t.is_empty() {
                out.insert(key.clone(), t.to_string());
            }
        }
    }
    Ok(out)
}
