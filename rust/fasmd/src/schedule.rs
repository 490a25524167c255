use crate::params::{as_object, optional_bool, optional_id, optional_str, InputError};
use crate::policy::ValidationPolicy;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const FIELD_START_DATE: &str = "startDate";
pub const FIELD_DEADLINE: &str = "deadline";
pub const FIELD_REVIEW_DEADLINE: &str = "reviewDeadline";
pub const FIELD_FINAL_DEADLINE: &str = "finalDeadline";
pub const FIELD_RUBRIC_TEMPLATE: &str = "rubricTemplateId";
pub const FIELD_PEER_REVIEWS: &str = "numPeerReviewsRequired";
pub const FIELD_INSTRUCTOR_WEIGHT: &str = "instructorWeight";
pub const FIELD_PEER_WEIGHT: &str = "peerWeight";
pub const FIELD_PASS_THRESHOLD: &str = "passThreshold";
pub const FIELD_CROSS_CLASS_TAG: &str = "crossClassTag";

const MSG_WEIGHT_SUM: &str = "Instructor and peer weights must add up to 100%";

// Wall-clock formats produced by datetime-local inputs. No zone conversion.
const LOCAL_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

pub fn parse_local_datetime(raw: &str) -> Option<NaiveDateTime> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    for fmt in LOCAL_FORMATS {
        if let Ok(v) = NaiveDateTime::parse_from_str(t, fmt) {
            return Some(v);
        }
    }
    DateTime::parse_from_rfc3339(t).ok().map(|v| v.naive_local())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormFlow {
    Create,
    Edit,
}

impl FormFlow {
    pub fn parse(raw: Option<&str>) -> Result<Self, InputError> {
        match raw.map(|s| s.trim().to_ascii_lowercase()) {
            None => Ok(FormFlow::Create),
            Some(s) if s == "create" => Ok(FormFlow::Create),
            Some(s) if s == "edit" => Ok(FormFlow::Edit),
            Some(other) => Err(InputError::bad_params("flow must be one of: create, edit")
                .with_details(serde_json::json!({ "flow": other }))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradingScale {
    Scale10,
    PassFail,
}

impl GradingScale {
    pub fn from_label(label: &str) -> Self {
        if label.trim() == "PassFail" {
            GradingScale::PassFail
        } else {
            GradingScale::Scale10
        }
    }
}

/// A form field as typed: absent, present but not usable, or a value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldInput<T> {
    Missing,
    Invalid(String),
    Value(T),
}

impl<T: Copy> FieldInput<T> {
    pub fn value(&self) -> Option<T> {
        match self {
            FieldInput::Value(v) => Some(*v),
            _ => None,
        }
    }
}

impl FieldInput<i64> {
    fn from_json(obj: &Map<String, Value>, key: &str) -> Result<Self, InputError> {
        match obj.get(key) {
            None | Some(Value::Null) => Ok(FieldInput::Missing),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(v) => Ok(FieldInput::Value(v)),
                None => match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => {
                        Ok(FieldInput::Value(f as i64))
                    }
                    _ => Ok(FieldInput::Invalid(n.to_string())),
                },
            },
            Some(Value::String(s)) => {
                let t = s.trim();
                if t.is_empty() {
                    Ok(FieldInput::Missing)
                } else {
                    Ok(t.parse::<i64>()
                        .map(FieldInput::Value)
                        .unwrap_or_else(|_| FieldInput::Invalid(t.to_string())))
                }
            }
            Some(_) => Err(InputError::bad_params(format!(
                "form.{key} must be a number, numeric string or null"
            ))),
        }
    }
}

impl FieldInput<f64> {
    fn from_json(obj: &Map<String, Value>, key: &str) -> Result<Self, InputError> {
        Self::from_value(obj.get(key), key)
    }

    /// Number, numeric string, blank or null. Other JSON types are rejected.
    pub fn from_value(raw: Option<&Value>, key: &str) -> Result<Self, InputError> {
        match raw {
            None | Some(Value::Null) => Ok(FieldInput::Missing),
            Some(Value::Number(n)) => Ok(n
                .as_f64()
                .filter(|v| v.is_finite())
                .map(FieldInput::Value)
                .unwrap_or_else(|| FieldInput::Invalid(n.to_string()))),
            Some(Value::String(s)) => {
                let t = s.trim();
                if t.is_empty() {
                    return Ok(FieldInput::Missing);
                }
                Ok(t.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .map(FieldInput::Value)
                    .unwrap_or_else(|| FieldInput::Invalid(t.to_string())))
            }
            Some(_) => Err(InputError::bad_params(format!(
                "form.{key} must be a number, numeric string or null"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentSchedule {
    pub start_date: Option<NaiveDateTime>,
    pub deadline: Option<NaiveDateTime>,
    pub review_deadline: Option<NaiveDateTime>,
    pub final_deadline: Option<NaiveDateTime>,
}

impl AssignmentSchedule {
    fn slots(&self) -> [(&'static str, Option<NaiveDateTime>); 4] {
        [
            (FIELD_START_DATE, self.start_date),
            (FIELD_DEADLINE, self.deadline),
            (FIELD_REVIEW_DEADLINE, self.review_deadline),
            (FIELD_FINAL_DEADLINE, self.final_deadline),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightAllocation {
    pub instructor_weight: FieldInput<i64>,
    pub peer_weight: FieldInput<i64>,
}

impl WeightAllocation {
    pub fn new(instructor_weight: i64, peer_weight: i64) -> Self {
        Self {
            instructor_weight: FieldInput::Value(instructor_weight),
            peer_weight: FieldInput::Value(peer_weight),
        }
    }

    /// Missing or unusable sides count as 0.
    pub fn sum(&self) -> i64 {
        self.instructor_weight
            .value()
            .unwrap_or(0)
            .saturating_add(self.peer_weight.value().unwrap_or(0))
    }

    pub fn is_balanced(&self) -> bool {
        self.sum() == 100
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentForm {
    pub schedule: AssignmentSchedule,
    pub weights: WeightAllocation,
    pub rubric_template_id: Option<String>,
    pub num_peer_reviews_required: FieldInput<i64>,
    pub grading_scale: GradingScale,
    pub pass_threshold: FieldInput<f64>,
    pub allow_cross_class: bool,
    pub cross_class_tag: Option<String>,
}

impl AssignmentForm {
    /// Build from the raw form object. Wrong JSON types are rejected here;
    /// values that are merely empty or unparseable are kept for `validate`.
    pub fn from_json(raw: &Value) -> Result<Self, InputError> {
        let obj = as_object(raw, "form")?;

        // Non-string values (epoch numbers, objects) are unparseable, so absent.
        let date = |key: &str| {
            obj.get(key)
                .and_then(|v| v.as_str())
                .and_then(parse_local_datetime)
        };
        let schedule = AssignmentSchedule {
            start_date: date(FIELD_START_DATE),
            deadline: date(FIELD_DEADLINE),
            review_deadline: date(FIELD_REVIEW_DEADLINE),
            final_deadline: date(FIELD_FINAL_DEADLINE),
        };

        let weights = WeightAllocation {
            instructor_weight: FieldInput::<i64>::from_json(obj, FIELD_INSTRUCTOR_WEIGHT)?,
            peer_weight: FieldInput::<i64>::from_json(obj, FIELD_PEER_WEIGHT)?,
        };

        let grading_scale = optional_str(obj, "gradingScale", "form")?
            .map(GradingScale::from_label)
            .unwrap_or(GradingScale::Scale10);

        let cross_class_tag = optional_str(obj, FIELD_CROSS_CLASS_TAG, "form")?
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(AssignmentForm {
            schedule,
            weights,
            rubric_template_id: optional_id(obj, FIELD_RUBRIC_TEMPLATE, "form")?,
            num_peer_reviews_required: FieldInput::<i64>::from_json(obj, FIELD_PEER_REVIEWS)?,
            grading_scale,
            pass_threshold: FieldInput::<f64>::from_json(obj, FIELD_PASS_THRESHOLD)?,
            allow_cross_class: optional_bool(obj, "allowCrossClass", "form")?.unwrap_or(false),
            cross_class_tag,
        })
    }

    /// Switching away from Pass/Fail discards any pass threshold.
    pub fn set_grading_scale(&mut self, scale: GradingScale) {
        self.grading_scale = scale;
        if scale != GradingScale::PassFail {
            self.pass_threshold = FieldInput::Missing;
        }
    }
}

/// Field name to message. Empty means the form may be submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Keeps an earlier message for the same field.
    fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_insert_with(|| message.into());
    }

    /// Drop the message for a field the user just edited.
    pub fn clear_field(&mut self, field: &str) -> bool {
        self.0.remove(field).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn field_label(field: &str) -> &'static str {
    match field {
        FIELD_START_DATE => "Start date",
        FIELD_DEADLINE => "Submission deadline",
        FIELD_REVIEW_DEADLINE => "Review deadline",
        FIELD_FINAL_DEADLINE => "Final deadline",
        FIELD_RUBRIC_TEMPLATE => "Rubric template",
        FIELD_PEER_REVIEWS => "Number of peer reviews",
        FIELD_INSTRUCTOR_WEIGHT => "Instructor weight",
        FIELD_PEER_WEIGHT => "Peer weight",
        FIELD_PASS_THRESHOLD => "Pass threshold",
        FIELD_CROSS_CLASS_TAG => "Cross-class tag",
        _ => "Field",
    }
}

fn check_required(form: &AssignmentForm, flow: FormFlow, errors: &mut ValidationErrors) {
    let s = &form.schedule;
    for (field, value) in [
        (FIELD_DEADLINE, s.deadline),
        (FIELD_REVIEW_DEADLINE, s.review_deadline),
        (FIELD_FINAL_DEADLINE, s.final_deadline),
    ] {
        if value.is_none() {
            errors.add(field, format!("{} is required", field_label(field)));
        }
    }

    if flow == FormFlow::Create && form.rubric_template_id.is_none() {
        errors.add(FIELD_RUBRIC_TEMPLATE, "Rubric template is required");
    }

    if form.num_peer_reviews_required == FieldInput::Missing {
        errors.add(FIELD_PEER_REVIEWS, "Number of peer reviews is required");
    }

    if form.grading_scale == GradingScale::PassFail && form.pass_threshold == FieldInput::Missing {
        errors.add(
            FIELD_PASS_THRESHOLD,
            "Pass threshold is required for Pass/Fail grading",
        );
    }

    if flow == FormFlow::Edit && form.allow_cross_class && form.cross_class_tag.is_none() {
        errors.add(
            FIELD_CROSS_CLASS_TAG,
            "Cross-class tag is required when cross-class review is enabled",
        );
    }
}

fn check_numbers(form: &AssignmentForm, policy: &ValidationPolicy, errors: &mut ValidationErrors) {
    match form.num_peer_reviews_required {
        FieldInput::Invalid(_) => {
            errors.add(FIELD_PEER_REVIEWS, "Number of peer reviews must be a whole number");
        }
        FieldInput::Value(v) if v < policy.peer_reviews_min || v > policy.peer_reviews_max => {
            errors.add(
                FIELD_PEER_REVIEWS,
                format!(
                    "Number of peer reviews must be between {} and {}",
                    policy.peer_reviews_min, policy.peer_reviews_max
                ),
            );
        }
        _ => {}
    }

    for (field, input) in [
        (FIELD_INSTRUCTOR_WEIGHT, &form.weights.instructor_weight),
        (FIELD_PEER_WEIGHT, &form.weights.peer_weight),
    ] {
        let bad = match input {
            FieldInput::Invalid(_) => true,
            FieldInput::Value(v) => !(0..=100).contains(v),
            FieldInput::Missing => false,
        };
        if bad {
            errors.add(
                field,
                format!("{} must be a whole number between 0 and 100", field_label(field)),
            );
        }
    }

    if form.grading_scale == GradingScale::PassFail {
        let bad = match form.pass_threshold {
            FieldInput::Invalid(_) => true,
            FieldInput::Value(v) => v < 0.0 || v > policy.pass_threshold_max,
            FieldInput::Missing => false,
        };
        if bad {
            errors.add(
                FIELD_PASS_THRESHOLD,
                format!(
                    "Pass threshold must be between 0 and {}",
                    policy.pass_threshold_max
                ),
            );
        }
    }
}

fn check_ordering(schedule: &AssignmentSchedule, errors: &mut ValidationErrors) {
    let pairs = [
        (schedule.start_date, schedule.deadline, FIELD_DEADLINE, "Deadline must be after start date"),
        (
            schedule.deadline,
            schedule.review_deadline,
            FIELD_REVIEW_DEADLINE,
            "Review deadline must be after submission deadline",
        ),
        (
            schedule.review_deadline,
            schedule.final_deadline,
            FIELD_FINAL_DEADLINE,
            "Final deadline must be after review deadline",
        ),
    ];
    for (earlier, later, field, message) in pairs {
        let (Some(earlier), Some(later)) = (earlier, later) else {
            continue;
        };
        if later <= earlier {
            errors.add(field, message);
        }
    }
}

fn check_future(schedule: &AssignmentSchedule, now: NaiveDateTime, errors: &mut ValidationErrors) {
    for (field, value) in schedule.slots() {
        if let Some(at) = value {
            if at <= now {
                errors.add(field, format!("{} must be in the future", field_label(field)));
            }
        }
    }
}

fn check_weight_sum(weights: &WeightAllocation, errors: &mut ValidationErrors) {
    if !weights.is_balanced() {
        errors.add(FIELD_INSTRUCTOR_WEIGHT, MSG_WEIGHT_SUM);
        errors.add(FIELD_PEER_WEIGHT, MSG_WEIGHT_SUM);
    }
}

/// Run every rule and merge the results. When several rules fail on one
/// field the message kept is, in order: required, malformed number, ordering,
/// future-dating, weight sum.
pub fn validate(
    form: &AssignmentForm,
    flow: FormFlow,
    now: NaiveDateTime,
    policy: &ValidationPolicy,
) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    check_required(form, flow, &mut errors);
    check_numbers(form, policy, &mut errors);
    check_ordering(&form.schedule, &mut errors);
    check_future(&form.schedule, now, &mut errors);
    check_weight_sum(&form.weights, &mut errors);
    errors
}
