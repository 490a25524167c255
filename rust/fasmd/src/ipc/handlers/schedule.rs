use crate::ipc::error::{err, input_err, ok};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{
    self, AssignmentForm, FieldInput, FormFlow, GradingScale, ValidationErrors,
    FIELD_PASS_THRESHOLD,
};
use serde_json::json;

fn handle_validate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let flow = match FormFlow::parse(req.params.get("flow").and_then(|v| v.as_str())) {
        Ok(v) => v,
        Err(e) => return input_err(&req.id, e),
    };
    let Some(raw_form) = req.params.get("form") else {
        return err(&req.id, "bad_params", "missing form", None);
    };
    let form = match AssignmentForm::from_json(raw_form) {
        Ok(v) => v,
        Err(e) => return input_err(&req.id, e),
    };

    let now = match req.params.get("now") {
        None => chrono::Local::now().naive_local(),
        Some(v) if v.is_null() => chrono::Local::now().naive_local(),
        Some(v) => match v.as_str().and_then(schedule::parse_local_datetime) {
            Some(n) => n,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "now must be a local date-time string",
                    Some(json!({ "now": v })),
                )
            }
        },
    };

    let errors = schedule::validate(&form, flow, now, &state.policy);
    let valid = errors.is_empty();
    if !valid {
        let fields: Vec<&str> = errors.iter().map(|(field, _)| field).collect();
        tracing::debug!(id = %req.id, ?fields, "assignment form rejected");
    }
    ok(
        &req.id,
        json!({
            "valid": valid,
            "errors": errors,
        }),
    )
}

fn parse_whole_number(v: Option<&serde_json::Value>) -> Option<i64> {
    let v = v?;
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    v.as_str().and_then(|s| s.trim().parse::<i64>().ok())
}

fn handle_clamp_peer_reviews(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(value) = parse_whole_number(req.params.get("value")) else {
        return err(&req.id, "bad_params", "value must be a whole number", None);
    };
    ok(
        &req.id,
        json!({ "value": state.policy.clamp_peer_reviews(value) }),
    )
}

fn handle_clamp_penalty(state: &mut AppState, req: &Request) -> serde_json::Value {
    let value = req.params.get("value").and_then(|v| {
        v.as_f64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
    });
    let Some(value) = value else {
        return err(&req.id, "bad_params", "value must be a number", None);
    };
    ok(
        &req.id,
        json!({ "value": state.policy.clamp_penalty(value) }),
    )
}

fn handle_grading_scale_changed(req: &Request) -> serde_json::Value {
    let Some(label) = req.params.get("gradingScale").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing gradingScale", None);
    };
    let pass_threshold = if GradingScale::from_label(label) == GradingScale::PassFail {
        let raw = req.params.get(FIELD_PASS_THRESHOLD);
        match FieldInput::<f64>::from_value(raw, FIELD_PASS_THRESHOLD) {
            Ok(FieldInput::Value(v)) => json!(v),
            Ok(FieldInput::Missing) => serde_json::Value::Null,
            Ok(FieldInput::Invalid(raw)) => {
                return err(
                    &req.id,
                    "bad_params",
                    "passThreshold must be a number",
                    Some(json!({ "passThreshold": raw })),
                )
            }
            Err(e) => return input_err(&req.id, e),
        }
    } else {
        serde_json::Value::Null
    };
    ok(
        &req.id,
        json!({ "gradingScale": label, "passThreshold": pass_threshold }),
    )
}

fn handle_clear_field_error(req: &Request) -> serde_json::Value {
    let Some(field) = req.params.get("field").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing field", None);
    };
    let mut errors: ValidationErrors = match req.params.get("errors") {
        None => ValidationErrors::new(),
        Some(v) if v.is_null() => ValidationErrors::new(),
        Some(v) => match serde_json::from_value(v.clone()) {
            Ok(e) => e,
            Err(_) => {
                return err(
                    &req.id,
                    "bad_params",
                    "errors must map field names to messages",
                    None,
                )
            }
        },
    };
    let cleared = errors.clear_field(field);
    ok(&req.id, json!({ "errors": errors, "cleared": cleared }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedule.validate" => Some(handle_validate(state, req)),
        "schedule.clampPeerReviews" => Some(handle_clamp_peer_reviews(state, req)),
        "schedule.clampPenalty" => Some(handle_clamp_penalty(state, req)),
        "schedule.gradingScaleChanged" => Some(handle_grading_scale_changed(req)),
        "schedule.clearFieldError" => Some(handle_clear_field_error(req)),
        _ => None,
    }
}
