use crate::calc;
use crate::ipc::error::{err, input_err, ok};
use crate::ipc::types::{AppState, Request};
use crate::schedule::WeightAllocation;
use serde_json::json;

fn handle_compute_total(req: &Request) -> serde_json::Value {
    let criteria = match calc::parse_criteria(req.params.get("criteria")) {
        Ok(v) => v,
        Err(e) => return input_err(&req.id, e),
    };
    let scores = match calc::parse_scores(req.params.get("scores")) {
        Ok(v) => v,
        Err(e) => return input_err(&req.id, e),
    };
    ok(
        &req.id,
        json!({ "total": calc::compute_total(&criteria, &scores) }),
    )
}

fn handle_clamp_score(req: &Request) -> serde_json::Value {
    let Some(value) = req.params.get("value").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "value must be a number", None);
    };
    let Some(max_score) = req.params.get("maxScore").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "maxScore must be a number", None);
    };
    ok(
        &req.id,
        json!({ "value": calc::clamp_score(value, max_score) }),
    )
}

fn handle_breakdown(req: &Request) -> serde_json::Value {
    let criteria = match calc::parse_criteria(req.params.get("criteria")) {
        Ok(v) => v,
        Err(e) => return input_err(&req.id, e),
    };
    let scores = match calc::parse_scores(req.params.get("scores")) {
        Ok(v) => v,
        Err(e) => return input_err(&req.id, e),
    };
    let summary = calc::summarize(&criteria, &scores);
    let complete = summary.is_complete();
    match serde_json::to_value(&summary) {
        Ok(mut body) => {
            body["complete"] = json!(complete);
            ok(&req.id, body)
        }
        Err(e) => err(&req.id, "internal", e.to_string(), None),
    }
}

fn handle_finalize(req: &Request) -> serde_json::Value {
    let criteria = match calc::parse_criteria(req.params.get("criteria")) {
        Ok(v) => v,
        Err(e) => return input_err(&req.id, e),
    };
    let scores = match calc::parse_scores(req.params.get("scores")) {
        Ok(v) => v,
        Err(e) => return input_err(&req.id, e),
    };
    let comments = match calc::parse_comments(req.params.get("comments")) {
        Ok(v) => v,
        Err(e) => return input_err(&req.id, e),
    };

    match calc::build_grading_payload(&criteria, &scores, &comments) {
        Ok(payload) => match serde_json::to_value(&payload) {
            Ok(body) => ok(&req.id, body),
            Err(e) => err(&req.id, "internal", e.to_string(), None),
        },
        Err(e) => {
            tracing::debug!(id = %req.id, reason = %e, "grading payload refused");
            input_err(&req.id, e)
        }
    }
}

fn handle_combine(req: &Request) -> serde_json::Value {
    let instructor_score = match req.params.get("instructorScore") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_f64() {
            Some(n) => Some(n),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "instructorScore must be a number or null",
                    None,
                )
            }
        },
    };

    let peer_scores: Vec<f64> = match req.params.get("peerScores") {
        None => Vec::new(),
        Some(v) if v.is_null() => Vec::new(),
        Some(v) => {
            let Some(arr) = v.as_array() else {
                return err(&req.id, "bad_params", "peerScores must be an array", None);
            };
            let mut out = Vec::with_capacity(arr.len());
            for item in arr {
                let Some(n) = item.as_f64() else {
                    return err(
                        &req.id,
                        "bad_params",
                        "peerScores must contain only numbers",
                        None,
                    );
                };
                out.push(n);
            }
            out
        }
    };

    let weights = req.params.get("weights");
    let instructor_weight = weights
        .and_then(|w| w.get("instructorWeight"))
        .and_then(|v| v.as_i64());
    let peer_weight = weights
        .and_then(|w| w.get("peerWeight"))
        .and_then(|v| v.as_i64());
    let (Some(instructor_weight), Some(peer_weight)) = (instructor_weight, peer_weight) else {
        return err(
            &req.id,
            "bad_params",
            "weights.instructorWeight and weights.peerWeight must be integers",
            None,
        );
    };
    if !(0..=100).contains(&instructor_weight) || !(0..=100).contains(&peer_weight) {
        return err(
            &req.id,
            "bad_params",
            "weights must be between 0 and 100",
            None,
        );
    }
    let allocation = WeightAllocation::new(instructor_weight, peer_weight);
    if !allocation.is_balanced() {
        return err(
            &req.id,
            "bad_params",
            "instructorWeight + peerWeight must equal 100",
            Some(json!({ "sum": allocation.sum() })),
        );
    }

    let final_score = calc::combine_final_score(
        instructor_score,
        &peer_scores,
        instructor_weight as f64,
        peer_weight as f64,
    );
    ok(&req.id, json!({ "finalScore": final_score }))
}

pub fn try_handle(_state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "rubric.computeTotal" => Some(handle_compute_total(req)),
        "rubric.clampScore" => Some(handle_clamp_score(req)),
        "rubric.breakdown" => Some(handle_breakdown(req)),
        "grading.finalize" => Some(handle_finalize(req)),
        "grading.combine" => Some(handle_combine(req)),
        _ => None,
    }
}
