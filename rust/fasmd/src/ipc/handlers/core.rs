use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::policy::ValidationPolicy;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "policyPath": state.policy_path.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_policy_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    match serde_json::to_value(&state.policy) {
        Ok(policy) => ok(&req.id, json!({ "policy": policy })),
        Err(e) => err(&req.id, "internal", e.to_string(), None),
    }
}

fn handle_policy_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match ValidationPolicy::load(&path) {
        Ok(policy) => {
            tracing::info!(path = %path.display(), "policy loaded");
            let body = serde_json::to_value(&policy).unwrap_or_else(|_| json!({}));
            state.policy = policy;
            state.policy_path = Some(path.clone());
            ok(
                &req.id,
                json!({ "policyPath": path.to_string_lossy(), "policy": body }),
            )
        }
        Err(e) => {
            // Keep whatever policy was active before.
            tracing::warn!(path = %path.display(), error = %format!("{e:#}"), "policy rejected");
            err(&req.id, "policy_load_failed", format!("{e:#}"), None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "policy.get" => Some(handle_policy_get(state, req)),
        "policy.load" => Some(handle_policy_load(state, req)),
        _ => None,
    }
}
