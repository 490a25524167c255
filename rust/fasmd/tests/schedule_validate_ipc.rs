use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

const NOW: &str = "2026-03-10T09:00";

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_fasmd");
    let mut child = Command::new(exe)
        .env_remove("FASMD_POLICY")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn fasmd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn valid_form() -> serde_json::Value {
    json!({
        "startDate": "2026-03-11T08:00",
        "deadline": "2026-03-17T23:59",
        "reviewDeadline": "2026-03-20T23:59",
        "finalDeadline": "2026-03-24T23:59",
        "rubricTemplateId": "rt-essay",
        "numPeerReviewsRequired": "3",
        "instructorWeight": "70",
        "peerWeight": "30",
        "gradingScale": "Scale10",
        "passThreshold": ""
    })
}

fn validate(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    flow: &str,
    form: serde_json::Value,
) -> serde_json::Value {
    request_ok(
        stdin,
        reader,
        id,
        "schedule.validate",
        json!({ "flow": flow, "form": form, "now": NOW }),
    )
}

#[test]
fn ordered_schedule_with_balanced_weights_is_valid() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    for (i, flow) in ["create", "edit"].iter().enumerate() {
        let res = validate(&mut stdin, &mut reader, &format!("v{}", i), flow, valid_form());
        assert_eq!(res["valid"], json!(true), "{} flow: {}", flow, res);
        assert_eq!(res["errors"], json!({}));
    }

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn ordering_errors_land_on_the_later_field() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let mut form = valid_form();
    form["deadline"] = json!("2026-03-11T08:00");
    let res = validate(&mut stdin, &mut reader, "1", "create", form);
    assert_eq!(res["valid"], json!(false));
    assert_eq!(
        res["errors"],
        json!({ "deadline": "Deadline must be after start date" })
    );

    let mut form = valid_form();
    form["startDate"] = json!(null);
    form["deadline"] = json!("2026-03-11T09:00");
    form["reviewDeadline"] = json!("2026-03-10T09:00");
    let res = validate(&mut stdin, &mut reader, "2", "create", form);
    assert_eq!(
        res["errors"]["reviewDeadline"],
        json!("Review deadline must be after submission deadline")
    );
    assert!(res["errors"].get("startDate").is_none());

    let mut form = valid_form();
    form["finalDeadline"] = json!("2026-03-19T00:00");
    let res = validate(&mut stdin, &mut reader, "3", "edit", form);
    assert_eq!(
        res["errors"]["finalDeadline"],
        json!("Final deadline must be after review deadline")
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn required_and_future_rules_report_independently() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let res = validate(&mut stdin, &mut reader, "1", "create", json!({}));
    let errors = &res["errors"];
    assert_eq!(errors["deadline"], json!("Submission deadline is required"));
    assert_eq!(errors["reviewDeadline"], json!("Review deadline is required"));
    assert_eq!(errors["finalDeadline"], json!("Final deadline is required"));
    assert_eq!(errors["rubricTemplateId"], json!("Rubric template is required"));
    assert_eq!(
        errors["numPeerReviewsRequired"],
        json!("Number of peer reviews is required")
    );
    assert!(errors.get("instructorWeight").is_some());
    assert!(errors.get("peerWeight").is_some());
    assert!(errors.get("startDate").is_none());

    let mut form = valid_form();
    form["startDate"] = json!("2026-03-01T08:00");
    let res = validate(&mut stdin, &mut reader, "2", "create", form);
    assert_eq!(
        res["errors"],
        json!({ "startDate": "Start date must be in the future" })
    );

    // Unparseable dates are treated as absent, never as past.
    let mut form = valid_form();
    form["startDate"] = json!("someday");
    form["deadline"] = json!("next week");
    let res = validate(&mut stdin, &mut reader, "3", "create", form);
    assert_eq!(
        res["errors"],
        json!({ "deadline": "Submission deadline is required" })
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn weights_must_add_up_to_exactly_one_hundred() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    for (i, (instructor, peer)) in [(60, 39), (60, 41)].iter().enumerate() {
        let mut form = valid_form();
        form["instructorWeight"] = json!(instructor);
        form["peerWeight"] = json!(peer);
        let res = validate(&mut stdin, &mut reader, &format!("w{}", i), "create", form);
        let msg = json!("Instructor and peer weights must add up to 100%");
        assert_eq!(res["errors"]["instructorWeight"], msg);
        assert_eq!(res["errors"]["peerWeight"], msg);
    }

    let mut form = valid_form();
    form["instructorWeight"] = json!(100);
    form["peerWeight"] = json!(null);
    let res = validate(&mut stdin, &mut reader, "w-missing", "create", form);
    assert_eq!(res["valid"], json!(true));

    let mut form = valid_form();
    form["instructorWeight"] = json!("70.5");
    form["peerWeight"] = json!("29.5");
    let res = validate(&mut stdin, &mut reader, "w-frac", "create", form);
    assert_eq!(
        res["errors"]["instructorWeight"],
        json!("Instructor weight must be a whole number between 0 and 100")
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn pass_threshold_and_cross_class_are_conditional() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let mut form = valid_form();
    form["gradingScale"] = json!("PassFail");
    let res = validate(&mut stdin, &mut reader, "1", "create", form.clone());
    assert_eq!(
        res["errors"],
        json!({ "passThreshold": "Pass threshold is required for Pass/Fail grading" })
    );

    form["passThreshold"] = json!("5");
    let res = validate(&mut stdin, &mut reader, "2", "create", form);
    assert_eq!(res["valid"], json!(true));

    let mut form = valid_form();
    form["allowCrossClass"] = json!(true);
    let res = validate(&mut stdin, &mut reader, "3", "edit", form.clone());
    assert_eq!(
        res["errors"],
        json!({ "crossClassTag": "Cross-class tag is required when cross-class review is enabled" })
    );
    let res = validate(&mut stdin, &mut reader, "4", "create", form);
    assert_eq!(res["valid"], json!(true));

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "schedule.gradingScaleChanged",
        json!({ "gradingScale": "Scale10", "passThreshold": 6 }),
    );
    assert!(res["passThreshold"].is_null());
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "schedule.gradingScaleChanged",
        json!({ "gradingScale": "PassFail", "passThreshold": 6 }),
    );
    assert_eq!(res["passThreshold"].as_f64(), Some(6.0));
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "schedule.gradingScaleChanged",
        json!({ "gradingScale": "PassFail", "passThreshold": "6.5" }),
    );
    assert_eq!(res["passThreshold"].as_f64(), Some(6.5));

    for (i, raw) in [json!("abc"), json!({ "x": 1 }), json!(true)].into_iter().enumerate() {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("bad-{}", i),
            "schedule.gradingScaleChanged",
            json!({ "gradingScale": "PassFail", "passThreshold": raw }),
        );
        assert_eq!(resp["ok"], json!(false), "{}", resp);
        assert_eq!(resp["error"]["code"], json!("bad_params"));
    }

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn oversized_weights_are_reported_not_fatal() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let mut form = valid_form();
    form["instructorWeight"] = json!("9223372036854775807");
    form["peerWeight"] = json!(1);
    let res = validate(&mut stdin, &mut reader, "1", "create", form);
    assert_eq!(res["valid"], json!(false));
    assert_eq!(
        res["errors"]["instructorWeight"],
        json!("Instructor weight must be a whole number between 0 and 100")
    );
    assert_eq!(
        res["errors"]["peerWeight"],
        json!("Instructor and peer weights must add up to 100%")
    );

    // The sidecar is still serving after the oversized form.
    let res = validate(&mut stdin, &mut reader, "2", "create", valid_form());
    assert_eq!(res["valid"], json!(true));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn peer_review_count_outside_policy_range_is_rejected() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    for (i, count) in [json!(0), json!("25"), json!(-3)].into_iter().enumerate() {
        let mut form = valid_form();
        form["numPeerReviewsRequired"] = count;
        let res = validate(&mut stdin, &mut reader, &format!("n{}", i), "edit", form);
        assert_eq!(
            res["errors"],
            json!({ "numPeerReviewsRequired": "Number of peer reviews must be between 1 and 10" })
        );
    }

    let mut form = valid_form();
    form["numPeerReviewsRequired"] = json!(10);
    let res = validate(&mut stdin, &mut reader, "edge", "create", form);
    assert_eq!(res["valid"], json!(true));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn epoch_number_timestamps_are_treated_as_absent() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let mut form = valid_form();
    form["deadline"] = json!(1_773_900_000_000_i64);
    form["startDate"] = json!(1_773_300_000_000_i64);
    let res = validate(&mut stdin, &mut reader, "1", "create", form);
    assert_eq!(
        res["errors"],
        json!({ "deadline": "Submission deadline is required" })
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn entry_time_clamps_and_error_clearing() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "schedule.clampPeerReviews",
        json!({ "value": "25" }),
    );
    assert_eq!(res["value"], json!(10));
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "schedule.clampPeerReviews",
        json!({ "value": 0 }),
    );
    assert_eq!(res["value"], json!(1));

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "schedule.clampPenalty",
        json!({ "value": 140 }),
    );
    assert_eq!(res["value"].as_f64(), Some(100.0));

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "schedule.clearFieldError",
        json!({
            "errors": { "deadline": "Submission deadline is required", "peerWeight": "x" },
            "field": "deadline"
        }),
    );
    assert_eq!(res["cleared"], json!(true));
    assert_eq!(res["errors"], json!({ "peerWeight": "x" }));

    let resp = request(
        &mut stdin,
        &mut reader,
        "5",
        "schedule.validate",
        json!({ "form": valid_form(), "now": "yesterday-ish" }),
    );
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("bad_params"));

    let resp = request(
        &mut stdin,
        &mut reader,
        "6",
        "schedule.validate",
        json!({ "flow": "archive", "form": valid_form() }),
    );
    assert_eq!(resp["error"]["code"], json!("bad_params"));

    drop(stdin);
    let _ = child.wait();
}
