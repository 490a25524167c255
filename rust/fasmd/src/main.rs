use fasmd::{ipc, logging, policy};
use std::io::{self, BufRead, Write};

fn main() {
    if let Err(e) = logging::init_tracing() {
        eprintln!("fasmd: logging disabled: {e}");
    }

    let mut state = ipc::AppState::default();
    // Best-effort: a bad policy file must not keep the sidecar from starting.
    match policy::load_from_env() {
        Ok(Some((path, loaded))) => {
            tracing::info!(path = %path.display(), "policy loaded from environment");
            state.policy = loaded;
            state.policy_path = Some(path);
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "ignoring {}", policy::POLICY_ENV);
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                tracing::warn!(error = %e, "bad request line");
                let _ = writeln!(stdout, "{}", ipc::bad_json(e.to_string()));
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
