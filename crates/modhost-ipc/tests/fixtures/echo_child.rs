//! Scripted stand-in for a foreign-language module process, used by the
//! integration tests in `tests/ipc_manager.rs`. Emits the readiness frame,
//! then for each request echoes its args back as the result — except
//! request id 1, whose reply is deliberately delayed past id 2's so tests
//! can assert that out-of-order replies still correlate correctly, and
//! request id 99, which never replies (used to exercise the timeout path).

use std::io::{self, BufRead, Write};

fn main() {
    println!("{{\"ready\":true}}");
    io::stdout().flush().unwrap();

    let stdin = io::stdin();
    let mut pending_id1: Option<serde_json::Value> = None;

    for line in stdin.lock().lines() {
        let line = line.unwrap();
        let request: serde_json::Value = serde_json::from_str(&line).unwrap();
        let id = request["id"].as_i64().unwrap();
        let method = request["method"].as_str().unwrap_or_default();

        if method == "never_replies" {
            continue;
        }

        if id == 1 {
            pending_id1 = Some(request);
            continue;
        }

        reply(&request);
        if let Some(delayed) = pending_id1.take() {
            reply(&delayed);
        }
    }
}

fn reply(request: &serde_json::Value) {
    let response = serde_json::json!({
        "id": request["id"],
        "ok": true,
        "result": request["args"],
    });
    println!("{}", response);
    io::stdout().flush().unwrap();
}
