use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_classroomd");
    let mut child = Command::new(exe)
        .args(["--backend", "memory", "--token-secret", "smoke"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn classroomd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn send_line(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    line: &str,
) -> serde_json::Value {
    writeln!(stdin, "{}", line).expect("write request");
    stdin.flush().expect("flush request");
    let mut out = String::new();
    reader.read_line(&mut out).expect("read response line");
    serde_json::from_str(out.trim()).expect("parse response json")
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    token: Option<&str>,
    params: serde_json::Value,
) -> serde_json::Value {
    let mut payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    if let Some(t) = token {
        payload["token"] = json!(t);
    }
    let value = send_line(stdin, reader, &payload.to_string());
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn error_code(v: &serde_json::Value) -> &str {
    v.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_str())
        .unwrap_or("")
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", None, json!({}));
    assert_eq!(health["ok"], true);
    assert_eq!(health["result"]["backend"], "memory");
    assert_eq!(health["result"]["storeOpen"], true);

    // Every authenticated family answers with unauthenticated, never unknown.
    let methods = [
        "auth.me",
        "users.list",
        "classes.list",
        "chapters.list",
        "exercises.list",
        "quizzes.list",
        "quizzes.submit",
        "exercises.submitSolutions",
        "progress.save",
        "feedback.submit",
        "stats.admin",
        "stats.feedback",
        "messages.list",
        "notifications.list",
    ];
    for (i, m) in methods.iter().enumerate() {
        let params = json!({
            "classId": "c",
            "quizId": "q",
            "exerciseId": "e",
        });
        let v = request(
            &mut stdin,
            &mut reader,
            &format!("m{i}"),
            m,
            None,
            params,
        );
        assert_eq!(v["ok"], false, "{m}");
        assert_eq!(error_code(&v), "unauthenticated", "{m}");
        assert_eq!(v["error"]["status"], 401, "{m}");
    }

    let forged = request(
        &mut stdin,
        &mut reader,
        "2",
        "auth.me",
        Some("abc.2000000000.deadbeef"),
        json!({}),
    );
    assert_eq!(error_code(&forged), "unauthenticated");

    let select = request(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        None,
        json!({ "path": "/tmp/never-used" }),
    );
    assert_eq!(error_code(&select), "bad_params");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn unknown_methods_and_bad_json_are_reported() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let v = send_line(
        &mut stdin,
        &mut reader,
        &json!({ "id": "x", "method": "nope.nothing" }).to_string(),
    );
    assert_eq!(v["ok"], false);
    assert_eq!(error_code(&v), "not_implemented");

    let v = send_line(&mut stdin, &mut reader, "{not json");
    assert_eq!(v["ok"], false);
    assert_eq!(error_code(&v), "bad_json");
    assert_eq!(v["error"]["status"], 400);

    // The loop keeps serving after a malformed line.
    let v = send_line(
        &mut stdin,
        &mut reader,
        &json!({ "id": "h", "method": "health" }).to_string(),
    );
    assert_eq!(v["ok"], true);

    drop(stdin);
    let _ = child.wait();
}
