use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_classroomd");
    let mut child = Command::new(exe)
        .args(["--backend", "memory", "--token-secret", "classes-flow"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn classroomd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    token: Option<&str>,
    params: serde_json::Value,
) -> serde_json::Value {
    let mut payload = json!({ "id": id, "method": method, "params": params });
    if let Some(t) = token {
        payload["token"] = json!(t);
    }
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value["id"], id);
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    token: Option<&str>,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, token, params);
    assert_eq!(value["ok"], true, "{} failed: {}", method, value);
    value["result"].clone()
}

fn register(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    name: &str,
    role: &str,
) -> (String, String) {
    let result = request_ok(
        stdin,
        reader,
        &format!("reg-{name}"),
        "auth.register",
        None,
        json!({
            "email": format!("{name}@school.test"),
            "password": "secret-pass",
            "fullName": name,
            "role": role,
            "gradeLevel": "5",
        }),
    );
    let token = result["token"].as_str().expect("token").to_string();
    let user_id = result["user"]["id"].as_str().expect("user id").to_string();
    (token, user_id)
}

#[test]
fn class_lifecycle_and_enrollment_rules() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (owner, _) = register(&mut stdin, &mut reader, "owner", "teacher");
    let (other, _) = register(&mut stdin, &mut reader, "other", "teacher");
    let (student, student_id) = register(&mut stdin, &mut reader, "kid", "student");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "classes.create",
        Some(&owner),
        json!({ "name": "  Algebra I ", "description": "Mornings" }),
    );
    let class_id = created["class"]["id"].as_str().expect("class id").to_string();
    assert_eq!(created["class"]["name"], "Algebra I");

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.get",
        Some(&owner),
        json!({ "classId": class_id }),
    );
    assert_eq!(fetched["class"]["name"], "Algebra I");
    assert_eq!(fetched["class"]["description"], "Mornings");

    let by_student = request(
        &mut stdin,
        &mut reader,
        "3",
        "classes.create",
        Some(&student),
        json!({ "name": "Mine" }),
    );
    assert_eq!(by_student["error"]["code"], "forbidden");

    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "classes.enroll",
        Some(&student),
        json!({ "classId": class_id }),
    );
    let again = request(
        &mut stdin,
        &mut reader,
        "5",
        "classes.enroll",
        Some(&owner),
        json!({ "classId": class_id, "userId": student_id }),
    );
    assert_eq!(again["error"]["code"], "bad_params");

    let listed = request_ok(&mut stdin, &mut reader, "6", "classes.list", Some(&owner), json!({}));
    assert_eq!(listed["classes"][0]["enrollmentCount"], 1);

    let detail = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "classes.get",
        Some(&owner),
        json!({ "classId": class_id }),
    );
    assert_eq!(detail["class"]["students"][0]["id"], student_id.as_str());

    request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "classes.unenroll",
        Some(&student),
        json!({ "classId": class_id }),
    );
    let not_enrolled = request(
        &mut stdin,
        &mut reader,
        "9",
        "classes.unenroll",
        Some(&student),
        json!({ "classId": class_id }),
    );
    assert_eq!(not_enrolled["error"]["code"], "not_found");

    // Another teacher gets 403 on an existing class and 404 on a missing one.
    let forbidden = request(
        &mut stdin,
        &mut reader,
        "10",
        "classes.delete",
        Some(&other),
        json!({ "classId": class_id }),
    );
    assert_eq!(forbidden["error"]["status"], 403);
    let missing = request(
        &mut stdin,
        &mut reader,
        "11",
        "classes.delete",
        Some(&other),
        json!({ "classId": "no-such-class" }),
    );
    assert_eq!(missing["error"]["status"], 404);

    request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "classes.delete",
        Some(&owner),
        json!({ "classId": class_id }),
    );
    let after = request(
        &mut stdin,
        &mut reader,
        "13",
        "classes.get",
        Some(&owner),
        json!({ "classId": class_id }),
    );
    assert_eq!(after["error"]["code"], "not_found");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn chapters_reorder_over_ipc() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (owner, _) = register(&mut stdin, &mut reader, "owner", "teacher");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "classes.create",
        Some(&owner),
        json!({ "name": "TRC" }),
    );
    let class_id = created["class"]["id"].as_str().expect("class id").to_string();

    let mut ids = Vec::new();
    for (i, title) in ["Intro", "Middle", "End"].iter().enumerate() {
        let chapter = request_ok(
            &mut stdin,
            &mut reader,
            &format!("c{i}"),
            "chapters.create",
            Some(&owner),
            json!({ "classId": class_id, "title": title, "content": "..." }),
        );
        assert_eq!(chapter["chapter"]["order"], i as i64);
        ids.push(chapter["chapter"]["id"].as_str().expect("chapter id").to_string());
    }

    let reordered = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "chapters.reorder",
        Some(&owner),
        json!({
            "classId": class_id,
            "orders": [
                { "id": ids[0], "order": 2 },
                { "id": ids[2], "order": 0 },
                { "id": ids[1], "order": 1 },
            ],
        }),
    );
    let titles: Vec<&str> = reordered["chapters"]
        .as_array()
        .expect("chapters")
        .iter()
        .filter_map(|c| c["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["End", "Middle", "Intro"]);

    let duplicate = request(
        &mut stdin,
        &mut reader,
        "3",
        "chapters.reorder",
        Some(&owner),
        json!({
            "classId": class_id,
            "orders": [{ "id": ids[0], "order": 0 }, { "id": ids[0], "order": 1 }],
        }),
    );
    assert_eq!(duplicate["error"]["code"], "bad_params");
    assert_eq!(duplicate["error"]["details"]["chapterId"], ids[0].as_str());

    let unknown = request(
        &mut stdin,
        &mut reader,
        "4",
        "chapters.reorder",
        Some(&owner),
        json!({ "classId": class_id, "orders": [{ "id": "ghost", "order": 0 }] }),
    );
    assert_eq!(unknown["error"]["code"], "bad_params");

    // A rejected reorder leaves the stored order alone.
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "chapters.list",
        Some(&owner),
        json!({ "classId": class_id }),
    );
    assert_eq!(listed["chapters"][0]["id"], ids[2].as_str());

    request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "chapters.delete",
        Some(&owner),
        json!({ "chapterId": ids[1] }),
    );
    let missing = request(
        &mut stdin,
        &mut reader,
        "7",
        "chapters.get",
        Some(&owner),
        json!({ "chapterId": ids[1] }),
    );
    assert_eq!(missing["error"]["code"], "not_found");

    drop(stdin);
    let _ = child.wait();
}
