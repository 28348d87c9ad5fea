use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_classroomd");
    let mut child = Command::new(exe)
        .args(["--backend", "memory", "--token-secret", "exercise-flow"])
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

fn problem_ids(exercise: &serde_json::Value) -> Vec<String> {
    exercise["problems"]
        .as_array()
        .expect("problems")
        .iter()
        .map(|p| p["id"].as_str().expect("problem id").to_string())
        .collect()
}

#[test]
fn feedback_is_upserted_and_pruned_with_removed_problems() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (teacher, _) = register(&mut stdin, &mut reader, "author", "teacher");
    let (student, student_id) = register(&mut stdin, &mut reader, "pupil", "student");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "exercises.create",
        Some(&teacher),
        json!({
            "gradeLevel": "5",
            "chapter": "Fractions",
            "problems": [
                { "text": "Add", "subProblems": [{ "text": "1/2 + 1/4" }, { "text": "1/3 + 1/6" }] },
                { "text": "Subtract" },
                { "text": "Multiply" },
            ],
        }),
    );
    let exercise = &created["exercise"];
    let exercise_id = exercise["id"].as_str().expect("exercise id").to_string();
    let ids = problem_ids(exercise);
    assert_eq!(exercise["problems"][2]["number"], 3);
    assert_eq!(exercise["problems"][0]["subProblems"][1]["label"], "b");
    let sub_b = exercise["problems"][0]["subProblems"][1]["id"]
        .as_str()
        .expect("sub id")
        .to_string();

    for (i, difficulty) in ["easy", "hard"].iter().enumerate() {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("fb{i}"),
            "feedback.submit",
            Some(&student),
            json!({
                "exerciseId": exercise_id,
                "questionId": ids[1],
                "difficulty": difficulty,
            }),
        );
    }
    let feedback = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "feedback.submit",
        Some(&student),
        json!({
            "exerciseId": exercise_id,
            "questionId": ids[0],
            "subQuestionId": sub_b,
            "difficulty": "medium",
        }),
    );
    let entries = feedback["feedback"].as_array().expect("feedback");
    assert_eq!(entries.len(), 2);
    let second = entries
        .iter()
        .find(|f| f["questionId"] == ids[1].as_str())
        .expect("entry for problem 2");
    assert_eq!(second["difficulty"], "hard");

    let unknown = request(
        &mut stdin,
        &mut reader,
        "3",
        "feedback.submit",
        Some(&student),
        json!({ "exerciseId": exercise_id, "questionId": "missing", "difficulty": "easy" }),
    );
    assert_eq!(unknown["error"]["code"], "bad_params");

    let bad_solution = request(
        &mut stdin,
        &mut reader,
        "4",
        "exercises.submitSolutions",
        Some(&student),
        json!({
            "exerciseId": exercise_id,
            "solutions": [{ "problemId": "missing", "solutionText": "x" }],
        }),
    );
    assert_eq!(bad_solution["error"]["code"], "bad_params");

    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "exercises.submitSolutions",
        Some(&student),
        json!({
            "exerciseId": exercise_id,
            "solutions": [{ "problemId": ids[2], "solutionText": "42" }],
        }),
    );

    let removed = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "exercises.removeProblem",
        Some(&teacher),
        json!({ "exerciseId": exercise_id, "problemId": ids[1] }),
    );
    let remaining = problem_ids(&removed["exercise"]);
    assert_eq!(remaining, vec![ids[0].clone(), ids[2].clone()]);
    assert_eq!(removed["exercise"]["problems"][1]["number"], 2);

    let removed_sub = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "exercises.removeSubProblem",
        Some(&teacher),
        json!({ "exerciseId": exercise_id, "problemId": ids[0], "subProblemId": sub_b }),
    );
    let subs = removed_sub["exercise"]["problems"][0]["subProblems"]
        .as_array()
        .expect("sub problems");
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0]["label"], "a");

    // Both rated nodes are gone, so the student's feedback is empty.
    let after = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "feedback.get",
        Some(&teacher),
        json!({ "exerciseId": exercise_id, "studentId": student_id }),
    );
    assert_eq!(after["feedback"], json!([]));

    let solutions = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "exercises.solutions",
        Some(&teacher),
        json!({ "exerciseId": exercise_id }),
    );
    assert_eq!(solutions["submissions"].as_array().map(|a| a.len()), Some(1));

    request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "exercises.delete",
        Some(&teacher),
        json!({ "exerciseId": exercise_id }),
    );
    let gone = request(
        &mut stdin,
        &mut reader,
        "11",
        "exercises.solutions",
        Some(&teacher),
        json!({ "exerciseId": exercise_id }),
    );
    assert_eq!(gone["error"]["code"], "not_found");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn exercise_authoring_is_limited_to_owners() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (owner, _) = register(&mut stdin, &mut reader, "owner", "teacher");
    let (other, _) = register(&mut stdin, &mut reader, "other", "teacher");
    let (student, _) = register(&mut stdin, &mut reader, "kid", "student");

    let by_student = request(
        &mut stdin,
        &mut reader,
        "1",
        "exercises.create",
        Some(&student),
        json!({ "gradeLevel": "5", "chapter": "X", "problems": [{ "text": "P" }] }),
    );
    assert_eq!(by_student["error"]["code"], "forbidden");

    let empty = request(
        &mut stdin,
        &mut reader,
        "2",
        "exercises.create",
        Some(&owner),
        json!({ "gradeLevel": "5", "chapter": "X", "problems": [] }),
    );
    assert_eq!(empty["error"]["code"], "bad_params");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "exercises.create",
        Some(&owner),
        json!({ "gradeLevel": "5", "chapter": "Geometry", "questions": [{ "text": "Area" }] }),
    );
    let exercise_id = created["exercise"]["id"].as_str().expect("id").to_string();

    let foreign = request(
        &mut stdin,
        &mut reader,
        "4",
        "exercises.update",
        Some(&other),
        json!({ "exerciseId": exercise_id, "chapter": "Hijacked" }),
    );
    assert_eq!(foreign["error"]["code"], "forbidden");
    assert_eq!(foreign["error"]["status"], 403);

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "exercises.list",
        Some(&student),
        json!({ "gradeLevel": "5" }),
    );
    assert_eq!(listed["exercises"].as_array().map(|a| a.len()), Some(1));

    let other_chapter = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "exercises.list",
        Some(&student),
        json!({ "chapter": "Algebra" }),
    );
    assert_eq!(other_chapter["exercises"], json!([]));

    drop(stdin);
    let _ = child.wait();
}
