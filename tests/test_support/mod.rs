#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradingd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradingd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn send_line(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, line: &str) -> serde_json::Value {
    writeln!(stdin, "{}", line).expect("write request");
    stdin.flush().expect("flush request");

    let mut out = String::new();
    reader.read_line(&mut out).expect("read response line");
    assert!(!out.trim().is_empty(), "empty response for {}", line);
    serde_json::from_str(out.trim()).expect("parse response json")
}

pub fn request(
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
    let value = send_line(stdin, reader, &payload.to_string());
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
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
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

/// Returns the full `error` object after asserting the request failed.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded",
        method
    );
    value.get("error").cloned().expect("error object")
}

pub fn str_field(v: &serde_json::Value, key: &str) -> String {
    v.get(key)
        .and_then(|x| x.as_str())
        .unwrap_or_else(|| panic!("missing string field {}", key))
        .to_string()
}

/// A class with an academic year, five GENERAL subjects and one optional
/// subject, ready for marks.
pub struct SeededClass {
    pub year_id: String,
    pub class_id: String,
    /// eng, mtc, sci, sst, lit (GENERAL) then cre (RELIGIOUS).
    pub subject_ids: Vec<String>,
}

pub fn seed_class(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> SeededClass {
    let year = request_ok(
        stdin,
        reader,
        "seed-year",
        "academicYears.create",
        json!({ "name": "2024", "active": true }),
    );
    let class = request_ok(
        stdin,
        reader,
        "seed-class",
        "classes.create",
        json!({ "name": "P7 Blue" }),
    );
    let class_id = str_field(&class, "classId");

    let mut subject_ids = Vec::new();
    for (i, (name, category)) in [
        ("English", None),
        ("Mathematics", None),
        ("Science", None),
        ("Social Studies", None),
        ("Literacy", Some("general")),
        ("CRE", Some("religious")),
    ]
    .into_iter()
    .enumerate()
    {
        let mut params = json!({ "classId": class_id, "name": name });
        if let Some(c) = category {
            params["category"] = json!(c);
        }
        let created = request_ok(stdin, reader, &format!("seed-subj-{}", i), "subjects.create", params);
        subject_ids.push(str_field(&created, "subjectId"));
    }

    SeededClass {
        year_id: str_field(&year, "academicYearId"),
        class_id,
        subject_ids,
    }
}

pub fn add_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    class_id: &str,
    last: &str,
    first: &str,
) -> String {
    let created = request_ok(
        stdin,
        reader,
        &format!("add-{}-{}", last, first),
        "students.create",
        json!({ "classId": class_id, "lastName": last, "firstName": first }),
    );
    str_field(&created, "studentId")
}

/// Writes end-of-term scores, one per subject in `subject_ids` order. `None`
/// leaves that subject without a mark.
pub fn set_eot(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    seeded: &SeededClass,
    term: i64,
    student_id: &str,
    scores: &[Option<f64>],
) {
    let entries: Vec<serde_json::Value> = seeded
        .subject_ids
        .iter()
        .zip(scores)
        .filter_map(|(subject_id, score)| {
            score.map(|s| json!({ "studentId": student_id, "subjectId": subject_id, "eot": s }))
        })
        .collect();
    let _ = request_ok(
        stdin,
        reader,
        &format!("eot-{}", student_id),
        "marks.upsert",
        json!({
            "classId": seeded.class_id,
            "academicYearId": seeded.year_id,
            "term": term,
            "entries": entries
        }),
    );
}
