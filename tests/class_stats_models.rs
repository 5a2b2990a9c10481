mod test_support;

use serde_json::json;
use test_support::{add_student, request_ok, seed_class, set_eot, spawn_sidecar, temp_dir};

#[test]
fn distribution_and_trend_cover_active_roster() {
    let workspace = temp_dir("gradingd-class-stats");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seeded = seed_class(&mut stdin, &mut reader);
    let grace = add_student(&mut stdin, &mut reader, &seeded.class_id, "Okello", "Grace");
    let ruth = add_student(&mut stdin, &mut reader, &seeded.class_id, "Akello", "Ruth");

    set_eot(&mut stdin, &mut reader, &seeded, 1, &grace,
        &[Some(85.0), Some(72.0), Some(66.0), Some(61.0), Some(30.0), Some(95.0)]);
    set_eot(&mut stdin, &mut reader, &seeded, 1, &ruth,
        &[Some(50.0), Some(45.0), Some(40.0), Some(35.0), Some(20.0), None]);

    let bot_entries: Vec<serde_json::Value> = seeded.subject_ids[..4]
        .iter()
        .map(|sid| json!({ "studentId": grace, "subjectId": sid, "bot": 80 }))
        .collect();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "bot",
        "marks.upsert",
        json!({
            "classId": seeded.class_id,
            "academicYearId": seeded.year_id,
            "term": 1,
            "entries": bot_entries
        }),
    );

    let scope = json!({
        "classId": seeded.class_id,
        "academicYearId": seeded.year_id,
        "term": 1
    });

    let dist = request_ok(&mut stdin, &mut reader, "d", "stats.classDistribution", scope.clone());
    assert_eq!(dist.get("examType").and_then(|v| v.as_str()), Some("eot"));
    assert_eq!(
        dist.get("academicYearId").and_then(|v| v.as_str()),
        Some(seeded.year_id.as_str())
    );
    assert_eq!(dist.get("term").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(dist.get("studentCount").and_then(|v| v.as_u64()), Some(2));
    let histogram: Vec<(String, u64)> = dist
        .get("gradeHistogram")
        .and_then(|v| v.as_array())
        .expect("gradeHistogram")
        .iter()
        .map(|b| {
            (
                b.get("grade").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                b.get("count").and_then(|v| v.as_u64()).unwrap_or(0),
            )
        })
        .collect();
    let expected: Vec<(String, u64)> = [
        ("D1", 1), ("D2", 1), ("C3", 1), ("C4", 1), ("C5", 0),
        ("C6", 1), ("P7", 1), ("P8", 1), ("F9", 3),
    ]
    .into_iter()
    .map(|(g, c)| (g.to_string(), c))
    .collect();
    assert_eq!(histogram, expected);

    let averages = dist
        .get("subjectAverages")
        .and_then(|v| v.as_array())
        .expect("subjectAverages");
    assert_eq!(averages.len(), 6);
    assert_eq!(averages[0].get("average").and_then(|v| v.as_f64()), Some(67.5));
    assert_eq!(averages[5].get("assessedCount").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(averages[5].get("average").and_then(|v| v.as_f64()), Some(95.0));

    let trend = request_ok(&mut stdin, &mut reader, "t", "stats.trend", scope.clone());
    let rows = trend.get("trend").and_then(|v| v.as_array()).expect("trend");
    let exam_types: Vec<&str> = rows
        .iter()
        .filter_map(|r| r.get("examType").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(exam_types, vec!["homework", "bot", "midterm", "eot"]);

    let homework = &rows[0];
    assert_eq!(homework.get("graded").and_then(|v| v.as_u64()), Some(0));
    assert!(homework.get("meanAggregate").map(|v| v.is_null()).unwrap_or(false));
    assert_eq!(homework.get("passRate").and_then(|v| v.as_f64()), Some(0.0));

    let bot = &rows[1];
    assert_eq!(bot.get("graded").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(bot.get("incomplete").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(bot.get("meanAggregate").and_then(|v| v.as_f64()), Some(4.0));
    assert_eq!(bot.get("passRate").and_then(|v| v.as_f64()), Some(0.5));

    let eot = &rows[3];
    assert_eq!(eot.get("graded").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(eot.get("meanAggregate").and_then(|v| v.as_f64()), Some(20.0));
    assert_eq!(eot.get("passRate").and_then(|v| v.as_f64()), Some(1.0));

    // Deactivated students drop out of every class model.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "off",
        "students.update",
        json!({ "classId": seeded.class_id, "studentId": ruth, "patch": { "active": false } }),
    );
    let dist = request_ok(&mut stdin, &mut reader, "d2", "stats.classDistribution", scope.clone());
    assert_eq!(dist.get("studentCount").and_then(|v| v.as_u64()), Some(1));
    let divs = request_ok(&mut stdin, &mut reader, "dv", "divisions.class", scope);
    assert_eq!(
        divs.get("statistics")
            .and_then(|s| s.get("passRate"))
            .and_then(|v| v.as_f64()),
        Some(1.0)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
