mod test_support;

use serde_json::json;
use test_support::{add_student, request_ok, seed_class, set_eot, spawn_sidecar, temp_dir};

fn division_of<'a>(rows: &'a serde_json::Value, key: &str, student_id: &str) -> &'a serde_json::Value {
    rows.as_array()
        .expect("rows array")
        .iter()
        .find(|r| r.get("studentId").and_then(|v| v.as_str()) == Some(student_id))
        .and_then(|r| r.get(key))
        .unwrap_or_else(|| panic!("no {} for {}", key, student_id))
}

#[test]
fn detail_bulk_and_class_divisions_agree() {
    let workspace = temp_dir("gradingd-division-alignment");
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
    let peter = add_student(&mut stdin, &mut reader, &seeded.class_id, "Namu", "Peter");
    let ruth = add_student(&mut stdin, &mut reader, &seeded.class_id, "Akello", "Ruth");
    let gone = add_student(&mut stdin, &mut reader, &seeded.class_id, "Mugisha", "Paul");

    set_eot(&mut stdin, &mut reader, &seeded, 1, &grace,
        &[Some(85.0), Some(72.0), Some(66.0), Some(61.0), Some(30.0), Some(95.0)]);
    set_eot(&mut stdin, &mut reader, &seeded, 1, &peter,
        &[Some(70.0), Some(70.0), Some(70.0), None, None, Some(90.0)]);
    set_eot(&mut stdin, &mut reader, &seeded, 1, &ruth,
        &[Some(50.0), Some(45.0), Some(40.0), Some(35.0), Some(20.0), None]);
    set_eot(&mut stdin, &mut reader, &seeded, 1, &gone,
        &[Some(99.0), Some(99.0), Some(99.0), Some(99.0), Some(99.0), None]);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "deactivate",
        "students.update",
        json!({ "classId": seeded.class_id, "studentId": gone, "patch": { "active": false } }),
    );

    let scope = json!({
        "classId": seeded.class_id,
        "academicYearId": seeded.year_id,
        "term": 1,
        "examType": "eot"
    });

    let class_div = request_ok(&mut stdin, &mut reader, "dc", "divisions.class", scope.clone());
    let rows = class_div.get("students").expect("students");
    assert_eq!(rows.as_array().map(|a| a.len()), Some(3));
    assert_eq!(class_div.get("tableSource").and_then(|v| v.as_str()), Some("preset"));

    let g = division_of(rows, "division", &grace);
    assert_eq!(g.get("status").and_then(|v| v.as_str()), Some("graded"));
    assert_eq!(g.get("aggregate").and_then(|v| v.as_u64()), Some(10));
    assert_eq!(g.get("division").and_then(|v| v.as_str()), Some("DIVISION_1"));
    assert_eq!(g.get("label").and_then(|v| v.as_str()), Some("Division I"));
    let picked: Vec<&str> = g
        .get("subjects")
        .and_then(|v| v.as_array())
        .expect("subjects")
        .iter()
        .filter_map(|s| s.get("grade").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(picked, vec!["D1", "D2", "C3", "C4"]);

    let p = division_of(rows, "division", &peter);
    assert_eq!(p.get("status").and_then(|v| v.as_str()), Some("incomplete"));
    assert_eq!(
        p.get("reason").and_then(|v| v.as_str()),
        Some("too_few_assessed_subjects")
    );
    assert_eq!(p.get("assessedCount").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(p.get("generalCount").and_then(|v| v.as_u64()), Some(5));

    let r = division_of(rows, "division", &ruth);
    assert_eq!(r.get("aggregate").and_then(|v| v.as_u64()), Some(30));
    assert_eq!(r.get("division").and_then(|v| v.as_str()), Some("DIVISION_3"));

    let stats = class_div.get("statistics").expect("statistics");
    assert_eq!(stats.get("total").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(stats.get("graded").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(stats.get("incomplete").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(stats.get("passed").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(stats.get("passRate").and_then(|v| v.as_f64()), Some(0.67));
    assert_eq!(
        stats
            .get("perDivisionCounts")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(6)
    );

    let bulk = request_ok(&mut stdin, &mut reader, "rb", "reports.classBulk", scope.clone());
    let reports = bulk.get("reports").expect("reports");
    assert_eq!(reports.as_array().map(|a| a.len()), Some(3));

    for (i, sid) in [&grace, &peter, &ruth].into_iter().enumerate() {
        let from_class = division_of(rows, "division", sid);
        let from_bulk = division_of(reports, "division", sid);
        assert_eq!(from_class, from_bulk, "bulk report disagrees for {}", sid);

        let mut detail_params = scope.clone();
        detail_params["studentId"] = json!(sid);
        let detail = request_ok(
            &mut stdin,
            &mut reader,
            &format!("rd{}", i),
            "reports.studentDetail",
            detail_params.clone(),
        );
        assert_eq!(
            detail.get("report").and_then(|r| r.get("division")),
            Some(from_class),
            "detail report disagrees for {}",
            sid
        );

        let single = request_ok(
            &mut stdin,
            &mut reader,
            &format!("ds{}", i),
            "divisions.student",
            detail_params,
        );
        assert_eq!(
            single.get("student").and_then(|s| s.get("division")),
            Some(from_class),
            "divisions.student disagrees for {}",
            sid
        );
    }

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn report_rows_use_report_table_and_derived_totals() {
    let workspace = temp_dir("gradingd-report-rows");
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
    set_eot(&mut stdin, &mut reader, &seeded, 2, &grace,
        &[Some(85.0), Some(72.0), Some(66.0), Some(61.0), Some(30.0), Some(95.0)]);

    // Stored total wins over eot; components alone are averaged.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "m",
        "marks.upsert",
        json!({
            "classId": seeded.class_id,
            "academicYearId": seeded.year_id,
            "term": 2,
            "entries": [
                { "studentId": grace, "subjectId": seeded.subject_ids[0], "total": 55, "grade": "D" },
                { "studentId": grace, "subjectId": seeded.subject_ids[4], "eot": null, "homework": 70, "bot": 80, "midterm": 0 }
            ]
        }),
    );

    let detail = request_ok(
        &mut stdin,
        &mut reader,
        "rd",
        "reports.studentDetail",
        json!({
            "classId": seeded.class_id,
            "academicYearId": seeded.year_id,
            "term": 2,
            "studentId": grace
        }),
    );
    let report = detail.get("report").expect("report");
    assert_eq!(report.get("examType").and_then(|v| v.as_str()), Some("eot"));
    let subjects = report.get("subjects").and_then(|v| v.as_array()).expect("subjects");
    assert_eq!(subjects.len(), 6);

    let eng = &subjects[0];
    assert_eq!(eng.get("total").and_then(|v| v.as_f64()), Some(55.0));
    assert_eq!(eng.get("grade").and_then(|v| v.as_str()), Some("D"));
    assert_eq!(eng.get("comment").and_then(|v| v.as_str()), Some("Fair"));
    assert_eq!(eng.get("storedGrade").and_then(|v| v.as_str()), Some("D"));

    let lit = &subjects[4];
    assert_eq!(lit.get("total").and_then(|v| v.as_f64()), Some(75.0));
    assert_eq!(lit.get("grade").and_then(|v| v.as_str()), Some("B"));

    let cre = &subjects[5];
    assert_eq!(cre.get("category").and_then(|v| v.as_str()), Some("RELIGIOUS"));
    assert_eq!(cre.get("grade").and_then(|v| v.as_str()), Some("A"));
    assert_eq!(cre.get("comment").and_then(|v| v.as_str()), Some("Excellent"));

    // (55 + 72 + 66 + 61 + 75) / 5
    assert_eq!(report.get("average").and_then(|v| v.as_f64()), Some(65.8));

    // The eot division ignores the stored total: eng still counts as 85.
    let division = report.get("division").expect("division");
    assert_eq!(division.get("aggregate").and_then(|v| v.as_u64()), Some(10));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
