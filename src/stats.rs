use crate::division::{
    compute_division, grade_general_subjects, Division, DivisionOutcome, ExamType, SubjectMark,
};
use crate::grading::GradingTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentMarks {
    pub student_id: String,
    pub marks: Vec<SubjectMark>,
}

pub fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Each student is computed on its own; a student without enough assessed
/// subjects becomes an `Incomplete` entry and the rest of the batch carries on.
pub fn compute_class_divisions(
    students: &[StudentMarks],
    exam_type: ExamType,
    table: &GradingTable,
) -> BTreeMap<String, DivisionOutcome> {
    let out: BTreeMap<String, DivisionOutcome> = students
        .iter()
        .map(|s| {
            (
                s.student_id.clone(),
                compute_division(&s.marks, exam_type, table),
            )
        })
        .collect();
    let incomplete = out.values().filter(|o| o.is_incomplete()).count();
    tracing::debug!(
        exam_type = exam_type.as_str(),
        students = out.len(),
        incomplete,
        "computed class divisions"
    );
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DivisionCount {
    pub division: Division,
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DivisionStatistics {
    pub total: usize,
    pub graded: usize,
    pub incomplete: usize,
    pub per_division_counts: Vec<DivisionCount>,
    pub passed: usize,
    pub pass_rate: f64,
}

/// `pass_rate` is `passed / total` over every entry, incomplete ones
/// included, rounded to 2 decimals.
pub fn class_division_statistics(
    results: &BTreeMap<String, DivisionOutcome>,
) -> DivisionStatistics {
    let mut counts: BTreeMap<Division, usize> = Division::ALL.iter().map(|d| (*d, 0)).collect();
    let mut graded = 0_usize;
    let mut passed = 0_usize;
    for outcome in results.values() {
        let Some(r) = outcome.graded() else {
            continue;
        };
        graded += 1;
        if r.passed {
            passed += 1;
        }
        *counts.entry(r.division).or_insert(0) += 1;
    }

    let total = results.len();
    let pass_rate = if total > 0 {
        round_2_decimals(passed as f64 / total as f64)
    } else {
        0.0
    };

    DivisionStatistics {
        total,
        graded,
        incomplete: total - graded,
        per_division_counts: counts
            .into_iter()
            .map(|(division, count)| DivisionCount {
                division,
                label: division.label().to_string(),
                count,
            })
            .collect(),
        passed,
        pass_rate,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeCount {
    pub grade: String,
    pub count: usize,
}

/// Grade counts over every assessed GENERAL subject score, in table order.
pub fn grade_histogram(
    students: &[StudentMarks],
    exam_type: ExamType,
    table: &GradingTable,
) -> Vec<GradeCount> {
    let mut bins: Vec<GradeCount> = table
        .grades()
        .into_iter()
        .map(|grade| GradeCount { grade, count: 0 })
        .collect();
    for s in students {
        for graded in grade_general_subjects(&s.marks, exam_type, table) {
            match bins
                .iter_mut()
                .find(|b| b.grade.eq_ignore_ascii_case(&graded.grade))
            {
                Some(bin) => bin.count += 1,
                None => bins.push(GradeCount {
                    grade: graded.grade,
                    count: 1,
                }),
            }
        }
    }
    bins
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAverage {
    pub subject_id: String,
    pub subject_name: String,
    pub category: String,
    pub assessed_count: usize,
    pub average: Option<f64>,
}

/// Mean score per subject over students with a valid score, in first-seen
/// subject order.
pub fn subject_averages(students: &[StudentMarks], exam_type: ExamType) -> Vec<SubjectAverage> {
    let mut order: Vec<(String, String, String)> = Vec::new();
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for s in students {
        for m in &s.marks {
            if !sums.contains_key(&m.subject_id) {
                order.push((
                    m.subject_id.clone(),
                    m.subject_name.clone(),
                    m.category.clone(),
                ));
                sums.insert(m.subject_id.clone(), (0.0, 0));
            }
            if let Some(score) = m.score_for(exam_type) {
                if let Some(entry) = sums.get_mut(&m.subject_id) {
                    entry.0 += score;
                    entry.1 += 1;
                }
            }
        }
    }

    order
        .into_iter()
        .map(|(subject_id, subject_name, category)| {
            let (sum, n) = sums.get(&subject_id).copied().unwrap_or((0.0, 0));
            SubjectAverage {
                subject_id,
                subject_name,
                category,
                assessed_count: n,
                average: if n > 0 {
                    Some(round_2_decimals(sum / n as f64))
                } else {
                    None
                },
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamTypeSummary {
    pub exam_type: ExamType,
    pub graded: usize,
    pub incomplete: usize,
    pub mean_aggregate: Option<f64>,
    pub pass_rate: f64,
}

/// Class summary for each assessment of the term, in term order.
pub fn exam_type_trend(students: &[StudentMarks], table: &GradingTable) -> Vec<ExamTypeSummary> {
    ExamType::ASSESSMENTS
        .iter()
        .map(|&exam_type| {
            let results = compute_class_divisions(students, exam_type, table);
            let stats = class_division_statistics(&results);
            let aggregates: Vec<u32> = results
                .values()
                .filter_map(|o| o.graded().map(|r| r.aggregate))
                .collect();
            let mean_aggregate = if aggregates.is_empty() {
                None
            } else {
                let sum: u32 = aggregates.iter().sum();
                Some(round_2_decimals(sum as f64 / aggregates.len() as f64))
            };
            ExamTypeSummary {
                exam_type,
                graded: stats.graded,
                incomplete: stats.incomplete,
                mean_aggregate,
                pass_rate: stats.pass_rate,
            }
        })
        .collect()
}
