use crate::config::EngineConfig;
use crate::division::{compute_division, round_mark, DivisionOutcome, ExamType, SubjectMark};
use crate::grading::{
    grade_to_comment, normalize_rules, resolve_grading_table, score_to_grade, GradeRule,
    GradingContext, GradingPreset, GradingTable, TableSource,
};
use crate::stats::{
    class_division_statistics, compute_class_divisions, exam_type_trend, grade_histogram,
    round_2_decimals, subject_averages, DivisionStatistics, ExamTypeSummary, GradeCount,
    StudentMarks, SubjectAverage,
};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;

pub const MIN_TERM: i64 = 1;
pub const MAX_TERM: i64 = 3;

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

fn db_err(e: rusqlite::Error) -> CalcError {
    CalcError::new("db_query_failed", e.to_string())
}

/// One assessment window of one class. The academic year is always explicit;
/// nothing below looks up an "active" year on its own.
#[derive(Debug, Clone)]
pub struct CalcContext<'a> {
    pub conn: &'a Connection,
    pub class_id: &'a str,
    pub academic_year_id: &'a str,
    pub term: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterStudent {
    pub student_id: String,
    pub display_name: String,
    pub sort_order: i64,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectDef {
    pub subject_id: String,
    pub name: String,
    pub category: String,
    pub sort_order: i64,
}

/// Roster, subjects and marks for a context. `marks[i]` belongs to
/// `students[i]` and holds one entry per subject, in subject order.
#[derive(Debug, Clone)]
pub struct ClassMarks {
    pub class: ClassSummary,
    pub subjects: Vec<SubjectDef>,
    pub students: Vec<RosterStudent>,
    pub marks: Vec<StudentMarks>,
}

impl ClassMarks {
    fn active(&self) -> (Vec<&RosterStudent>, Vec<StudentMarks>) {
        self.students
            .iter()
            .zip(&self.marks)
            .filter(|(s, _)| s.active)
            .map(|(s, m)| (s, m.clone()))
            .unzip()
    }

    fn find(&self, student_id: &str) -> Option<(&RosterStudent, &StudentMarks)> {
        self.students
            .iter()
            .zip(&self.marks)
            .find(|(s, _)| s.student_id == student_id)
    }
}

pub fn validate_term(term: i64) -> Result<i64, CalcError> {
    if (MIN_TERM..=MAX_TERM).contains(&term) {
        Ok(term)
    } else {
        Err(CalcError::new(
            "bad_params",
            format!("term must be in {}..={}", MIN_TERM, MAX_TERM),
        ))
    }
}

pub fn load_class_marks(ctx: &CalcContext<'_>) -> Result<ClassMarks, CalcError> {
    let conn = ctx.conn;

    let class_name: Option<String> = conn
        .query_row("SELECT name FROM classes WHERE id = ?", [ctx.class_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(db_err)?;
    let Some(class_name) = class_name else {
        return Err(CalcError::new("not_found", "class not found"));
    };

    let year: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM academic_years WHERE id = ?",
            [ctx.academic_year_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(db_err)?;
    if year.is_none() {
        return Err(CalcError::new("not_found", "academic year not found"));
    }
    validate_term(ctx.term)?;

    let mut students_stmt = conn
        .prepare(
            "SELECT id, last_name, first_name, sort_order, active
             FROM students
             WHERE class_id = ?
             ORDER BY sort_order",
        )
        .map_err(db_err)?;
    let students: Vec<RosterStudent> = students_stmt
        .query_map([ctx.class_id], |r| {
            let last: String = r.get(1)?;
            let first: String = r.get(2)?;
            Ok(RosterStudent {
                student_id: r.get(0)?,
                display_name: format!("{}, {}", last, first),
                sort_order: r.get(3)?,
                active: r.get::<_, i64>(4)? != 0,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    let mut subjects_stmt = conn
        .prepare(
            "SELECT id, name, category, sort_order
             FROM subjects
             WHERE class_id = ?
             ORDER BY sort_order",
        )
        .map_err(db_err)?;
    let subjects: Vec<SubjectDef> = subjects_stmt
        .query_map([ctx.class_id], |r| {
            Ok(SubjectDef {
                subject_id: r.get(0)?,
                name: r.get(1)?,
                category: r.get(2)?,
                sort_order: r.get(3)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    let mut marks_stmt = conn
        .prepare(
            "SELECT m.student_id, m.subject_id, m.homework, m.bot, m.midterm, m.eot, m.total, m.grade
             FROM marks m
             JOIN students s ON s.id = m.student_id
             WHERE s.class_id = ? AND m.academic_year_id = ? AND m.term = ?",
        )
        .map_err(db_err)?;
    type MarkRow = (
        Option<f64>,
        Option<f64>,
        Option<f64>,
        Option<f64>,
        Option<f64>,
        Option<String>,
    );
    let mut by_pair: HashMap<(String, String), MarkRow> = HashMap::new();
    let rows = marks_stmt
        .query_map((ctx.class_id, ctx.academic_year_id, ctx.term), |r| {
            let key: (String, String) = (r.get(0)?, r.get(1)?);
            let row: MarkRow = (r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?, r.get(6)?, r.get(7)?);
            Ok((key, row))
        })
        .map_err(db_err)?;
    for row in rows {
        let (key, value) = row.map_err(db_err)?;
        by_pair.insert(key, value);
    }

    let marks: Vec<StudentMarks> = students
        .iter()
        .map(|s| StudentMarks {
            student_id: s.student_id.clone(),
            marks: subjects
                .iter()
                .map(|subj| {
                    let (homework, bot, midterm, eot, total, grade) = by_pair
                        .get(&(s.student_id.clone(), subj.subject_id.clone()))
                        .cloned()
                        .unwrap_or_default();
                    SubjectMark {
                        subject_id: subj.subject_id.clone(),
                        subject_name: subj.name.clone(),
                        category: subj.category.clone(),
                        homework,
                        bot,
                        midterm,
                        eot,
                        total,
                        grade,
                    }
                })
                .collect(),
        })
        .collect();

    Ok(ClassMarks {
        class: ClassSummary {
            id: ctx.class_id.to_string(),
            name: class_name,
        },
        subjects,
        students,
        marks,
    })
}

/// Stored rules for exactly this scope (`None` = global), normalized.
pub fn load_stored_rules(
    conn: &Connection,
    context: GradingContext,
    academic_year_id: Option<&str>,
) -> Result<Vec<GradeRule>, CalcError> {
    let mut stmt = conn
        .prepare(
            "SELECT grade, min_mark, max_mark, comment
             FROM grading_rules
             WHERE context = ? AND academic_year_id IS ?
             ORDER BY sort_order",
        )
        .map_err(db_err)?;
    let raw: Vec<serde_json::Value> = stmt
        .query_map((context.as_str(), academic_year_id), |r| {
            Ok(json!({
                "grade": r.get::<_, String>(0)?,
                "minMark": r.get::<_, f64>(1)?,
                "maxMark": r.get::<_, f64>(2)?,
                "comment": r.get::<_, String>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;
    let (rules, _rejected) = normalize_rules(&raw);
    Ok(rules)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTable {
    pub context: GradingContext,
    pub source: TableSource,
    pub preset: GradingPreset,
    pub academic_year_id: Option<String>,
    pub table: GradingTable,
}

/// Year-scoped rules win over global rules; with neither, the configured
/// preset for the context applies.
pub fn resolve_table(
    conn: &Connection,
    context: GradingContext,
    academic_year_id: Option<&str>,
    config: &EngineConfig,
) -> Result<ResolvedTable, CalcError> {
    let preset = config.preset_for(context);
    let mut source = TableSource::Preset;
    let mut rules = Vec::new();
    if let Some(year) = academic_year_id {
        rules = load_stored_rules(conn, context, Some(year))?;
        if !rules.is_empty() {
            source = TableSource::Year;
        }
    }
    if rules.is_empty() {
        rules = load_stored_rules(conn, context, None)?;
        if !rules.is_empty() {
            source = TableSource::Global;
        }
    }
    Ok(ResolvedTable {
        context,
        source,
        preset,
        academic_year_id: academic_year_id.map(|s| s.to_string()),
        table: resolve_grading_table(rules, preset),
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSources {
    pub report: TableSource,
    pub division: TableSource,
}

struct EngineTables {
    report: ResolvedTable,
    division: ResolvedTable,
}

impl EngineTables {
    fn resolve(ctx: &CalcContext<'_>, config: &EngineConfig) -> Result<Self, CalcError> {
        Ok(Self {
            report: resolve_table(
                ctx.conn,
                GradingContext::Report,
                Some(ctx.academic_year_id),
                config,
            )?,
            division: resolve_table(
                ctx.conn,
                GradingContext::Division,
                Some(ctx.academic_year_id),
                config,
            )?,
        })
    }

    fn sources(&self) -> TableSources {
        TableSources {
            report: self.report.source,
            division: self.division.source,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSubjectRow {
    pub subject_id: String,
    pub subject_name: String,
    pub category: String,
    pub homework: Option<f64>,
    pub bot: Option<f64>,
    pub midterm: Option<f64>,
    pub eot: Option<f64>,
    pub total: Option<f64>,
    pub stored_grade: Option<String>,
    pub grade: Option<String>,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport {
    pub student_id: String,
    pub display_name: String,
    pub exam_type: ExamType,
    pub subjects: Vec<ReportSubjectRow>,
    /// Mean derived total over assessed GENERAL subjects.
    pub average: Option<f64>,
    pub division: DivisionOutcome,
}

/// The one report builder behind both the single-student and the bulk
/// report, so the two cannot disagree.
pub fn build_student_report(
    student: &RosterStudent,
    marks: &[SubjectMark],
    exam_type: ExamType,
    report_table: &GradingTable,
    division_table: &GradingTable,
) -> StudentReport {
    let subjects: Vec<ReportSubjectRow> = marks
        .iter()
        .map(|m| {
            let total = m.derived_total();
            let grade = total.map(|t| score_to_grade(round_mark(t), report_table));
            let comment = grade
                .as_deref()
                .map(|g| grade_to_comment(g, report_table))
                .unwrap_or_default();
            ReportSubjectRow {
                subject_id: m.subject_id.clone(),
                subject_name: m.subject_name.clone(),
                category: m.category.clone(),
                homework: m.homework,
                bot: m.bot,
                midterm: m.midterm,
                eot: m.eot,
                total: total.map(round_2_decimals),
                stored_grade: m.grade.clone(),
                grade,
                comment,
            }
        })
        .collect();

    let general_totals: Vec<f64> = marks
        .iter()
        .filter(|m| m.is_general())
        .filter_map(|m| m.derived_total())
        .collect();
    let average = if general_totals.is_empty() {
        None
    } else {
        Some(round_2_decimals(
            general_totals.iter().sum::<f64>() / general_totals.len() as f64,
        ))
    };

    StudentReport {
        student_id: student.student_id.clone(),
        display_name: student.display_name.clone(),
        exam_type,
        subjects,
        average,
        division: compute_division(marks, exam_type, division_table),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReportModel {
    pub class: ClassSummary,
    pub academic_year_id: String,
    pub term: i64,
    pub table_sources: TableSources,
    pub report: StudentReport,
}

pub fn compute_student_report(
    ctx: &CalcContext<'_>,
    student_id: &str,
    exam_type: ExamType,
    config: &EngineConfig,
) -> Result<StudentReportModel, CalcError> {
    let data = load_class_marks(ctx)?;
    let Some((student, marks)) = data.find(student_id) else {
        return Err(CalcError::new("not_found", "student not found in class"));
    };
    let tables = EngineTables::resolve(ctx, config)?;
    let report = build_student_report(
        student,
        &marks.marks,
        exam_type,
        &tables.report.table,
        &tables.division.table,
    );
    Ok(StudentReportModel {
        class: data.class.clone(),
        academic_year_id: ctx.academic_year_id.to_string(),
        term: ctx.term,
        table_sources: tables.sources(),
        report,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassReportsModel {
    pub class: ClassSummary,
    pub academic_year_id: String,
    pub term: i64,
    pub table_sources: TableSources,
    pub reports: Vec<StudentReport>,
}

/// Reports for every active student, in roster order.
pub fn compute_class_reports(
    ctx: &CalcContext<'_>,
    exam_type: ExamType,
    config: &EngineConfig,
) -> Result<ClassReportsModel, CalcError> {
    let data = load_class_marks(ctx)?;
    let tables = EngineTables::resolve(ctx, config)?;
    let (students, marks) = data.active();
    let reports = students
        .iter()
        .zip(&marks)
        .map(|(s, m)| {
            build_student_report(
                s,
                &m.marks,
                exam_type,
                &tables.report.table,
                &tables.division.table,
            )
        })
        .collect();
    Ok(ClassReportsModel {
        class: data.class.clone(),
        academic_year_id: ctx.academic_year_id.to_string(),
        term: ctx.term,
        table_sources: tables.sources(),
        reports,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDivisionRow {
    pub student_id: String,
    pub display_name: String,
    pub division: DivisionOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDivisionModel {
    pub class: ClassSummary,
    pub academic_year_id: String,
    pub term: i64,
    pub exam_type: ExamType,
    pub table_source: TableSource,
    pub student: StudentDivisionRow,
}

pub fn compute_student_division(
    ctx: &CalcContext<'_>,
    student_id: &str,
    exam_type: ExamType,
    config: &EngineConfig,
) -> Result<StudentDivisionModel, CalcError> {
    let data = load_class_marks(ctx)?;
    let Some((student, marks)) = data.find(student_id) else {
        return Err(CalcError::new("not_found", "student not found in class"));
    };
    let table = resolve_table(
        ctx.conn,
        GradingContext::Division,
        Some(ctx.academic_year_id),
        config,
    )?;
    Ok(StudentDivisionModel {
        class: data.class.clone(),
        academic_year_id: ctx.academic_year_id.to_string(),
        term: ctx.term,
        exam_type,
        table_source: table.source,
        student: StudentDivisionRow {
            student_id: student.student_id.clone(),
            display_name: student.display_name.clone(),
            division: compute_division(&marks.marks, exam_type, &table.table),
        },
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDivisionModel {
    pub class: ClassSummary,
    pub academic_year_id: String,
    pub term: i64,
    pub exam_type: ExamType,
    pub table_source: TableSource,
    pub students: Vec<StudentDivisionRow>,
    pub statistics: DivisionStatistics,
}

pub fn compute_class_division_model(
    ctx: &CalcContext<'_>,
    exam_type: ExamType,
    config: &EngineConfig,
) -> Result<ClassDivisionModel, CalcError> {
    let data = load_class_marks(ctx)?;
    let table = resolve_table(
        ctx.conn,
        GradingContext::Division,
        Some(ctx.academic_year_id),
        config,
    )?;
    let (students, marks) = data.active();
    let mut results = compute_class_divisions(&marks, exam_type, &table.table);
    let statistics = class_division_statistics(&results);

    let rows = students
        .iter()
        .filter_map(|s| {
            let division = results.remove(&s.student_id)?;
            Some(StudentDivisionRow {
                student_id: s.student_id.clone(),
                display_name: s.display_name.clone(),
                division,
            })
        })
        .collect();

    Ok(ClassDivisionModel {
        class: data.class.clone(),
        academic_year_id: ctx.academic_year_id.to_string(),
        term: ctx.term,
        exam_type,
        table_source: table.source,
        students: rows,
        statistics,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDistributionModel {
    pub class: ClassSummary,
    pub academic_year_id: String,
    pub term: i64,
    pub exam_type: ExamType,
    pub student_count: usize,
    pub grade_histogram: Vec<GradeCount>,
    pub subject_averages: Vec<SubjectAverage>,
}

pub fn compute_class_distribution(
    ctx: &CalcContext<'_>,
    exam_type: ExamType,
    config: &EngineConfig,
) -> Result<ClassDistributionModel, CalcError> {
    let data = load_class_marks(ctx)?;
    let table = resolve_table(
        ctx.conn,
        GradingContext::Division,
        Some(ctx.academic_year_id),
        config,
    )?;
    let (_, marks) = data.active();
    Ok(ClassDistributionModel {
        class: data.class.clone(),
        academic_year_id: ctx.academic_year_id.to_string(),
        term: ctx.term,
        exam_type,
        student_count: marks.len(),
        grade_histogram: grade_histogram(&marks, exam_type, &table.table),
        subject_averages: subject_averages(&marks, exam_type),
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassTrendModel {
    pub class: ClassSummary,
    pub academic_year_id: String,
    pub term: i64,
    pub trend: Vec<ExamTypeSummary>,
}

pub fn compute_class_trend(
    ctx: &CalcContext<'_>,
    config: &EngineConfig,
) -> Result<ClassTrendModel, CalcError> {
    let data = load_class_marks(ctx)?;
    let table = resolve_table(
        ctx.conn,
        GradingContext::Division,
        Some(ctx.academic_year_id),
        config,
    )?;
    let (_, marks) = data.active();
    Ok(ClassTrendModel {
        class: data.class.clone(),
        academic_year_id: ctx.academic_year_id.to_string(),
        term: ctx.term,
        trend: exam_type_trend(&marks, &table.table),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::division::GENERAL_CATEGORY;

    fn general(id: &str, homework: f64, eot: f64) -> SubjectMark {
        SubjectMark {
            subject_id: id.to_string(),
            subject_name: id.to_uppercase(),
            category: GENERAL_CATEGORY.to_string(),
            homework: Some(homework),
            eot: Some(eot),
            ..SubjectMark::default()
        }
    }

    fn student() -> RosterStudent {
        RosterStudent {
            student_id: "s1".to_string(),
            display_name: "Okello, Grace".to_string(),
            sort_order: 0,
            active: true,
        }
    }

    #[test]
    fn report_grades_totals_with_report_table() {
        let marks = vec![
            general("eng", 90.0, 82.0),
            general("mtc", 70.0, 71.0),
            general("sci", 60.0, 64.0),
            general("sst", 30.0, 45.0),
            SubjectMark {
                category: "CRE".to_string(),
                ..general("re", 0.0, 0.0)
            },
        ];
        let report = build_student_report(
            &student(),
            &marks,
            ExamType::Eot,
            &GradingTable::from_preset(GradingPreset::Letter5),
            &GradingTable::from_preset(GradingPreset::Primary9),
        );
        let grades: Vec<Option<&str>> = report.subjects.iter().map(|r| r.grade.as_deref()).collect();
        assert_eq!(grades, vec![Some("A"), Some("B"), Some("C"), Some("F"), None]);
        assert_eq!(report.subjects[0].comment, "Excellent");
        assert_eq!(report.subjects[4].comment, "");
        assert_eq!(report.average, Some(65.5));

        let r = report.division.graded().expect("graded");
        // D1 + D2 + C4 + P7
        assert_eq!(r.aggregate, 14);
    }

    #[test]
    fn report_division_follows_exam_type() {
        let marks = vec![
            general("eng", 90.0, 0.0),
            general("mtc", 90.0, 0.0),
            general("sci", 90.0, 0.0),
            general("sst", 90.0, 0.0),
        ];
        let report_table = GradingTable::from_preset(GradingPreset::Letter5);
        let division_table = GradingTable::from_preset(GradingPreset::Primary9);
        let eot = build_student_report(&student(), &marks, ExamType::Eot, &report_table, &division_table);
        assert!(eot.division.is_incomplete());
        let hw = build_student_report(
            &student(),
            &marks,
            ExamType::Homework,
            &report_table,
            &division_table,
        );
        assert_eq!(hw.division.graded().map(|r| r.aggregate), Some(4));
    }

    #[test]
    fn term_bounds() {
        assert!(validate_term(1).is_ok());
        assert!(validate_term(3).is_ok());
        assert_eq!(validate_term(0).map_err(|e| e.code).err().as_deref(), Some("bad_params"));
        assert!(validate_term(4).is_err());
    }
}
