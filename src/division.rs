use crate::grading::{score_to_grade, GradingTable};
use serde::{Deserialize, Serialize};

pub const GENERAL_CATEGORY: &str = "GENERAL";
pub const SUBJECTS_FOR_AGGREGATE: usize = 4;
pub const WORST_GRADE_POINT: u8 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExamType {
    Homework,
    Bot,
    Midterm,
    Eot,
    Total,
}

impl ExamType {
    /// The four assessment instances of a term, in the order they happen.
    pub const ASSESSMENTS: [ExamType; 4] = [
        ExamType::Homework,
        ExamType::Bot,
        ExamType::Midterm,
        ExamType::Eot,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "homework" | "hw" => Some(Self::Homework),
            "bot" | "beginning" | "beginning_of_term" => Some(Self::Bot),
            "midterm" | "mot" | "mid" => Some(Self::Midterm),
            "eot" | "end" | "end_of_term" => Some(Self::Eot),
            "total" | "overall" => Some(Self::Total),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Homework => "homework",
            Self::Bot => "bot",
            Self::Midterm => "midterm",
            Self::Eot => "eot",
            Self::Total => "total",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMark {
    pub subject_id: String,
    pub subject_name: String,
    pub category: String,
    pub homework: Option<f64>,
    pub bot: Option<f64>,
    pub midterm: Option<f64>,
    pub eot: Option<f64>,
    pub total: Option<f64>,
    pub grade: Option<String>,
}

fn positive(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite() && *x > 0.0)
}

impl SubjectMark {
    pub fn is_general(&self) -> bool {
        self.category.trim().eq_ignore_ascii_case(GENERAL_CATEGORY)
    }

    /// Stored total if positive, else the end-of-term score, else the mean of
    /// whichever assessment components are positive.
    pub fn derived_total(&self) -> Option<f64> {
        if let Some(t) = positive(self.total) {
            return Some(t);
        }
        if let Some(e) = positive(self.eot) {
            return Some(e);
        }
        let parts: Vec<f64> = [self.homework, self.bot, self.midterm]
            .into_iter()
            .filter_map(positive)
            .collect();
        if parts.is_empty() {
            return None;
        }
        Some(parts.iter().sum::<f64>() / parts.len() as f64)
    }

    /// Score for one exam type. Zero means "not assessed" and yields `None`.
    pub fn score_for(&self, exam_type: ExamType) -> Option<f64> {
        match exam_type {
            ExamType::Homework => positive(self.homework),
            ExamType::Bot => positive(self.bot),
            ExamType::Midterm => positive(self.midterm),
            ExamType::Eot => positive(self.eot),
            ExamType::Total => self.derived_total(),
        }
    }
}

/// Half-up rounding to a whole mark, applied before table lookup.
pub fn round_mark(score: f64) -> f64 {
    (score + 0.5).floor()
}

pub fn grade_point(grade: &str) -> u8 {
    match grade.trim().to_ascii_uppercase().as_str() {
        "D1" => 1,
        "D2" => 2,
        "C3" => 3,
        "C4" => 4,
        "C5" => 5,
        "C6" => 6,
        "P7" => 7,
        "P8" => 8,
        "F9" | "F" => 9,
        _ => WORST_GRADE_POINT,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Division {
    #[serde(rename = "DIVISION_1")]
    Division1,
    #[serde(rename = "DIVISION_2")]
    Division2,
    #[serde(rename = "DIVISION_3")]
    Division3,
    #[serde(rename = "DIVISION_4")]
    Division4,
    #[serde(rename = "UNGRADED")]
    Ungraded,
    #[serde(rename = "FAIL")]
    Fail,
}

impl Division {
    pub const ALL: [Division; 6] = [
        Division::Division1,
        Division::Division2,
        Division::Division3,
        Division::Division4,
        Division::Ungraded,
        Division::Fail,
    ];

    /// First match wins. Aggregates outside 4..=36 cannot come out of four
    /// 1..=9 grade-points and land in `Fail`.
    pub fn classify(aggregate: u32) -> Self {
        match aggregate {
            4..=12 => Self::Division1,
            13..=24 => Self::Division2,
            25..=32 => Self::Division3,
            33..=35 => Self::Division4,
            36 => Self::Ungraded,
            _ => Self::Fail,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Division1 => "Division I",
            Self::Division2 => "Division II",
            Self::Division3 => "Division III",
            Self::Division4 => "Division IV",
            Self::Ungraded => "U",
            Self::Fail => "X",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Division1 => "DIVISION_1",
            Self::Division2 => "DIVISION_2",
            Self::Division3 => "DIVISION_3",
            Self::Division4 => "DIVISION_4",
            Self::Ungraded => "UNGRADED",
            Self::Fail => "FAIL",
        }
    }

    pub fn is_pass(self) -> bool {
        self != Self::Fail
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedSubject {
    pub subject_id: String,
    pub subject_name: String,
    pub score: f64,
    pub grade: String,
    pub grade_point: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DivisionResult {
    pub division: Division,
    pub aggregate: u32,
    pub label: String,
    pub passed: bool,
    pub subjects: Vec<GradedSubject>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteReason {
    TooFewGeneralSubjects,
    TooFewAssessedSubjects,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Incomplete {
    pub reason: IncompleteReason,
    pub assessed_count: usize,
    pub general_count: usize,
    pub required: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum DivisionOutcome {
    Graded(DivisionResult),
    Incomplete(Incomplete),
}

impl DivisionOutcome {
    pub fn graded(&self) -> Option<&DivisionResult> {
        match self {
            Self::Graded(r) => Some(r),
            Self::Incomplete(_) => None,
        }
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete(_))
    }
}

/// GENERAL subjects with a valid score for `exam_type`, graded against
/// `table`, in input order.
pub fn grade_general_subjects(
    marks: &[SubjectMark],
    exam_type: ExamType,
    table: &GradingTable,
) -> Vec<GradedSubject> {
    marks
        .iter()
        .filter(|m| m.is_general())
        .filter_map(|m| {
            let score = m.score_for(exam_type)?;
            let grade = score_to_grade(round_mark(score), table);
            Some(GradedSubject {
                subject_id: m.subject_id.clone(),
                subject_name: m.subject_name.clone(),
                score,
                grade_point: grade_point(&grade),
                grade,
            })
        })
        .collect()
}

pub fn compute_division(
    marks: &[SubjectMark],
    exam_type: ExamType,
    table: &GradingTable,
) -> DivisionOutcome {
    let general_count = marks.iter().filter(|m| m.is_general()).count();
    let mut assessed = grade_general_subjects(marks, exam_type, table);
    let assessed_count = assessed.len();

    let reason = if general_count < SUBJECTS_FOR_AGGREGATE {
        Some(IncompleteReason::TooFewGeneralSubjects)
    } else if assessed_count < SUBJECTS_FOR_AGGREGATE {
        Some(IncompleteReason::TooFewAssessedSubjects)
    } else {
        None
    };
    if let Some(reason) = reason {
        return DivisionOutcome::Incomplete(Incomplete {
            reason,
            assessed_count,
            general_count,
            required: SUBJECTS_FOR_AGGREGATE,
        });
    }

    // Stable sort: equal grade-points keep input order.
    assessed.sort_by_key(|s| s.grade_point);
    assessed.truncate(SUBJECTS_FOR_AGGREGATE);

    let aggregate: u32 = assessed.iter().map(|s| u32::from(s.grade_point)).sum();
    let division = Division::classify(aggregate);
    DivisionOutcome::Graded(DivisionResult {
        division,
        aggregate,
        label: division.label().to_string(),
        passed: division.is_pass(),
        subjects: assessed,
    })
}
