use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Literal grade returned when a table has no rules at all.
pub const EMPTY_TABLE_GRADE: &str = "F";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRule {
    pub grade: String,
    pub min_mark: f64,
    pub max_mark: f64,
    #[serde(default)]
    pub comment: String,
}

impl GradeRule {
    pub fn new(grade: &str, min_mark: f64, max_mark: f64, comment: &str) -> Self {
        Self {
            grade: grade.to_string(),
            min_mark,
            max_mark,
            comment: comment.to_string(),
        }
    }

    pub fn contains(&self, score: f64) -> bool {
        self.min_mark <= score && score <= self.max_mark
    }

    /// Converts one loosely-shaped stored record into a typed rule.
    ///
    /// Bounds may arrive as numbers or numeric strings, under camelCase,
    /// snake_case or short (`min`/`max`) keys.
    pub fn from_value(raw: &Value) -> Result<Self, GradeRuleError> {
        let Some(obj) = raw.as_object() else {
            return Err(GradeRuleError::NotAnObject);
        };

        let grade = obj
            .get("grade")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if grade.is_empty() {
            return Err(GradeRuleError::MissingGrade);
        }

        let min_mark = bound(obj, &["minMark", "min_mark", "min"], "minMark")?;
        let max_mark = bound(obj, &["maxMark", "max_mark", "max"], "maxMark")?;
        if min_mark > max_mark {
            return Err(GradeRuleError::InvertedRange {
                min: min_mark,
                max: max_mark,
            });
        }

        let comment = match obj.get("comment") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(_) => return Err(GradeRuleError::BadComment),
        };

        Ok(Self {
            grade,
            min_mark,
            max_mark,
            comment,
        })
    }
}

fn bound(
    obj: &serde_json::Map<String, Value>,
    keys: &[&str],
    field: &'static str,
) -> Result<f64, GradeRuleError> {
    let raw = keys.iter().find_map(|k| obj.get(*k));
    let n = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match n {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(GradeRuleError::BadBound { field }),
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GradeRuleError {
    #[error("rule must be a JSON object")]
    NotAnObject,
    #[error("grade must be a non-empty string")]
    MissingGrade,
    #[error("{field} must be a finite number")]
    BadBound { field: &'static str },
    #[error("comment must be a string or null")]
    BadComment,
    #[error("minMark {min} is greater than maxMark {max}")]
    InvertedRange { min: f64, max: f64 },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedRule {
    pub index: usize,
    pub reason: String,
}

/// Splits stored rule records into typed rules and the entries that had to be
/// dropped. Input order is preserved for the accepted rules.
pub fn normalize_rules(values: &[Value]) -> (Vec<GradeRule>, Vec<RejectedRule>) {
    let mut accepted = Vec::with_capacity(values.len());
    let mut rejected = Vec::new();
    for (index, raw) in values.iter().enumerate() {
        match GradeRule::from_value(raw) {
            Ok(rule) => accepted.push(rule),
            Err(e) => {
                tracing::warn!(index, error = %e, "dropping malformed grade rule");
                rejected.push(RejectedRule {
                    index,
                    reason: e.to_string(),
                });
            }
        }
    }
    (accepted, rejected)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GradingPreset {
    /// A–F report card scale.
    Letter5,
    /// D1–F9 primary leaving exam scale used for divisions.
    Primary9,
}

impl GradingPreset {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "letter5" => Some(Self::Letter5),
            "primary9" => Some(Self::Primary9),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Letter5 => "letter5",
            Self::Primary9 => "primary9",
        }
    }

    pub fn rules(self) -> Vec<GradeRule> {
        match self {
            Self::Letter5 => vec![
                GradeRule::new("A", 80.0, 100.0, "Excellent"),
                GradeRule::new("B", 70.0, 79.0, "Very good"),
                GradeRule::new("C", 60.0, 69.0, "Good"),
                GradeRule::new("D", 50.0, 59.0, "Fair"),
                GradeRule::new("F", 0.0, 49.0, "Fail"),
            ],
            Self::Primary9 => vec![
                GradeRule::new("D1", 80.0, 100.0, "Distinction"),
                GradeRule::new("D2", 70.0, 79.0, "Distinction"),
                GradeRule::new("C3", 65.0, 69.0, "Credit"),
                GradeRule::new("C4", 60.0, 64.0, "Credit"),
                GradeRule::new("C5", 55.0, 59.0, "Credit"),
                GradeRule::new("C6", 50.0, 54.0, "Credit"),
                GradeRule::new("P7", 45.0, 49.0, "Pass"),
                GradeRule::new("P8", 40.0, 44.0, "Pass"),
                GradeRule::new("F9", 0.0, 39.0, "Fail"),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GradingContext {
    Report,
    Division,
}

impl GradingContext {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "report" => Some(Self::Report),
            "division" => Some(Self::Division),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Report => "report",
            Self::Division => "division",
        }
    }
}

/// Where a resolved table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TableSource {
    Year,
    Global,
    Preset,
}

/// Rules ordered by `min_mark` descending. Built only through
/// [`resolve_grading_table`] or [`GradingTable::from_preset`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingTable {
    rules: Vec<GradeRule>,
}

impl GradingTable {
    pub fn from_preset(preset: GradingPreset) -> Self {
        Self::sorted(preset.rules())
    }

    fn sorted(mut rules: Vec<GradeRule>) -> Self {
        // Stable: among equal minima the stored order decides.
        rules.sort_by(|a, b| b.min_mark.total_cmp(&a.min_mark));
        Self { rules }
    }

    pub fn rules(&self) -> &[GradeRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Grades in table order, duplicates removed.
    pub fn grades(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for r in &self.rules {
            if !out.iter().any(|g| g.eq_ignore_ascii_case(&r.grade)) {
                out.push(r.grade.clone());
            }
        }
        out
    }
}

pub fn resolve_grading_table(rules: Vec<GradeRule>, fallback: GradingPreset) -> GradingTable {
    if rules.is_empty() {
        return GradingTable::from_preset(fallback);
    }
    GradingTable::sorted(rules)
}

pub fn score_to_grade(score: f64, table: &GradingTable) -> String {
    if let Some(rule) = table.rules.iter().find(|r| r.contains(score)) {
        return rule.grade.clone();
    }
    table
        .rules
        .last()
        .map(|r| r.grade.clone())
        .unwrap_or_else(|| EMPTY_TABLE_GRADE.to_string())
}

pub fn grade_to_comment(grade: &str, table: &GradingTable) -> String {
    let grade = grade.trim();
    table
        .rules
        .iter()
        .find(|r| r.grade.trim().eq_ignore_ascii_case(grade))
        .map(|r| r.comment.clone())
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum TableIssue {
    #[serde(rename = "gap")]
    Gap { from: f64, to: f64 },
    #[serde(rename = "overlap")]
    Overlap {
        grades: [String; 2],
        from: f64,
        to: f64,
    },
    #[serde(rename = "belowZero")]
    BelowZero { grade: String },
    #[serde(rename = "aboveHundred")]
    AboveHundred { grade: String },
}

/// Advisory report on a table's coverage of [0,100] at whole-mark
/// granularity. Scoring never consults this.
pub fn validate_rules(table: &GradingTable) -> Vec<TableIssue> {
    let mut issues = Vec::new();
    if table.is_empty() {
        issues.push(TableIssue::Gap {
            from: 0.0,
            to: 100.0,
        });
        return issues;
    }

    let mut ascending: Vec<&GradeRule> = table.rules.iter().collect();
    ascending.sort_by(|a, b| a.min_mark.total_cmp(&b.min_mark));

    for r in &ascending {
        if r.min_mark < 0.0 {
            issues.push(TableIssue::BelowZero {
                grade: r.grade.clone(),
            });
        }
        if r.max_mark > 100.0 {
            issues.push(TableIssue::AboveHundred {
                grade: r.grade.clone(),
            });
        }
    }

    let first = ascending[0];
    if first.min_mark > 0.0 {
        issues.push(TableIssue::Gap {
            from: 0.0,
            to: first.min_mark,
        });
    }

    let mut covered_to = first.max_mark;
    let mut covered_by = first.grade.clone();
    for r in ascending.iter().skip(1) {
        if r.min_mark <= covered_to {
            issues.push(TableIssue::Overlap {
                grades: [covered_by.clone(), r.grade.clone()],
                from: r.min_mark,
                to: covered_to.min(r.max_mark),
            });
        } else if r.min_mark - covered_to > 1.0 {
            issues.push(TableIssue::Gap {
                from: covered_to,
                to: r.min_mark,
            });
        }
        if r.max_mark > covered_to {
            covered_to = r.max_mark;
            covered_by = r.grade.clone();
        }
    }

    if covered_to < 100.0 {
        issues.push(TableIssue::Gap {
            from: covered_to,
            to: 100.0,
        });
    }
    issues
}
