use crate::db;
use crate::division::ExamType;
use crate::grading::{GradingContext, GradingPreset};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{Map, Value};

pub const ENGINE_SETTINGS_KEY: &str = "setup.engine";

/// Workspace-level engine settings, persisted as JSON in the settings table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub report_preset: GradingPreset,
    pub division_preset: GradingPreset,
    pub default_exam_type: ExamType,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            report_preset: GradingPreset::Letter5,
            division_preset: GradingPreset::Primary9,
            default_exam_type: ExamType::Eot,
        }
    }
}

fn parse_preset(v: &Value, key: &str) -> Result<GradingPreset, String> {
    v.as_str()
        .and_then(GradingPreset::parse)
        .ok_or_else(|| format!("{} must be one of: letter5, primary9", key))
}

impl EngineConfig {
    pub fn preset_for(&self, context: GradingContext) -> GradingPreset {
        match context {
            GradingContext::Report => self.report_preset,
            GradingContext::Division => self.division_preset,
        }
    }

    pub fn apply_patch(&mut self, patch: &Map<String, Value>) -> Result<(), String> {
        for (k, v) in patch {
            match k.as_str() {
                "reportPreset" => self.report_preset = parse_preset(v, k)?,
                "divisionPreset" => self.division_preset = parse_preset(v, k)?,
                "defaultExamType" => {
                    self.default_exam_type = v
                        .as_str()
                        .and_then(ExamType::parse)
                        .ok_or_else(|| {
                            "defaultExamType must be one of: homework, bot, midterm, eot, total"
                                .to_string()
                        })?;
                }
                _ => return Err(format!("unknown engine field: {}", k)),
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

pub fn load_engine_config(conn: &Connection) -> anyhow::Result<EngineConfig> {
    let mut config = EngineConfig::default();
    if let Some(saved) = db::settings_get_json(conn, ENGINE_SETTINGS_KEY)? {
        if let Some(obj) = saved.as_object() {
            // Best-effort: a bad historical value must not block computation.
            if let Err(e) = config.apply_patch(obj) {
                tracing::warn!(error = %e, "ignoring invalid saved engine settings");
                config = EngineConfig::default();
            }
        }
    }
    Ok(config)
}

pub fn save_engine_config(conn: &Connection, config: &EngineConfig) -> anyhow::Result<()> {
    db::settings_set_json(conn, ENGINE_SETTINGS_KEY, &config.to_json())
}
