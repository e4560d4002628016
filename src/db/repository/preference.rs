use rusqlite::Connection;

use super::key_value::{delete_value, get_value, set_value};
use crate::config::ApiSettings;
use crate::db::DatabaseError;

pub const USER_NAME_KEY: &str = "user_name";
pub const ANALYSIS_MODEL_KEY: &str = "analysis_model";
pub const VISION_MODEL_KEY: &str = "vision_model";

/// Name the user gave the assistant to address them by.
pub fn get_display_name(conn: &Connection) -> Result<Option<String>, DatabaseError> {
    Ok(get_value(conn, USER_NAME_KEY)?.filter(|name| !name.trim().is_empty()))
}

pub fn set_display_name(conn: &Connection, name: &str) -> Result<(), DatabaseError> {
    set_value(conn, USER_NAME_KEY, name.trim())
}

pub fn clear_display_name(conn: &Connection) -> Result<(), DatabaseError> {
    delete_value(conn, USER_NAME_KEY)
}

/// User-selected model overrides. `None` keeps the configured default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelChoice {
    pub analysis_model: Option<String>,
    pub vision_model: Option<String>,
}

pub fn get_model_choice(conn: &Connection) -> Result<ModelChoice, DatabaseError> {
    let non_blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    Ok(ModelChoice {
        analysis_model: non_blank(get_value(conn, ANALYSIS_MODEL_KEY)?),
        vision_model: non_blank(get_value(conn, VISION_MODEL_KEY)?),
    })
}

pub fn set_model_choice(conn: &Connection, choice: &ModelChoice) -> Result<(), DatabaseError> {
    match &choice.analysis_model {
        Some(model) => set_value(conn, ANALYSIS_MODEL_KEY, model)?,
        None => delete_value(conn, ANALYSIS_MODEL_KEY)?,
    }
    match &choice.vision_model {
        Some(model) => set_value(conn, VISION_MODEL_KEY, model)?,
        None => delete_value(conn, VISION_MODEL_KEY)?,
    }
    Ok(())
}

/// Apply stored model overrides on top of environment settings.
pub fn apply_model_choice(settings: &mut ApiSettings, choice: &ModelChoice) {
    if let Some(model) = &choice.analysis_model {
        settings.text_model = model.trim().to_string();
    }
    if let Some(model) = &choice.vision_model {
        settings.vision_model = model.trim().to_string();
    }
}
