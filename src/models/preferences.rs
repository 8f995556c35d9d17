use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::todo::TodoSort;
use crate::productivity::pomodoro::PomodoroSettings;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

/// Focus mode narrows the todo list down to the few items worth doing next.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct FocusSettings {
    pub enabled: bool,
    pub hide_completed: bool,
    #[validate(range(min = 1, max = 10))]
    pub max_visible: i64,
}

impl Default for FocusSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            hide_completed: true,
            max_visible: 3,
        }
    }
}

fn validate_pomodoro(settings: &PomodoroSettings) -> Result<(), ValidationError> {
    settings
        .check()
        .map_err(|_| ValidationError::new("pomodoro_settings"))
}

/// Per-user UI and productivity settings, stored as JSONB.
/// Missing fields fall back to defaults so older rows keep deserializing.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default, Validate)]
#[serde(default)]
pub struct Preferences {
    pub theme: Theme,
    #[validate(regex(path = "crate::models::HEX_COLOR_REGEX", message = "Color must be #rrggbb"))]
    pub accent_color: Option<String>,
    #[validate]
    pub focus: FocusSettings,
    #[validate(custom = "validate_pomodoro")]
    pub pomodoro: PomodoroSettings,
    pub default_sort: TodoSort,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_fields_use_defaults() {
        let prefs: Preferences = serde_json::from_value(json!({})).unwrap();
        assert_eq!(prefs, Preferences::default());
        assert_eq!(prefs.theme, Theme::System);
        assert_eq!(prefs.focus.max_visible, 3);
        assert_eq!(prefs.pomodoro.work_minutes, 25);

        let prefs: Preferences =
            serde_json::from_value(json!({"theme": "dark", "focus": {"enabled": true}})).unwrap();
        assert_eq!(prefs.theme, Theme::Dark);
        assert!(prefs.focus.enabled);
        assert!(prefs.focus.hide_completed);
    }

    #[test]
    fn test_preferences_validation() {
        let mut prefs = Preferences::default();
        assert!(prefs.validate().is_ok());

        prefs.accent_color = Some("blue".into());
        assert!(prefs.validate().is_err());

        prefs.accent_color = None;
        prefs.focus.max_visible = 50;
        assert!(prefs.validate().is_err());

        prefs.focus.max_visible = 3;
        prefs.pomodoro.work_minutes = 0;
        assert!(prefs.validate().is_err());
    }
}
