//! Session configuration visible to routines: locale and date filter rules.

use serde::{Deserialize, Serialize};

use super::Slice;
use crate::model::DateFilterGranularity;

/// Which date filter selections the dashboard allows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateFilterConfig {
    pub available_granularities: Vec<DateFilterGranularity>,
    pub all_time_enabled: bool,
}

impl Default for DateFilterConfig {
    fn default() -> Self {
        Self {
            available_granularities: vec![
                DateFilterGranularity::Day,
                DateFilterGranularity::Week,
                DateFilterGranularity::Month,
                DateFilterGranularity::Quarter,
                DateFilterGranularity::Year,
            ],
            all_time_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigState {
    pub locale: String,
    pub date_filter: DateFilterConfig,
}

impl Default for ConfigState {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            date_filter: DateFilterConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ConfigAction {
    SetLocale(String),
    SetDateFilterConfig(DateFilterConfig),
}

impl Slice for ConfigState {
    const NAME: &'static str = "config";

    type Action = ConfigAction;

    fn reduce(mut self, action: &ConfigAction) -> Self {
        match action {
            ConfigAction::SetLocale(locale) => self.locale = locale.clone(),
            ConfigAction::SetDateFilterConfig(config) => self.date_filter = config.clone(),
        }
        self
    }
}
