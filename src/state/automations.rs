use std::collections::BTreeMap;

use serde::Serialize;

use super::Slice;
use crate::model::Automation;

/// Automations (scheduled emails) known to the session, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AutomationsState {
    pub automations: BTreeMap<String, Automation>,
}

impl AutomationsState {
    pub fn get(&self, id: &str) -> Option<&Automation> {
        self.automations.get(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum AutomationsAction {
    Upsert(Automation),
    Remove(Vec<String>),
}

impl Slice for AutomationsState {
    const NAME: &'static str = "automations";

    type Action = AutomationsAction;

    fn reduce(mut self, action: &AutomationsAction) -> Self {
        match action {
            AutomationsAction::Upsert(automation) => {
                self.automations
                    .insert(automation.id.clone(), automation.clone());
            }
            AutomationsAction::Remove(ids) => {
                for id in ids {
                    self.automations.remove(id);
                }
            }
        }
        self
    }
}
