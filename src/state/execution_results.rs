use std::collections::BTreeMap;

use serde::Serialize;

use super::Slice;
use crate::model::{ExecutionResult, PreparedExecution, WidgetRef};

/// Latest execution state per widget.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionResultsState {
    pub results: BTreeMap<WidgetRef, ExecutionResult>,
}

impl ExecutionResultsState {
    pub fn get(&self, widget_ref: &WidgetRef) -> Option<&ExecutionResult> {
        self.results.get(widget_ref)
    }

    /// The prepared execution of a widget that finished loading successfully.
    pub fn prepared(&self, widget_ref: &WidgetRef) -> Option<&PreparedExecution> {
        self.results
            .get(widget_ref)
            .filter(|r| !r.is_loading)
            .and_then(|r| r.execution.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ExecutionResultsAction {
    Upsert(ExecutionResult),
    Remove(WidgetRef),
    Clear,
}

impl Slice for ExecutionResultsState {
    const NAME: &'static str = "execution_results";

    type Action = ExecutionResultsAction;

    fn reduce(mut self, action: &ExecutionResultsAction) -> Self {
        match action {
            ExecutionResultsAction::Upsert(result) => {
                self.results
                    .insert(result.widget_ref.clone(), result.clone());
            }
            ExecutionResultsAction::Remove(widget_ref) => {
                self.results.remove(widget_ref);
            }
            ExecutionResultsAction::Clear => self.results.clear(),
        }
        self
    }
}
