//! Dashboard filters: the date filter and the ordered attribute filters.

use serde::Serialize;

use super::Slice;
use crate::model::{
    AttributeFilter, AttributeSelection, DateFilterSelection, FilterContextDefinition,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterContextState {
    /// Current date filter. `None` means "All time".
    pub date_filter: Option<DateFilterSelection>,
    pub attribute_filters: Vec<AttributeFilter>,
    /// Definition the filters were loaded with, kept for change detection.
    pub original: Option<FilterContextDefinition>,
}

impl FilterContextState {
    /// The current filters as a persistable definition.
    pub fn definition(&self) -> FilterContextDefinition {
        FilterContextDefinition {
            date_filter: self.date_filter.clone(),
            attribute_filters: self.attribute_filters.clone(),
        }
    }

    pub fn attribute_filter(&self, local_id: &str) -> Option<&AttributeFilter> {
        self.attribute_filters.iter().find(|f| f.local_id == local_id)
    }

    fn position(&self, local_id: &str) -> Option<usize> {
        self.attribute_filters
            .iter()
            .position(|f| f.local_id == local_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum FilterContextAction {
    /// Replace all filters, remembering the definition as the original.
    SetFilterContext(FilterContextDefinition),
    /// Set the date filter; an "All time" selection clears it.
    UpsertDateFilter(DateFilterSelection),
    /// Insert at `index`, or append when `None`.
    AddAttributeFilter {
        filter: AttributeFilter,
        index: Option<usize>,
    },
    RemoveAttributeFilters { local_ids: Vec<String> },
    MoveAttributeFilter { local_id: String, index: usize },
    UpdateAttributeFilterSelection {
        local_id: String,
        selection: AttributeSelection,
    },
}

impl Slice for FilterContextState {
    const NAME: &'static str = "filter_context";

    type Action = FilterContextAction;

    fn reduce(mut self, action: &FilterContextAction) -> Self {
        match action {
            FilterContextAction::SetFilterContext(definition) => {
                self.date_filter = definition.date_filter.clone().filter(|d| !d.is_all_time());
                self.attribute_filters = definition.attribute_filters.clone();
                self.original = Some(definition.clone());
            }
            FilterContextAction::UpsertDateFilter(selection) => {
                self.date_filter = (!selection.is_all_time()).then(|| selection.clone());
            }
            FilterContextAction::AddAttributeFilter { filter, index } => {
                let at = index
                    .unwrap_or(self.attribute_filters.len())
                    .min(self.attribute_filters.len());
                self.attribute_filters.insert(at, filter.clone());
            }
            FilterContextAction::RemoveAttributeFilters { local_ids } => {
                self.attribute_filters
                    .retain(|f| !local_ids.iter().any(|id| *id == f.local_id));
            }
            FilterContextAction::MoveAttributeFilter { local_id, index } => {
                if let Some(from) = self.position(local_id)
                    && *index < self.attribute_filters.len()
                {
                    let filter = self.attribute_filters.remove(from);
                    self.attribute_filters.insert(*index, filter);
                }
            }
            FilterContextAction::UpdateAttributeFilterSelection {
                local_id,
                selection,
            } => {
                if let Some(at) = self.position(local_id) {
                    self.attribute_filters[at].selection = selection.clone();
                }
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DateFilterGranularity;

    fn filter(id: &str) -> AttributeFilter {
        AttributeFilter {
            local_id: id.into(),
            display_form: format!("{id}.df"),
            title: None,
            selection: AttributeSelection::all(),
        }
    }

    fn with_filters(ids: &[&str]) -> FilterContextState {
        FilterContextState::default().reduce(&FilterContextAction::SetFilterContext(
            FilterContextDefinition {
                date_filter: None,
                attribute_filters: ids.iter().map(|id| filter(id)).collect(),
            },
        ))
    }

    fn ids(state: &FilterContextState) -> Vec<&str> {
        state
            .attribute_filters
            .iter()
            .map(|f| f.local_id.as_str())
            .collect()
    }

    #[test]
    fn all_time_selection_clears_date_filter() {
        let state = FilterContextState::default()
            .reduce(&FilterContextAction::UpsertDateFilter(
                DateFilterSelection::relative(DateFilterGranularity::Month, -11, 0),
            ))
            .reduce(&FilterContextAction::UpsertDateFilter(
                DateFilterSelection::all_time(),
            ));
        assert_eq!(state.date_filter, None);
    }

    #[test]
    fn add_inserts_at_index_or_appends() {
        let state = with_filters(&["a", "b"])
            .reduce(&FilterContextAction::AddAttributeFilter {
                filter: filter("c"),
                index: Some(1),
            })
            .reduce(&FilterContextAction::AddAttributeFilter {
                filter: filter("d"),
                index: None,
            });
        assert_eq!(ids(&state), vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn move_out_of_range_is_ignored() {
        let state = with_filters(&["a", "b"]).reduce(&FilterContextAction::MoveAttributeFilter {
            local_id: "a".into(),
            index: 5,
        });
        assert_eq!(ids(&state), vec!["a", "b"]);
    }

    #[test]
    fn move_reorders_filters() {
        let state = with_filters(&["a", "b", "c"]).reduce(
            &FilterContextAction::MoveAttributeFilter {
                local_id: "a".into(),
                index: 2,
            },
        );
        assert_eq!(ids(&state), vec!["b", "c", "a"]);
    }

    #[test]
    fn remove_and_update_selection() {
        let state = with_filters(&["a", "b"])
            .reduce(&FilterContextAction::RemoveAttributeFilters {
                local_ids: vec!["a".into()],
            })
            .reduce(&FilterContextAction::UpdateAttributeFilterSelection {
                local_id: "b".into(),
                selection: AttributeSelection::only(["EMEA"]),
            });
        assert_eq!(ids(&state), vec!["b"]);
        assert_eq!(
            state.attribute_filter("b").map(|f| &f.selection),
            Some(&AttributeSelection::only(["EMEA"]))
        );
    }
}
