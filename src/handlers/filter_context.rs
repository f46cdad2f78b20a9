use uuid::Uuid;

use crate::error::RoutineError;
use crate::event::EventPayload;
use crate::model::{AttributeFilter, AttributeSelection, DateBound, DateFilterSelection};
use crate::routine::RoutineContext;
use crate::selector::{
    AttributeFilterByLocalId, SELECT_ATTRIBUTE_FILTERS, SELECT_DATE_FILTER_CONFIG,
};
use crate::state::FilterContextAction;

pub(crate) fn change_date_filter_selection(
    cx: &mut RoutineContext<'_>,
    selection: &DateFilterSelection,
) -> Result<EventPayload, RoutineError> {
    let config = cx.select(&SELECT_DATE_FILTER_CONFIG);
    if selection.is_all_time() {
        if !config.all_time_enabled {
            return Err(RoutineError::validation(
                "the All time date filter is not enabled on this dashboard",
            ));
        }
    } else if !config
        .available_granularities
        .contains(&selection.granularity)
    {
        return Err(RoutineError::validation(format!(
            "date filter granularity {:?} is not available",
            selection.granularity
        )));
    }
    if let (Some(DateBound::Offset(from)), Some(DateBound::Offset(to))) =
        (&selection.from, &selection.to)
        && from > to
    {
        return Err(RoutineError::validation(format!(
            "date filter range {from}..{to} is inverted"
        )));
    }

    cx.put(FilterContextAction::UpsertDateFilter(selection.clone()))?;
    Ok(EventPayload::DateFilterSelectionChanged {
        selection: selection.clone(),
    })
}

pub(crate) fn add_attribute_filter(
    cx: &mut RoutineContext<'_>,
    display_form: &str,
    index: Option<usize>,
    title: Option<&str>,
    selection: &AttributeSelection,
) -> Result<EventPayload, RoutineError> {
    let filters = cx.select(&SELECT_ATTRIBUTE_FILTERS);
    if filters.iter().any(|f| f.display_form == display_form) {
        return Err(RoutineError::validation(format!(
            "dashboard already has an attribute filter for {display_form}"
        )));
    }
    let limit = cx.config().max_attribute_filters;
    if filters.len() >= limit {
        return Err(RoutineError::validation(format!(
            "dashboard allows at most {limit} attribute filters"
        )));
    }
    if let Some(index) = index
        && index > filters.len()
    {
        return Err(RoutineError::validation(format!(
            "attribute filter index {index} is out of range"
        )));
    }

    let filter = AttributeFilter {
        local_id: Uuid::new_v4().simple().to_string(),
        display_form: display_form.to_owned(),
        title: title.map(str::to_owned),
        selection: selection.clone(),
    };
    cx.put(FilterContextAction::AddAttributeFilter {
        filter: filter.clone(),
        index,
    })?;
    Ok(EventPayload::AttributeFilterAdded {
        filter,
        index: index.unwrap_or(filters.len()),
    })
}

pub(crate) fn remove_attribute_filters(
    cx: &mut RoutineContext<'_>,
    local_ids: &[String],
) -> Result<EventPayload, RoutineError> {
    if local_ids.is_empty() {
        return Err(RoutineError::validation(
            "no attribute filters given to remove",
        ));
    }
    let mut removed = Vec::with_capacity(local_ids.len());
    for local_id in local_ids {
        let filter = cx
            .select(&AttributeFilterByLocalId(local_id.clone()))
            .ok_or_else(|| unknown_filter(local_id))?;
        removed.push(filter);
    }

    cx.put(FilterContextAction::RemoveAttributeFilters {
        local_ids: local_ids.to_vec(),
    })?;
    Ok(EventPayload::AttributeFiltersRemoved { removed })
}

pub(crate) fn move_attribute_filter(
    cx: &mut RoutineContext<'_>,
    local_id: &str,
    index: usize,
) -> Result<EventPayload, RoutineError> {
    let filters = cx.select(&SELECT_ATTRIBUTE_FILTERS);
    let from = filters
        .iter()
        .position(|f| f.local_id == local_id)
        .ok_or_else(|| unknown_filter(local_id))?;
    if index >= filters.len() {
        return Err(RoutineError::validation(format!(
            "attribute filter index {index} is out of range"
        )));
    }

    cx.put(FilterContextAction::MoveAttributeFilter {
        local_id: local_id.to_owned(),
        index,
    })?;
    Ok(EventPayload::AttributeFilterMoved {
        local_id: local_id.to_owned(),
        from,
        to: index,
    })
}

pub(crate) fn change_attribute_filter_selection(
    cx: &mut RoutineContext<'_>,
    local_id: &str,
    selection: &AttributeSelection,
) -> Result<EventPayload, RoutineError> {
    let mut filter = cx
        .select(&AttributeFilterByLocalId(local_id.to_owned()))
        .ok_or_else(|| unknown_filter(local_id))?;

    cx.put(FilterContextAction::UpdateAttributeFilterSelection {
        local_id: local_id.to_owned(),
        selection: selection.clone(),
    })?;
    filter.selection = selection.clone();
    Ok(EventPayload::AttributeFilterSelectionChanged { filter })
}

fn unknown_filter(local_id: &str) -> RoutineError {
    RoutineError::validation(format!("attribute filter {local_id} does not exist"))
}
