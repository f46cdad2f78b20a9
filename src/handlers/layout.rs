use crate::error::RoutineError;
use crate::event::EventPayload;
use crate::model::{LayoutItem, LayoutSection, SectionHeader};
use crate::routine::RoutineContext;
use crate::selector::{SELECT_LAYOUT_HISTORY, SELECT_LAYOUT_SECTIONS, SELECT_STASH};
use crate::state::LayoutAction;

pub(crate) fn add_section(
    cx: &mut RoutineContext<'_>,
    index: usize,
    header: &SectionHeader,
    items: &[LayoutItem],
    stashes: &[String],
) -> Result<EventPayload, RoutineError> {
    let sections = cx.select(&SELECT_LAYOUT_SECTIONS);
    if index > sections.len() {
        return Err(out_of_range(index));
    }

    let mut section = LayoutSection {
        header: header.clone(),
        items: items.to_vec(),
    };
    if !stashes.is_empty() {
        let stash = cx.select(&SELECT_STASH);
        for (i, id) in stashes.iter().enumerate() {
            if stashes[..i].contains(id) {
                return Err(RoutineError::validation(format!(
                    "layout stash {id} is listed more than once"
                )));
            }
            let stashed = stash.get(id).ok_or_else(|| {
                RoutineError::validation(format!("layout stash {id} does not exist"))
            })?;
            section.items.extend(stashed.iter().cloned());
        }
    }

    cx.put(LayoutAction::AddSection {
        index,
        section: section.clone(),
        used_stashes: stashes.to_vec(),
    })?;
    Ok(EventPayload::LayoutSectionAdded { index, section })
}

pub(crate) fn remove_section(
    cx: &mut RoutineContext<'_>,
    index: usize,
    stash_identifier: Option<&str>,
) -> Result<EventPayload, RoutineError> {
    let sections = cx.select(&SELECT_LAYOUT_SECTIONS);
    let section = sections
        .get(index)
        .cloned()
        .ok_or_else(|| out_of_range(index))?;

    cx.put(LayoutAction::RemoveSection {
        index,
        stash_identifier: stash_identifier.map(str::to_owned),
    })?;
    Ok(EventPayload::LayoutSectionRemoved {
        index,
        section,
        stash_identifier: stash_identifier.map(str::to_owned),
    })
}

pub(crate) fn move_section(
    cx: &mut RoutineContext<'_>,
    from: usize,
    to: usize,
) -> Result<EventPayload, RoutineError> {
    let len = cx.select(&SELECT_LAYOUT_SECTIONS).len();
    if from >= len {
        return Err(out_of_range(from));
    }
    if to >= len {
        return Err(out_of_range(to));
    }
    if from == to {
        return Err(RoutineError::validation(format!(
            "layout section is already at index {to}"
        )));
    }

    cx.put(LayoutAction::MoveSection { from, to })?;
    Ok(EventPayload::LayoutSectionMoved { from, to })
}

pub(crate) fn change_section_header(
    cx: &mut RoutineContext<'_>,
    index: usize,
    header: &SectionHeader,
) -> Result<EventPayload, RoutineError> {
    if index >= cx.select(&SELECT_LAYOUT_SECTIONS).len() {
        return Err(out_of_range(index));
    }
    cx.put(LayoutAction::ChangeSectionHeader {
        index,
        header: header.clone(),
    })?;
    Ok(EventPayload::LayoutSectionHeaderChanged {
        index,
        header: header.clone(),
    })
}

pub(crate) fn undo(
    cx: &mut RoutineContext<'_>,
    steps: usize,
) -> Result<EventPayload, RoutineError> {
    if steps == 0 {
        return Err(RoutineError::validation("undo needs at least one step"));
    }
    let history = cx.select(&SELECT_LAYOUT_HISTORY);
    if history.is_empty() {
        return Err(RoutineError::validation("there are no layout changes to undo"));
    }
    let steps = steps.min(history.len());
    let undone = history.iter().rev().take(steps).copied().collect();

    cx.put(LayoutAction::Undo { steps })?;
    Ok(EventPayload::LayoutChangesUndone { undone })
}

fn out_of_range(index: usize) -> RoutineError {
    RoutineError::validation(format!("layout section index {index} is out of range"))
}

#[cfg(test)]
mod tests {
    use crate::command::DashboardCommand;
    use crate::error::RoutineError;
    use crate::event::EventPayload;
    use crate::handlers::test_support::Harness;
    use crate::model::SectionHeader;

    fn header(title: &str) -> SectionHeader {
        SectionHeader {
            title: Some(title.into()),
            description: None,
        }
    }

    fn section_titles(h: &Harness) -> Vec<Option<String>> {
        h.store
            .state()
            .layout()
            .sections
            .iter()
            .map(|s| s.header.title.clone())
            .collect()
    }

    #[tokio::test]
    async fn removed_section_can_be_restored_from_stash() {
        let mut h = Harness::loaded();
        h.run(DashboardCommand::RemoveLayoutSection {
            index: 0,
            stash_identifier: Some("top".into()),
        })
        .await
        .expect("remove should succeed");
        assert_eq!(h.store.state().layout().sections.len(), 1);

        let payload = h
            .run(DashboardCommand::AddLayoutSection {
                index: 1,
                header: header("Restored"),
                items: Vec::new(),
                stashes: vec!["top".into()],
            })
            .await
            .expect("add should succeed");
        let EventPayload::LayoutSectionAdded { section, .. } = payload else {
            panic!("unexpected payload {payload:?}");
        };
        assert_eq!(section.items.len(), 2);
        assert!(h.store.state().layout().stash.is_empty());
    }

    #[tokio::test]
    async fn add_with_unknown_stash_fails() {
        let mut h = Harness::loaded();
        let err = h
            .run(DashboardCommand::AddLayoutSection {
                index: 0,
                header: SectionHeader::default(),
                items: Vec::new(),
                stashes: vec!["nope".into()],
            })
            .await
            .expect_err("unknown stash should fail");
        assert_eq!(err.to_string(), "layout stash nope does not exist");
    }

    #[tokio::test]
    async fn add_with_repeated_stash_fails_without_changes() {
        let mut h = Harness::loaded();
        h.run(DashboardCommand::RemoveLayoutSection {
            index: 0,
            stash_identifier: Some("top".into()),
        })
        .await
        .expect("remove should succeed");
        let before = h.store.snapshot();

        let err = h
            .run(DashboardCommand::AddLayoutSection {
                index: 0,
                header: SectionHeader::default(),
                items: Vec::new(),
                stashes: vec!["top".into(), "top".into()],
            })
            .await
            .expect_err("repeated stash should fail");
        assert!(matches!(err, RoutineError::Validation(_)));
        assert_eq!(err.to_string(), "layout stash top is listed more than once");
        assert_eq!(h.store.state(), &before);
        assert_eq!(h.puts(), 0);
    }

    #[tokio::test]
    async fn move_validates_indexes() {
        let mut h = Harness::loaded();
        for (from, to) in [(0, 2), (5, 0), (1, 1)] {
            let err = h
                .run(DashboardCommand::MoveLayoutSection { from, to })
                .await
                .expect_err("move should fail");
            assert!(matches!(err, RoutineError::Validation(_)));
        }
        h.run(DashboardCommand::MoveLayoutSection { from: 1, to: 0 })
            .await
            .expect("move should succeed");
        assert_eq!(section_titles(&h), vec![None, Some("Top".into())]);
    }

    #[tokio::test]
    async fn undo_reverts_most_recent_changes_first() {
        let mut h = Harness::loaded();
        h.run(DashboardCommand::ChangeLayoutSectionHeader {
            index: 1,
            header: header("Bottom"),
        })
        .await
        .expect("header change should succeed");
        h.run(DashboardCommand::MoveLayoutSection { from: 1, to: 0 })
            .await
            .expect("move should succeed");

        let payload = h
            .run(DashboardCommand::UndoLayoutChanges { steps: 1 })
            .await
            .expect("undo should succeed");
        assert_eq!(
            payload,
            EventPayload::LayoutChangesUndone {
                undone: vec!["move_section"]
            }
        );
        assert_eq!(
            section_titles(&h),
            vec![Some("Top".into()), Some("Bottom".into())]
        );
    }

    #[tokio::test]
    async fn undo_with_empty_history_is_user_error() {
        let mut h = Harness::loaded();
        let err = h
            .run(DashboardCommand::UndoLayoutChanges { steps: 1 })
            .await
            .expect_err("nothing to undo");
        assert_eq!(err.to_string(), "there are no layout changes to undo");
    }
}
