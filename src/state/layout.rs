//! Dashboard layout: sections of widgets, stashed items, and undo history.

use std::collections::BTreeMap;

use serde::Serialize;

use super::Slice;
use crate::model::{LayoutItem, LayoutSection, SectionHeader, Widget, WidgetRef};

/// Number of layout changes kept for undo unless configured otherwise.
pub const DEFAULT_UNDO_LIMIT: usize = 50;

/// Layout as it was before one undoable change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UndoEntry {
    /// Name of the action that was undone-able, e.g. `"add_section"`.
    pub action: &'static str,
    pub sections: Vec<LayoutSection>,
    pub stash: BTreeMap<String, Vec<LayoutItem>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutState {
    pub sections: Vec<LayoutSection>,
    /// Items removed from the layout under a caller-chosen identifier, ready
    /// to be placed again by a later command.
    pub stash: BTreeMap<String, Vec<LayoutItem>>,
    pub undo: Vec<UndoEntry>,
    #[serde(skip)]
    undo_limit: usize,
}

impl Default for LayoutState {
    fn default() -> Self {
        Self::with_undo_limit(DEFAULT_UNDO_LIMIT)
    }
}

impl LayoutState {
    pub fn with_undo_limit(undo_limit: usize) -> Self {
        Self {
            sections: Vec::new(),
            stash: BTreeMap::new(),
            undo: Vec::new(),
            undo_limit,
        }
    }

    /// Maximum number of undo entries kept.
    pub fn undo_limit(&self) -> usize {
        self.undo_limit
    }

    pub fn widgets(&self) -> impl Iterator<Item = &Widget> {
        self.sections
            .iter()
            .flat_map(|s| s.items.iter().map(|i| &i.widget))
    }

    pub fn widget(&self, widget_ref: &WidgetRef) -> Option<&Widget> {
        self.widgets().find(|w| w.widget_ref == *widget_ref)
    }

    fn widget_mut(&mut self, widget_ref: &WidgetRef) -> Option<&mut Widget> {
        self.sections
            .iter_mut()
            .flat_map(|s| s.items.iter_mut().map(|i| &mut i.widget))
            .find(|w| w.widget_ref == *widget_ref)
    }

    fn push_undo(&mut self, action: &'static str) {
        if self.undo_limit == 0 {
            return;
        }
        self.undo.push(UndoEntry {
            action,
            sections: self.sections.clone(),
            stash: self.stash.clone(),
        });
        if self.undo.len() > self.undo_limit {
            self.undo.remove(0);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum LayoutAction {
    /// Replace the layout. Clears the stash and the undo history.
    SetLayout(Vec<LayoutSection>),
    /// Insert a section. `used_stashes` are consumed from the stash.
    AddSection {
        index: usize,
        section: LayoutSection,
        used_stashes: Vec<String>,
    },
    RemoveSection {
        index: usize,
        stash_identifier: Option<String>,
    },
    MoveSection { from: usize, to: usize },
    ChangeSectionHeader { index: usize, header: SectionHeader },
    ReplaceWidgetHeader { widget_ref: WidgetRef, title: String },
    /// Revert the last `steps` undoable changes.
    Undo { steps: usize },
}

impl Slice for LayoutState {
    const NAME: &'static str = "layout";

    type Action = LayoutAction;

    fn reduce(mut self, action: &LayoutAction) -> Self {
        match action {
            LayoutAction::SetLayout(sections) => {
                self.sections = sections.clone();
                self.stash.clear();
                self.undo.clear();
            }
            LayoutAction::AddSection {
                index,
                section,
                used_stashes,
            } => {
                self.push_undo("add_section");
                for id in used_stashes {
                    self.stash.remove(id);
                }
                let at = (*index).min(self.sections.len());
                self.sections.insert(at, section.clone());
            }
            LayoutAction::RemoveSection {
                index,
                stash_identifier,
            } => {
                if *index < self.sections.len() {
                    self.push_undo("remove_section");
                    let removed = self.sections.remove(*index);
                    if let Some(id) = stash_identifier {
                        self.stash.insert(id.clone(), removed.items);
                    }
                }
            }
            LayoutAction::MoveSection { from, to } => {
                let len = self.sections.len();
                if *from < len && *to < len && from != to {
                    self.push_undo("move_section");
                    let section = self.sections.remove(*from);
                    self.sections.insert(*to, section);
                }
            }
            LayoutAction::ChangeSectionHeader { index, header } => {
                if *index < self.sections.len() {
                    self.push_undo("change_section_header");
                    self.sections[*index].header = header.clone();
                }
            }
            LayoutAction::ReplaceWidgetHeader { widget_ref, title } => {
                if self.widget(widget_ref).is_some() {
                    self.push_undo("replace_widget_header");
                    if let Some(widget) = self.widget_mut(widget_ref) {
                        widget.title = title.clone();
                    }
                }
            }
            LayoutAction::Undo { steps } => {
                let keep = self.undo.len().saturating_sub(*steps);
                if let Some(oldest) = self.undo.drain(keep..).next() {
                    self.sections = oldest.sections;
                    self.stash = oldest.stash;
                }
            }
        }
        self
    }
}
