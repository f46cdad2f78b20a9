//! Dashboard identity and the user the session runs as.

use serde::Serialize;

use super::Slice;
use crate::model::UserInfo;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetaState {
    pub dashboard_ref: Option<String>,
    pub title: String,
    pub user: Option<UserInfo>,
    /// Set once a dashboard has been loaded into the session.
    pub initialized: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum MetaAction {
    SetDashboard { dashboard_ref: String, title: String },
    Rename(String),
    SetUser(UserInfo),
}

impl Slice for MetaState {
    const NAME: &'static str = "meta";

    type Action = MetaAction;

    fn reduce(mut self, action: &MetaAction) -> Self {
        match action {
            MetaAction::SetDashboard {
                dashboard_ref,
                title,
            } => {
                self.dashboard_ref = Some(dashboard_ref.clone());
                self.title = title.clone();
                self.initialized = true;
            }
            MetaAction::Rename(title) => self.title = title.clone(),
            MetaAction::SetUser(user) => self.user = Some(user.clone()),
        }
        self
    }
}
