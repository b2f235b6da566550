use serde::{Deserialize, Serialize};

/// Where a flow may send the visitor after a terminal step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectTarget {
    SubscriptionForm,
    PreferencesForm,
    RequestLinkForm,
    Unsubscribe,
    OptinPage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectPaths {
    pub subscription_form: Option<String>,
    pub preferences_form: Option<String>,
    pub request_link_form: Option<String>,
    pub unsubscribe: Option<String>,
    pub optin_page: Option<String>,
}

impl RedirectPaths {
    /// The configured path for `target`; blank paths count as unset.
    pub fn get(&self, target: RedirectTarget) -> Option<&str> {
        let path = match target {
            RedirectTarget::SubscriptionForm => &self.subscription_form,
            RedirectTarget::PreferencesForm => &self.preferences_form,
            RedirectTarget::RequestLinkForm => &self.request_link_form,
            RedirectTarget::Unsubscribe => &self.unsubscribe,
            RedirectTarget::OptinPage => &self.optin_page,
        };
        path.as_deref().map(str::trim).filter(|path| !path.is_empty())
    }

    pub fn set(&mut self, target: RedirectTarget, path: Option<String>) {
        let slot = match target {
            RedirectTarget::SubscriptionForm => &mut self.subscription_form,
            RedirectTarget::PreferencesForm => &mut self.preferences_form,
            RedirectTarget::RequestLinkForm => &mut self.request_link_form,
            RedirectTarget::Unsubscribe => &mut self.unsubscribe,
            RedirectTarget::OptinPage => &mut self.optin_page,
        };
        *slot = path;
    }

    pub fn iter(&self) -> impl Iterator<Item = (RedirectTarget, &str)> {
        RedirectTarget::ALL
            .into_iter()
            .filter_map(|target| self.get(target).map(|path| (target, path)))
    }
}

impl RedirectTarget {
    pub const ALL: [RedirectTarget; 5] = [
        RedirectTarget::SubscriptionForm,
        RedirectTarget::PreferencesForm,
        RedirectTarget::RequestLinkForm,
        RedirectTarget::Unsubscribe,
        RedirectTarget::OptinPage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RedirectTarget::SubscriptionForm => "subscription_form",
            RedirectTarget::PreferencesForm => "preferences_form",
            RedirectTarget::RequestLinkForm => "request_link_form",
            RedirectTarget::Unsubscribe => "unsubscribe",
            RedirectTarget::OptinPage => "optin_page",
        }
    }
}

/// Behaviour switches shared by all flows. Read-only for the duration of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    pub preferences_autoconfirm: bool,
    pub redirect_paths: RedirectPaths,
    pub redirect_disable_messages: bool,
    pub single_group_hide: bool,
    pub parent_groups_selectable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_redirect_paths_are_unset() {
        let mut paths = RedirectPaths::default();
        paths.set(RedirectTarget::OptinPage, Some("  ".into()));
        paths.set(RedirectTarget::Unsubscribe, Some("/goodbye".into()));

        assert_eq!(paths.get(RedirectTarget::OptinPage), None);
        assert_eq!(paths.get(RedirectTarget::Unsubscribe), Some("/goodbye"));
        assert_eq!(
            paths.iter().collect::<Vec<_>>(),
            [(RedirectTarget::Unsubscribe, "/goodbye")]
        );
    }
}
