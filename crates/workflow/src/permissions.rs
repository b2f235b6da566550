//! Per-profile access permissions and the cache of their definitions.

use std::collections::BTreeSet;

use serde::Serialize;
use tokio::sync::RwLock;

/// Pages guarded by a permission pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    SubscriptionForm,
    PreferencesForm,
    RequestForm,
    OptinPage,
}

impl Route {
    pub const ALL: [Route; 4] = [
        Route::SubscriptionForm,
        Route::PreferencesForm,
        Route::RequestForm,
        Route::OptinPage,
    ];

    fn noun(self) -> &'static str {
        match self {
            Route::SubscriptionForm => "subscription form",
            Route::PreferencesForm => "preferences form",
            Route::RequestForm => "request form",
            Route::OptinPage => "opt-in page",
        }
    }

    fn describe(self, profile: &str) -> String {
        match self {
            Route::SubscriptionForm => format!(
                "Allow users to access the public newsletter subscription form with profile {profile}."
            ),
            Route::PreferencesForm => format!(
                "Allow users to access the newsletter preferences form with profile {profile}."
            ),
            Route::RequestForm => {
                format!("Allow users to access the request link form for profile {profile}.")
            }
            Route::OptinPage => {
                format!("Allow users to access the opt-in page for profile {profile}.")
            }
        }
    }

    pub fn global_permission(self) -> String {
        format!("access all civicrm newsletter {}s", self.noun())
    }

    pub fn profile_permission(self, profile: &str) -> String {
        format!("access civicrm newsletter {} {profile}", self.noun())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionDefinition {
    pub name: String,
    pub title: String,
    pub description: String,
}

/// Global permissions first, then four per profile in the given order.
pub fn permission_definitions<'a>(profiles: impl IntoIterator<Item = &'a str>) -> Vec<PermissionDefinition> {
    let mut definitions: Vec<_> = Route::ALL
        .into_iter()
        .map(|route| PermissionDefinition {
            name: route.global_permission(),
            title: format!("Access all newsletter {}s", route.noun()),
            description: format!(
                "Allow users to access the newsletter {} of every profile.",
                route.noun()
            ),
        })
        .collect();

    for profile in profiles {
        definitions.extend(Route::ALL.into_iter().map(|route| PermissionDefinition {
            name: route.profile_permission(profile),
            title: format!("Access newsletter {} with profile {profile}", route.noun()),
            description: route.describe(profile),
        }));
    }
    definitions
}

/// Either the global or the profile-specific permission grants access.
pub fn check_access(granted: &BTreeSet<String>, route: Route, profile: &str) -> bool {
    granted.contains(&route.global_permission())
        || granted.contains(&route.profile_permission(profile))
}

struct CachedDefinitions {
    profiles: Vec<String>,
    definitions: Vec<PermissionDefinition>,
}

/// Caches definitions for the last seen profile list until it changes or is invalidated.
#[derive(Default)]
pub struct PermissionRegistry {
    cached: RwLock<Option<CachedDefinitions>>,
}

impl PermissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn definitions(&self, profiles: &[String]) -> Vec<PermissionDefinition> {
        if let Some(cached) = self.cached.read().await.as_ref() {
            if cached.profiles == profiles {
                return cached.definitions.clone();
            }
        }

        let definitions = permission_definitions(profiles.iter().map(String::as_str));
        *self.cached.write().await = Some(CachedDefinitions {
            profiles: profiles.to_vec(),
            definitions: definitions.clone(),
        });
        definitions
    }

    pub async fn invalidate(&self) {
        self.cached.write().await.take();
    }

    #[cfg(test)]
    pub(crate) async fn is_cached(&self) -> bool {
        self.cached.read().await.is_some()
    }
}
