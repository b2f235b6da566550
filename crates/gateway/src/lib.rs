use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{
    domain::{Profile, Subscription},
    protocol::{
        ApiReply, ConfirmParams, RequestParams, StatusParams, SubmitParams, PROFILE_ENTITY,
        SUBSCRIPTION_ENTITY,
    },
    wire,
};
use tracing::{debug, warn};
use url::Url;

pub mod error;

pub use error::GatewayError;

/// Transport to the contact-management backend: `entity, action, params -> reply`.
///
/// Implementations report transport-level failures as `Err`; backend-level
/// failures come back as an `Ok` reply with `is_error` set.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn call(&self, entity: &str, action: &str, params: Value) -> Result<ApiReply>;
}

/// Talks to the backend's REST endpoint, one form-encoded POST per call.
pub struct HttpGateway {
    http: Client,
    endpoint: Url,
    api_key: Option<String>,
    site_key: Option<String>,
}

impl HttpGateway {
    pub fn new(endpoint: Url) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            api_key: None,
            site_key: None,
        }
    }

    pub fn with_credentials(
        mut self,
        api_key: Option<String>,
        site_key: Option<String>,
    ) -> Self {
        self.api_key = api_key;
        self.site_key = site_key;
        self
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn call(&self, entity: &str, action: &str, params: Value) -> Result<ApiReply> {
        let json = serde_json::to_string(&params)
            .map_err(|source| GatewayError::encode(entity, action, source))?;

        let mut form = vec![("entity", entity), ("action", action), ("json", json.as_str())];
        if let Some(api_key) = &self.api_key {
            form.push(("api_key", api_key.as_str()));
        }
        if let Some(site_key) = &self.site_key {
            form.push(("key", site_key.as_str()));
        }

        let body = self
            .http
            .post(self.endpoint.clone())
            .form(&form)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|source| GatewayError::transport(entity, action, source))?
            .bytes()
            .await
            .map_err(|source| GatewayError::transport(entity, action, source))?;

        let reply = serde_json::from_slice(&body)
            .map_err(|source| GatewayError::malformed(entity, action, source))?;
        Ok(reply)
    }
}

#[derive(Deserialize)]
struct ProfileList(#[serde(deserialize_with = "wire::keyed_list")] Vec<Profile>);

#[derive(Serialize)]
struct ProfileQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

/// Typed access to the newsletter entities of the backend.
#[derive(Clone)]
pub struct NewsletterApi {
    gateway: Arc<dyn RemoteGateway>,
}

impl NewsletterApi {
    pub fn new(gateway: Arc<dyn RemoteGateway>) -> Self {
        Self { gateway }
    }

    /// All configured profiles, in backend order. A backend error yields no profiles.
    pub async fn profiles(&self) -> Result<Vec<Profile>> {
        let reply = self
            .call(PROFILE_ENTITY, "get", &ProfileQuery { name: None })
            .await?;
        if reply.is_error {
            return Ok(Vec::new());
        }
        let ProfileList(profiles) = serde_json::from_value(reply.values)
            .map_err(|source| GatewayError::malformed(PROFILE_ENTITY, "get", source))?;
        Ok(profiles)
    }

    pub async fn profile(&self, name: &str) -> Result<Option<Profile>> {
        let reply = self
            .call(PROFILE_ENTITY, "getsingle", &ProfileQuery { name: Some(name) })
            .await?;
        if reply.is_error {
            return Ok(None);
        }
        let profile: Option<Profile> = reply
            .first_value()
            .map_err(|source| GatewayError::malformed(PROFILE_ENTITY, "getsingle", source))?;
        Ok(profile.map(|mut profile| {
            if profile.name.is_empty() {
                profile.name = name.to_string();
            }
            profile
        }))
    }

    /// Current subscription state for the contact behind `checksum`, if the backend knows it.
    pub async fn subscription_status(
        &self,
        profile: &str,
        checksum: &str,
    ) -> Result<Option<Subscription>> {
        let params = StatusParams {
            profile: profile.to_string(),
            contact_checksum: checksum.to_string(),
        };
        let reply = self.call(SUBSCRIPTION_ENTITY, "get", &params).await?;
        if reply.is_error {
            return Ok(None);
        }
        let subscription = reply
            .first_value()
            .map_err(|source| GatewayError::malformed(SUBSCRIPTION_ENTITY, "get", source))?;
        Ok(subscription)
    }

    pub async fn submit(&self, params: &SubmitParams) -> Result<ApiReply> {
        self.call(SUBSCRIPTION_ENTITY, "submit", params).await
    }

    pub async fn confirm(&self, params: &ConfirmParams) -> Result<ApiReply> {
        self.call(SUBSCRIPTION_ENTITY, "confirm", params).await
    }

    pub async fn auto_confirm(&self, profile: &str, subscription: &Subscription) -> Result<ApiReply> {
        let params = ConfirmParams::auto_confirm(profile, subscription);
        self.call(SUBSCRIPTION_ENTITY, "confirm", &params).await
    }

    pub async fn request(&self, params: &RequestParams) -> Result<ApiReply> {
        self.call(SUBSCRIPTION_ENTITY, "request", params).await
    }

    async fn call<P: Serialize>(&self, entity: &str, action: &str, params: &P) -> Result<ApiReply> {
        let params = serde_json::to_value(params)
            .map_err(|source| GatewayError::encode(entity, action, source))?;
        debug!(entity, action, "calling backend");

        let reply = self.gateway.call(entity, action, params).await?;
        if reply.is_error {
            warn!(
                entity,
                action,
                error = reply.error_message.as_deref().unwrap_or("unspecified"),
                "backend reported an error"
            );
        }
        Ok(reply)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
