use async_trait::async_trait;
use tracing::{debug, info};

use insights_core::application::{
    generate_api_key, is_origin_allowed, ApplicationSettings, ApplicationState, CreateApplication,
    UpdateApplication, UserAttributeDefinition,
};

use crate::runtime::{Actor, ActorContext, ActorRef, PersistentState};

/// A tracked site at `app-{applicationId}`: its api key, allowed origins,
/// settings and the catalogue of visitor attribute keys seen so far.
pub struct ApplicationActor {
    ctx: ActorContext,
    state: PersistentState<ApplicationState>,
}

#[async_trait]
impl Actor for ApplicationActor {
    const KIND: &'static str = "application";

    async fn activate(ctx: ActorContext) -> anyhow::Result<Self> {
        let state = PersistentState::load(&ctx, Self::KIND).await?;
        Ok(Self { ctx, state })
    }
}

impl ApplicationActor {
    async fn create(&mut self, request: CreateApplication) -> anyhow::Result<String> {
        let key = self.ctx.key();
        let id = key.strip_prefix("app-").unwrap_or(key).to_string();
        let api_key = generate_api_key();
        *self.state = ApplicationState {
            id,
            name: request.name,
            owner_id: request.owner_id,
            organization_id: request.organization_id,
            domain: request.domain,
            api_key: api_key.clone(),
            allowed_origins: request.allowed_origins,
            created_at: self.ctx.now(),
            is_active: true,
            settings: ApplicationSettings::default(),
            user_attributes: Default::default(),
        };
        self.state.write().await?;
        info!(application_id = %self.state.id, "application created");
        Ok(api_key)
    }

    async fn update(&mut self, request: UpdateApplication) -> anyhow::Result<()> {
        if let Some(name) = request.name {
            self.state.name = name;
        }
        if let Some(domain) = request.domain {
            self.state.domain = domain;
        }
        if let Some(allowed_origins) = request.allowed_origins {
            self.state.allowed_origins = allowed_origins;
        }
        if let Some(is_active) = request.is_active {
            self.state.is_active = is_active;
        }
        if let Some(settings) = request.settings {
            self.state.settings = settings;
        }
        self.state.write().await
    }

    async fn regenerate_api_key(&mut self) -> anyhow::Result<String> {
        let api_key = generate_api_key();
        self.state.api_key = api_key.clone();
        self.state.write().await?;
        Ok(api_key)
    }

    /// Attribute keys only register against an existing application.
    async fn register_user_attribute_keys(&mut self, keys: Vec<String>) -> anyhow::Result<()> {
        if !self.state.record_exists() || keys.is_empty() {
            debug!(key = %self.ctx.key(), "attribute keys not registered");
            return Ok(());
        }
        let now = self.ctx.now();
        for key in keys {
            self.state
                .user_attributes
                .entry(key.clone())
                .and_modify(|existing| existing.last_seen = now)
                .or_insert_with(|| UserAttributeDefinition {
                    key,
                    is_filterable: true,
                    first_seen: now,
                    last_seen: now,
                });
        }
        self.state.write().await
    }

    async fn set_user_attribute_filterable(
        &mut self,
        key: String,
        is_filterable: bool,
    ) -> anyhow::Result<bool> {
        let Some(attribute) = self.state.user_attributes.get_mut(&key) else {
            return Ok(false);
        };
        attribute.is_filterable = is_filterable;
        self.state.write().await?;
        Ok(true)
    }
}

impl ActorRef<ApplicationActor> {
    /// Create the application and return its first api key.
    pub async fn create(&self, request: CreateApplication) -> anyhow::Result<String> {
        self.call(move |a| Box::pin(a.create(request))).await
    }

    pub async fn update(&self, request: UpdateApplication) -> anyhow::Result<()> {
        self.call(move |a| Box::pin(a.update(request))).await
    }

    pub async fn get_info(&self) -> anyhow::Result<Option<ApplicationState>> {
        self.apply(|a| a.state.record_exists().then(|| a.state.clone()))
            .await
    }

    /// True only for the current key of an active application.
    pub async fn validate_api_key(&self, api_key: &str) -> anyhow::Result<bool> {
        let api_key = api_key.to_string();
        self.apply(move |a| {
            a.state.record_exists()
                && a.state.is_active
                && !a.state.api_key.is_empty()
                && a.state.api_key == api_key
        })
        .await
    }

    pub async fn regenerate_api_key(&self) -> anyhow::Result<String> {
        self.call(|a| Box::pin(a.regenerate_api_key())).await
    }

    pub async fn is_origin_allowed(&self, origin: &str) -> anyhow::Result<bool> {
        let origin = origin.to_string();
        self.apply(move |a| {
            a.state.record_exists()
                && is_origin_allowed(&a.state.allowed_origins, &a.state.domain, &origin)
        })
        .await
    }

    pub async fn delete(&self) -> anyhow::Result<()> {
        self.call(|a| Box::pin(a.state.clear())).await
    }

    pub async fn register_user_attribute_keys(&self, keys: Vec<String>) -> anyhow::Result<()> {
        self.call(move |a| Box::pin(a.register_user_attribute_keys(keys)))
            .await
    }

    /// Returns `false` if the attribute key was never registered.
    pub async fn set_user_attribute_filterable(
        &self,
        key: &str,
        is_filterable: bool,
    ) -> anyhow::Result<bool> {
        let key = key.to_string();
        self.call(move |a| Box::pin(a.set_user_attribute_filterable(key, is_filterable)))
            .await
    }

    pub async fn get_user_attributes(&self) -> anyhow::Result<Vec<UserAttributeDefinition>> {
        self.apply(|a| a.state.user_attributes.values().cloned().collect())
            .await
    }
}
