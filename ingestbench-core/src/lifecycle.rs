use std::sync::Arc;

use async_trait::async_trait;
use ingestbench_value::{Payload, Value, epoch_millis};

use crate::sdk::{InitOptions, Sdk, SdkSettings};
use crate::session::{HttpSession, Session};
use crate::{Error, Result};

/// Per-user setup and teardown. Setup runs once before a user's first
/// iteration, teardown once after its last.
#[async_trait]
pub trait UserLifecycle: Send + Sync {
    async fn setup(&self, user_id: u64) -> Result<Session>;
    async fn teardown(&self, session: Session) -> Result<()>;
}

/// Direct HTTP ingestion: each user gets its own numeric run id and header set.
///
/// Run ids are the lifecycle's creation time in epoch milliseconds plus the
/// user id, so they are distinct across the users of one run.
#[derive(Debug, Clone)]
pub struct HttpLifecycle {
    api_key: String,
    project_name: String,
    run_id_base: u64,
}

impl HttpLifecycle {
    #[must_use]
    pub fn new(api_key: impl Into<String>, project_name: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            project_name: project_name.into(),
            run_id_base: epoch_millis(),
        }
    }
}

#[async_trait]
impl UserLifecycle for HttpLifecycle {
    async fn setup(&self, user_id: u64) -> Result<Session> {
        if self.api_key.trim().is_empty() {
            return Err(Error::MissingApiKey);
        }
        let run_id = self.run_id_base.saturating_add(user_id);
        Ok(Session::Http(HttpSession::new(
            run_id,
            &self.api_key,
            &self.project_name,
        )))
    }

    async fn teardown(&self, _session: Session) -> Result<()> {
        Ok(())
    }
}

/// SDK path: `login` + `init` at setup, `finish` at teardown.
pub struct SdkLifecycle {
    sdk: Arc<dyn Sdk>,
    settings: SdkSettings,
    project_name: String,
}

impl SdkLifecycle {
    #[must_use]
    pub fn new(sdk: Arc<dyn Sdk>, settings: SdkSettings, project_name: impl Into<String>) -> Self {
        Self {
            sdk,
            settings,
            project_name: project_name.into(),
        }
    }
}

#[async_trait]
impl UserLifecycle for SdkLifecycle {
    async fn setup(&self, user_id: u64) -> Result<Session> {
        self.sdk.login(&self.settings).await?;

        let mut config = Payload::new();
        config.insert("test_type".to_string(), Value::from("load_test"));
        config.insert("target_rps".to_string(), Value::Int(1000));

        let run = self
            .sdk
            .init(
                InitOptions {
                    project: self.project_name.clone(),
                    name: format!("load-test-run-{user_id}"),
                    config,
                    tags: vec!["load-test".to_string()],
                    user_id,
                },
                &self.settings,
            )
            .await?;
        Ok(Session::Sdk(run))
    }

    async fn teardown(&self, session: Session) -> Result<()> {
        match session {
            Session::Sdk(run) => run.finish().await,
            Session::Http(_) => Ok(()),
        }
    }
}
