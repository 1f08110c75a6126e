// bases/provisioner/src/app.rs
use crate::args::{Command, Config};
use crate::error::ProvisionerError;
use crate::output::OutputHandler;
use crate::server;
use crate::workspace::Workspace;
use cloud_client::{ApiClient, ReqwestExecutor, StaticTokenProvider};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use deployment::Orchestrator;
use settings_store::{JsonSettingsStore, SettingsStore};
use std::path::Path;
use std::sync::Arc;

pub struct App {
    config: Config,
    output: OutputHandler,
}

impl App {
    pub fn new(config: Config) -> Self {
        let output = OutputHandler::new(config.verbose);
        Self { config, output }
    }

    pub async fn run(&self) -> Result<()> {
        let settings: Arc<dyn SettingsStore> =
            Arc::new(JsonSettingsStore::open(&self.config.settings_path)?);
        let mut workspace = Workspace::new(settings.clone(), &self.config.cache_dir);

        match &self.config.command {
            Command::Open { path } => {
                let result = workspace.open(path.as_deref()).await;
                self.output.print_open(&result, workspace.solution());
                if !result.result {
                    return Err(eyre!("solution was not opened"));
                }
            }
            Command::Provision { path } => {
                self.open_for_run(&mut workspace, path.as_deref()).await?;
                if settings.provisioning_state().is_active() {
                    tracing::warn!("the previous provisioning run did not finish");
                }

                let orchestrator = self.orchestrator(settings.clone());
                let snapshot = workspace.solution().clone();
                let outcome = workspace
                    .provision(&orchestrator, |event| self.output.print_event(&snapshot, event))
                    .await?;

                self.output.print_outcome(workspace.solution(), &outcome);
                if let Some(error) = outcome.failure {
                    return Err(eyre!("provisioning stopped: {}", error));
                }
            }
            Command::Status => self.output.print_settings(&settings.load()),
            Command::Config { subscription } => {
                if let Some(id) = subscription {
                    settings.set_subscription_id(id)?;
                    tracing::info!(subscription = %id, "subscription saved");
                }
                self.output.print_settings(&settings.load());
            }
            Command::Serve { port } => {
                let reopened = workspace.open(None).await;
                if !reopened.result {
                    tracing::warn!(message = ?reopened.message, "last configuration could not be reopened");
                }
                let orchestrator = self.orchestrator(settings.clone());
                server::run(workspace, orchestrator, settings, *port).await?;
            }
        }

        Ok(())
    }

    async fn open_for_run(&self, workspace: &mut Workspace, path: Option<&Path>) -> Result<()> {
        let result = workspace.open(path).await;
        if !result.result {
            let message = result.message.unwrap_or_default();
            return Err(ProvisionerError::OpenRejected(message).into());
        }
        if workspace.solution().is_empty() {
            return Err(ProvisionerError::NothingOpen.into());
        }
        Ok(())
    }

    fn orchestrator(&self, settings: Arc<dyn SettingsStore>) -> Orchestrator {
        let client = match &self.config.token {
            Some(token) => ApiClient::new(
                Arc::new(ReqwestExecutor::new()),
                Arc::new(StaticTokenProvider::new(token.clone())),
            ),
            None => ApiClient::from_environment(),
        };
        Orchestrator::new(client, settings)
    }

    pub fn print_error(&self, error: &color_eyre::Report) {
        self.output.print_error(error);
    }
}
