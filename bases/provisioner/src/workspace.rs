// bases/provisioner/src/workspace.rs
//! The solution currently open, and where it is saved
//!
//! Opening a file copies it into the cache directory and remembers the copy
//! as the last configuration, so results recorded during a run never touch
//! the file the user picked.

use crate::error::{ProvisionerError, Result};
use deployment::{Orchestrator, ProvisioningEvent, RunOutcome};
use serde::Serialize;
use settings_store::SettingsStore;
use solution_model::{load_solution, save_solution, Solution};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

const MALFORMED_MESSAGE: &str =
    "The selected file was either malformed or was not a solution configuration file";

/// Answer to an open request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenResult {
    pub result: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl OpenResult {
    fn opened() -> Self {
        Self {
            result: true,
            message: None,
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self {
            result: false,
            message: Some(message.into()),
        }
    }
}

pub struct Workspace {
    settings: Arc<dyn SettingsStore>,
    cache_dir: PathBuf,
    solution: Solution,
}

impl Workspace {
    pub fn new(settings: Arc<dyn SettingsStore>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            cache_dir: cache_dir.into(),
            solution: Solution::empty(),
        }
    }

    pub fn solution(&self) -> &Solution {
        &self.solution
    }

    pub fn settings(&self) -> &dyn SettingsStore {
        self.settings.as_ref()
    }

    /// Open `source`, or the last configuration when `source` is None
    ///
    /// On any failure the current solution is left as it was.
    pub async fn open(&mut self, source: Option<&Path>) -> OpenResult {
        let last = self.settings.last_configuration();
        let Some(path) = source.map(Path::to_path_buf).or(last) else {
            tracing::debug!("no last configuration, starting empty");
            self.solution = Solution::empty();
            return OpenResult::opened();
        };

        let solution = match load_solution(&path).await {
            Ok(solution) => solution,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not open solution");
                return OpenResult::rejected(format!("{MALFORMED_MESSAGE}: {e}"));
            }
        };

        if source.is_some() {
            match self.adopt(&path).await {
                Ok(cached) => tracing::info!(cached = %cached.display(), "solution copied to cache"),
                Err(e) => return OpenResult::rejected(e.to_string()),
            }
        }

        self.solution = solution;
        OpenResult::opened()
    }

    /// Copy a freshly opened file into the cache and make it the last configuration
    async fn adopt(&self, source: &Path) -> Result<PathBuf> {
        let file_name = source
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("solution.json"));
        let cached = self.cache_dir.join(file_name);

        if cached != source {
            tokio::fs::create_dir_all(&self.cache_dir)
                .await
                .map_err(|e| ProvisionerError::cache_copy(source, &cached, e))?;
            tokio::fs::copy(source, &cached)
                .await
                .map_err(|e| ProvisionerError::cache_copy(source, &cached, e))?;
        }

        self.settings.set_last_configuration(&cached)?;
        Ok(cached)
    }

    /// Write the solution to the last configuration path, if there is one
    pub async fn save(&self) -> Result<()> {
        let Some(path) = self.settings.last_configuration() else {
            return Ok(());
        };
        save_solution(&path, &self.solution).await?;
        Ok(())
    }

    /// Mirror a saved result into the open solution and persist it
    pub async fn apply_event(&mut self, event: &ProvisioningEvent) {
        let ProvisioningEvent::ItemResultSaved { item_id, response } = event else {
            return;
        };
        if !self
            .solution
            .record_provision_response(item_id, response.clone())
        {
            tracing::warn!(%item_id, "result for an item the open solution does not have");
            return;
        }
        if let Err(e) = self.save().await {
            tracing::error!(error = %e, "could not save solution");
        }
    }

    /// Provision the open solution, mirroring results as they arrive
    ///
    /// `observe` sees every event before it is applied.
    pub async fn provision(
        &mut self,
        orchestrator: &Orchestrator,
        mut observe: impl FnMut(&ProvisioningEvent),
    ) -> Result<RunOutcome> {
        if self.solution.is_empty() {
            return Err(ProvisionerError::NothingOpen);
        }

        let mut working = self.solution.clone();
        let mut events = orchestrator.subscribe();

        let outcome = {
            let run = orchestrator.provision(&mut working);
            tokio::pin!(run);

            loop {
                tokio::select! {
                    outcome = &mut run => break outcome,
                    received = events.recv() => match received {
                        Ok(event) => {
                            observe(&event);
                            self.apply_event(&event).await;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "event consumer fell behind");
                        }
                        Err(RecvError::Closed) => {}
                    },
                }
            }
        };

        while let Ok(event) = events.try_recv() {
            observe(&event);
            self.apply_event(&event).await;
        }

        // the run's own copy holds every result, including any events skipped above
        self.solution = working;
        if let Err(e) = self.save().await {
            tracing::error!(error = %e, "could not save solution after the run");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cloud_client::{ApiClient, HttpExecutor, HttpRequest, ReqwestExecutor, StaticTokenProvider};
    use serde_json::json;
    use solution_model::ServiceResponse;
    use settings_store::{JsonSettingsStore, MemorySettingsStore};
    use solution_model::SOLUTION_FILE_TYPE;
    use tempfile::TempDir;

    fn solution_json() -> serde_json::Value {
        json!({
            "fileType": SOLUTION_FILE_TYPE,
            "name": "Sandbox",
            "id": "sb-1",
            "resourceSuffixName": "x7",
            "configItems": [{
                "id": "rg",
                "name": "Resource group",
                "itemType": "resource-group",
                "resourceApiType": "resource-management",
                "resourceName": "rg",
                "payload": { "location": "westus2" }
            }]
        })
    }

    fn write(dir: &TempDir, name: &str, value: &serde_json::Value) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, serde_json::to_vec(value).unwrap()).unwrap();
        path
    }

    #[tokio::test]
    async fn opening_copies_into_the_cache() {
        let dir = TempDir::new().unwrap();
        let source = write(&dir, "plant.json", &solution_json());
        let settings = Arc::new(MemorySettingsStore::default());
        let mut workspace = Workspace::new(settings.clone(), dir.path().join("cache"));

        let result = workspace.open(Some(source.as_path())).await;

        assert_eq!(result, OpenResult::opened());
        assert_eq!(workspace.solution().name, "Sandbox");
        let cached = dir.path().join("cache").join("plant.json");
        assert_eq!(settings.last_configuration(), Some(cached.clone()));
        assert!(cached.exists());
    }

    #[tokio::test]
    async fn foreign_files_leave_the_solution_alone() {
        let dir = TempDir::new().unwrap();
        let mut foreign = solution_json();
        foreign["fileType"] = json!("00000000-0000-0000-0000-000000000000");
        let source = write(&dir, "other.json", &foreign);
        let settings = Arc::new(MemorySettingsStore::default());
        let mut workspace = Workspace::new(settings.clone(), dir.path().join("cache"));

        let result = workspace.open(Some(source.as_path())).await;

        assert!(!result.result);
        assert!(result.message.unwrap().starts_with(MALFORMED_MESSAGE));
        assert_eq!(workspace.solution(), &Solution::empty());
        assert_eq!(settings.last_configuration(), None);
    }

    #[tokio::test]
    async fn nothing_recorded_opens_empty() {
        let dir = TempDir::new().unwrap();
        let mut workspace = Workspace::new(Arc::new(MemorySettingsStore::default()), dir.path());

        assert_eq!(workspace.open(None).await, OpenResult::opened());
        assert!(workspace.solution().is_empty());
    }

    #[tokio::test]
    async fn reopens_the_cached_copy_after_a_restart() {
        let dir = TempDir::new().unwrap();
        let source = write(&dir, "plant.json", &solution_json());
        let settings_path = dir.path().join("settings.json");

        {
            let settings = Arc::new(JsonSettingsStore::open(&settings_path).unwrap());
            let mut workspace = Workspace::new(settings, dir.path().join("cache"));
            assert!(workspace.open(Some(source.as_path())).await.result);
        }
        std::fs::remove_file(&source).unwrap();

        let settings = Arc::new(JsonSettingsStore::open(&settings_path).unwrap());
        let mut workspace = Workspace::new(settings, dir.path().join("cache"));
        assert!(workspace.open(None).await.result);
        assert_eq!(workspace.solution().id, "sb-1");
    }

    #[tokio::test]
    async fn saved_results_are_written_to_the_cached_copy() {
        let dir = TempDir::new().unwrap();
        let source = write(&dir, "plant.json", &solution_json());
        let settings = Arc::new(MemorySettingsStore::default());
        let mut workspace = Workspace::new(settings.clone(), dir.path().join("cache"));
        workspace.open(Some(source.as_path())).await;

        workspace
            .apply_event(&ProvisioningEvent::ItemResultSaved {
                item_id: "rg".to_string(),
                response: json!({ "name": "rgx7" }),
            })
            .await;

        let cached = settings.last_configuration().unwrap();
        let saved = load_solution(&cached).await.unwrap();
        assert_eq!(
            saved.config_items[0].provision_response,
            Some(json!({ "name": "rgx7" }))
        );
        // the original is untouched
        let original = load_solution(&source).await.unwrap();
        assert!(original.config_items[0].provision_response.is_none());
    }

    #[tokio::test]
    async fn saving_without_a_path_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(Arc::new(MemorySettingsStore::default()), dir.path());
        assert!(workspace.save().await.is_ok());
    }

    /// Answers every call with the same resource-group payload
    struct AcceptingExecutor;

    #[async_trait]
    impl HttpExecutor for AcceptingExecutor {
        async fn execute(&self, _request: HttpRequest) -> ServiceResponse {
            ServiceResponse::ok(Some(json!({ "name": "rgx7", "location": "westus2" })))
        }
    }

    #[tokio::test]
    async fn finished_runs_keep_every_result() {
        let dir = TempDir::new().unwrap();
        let source = write(&dir, "plant.json", &solution_json());
        let settings = Arc::new(MemorySettingsStore::default());
        settings.set_subscription_id("sub-1").unwrap();
        let mut workspace = Workspace::new(settings.clone(), dir.path().join("cache"));
        assert!(workspace.open(Some(source.as_path())).await.result);
        let client = ApiClient::new(
            Arc::new(AcceptingExecutor),
            Arc::new(StaticTokenProvider::new("t")),
        );
        let orchestrator = Orchestrator::new(client, settings.clone());

        let outcome = workspace.provision(&orchestrator, |_| {}).await.unwrap();

        assert!(outcome.succeeded());
        let expected = Some(json!({ "name": "rgx7", "location": "westus2" }));
        assert_eq!(workspace.solution().config_items[0].provision_response, expected);
        let saved = load_solution(settings.last_configuration().unwrap()).await.unwrap();
        assert_eq!(saved.config_items[0].provision_response, expected);
    }

    #[tokio::test]
    async fn provisioning_needs_an_open_solution() {
        let dir = TempDir::new().unwrap();
        let settings = Arc::new(MemorySettingsStore::default());
        let mut workspace = Workspace::new(settings.clone(), dir.path());
        let client = ApiClient::new(
            Arc::new(ReqwestExecutor::new()),
            Arc::new(StaticTokenProvider::new("t")),
        );
        let orchestrator = Orchestrator::new(client, settings);

        let result = workspace.provision(&orchestrator, |_| {}).await;

        assert!(matches!(result, Err(ProvisionerError::NothingOpen)));
    }
}
