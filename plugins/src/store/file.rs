use std::path::{Path, PathBuf};

use async_trait::async_trait;
use forgeflow_core::api::{
    AuditLogEntry, CoreError, CoreResult, GenerationResult, MemoryStore, Store, StoreSnapshot,
    Task, TaskFilter, TaskPatch, Workflow, WorkflowPatch,
};
use tokio::sync::Mutex;

/// JSON-file persistence: a [`MemoryStore`] whose full snapshot is rewritten
/// after every mutation.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash leaves either the old or the new snapshot on disk.
pub struct FileStore {
    inner: MemoryStore,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Loads `path` if it exists, otherwise starts empty.
    pub async fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: StoreSnapshot = serde_json::from_slice(&bytes).map_err(|e| {
                    CoreError::Database(format!("corrupt store file {}: {e}", path.display()))
                })?;
                MemoryStore::from_snapshot(snapshot)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MemoryStore::new(),
            Err(e) => {
                return Err(CoreError::Database(format!(
                    "read {}: {e}",
                    path.display()
                )))
            }
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::Database(format!("create {}: {e}", parent.display())))?;
        }
        tracing::debug!(target: "forgeflow.store", path = %path.display(), "file store opened");
        Ok(Self {
            inner,
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> CoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.inner.snapshot().await;
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| CoreError::Database(format!("encode snapshot: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| CoreError::Database(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| CoreError::Database(format!("rename {}: {e}", tmp.display())))?;
        Ok(())
    }
}

#[async_trait]
impl Store for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn insert_workflow(&self, workflow: &Workflow) -> CoreResult<()> {
        self.inner.insert_workflow(workflow).await?;
        self.persist().await
    }

    async fn get_workflow(&self, id: &str) -> CoreResult<Option<Workflow>> {
        self.inner.get_workflow(id).await
    }

    async fn update_workflow(&self, id: &str, patch: WorkflowPatch) -> CoreResult<Workflow> {
        let updated = self.inner.update_workflow(id, patch).await?;
        self.persist().await?;
        Ok(updated)
    }

    async fn insert_task(&self, task: &Task) -> CoreResult<()> {
        self.inner.insert_task(task).await?;
        self.persist().await
    }

    async fn get_task(&self, id: &str) -> CoreResult<Option<Task>> {
        self.inner.get_task(id).await
    }

    async fn update_task(&self, id: &str, patch: TaskPatch) -> CoreResult<Task> {
        let updated = self.inner.update_task(id, patch).await?;
        self.persist().await?;
        Ok(updated)
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> CoreResult<Vec<Task>> {
        self.inner.list_tasks(filter).await
    }

    async fn insert_generation_result(&self, result: &GenerationResult) -> CoreResult<()> {
        self.inner.insert_generation_result(result).await?;
        self.persist().await
    }

    async fn get_generation_result(&self, id: &str) -> CoreResult<Option<GenerationResult>> {
        self.inner.get_generation_result(id).await
    }

    async fn list_generation_results(&self, task_id: &str) -> CoreResult<Vec<GenerationResult>> {
        self.inner.list_generation_results(task_id).await
    }

    async fn append_audit_logs(&self, entries: &[AuditLogEntry]) -> CoreResult<()> {
        self.inner.append_audit_logs(entries).await?;
        self.persist().await
    }

    async fn list_audit_logs(&self, task_id: &str) -> CoreResult<Vec<AuditLogEntry>> {
        self.inner.list_audit_logs(task_id).await
    }

    async fn close(&self) -> CoreResult<()> {
        self.persist().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeflow_core::api::{AgentType, TaskStatus};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn reopening_restores_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let task = Task::new("wf-1", AgentType::Backend, "orders").with_target_module("orders");
        {
            let store = FileStore::open(&path).await.unwrap();
            store.insert_task(&task).await.unwrap();
            store
                .update_task(&task.id, TaskPatch::status(TaskStatus::Blocked))
                .await
                .unwrap();
        }

        let reopened = FileStore::open(&path).await.unwrap();
        let restored = reopened.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(restored.status, TaskStatus::Blocked);
        assert_eq!(restored.title, "orders");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_database_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            FileStore::open(&path).await,
            Err(CoreError::Database(_))
        ));
    }

    #[tokio::test]
    async fn missing_rows_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("store.json")).await.unwrap();
        assert!(store.get_workflow("nope").await.unwrap().is_none());
        assert!(matches!(
            store.update_task("nope", TaskPatch::default()).await,
            Err(CoreError::NotFound { .. })
        ));
    }
}
