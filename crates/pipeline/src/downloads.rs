//! Download job manager.
//!
//! Each job moves `queued -> in_progress -> ready | error`. A job runs in its
//! own task (jobs are not pooled) and reports progress on the bus:
//!
//! - a single file is streamed to `{downloads_dir}/{job_id}/{name}`,
//!   reporting `retrieving` 0..=100;
//! - a directory is staged under `{downloads_dir}/{job_id}/staging/{name}`
//!   (`retrieving` 0..=100) and zipped into `{downloads_dir}/{job_id}/{name}.zip`
//!   (`compressing` 0..=100).
//!
//! The finished artifact is handed out exactly once by [`DownloadManager::collect`],
//! after which the job and its directory are gone. Uncollected jobs stay in
//! the registry for the life of the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;

use burrow_core::error::CoreError;
use burrow_core::job_events::TransferPhase;
use burrow_core::paths;
use burrow_core::remote::{RemoteConnector, RemoteStore};
use burrow_core::types::{JobId, Timestamp};
use burrow_events::bus::{ProgressBus, ProgressMessage};

use crate::archive;
use crate::error::DownloadError;
use crate::progress::PhaseProgress;
use crate::staging;

/// Longest accepted client-supplied job id.
const MAX_JOB_ID_LEN: usize = 64;

/// Archive name used when the whole remote root is downloaded.
const ROOT_ARCHIVE_NAME: &str = "root";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    InProgress,
    Ready,
    Error,
}

/// Public view of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub remote_path: String,
    pub status: JobStatus,
    /// File name the artifact is delivered under, once known.
    pub file_name: Option<String>,
    pub error: Option<String>,
    pub created_at: Timestamp,
}

struct JobRecord {
    snapshot: JobSnapshot,
    artifact: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub downloads_dir: PathBuf,
    /// Ceiling for the packaging phase of a directory download.
    pub archive_timeout: Duration,
}

/// A collected artifact: an open file plus the guard that deletes the job
/// directory once dropped. Keep the guard alive until the file has been
/// fully streamed.
#[derive(Debug)]
pub struct CollectedArtifact {
    pub file: tokio::fs::File,
    pub file_name: String,
    pub len: u64,
    pub cleanup: ArtifactCleanup,
}

/// Removes a job directory when dropped.
#[derive(Debug)]
pub struct ArtifactCleanup {
    dir: PathBuf,
}

impl Drop for ArtifactCleanup {
    fn drop(&mut self) {
        let dir = std::mem::take(&mut self.dir);
        if dir.as_os_str().is_empty() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                        tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove collected download");
                    }
                });
            }
            Err(_) => {
                let _ = std::fs::remove_dir_all(&dir);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Client-supplied job ids become directory names, so they are restricted
/// to `[A-Za-z0-9_-]{1,64}`.
pub fn validate_job_id(job_id: &str) -> Result<(), CoreError> {
    if job_id.is_empty() || job_id.len() > MAX_JOB_ID_LEN {
        return Err(CoreError::Validation(format!(
            "Job id must be 1-{MAX_JOB_ID_LEN} characters"
        )));
    }
    if !job_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CoreError::Validation(
            "Job id may only contain letters, digits, '-' and '_'".into(),
        ));
    }
    Ok(())
}

/// Base name of the artifact for a remote path.
pub fn artifact_base_name(remote_path: &str) -> String {
    match paths::basename(remote_path) {
        "" => ROOT_ARCHIVE_NAME.to_string(),
        name => name.to_string(),
    }
}

// ---------------------------------------------------------------------------
// DownloadManager
// ---------------------------------------------------------------------------

pub struct DownloadManager {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
    connector: Arc<dyn RemoteConnector>,
    bus: Arc<ProgressBus>,
    config: DownloadConfig,
}

impl DownloadManager {
    pub fn new(
        config: DownloadConfig,
        connector: Arc<dyn RemoteConnector>,
        bus: Arc<ProgressBus>,
    ) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            connector,
            bus,
            config,
        }
    }

    /// Start a download of `remote_path`, or return the existing job when
    /// `job_id` is already registered (the path is then ignored).
    pub async fn request_job(
        self: &Arc<Self>,
        job_id: Option<String>,
        remote_path: &str,
    ) -> Result<JobSnapshot, CoreError> {
        let job_id = match job_id {
            Some(id) => {
                validate_job_id(&id)?;
                id
            }
            None => uuid::Uuid::new_v4().to_string(),
        };
        let remote_path = paths::normalize(remote_path);

        let snapshot = {
            let mut jobs = self.jobs.write().await;
            if let Some(existing) = jobs.get(&job_id) {
                tracing::debug!(job_id = %job_id, "Download already requested");
                return Ok(existing.snapshot.clone());
            }
            let snapshot = JobSnapshot {
                job_id: job_id.clone(),
                remote_path: remote_path.clone(),
                status: JobStatus::Queued,
                file_name: None,
                error: None,
                created_at: chrono::Utc::now(),
            };
            jobs.insert(
                job_id.clone(),
                JobRecord {
                    snapshot: snapshot.clone(),
                    artifact: None,
                },
            );
            snapshot
        };

        tracing::info!(job_id = %job_id, remote_path = %remote_path, "Download queued");
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.supervise(job_id, remote_path).await });

        Ok(snapshot)
    }

    pub async fn status(&self, job_id: &str) -> Option<JobSnapshot> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .map(|record| record.snapshot.clone())
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Hand out a ready artifact. The job leaves the registry immediately;
    /// its directory is removed when the returned cleanup guard drops.
    pub async fn collect(&self, job_id: &str) -> Result<CollectedArtifact, CoreError> {
        let record = {
            let mut jobs = self.jobs.write().await;
            let record = jobs.get(job_id).ok_or_else(|| CoreError::NotFound {
                entity: "Download",
                id: job_id.to_string(),
            })?;
            match record.snapshot.status {
                JobStatus::Ready => {}
                JobStatus::Error => {
                    return Err(CoreError::Conflict(format!(
                        "Download {job_id} failed: {}",
                        record.snapshot.error.as_deref().unwrap_or("unknown error")
                    )))
                }
                JobStatus::Queued | JobStatus::InProgress => {
                    return Err(CoreError::Conflict(format!(
                        "Download {job_id} is not ready yet"
                    )))
                }
            }
            jobs.remove(job_id).ok_or_else(|| {
                CoreError::Internal(format!("download {job_id} vanished while collecting"))
            })?
        };

        let cleanup = ArtifactCleanup {
            dir: self.job_dir(job_id),
        };
        let path = record
            .artifact
            .ok_or_else(|| CoreError::Internal(format!("download {job_id} has no artifact")))?;
        let file = tokio::fs::File::open(&path).await?;
        let len = file.metadata().await?.len();
        let file_name = record
            .snapshot
            .file_name
            .unwrap_or_else(|| artifact_base_name(&record.snapshot.remote_path));

        tracing::info!(job_id, bytes = len, "Download collected");
        Ok(CollectedArtifact {
            file,
            file_name,
            len,
            cleanup,
        })
    }

    fn job_dir(&self, job_id: &str) -> PathBuf {
        self.config.downloads_dir.join(job_id)
    }

    async fn update(&self, job_id: &str, apply: impl FnOnce(&mut JobRecord)) {
        if let Some(record) = self.jobs.write().await.get_mut(job_id) {
            apply(record);
        }
    }

    /// Drive one job to a terminal state. The body runs in a separate task
    /// so a panic inside it still ends in `error`.
    async fn supervise(self: Arc<Self>, job_id: JobId, remote_path: String) {
        self.update(&job_id, |r| r.snapshot.status = JobStatus::InProgress)
            .await;

        let job = JobRun {
            job_id: job_id.clone(),
            remote_path,
            job_dir: self.job_dir(&job_id),
            connector: Arc::clone(&self.connector),
            bus: Arc::clone(&self.bus),
            archive_timeout: self.config.archive_timeout,
        };
        let job_dir = job.job_dir.clone();

        let outcome = match tokio::spawn(job.run()).await {
            Ok(outcome) => outcome,
            Err(e) => Err(DownloadError::Aborted(e.to_string())),
        };

        match outcome {
            Ok(artifact) => {
                let file_name = artifact
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned());
                tracing::info!(job_id = %job_id, artifact = %artifact.display(), "Download ready");
                self.update(&job_id, |r| {
                    r.snapshot.status = JobStatus::Ready;
                    r.snapshot.file_name = file_name;
                    r.artifact = Some(artifact);
                })
                .await;
                self.bus.publish(ProgressMessage::Complete { job_id });
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(job_id = %job_id, error = %message, "Download failed");
                remove_dir_quietly(&job_dir).await;
                self.update(&job_id, |r| {
                    r.snapshot.status = JobStatus::Error;
                    r.snapshot.error = Some(message.clone());
                })
                .await;
                self.bus.publish(ProgressMessage::Error {
                    job_id,
                    error: message,
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Job body
// ---------------------------------------------------------------------------

struct JobRun {
    job_id: JobId,
    remote_path: String,
    job_dir: PathBuf,
    connector: Arc<dyn RemoteConnector>,
    bus: Arc<ProgressBus>,
    archive_timeout: Duration,
}

impl JobRun {
    async fn run(self) -> Result<PathBuf, DownloadError> {
        let store = self.connector.connect().await?;
        let meta = store.stat(&self.remote_path).await?;
        tokio::fs::create_dir_all(&self.job_dir).await?;

        let name = artifact_base_name(&self.remote_path);
        if meta.is_dir() {
            self.download_directory(store.as_ref(), &name).await
        } else {
            self.download_file(store.as_ref(), &name, meta.size).await
        }
    }

    async fn download_file(
        &self,
        store: &dyn RemoteStore,
        name: &str,
        size: u64,
    ) -> Result<PathBuf, DownloadError> {
        let partial = self.job_dir.join(format!("{name}.part"));
        let dest = self.job_dir.join(name);

        let mut progress =
            PhaseProgress::start(&self.bus, &self.job_id, TransferPhase::Retrieving, size);
        staging::copy_remote_file(store, &self.remote_path, &partial, |n| progress.advance(n))
            .await?;
        progress.finish();

        tokio::fs::rename(&partial, &dest).await?;
        Ok(dest)
    }

    async fn download_directory(
        &self,
        store: &dyn RemoteStore,
        name: &str,
    ) -> Result<PathBuf, DownloadError> {
        let tree = staging::enumerate(store, &self.remote_path).await?;
        tracing::debug!(
            job_id = %self.job_id,
            files = tree.files.len(),
            bytes = tree.total_bytes,
            "Staging directory"
        );

        let staging_root = self.job_dir.join("staging");
        let staged = staging_root.join(name);
        let mut progress = PhaseProgress::start(
            &self.bus,
            &self.job_id,
            TransferPhase::Retrieving,
            tree.total_bytes,
        );
        staging::stage_tree(store, &tree, &staged, &mut progress).await?;
        progress.finish();

        let archive = self.job_dir.join(format!("{name}.zip"));
        let partial = self.job_dir.join(format!("{name}.zip.part"));
        let mut progress = PhaseProgress::start(
            &self.bus,
            &self.job_id,
            TransferPhase::Compressing,
            tree.total_bytes,
        );

        let started = Instant::now();
        let deadline = started + self.archive_timeout;
        let source = staged.clone();
        let target = partial.clone();
        tokio::task::spawn_blocking(move || -> Result<(), DownloadError> {
            archive::zip_directory(&source, &target, deadline, started, |n| progress.advance(n))?;
            progress.finish();
            Ok(())
        })
        .await
        .map_err(|e| DownloadError::Aborted(e.to_string()))??;

        tokio::fs::rename(&partial, &archive).await?;
        remove_dir_quietly(&staging_root).await;
        Ok(archive)
    }
}

async fn remove_dir_quietly(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove download directory");
        }
    }
}
