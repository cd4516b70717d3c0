//! The organizer proper.

use crate::validate::{validate_project_id, validate_source_name};
use atelier_protocol::{CoreError, CoreResult, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Artifact kind, determined by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Image,
    Video,
    Gif,
}

impl FileKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" | "jpg" | "jpeg" | "webp" | "tiff" => Some(FileKind::Image),
            "mp4" | "avi" | "mov" | "webm" => Some(FileKind::Video),
            "gif" => Some(FileKind::Gif),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Image => "image",
            FileKind::Video => "video",
            FileKind::Gif => "gif",
        }
    }
}

/// One entry in the top-level index, keyed by absolute path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub job_id: String,
    pub project_id: String,
    pub kind: FileKind,
    pub original_name: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub deleted_files: usize,
    pub freed_bytes: u64,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub migrated_files: usize,
    pub skipped_files: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectSummary {
    pub project_id: String,
    pub file_count: usize,
    pub total_bytes: u64,
    pub by_kind: HashMap<String, usize>,
}

/// Sidecar written next to every organized file.
#[derive(Debug, Serialize)]
struct Sidecar<'a> {
    job_id: &'a str,
    project_id: &'a str,
    original_name: &'a str,
    kind: FileKind,
    created_at: DateTime<Utc>,
    generation_params: &'a serde_json::Value,
}

pub struct FileOrganizer {
    /// Organized-output root (`{root}/projects/...`).
    root: PathBuf,
    /// Where the backend writes raw outputs.
    source_dir: PathBuf,
    index: Mutex<HashMap<String, FileRecord>>,
    job_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileOrganizer {
    pub async fn open(root: PathBuf, source_dir: PathBuf) -> CoreResult<Self> {
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| CoreError::internal(format!("cannot create output root: {e}")))?;
        let index = load_index(&root.join("file_metadata.json")).await;
        Ok(Self {
            root,
            source_dir,
            index: Mutex::new(index),
            job_locks: Mutex::new(HashMap::new()),
        })
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("file_metadata.json")
    }

    async fn job_lock(&self, job_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.job_locks.lock().await;
        locks
            .entry(job_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Move backend outputs for one job into the project tree. Returns the
    /// organized absolute paths.
    pub async fn organize_output(
        &self,
        job_id: &JobId,
        project_id: Option<&str>,
        source_files: &[String],
        generation_params: &serde_json::Value,
    ) -> CoreResult<Vec<PathBuf>> {
        let project_id = match project_id {
            Some(id) => {
                validate_project_id(id)?;
                id.to_string()
            }
            None => "general".to_string(),
        };
        for name in source_files {
            validate_source_name(name)?;
        }

        // One mover at a time per job.
        let lock = self.job_lock(job_id.as_str()).await;
        let _guard = lock.lock().await;

        let job_dir = self
            .root
            .join("projects")
            .join(&project_id)
            .join(job_id.as_str());
        tokio::fs::create_dir_all(&job_dir)
            .await
            .map_err(|e| CoreError::internal(format!("cannot create job dir: {e}")))?;

        let mut organized = Vec::new();
        let timestamp = Utc::now();
        let ts = timestamp.format("%Y%m%d_%H%M%S").to_string();

        for (n, name) in source_files.iter().enumerate() {
            let source = self.source_dir.join(name);
            let ext = source
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default();
            let Some(kind) = FileKind::from_extension(&ext) else {
                warn!("Skipping {} - unrecognized extension", name);
                continue;
            };

            let file_name = if n == 0 {
                format!("{}_{}_{}.{}", job_id, ts, kind.as_str(), ext)
            } else {
                format!("{}_{}_{}_{}.{}", job_id, ts, kind.as_str(), n, ext)
            };
            let dest = job_dir.join(&file_name);

            move_file(&source, &dest).await.map_err(|e| {
                CoreError::internal(format!("failed to move {name}: {e}"))
            })?;

            let size_bytes = tokio::fs::metadata(&dest)
                .await
                .map(|m| m.len())
                .unwrap_or(0);

            let sidecar = Sidecar {
                job_id: job_id.as_str(),
                project_id: &project_id,
                original_name: name,
                kind,
                created_at: timestamp,
                generation_params,
            };
            let sidecar_path = job_dir.join(format!("{file_name}.meta.json"));
            let body = serde_json::to_vec_pretty(&sidecar)
                .map_err(|e| CoreError::internal(e.to_string()))?;
            tokio::fs::write(&sidecar_path, body)
                .await
                .map_err(|e| CoreError::internal(format!("sidecar write failed: {e}")))?;

            let record = FileRecord {
                job_id: job_id.as_str().to_string(),
                project_id: project_id.clone(),
                kind,
                original_name: name.clone(),
                size_bytes,
                created_at: timestamp,
            };
            self.index
                .lock()
                .await
                .insert(dest.to_string_lossy().to_string(), record);

            organized.push(dest);
        }

        self.persist_index().await?;
        info!(
            "Organized {} files for job {} into {}",
            organized.len(),
            job_id,
            job_dir.display()
        );
        Ok(organized)
    }

    /// Organized files recorded for one job.
    pub async fn get_job_files(
        &self,
        job_id: &JobId,
        project_id: Option<&str>,
    ) -> Vec<PathBuf> {
        let index = self.index.lock().await;
        let mut files: Vec<PathBuf> = index
            .iter()
            .filter(|(_, record)| {
                record.job_id == job_id.as_str()
                    && project_id.map_or(true, |p| record.project_id == p)
            })
            .map(|(path, _)| PathBuf::from(path))
            .collect();
        files.sort();
        files
    }

    /// Delete organized files older than `days`, then prune empty job and
    /// project directories.
    pub async fn cleanup_old_files(&self, days: i64) -> CleanupReport {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let mut report = CleanupReport::default();

        let stale: Vec<(String, FileRecord)> = {
            let index = self.index.lock().await;
            index
                .iter()
                .filter(|(_, record)| record.created_at < cutoff)
                .map(|(path, record)| (path.clone(), record.clone()))
                .collect()
        };

        for (path, record) in stale {
            let path_buf = PathBuf::from(&path);
            match tokio::fs::remove_file(&path_buf).await {
                Ok(()) => {
                    report.deleted_files += 1;
                    report.freed_bytes += record.size_bytes;
                    let _ = tokio::fs::remove_file(
                        path_buf.with_file_name(format!(
                            "{}.meta.json",
                            path_buf.file_name().unwrap_or_default().to_string_lossy()
                        )),
                    )
                    .await;
                    self.index.lock().await.remove(&path);
                }
                Err(e) => report.errors.push(format!("{path}: {e}")),
            }
        }

        if let Err(e) = self.persist_index().await {
            report.errors.push(e.to_string());
        }
        self.prune_empty_dirs().await;
        report
    }

    /// Sweep loose files out of the backend output directory into
    /// `{root}/legacy/legacy_<ts>_<origname>`.
    pub async fn migrate_legacy_files(&self) -> MigrationReport {
        let mut report = MigrationReport::default();
        let legacy_dir = self.root.join("legacy");
        if tokio::fs::create_dir_all(&legacy_dir).await.is_err() {
            report.errors.push("cannot create legacy dir".to_string());
            return report;
        }

        let mut entries = match tokio::fs::read_dir(&self.source_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                report.errors.push(format!("source dir unreadable: {e}"));
                return report;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !path.is_file() {
                report.skipped_files += 1;
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default();
            if FileKind::from_extension(&ext).is_none() {
                report.skipped_files += 1;
                continue;
            }
            let ts = Utc::now().format("%Y%m%d_%H%M%S");
            let dest = legacy_dir.join(format!("legacy_{ts}_{name}"));
            match move_file(&path, &dest).await {
                Ok(()) => report.migrated_files += 1,
                Err(e) => report.errors.push(format!("{name}: {e}")),
            }
        }
        report
    }

    /// Aggregate the index for one project.
    pub async fn get_project_summary(&self, project_id: &str) -> ProjectSummary {
        let index = self.index.lock().await;
        let mut summary = ProjectSummary {
            project_id: project_id.to_string(),
            ..Default::default()
        };
        for record in index.values().filter(|r| r.project_id == project_id) {
            summary.file_count += 1;
            summary.total_bytes += record.size_bytes;
            *summary
                .by_kind
                .entry(record.kind.as_str().to_string())
                .or_insert(0) += 1;
        }
        summary
    }

    async fn persist_index(&self) -> CoreResult<()> {
        let index = self.index.lock().await;
        let body = serde_json::to_vec_pretty(&*index)
            .map_err(|e| CoreError::internal(e.to_string()))?;
        tokio::fs::write(self.index_path(), body)
            .await
            .map_err(|e| CoreError::internal(format!("index write failed: {e}")))
    }

    async fn prune_empty_dirs(&self) {
        let projects = self.root.join("projects");
        let Ok(mut project_dirs) = tokio::fs::read_dir(&projects).await else {
            return;
        };
        while let Ok(Some(project)) = project_dirs.next_entry().await {
            let project_path = project.path();
            if let Ok(mut job_dirs) = tokio::fs::read_dir(&project_path).await {
                while let Ok(Some(job)) = job_dirs.next_entry().await {
                    let _ = tokio::fs::remove_dir(job.path()).await;
                }
            }
            let _ = tokio::fs::remove_dir(&project_path).await;
        }
    }
}

async fn load_index(path: &Path) -> HashMap<String, FileRecord> {
    match tokio::fs::read(path).await {
        Ok(body) => serde_json::from_slice(&body).unwrap_or_default(),
        Err(_) => HashMap::new(),
    }
}

/// Rename, falling back to copy+remove across filesystems.
async fn move_file(source: &Path, dest: &Path) -> std::io::Result<()> {
    match tokio::fs::rename(source, dest).await {
        Ok(()) => Ok(()),
        Err(_) => {
            tokio::fs::copy(source, dest).await?;
            tokio::fs::remove_file(source).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixture() -> (FileOrganizer, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("comfy_out");
        tokio::fs::create_dir_all(&source).await.unwrap();
        let organizer = FileOrganizer::open(tmp.path().join("organized"), source)
            .await
            .unwrap();
        (organizer, tmp)
    }

    #[tokio::test]
    async fn test_organize_places_file_and_sidecar() {
        let (organizer, tmp) = fixture().await;
        tokio::fs::write(tmp.path().join("comfy_out/gen_00001_.png"), b"fakepng")
            .await
            .unwrap();

        let job_id = JobId::new();
        let organized = organizer
            .organize_output(
                &job_id,
                Some("tower-anime"),
                &["gen_00001_.png".to_string()],
                &serde_json::json!({"steps": 20}),
            )
            .await
            .unwrap();

        assert_eq!(organized.len(), 1);
        let dest = &organized[0];
        assert!(dest.exists());
        assert!(dest
            .to_string_lossy()
            .contains(&format!("projects/tower-anime/{job_id}")));
        let name = dest.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(job_id.as_str()));
        assert!(name.contains("_image"));
        assert!(name.ends_with(".png"));

        let sidecar = dest.parent().unwrap().join(format!("{name}.meta.json"));
        assert!(sidecar.exists());

        // Index carries one new entry.
        let index_body =
            tokio::fs::read_to_string(tmp.path().join("organized/file_metadata.json"))
                .await
                .unwrap();
        let index: HashMap<String, FileRecord> = serde_json::from_str(&index_body).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_project_goes_to_general() {
        let (organizer, tmp) = fixture().await;
        tokio::fs::write(tmp.path().join("comfy_out/clip.mp4"), b"fakemp4")
            .await
            .unwrap();
        let organized = organizer
            .organize_output(
                &JobId::new(),
                None,
                &["clip.mp4".to_string()],
                &serde_json::json!({}),
            )
            .await
            .unwrap();
        assert!(organized[0].to_string_lossy().contains("projects/general/"));
        assert!(organized[0]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains("_video"));
    }

    #[tokio::test]
    async fn test_invalid_project_id_rejected() {
        let (organizer, _tmp) = fixture().await;
        let result = organizer
            .organize_output(
                &JobId::new(),
                Some("p'; DROP TABLE x"),
                &["a.png".to_string()],
                &serde_json::json!({}),
            )
            .await;
        assert!(matches!(result, Err(CoreError::BadInput(_))));
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let (organizer, _tmp) = fixture().await;
        let result = organizer
            .organize_output(
                &JobId::new(),
                Some("ok"),
                &["../../etc/passwd".to_string()],
                &serde_json::json!({}),
            )
            .await;
        assert!(matches!(result, Err(CoreError::BadInput(_))));
    }

    #[tokio::test]
    async fn test_cleanup_removes_old_files() {
        let (organizer, tmp) = fixture().await;
        tokio::fs::write(tmp.path().join("comfy_out/old.png"), b"old")
            .await
            .unwrap();
        let job_id = JobId::new();
        let organized = organizer
            .organize_output(&job_id, Some("p1"), &["old.png".to_string()], &serde_json::json!({}))
            .await
            .unwrap();

        // Backdate the record.
        {
            let mut index = organizer.index.lock().await;
            let key = organized[0].to_string_lossy().to_string();
            index.get_mut(&key).unwrap().created_at = Utc::now() - chrono::Duration::days(10);
        }

        let report = organizer.cleanup_old_files(7).await;
        assert_eq!(report.deleted_files, 1);
        assert!(report.freed_bytes > 0);
        assert!(!organized[0].exists());
        assert!(organizer.get_job_files(&job_id, None).await.is_empty());
    }

    #[tokio::test]
    async fn test_legacy_migration() {
        let (organizer, tmp) = fixture().await;
        tokio::fs::write(tmp.path().join("comfy_out/orphan.png"), b"x")
            .await
            .unwrap();
        tokio::fs::write(tmp.path().join("comfy_out/notes.txt"), b"x")
            .await
            .unwrap();

        let report = organizer.migrate_legacy_files().await;
        assert_eq!(report.migrated_files, 1);
        assert_eq!(report.skipped_files, 1);

        let mut entries = tokio::fs::read_dir(tmp.path().join("organized/legacy"))
            .await
            .unwrap();
        let entry = entries.next_entry().await.unwrap().unwrap();
        let name = entry.file_name().to_string_lossy().to_string();
        assert!(name.starts_with("legacy_"));
        assert!(name.ends_with("_orphan.png"));
    }
}
