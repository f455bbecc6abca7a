//! JSON job snapshots on disk.

use std::fs;
use std::path::{Path, PathBuf};

use runner_core::types::Job;

#[derive(Debug, thiserror::Error)]
pub enum JobFileError {
    #[error("failed to read job file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse job file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode job {job_id}: {source}")]
    Serialize {
        job_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write job file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub fn load_job(path: impl AsRef<Path>) -> Result<Job, JobFileError> {
    let path_ref = path.as_ref();
    let body = fs::read_to_string(path_ref).map_err(|source| JobFileError::Read {
        path: path_ref.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&body).map_err(|source| JobFileError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })
}

/// Write through a sibling temp file so a crash never leaves a torn snapshot.
pub fn save_job(path: impl AsRef<Path>, job: &Job) -> Result<(), JobFileError> {
    let path_ref = path.as_ref();
    if let Some(parent_dir) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent_dir).map_err(|source| JobFileError::Write {
            path: parent_dir.to_path_buf(),
            source,
        })?;
    }

    let body = serde_json::to_string_pretty(job).map_err(|source| JobFileError::Serialize {
        job_id: job.job_id.to_string(),
        source,
    })?;
    let tmp = path_ref.with_extension("json.tmp");
    fs::write(&tmp, body).map_err(|source| JobFileError::Write {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path_ref).map_err(|source| JobFileError::Write {
        path: path_ref.to_path_buf(),
        source,
    })
}
