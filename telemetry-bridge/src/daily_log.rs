//! Date-stamped append-only record log
//!
//! One file per calendar day, `<root>.<YYYY-MM-DD>.log`. When the date
//! changes the current file is flushed and closed before the next one is
//! opened. Every line is flushed as soon as it is written.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum DailyLogError {
    #[error("failed to open log file '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write log file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

struct OpenLog {
    date: NaiveDate,
    path: PathBuf,
    file: File,
}

pub struct DailyLog {
    root: PathBuf,
    current: Option<OpenLog>,
}

/// `<root>.<YYYY-MM-DD>.log`
pub fn log_file_name(root: &Path, date: NaiveDate) -> PathBuf {
    let mut name = root.as_os_str().to_os_string();
    name.push(format!(".{}.log", date.format("%Y-%m-%d")));
    PathBuf::from(name)
}

impl DailyLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            current: None,
        }
    }

    /// Path of the file currently open, if any.
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|log| log.path.as_path())
    }

    /// Append one line for `date`, rolling the file over if the date moved.
    pub async fn append(&mut self, date: NaiveDate, line: &str) -> Result<(), DailyLogError> {
        if self.current.as_ref().map(|log| log.date) != Some(date) {
            self.close().await?;
            let path = log_file_name(&self.root, date);
            info!("New output file = '{}'", path.display());
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(|source| DailyLogError::Open {
                    path: path.clone(),
                    source,
                })?;
            self.current = Some(OpenLog { date, path, file });
        }

        let Some(log) = self.current.as_mut() else {
            return Ok(());
        };
        let write = async {
            log.file.write_all(line.as_bytes()).await?;
            log.file.write_all(b"\n").await?;
            log.file.flush().await
        };
        write.await.map_err(|source| DailyLogError::Write {
            path: log.path.clone(),
            source,
        })
    }

    /// Flush and close the current file.
    pub async fn close(&mut self) -> Result<(), DailyLogError> {
        if let Some(mut log) = self.current.take() {
            debug!("Closing log file '{}'", log.path.display());
            log.file.flush().await.map_err(|source| DailyLogError::Write {
                path: log.path.clone(),
                source,
            })?;
            log.file.sync_all().await.map_err(|source| DailyLogError::Write {
                path: log.path.clone(),
                source,
            })?;
        }
        Ok(())
    }
}
