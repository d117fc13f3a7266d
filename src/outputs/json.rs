//! JSON output with atomic replacement.
//!
//! Readers must never observe a half-written dataset, and two writers of the
//! same file must not interleave. Every write therefore goes to a uniquely
//! named temporary file in the target directory, which is then renamed over
//! the target. The last rename wins at whole-document granularity.
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! └── all_outbreaks.json   # crawl run, array of records
//!
//! data_dir/
//! ├── diseases.json        # named datasets, one array each
//! ├── outbreaks.json
//! └── meds.json
//! ```

use crate::error::PersistError;
use crate::models::RawRecord;
use rand::{Rng, rng};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

pub const CRAWL_FILENAME: &str = "all_outbreaks.json";

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> PersistError + '_ {
    move |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub async fn write_json_atomic<T: Serialize + ?Sized>(
    value: &T,
    path: &Path,
) -> Result<(), PersistError> {
    let json = serde_json::to_vec_pretty(value)?;
    write_bytes_atomic(&json, path).await
}

/// Atomically replace `path` with `bytes`. The parent directory is created on
/// first use.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_bytes_atomic(bytes: &[u8], path: &Path) -> Result<(), PersistError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).await.map_err(io_err(dir))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    let suffix: u64 = rng().random();
    let tmp = dir.join(format!(".{file_name}.{}.{suffix:016x}.tmp", std::process::id()));

    if let Err(e) = fs::write(&tmp, bytes).await {
        error!(tmp = %tmp.display(), error = %e, "Failed writing temporary file");
        let _ = fs::remove_file(&tmp).await;
        return Err(io_err(&tmp)(e));
    }
    if let Err(e) = fs::rename(&tmp, path).await {
        error!(error = %e, "Failed to move temporary file into place");
        let _ = fs::remove_file(&tmp).await;
        return Err(io_err(path)(e));
    }

    info!(bytes = bytes.len(), "Wrote file");
    Ok(())
}

/// Write a crawl run's aggregated records to `{output_dir}/all_outbreaks.json`,
/// replacing the previous run.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), count = records.len()))]
pub async fn write_crawl_dataset(
    records: &[RawRecord],
    output_dir: &Path,
) -> Result<PathBuf, PersistError> {
    let path = output_dir.join(CRAWL_FILENAME);
    write_json_atomic(records, &path).await?;
    Ok(path)
}
