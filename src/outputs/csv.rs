//! CSV export of news headlines.

use super::json::write_bytes_atomic;
use crate::error::PersistError;
use crate::models::NewsHeadline;
use std::path::{Path, PathBuf};
use tracing::instrument;

pub const NEWS_FILENAME: &str = "google_health_news.csv";

/// Render headlines as CSV with a `Title,Source,Datetime,Link` header row.
pub fn headlines_to_csv(headlines: &[NewsHeadline]) -> Result<Vec<u8>, PersistError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for headline in headlines {
        writer.serialize(headline)?;
    }
    writer
        .into_inner()
        .map_err(|e| PersistError::Csv(e.into_error().into()))
}

/// Write headlines to `{output_dir}/google_health_news.csv`, replacing any previous file.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), count = headlines.len()))]
pub async fn write_headlines(
    headlines: &[NewsHeadline],
    output_dir: &Path,
) -> Result<PathBuf, PersistError> {
    let path = output_dir.join(NEWS_FILENAME);
    let bytes = headlines_to_csv(headlines)?;
    write_bytes_atomic(&bytes, &path).await?;
    Ok(path)
}
