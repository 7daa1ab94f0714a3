//! Reading and writing the on-disk history image.
//!
//! The image is a single JSON document `{ "records": [...], "nextSequence": n }`.
//! Writes go to a sibling `.tmp` file which is then renamed over the target,
//! so readers never observe a half-written image.

use std::{
  ffi::OsString,
  io::ErrorKind,
  path::{Path, PathBuf},
};

use talkbox_core::history::HistoryImage;

use crate::Result;

/// Path of the scratch file used while writing `path`.
pub fn tmp_path(path: &Path) -> PathBuf {
  let mut name = path
    .file_name()
    .map(OsString::from)
    .unwrap_or_else(|| OsString::from("history"));
  name.push(".tmp");
  path.with_file_name(name)
}

/// Load the image at `path`. A missing file is `Ok(None)`.
pub async fn read_image(path: &Path) -> Result<Option<HistoryImage>> {
  let bytes = match tokio::fs::read(path).await {
    Ok(bytes) => bytes,
    Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
    Err(e) => return Err(e.into()),
  };
  Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Replace the image at `path` with `image`.
pub async fn write_image(path: &Path, image: &HistoryImage) -> Result<()> {
  let bytes = serde_json::to_vec(image)?;

  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    tokio::fs::create_dir_all(parent).await?;
  }

  let tmp = tmp_path(path);
  tokio::fs::write(&tmp, &bytes).await?;
  tokio::fs::rename(&tmp, path).await?;
  Ok(())
}
