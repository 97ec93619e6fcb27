//! Small filesystem helpers shared by packaging and the index

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;

/// Lower-case hex SHA-256 of a file's content
pub fn digest_file(path: &Path) -> io::Result<String> {
  let mut file = File::open(path)?;
  let mut hasher = Sha256::new();
  io::copy(&mut file, &mut hasher)?;
  Ok(format!("{:x}", hasher.finalize()))
}

/// Strip `/<file_name>` (or `file_name`) from the end of a download URL
pub fn base_url(download_url: &str, file_name: &str) -> String {
  let trimmed = download_url.strip_suffix(file_name).unwrap_or(download_url);
  trimmed.trim_end_matches('/').to_string()
}
