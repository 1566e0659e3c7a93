use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};

pub const DEFAULT_KEY_PREFIX: &str = "backups/";

/// Where one run stages its dump locally and where it lands remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub local_path: PathBuf,
    pub remote_key: String,
}

impl ArtifactName {
    /// Derives the staged file path and object key for a run triggered at `triggered_at`.
    ///
    /// The file name embeds the trigger time at millisecond precision, so two
    /// runs triggered at different milliseconds never share a path or key.
    pub fn derive(staging_dir: &Path, key_prefix: &str, triggered_at: DateTime<Utc>) -> Self {
        let file_name = format!("backup_{}.sql", format_timestamp(triggered_at));
        let remote_key = format!("{}{}", normalize_prefix(key_prefix), file_name);
        Self {
            local_path: staging_dir.join(file_name),
            remote_key,
        }
    }

    pub fn file_name(&self) -> &str {
        self.remote_key
            .rsplit('/')
            .next()
            .unwrap_or(self.remote_key.as_str())
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.ends_with('/') {
        trimmed.to_owned()
    } else {
        format!("{trimmed}/")
    }
}
