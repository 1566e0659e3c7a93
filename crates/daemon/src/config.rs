use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use pg_s3_backup_core::DEFAULT_KEY_PREFIX;
use pg_s3_backup_dump::DatabaseConnectionInfo;
use pg_s3_backup_storage::RemoteTarget;
use serde::Deserialize;

use crate::scheduler::{OverlapPolicy, ScheduleSettings};

const DEFAULT_SCHEDULE: &str = "0 0 * * *";
const DEFAULT_DUMP_PROGRAM: &str = "pg_dump";
const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_STAGING_DIR: &str = "/tmp";

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub schedule: ScheduleConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub staging: StagingConfig,
    pub job: JobConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ScheduleConfig {
    pub expression: Option<String>,
    pub overlap: Option<OverlapPolicy>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    /// Path or name of the dump program, looked up on `PATH` when bare.
    pub dump_program: Option<String>,
    /// Fixed arguments placed before the connection flags, e.g.
    /// `dump_program = "docker"` with `["exec", "-i", "pg", "pg_dump"]`.
    pub dump_args: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub key_prefix: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct StagingConfig {
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct JobConfig {
    pub stage_timeout_secs: Option<u64>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading config file {path:?}"))?;
    toml::from_str(&contents).with_context(|| format!("parsing config file {path:?}"))
}

/// Fully resolved, immutable process configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub schedule: ScheduleSettings,
    pub database: DatabaseConnectionInfo,
    pub dump_command: Vec<String>,
    pub remote: RemoteTarget,
    pub staging_dir: PathBuf,
    pub stage_timeout: Option<Duration>,
}

impl Settings {
    pub fn from_env(cfg: &Config) -> Result<Self> {
        Self::resolve(cfg, |key| std::env::var(key).ok())
    }

    /// Merges file values with environment overrides; the environment wins.
    pub fn resolve(cfg: &Config, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let lookup = |key: &str, file: &Option<String>| {
            env(key)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| file.clone().filter(|v| !v.trim().is_empty()))
        };

        let overlap = match env("BACKUP_OVERLAP").filter(|v| !v.trim().is_empty()) {
            Some(raw) => raw.parse().context("parsing BACKUP_OVERLAP")?,
            None => cfg.schedule.overlap.unwrap_or_default(),
        };
        let schedule = ScheduleSettings {
            expression: lookup("BACKUP_SCHEDULE", &cfg.schedule.expression)
                .unwrap_or_else(|| DEFAULT_SCHEDULE.to_owned()),
            overlap,
        };

        let port = match env("POSTGRES_PORT").filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u16>()
                    .with_context(|| format!("invalid POSTGRES_PORT: {raw}"))?,
            ),
            None => cfg.database.port,
        };
        let database = DatabaseConnectionInfo {
            host: lookup("POSTGRES_HOST", &cfg.database.host)
                .unwrap_or_else(|| "localhost".to_owned()),
            port,
            user: lookup("POSTGRES_USER", &cfg.database.user)
                .context("database user must be set (database.user or POSTGRES_USER)")?,
            password: lookup("POSTGRES_PASSWORD", &cfg.database.password),
            name: lookup("POSTGRES_DB", &cfg.database.name)
                .context("database name must be set (database.name or POSTGRES_DB)")?,
        };

        let dump_program = lookup("BACKUP_DUMP_PROGRAM", &cfg.database.dump_program)
            .map(|p| p.trim().to_owned())
            .unwrap_or_else(|| DEFAULT_DUMP_PROGRAM.to_owned());
        let dump_args = match env("BACKUP_DUMP_ARGS") {
            Some(raw) => raw.split_whitespace().map(str::to_owned).collect(),
            None => cfg.database.dump_args.clone().unwrap_or_default(),
        };
        let mut dump_command = vec![dump_program];
        dump_command.extend(dump_args);

        let remote = RemoteTarget {
            bucket: lookup("AWS_BUCKET_NAME", &cfg.storage.bucket)
                .context("storage bucket must be set (storage.bucket or AWS_BUCKET_NAME)")?,
            region: lookup("AWS_REGION", &cfg.storage.region)
                .unwrap_or_else(|| DEFAULT_REGION.to_owned()),
            endpoint: lookup("AWS_ENDPOINT_URL", &cfg.storage.endpoint),
            access_key_id: lookup("AWS_ACCESS_KEY_ID", &cfg.storage.access_key_id),
            secret_access_key: lookup("AWS_SECRET_ACCESS_KEY", &cfg.storage.secret_access_key),
            key_prefix: env("BACKUP_KEY_PREFIX")
                .or_else(|| cfg.storage.key_prefix.clone())
                .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_owned()),
        };

        let staging_dir = env("BACKUP_STAGING_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| cfg.staging.dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STAGING_DIR));

        let stage_timeout_secs = match env("BACKUP_STAGE_TIMEOUT_SECS").filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u64>()
                    .with_context(|| format!("invalid BACKUP_STAGE_TIMEOUT_SECS: {raw}"))?,
            ),
            None => cfg.job.stage_timeout_secs,
        };

        Ok(Self {
            schedule,
            database,
            dump_command,
            remote,
            staging_dir,
            stage_timeout: stage_timeout_secs.filter(|s| *s > 0).map(Duration::from_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const MINIMAL_ENV: &[(&str, &str)] = &[
        ("POSTGRES_USER", "backup"),
        ("POSTGRES_DB", "app"),
        ("AWS_BUCKET_NAME", "db-backups"),
    ];

    #[test]
    fn defaults_fill_optional_fields() {
        let settings = Settings::resolve(&Config::default(), env_of(MINIMAL_ENV)).unwrap();
        assert_eq!(settings.schedule.expression, "0 0 * * *");
        assert_eq!(settings.schedule.overlap, OverlapPolicy::Skip);
        assert_eq!(settings.database.host, "localhost");
        assert_eq!(settings.database.port, None);
        assert_eq!(settings.dump_command, vec!["pg_dump".to_string()]);
        assert_eq!(settings.remote.region, "us-east-1");
        assert_eq!(settings.remote.key_prefix, "backups/");
        assert_eq!(settings.staging_dir, PathBuf::from("/tmp"));
        assert_eq!(settings.stage_timeout, None);
    }

    #[test]
    fn missing_required_fields_fail_startup() {
        let err = Settings::resolve(&Config::default(), env_of(&[])).unwrap_err();
        assert!(err.to_string().contains("database user"));

        let err = Settings::resolve(
            &Config::default(),
            env_of(&[("POSTGRES_USER", "backup"), ("POSTGRES_DB", "app")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("bucket"));
    }

    #[test]
    fn file_values_are_used_and_env_overrides_them() {
        let cfg: Config = toml::from_str(
            r#"
            [schedule]
            expression = "30 2 * * *"
            overlap = "allow"

            [database]
            host = "db.internal"
            port = 5433
            user = "file-user"
            name = "app"
            dump_program = "docker"
            dump_args = ["exec", "-i", "pg", "pg_dump"]

            [storage]
            bucket = "file-bucket"
            endpoint = "http://minio:9000"
            key_prefix = "nightly/"

            [staging]
            dir = "/var/spool/pg-backup"

            [job]
            stage_timeout_secs = 900
            "#,
        )
        .unwrap();

        let settings = Settings::resolve(
            &cfg,
            env_of(&[("POSTGRES_USER", "env-user"), ("AWS_BUCKET_NAME", "env-bucket")]),
        )
        .unwrap();

        assert_eq!(settings.schedule.expression, "30 2 * * *");
        assert_eq!(settings.schedule.overlap, OverlapPolicy::Allow);
        assert_eq!(settings.database.host, "db.internal");
        assert_eq!(settings.database.port, Some(5433));
        assert_eq!(settings.database.user, "env-user");
        assert_eq!(
            settings.dump_command,
            ["docker", "exec", "-i", "pg", "pg_dump"]
        );
        assert_eq!(settings.remote.bucket, "env-bucket");
        assert_eq!(settings.remote.endpoint.as_deref(), Some("http://minio:9000"));
        assert_eq!(settings.remote.key_prefix, "nightly/");
        assert_eq!(settings.staging_dir, PathBuf::from("/var/spool/pg-backup"));
        assert_eq!(settings.stage_timeout, Some(Duration::from_secs(900)));
    }

    #[test]
    fn env_parses_numeric_and_policy_fields() {
        let mut pairs = MINIMAL_ENV.to_vec();
        pairs.extend_from_slice(&[
            ("POSTGRES_PORT", "6543"),
            ("BACKUP_OVERLAP", "allow"),
            ("BACKUP_STAGE_TIMEOUT_SECS", "60"),
            ("BACKUP_DUMP_ARGS", "--format=plain --no-owner"),
        ]);
        let settings = Settings::resolve(&Config::default(), env_of(&pairs)).unwrap();
        assert_eq!(settings.database.port, Some(6543));
        assert_eq!(settings.schedule.overlap, OverlapPolicy::Allow);
        assert_eq!(settings.stage_timeout, Some(Duration::from_secs(60)));
        assert_eq!(
            settings.dump_command,
            ["pg_dump", "--format=plain", "--no-owner"]
        );
    }

    #[test]
    fn dump_program_env_overrides_default_and_file() {
        let mut pairs = MINIMAL_ENV.to_vec();
        pairs.push(("BACKUP_DUMP_PROGRAM", "/opt/pg16/bin/pg_dump"));
        let settings = Settings::resolve(&Config::default(), env_of(&pairs)).unwrap();
        assert_eq!(settings.dump_command, ["/opt/pg16/bin/pg_dump"]);

        let cfg: Config = toml::from_str(
            "[database]\ndump_program = \"/usr/lib/postgresql/15/bin/pg_dump\"\n",
        )
        .unwrap();
        let from_file = Settings::resolve(&cfg, env_of(MINIMAL_ENV)).unwrap();
        assert_eq!(from_file.dump_command, ["/usr/lib/postgresql/15/bin/pg_dump"]);
        let overridden = Settings::resolve(&cfg, env_of(&pairs)).unwrap();
        assert_eq!(overridden.dump_command, ["/opt/pg16/bin/pg_dump"]);
    }

    #[test]
    fn blank_dump_program_falls_back_to_pg_dump() {
        let mut pairs = MINIMAL_ENV.to_vec();
        pairs.push(("BACKUP_DUMP_PROGRAM", "  "));
        let settings = Settings::resolve(&Config::default(), env_of(&pairs)).unwrap();
        assert_eq!(settings.dump_command, ["pg_dump"]);
    }

    #[test]
    fn malformed_env_values_are_rejected() {
        let mut pairs = MINIMAL_ENV.to_vec();
        pairs.push(("POSTGRES_PORT", "not-a-port"));
        assert!(Settings::resolve(&Config::default(), env_of(&pairs)).is_err());

        let mut pairs = MINIMAL_ENV.to_vec();
        pairs.push(("BACKUP_OVERLAP", "queue"));
        assert!(Settings::resolve(&Config::default(), env_of(&pairs)).is_err());
    }

    #[test]
    fn zero_timeout_means_no_deadline() {
        let mut pairs = MINIMAL_ENV.to_vec();
        pairs.push(("BACKUP_STAGE_TIMEOUT_SECS", "0"));
        let settings = Settings::resolve(&Config::default(), env_of(&pairs)).unwrap();
        assert_eq!(settings.stage_timeout, None);
    }

    #[test]
    fn load_config_reads_toml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("backup.toml");
        std::fs::write(&path, "[storage]\nbucket = \"from-file\"\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.storage.bucket.as_deref(), Some("from-file"));

        assert!(load_config(&tmp.path().join("missing.toml")).is_err());
    }
}
