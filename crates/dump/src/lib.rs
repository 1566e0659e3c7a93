mod error;
mod pg_dump;

use std::fmt;
use std::path::Path;

pub use error::DumpError;
pub use pg_dump::PgDump;

/// Connection parameters handed to the dump program.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConnectionInfo {
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    pub password: Option<String>,
    pub name: String,
}

impl fmt::Debug for DatabaseConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConnectionInfo")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("name", &self.name)
            .finish()
    }
}

/// Produces a point-in-time dump of the database at `dest`.
///
/// On failure `dest` may or may not exist; callers own its removal.
#[async_trait::async_trait]
pub trait Dumper: Send + Sync {
    async fn dump(&self, dest: &Path) -> Result<(), DumpError>;
}
