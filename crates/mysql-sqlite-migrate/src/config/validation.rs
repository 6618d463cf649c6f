//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.database.is_empty() {
        return Err(MigrateError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(MigrateError::Config("source.user is required".into()));
    }
    if config.source.host.is_empty() {
        return Err(MigrateError::Config("source.host is required".into()));
    }
    if config.source.charset.is_empty() {
        return Err(MigrateError::Config("source.charset is required".into()));
    }
    if !config.source.ssl_disabled
        && (config.source.ssl_cert.is_some() != config.source.ssl_key.is_some())
    {
        return Err(MigrateError::Config(
            "source.ssl_cert and source.ssl_key must be given together".into(),
        ));
    }

    // Target validation
    if config.target.sqlite_file.as_os_str().is_empty() {
        return Err(MigrateError::Config("target.sqlite_file is required".into()));
    }

    // Migration validation
    let migration = &config.migration;
    if !migration.include_tables.is_empty() && !migration.exclude_tables.is_empty() {
        return Err(MigrateError::Config(
            "migration.include_tables and migration.exclude_tables are mutually exclusive".into(),
        ));
    }
    if migration.without_tables && migration.without_data {
        return Err(MigrateError::Config(
            "migration.without_tables and migration.without_data together leave nothing to do"
                .into(),
        ));
    }

    Ok(())
}
