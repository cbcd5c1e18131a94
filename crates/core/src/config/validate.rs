use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Ravelry page size stays within the platform maximum
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    // Ravelry rejects page sizes above 100.
    if config.scrapers.ravelry.page_size == 0 || config.scrapers.ravelry.page_size > 100 {
        return Err(ConfigError::ValidationError(
            "scrapers.ravelry.page_size must be between 1 and 100".to_string(),
        ));
    }

    Ok(())
}
