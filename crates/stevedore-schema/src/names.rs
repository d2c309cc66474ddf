use crate::ConfigError;

/// Service names double as store keys and container name suffixes.
pub fn validate_service_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name.len() > 64 {
        return Err(ConfigError::InvalidName(
            "service name must be 1-64 characters".to_owned(),
        ));
    }
    if name.starts_with('.') {
        return Err(ConfigError::InvalidName(format!(
            "service name '{name}' must not start with '.'"
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
    {
        return Err(ConfigError::InvalidName(format!(
            "service name '{name}' must match [a-zA-Z0-9._-]"
        )));
    }
    Ok(())
}

pub fn validate_evar_key(key: &str) -> Result<(), ConfigError> {
    if key.is_empty() {
        return Err(ConfigError::InvalidName(
            "environment variable name must not be empty".to_owned(),
        ));
    }
    if !key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Err(ConfigError::InvalidName(format!(
            "environment variable '{key}' must match [A-Za-z0-9_]"
        )));
    }
    Ok(())
}

/// Environment variable prefix owned by a service: dots become underscores
/// and the result is upper-cased, so `data.db` owns `DATA_DB*`.
pub fn evar_prefix(service: &str) -> String {
    service.replace('.', "_").to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_names_accept_dots() {
        assert!(validate_service_name("data.db").is_ok());
        assert!(validate_service_name("web").is_ok());
        assert!(validate_service_name("cache_2-a").is_ok());
    }

    #[test]
    fn service_names_reject_bad_input() {
        assert!(validate_service_name("").is_err());
        assert!(validate_service_name(".hidden").is_err());
        assert!(validate_service_name("a/b").is_err());
        assert!(validate_service_name("has space").is_err());
        assert!(validate_service_name(&"x".repeat(65)).is_err());
    }

    #[test]
    fn evar_keys() {
        assert!(validate_evar_key("DATA_DB_HOST").is_ok());
        assert!(validate_evar_key("").is_err());
        assert!(validate_evar_key("BAD-KEY").is_err());
        assert!(validate_evar_key("A=B").is_err());
    }

    #[test]
    fn prefix_replaces_dots_and_uppercases() {
        assert_eq!(evar_prefix("data.db"), "DATA_DB");
        assert_eq!(evar_prefix("web"), "WEB");
        assert_eq!(evar_prefix("cache.redis.main"), "CACHE_REDIS_MAIN");
    }
}
