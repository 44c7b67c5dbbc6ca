use crate::error::ConfigError;

/// Read an environment variable, treating unset and blank values as absent.
pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value is not valid UTF-8".to_string(),
        }),
    }
}

pub(crate) fn parse_bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    match optional_env(key)? {
        Some(raw) => parse_bool_value(key, &raw),
        None => Ok(default),
    }
}

pub(crate) fn parse_string_env(key: &str, default: String) -> Result<String, ConfigError> {
    Ok(optional_env(key)?.unwrap_or(default))
}

pub(crate) fn parse_u16_env(key: &str, default: u16) -> Result<u16, ConfigError> {
    match optional_env(key)? {
        Some(raw) => parse_u16_value(key, &raw),
        None => Ok(default),
    }
}

/// Env value if set, else the settings value; blank settings values count as unset.
pub(crate) fn parse_optional_env(
    key: &str,
    fallback: Option<String>,
) -> Result<Option<String>, ConfigError> {
    Ok(optional_env(key)?.or_else(|| fallback.filter(|value| !value.trim().is_empty())))
}

fn parse_bool_value(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}

fn parse_u16_value(key: &str, raw: &str) -> Result<u16, ConfigError> {
    raw.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected an integer in 0..=65535, got '{raw}': {e}"),
    })
}

#[cfg(test)]
mod tests {
    use crate::error::ConfigError;

    #[test]
    fn bool_values_accept_common_spellings() {
        for raw in ["1", "TRUE", "yes", "On"] {
            assert!(super::parse_bool_value("K", raw).expect("truthy"));
        }
        for raw in ["0", "false", "NO", "off"] {
            assert!(!super::parse_bool_value("K", raw).expect("falsy"));
        }
    }

    #[test]
    fn bool_value_rejects_garbage_with_key() {
        let err = super::parse_bool_value("GATEWAY_ENABLED", "maybe").expect_err("reject");
        let ConfigError::InvalidValue { key, message } = err else {
            panic!("expected InvalidValue");
        };
        assert_eq!(key, "GATEWAY_ENABLED");
        assert!(message.contains("maybe"), "unexpected message: {message}");
    }

    #[test]
    fn u16_value_rejects_out_of_range() {
        assert_eq!(super::parse_u16_value("PORT", "8080").expect("port"), 8080);
        assert!(super::parse_u16_value("PORT", "70000").is_err());
        assert!(super::parse_u16_value("PORT", "-1").is_err());
    }

    #[test]
    fn unset_variables_fall_back_to_defaults() {
        let key = "INVOICE_RECOVERY_TEST_UNSET_VARIABLE_7F3A";
        assert_eq!(super::optional_env(key).expect("unset"), None);
        assert!(super::parse_bool_env(key, true).expect("default"));
        assert_eq!(super::parse_u16_env(key, 42).expect("default"), 42);
        assert_eq!(
            super::parse_optional_env(key, Some("   ".to_string())).expect("blank"),
            None
        );
    }
}
