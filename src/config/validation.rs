use crate::config::types::{Config, ExtractRule, RendererConfig, Target};
use crate::ConfigError;
use reqwest::header::{HeaderName, HeaderValue};
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_target(&config.target)?;
    if let Some(renderer) = &config.renderer {
        validate_renderer(renderer)?;
    }
    Ok(())
}

/// Validates a scrape target before a session may start
pub fn validate_target(target: &Target) -> Result<(), ConfigError> {
    validate_http_url(&target.url)?;

    if target.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            target.max_pages
        )));
    }

    if target.timeout.is_zero() {
        return Err(ConfigError::Validation(
            "timeout must be greater than zero".to_string(),
        ));
    }

    if target.backoff_cap < target.backoff_base {
        return Err(ConfigError::Validation(format!(
            "backoff_cap ({:?}) must not be smaller than backoff_base ({:?})",
            target.backoff_cap, target.backoff_base
        )));
    }

    if target.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if target.selectors.is_empty() {
        return Err(ConfigError::Validation(
            "at least one selector is required".to_string(),
        ));
    }

    for rule in &target.selectors {
        validate_rule(rule)?;
    }

    if let Some(next) = &target.next_selector {
        validate_selector(next)?;
    }

    if let Some(ready) = &target.ready_selector {
        validate_selector(ready)?;
    }

    for (name, value) in &target.headers {
        HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            ConfigError::Validation(format!("Invalid header name '{}'", name))
        })?;
        HeaderValue::from_str(value).map_err(|_| {
            ConfigError::Validation(format!("Invalid value for header '{}'", name))
        })?;
    }

    Ok(())
}

/// Validates the browser driver configuration
pub fn validate_renderer(renderer: &RendererConfig) -> Result<(), ConfigError> {
    validate_http_url(&renderer.webdriver_url)?;

    if renderer.browser.trim().is_empty() {
        return Err(ConfigError::Validation(
            "renderer browser cannot be empty".to_string(),
        ));
    }

    if renderer.poll_interval.is_zero() {
        return Err(ConfigError::Validation(
            "renderer poll interval must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_http_url(raw: &str) -> Result<(), ConfigError> {
    let url =
        Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(format!("'{}': {}", raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "'{}' must use http or https",
            raw
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!("'{}' has no host", raw)));
    }

    Ok(())
}

fn validate_rule(rule: &ExtractRule) -> Result<(), ConfigError> {
    validate_selector(rule.selector())?;

    if let ExtractRule::Fields { fields, .. } = rule {
        if fields.is_empty() {
            return Err(ConfigError::Validation(format!(
                "rule '{}' declares no fields",
                rule.selector()
            )));
        }
        for (name, spec) in fields {
            if name.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "rule '{}' has an empty field name",
                    rule.selector()
                )));
            }
            let css = spec.split_once('@').map(|(css, _)| css).unwrap_or(spec);
            if !css.trim().is_empty() {
                validate_selector(css)?;
            }
        }
    }

    Ok(())
}

fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use std::time::Duration;

    fn target() -> Target {
        Target::new("https://example.com/items")
    }

    #[test]
    fn test_default_target_is_valid() {
        assert!(validate_target(&target()).is_ok());
    }

    #[test]
    fn test_rejects_bad_urls() {
        let mut t = target();
        t.url = "not a url".to_string();
        assert!(matches!(validate_target(&t), Err(ConfigError::InvalidUrl(_))));

        t.url = "ftp://example.com/file".to_string();
        assert!(matches!(validate_target(&t), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_rejects_out_of_range_limits() {
        let mut t = target();
        t.max_pages = 0;
        assert!(validate_target(&t).is_err());

        let mut t = target();
        t.timeout = Duration::ZERO;
        assert!(validate_target(&t).is_err());

        let mut t = target();
        t.backoff_base = Duration::from_secs(10);
        t.backoff_cap = Duration::from_secs(1);
        assert!(validate_target(&t).is_err());
    }

    #[test]
    fn test_zero_delay_and_retries_allowed() {
        let mut t = target();
        t.delay = Duration::ZERO;
        t.max_retries = 0;
        assert!(validate_target(&t).is_ok());
    }

    #[test]
    fn test_rejects_invalid_selectors() {
        let mut t = target();
        t.selectors = vec![ExtractRule::Selector("div[".to_string())];
        assert!(matches!(
            validate_target(&t),
            Err(ConfigError::InvalidSelector(_))
        ));

        let mut fields = IndexMap::new();
        fields.insert("link".to_string(), "a[@href".to_string());
        t.selectors = vec![ExtractRule::Fields {
            selector: ".card".to_string(),
            fields,
        }];
        assert!(validate_target(&t).is_err());

        t.selectors = vec![];
        assert!(matches!(validate_target(&t), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_attribute_only_field_is_valid() {
        let mut fields = IndexMap::new();
        fields.insert("link".to_string(), "@href".to_string());
        fields.insert("label".to_string(), String::new());
        let mut t = target();
        t.selectors = vec![ExtractRule::Fields {
            selector: "a".to_string(),
            fields,
        }];
        assert!(validate_target(&t).is_ok());
    }

    #[test]
    fn test_rejects_invalid_headers() {
        let mut t = target();
        t.headers
            .insert("Bad Header".to_string(), "value".to_string());
        assert!(validate_target(&t).is_err());
    }

    #[test]
    fn test_validate_renderer() {
        assert!(validate_renderer(&RendererConfig::new("http://localhost:4444")).is_ok());
        assert!(validate_renderer(&RendererConfig::new("localhost")).is_err());

        let mut renderer = RendererConfig::new("http://localhost:4444");
        renderer.poll_interval = Duration::ZERO;
        assert!(validate_renderer(&renderer).is_err());
    }
}
