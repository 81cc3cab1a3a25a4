use std::path::Path;

use crate::{Config, LlmProviderType};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        let expanded = crate::env::expand_env(&raw)
            .map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        Self::from_toml(&expanded)
    }

    /// Parse and validate configuration from an already-expanded TOML string
    ///
    /// # Errors
    ///
    /// Returns an error if TOML parsing or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// Runs once at startup; providers trust these invariants per call.
    ///
    /// # Errors
    ///
    /// Returns an error if retry bounds, reasoning budget, or provider
    /// settings are invalid
    pub fn validate(&self) -> anyhow::Result<()> {
        let retry = &self.llm.retry;
        if retry.base_delay_ms == 0 {
            anyhow::bail!("llm.retry.base_delay_ms must be greater than 0");
        }
        if retry.max_delay_ms < retry.base_delay_ms {
            anyhow::bail!("llm.retry.max_delay_ms must be >= base_delay_ms");
        }

        if self.llm.reasoning.enabled && self.llm.reasoning.budget_tokens == 0 {
            anyhow::bail!("llm.reasoning.budget_tokens must be greater than 0 when reasoning is enabled");
        }

        for (name, provider) in &self.llm.providers {
            if let LlmProviderType::Bedrock(bedrock) = &provider.provider_type
                && bedrock.region.trim().is_empty()
            {
                anyhow::bail!("provider '{name}': bedrock region must not be empty");
            }

            if let Some(fallback) = &provider.fallback_model
                && !provider.models.is_empty()
                && !provider.models.contains(fallback)
            {
                anyhow::bail!("provider '{name}': fallback_model '{fallback}' is not in its model list");
            }

            if provider.timeout_secs == Some(0) {
                anyhow::bail!("provider '{name}': timeout_secs must be greater than 0");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses() {
        let config = Config::from_toml(
            r#"
            [llm]
            default_model = "claude-sonnet-4-20250514"

            [llm.providers.anthropic]
            type = "anthropic"
            api_key = "sk-test"
            models = ["claude-sonnet-4-20250514"]
            "#,
        )
        .unwrap();

        assert_eq!(config.llm.default_model.as_deref(), Some("claude-sonnet-4-20250514"));
        assert_eq!(config.llm.providers.len(), 1);
        assert_eq!(config.llm.retry.max_retries, 3);
    }

    #[test]
    fn bedrock_provider_parses() {
        let config = Config::from_toml(
            r#"
            [llm.providers.aws]
            type = { bedrock = { region = "us-east-1", region_prefix = "us" } }
            models = ["anthropic.claude-sonnet-4-20250514-v1:0"]
            "#,
        )
        .unwrap();

        let provider = &config.llm.providers["aws"];
        let LlmProviderType::Bedrock(bedrock) = &provider.provider_type else {
            panic!("expected bedrock provider type");
        };
        assert_eq!(bedrock.region, "us-east-1");
        assert_eq!(bedrock.region_prefix.as_deref(), Some("us"));
    }

    #[test]
    fn empty_bedrock_region_rejected() {
        let err = Config::from_toml(
            r#"
            [llm.providers.aws]
            type = { bedrock = { region = "" } }
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("region"));
    }

    #[test]
    fn fallback_model_must_be_in_catalog() {
        let err = Config::from_toml(
            r#"
            [llm.providers.anthropic]
            type = "anthropic"
            models = ["claude-sonnet-4-20250514"]
            fallback_model = "claude-3-5-haiku-20241022"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("fallback_model"));
    }

    #[test]
    fn fallback_model_allowed_with_discovered_catalog() {
        // An empty model list means the catalog is discovered at startup,
        // so the fallback cannot be checked against it here.
        let config = Config::from_toml(
            r#"
            [llm.providers.anthropic]
            type = "anthropic"
            fallback_model = "claude-3-5-haiku-20241022"
            "#,
        )
        .unwrap();
        assert!(config.llm.providers["anthropic"].models.is_empty());
    }

    #[test]
    fn retry_bounds_validated() {
        let err = Config::from_toml(
            r#"
            [llm.retry]
            max_retries = 3
            base_delay_ms = 1000
            max_delay_ms = 100
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_delay_ms"));
    }

    #[test]
    fn zero_reasoning_budget_rejected_when_enabled() {
        let err = Config::from_toml(
            r#"
            [llm.reasoning]
            enabled = true
            budget_tokens = 0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("budget_tokens"));
    }
}
