use std::env;
use std::path::Path;

use layers::OverlayConfig;
use tracing::info;

/// Load the overlay config from an optional JSON file, then apply
/// `FLOWMAP_*` environment overrides.
pub async fn load_config(path: Option<&Path>) -> Result<OverlayConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => {
            let payload = tokio::fs::read_to_string(path).await?;
            info!(path = %path.display(), "loaded overlay config");
            OverlayConfig::from_json_str(&payload)?
        }
        None => OverlayConfig::default(),
    };
    Ok(apply_env_overrides_from(config, |key| env::var(key).ok()))
}

fn parse_or<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_bool_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

pub fn apply_env_overrides_from(
    mut config: OverlayConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> OverlayConfig {
    config.particle_count = parse_or(&lookup, "FLOWMAP_PARTICLE_COUNT", config.particle_count);
    config.particle_count_min =
        parse_or(&lookup, "FLOWMAP_PARTICLE_COUNT_MIN", config.particle_count_min);
    config.particle_count_max =
        parse_or(&lookup, "FLOWMAP_PARTICLE_COUNT_MAX", config.particle_count_max);
    config.particle_offset = parse_or(&lookup, "FLOWMAP_PARTICLE_OFFSET", config.particle_offset);
    config.particle_base_speed_ms =
        parse_or(&lookup, "FLOWMAP_PARTICLE_BASE_SPEED_MS", config.particle_base_speed_ms);
    config.hidden_service_probability = parse_or(
        &lookup,
        "FLOWMAP_HIDDEN_SERVICE_PROBABILITY",
        config.hidden_service_probability,
    );
    config.country_count = parse_or(&lookup, "FLOWMAP_COUNTRY_COUNT", config.country_count);
    config.outlier_count = parse_or(&lookup, "FLOWMAP_OUTLIER_COUNT", config.outlier_count);
    config.is_mobile = parse_bool_or(&lookup, "FLOWMAP_MOBILE", config.is_mobile);
    config
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use layers::OverlayConfig;
    use pretty_assertions::assert_eq;

    use super::apply_env_overrides_from;

    #[test]
    fn env_overrides_replace_parsed_values_only() {
        let vars: HashMap<&str, &str> = [
            ("FLOWMAP_PARTICLE_COUNT", "2000"),
            ("FLOWMAP_COUNTRY_COUNT", "not-a-number"),
            ("FLOWMAP_MOBILE", "true"),
        ]
        .into_iter()
        .collect();

        let config = apply_env_overrides_from(OverlayConfig::default(), |key| {
            vars.get(key).map(|v| v.to_string())
        });

        assert_eq!(config.particle_count, 2000);
        assert_eq!(config.country_count, OverlayConfig::default().country_count);
        assert!(config.is_mobile);
        assert_eq!(config.particle_counts().default, 500);
    }

    #[test]
    fn no_overrides_keeps_defaults() {
        let config = apply_env_overrides_from(OverlayConfig::default(), |_| None);
        assert_eq!(config, OverlayConfig::default());
    }
}
