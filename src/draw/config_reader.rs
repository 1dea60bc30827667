use crate::draw::*;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Spin settings as written in a JSON file. Missing keys keep their default value.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpinSettings {
    #[serde(rename = "fastDelayMs")]
    pub fast_delay_ms: Option<f64>,
    #[serde(rename = "slowDelayMs")]
    pub slow_delay_ms: Option<f64>,
    #[serde(rename = "growthFactor")]
    pub growth_factor: Option<f64>,
    #[serde(rename = "fastRounds")]
    pub fast_rounds: Option<u32>,
    #[serde(rename = "rolloutFactor")]
    pub rollout_factor: Option<f64>,
    #[serde(rename = "blinkCount")]
    pub blink_count: Option<u32>,
    #[serde(rename = "blinkDelayMs")]
    pub blink_delay_ms: Option<f64>,
}

pub fn read_spin_settings(path: &Path) -> DrawResult<SpinSettings> {
    let p = path.display().to_string();
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path: p.clone() })?;
    debug!("read_spin_settings: {:?}", contents);
    let settings: SpinSettings =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path: p })?;
    Ok(settings)
}

// Upper bounds keep the path and the reveal to a watchable length.
const MAX_FAST_ROUNDS: u32 = 20;
const MAX_ROLLOUT_FACTOR: f64 = 20.0;
const MAX_BLINK_COUNT: u32 = 20;

fn finite(name: &str, x: Option<f64>, default: f64) -> DrawResult<f64> {
    match x {
        Some(v) if !v.is_finite() => InvalidSettingSnafu {
            name: name.to_string(),
            value: v,
        }
        .fail(),
        Some(v) => Ok(v),
        None => Ok(default),
    }
}

/// Turns the raw settings into a usable configuration, clamping every value
/// into the range the animation can handle.
pub fn validate_spin_settings(settings: &SpinSettings) -> DrawResult<SpinConfig> {
    let d = SpinConfig::DEFAULT;
    let fast = finite(
        "fastDelayMs",
        settings.fast_delay_ms,
        d.fast_delay_ms as f64,
    )?
    .max(5.0) as u64;
    let slow = (finite(
        "slowDelayMs",
        settings.slow_delay_ms,
        d.slow_delay_ms as f64,
    )?
    .max(0.0) as u64)
        .max(fast);
    let growth = finite("growthFactor", settings.growth_factor, d.growth_factor)?.max(1.01);
    let rollout = finite("rolloutFactor", settings.rollout_factor, d.rollout_factor)?
        .clamp(0.0, MAX_ROLLOUT_FACTOR);
    let blink_delay = finite(
        "blinkDelayMs",
        settings.blink_delay_ms,
        d.blink_delay_ms as f64,
    )?
    .max(20.0) as u64;

    let config = SpinConfig {
        fast_delay_ms: fast,
        slow_delay_ms: slow,
        growth_factor: growth,
        fast_rounds: settings
            .fast_rounds
            .unwrap_or(d.fast_rounds)
            .min(MAX_FAST_ROUNDS),
        rollout_factor: rollout,
        blink_count: settings
            .blink_count
            .unwrap_or(d.blink_count)
            .min(MAX_BLINK_COUNT),
        blink_delay_ms: blink_delay,
        ..d
    };
    debug!("validate_spin_settings: {:?}", config);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_settings_give_defaults() {
        let config = validate_spin_settings(&SpinSettings::default()).unwrap();
        assert_eq!(config, SpinConfig::DEFAULT);
    }

    #[test]
    fn settings_are_clamped() {
        let js = r#"{"fastDelayMs": 1, "slowDelayMs": 2.5, "growthFactor": 0.5,
                     "rolloutFactor": -3, "blinkCount": 0, "blinkDelayMs": 3}"#;
        let settings: SpinSettings = serde_json::from_str(js).unwrap();
        let config = validate_spin_settings(&settings).unwrap();
        assert_eq!(config.fast_delay_ms, 5);
        assert_eq!(config.slow_delay_ms, 5);
        assert_eq!(config.growth_factor, 1.01);
        assert_eq!(config.rollout_factor, 0.0);
        assert_eq!(config.blink_count, 0);
        assert_eq!(config.blink_delay_ms, 20);
        assert_eq!(config.fast_rounds, SpinConfig::DEFAULT.fast_rounds);
        assert_eq!(config.next_pick_delay_ms, SpinConfig::DEFAULT.next_pick_delay_ms);
    }

    #[test]
    fn large_values_are_capped() {
        let js = r#"{"fastRounds": 4000000000, "rolloutFactor": 1e300, "blinkCount": 3000000000}"#;
        let settings: SpinSettings = serde_json::from_str(js).unwrap();
        let config = validate_spin_settings(&settings).unwrap();
        assert_eq!(config.fast_rounds, 20);
        assert_eq!(config.rollout_factor, 20.0);
        assert_eq!(config.blink_count, 20);
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let settings = SpinSettings {
            growth_factor: Some(f64::INFINITY),
            ..SpinSettings::default()
        };
        assert!(matches!(
            validate_spin_settings(&settings),
            Err(DrawError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn settings_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spin.json");
        fs::write(&path, r#"{"fastRounds": 1, "blinkCount": 2}"#).unwrap();
        let settings = read_spin_settings(&path).unwrap();
        assert_eq!(settings.fast_rounds, Some(1));
        assert_eq!(settings.blink_count, Some(2));

        fs::write(&path, r#"{"fastRounds": -1}"#).unwrap();
        assert!(matches!(
            read_spin_settings(&path),
            Err(DrawError::ParsingJson { .. })
        ));
    }
}
