use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::{fs, path::Path};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub response: ResponseConfig,
    #[serde(default)]
    pub timestamp: TimestampConfig,
    /// Per-unit overrides; units not listed here use the global settings.
    #[serde(default)]
    pub units: Vec<UnitConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Largest energy a single interval may plausibly carry after a counter reset.
    #[serde(default = "default_max_interval_energy_wh")]
    pub max_interval_energy_wh: f64,
}

fn default_max_interval_energy_wh() -> f64 {
    50_000.0
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_interval_energy_wh: default_max_interval_energy_wh(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseConfig {
    /// JSONPath selecting every point object in the body.
    #[serde(default = "default_values_path")]
    pub values_path: String,
    #[serde(default = "default_time_key")]
    pub time_key: String,
    #[serde(default = "default_value_key")]
    pub value_key: String,
}

fn default_values_path() -> String {
    "$.measureData[*].values[*]".into()
}
fn default_time_key() -> String {
    "time".into()
}
fn default_value_key() -> String {
    "value".into()
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            values_path: default_values_path(),
            time_key: default_time_key(),
            value_key: default_value_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampConfig {
    /// chrono format string for the API's local timestamps. RFC 3339 is always accepted too.
    #[serde(default = "default_ts_format")]
    pub format: String,
    /// Fixed offset such as "+01:00". If absent, the host's local zone is used.
    #[serde(default)]
    pub utc_offset: Option<String>,
}

fn default_ts_format() -> String {
    "%Y-%m-%d %H:%M:%S".into()
}

impl Default for TimestampConfig {
    fn default() -> Self {
        Self {
            format: default_ts_format(),
            utc_offset: None,
        }
    }
}

impl TimestampConfig {
    pub fn offset(&self) -> Result<Option<FixedOffset>, anyhow::Error> {
        match &self.utc_offset {
            Some(raw) => raw
                .parse::<FixedOffset>()
                .map(Some)
                .map_err(|e| anyhow::anyhow!("invalid utc_offset {:?}: {}", raw, e)),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitConfig {
    pub id: String,
    /// Overrides `reconciler.max_interval_energy_wh` for this unit.
    #[serde(default)]
    pub max_interval_energy_wh: Option<f64>,
}

impl Config {
    /// Load YAML from disk, substitute $(VAR)/${VAR} with env vars, then parse.
    /// Afterwards, if MAX_INTERVAL_ENERGY_WH env is set, override the global ceiling.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let raw = fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, anyhow::Error> {
        use anyhow::Context;

        let expanded = expand_env_placeholders(raw)?;
        // An empty document deserializes as null; treat it as all defaults.
        let mut cfg: Self = if expanded.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&expanded)?
        };

        if let Ok(ceiling) = std::env::var("MAX_INTERVAL_ENERGY_WH") {
            cfg.reconciler.max_interval_energy_wh = ceiling
                .trim()
                .parse()
                .with_context(|| format!("MAX_INTERVAL_ENERGY_WH is not a number: {}", ceiling))?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        anyhow::ensure!(
            valid_ceiling(self.reconciler.max_interval_energy_wh),
            "reconciler.max_interval_energy_wh must be a positive number, got {}",
            self.reconciler.max_interval_energy_wh
        );
        anyhow::ensure!(
            !self.response.values_path.is_empty(),
            "response.values_path must not be empty"
        );
        self.timestamp.offset()?;

        let mut seen = HashSet::new();
        for unit in &self.units {
            anyhow::ensure!(!unit.id.is_empty(), "unit id must not be empty");
            anyhow::ensure!(
                seen.insert(unit.id.as_str()),
                "unit '{}' is configured more than once",
                unit.id
            );
            if let Some(ceiling) = unit.max_interval_energy_wh {
                anyhow::ensure!(
                    valid_ceiling(ceiling),
                    "unit '{}' max_interval_energy_wh must be a positive number, got {}",
                    unit.id,
                    ceiling
                );
            }
        }
        Ok(())
    }

    /// Ceiling that applies to `unit`, falling back to the global one.
    pub fn ceiling_for(&self, unit: &str) -> f64 {
        self.units
            .iter()
            .find(|u| u.id == unit)
            .and_then(|u| u.max_interval_energy_wh)
            .unwrap_or(self.reconciler.max_interval_energy_wh)
    }
}

fn valid_ceiling(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

/// Expand $(VAR) and ${VAR} placeholders using environment variables.
/// Notes:
/// - "$.something" (JSONPath) is NOT matched; only "$(" and "${" are.
/// - "$$" becomes a literal "$" (escape).
fn expand_env_placeholders(input: &str) -> Result<String, anyhow::Error> {
    use anyhow::Context;

    let mut out = String::with_capacity(input.len());
    let mut it = input.chars().peekable();

    while let Some(c) = it.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let close = match it.peek().copied() {
            Some('$') => {
                it.next();
                out.push('$');
                continue;
            }
            Some('(') => ')',
            Some('{') => '}',
            _ => {
                out.push('$');
                continue;
            }
        };
        it.next();
        let var = read_until(&mut it, close)
            .with_context(|| format!("unterminated env placeholder: missing '{}'", close))?;
        let val = std::env::var(&var)
            .with_context(|| format!("missing environment variable: {}", var))?;
        out.push_str(&val);
    }

    Ok(out)
}

/// Read characters until we hit `end`, consuming the delimiter.
fn read_until<I>(it: &mut std::iter::Peekable<I>, end: char) -> Option<String>
where
    I: Iterator<Item = char>,
{
    let mut buf = String::new();
    for ch in it.by_ref() {
        if ch == end {
            return Some(buf);
        }
        buf.push(ch);
    }
    None
}
