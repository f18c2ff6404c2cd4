//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to settings.

use ini::Ini;
use std::str::FromStr;

use super::file::{ConfigFile, ConfigFileError};
use crate::coord::{Rectangle, MAX_LEVEL};
use crate::fetch::DecodeOptions;
use crate::retry::MAX_RETRY_DELAY_SECS;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [provider] section
    if let Some(section) = ini.section(Some("provider")) {
        if let Some(v) = section.get("url") {
            let v = v.trim();
            if v.is_empty() {
                return Err(invalid("provider", "url", v, "must not be empty"));
            }
            config.provider = config.provider.with_url(v);
        }
        if let Some(v) = section.get("file_extension") {
            config.provider = config.provider.with_file_extension(v.trim());
        }
        if let Some(v) = section.get("retina") {
            config.provider = config
                .provider
                .with_retina(parse_bool("provider", "retina", v)?);
        }
        if let Some(v) = section.get("minimum_level") {
            let level = parse_level("provider", "minimum_level", v)?;
            config.provider = config.provider.with_minimum_level(level);
        }
        if let Some(v) = section.get("maximum_level") {
            let v = v.trim();
            let level = if v.is_empty() {
                None
            } else {
                Some(parse_level("provider", "maximum_level", v)?)
            };
            config.provider = config.provider.with_maximum_level(level);
        }
        if let Some(v) = section.get("rectangle") {
            config.provider = config
                .provider
                .with_rectangle(parse_rectangle("provider", "rectangle", v)?);
        }
        if let Some(v) = section.get("credit") {
            config.provider = config.provider.with_credit(v.trim());
        }
    }

    // [scheduler] section
    if let Some(section) = ini.section(Some("scheduler")) {
        let mut scheduler = config.loader.scheduler();
        if let Some(v) = section.get("max_requests") {
            scheduler = scheduler.with_max_requests(parse_positive("scheduler", "max_requests", v)?);
        }
        if let Some(v) = section.get("max_requests_per_server") {
            scheduler = scheduler.with_max_requests_per_server(parse_positive(
                "scheduler",
                "max_requests_per_server",
                v,
            )?);
        }
        config.loader = config.loader.with_scheduler(scheduler);
    }

    // [loader] section
    if let Some(section) = ini.section(Some("loader")) {
        if let Some(v) = section.get("cross_origin") {
            config.loader = config
                .loader
                .with_cross_origin(parse_bool("loader", "cross_origin", v)?);
        }
        if let Some(v) = section.get("flip_y") {
            let flip_y = parse_bool("loader", "flip_y", v)?;
            config.loader = config.loader.with_decode_options(DecodeOptions { flip_y });
        }
    }

    // [retry] section
    if let Some(section) = ini.section(Some("retry")) {
        if let Some(v) = section.get("max_retries") {
            config.retry = config.retry.with_max_retries(parse_number(
                "retry",
                "max_retries",
                v,
                "expected a non-negative integer",
            )?);
        }
        if let Some(v) = section.get("initial_delay_ms") {
            config.retry = config.retry.with_initial_delay_ms(parse_number(
                "retry",
                "initial_delay_ms",
                v,
                "expected milliseconds",
            )?);
        }
        if let Some(v) = section.get("max_delay_secs") {
            let secs: u64 = parse_number("retry", "max_delay_secs", v, "expected seconds")?;
            if secs > MAX_RETRY_DELAY_SECS {
                return Err(invalid(
                    "retry",
                    "max_delay_secs",
                    v,
                    &format!("must be at most {}", MAX_RETRY_DELAY_SECS),
                ));
            }
            config.retry = config.retry.with_max_delay_secs(secs);
        }
        if let Some(v) = section.get("multiplier") {
            let multiplier: f64 = parse_number("retry", "multiplier", v, "expected a number")?;
            if !multiplier.is_finite() || multiplier < 1.0 {
                return Err(invalid("retry", "multiplier", v, "must be at least 1.0"));
            }
            config.retry = config.retry.with_multiplier(multiplier);
        }
    }

    // [http] section
    if let Some(section) = ini.section(Some("http")) {
        if let Some(v) = section.get("timeout_secs") {
            let timeout = parse_positive("http", "timeout_secs", v)?;
            config.http = config.http.with_timeout_secs(timeout as u64);
        }
        if let Some(v) = section.get("user_agent") {
            let v = v.trim();
            if v.is_empty() {
                return Err(invalid("http", "user_agent", v, "must not be empty"));
            }
            config.http = config.http.with_user_agent(v);
        }
        if let Some(v) = section.get("origin") {
            let v = v.trim();
            let origin = (!v.is_empty()).then(|| v.to_string());
            config.http = config.http.with_origin(origin);
        }
    }

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_number<T: FromStr>(
    section: &str,
    key: &str,
    value: &str,
    reason: &str,
) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, reason))
}

fn parse_positive(section: &str, key: &str, value: &str) -> Result<usize, ConfigFileError> {
    match parse_number::<usize>(section, key, value, "expected a positive integer")? {
        0 => Err(invalid(section, key, value, "must be at least 1")),
        n => Ok(n),
    }
}

fn parse_level(section: &str, key: &str, value: &str) -> Result<u32, ConfigFileError> {
    let level: u32 = parse_number(section, key, value, "expected a tile level")?;
    if level > MAX_LEVEL {
        return Err(invalid(
            section,
            key,
            value,
            &format!("must be at most {}", MAX_LEVEL),
        ));
    }
    Ok(level)
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigFileError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(section, key, value, "expected true or false")),
    }
}

/// Parses `west,south,east,north` in degrees.
fn parse_rectangle(section: &str, key: &str, value: &str) -> Result<Rectangle, ConfigFileError> {
    const REASON: &str = "expected west,south,east,north in degrees";

    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid(section, key, value, REASON))?;

    let [west, south, east, north] = parts[..] else {
        return Err(invalid(section, key, value, REASON));
    };

    if !(-180.0..=180.0).contains(&west)
        || !(-180.0..=180.0).contains(&east)
        || !(-90.0..=90.0).contains(&south)
        || !(-90.0..=90.0).contains(&north)
        || west >= east
        || south >= north
    {
        return Err(invalid(section, key, value, REASON));
    }

    Ok(Rectangle::from_degrees(west, south, east, north))
}
