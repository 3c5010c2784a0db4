//! Per-directive argument validation.
//!
//! Every function receives the full statement, directive name first, and
//! either returns the typed value or fails fast with the [`ConfigError`]
//! naming the offending directive.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use crate::config::{ConfigError, DEFAULT_ADDRESS, DEFAULT_PORT, Redirect};

const PORT_RANGE: std::ops::RangeInclusive<u16> = 80..=65000;

fn name(tokens: &[String]) -> String {
    tokens.first().cloned().unwrap_or_default()
}

fn exact_args(tokens: &[String], count: usize) -> Result<(), ConfigError> {
    if tokens.len() != count + 1 {
        return Err(ConfigError::InvalidNumberArgs(name(tokens)));
    }
    Ok(())
}

fn some_args(tokens: &[String]) -> Result<Vec<String>, ConfigError> {
    if tokens.len() < 2 {
        return Err(ConfigError::InvalidNumberArgs(name(tokens)));
    }
    Ok(tokens[1..].to_vec())
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn bounded(tokens: &[String], min: u64, max: u64) -> Result<u64, ConfigError> {
    exact_args(tokens, 1)?;
    tokens[1]
        .parse::<u64>()
        .ok()
        .filter(|n| (min..=max).contains(n))
        .ok_or_else(|| ConfigError::DirectiveInvalidValue(name(tokens)))
}

fn status_code(field: &str, raw: &str, min: u16, max: u16) -> Result<u16, ConfigError> {
    if !is_digits(raw) {
        return Err(ConfigError::invalid_field(field, raw));
    }
    raw.parse::<u16>()
        .ok()
        .filter(|code| (min..=max).contains(code))
        .ok_or_else(|| ConfigError::invalid_field(field, raw))
}

fn parse_ip(raw: &str) -> Option<Ipv4Addr> {
    let octets: Vec<&str> = raw.split('.').collect();
    if octets.len() != 4 {
        return None;
    }
    let mut out = [0u8; 4];
    for (slot, octet) in out.iter_mut().zip(&octets) {
        if !is_digits(octet) {
            return None;
        }
        *slot = octet.parse::<u8>().ok()?;
    }
    Some(Ipv4Addr::from(out))
}

fn parse_port(raw: &str) -> Option<u16> {
    if !is_digits(raw) {
        return None;
    }
    raw.parse::<u16>().ok().filter(|p| PORT_RANGE.contains(p))
}

pub fn backlog(tokens: &[String]) -> Result<u32, ConfigError> {
    Ok(bounded(tokens, 1, 4096)? as u32)
}

/// `listen` accepts `addr:port`, a bare address or a bare port. The side
/// that is omitted takes its default.
pub fn listen(tokens: &[String]) -> Result<(Ipv4Addr, u16), ConfigError> {
    exact_args(tokens, 1)?;
    let raw = tokens[1].as_str();

    if raw.contains(':') {
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() != 2 {
            return Err(ConfigError::invalid_field("host/port", raw));
        }
        return match (parse_ip(parts[0]), parse_port(parts[1])) {
            (Some(ip), Some(port)) => Ok((ip, port)),
            (None, _) => Err(ConfigError::invalid_field("host", raw)),
            (Some(_), None) => Err(ConfigError::invalid_field("port", raw)),
        };
    }

    match (parse_ip(raw), parse_port(raw)) {
        (Some(ip), None) => Ok((ip, DEFAULT_PORT)),
        (None, Some(port)) => Ok((DEFAULT_ADDRESS, port)),
        _ => Err(ConfigError::invalid_field("host/port", raw)),
    }
}

pub fn server_name(tokens: &[String]) -> Result<Vec<String>, ConfigError> {
    some_args(tokens)
}

pub fn root(tokens: &[String]) -> Result<PathBuf, ConfigError> {
    exact_args(tokens, 1)?;
    let raw = tokens[1].as_str();
    let trimmed = raw.trim_end_matches('/');
    Ok(PathBuf::from(if trimmed.is_empty() { raw } else { trimmed }))
}

pub fn index(tokens: &[String]) -> Result<Vec<String>, ConfigError> {
    some_args(tokens)
}

pub fn error_page(tokens: &[String]) -> Result<(u16, String), ConfigError> {
    exact_args(tokens, 2)?;
    let code = status_code("error_page", &tokens[1], 400, 499)?;
    Ok((code, tokens[2].trim_matches('/').to_string()))
}

pub fn timeout(tokens: &[String]) -> Result<u64, ConfigError> {
    bounded(tokens, 1, 4096)
}

pub fn client_max_body_size(tokens: &[String]) -> Result<u64, ConfigError> {
    bounded(tokens, 1, 1000)
}

/// Shared by `access_log` and `error_log`.
pub fn log_path(tokens: &[String]) -> Result<PathBuf, ConfigError> {
    exact_args(tokens, 1)?;
    Ok(PathBuf::from(&tokens[1]))
}

pub fn autoindex(tokens: &[String]) -> Result<bool, ConfigError> {
    exact_args(tokens, 1)?;
    match tokens[1].as_str() {
        "on" => Ok(true),
        "off" => Ok(false),
        other => Err(ConfigError::invalid_field("autoindex", other)),
    }
}

/// Returns the extension without its leading dot and the interpreter.
pub fn cgi(tokens: &[String]) -> Result<(String, String), ConfigError> {
    exact_args(tokens, 2)?;
    let ext = tokens[1].trim_start_matches('.');
    if ext.is_empty() {
        return Err(ConfigError::invalid_field("cgi", &tokens[1]));
    }
    Ok((ext.to_string(), tokens[2].clone()))
}

pub fn redirect(tokens: &[String]) -> Result<Redirect, ConfigError> {
    exact_args(tokens, 2)?;
    let status = status_code("redirect", &tokens[1], 100, 499)?;
    Ok(Redirect {
        status,
        target: tokens[2].clone(),
    })
}

pub fn limit_except(tokens: &[String]) -> Result<Vec<String>, ConfigError> {
    Ok(some_args(tokens)?
        .into_iter()
        .map(|m| m.to_ascii_uppercase())
        .collect())
}
