//! Proxy parser module for parsing authenticated proxy lines

use crate::proxy::models::{ProxyEndpoint, TransportType};
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Matches a candidate IPv4 address (octet range checked separately)
static IPV4_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d+\.\d+\.\d+\.\d+$").expect("Invalid IPv4 regex")
});

/// Basic DNS hostname shape: alphanumeric edges, dots and dashes inside
static HOSTNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9\-\.]*[a-zA-Z0-9])?$").expect("Invalid hostname regex")
});

/// Reasons a proxy line is rejected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty proxy line")]
    EmptyLine,
    #[error("invalid proxy format (expected host:port:username:password or username:password@host:port): {0}")]
    InvalidFormat(String),
    #[error("invalid credentials format (expected username:password): {0}")]
    InvalidCredentials(String),
    #[error("invalid host:port format: {0}")]
    InvalidHostPort(String),
    #[error("host cannot be empty")]
    EmptyHost,
    #[error("username cannot be empty")]
    EmptyUsername,
    #[error("password cannot be empty")]
    EmptyPassword,
    #[error("port must be numeric, got: {0}")]
    PortNotNumeric(String),
    #[error("port must be between 1-65535, got: {0}")]
    PortOutOfRange(String),
    #[error("invalid IPv4 address: {0}")]
    InvalidIpv4(String),
    #[error("invalid hostname format: {0}")]
    InvalidHostname(String),
}

/// Proxy parser for the two supported batch line formats
pub struct ProxyParser;

impl ProxyParser {
    /// Parse a single proxy line.
    ///
    /// Supports:
    /// - `host:port:username:password`
    /// - `username:password@host:port`
    ///
    /// The transport is always the batch-wide choice, never inferred
    /// from the line.
    pub fn parse_line(line: &str, transport: TransportType) -> std::result::Result<ProxyEndpoint, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::EmptyLine);
        }

        let (host, port_str, username, password) = if line.contains('@') {
            Self::split_auth_at_format(line)?
        } else {
            Self::split_colon_format(line)?
        };

        if host.is_empty() {
            return Err(ParseError::EmptyHost);
        }
        if username.is_empty() {
            return Err(ParseError::EmptyUsername);
        }
        if password.is_empty() {
            return Err(ParseError::EmptyPassword);
        }

        let port = Self::validate_port(port_str)?;
        Self::validate_host(host)?;

        Ok(ProxyEndpoint::new(
            host.to_string(),
            port,
            username.to_string(),
            password.to_string(),
            transport,
            line.to_string(),
        ))
    }

    /// Split `username:password@host:port`
    fn split_auth_at_format(line: &str) -> std::result::Result<(&str, &str, &str, &str), ParseError> {
        let parts: Vec<&str> = line.split('@').collect();
        if parts.len() != 2 {
            return Err(ParseError::InvalidFormat(line.to_string()));
        }
        let (credentials, host_port) = (parts[0], parts[1]);

        let cred_parts: Vec<&str> = credentials.split(':').collect();
        if cred_parts.len() != 2 {
            return Err(ParseError::InvalidCredentials(credentials.to_string()));
        }

        let host_parts: Vec<&str> = host_port.split(':').collect();
        if host_parts.len() != 2 {
            return Err(ParseError::InvalidHostPort(host_port.to_string()));
        }

        Ok((host_parts[0], host_parts[1], cred_parts[0], cred_parts[1]))
    }

    /// Split `host:port:username:password`
    fn split_colon_format(line: &str) -> std::result::Result<(&str, &str, &str, &str), ParseError> {
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() != 4 {
            return Err(ParseError::InvalidFormat(line.to_string()));
        }
        Ok((parts[0], parts[1], parts[2], parts[3]))
    }

    fn validate_port(port_str: &str) -> std::result::Result<u16, ParseError> {
        if port_str.is_empty() || !port_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(ParseError::PortNotNumeric(port_str.to_string()));
        }
        let port: u32 = port_str
            .parse()
            .map_err(|_| ParseError::PortOutOfRange(port_str.to_string()))?;
        if !(1..=65535).contains(&port) {
            return Err(ParseError::PortOutOfRange(port_str.to_string()));
        }
        Ok(port as u16)
    }

    /// Accepts a valid dotted-quad IPv4 address or a DNS-shaped hostname
    fn validate_host(host: &str) -> std::result::Result<(), ParseError> {
        if IPV4_REGEX.is_match(host) {
            for octet in host.split('.') {
                let value: u32 = octet
                    .parse()
                    .map_err(|_| ParseError::InvalidIpv4(host.to_string()))?;
                if value > 255 {
                    return Err(ParseError::InvalidIpv4(host.to_string()));
                }
            }
            return Ok(());
        }
        if HOSTNAME_REGEX.is_match(host) {
            return Ok(());
        }
        Err(ParseError::InvalidHostname(host.to_string()))
    }

    /// Read proxy lines from a list file, skipping empty lines and `#` comments
    pub fn load_lines<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
        let content = fs::read_to_string(path)?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect())
    }
}
