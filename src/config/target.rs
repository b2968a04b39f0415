// ABOUTME: Parses the `host:port` connection target.
// ABOUTME: Accepts "host", "host:port", "[v6addr]:port", and bare IPv6 addresses.

use crate::error::{Error, Result};
use std::fmt;

const DEFAULT_PORT: u16 = 22;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidAddress("address cannot be empty".to_string()));
        }

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            // [v6addr] or [v6addr]:port
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| Error::InvalidAddress(format!("missing ']' in {}", s)))?;
            let port = match after {
                "" => DEFAULT_PORT,
                _ => {
                    let port_str = after.strip_prefix(':').ok_or_else(|| {
                        Error::InvalidAddress(format!("unexpected text after ']' in {}", s))
                    })?;
                    parse_port(port_str)?
                }
            };
            (host, port)
        } else if s.matches(':').count() > 1 {
            // Bare IPv6 address, no port
            (s, DEFAULT_PORT)
        } else if let Some((host, port_str)) = s.split_once(':') {
            (host, parse_port(port_str)?)
        } else {
            (s, DEFAULT_PORT)
        };

        if host.is_empty() {
            return Err(Error::InvalidAddress("hostname cannot be empty".to_string()));
        }

        Ok(Target {
            host: host.to_string(),
            port,
        })
    }
}

fn parse_port(port_str: &str) -> Result<u16> {
    port_str
        .parse::<u16>()
        .map_err(|_| Error::InvalidAddress(format!("invalid port: {}", port_str)))
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl std::str::FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
