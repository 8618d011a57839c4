use anyhow::{anyhow, Context, Result};
use std::fmt;

/// Default EtherNet/IP explicit-messaging port.
pub const DEFAULT_ENIP_PORT: u16 = 44818;

/// Where the controller lives: host, TCP port and backplane slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerEndpoint {
    pub host: String,
    pub port: u16,
    pub slot: u8,
}

impl ControllerEndpoint {
    pub fn new(host: impl Into<String>, port: u16, slot: u8) -> Self {
        Self {
            host: host.into(),
            port,
            slot,
        }
    }

    /// Parse `host`, `host:port` or `[v6]:port`. A missing port uses `default_port`.
    pub fn parse(addr: &str, default_port: u16, slot: u8) -> Result<Self> {
        let addr = addr.trim();
        if addr.is_empty() {
            return Err(anyhow!("controller address is empty"));
        }
        let (host, port) = split_host_port(addr, default_port)?;
        Ok(Self { host, port, slot })
    }
}

impl fmt::Display for ControllerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{} slot {}", self.host, self.port, self.slot)
        } else {
            write!(f, "{}:{} slot {}", self.host, self.port, self.slot)
        }
    }
}

fn split_host_port(addr: &str, default_port: u16) -> Result<(String, u16)> {
    // Handle IPv6 addresses in brackets: [::1]:44818
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid controller address: {}", addr))?;
        let port = match rest.strip_prefix(':') {
            Some(port) => port
                .parse()
                .with_context(|| format!("invalid controller port in {}", addr))?,
            None if rest.is_empty() => default_port,
            None => return Err(anyhow!("invalid controller address: {}", addr)),
        };
        return Ok((host.to_string(), port));
    }

    // A bare IPv6 literal has several colons and no port.
    if addr.matches(':').count() > 1 {
        return Ok((addr.to_string(), default_port));
    }

    match addr.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .with_context(|| format!("invalid controller port in {}", addr))?;
            if host.is_empty() {
                return Err(anyhow!("missing controller host in {}", addr));
            }
            Ok((host.to_string(), port))
        }
        None => Ok((addr.to_string(), default_port)),
    }
}

/// A session with a controller exposing boolean tags.
///
/// Implementations own their socket. The writer calls `close` before every
/// reconnect, so `connect` may assume no session is open.
pub trait ControllerLink: Send {
    fn connect(&mut self, endpoint: &ControllerEndpoint) -> Result<()>;

    fn write_bool(&mut self, tag: &str, value: bool) -> Result<()>;

    /// Best-effort teardown; never fails.
    fn close(&mut self);
}

impl<L: ControllerLink + ?Sized> ControllerLink for Box<L> {
    fn connect(&mut self, endpoint: &ControllerEndpoint) -> Result<()> {
        (**self).connect(endpoint)
    }

    fn write_bool(&mut self, tag: &str, value: bool) -> Result<()> {
        (**self).write_bool(tag, value)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_host_with_default_port() {
        let ep = ControllerEndpoint::parse("192.168.1.6", DEFAULT_ENIP_PORT, 0).unwrap();
        assert_eq!(ep.host, "192.168.1.6");
        assert_eq!(ep.port, 44818);
        assert_eq!(ep.slot, 0);
    }

    #[test]
    fn parses_explicit_port_and_ipv6() {
        let ep = ControllerEndpoint::parse("plc.local:2222", DEFAULT_ENIP_PORT, 3).unwrap();
        assert_eq!((ep.host.as_str(), ep.port, ep.slot), ("plc.local", 2222, 3));

        let ep = ControllerEndpoint::parse("[::1]:44819", DEFAULT_ENIP_PORT, 0).unwrap();
        assert_eq!((ep.host.as_str(), ep.port), ("::1", 44819));

        let ep = ControllerEndpoint::parse("fe80::1", DEFAULT_ENIP_PORT, 0).unwrap();
        assert_eq!((ep.host.as_str(), ep.port), ("fe80::1", 44818));
        assert_eq!(ep.to_string(), "[fe80::1]:44818 slot 0");
    }

    #[test]
    fn rejects_bad_addresses() {
        assert!(ControllerEndpoint::parse("", DEFAULT_ENIP_PORT, 0).is_err());
        assert!(ControllerEndpoint::parse("plc:notaport", DEFAULT_ENIP_PORT, 0).is_err());
        assert!(ControllerEndpoint::parse(":44818", DEFAULT_ENIP_PORT, 0).is_err());
    }
}
