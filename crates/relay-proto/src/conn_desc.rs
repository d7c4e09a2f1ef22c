use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// The transport family named by a [`ConnectionDescription`]'s scheme.
///
/// `Sdp` and `Multicast` round-trip through parsing/rendering so the wire
/// type space stays forward-compatible, but [`TransportKind::is_supported`]
/// is `false` for both — connecting with either is rejected with
/// `ProtocolError` rather than silently misbehaving.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKind {
    Tcp,
    Pipe,
    Event,
    Sdp,
    Multicast,
}

impl TransportKind {
    pub fn is_supported(self) -> bool {
        matches!(self, Self::Tcp | Self::Pipe | Self::Event)
    }

    fn scheme_str(self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Sdp => "SDP",
            Self::Pipe => "PIPE",
            Self::Multicast => "MCIP",
            Self::Event => "RSP",
        }
    }

    fn from_scheme_str(s: &str) -> Option<Self> {
        Some(match s.to_ascii_uppercase().as_str() {
            "TCP" => Self::Tcp,
            "SDP" => Self::Sdp,
            "PIPE" => Self::Pipe,
            "MCIP" => Self::Multicast,
            "RSP" => Self::Event,
            _ => return None,
        })
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme_str())
    }
}

/// `{ scheme, host, port }`, parsed from and rendered to the
/// `scheme://host:port` CLI/config grammar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescription {
    pub scheme: TransportKind,
    pub host: String,
    pub port: u16,
}

impl ConnectionDescription {
    pub fn new(scheme: TransportKind, host: impl Into<String>, port: u16) -> Self {
        Self { scheme, host: host.into(), port }
    }

    pub fn parse(s: &str) -> Result<Self, FrameError> {
        let (scheme_str, rest) =
            s.split_once("://").ok_or_else(|| FrameError::MalformedDescription(s.to_owned()))?;
        let scheme = TransportKind::from_scheme_str(scheme_str)
            .ok_or_else(|| FrameError::UnknownTransport(scheme_str.to_owned()))?;
        let (host, port_str) =
            rest.rsplit_once(':').ok_or_else(|| FrameError::MalformedDescription(s.to_owned()))?;
        let port: u16 =
            port_str.parse().map_err(|_| FrameError::MalformedDescription(s.to_owned()))?;
        Ok(Self { scheme, host: host.to_owned(), port })
    }
}

impl fmt::Display for ConnectionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl std::str::FromStr for ConnectionDescription {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_renders_round_trip() {
        let desc = ConnectionDescription::parse("TCP://127.0.0.1:4000").unwrap();
        assert_eq!(desc, ConnectionDescription::new(TransportKind::Tcp, "127.0.0.1", 4000));
        assert_eq!(desc.to_string(), "TCP://127.0.0.1:4000");
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        assert!(matches!(
            ConnectionDescription::parse("FOO://host:1"),
            Err(FrameError::UnknownTransport(_))
        ));
    }

    #[test]
    fn sdp_and_multicast_parse_but_are_unsupported() {
        let desc = ConnectionDescription::parse("SDP://host:1").unwrap();
        assert!(!desc.scheme.is_supported());
    }
}
