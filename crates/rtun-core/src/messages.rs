//! Command codes and payload (de)serialization for the tunnel protocol.
//!
//! These are the structured views over a [`crate::codec::Frame`]'s raw
//! payload bytes; `rtun-server` decodes a `Frame` into one of these before
//! driving the matching tunnel state-machine input.

use crate::addr::{addr_to_answer, answer_to_addr, AF_IPV4, AF_IPV6};
use crate::error::{ErrorCode, RtunError, RtunResult};
use std::net::SocketAddr;

/// Wire command byte. Not pinned by an external controller spec; chosen
/// here and recorded in `DESIGN.md`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Conn = 0x01,
    Bind = 0x02,
    Rconn = 0x03,
    Data = 0x04,
    Close = 0x05,
}

impl Command {
    pub fn from_u8(v: u8) -> RtunResult<Self> {
        match v {
            0x01 => Ok(Self::Conn),
            0x02 => Ok(Self::Bind),
            0x03 => Ok(Self::Rconn),
            0x04 => Ok(Self::Data),
            0x05 => Ok(Self::Close),
            other => Err(RtunError::UnknownCommand(other)),
        }
    }
}

/// A parsed `CONN`/`BIND` request payload: `{af u8, port u16, host string}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub address_family: u8,
    pub port: u16,
    pub host: String,
}

impl OpenRequest {
    pub fn decode(payload: &[u8]) -> RtunResult<Self> {
        if payload.len() < 3 {
            return Err(RtunError::MalformedFrame(
                "open request shorter than af+port header".into(),
            ));
        }
        let address_family = payload[0];
        let port = u16::from_be_bytes([payload[1], payload[2]]);
        let host = String::from_utf8(payload[3..].to_vec())
            .map_err(|e| RtunError::MalformedFrame(format!("host is not utf8: {e}")))?;
        Ok(Self {
            address_family,
            port,
            host,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + self.host.len());
        out.push(self.address_family);
        out.extend_from_slice(&self.port.to_be_bytes());
        out.extend_from_slice(self.host.as_bytes());
        out
    }
}

/// Build a success `CONN`/`BIND` answer payload: `err=0, af, port, addr`.
pub fn encode_open_ok(addr: SocketAddr) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 19);
    out.push(ErrorCode::Success as u8);
    out.extend_from_slice(&addr_to_answer(addr));
    out
}

/// Build a failure `CONN`/`BIND` answer payload: a single error byte.
pub fn encode_open_fail(code: ErrorCode) -> Vec<u8> {
    vec![code as u8]
}

/// Outcome of decoding a `CONN`/`BIND` answer payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenAnswer {
    Ok(SocketAddr),
    Fail(ErrorCode),
}

pub fn decode_open_answer(payload: &[u8]) -> RtunResult<OpenAnswer> {
    if payload.is_empty() {
        return Err(RtunError::MalformedFrame("empty answer payload".into()));
    }
    let code = ErrorCode::from_u8(payload[0])
        .ok_or_else(|| RtunError::MalformedFrame(format!("bad error code {}", payload[0])))?;
    if let ErrorCode::Success = code {
        let (addr, _) = answer_to_addr(&payload[1..])?;
        Ok(OpenAnswer::Ok(addr))
    } else {
        Ok(OpenAnswer::Fail(code))
    }
}

/// Build an `RCONN` notification payload: `{new-id u8, af u8, port u16, addr}`.
pub fn encode_rconn(new_id: u8, client_addr: SocketAddr) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 19);
    out.push(new_id);
    out.extend_from_slice(&addr_to_answer(client_addr));
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconnNotify {
    pub new_id: u8,
    pub client_addr: SocketAddr,
}

pub fn decode_rconn(payload: &[u8]) -> RtunResult<RconnNotify> {
    if payload.is_empty() {
        return Err(RtunError::MalformedFrame("empty rconn payload".into()));
    }
    let new_id = payload[0];
    let (client_addr, _) = answer_to_addr(&payload[1..])?;
    Ok(RconnNotify {
        new_id,
        client_addr,
    })
}

/// Address-family preference requested by a client for an outbound `CONN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfPreference {
    Ipv4,
    Ipv6,
    Any,
}

impl AfPreference {
    /// Decode a request's `af` byte. Any value other than the two wire tags
    /// (the client expressed no preference) falls back to `default`, which
    /// callers should derive from `ServerConfig::af_preference`.
    pub fn from_wire(tag: u8, default: Self) -> Self {
        match tag {
            AF_IPV4 => Self::Ipv4,
            AF_IPV6 => Self::Ipv6,
            _ => default,
        }
    }

    /// Parse the `af_preference` config setting (`"ipv4"`, `"ipv6"`, or
    /// anything else taken as `"any"`).
    pub fn from_config_str(s: &str) -> Self {
        match s {
            "ipv4" => Self::Ipv4,
            "ipv6" => Self::Ipv6,
            _ => Self::Any,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_request_round_trip() {
        let req = OpenRequest {
            address_family: AF_IPV4,
            port: 80,
            host: "127.0.0.1".to_string(),
        };
        let encoded = req.encode();
        let decoded = OpenRequest::decode(&encoded).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn open_answer_round_trip_success() {
        let addr: SocketAddr = "127.0.0.1:80".parse().unwrap();
        let encoded = encode_open_ok(addr);
        assert_eq!(encoded.len(), 8);
        match decode_open_answer(&encoded).unwrap() {
            OpenAnswer::Ok(a) => assert_eq!(a, addr),
            OpenAnswer::Fail(_) => panic!("expected Ok"),
        }
    }

    #[test]
    fn open_answer_round_trip_failure() {
        let encoded = encode_open_fail(ErrorCode::ConnRefused);
        assert_eq!(encoded, vec![3]);
        match decode_open_answer(&encoded).unwrap() {
            OpenAnswer::Fail(ErrorCode::ConnRefused) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn af_preference_falls_back_to_default_on_unset_tag() {
        assert_eq!(
            AfPreference::from_wire(0, AfPreference::Ipv6),
            AfPreference::Ipv6
        );
        assert_eq!(
            AfPreference::from_wire(AF_IPV4, AfPreference::Ipv6),
            AfPreference::Ipv4
        );
    }

    #[test]
    fn af_preference_from_config_str() {
        assert_eq!(AfPreference::from_config_str("ipv4"), AfPreference::Ipv4);
        assert_eq!(AfPreference::from_config_str("ipv6"), AfPreference::Ipv6);
        assert_eq!(AfPreference::from_config_str("any"), AfPreference::Any);
        assert_eq!(AfPreference::from_config_str("bogus"), AfPreference::Any);
    }

    #[test]
    fn rconn_round_trip() {
        let addr: SocketAddr = "10.0.0.5:4444".parse().unwrap();
        let encoded = encode_rconn(0x80, addr);
        let decoded = decode_rconn(&encoded).unwrap();
        assert_eq!(decoded.new_id, 0x80);
        assert_eq!(decoded.client_addr, addr);
    }
}
