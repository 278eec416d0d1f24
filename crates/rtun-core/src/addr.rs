//! Address codec: translates socket addresses to/from the wire answer form.
//!
//! Layout (`spec.md` §4.1): 1-byte family tag (ipv4=1, ipv6=2), 2-byte port
//! (big-endian), then 4 or 16 raw address bytes — 7 or 19 payload bytes in
//! total. The caller prepends the leading error byte when building a
//! `CONN`/`BIND` answer record.

use crate::error::{RtunError, RtunResult};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Wire tag for IPv4 addresses.
pub const AF_IPV4: u8 = 1;
/// Wire tag for IPv6 addresses.
pub const AF_IPV6: u8 = 2;

/// Encode a socket address into its tagged wire form.
///
/// Returns 7 bytes for IPv4 (`1 + 2 + 4`), 19 bytes for IPv6 (`1 + 2 + 16`).
pub fn addr_to_answer(addr: SocketAddr) -> Vec<u8> {
    match addr {
        SocketAddr::V4(v4) => {
            let mut out = Vec::with_capacity(7);
            out.push(AF_IPV4);
            out.extend_from_slice(&v4.port().to_be_bytes());
            out.extend_from_slice(&v4.ip().octets());
            out
        }
        SocketAddr::V6(v6) => {
            let mut out = Vec::with_capacity(19);
            out.push(AF_IPV6);
            out.extend_from_slice(&v6.port().to_be_bytes());
            out.extend_from_slice(&v6.ip().octets());
            out
        }
    }
}

/// Decode a tagged wire address back into a `SocketAddr`.
///
/// Returns the address and the number of bytes consumed from `buf` (7 or
/// 19), so callers parsing a larger record can continue past it.
pub fn answer_to_addr(buf: &[u8]) -> RtunResult<(SocketAddr, usize)> {
    if buf.is_empty() {
        return Err(RtunError::TruncatedAddress { need: 1, have: 0 });
    }
    let family = buf[0];
    let need = match family {
        AF_IPV4 => 7,
        AF_IPV6 => 19,
        other => return Err(RtunError::UnknownAddressFamily(other)),
    };
    if buf.len() < need {
        return Err(RtunError::TruncatedAddress {
            need,
            have: buf.len(),
        });
    }
    let port = u16::from_be_bytes([buf[1], buf[2]]);
    let addr = match family {
        AF_IPV4 => {
            let octets: [u8; 4] = buf[3..7].try_into().unwrap();
            SocketAddr::new(IpAddr::V4(Ipv4Addr::from(octets)), port)
        }
        AF_IPV6 => {
            let octets: [u8; 16] = buf[3..19].try_into().unwrap();
            SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port)
        }
        _ => unreachable!(),
    };
    Ok((addr, need))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_ipv4() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let encoded = addr_to_answer(addr);
        assert_eq!(encoded.len(), 7);
        let (decoded, consumed) = answer_to_addr(&encoded).unwrap();
        assert_eq!(decoded, addr);
        assert_eq!(consumed, 7);
    }

    #[test]
    fn round_trip_ipv6() {
        let addr: SocketAddr = "[::1]:443".parse().unwrap();
        let encoded = addr_to_answer(addr);
        assert_eq!(encoded.len(), 19);
        let (decoded, consumed) = answer_to_addr(&encoded).unwrap();
        assert_eq!(decoded, addr);
        assert_eq!(consumed, 19);
    }

    #[test]
    fn rejects_unknown_family() {
        let buf = [9u8, 0, 0, 0, 0, 0, 0];
        assert!(answer_to_addr(&buf).is_err());
    }

    #[test]
    fn rejects_truncated() {
        let buf = [AF_IPV4, 0, 80, 127, 0];
        assert!(answer_to_addr(&buf).is_err());
    }
}
