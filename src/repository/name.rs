//! Request name resolution shared by the TFTP and HTTP adapters.
//!
//! iPXE scripts commonly request `<mac>/<file>` so per-host paths can be
//! logged. Only the final path segment selects the binary.

use std::fmt;
use std::str::FromStr;

/// A resolved request name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootName {
    /// Lookup key: the last path segment.
    pub file: String,
    /// Hardware address found in the segment before the file, if any.
    pub mac: Option<MacAddr>,
}

impl BootName {
    /// Resolve a TFTP filename or HTTP path. `None` means nothing can match.
    pub fn parse(requested: &str) -> Option<BootName> {
        let segments: Vec<&str> = requested.split('/').filter(|s| !s.is_empty()).collect();
        let (&file, rest) = segments.split_last()?;
        if file == "." || file == ".." {
            return None;
        }
        let mac = rest.last().and_then(|segment| segment.parse().ok());
        Some(BootName {
            file: file.to_string(),
            mac,
        })
    }
}

/// 48-bit hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid MAC address")]
pub struct ParseMacError;

impl FromStr for MacAddr {
    type Err = ParseMacError;

    /// Accepts six two-digit hex octets separated by `:` or `-`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let separator = if s.contains(':') { ':' } else { '-' };
        let mut octets = [0u8; 6];
        let mut parts = s.split(separator);
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or(ParseMacError)?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(ParseMacError);
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| ParseMacError)?;
        }
        if parts.next().is_some() {
            return Err(ParseMacError);
        }
        Ok(MacAddr(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}
