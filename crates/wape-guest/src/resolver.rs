//! Host name resolution through the bridge.

use std::net::IpAddr;

use wape_abi::{ADDRESS_SEPARATOR, ErrorCode};

use crate::error::{NetError, NetResult};
use crate::host::Host;

const INITIAL_CAPACITY: usize = 256;
const MAX_CAPACITY: usize = 64 * 1024;

/// Resolves host names on the host's resolver.
#[derive(Debug, Clone)]
pub struct Resolver<H> {
    host: H,
}

impl<H: Host> Resolver<H> {
    pub fn new(host: H) -> Self {
        Self { host }
    }

    /// Addresses for `name`, in the order the host reported them.
    pub fn lookup_host(&self, name: &str) -> NetResult<Vec<IpAddr>> {
        let mut capacity = INITIAL_CAPACITY;
        loop {
            let mut out = vec![0u8; capacity];
            let n = self.host.lookup_host(name, &mut out);
            if n >= 0 {
                out.truncate(n as usize);
                return parse_addresses(&out);
            }
            if n == ErrorCode::BufferTooSmall.code() && capacity < MAX_CAPACITY {
                capacity *= 2;
                continue;
            }
            return Err(NetError::from_code(n));
        }
    }
}

fn parse_addresses(list: &[u8]) -> NetResult<Vec<IpAddr>> {
    let text =
        std::str::from_utf8(list).map_err(|e| NetError::InvalidResponse(e.to_string()))?;
    text.split(ADDRESS_SEPARATOR)
        .filter(|addr| !addr.is_empty())
        .map(|addr| {
            addr.parse::<IpAddr>()
                .map_err(|_| NetError::InvalidResponse(format!("not an IP address: {addr}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHost;

    #[test]
    fn test_lookup() {
        let host = MockHost::new().with_addresses("93.184.215.14,2606:2800:21f:cb07:6820:80da:af6b:8b2c");
        let addrs = Resolver::new(host).lookup_host("example.com").unwrap();
        assert_eq!(addrs.len(), 2);
        assert!(addrs[0].is_ipv4());
        assert!(addrs[1].is_ipv6());
    }

    #[test]
    fn test_lookup_grows_buffer() {
        let list = vec!["10.0.0.1"; 100].join(",");
        assert!(list.len() > INITIAL_CAPACITY);
        let host = MockHost::new().with_addresses(&list);
        let addrs = Resolver::new(host).lookup_host("many.example").unwrap();
        assert_eq!(addrs.len(), 100);
    }

    #[test]
    fn test_lookup_failure() {
        let err = Resolver::new(MockHost::new())
            .lookup_host("nowhere.invalid")
            .unwrap_err();
        assert_eq!(err, NetError::Host(ErrorCode::ResolveFailed));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_addresses(b"10.0.0.1,banana"),
            Err(NetError::InvalidResponse(_))
        ));
        assert_eq!(parse_addresses(b"").unwrap(), Vec::<IpAddr>::new());
    }
}
