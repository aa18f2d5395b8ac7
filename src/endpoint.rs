use std::fmt;
use std::net::SocketAddr;

/// Identifies a single gateway server: an address plus a generation number.
///
/// The generation distinguishes successive incarnations of a gateway that
/// happens to be re-bound to the same address (a restarted process, a
/// container rescheduled onto the same port). Two endpoints are equal iff
/// every field matches.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Endpoint {
    addr: SocketAddr,
    generation: u32,
}

impl Endpoint {
    pub fn new(addr: SocketAddr, generation: u32) -> Self {
        Endpoint { addr, generation }
    }

    /// Construct an endpoint at generation zero, for callers that don't
    /// track epochs themselves.
    pub fn from_addr(addr: SocketAddr) -> Self {
        Endpoint::new(addr, 0)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// The URI a `GatewayManager` knows this endpoint by.
    pub fn as_gateway_uri(&self) -> String {
        format!("gateway://{}#{}", self.addr, self.generation)
    }

    /// Inverse of `as_gateway_uri`; `None` if `uri` isn't one of ours.
    pub fn from_gateway_uri(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix("gateway://")?;
        let (addr, generation) = rest.rsplit_once('#')?;
        Some(Endpoint::new(addr.parse().ok()?, generation.parse().ok()?))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", self.addr, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_requires_matching_generation() {
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let a = Endpoint::new(addr, 0);
        let b = Endpoint::new(addr, 1);
        assert_ne!(a, b);
        assert_eq!(a, Endpoint::new(addr, 0));
    }

    #[test]
    fn display_includes_generation() {
        let addr: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        let e = Endpoint::new(addr, 7);
        assert_eq!(format!("{}", e), "10.0.0.1:9000#7");
    }

    #[test]
    fn gateway_uri_round_trips() {
        let addr: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        let e = Endpoint::new(addr, 3);
        let uri = e.as_gateway_uri();
        assert_eq!(Endpoint::from_gateway_uri(&uri), Some(e));
    }

    #[test]
    fn non_gateway_uri_does_not_parse() {
        assert_eq!(Endpoint::from_gateway_uri("http://10.0.0.1:9000"), None);
    }
}
