//! SPIFFE-style workload identity for nodes.
//!
//! Node certificates carry a URI SAN of the form
//! `spiffe://<trust-domain>/nodes/<node-id>`. The trust domain scopes the
//! identity to one deployment; the path names the node.

use uuid::Uuid;

/// A parsed SPIFFE node identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiffeId {
    /// Trust domain (the URI authority), e.g. `fleet.example.com`.
    pub trust_domain: String,
    /// Node this identity names.
    pub node_id: Uuid,
}

impl SpiffeId {
    /// Build the identity for a node in the given trust domain.
    pub const fn new(trust_domain: String, node_id: Uuid) -> Self {
        Self {
            trust_domain,
            node_id,
        }
    }

    /// Render as a `spiffe://` URI.
    pub fn uri(&self) -> String {
        format!("spiffe://{}/nodes/{}", self.trust_domain, self.node_id)
    }

    /// Parse a `spiffe://<domain>/nodes/<uuid>` URI.
    ///
    /// Returns `None` for anything that is not a well-formed node identity:
    /// wrong scheme, missing authority, wrong path shape, or a node segment
    /// that is not a UUID.
    pub fn parse(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix("spiffe://")?;
        let (trust_domain, path) = rest.split_once('/')?;
        if trust_domain.is_empty() {
            return None;
        }
        let node_segment = path.strip_prefix("nodes/")?;
        if node_segment.contains('/') {
            return None;
        }
        let node_id = Uuid::parse_str(node_segment).ok()?;
        Some(Self {
            trust_domain: trust_domain.to_string(),
            node_id,
        })
    }
}

impl std::fmt::Display for SpiffeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "spiffe://{}/nodes/{}", self.trust_domain, self.node_id)
    }
}
