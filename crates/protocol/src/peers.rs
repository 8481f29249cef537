//! Node identities and the static peer table

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a worker node
pub type NodeId = u32;

/// Host and port a node listens on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A worker's identity, fixed for the lifetime of the process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub id: NodeId,
    pub address: NodeAddress,
}

impl NodeIdentity {
    pub fn new(id: NodeId, address: NodeAddress) -> Self {
        Self { id, address }
    }
}

/// Every known node except self. Built once at startup and read-only after.
#[derive(Debug, Clone, Default)]
pub struct PeerTable {
    peers: Vec<NodeIdentity>,
}

impl PeerTable {
    /// Build a table from `nodes`, leaving out `self_id`
    pub fn new(self_id: NodeId, nodes: impl IntoIterator<Item = NodeIdentity>) -> Self {
        let peers = nodes.into_iter().filter(|n| n.id != self_id).collect();
        Self { peers }
    }

    /// Pick one peer uniformly at random; `None` when the table is empty
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&NodeIdentity> {
        self.peers.choose(rng)
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeIdentity> {
        self.peers.iter().find(|p| p.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeIdentity> {
        self.peers.iter()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn node(id: NodeId) -> NodeIdentity {
        NodeIdentity::new(id, NodeAddress::new("127.0.0.1", 5000 + id as u16))
    }

    #[test]
    fn test_table_excludes_self() {
        let table = PeerTable::new(2, (1..=3).map(node));
        assert_eq!(table.len(), 2);
        assert!(table.get(2).is_none());
        assert_eq!(table.get(3).unwrap().address.port, 5003);
    }

    #[test]
    fn test_choose_from_empty_table() {
        let table = PeerTable::new(1, vec![node(1)]);
        let mut rng = StdRng::seed_from_u64(7);
        assert!(table.is_empty());
        assert!(table.choose(&mut rng).is_none());
    }

    #[test]
    fn test_choose_covers_all_peers() {
        let table = PeerTable::new(1, (1..=4).map(node));
        let mut rng = StdRng::seed_from_u64(7);

        let seen: HashSet<NodeId> = (0..200)
            .filter_map(|_| table.choose(&mut rng).map(|p| p.id))
            .collect();

        assert_eq!(seen, HashSet::from([2, 3, 4]));
    }

    #[test]
    fn test_address_display() {
        assert_eq!(NodeAddress::new("localhost", 9000).to_string(), "localhost:9000");
    }
}
