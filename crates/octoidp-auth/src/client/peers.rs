//! Directed trust edges between clients.

use std::collections::HashSet;

use dashmap::DashMap;

/// `client -> {peers it trusts}`.
///
/// Client `R` may put client `X` into the audience of its tokens only if
/// `X` trusts `R`. Edges are resolved when a token is issued; clients never
/// point at each other.
#[derive(Debug, Default)]
pub struct TrustedPeers {
    edges: DashMap<String, HashSet<String>>,
}

impl TrustedPeers {
    /// Creates an empty edge list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the set of peers `client_id` trusts.
    pub fn set(&self, client_id: &str, peers: impl IntoIterator<Item = String>) {
        let peers: HashSet<String> = peers.into_iter().collect();
        if peers.is_empty() {
            self.edges.remove(client_id);
        } else {
            self.edges.insert(client_id.to_string(), peers);
        }
    }

    /// Drops every edge from or to `client_id`.
    pub fn remove_client(&self, client_id: &str) {
        self.edges.remove(client_id);
        for mut peers in self.edges.iter_mut() {
            peers.remove(client_id);
        }
        self.edges.retain(|_, peers| !peers.is_empty());
    }

    /// Returns `true` if `client_id` trusts `peer`.
    #[must_use]
    pub fn trusts(&self, client_id: &str, peer: &str) -> bool {
        self.edges
            .get(client_id)
            .is_some_and(|peers| peers.contains(peer))
    }
}
