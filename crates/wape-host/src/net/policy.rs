//! Dial allow-list.

use std::collections::HashSet;

/// Decides which `(network, address)` pairs a guest may dial.
///
/// Matching is literal string membership. Wildcards only exist through the
/// two allow-all flags, so an empty policy denies everything.
#[derive(Debug, Clone, Default)]
pub struct DialPolicy {
    networks: HashSet<String>,
    all_networks: bool,
    addresses: HashSet<String>,
    all_addresses: bool,
}

impl DialPolicy {
    pub fn new(
        networks: impl IntoIterator<Item = String>,
        all_networks: bool,
        addresses: impl IntoIterator<Item = String>,
        all_addresses: bool,
    ) -> Self {
        Self {
            networks: networks.into_iter().collect(),
            all_networks,
            addresses: addresses.into_iter().collect(),
            all_addresses,
        }
    }

    /// A policy that denies every dial.
    pub fn deny_all() -> Self {
        Self::default()
    }

    /// A policy that allows every dial.
    pub fn allow_all() -> Self {
        Self {
            all_networks: true,
            all_addresses: true,
            ..Self::default()
        }
    }

    pub fn authorize(&self, network: &str, address: &str) -> bool {
        self.network_allowed(network) && self.address_allowed(address)
    }

    pub fn network_allowed(&self, network: &str) -> bool {
        self.all_networks || self.networks.contains(network)
    }

    pub fn address_allowed(&self, address: &str) -> bool {
        self.all_addresses || self.addresses.contains(address)
    }
}
