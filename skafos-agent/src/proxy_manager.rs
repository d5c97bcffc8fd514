//! Tracks the sidecar proxy containers this agent has set up, keyed by
//! container id.

use std::collections::BTreeMap;

use parking_lot::RwLock;

#[derive(Debug, Clone)]
pub struct ProxyContainer {
    pub id: String,
    pub ip: String,
    pub sandbox_name: String,
}

#[derive(Default)]
pub struct ProxyManager {
    proxies: RwLock<BTreeMap<String, ProxyContainer>>,
}

impl ProxyManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_proxy(&self, proxy: ProxyContainer) {
        self.proxies.write().insert(proxy.id.clone(), proxy);
    }

    pub fn delete_proxy(&self, id: &str) {
        self.proxies.write().remove(id);
    }

    pub fn get_proxies(&self) -> Vec<ProxyContainer> {
        self.proxies.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_delete_round_trips() {
        let manager = ProxyManager::new();
        manager.set_proxy(ProxyContainer { id: "c1".into(), ip: "10.1.1.1".into(), sandbox_name: "pod-0_pause".into() });
        assert_eq!(manager.get_proxies().len(), 1);
        manager.delete_proxy("c1");
        assert!(manager.get_proxies().is_empty());
    }
}
