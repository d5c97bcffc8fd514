//! Background dead-proxy reaper: every 5 seconds, checks that each known
//! proxy's sandbox still exists, and tears down the ones that don't.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};

use crate::proxy_manager::ProxyManager;
use crate::runtime::ContainerRuntime;

const REAP_INTERVAL: Duration = Duration::from_secs(5);

pub async fn run(runtime: Arc<dyn ContainerRuntime>, proxy_manager: Arc<ProxyManager>) {
    let mut ticker = tokio::time::interval(REAP_INTERVAL);
    loop {
        ticker.tick().await;
        for proxy in proxy_manager.get_proxies() {
            if runtime.inspect_sandbox(&proxy.sandbox_name).await.is_err() {
                proxy_manager.delete_proxy(&proxy.id);
                info!("clean up proxy for {}", proxy.sandbox_name);
                if let Err(err) = runtime.remove_sidecar(&proxy.id).await {
                    error!("failed to remove proxy {}: {err}", proxy.id);
                }
            }
        }
    }
}
