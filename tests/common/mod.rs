//! Shared utilities for integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use ntp_pool::pool::{ManagerSettings, PoolManager, ServerDescriptor};
use ntp_pool::probe::{ProbeError, ProbeSample, TimeProbe};

/// Scripted behavior of one host.
#[derive(Default)]
struct HostScript {
    down: AtomicBool,
    hang: AtomicBool,
    calls: AtomicUsize,
}

/// A `TimeProbe` whose answers are controlled by the test.
///
/// Unknown hosts succeed with a 10ms response time.
#[derive(Default)]
pub struct ScriptedProbe {
    hosts: Mutex<HashMap<String, Arc<HostScript>>>,
}

#[allow(dead_code)]
impl ScriptedProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn host(&self, host: &str) -> Arc<HostScript> {
        let mut hosts = self.hosts.lock().unwrap();
        hosts.entry(host.to_string()).or_default().clone()
    }

    pub fn set_down(&self, host: &str, down: bool) {
        self.host(host).down.store(down, Ordering::SeqCst);
    }

    /// Make probes to `host` never answer (until the caller's timeout).
    pub fn set_hang(&self, host: &str, hang: bool) {
        self.host(host).hang.store(hang, Ordering::SeqCst);
    }

    pub fn calls(&self, host: &str) -> usize {
        self.host(host).calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TimeProbe for ScriptedProbe {
    async fn probe(&self, host: &str, _port: u16, timeout: Duration) -> Result<ProbeSample, ProbeError> {
        let script = self.host(host);
        script.calls.fetch_add(1, Ordering::SeqCst);

        if script.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(timeout * 10).await;
            return Err(ProbeError::Timeout(timeout));
        }
        if script.down.load(Ordering::SeqCst) {
            return Err(ProbeError::Refused("kiss code DENY".into()));
        }
        Ok(ProbeSample {
            response_time: Duration::from_millis(10),
            offset: 0.0005,
            delay: 0.010,
            stratum: 2,
        })
    }
}

/// A manager with servers `a`, `b`, `c`, ... registered as ids 1..=n.
#[allow(dead_code)]
pub fn manager_with_servers(probe: Arc<ScriptedProbe>, n: u64, settings: ManagerSettings) -> Arc<PoolManager> {
    let manager = PoolManager::new(probe, settings);
    for i in 1..=n {
        manager.register_server(ServerDescriptor::new(i, host_name(i)));
    }
    Arc::new(manager)
}

/// Host name used for server `id` (1 → "a", 2 → "b", ...).
pub fn host_name(id: u64) -> String {
    char::from(b'a' + (id as u8 - 1)).to_string()
}
