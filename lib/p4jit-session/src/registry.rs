use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use log::warn;

/// A token a [`crate::DeviceSession`] holds and checks before every
/// operation. Cleared when a later `connect` on the same port steals
/// the connection out from under it.
#[derive(Clone)]
pub struct ConnectionLease {
    alive: Arc<AtomicBool>,
}

impl ConnectionLease {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Process-wide table of which port paths currently have a live
/// session, so that opening the same port twice disconnects the
/// earlier session rather than leaving two handles racing over one
/// serial line.
fn registry() -> &'static Mutex<HashMap<String, Arc<AtomicBool>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Arc<AtomicBool>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Registers a new connection on `port`, invalidating whatever lease
/// was previously registered for that path.
pub fn register(port: &str) -> ConnectionLease {
    let mut table = registry().lock().expect("port registry poisoned");
    if let Some(previous) = table.remove(port) {
        warn!("disconnecting stale session on {port}");
        previous.store(false, Ordering::SeqCst);
    }
    let alive = Arc::new(AtomicBool::new(true));
    table.insert(port.to_string(), alive.clone());
    ConnectionLease { alive }
}

/// Removes `port`'s entry if it is still the one installed by this
/// lease (a later connect may already have replaced it).
pub fn unregister(port: &str, lease: &ConnectionLease) {
    let mut table = registry().lock().expect("port registry poisoned");
    if let Some(current) = table.get(port) {
        if Arc::ptr_eq(current, &lease.alive) {
            table.remove(port);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_register_invalidates_first_lease() {
        let port = "test-port-a";
        let first = register(port);
        assert!(first.is_alive());
        let second = register(port);
        assert!(!first.is_alive());
        assert!(second.is_alive());
        unregister(port, &second);
    }

    #[test]
    fn unregister_only_clears_matching_lease() {
        let port = "test-port-b";
        let first = register(port);
        let second = register(port);
        // `first` was already invalidated by `second`'s register; unregistering
        // it must not disturb the still-current `second` entry.
        unregister(port, &first);
        let third = register(port);
        assert!(!second.is_alive());
        unregister(port, &third);
    }
}
