//! Connection registry: the authoritative "who is online where".
//!
//! Keeps a forward map (connection → identity) and a backward map
//! (identity → connection) under one readers-writer lock. Both maps change
//! only inside a single write critical section, so for every live entry
//! `forward[c] == k ⇔ backward[k] == c`, and at most one connection is
//! registered per identity key.

use crate::connection::Connection;
use crate::policy::LoginPolicy;
use msgate_core::IdentityKey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Default)]
struct Maps {
    forward: HashMap<u64, IdentityKey>,
    backward: HashMap<IdentityKey, Arc<Connection>>,
}

impl Maps {
    fn remove_key(&mut self, key: &IdentityKey) -> Option<Arc<Connection>> {
        let conn = self.backward.remove(key)?;
        self.forward.remove(&conn.id());
        Some(conn)
    }
}

/// Registry of live connections, keyed both ways.
pub struct ConnectionRegistry {
    maps: RwLock<Maps>,
    policy: LoginPolicy,
    online: AtomicUsize,
}

impl ConnectionRegistry {
    pub fn new(policy: LoginPolicy) -> Self {
        Self {
            maps: RwLock::new(Maps::default()),
            policy,
            online: AtomicUsize::new(0),
        }
    }

    /// Register `conn` under its identity key.
    ///
    /// The login policy runs inside the same critical section as the
    /// insertion: any session it evicts is kicked, closed, and removed before
    /// `conn` becomes visible to lookups. Returns the evicted connections.
    pub async fn register(&self, conn: Arc<Connection>) -> Vec<Arc<Connection>> {
        let key = conn.key().clone();
        let mut maps = self.maps.write().await;

        let mut evicted = Vec::new();
        for victim_key in self.policy.evictions(&key, |k| maps.backward.contains_key(k)) {
            if let Some(old) = maps.remove_key(&victim_key) {
                self.policy.evict(&old, conn.token()).await;
                evicted.push(old);
            }
        }

        // Only reachable when the policy does not evict on a key collision.
        if let Some(replaced) = maps.remove_key(&key) {
            warn!(
                user_id = %key.user_id,
                platform = %key.platform,
                replaced_conn = replaced.id(),
                "identity key collision, replacing connection without eviction"
            );
        }

        maps.forward.insert(conn.id(), key.clone());
        maps.backward.insert(key.clone(), conn.clone());
        self.online.store(maps.backward.len(), Ordering::Release);

        info!(
            user_id = %key.user_id,
            platform = %key.platform,
            conn_id = conn.id(),
            remote = %conn.remote_addr(),
            online = maps.backward.len(),
            "connection registered"
        );

        evicted
    }

    /// Remove `conn` from both maps. Unknown or already-removed connections
    /// are a no-op. Returns whether anything was removed.
    pub async fn unregister(&self, conn: &Connection) -> bool {
        let mut maps = self.maps.write().await;
        let Some(key) = maps.forward.remove(&conn.id()) else {
            return false;
        };
        let removed = maps.backward.remove(&key);
        debug_assert!(
            removed.as_ref().map(|c| c.id()) == Some(conn.id()),
            "registry maps out of sync for {key}"
        );
        self.online.store(maps.backward.len(), Ordering::Release);

        debug!(
            user_id = %key.user_id,
            platform = %key.platform,
            conn_id = conn.id(),
            online = maps.backward.len(),
            "connection unregistered"
        );
        true
    }

    pub async fn lookup_by_key(&self, key: &IdentityKey) -> Option<Arc<Connection>> {
        self.maps.read().await.backward.get(key).cloned()
    }

    pub async fn lookup_key_by_connection(&self, conn: &Connection) -> Option<IdentityKey> {
        self.maps.read().await.forward.get(&conn.id()).cloned()
    }

    /// Number of registered connections. Lock-free; may lag a concurrent
    /// mutation.
    pub fn online_count(&self) -> usize {
        self.online.load(Ordering::Acquire)
    }

    /// Remove every entry, returning the connections for the caller to close.
    pub async fn drain(&self) -> Vec<Arc<Connection>> {
        let mut maps = self.maps.write().await;
        maps.forward.clear();
        self.online.store(0, Ordering::Release);
        maps.backward.drain().map(|(_, conn)| conn).collect()
    }

    #[cfg(test)]
    pub(crate) async fn is_consistent(&self) -> bool {
        let maps = self.maps.read().await;
        maps.forward.len() == maps.backward.len()
            && maps.forward.iter().all(|(id, key)| {
                maps.backward.get(key).map(|c| c.id()) == Some(*id)
            })
            && maps.backward.iter().all(|(key, conn)| {
                conn.key() == key && maps.forward.get(&conn.id()) == Some(key)
            })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::auth::store::testing::UnavailableTokenStore;
    use crate::connection::testing::mock_connection;
    use crate::policy::MultiLoginMode;
    use msgate_core::{decode_envelope, Platform, ReqIdentifier};
    use proptest::prelude::*;

    fn key(user: &str, platform: Platform) -> IdentityKey {
        IdentityKey::new(user, platform)
    }

    #[tokio::test]
    async fn register_and_lookup_both_ways() {
        let reg = registry(MultiLoginMode::KickSamePlatform);
        let (c, _) = mock_connection(key("u1", Platform::Web), "t1");
        assert!(reg.register(c.clone()).await.is_empty());

        let found = reg.lookup_by_key(&key("u1", Platform::Web)).await.unwrap();
        assert_eq!(found.id(), c.id());
        assert_eq!(reg.lookup_key_by_connection(&c).await, Some(key("u1", Platform::Web)));
        assert!(reg.lookup_by_key(&key("u1", Platform::Ios)).await.is_none());
        assert_eq!(reg.online_count(), 1);
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let reg = registry(MultiLoginMode::KickSamePlatform);
        let (c, _) = mock_connection(key("u1", Platform::Web), "t1");
        let (stranger, _) = mock_connection(key("u9", Platform::Web), "t9");
        reg.register(c.clone()).await;

        assert!(reg.unregister(&c).await);
        assert!(!reg.unregister(&c).await);
        assert!(!reg.unregister(&stranger).await);
        assert!(reg.lookup_by_key(c.key()).await.is_none());
        assert_eq!(reg.online_count(), 0);
        assert!(reg.is_consistent().await);
    }

    #[tokio::test]
    async fn same_platform_login_kicks_previous_session() {
        let reg = registry(MultiLoginMode::KickSamePlatform);
        let (c1, log1) = mock_connection(key("u1", Platform::Web), "t1");
        let (c2, log2) = mock_connection(key("u1", Platform::Web), "t2");
        reg.register(c1.clone()).await;

        let evicted = reg.register(c2.clone()).await;
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id(), c1.id());

        let kick = decode_envelope(&log1.frames()[0].1).unwrap();
        assert_eq!(kick.req_identifier, ReqIdentifier::KickOnline);
        assert_eq!(kick.err_code, 702);
        assert!(c1.is_closed());
        assert!(log2.frames().is_empty());

        let current = reg.lookup_by_key(&key("u1", Platform::Web)).await.unwrap();
        assert_eq!(current.id(), c2.id());
        assert!(reg.lookup_key_by_connection(&c1).await.is_none());

        // The kicked connection's read loop unregisters it afterwards; that
        // must not disturb the replacement.
        assert!(!reg.unregister(&c1).await);
        assert!(reg.lookup_by_key(&key("u1", Platform::Web)).await.is_some());
        assert!(reg.is_consistent().await);
    }

    #[tokio::test]
    async fn other_platforms_are_untouched_by_same_platform_kick() {
        let reg = registry(MultiLoginMode::KickSamePlatform);
        let (ios, _) = mock_connection(key("u1", Platform::Ios), "ti");
        let (web, _) = mock_connection(key("u1", Platform::Web), "tw");
        reg.register(ios.clone()).await;
        assert!(reg.register(web).await.is_empty());
        assert!(!ios.is_closed());
        assert_eq!(reg.online_count(), 2);
    }

    #[tokio::test]
    async fn single_terminal_evicts_every_platform() {
        let reg = registry(MultiLoginMode::SingleTerminal);
        let (ios, _) = mock_connection(key("u1", Platform::Ios), "ti");
        let (web, _) = mock_connection(key("u1", Platform::Web), "tw");
        let (other, _) = mock_connection(key("u2", Platform::Web), "tx");
        reg.register(ios.clone()).await;
        reg.register(web.clone()).await;
        reg.register(other.clone()).await;

        let (linux, _) = mock_connection(key("u1", Platform::Linux), "tl");
        let evicted = reg.register(linux).await;
        assert_eq!(evicted.len(), 2);
        assert!(ios.is_closed() && web.is_closed());
        assert!(!other.is_closed());
        assert_eq!(reg.online_count(), 2);
        assert!(reg.is_consistent().await);
    }

    #[tokio::test]
    async fn allow_concurrent_replaces_on_collision_without_kick() {
        let reg = registry(MultiLoginMode::AllowConcurrentWeb);
        let (c1, log1) = mock_connection(key("u1", Platform::Web), "t1");
        let (c2, _) = mock_connection(key("u1", Platform::Web), "t2");
        reg.register(c1.clone()).await;
        assert!(reg.register(c2.clone()).await.is_empty());

        assert!(log1.frames().is_empty());
        assert!(!c1.is_closed());
        assert_eq!(reg.lookup_by_key(c2.key()).await.unwrap().id(), c2.id());
        assert!(reg.lookup_key_by_connection(&c1).await.is_none());
        assert!(reg.is_consistent().await);
    }

    #[tokio::test]
    async fn token_store_outage_does_not_block_registration() {
        let reg = registry_with(MultiLoginMode::KickSamePlatform, Arc::new(UnavailableTokenStore));
        let (c1, _) = mock_connection(key("u1", Platform::Web), "t1");
        let (c2, _) = mock_connection(key("u1", Platform::Web), "t2");
        reg.register(c1.clone()).await;
        reg.register(c2.clone()).await;

        assert!(c1.is_closed());
        assert_eq!(reg.lookup_by_key(c2.key()).await.unwrap().id(), c2.id());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_logins_leave_exactly_one_session() {
        let reg = Arc::new(registry(MultiLoginMode::KickSamePlatform));
        let mut conns = Vec::new();
        let mut tasks = Vec::new();
        for i in 0..16 {
            let (c, _) = mock_connection(key("u1", Platform::Web), &format!("t{i}"));
            conns.push(c.clone());
            let reg = reg.clone();
            tasks.push(tokio::spawn(async move { reg.register(c).await }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        let winner = reg.lookup_by_key(&key("u1", Platform::Web)).await.unwrap();
        let open: Vec<_> = conns.iter().filter(|c| !c.is_closed()).collect();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id(), winner.id());
        assert_eq!(reg.online_count(), 1);
        assert!(reg.is_consistent().await);
    }

    #[tokio::test]
    async fn drain_empties_registry() {
        let reg = registry(MultiLoginMode::KickSamePlatform);
        for p in [Platform::Web, Platform::Ios] {
            let (c, _) = mock_connection(key("u1", p), "t");
            reg.register(c).await;
        }
        assert_eq!(reg.drain().await.len(), 2);
        assert_eq!(reg.online_count(), 0);
        assert!(reg.is_consistent().await);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Register { user: u8, platform: usize },
        Unregister { slot: usize },
        Lookup { user: u8, platform: usize },
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..3, 0usize..Platform::ALL.len())
                .prop_map(|(user, platform)| Op::Register { user, platform }),
            (0usize..64).prop_map(|slot| Op::Unregister { slot }),
            (0u8..3, 0usize..Platform::ALL.len())
                .prop_map(|(user, platform)| Op::Lookup { user, platform }),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn interleavings_keep_maps_consistent(
            mode in prop_oneof![
                Just(MultiLoginMode::KickSamePlatform),
                Just(MultiLoginMode::SingleTerminal),
                Just(MultiLoginMode::AllowConcurrentWeb),
            ],
            ops in proptest::collection::vec(op(), 1..48),
        ) {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let reg = Arc::new(registry(mode));
                let mut created = Vec::new();
                let mut tasks = Vec::new();
                for op in ops {
                    let reg = reg.clone();
                    match op {
                        Op::Register { user, platform } => {
                            let (c, _) = mock_connection(
                                key(&format!("u{user}"), Platform::ALL[platform]),
                                "t",
                            );
                            created.push(c.clone());
                            tasks.push(tokio::spawn(async move {
                                reg.register(c).await;
                            }));
                        }
                        Op::Unregister { slot } => {
                            if let Some(c) = created.get(slot % created.len().max(1)).cloned() {
                                tasks.push(tokio::spawn(async move {
                                    reg.unregister(&c).await;
                                }));
                            }
                        }
                        Op::Lookup { user, platform } => {
                            tasks.push(tokio::spawn(async move {
                                let k = key(&format!("u{user}"), Platform::ALL[platform]);
                                if let Some(c) = reg.lookup_by_key(&k).await {
                                    assert_eq!(c.key(), &k);
                                }
                            }));
                        }
                    }
                }
                for t in tasks {
                    t.await.unwrap();
                }

                assert!(reg.is_consistent().await);
                if mode == MultiLoginMode::SingleTerminal {
                    for user in 0..3u8 {
                        let mut live = 0;
                        for k in msgate_core::identity_keys_for(&format!("u{user}")) {
                            if reg.lookup_by_key(&k).await.is_some() {
                                live += 1;
                            }
                        }
                        assert!(live <= 1);
                    }
                }
            });
        }
    }
}
