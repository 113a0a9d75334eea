//! Bounded LDAP connection pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Semaphore, SemaphorePermit};

use super::{LdapDialer, LdapSession};
use crate::connector::ConnectorError;
use crate::connector::ldap::LdapPoolConfig;

/// Connection pool with a hard cap on open connections.
///
/// - at most `max_open` connections are checked out at once; further
///   callers wait up to `acquire_timeout`
/// - at most `max_idle` connections stay open while unused
/// - a connection is probed before it is handed out and again when it is
///   checked in; dead ones are closed instead of pooled
pub struct LdapPool {
    connector: String,
    dialer: Arc<dyn LdapDialer>,
    permits: Semaphore,
    idle: Mutex<Vec<Box<dyn LdapSession>>>,
    max_idle: usize,
    open: AtomicUsize,
    acquire_timeout: Duration,
}

impl LdapPool {
    #[must_use]
    pub fn new(connector: &str, dialer: Arc<dyn LdapDialer>, config: &LdapPoolConfig) -> Self {
        Self {
            connector: connector.to_string(),
            dialer,
            permits: Semaphore::new(config.max_open.max(1)),
            idle: Mutex::new(Vec::new()),
            max_idle: config.max_idle,
            open: AtomicUsize::new(0),
            acquire_timeout: config.acquire_timeout,
        }
    }

    /// Checks out a connection, reusing an idle one when possible.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if no connection frees up in time, `Unavailable`
    /// after [`close`](Self::close), or the dialer's error.
    pub async fn get(&self) -> Result<PooledSession<'_>, ConnectorError> {
        let permit = tokio::time::timeout(self.acquire_timeout, self.permits.acquire())
            .await
            .map_err(|_| ConnectorError::timeout(&self.connector))?
            .map_err(|_| ConnectorError::unavailable(&self.connector, "connection pool closed"))?;

        while let Some(mut session) = self.pop_idle() {
            let slot = OpenSlot::new(&self.open);
            if session.is_alive().await {
                return Ok(PooledSession {
                    pool: self,
                    session,
                    slot,
                    _permit: permit,
                });
            }
            session.close().await;
            tracing::debug!(connector_id = %self.connector, "Dropped stale LDAP connection");
        }

        let session = self.dialer.dial().await?;
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(PooledSession {
            pool: self,
            session,
            slot: OpenSlot::new(&self.open),
            _permit: permit,
        })
    }

    /// Connections currently open, idle or checked out.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Connections waiting in the pool.
    #[must_use]
    pub fn idle_connections(&self) -> usize {
        self.lock_idle().len()
    }

    /// Closes idle connections and refuses further checkouts.
    pub async fn close(&self) {
        self.permits.close();
        let drained: Vec<Box<dyn LdapSession>> = std::mem::take(&mut *self.lock_idle());
        for mut session in drained {
            session.close().await;
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn pop_idle(&self) -> Option<Box<dyn LdapSession>> {
        self.lock_idle().pop()
    }

    fn lock_idle(&self) -> MutexGuard<'_, Vec<Box<dyn LdapSession>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Decrements the open counter when a connection goes away, unless the
/// connection went back to the idle list.
struct OpenSlot<'a> {
    open: &'a AtomicUsize,
    armed: bool,
}

impl<'a> OpenSlot<'a> {
    fn new(open: &'a AtomicUsize) -> Self {
        Self { open, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for OpenSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// A checked-out connection.
///
/// Give it back with [`release`](Self::release) or close it with
/// [`discard`](Self::discard). Dropping it closes the socket without an
/// unbind.
pub struct PooledSession<'a> {
    pool: &'a LdapPool,
    session: Box<dyn LdapSession>,
    slot: OpenSlot<'a>,
    _permit: SemaphorePermit<'a>,
}

impl PooledSession<'_> {
    pub fn session(&mut self) -> &mut dyn LdapSession {
        self.session.as_mut()
    }

    /// Returns the connection to the idle list if it is alive, there is
    /// room and the pool is still open; closes it otherwise.
    pub async fn release(self) {
        let PooledSession {
            pool,
            mut session,
            slot,
            _permit,
        } = self;

        if session.is_alive().await {
            let mut idle = pool.lock_idle();
            // close() marks the semaphore before draining under this lock.
            if !pool.permits.is_closed() && idle.len() < pool.max_idle {
                idle.push(session);
                slot.disarm();
                return;
            }
        }
        session.close().await;
    }

    /// Closes the connection.
    pub async fn discard(self) {
        let PooledSession {
            mut session, slot, ..
        } = self;
        session.close().await;
        drop(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::ldap::LdapEntry;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct Counters {
        live: AtomicUsize,
        peak: AtomicUsize,
        dialed: AtomicUsize,
    }

    struct FakeSession {
        counters: Arc<Counters>,
        alive: Arc<AtomicBool>,
    }

    #[async_trait]
    impl LdapSession for FakeSession {
        async fn simple_bind(&mut self, _dn: &str, _password: &str) -> Result<(), ConnectorError> {
            tokio::time::sleep(Duration::from_millis(2)).await;
            Ok(())
        }
        async fn search(
            &mut self,
            _base: &str,
            _filter: &str,
            _attrs: &[&str],
        ) -> Result<Vec<LdapEntry>, ConnectorError> {
            Ok(Vec::new())
        }
        async fn is_alive(&mut self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
        async fn close(&mut self) {
            self.counters.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct FakeDialer {
        counters: Arc<Counters>,
        alive: Arc<AtomicBool>,
    }

    impl FakeDialer {
        fn new() -> Self {
            Self {
                counters: Arc::new(Counters::default()),
                alive: Arc::new(AtomicBool::new(true)),
            }
        }
    }

    #[async_trait]
    impl LdapDialer for FakeDialer {
        async fn dial(&self) -> Result<Box<dyn LdapSession>, ConnectorError> {
            let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.counters.peak.fetch_max(live, Ordering::SeqCst);
            self.counters.dialed.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSession {
                counters: Arc::clone(&self.counters),
                alive: Arc::clone(&self.alive),
            }))
        }
    }

    fn config(max_open: usize, max_idle: usize) -> LdapPoolConfig {
        LdapPoolConfig {
            max_open,
            max_idle,
            acquire_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_flood_respects_high_water_mark() {
        let dialer = Arc::new(FakeDialer::new());
        let counters = Arc::clone(&dialer.counters);
        let pool = Arc::new(LdapPool::new("corp", dialer, &config(8, 3)));

        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move {
                    let mut conn = pool.get().await.unwrap();
                    conn.session().simple_bind("cn=svc", "pw").await.unwrap();
                    conn.release().await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert!(pool.idle_connections() <= 3);
        assert_eq!(pool.open_connections(), pool.idle_connections());
        assert_eq!(counters.live.load(Ordering::SeqCst), pool.open_connections());
        assert!(counters.peak.load(Ordering::SeqCst) <= 8);
    }

    #[tokio::test]
    async fn test_idle_connection_is_reused() {
        let dialer = Arc::new(FakeDialer::new());
        let counters = Arc::clone(&dialer.counters);
        let pool = LdapPool::new("corp", dialer, &config(2, 2));

        pool.get().await.unwrap().release().await;
        pool.get().await.unwrap().release().await;

        assert_eq!(counters.dialed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_connections(), 1);
    }

    #[tokio::test]
    async fn test_dead_connections_are_not_pooled() {
        let dialer = Arc::new(FakeDialer::new());
        let counters = Arc::clone(&dialer.counters);
        let alive = Arc::clone(&dialer.alive);
        let pool = LdapPool::new("corp", dialer, &config(2, 2));

        let conn = pool.get().await.unwrap();
        alive.store(false, Ordering::SeqCst);
        conn.release().await;

        assert_eq!(pool.idle_connections(), 0);
        assert_eq!(pool.open_connections(), 0);
        assert_eq!(counters.live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_idle_connection_replaced_on_checkout() {
        let dialer = Arc::new(FakeDialer::new());
        let counters = Arc::clone(&dialer.counters);
        let alive = Arc::clone(&dialer.alive);
        let pool = LdapPool::new("corp", dialer, &config(2, 2));

        pool.get().await.unwrap().release().await;
        alive.store(false, Ordering::SeqCst);
        let conn = pool.get().await.unwrap();

        assert_eq!(counters.dialed.load(Ordering::SeqCst), 2);
        assert_eq!(pool.open_connections(), 1);
        conn.discard().await;
        assert_eq!(pool.open_connections(), 0);
        assert_eq!(counters.live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_checkout_times_out_when_exhausted() {
        let pool = LdapPool::new(
            "corp",
            Arc::new(FakeDialer::new()),
            &LdapPoolConfig {
                max_open: 1,
                max_idle: 1,
                acquire_timeout: Duration::from_millis(20),
            },
        );

        let held = pool.get().await.unwrap();
        let err = pool.get().await.err().unwrap();
        assert!(err.is_retryable());
        assert!(matches!(err, ConnectorError::Timeout { .. }));
        held.release().await;
    }

    #[tokio::test]
    async fn test_close_drains_idle() {
        let dialer = Arc::new(FakeDialer::new());
        let counters = Arc::clone(&dialer.counters);
        let pool = LdapPool::new("corp", dialer, &config(2, 2));

        pool.get().await.unwrap().release().await;
        pool.close().await;

        assert_eq!(pool.open_connections(), 0);
        assert_eq!(counters.live.load(Ordering::SeqCst), 0);
        assert!(pool.get().await.is_err());
    }

    #[tokio::test]
    async fn test_connection_released_after_close_is_closed() {
        let dialer = Arc::new(FakeDialer::new());
        let counters = Arc::clone(&dialer.counters);
        let pool = LdapPool::new("corp", dialer, &config(2, 2));

        let conn = pool.get().await.unwrap();
        pool.close().await;
        conn.release().await;

        assert_eq!(pool.idle_connections(), 0);
        assert_eq!(pool.open_connections(), 0);
        assert_eq!(counters.live.load(Ordering::SeqCst), 0);
    }
}
