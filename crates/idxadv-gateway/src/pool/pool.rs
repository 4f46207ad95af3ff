//! Session pool implementation
//!
//! A semaphore bounds the number of live sessions; idle sessions wait in a
//! deque and are revalidated (lifetime, idle age, liveness) before reuse.

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use idxadv_core::{AdvisorError, Result};

use super::config::PoolConfig;
use super::stats::PoolStats;
use crate::session::{DbSession, SessionFactory};

struct IdleSession {
    session: Arc<dyn DbSession>,
    created_at: Instant,
    last_used_at: Instant,
}

impl IdleSession {
    fn new(session: Arc<dyn DbSession>) -> Self {
        let now = Instant::now();
        Self {
            session,
            created_at: now,
            last_used_at: now,
        }
    }
}

/// A pool of database sessions
///
/// Borrowed sessions are returned automatically when the `PooledSession`
/// wrapper drops.
pub struct SessionPool {
    config: PoolConfig,
    factory: Arc<dyn SessionFactory>,
    idle: Mutex<VecDeque<IdleSession>>,
    semaphore: Arc<Semaphore>,
    active_count: AtomicUsize,
    waiting_count: AtomicUsize,
}

impl SessionPool {
    pub fn new<F: SessionFactory>(config: PoolConfig, factory: F) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_size()));
        Self {
            config,
            factory: Arc::new(factory),
            idle: Mutex::new(VecDeque::new()),
            semaphore,
            active_count: AtomicUsize::new(0),
            waiting_count: AtomicUsize::new(0),
        }
    }

    /// Borrow a session, creating one if the pool is below its cap.
    ///
    /// Fails with a connection error when the acquire timeout elapses.
    pub async fn acquire(&self) -> Result<PooledSession<'_>> {
        self.waiting_count.fetch_add(1, Ordering::SeqCst);

        let result = tokio::time::timeout(self.config.acquire_timeout(), async {
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| AdvisorError::ConnectionFailure("pool closed".into()))?;

            let session = match self.take_idle().await {
                Some(session) => session,
                None => self.factory.create().await?,
            };

            self.active_count.fetch_add(1, Ordering::SeqCst);

            Ok(PooledSession {
                session: Some(session),
                pool: self,
                _permit: permit,
            })
        })
        .await;

        self.waiting_count.fetch_sub(1, Ordering::SeqCst);
        match result {
            Ok(session) => session,
            Err(_) => Err(AdvisorError::ConnectionFailure(format!(
                "timed out acquiring a session after {:?}",
                self.config.acquire_timeout()
            ))),
        }
    }

    /// Open sessions until `count` are idle, used to pre-warm the pool.
    pub async fn warm(&self, count: usize) -> Result<()> {
        let target = count.min(self.config.max_size());
        loop {
            {
                let idle = self.idle.lock();
                if idle.len() >= target {
                    return Ok(());
                }
            }
            let session = self.factory.create().await?;
            self.idle.lock().push_back(IdleSession::new(session));
        }
    }

    async fn take_idle(&self) -> Option<Arc<dyn DbSession>> {
        loop {
            let idle = { self.idle.lock().pop_front() };
            match idle {
                Some(mut entry) => {
                    if let Some(max_lifetime) = self.config.max_lifetime() {
                        if entry.created_at.elapsed() > max_lifetime {
                            let _ = entry.session.close().await;
                            continue;
                        }
                    }
                    if entry.last_used_at.elapsed() > self.config.idle_timeout() {
                        let _ = entry.session.close().await;
                        continue;
                    }
                    if !self.factory.validate(&*entry.session).await {
                        let _ = entry.session.close().await;
                        continue;
                    }
                    entry.last_used_at = Instant::now();
                    return Some(entry.session);
                }
                None => return None,
            }
        }
    }

    fn release(&self, session: Arc<dyn DbSession>) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        if session.is_closed() {
            return;
        }
        self.idle.lock().push_back(IdleSession::new(session));
    }

    pub fn stats(&self) -> PoolStats {
        let idle = self.idle.lock().len();
        let active = self.active_count.load(Ordering::SeqCst);
        let waiting = self.waiting_count.load(Ordering::SeqCst);
        PoolStats::new(idle + active, idle, active, waiting)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Close every idle session. Borrowed sessions close on return.
    pub async fn close_all(&self) {
        let drained: Vec<_> = { self.idle.lock().drain(..).collect() };
        for entry in drained {
            let _ = entry.session.close().await;
        }
        tracing::debug!("session pool drained");
    }
}

/// A session borrowed from the pool
pub struct PooledSession<'a> {
    session: Option<Arc<dyn DbSession>>,
    pool: &'a SessionPool,
    _permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for PooledSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSession")
            .field("session", &self.session.as_ref().map(|_| "<session>"))
            .finish()
    }
}

impl Deref for PooledSession<'_> {
    type Target = dyn DbSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref().expect("session taken").as_ref()
    }
}

impl Drop for PooledSession<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.release(session);
        }
    }
}
