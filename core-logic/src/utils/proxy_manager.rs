use crate::utils::logger::mask_account;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

const SCHEMES: [&str; 4] = ["http://", "https://", "socks4://", "socks5://"];

/// Round-robin egress proxy pool with sticky per-account assignments.
///
/// The round-robin index and the assignment map are the only state shared
/// between accounts, so both live behind one mutex.
#[derive(Debug, Default)]
pub struct ProxyPool {
    proxies: Vec<String>,
    state: Mutex<PoolState>,
}

#[derive(Debug, Default)]
struct PoolState {
    next_index: usize,
    assignments: HashMap<String, String>,
}

impl ProxyPool {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let proxies = entries
            .into_iter()
            .filter_map(|line| {
                let line = line.as_ref().trim();
                if line.is_empty() || line.starts_with('#') {
                    None
                } else {
                    Some(Self::normalize(line))
                }
            })
            .collect();

        Self {
            proxies,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Loads a newline-delimited proxy list.
    /// A missing file is not an error: the pool is empty and accounts run direct.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("{} not found. Running without proxies.", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let pool = Self::new(content.lines());

        info!("Loaded {} proxies from {}", pool.len(), path.display());
        Ok(pool)
    }

    /// Adds `http://` to bare entries and rewrites `host:port:user:pass` into URL form.
    pub fn normalize(entry: &str) -> String {
        let entry = entry.trim();
        if SCHEMES.iter().any(|scheme| entry.starts_with(scheme)) {
            return entry.to_string();
        }

        let parts: Vec<&str> = entry.split(':').collect();
        if parts.len() == 4 && !entry.contains('@') {
            return format!(
                "http://{}:{}@{}:{}",
                parts[2], parts[3], parts[0], parts[1]
            );
        }

        format!("http://{}", entry)
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn proxies(&self) -> &[String] {
        &self.proxies
    }

    /// Current assignment for `account`, if one was made.
    pub fn current(&self, account: &str) -> Option<String> {
        self.lock().assignments.get(account).cloned()
    }

    /// Returns the account's sticky proxy, assigning the next one round-robin on first use.
    pub fn assign(&self, account: &str) -> Option<String> {
        if self.proxies.is_empty() {
            return None;
        }

        let mut state = self.lock();
        if let Some(existing) = state.assignments.get(account) {
            return Some(existing.clone());
        }

        let proxy = self.take_next(&mut state);
        state
            .assignments
            .insert(account.to_string(), proxy.clone());
        debug!(account = %mask_account(account), proxy = %proxy, "Assigned proxy");
        Some(proxy)
    }

    /// Replaces the account's assignment with the next proxy round-robin.
    ///
    /// A candidate equal to the current assignment is passed over, so the
    /// proxy always changes when the pool holds more than one entry.
    pub fn rotate(&self, account: &str) -> Option<String> {
        if self.proxies.is_empty() {
            return None;
        }

        let mut state = self.lock();
        let previous = state.assignments.get(account).cloned();

        let mut proxy = self.take_next(&mut state);
        if self.proxies.len() > 1 && previous.as_deref() == Some(proxy.as_str()) {
            proxy = self.take_next(&mut state);
        }

        state
            .assignments
            .insert(account.to_string(), proxy.clone());
        debug!(account = %mask_account(account), proxy = %proxy, "Rotated proxy");
        Some(proxy)
    }

    fn take_next(&self, state: &mut PoolState) -> String {
        let index = state.next_index % self.proxies.len();
        state.next_index = (index + 1) % self.proxies.len();
        self.proxies[index].clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
