//! In-process store with TTL enforcement

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use tokio::time::{Duration, Instant};

use super::store::CacheStore;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Minimum time between sweeps triggered by writes
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// In-memory store. Expired entries are invisible to reads and are swept from
/// the map by writes, at most once per `SWEEP_INTERVAL`.
#[derive(Debug)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    last_sweep: Mutex<Instant>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            last_sweep: Mutex::new(Instant::now()),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        *self.last_sweep.lock() = now;
        sweep(&mut self.entries.write(), now)
    }

    /// Entries held in the map, expired or not
    pub fn held(&self) -> usize {
        self.entries.read().len()
    }

    fn sweep_due(&self, now: Instant) -> bool {
        let mut last = self.last_sweep.lock();
        if now.duration_since(*last) >= SWEEP_INTERVAL {
            *last = now;
            true
        } else {
            false
        }
    }

    fn approximate_bytes(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .iter()
            .filter(|(_, v)| v.is_live(now))
            .map(|(k, v)| k.len() + v.value.len())
            .sum()
    }
}

fn sweep(entries: &mut HashMap<String, MemoryEntry>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| entry.is_live(now));
    let removed = before - entries.len();
    if removed > 0 {
        tracing::debug!("Swept {} expired memory cache entries", removed);
    }
    removed
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let now = Instant::now();
        let expired = {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.entries.write().remove(key);
        }
        Ok(None)
    }

    async fn set_ex(&self, key: &str, ttl_secs: u64, value: String) -> anyhow::Result<()> {
        if ttl_secs == 0 {
            anyhow::bail!("refusing to store '{}' without an expiry", key);
        }
        let now = Instant::now();
        let entry = MemoryEntry {
            value,
            expires_at: now + Duration::from_secs(ttl_secs),
        };
        let due = self.sweep_due(now);
        let mut entries = self.entries.write();
        if due {
            sweep(&mut entries, now);
        }
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> anyhow::Result<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let removed = keys
            .iter()
            .filter_map(|k| entries.remove(k))
            .filter(|entry| entry.is_live(now))
            .count();
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> anyhow::Result<Vec<String>> {
        let matcher = glob_to_regex(pattern)?;
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(k, v)| v.is_live(now) && matcher.is_match(k))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn db_size(&self) -> anyhow::Result<usize> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .values()
            .filter(|entry| entry.is_live(now))
            .count())
    }

    async fn info(&self) -> anyhow::Result<String> {
        Ok(format!(
            "# Memory\r\nused_memory:{}\r\nbackend:memory\r\n",
            self.approximate_bytes()
        ))
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Translate a Redis-style glob into an anchored regex.
pub(crate) fn glob_to_regex(pattern: &str) -> anyhow::Result<Regex> {
    let mut re = String::with_capacity(pattern.len() * 2 + 2);
    re.push('^');

    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '\\' if i + 1 < chars.len() => {
                i += 1;
                re.push_str(&regex::escape(&chars[i].to_string()));
            }
            '[' => match chars[i + 1..].iter().position(|&c| c == ']') {
                Some(len) if len > 0 => {
                    re.push('[');
                    for (n, &c) in chars[i + 1..i + 1 + len].iter().enumerate() {
                        match c {
                            '^' if n == 0 => re.push('^'),
                            '-' => re.push('-'),
                            other => re.push_str(&regex::escape(&other.to_string())),
                        }
                    }
                    re.push(']');
                    i += len + 1;
                }
                _ => re.push_str(r"\["),
            },
            other => re.push_str(&regex::escape(&other.to_string())),
        }
        i += 1;
    }

    re.push('$');
    Ok(Regex::new(&re)?)
}
