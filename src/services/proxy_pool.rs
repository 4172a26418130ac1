//! Rotating pool of upstream forward proxies
//!
//! The pool hands out proxies round-robin from a cursor that survives restarts,
//! keeps success/failure counters per proxy and steers away from proxies whose
//! failure rate crossed `PROXY_AVOID_FAILURE_RATE`. Avoided proxies stay in the
//! list; only explicitly banned ones are dropped, and only on the next reload.
//!
//! Durable state lives in three line-oriented files under `DATA_DIR`:
//! - `proxies.txt`: active list, fully rewritten on reload
//! - `banned_proxies.txt`: ban list, append-only
//! - `proxy_cursor.txt`: next cursor position

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

use crate::constants::{PROXY_AVOID_FAILURE_RATE, PROXY_MAX_SKIPS};
use crate::error::{AppError, Result};
use crate::models::ProxyConfig;
use crate::utils::sanitize_proxy_url;

/// Opaque proxy connection string (`scheme://[user:pass@]host:port`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyEndpoint(String);

impl ProxyEndpoint {
    /// Parse one list line; bare `host:port` defaults to `http://`
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let url = if line.contains("://") {
            line.to_string()
        } else {
            format!("http://{}", line)
        };

        match reqwest::Url::parse(&url) {
            Ok(parsed) if parsed.host_str().is_some() => Some(Self(url)),
            _ => {
                warn!(line = %sanitize_proxy_url(line), "Ignoring malformed proxy entry");
                None
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Loggable form without credentials
    pub fn sanitized(&self) -> String {
        sanitize_proxy_url(&self.0)
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sanitized())
    }
}

/// Parse a newline-separated proxy list, dropping comments, blanks and duplicates
pub fn parse_proxy_list(text: &str) -> Vec<ProxyEndpoint> {
    let mut seen = HashSet::new();
    text.lines()
        .filter_map(ProxyEndpoint::parse)
        .filter(|endpoint| seen.insert(endpoint.clone()))
        .collect()
}

/// Observed outcomes for one proxy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProxyStats {
    pub success_count: u64,
    pub failure_count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
    /// Set on a hard block (HTTP 403); flagged proxies that are also avoided are banned on reload
    pub flagged: bool,
}

impl ProxyStats {
    /// failures / (successes + failures), None before the first outcome
    pub fn failure_rate(&self) -> Option<f64> {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            None
        } else {
            Some(self.failure_count as f64 / total as f64)
        }
    }

    fn is_degraded(&self) -> bool {
        self.failure_rate().is_some_and(|rate| rate > PROXY_AVOID_FAILURE_RATE)
    }
}

/// Per-proxy report for operators
#[derive(Debug, Clone)]
pub struct ProxyHealth {
    pub endpoint: ProxyEndpoint,
    pub stats: ProxyStats,
    pub avoided: bool,
}

/// Where `reload()` gets a fresh proxy list from
#[async_trait]
pub trait ProxySource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<ProxyEndpoint>>;

    fn describe(&self) -> String;
}

/// Newline-separated list served over HTTP
pub struct RemoteListSource {
    url: String,
    client: reqwest::Client,
}

impl RemoteListSource {
    pub fn new(url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(30))
            .build()
            .map_err(|e| AppError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { url, client })
    }
}

#[async_trait]
impl ProxySource for RemoteListSource {
    async fn fetch(&self) -> Result<Vec<ProxyEndpoint>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("Proxy list request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Network(format!(
                "Proxy list returned status {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::Network(format!("Failed to read proxy list: {}", e)))?;

        Ok(parse_proxy_list(&body))
    }

    fn describe(&self) -> String {
        format!("remote list {}", self.url)
    }
}

/// Newline-separated list on disk
pub struct FileListSource {
    path: PathBuf,
}

impl FileListSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ProxySource for FileListSource {
    async fn fetch(&self) -> Result<Vec<ProxyEndpoint>> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| AppError::Io(format!("Failed to read {}: {}", self.path.display(), e)))?;
        Ok(parse_proxy_list(&text))
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// Tries each source in order and returns the first non-empty list
pub struct ChainedSource {
    sources: Vec<Box<dyn ProxySource>>,
}

impl ChainedSource {
    pub fn new(sources: Vec<Box<dyn ProxySource>>) -> Self {
        Self { sources }
    }

    /// Sources configured through `PROXY_LIST_URL` / `PROXY_LIST_FILE`
    pub fn from_config(config: &ProxyConfig) -> Result<Option<Self>> {
        let mut sources: Vec<Box<dyn ProxySource>> = Vec::new();

        if let Some(url) = &config.list_url {
            sources.push(Box::new(RemoteListSource::new(url.clone())?));
        }
        if let Some(path) = &config.list_file {
            sources.push(Box::new(FileListSource::new(path.clone())));
        }

        Ok(if sources.is_empty() { None } else { Some(Self::new(sources)) })
    }
}

#[async_trait]
impl ProxySource for ChainedSource {
    async fn fetch(&self) -> Result<Vec<ProxyEndpoint>> {
        let mut last_error = None;

        for source in &self.sources {
            match source.fetch().await {
                Ok(list) if !list.is_empty() => return Ok(list),
                Ok(_) => {
                    warn!(source = %source.describe(), "Proxy source returned an empty list");
                }
                Err(e) => {
                    warn!(source = %source.describe(), error = %e, "Proxy source failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::NotFound("no proxy source returned entries".to_string())))
    }

    fn describe(&self) -> String {
        self.sources
            .iter()
            .map(|s| s.describe())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

#[derive(Debug, Default)]
struct PoolState {
    endpoints: Vec<ProxyEndpoint>,
    stats: HashMap<ProxyEndpoint, ProxyStats>,
    banned: HashSet<ProxyEndpoint>,
    cursor: usize,
    cursor_dirty: bool,
}

impl PoolState {
    /// Return the endpoint under the cursor and move the cursor one step
    fn advance(&mut self) -> usize {
        let idx = self.cursor % self.endpoints.len();
        self.cursor = (idx + 1) % self.endpoints.len();
        self.cursor_dirty = true;
        idx
    }

    fn should_avoid(&self, endpoint: &ProxyEndpoint) -> bool {
        self.banned.contains(endpoint)
            || self.stats.get(endpoint).is_some_and(ProxyStats::is_degraded)
    }

    fn stats_mut(&mut self, endpoint: &ProxyEndpoint) -> &mut ProxyStats {
        self.stats.entry(endpoint.clone()).or_default()
    }

    fn clamp_cursor(&mut self) {
        if self.endpoints.is_empty() {
            self.cursor = 0;
        } else if self.cursor >= self.endpoints.len() {
            self.cursor %= self.endpoints.len();
            self.cursor_dirty = true;
        }
    }
}

/// Round-robin proxy rotation with health tracking and durable cursor
pub struct ProxyPool {
    state: Mutex<PoolState>,
    /// None for in-memory pools (tests, one-off runs)
    persistence: Option<ProxyConfig>,
    source: Option<Box<dyn ProxySource>>,
    reload_lock: tokio::sync::Mutex<()>,
}

impl ProxyPool {
    /// Pool over a fixed list with no durable state
    pub fn in_memory(endpoints: Vec<ProxyEndpoint>) -> Self {
        Self {
            state: Mutex::new(PoolState {
                endpoints,
                ..PoolState::default()
            }),
            persistence: None,
            source: None,
            reload_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Load the active list, ban list and cursor from `config.data_dir`
    pub fn load(config: ProxyConfig, source: Option<Box<dyn ProxySource>>) -> Result<Self> {
        let banned: HashSet<ProxyEndpoint> = read_list(&config.banned_list_path())?.into_iter().collect();
        let endpoints: Vec<ProxyEndpoint> = read_list(&config.active_list_path())?
            .into_iter()
            .filter(|e| !banned.contains(e))
            .collect();
        let cursor = read_cursor(&config.cursor_path());

        let mut state = PoolState {
            endpoints,
            banned,
            cursor,
            ..PoolState::default()
        };
        state.clamp_cursor();

        info!(
            proxies = state.endpoints.len(),
            banned = state.banned.len(),
            cursor = state.cursor,
            "Proxy pool loaded"
        );

        Ok(Self {
            state: Mutex::new(state),
            persistence: Some(config),
            source,
            reload_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().endpoints.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.lock().cursor
    }

    /// Next proxy in rotation.
    ///
    /// Every call advances the cursor by one. When the selected proxy should be
    /// avoided, up to `PROXY_MAX_SKIPS` further advances are tried; if all of them
    /// land on avoided proxies the first selection is returned anyway.
    pub fn next(&self) -> Option<ProxyEndpoint> {
        let mut state = self.lock();
        if state.endpoints.is_empty() {
            return None;
        }

        let first = state.advance();
        let mut chosen = first;
        if state.should_avoid(&state.endpoints[first]) {
            let mut found = None;
            for _ in 0..PROXY_MAX_SKIPS {
                let idx = state.advance();
                if !state.should_avoid(&state.endpoints[idx]) {
                    found = Some(idx);
                    break;
                }
            }
            chosen = match found {
                Some(idx) => idx,
                None => {
                    debug!(
                        proxy = %state.endpoints[first],
                        skips = PROXY_MAX_SKIPS,
                        "No healthy proxy within skip budget, using degraded proxy"
                    );
                    first
                }
            };
        }

        let endpoint = state.endpoints[chosen].clone();
        state.stats_mut(&endpoint).last_used_at = Some(Utc::now());
        Some(endpoint)
    }

    /// Record the outcome of a completed request through `endpoint`
    pub fn record_outcome(&self, endpoint: &ProxyEndpoint, success: bool) {
        let mut state = self.lock();
        let stats = state.stats_mut(endpoint);
        if success {
            stats.success_count += 1;
        } else {
            stats.failure_count += 1;
        }
    }

    /// Record a hard block (HTTP 403): a failure that also flags the proxy for eviction
    pub fn record_blocked(&self, endpoint: &ProxyEndpoint) {
        let mut state = self.lock();
        let stats = state.stats_mut(endpoint);
        stats.failure_count += 1;
        if !stats.flagged {
            stats.flagged = true;
            debug!(proxy = %endpoint, "Proxy flagged after hard block");
        }
    }

    /// True when `endpoint` is banned or its failure rate exceeds the avoid threshold
    pub fn should_avoid(&self, endpoint: &ProxyEndpoint) -> bool {
        self.lock().should_avoid(endpoint)
    }

    /// True when the pool has proxies but every one of them should be avoided
    pub fn is_exhausted(&self) -> bool {
        let state = self.lock();
        !state.endpoints.is_empty() && state.endpoints.iter().all(|e| state.should_avoid(e))
    }

    pub fn stats(&self, endpoint: &ProxyEndpoint) -> Option<ProxyStats> {
        self.lock().stats.get(endpoint).cloned()
    }

    pub fn snapshot(&self) -> Vec<ProxyHealth> {
        let state = self.lock();
        state
            .endpoints
            .iter()
            .map(|endpoint| ProxyHealth {
                endpoint: endpoint.clone(),
                stats: state.stats.get(endpoint).cloned().unwrap_or_default(),
                avoided: state.should_avoid(endpoint),
            })
            .collect()
    }

    /// Ban `endpoint`: drop it from rotation now and append it to the ban list
    pub fn ban(&self, endpoint: &ProxyEndpoint) -> Result<()> {
        let (newly_banned, active) = {
            let mut state = self.lock();
            let newly_banned = state.banned.insert(endpoint.clone());
            if let Some(pos) = state.endpoints.iter().position(|e| e == endpoint) {
                state.endpoints.remove(pos);
                if pos < state.cursor {
                    state.cursor -= 1;
                }
                state.clamp_cursor();
                state.cursor_dirty = true;
            }
            (newly_banned, state.endpoints.clone())
        };

        if let Some(config) = &self.persistence {
            if newly_banned {
                append_line(&config.banned_list_path(), endpoint.as_str())?;
            }
            write_list(&config.active_list_path(), &active)?;
        }

        info!(proxy = %endpoint, remaining = active.len(), "Proxy banned");
        Ok(())
    }

    /// Re-fetch the list from the configured source.
    ///
    /// Flagged proxies that are also avoided are banned first. Stats of proxies
    /// already known are kept; proxies new to the active list start fresh. On a
    /// fetch failure the stale list stays in place and the error is returned.
    pub async fn reload(&self) -> Result<usize> {
        let _guard = self.reload_lock.lock().await;
        self.reload_locked().await
    }

    /// Reload only if the pool is still exhausted once the reload lock is held,
    /// so concurrent callers that all saw an exhausted pool trigger one reload.
    pub async fn reload_if_exhausted(&self) -> Option<Result<usize>> {
        if self.source.is_none() {
            return None;
        }
        let _guard = self.reload_lock.lock().await;
        if !self.is_exhausted() {
            return None;
        }
        Some(self.reload_locked().await)
    }

    async fn reload_locked(&self) -> Result<usize> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| AppError::Config("no proxy list source configured".to_string()))?;

        let evicted: Vec<ProxyEndpoint> = {
            let state = self.lock();
            state
                .endpoints
                .iter()
                .filter(|e| state.stats.get(*e).is_some_and(|s| s.flagged && s.is_degraded()))
                .cloned()
                .collect()
        };
        for endpoint in &evicted {
            self.ban(endpoint)?;
        }

        let fetched = match source.fetch().await {
            Ok(list) => list,
            Err(e) => {
                warn!(source = %source.describe(), error = %e, "Proxy reload failed, keeping stale list");
                return Err(e);
            }
        };

        let active = {
            let mut state = self.lock();
            let previous: HashSet<ProxyEndpoint> = state.endpoints.iter().cloned().collect();
            let endpoints: Vec<ProxyEndpoint> = fetched
                .into_iter()
                .filter(|e| !state.banned.contains(e))
                .collect();

            for endpoint in endpoints.iter().filter(|e| !previous.contains(*e)) {
                state.stats.insert(endpoint.clone(), ProxyStats::default());
            }

            state.endpoints = endpoints;
            state.clamp_cursor();
            state.endpoints.clone()
        };

        if let Some(config) = &self.persistence {
            write_list(&config.active_list_path(), &active)?;
        }

        info!(
            source = %source.describe(),
            proxies = active.len(),
            evicted = evicted.len(),
            "Proxy pool reloaded"
        );
        Ok(active.len())
    }

    /// Write the cursor back to disk if it moved since the last write
    pub fn persist(&self) -> Result<()> {
        let Some(config) = &self.persistence else {
            return Ok(());
        };

        let cursor = {
            let mut state = self.lock();
            if !state.cursor_dirty {
                return Ok(());
            }
            state.cursor_dirty = false;
            state.cursor
        };

        fs::create_dir_all(&config.data_dir)?;
        fs::write(config.cursor_path(), cursor.to_string())?;
        Ok(())
    }
}

fn read_list(path: &Path) -> Result<Vec<ProxyEndpoint>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(parse_proxy_list(&text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(AppError::Io(format!("Failed to read {}: {}", path.display(), e))),
    }
}

fn read_cursor(path: &Path) -> usize {
    match fs::read_to_string(path) {
        Ok(text) => text.trim().parse().unwrap_or_else(|_| {
            warn!(path = %path.display(), "Corrupt proxy cursor, starting from 0");
            0
        }),
        Err(_) => 0,
    }
}

fn write_list(path: &Path, endpoints: &[ProxyEndpoint]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut body = endpoints.iter().map(|e| e.as_str()).collect::<Vec<_>>().join("\n");
    body.push('\n');
    fs::write(path, body)?;
    Ok(())
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn endpoints(n: usize) -> Vec<ProxyEndpoint> {
        (0..n)
            .map(|i| ProxyEndpoint::parse(&format!("10.0.{}.{}:8080", i / 250, i % 250 + 1)).unwrap())
            .collect()
    }

    struct StaticSource(Vec<ProxyEndpoint>);

    #[async_trait]
    impl ProxySource for StaticSource {
        async fn fetch(&self) -> Result<Vec<ProxyEndpoint>> {
            Ok(self.0.clone())
        }

        fn describe(&self) -> String {
            "static".to_string()
        }
    }

    struct FailingSource;

    #[async_trait]
    impl ProxySource for FailingSource {
        async fn fetch(&self) -> Result<Vec<ProxyEndpoint>> {
            Err(AppError::Network("connection refused".to_string()))
        }

        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    #[test]
    fn test_parse_proxy_list() {
        let list = parse_proxy_list("# comment\n\n1.2.3.4:80\nsocks5://u:p@5.6.7.8:1080\n1.2.3.4:80\n");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].as_str(), "http://1.2.3.4:80");
        assert_eq!(list[1].to_string(), "socks5://5.6.7.8:1080");
    }

    #[test]
    fn test_rotation_visits_each_once_then_wraps() {
        for len in 1..=7 {
            let list = endpoints(len);
            let pool = ProxyPool::in_memory(list.clone());

            let visited: Vec<ProxyEndpoint> = (0..len).map(|_| pool.next().unwrap()).collect();
            assert_eq!(visited, list);
            assert_eq!(pool.next().unwrap(), list[0]);
        }
    }

    #[test]
    fn test_empty_pool_returns_none() {
        let pool = ProxyPool::in_memory(Vec::new());
        assert!(pool.next().is_none());
        assert!(!pool.is_exhausted());
    }

    #[test]
    fn test_should_avoid_thresholds() {
        let list = endpoints(3);
        let pool = ProxyPool::in_memory(list.clone());

        // No outcomes yet
        assert!(!pool.should_avoid(&list[0]));

        // 7 failures / 10 = 0.7 is not above the threshold
        for _ in 0..7 {
            pool.record_outcome(&list[0], false);
        }
        for _ in 0..3 {
            pool.record_outcome(&list[0], true);
        }
        assert!(!pool.should_avoid(&list[0]));

        // 8 / 11 > 0.7
        pool.record_outcome(&list[0], false);
        assert!(pool.should_avoid(&list[0]));

        // A single hard block is a 100% failure rate
        pool.record_blocked(&list[1]);
        assert!(pool.should_avoid(&list[1]));
        assert!(pool.stats(&list[1]).unwrap().flagged);
    }

    #[test]
    fn test_next_skips_avoided() {
        let list = endpoints(3);
        let pool = ProxyPool::in_memory(list.clone());
        pool.record_outcome(&list[0], false);

        assert_eq!(pool.next().unwrap(), list[1]);
        assert_eq!(pool.cursor(), 2);
    }

    #[test]
    fn test_bounded_skip_when_all_avoided() {
        let list = endpoints(10);
        let pool = ProxyPool::in_memory(list.clone());
        for endpoint in &list {
            pool.record_outcome(endpoint, false);
        }
        assert!(pool.is_exhausted());

        // One advance plus PROXY_MAX_SKIPS more, then the first pick is returned
        assert_eq!(pool.next().unwrap(), list[0]);
        assert_eq!(pool.cursor(), 1 + PROXY_MAX_SKIPS);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_next_hands_out_distinct_proxies() {
        let list = endpoints(256);
        let pool = Arc::new(ProxyPool::in_memory(list.clone()));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { (0..64).filter_map(|_| pool.next()).collect::<Vec<_>>() })
            })
            .collect();

        let mut seen = HashSet::new();
        for task in tasks {
            for endpoint in task.await.unwrap() {
                assert!(seen.insert(endpoint));
            }
        }
        assert_eq!(seen.len(), 256);
        assert_eq!(pool.cursor(), 0);
    }

    #[test]
    fn test_cursor_survives_restart() {
        let dir = tempdir().unwrap();
        let config = ProxyConfig::new(dir.path().to_path_buf());
        write_list(&config.active_list_path(), &endpoints(4)).unwrap();

        let pool = ProxyPool::load(config.clone(), None).unwrap();
        pool.next();
        pool.next();
        pool.persist().unwrap();

        let restarted = ProxyPool::load(config, None).unwrap();
        assert_eq!(restarted.cursor(), 2);
        assert_eq!(restarted.next().unwrap(), endpoints(4)[2]);
    }

    #[test]
    fn test_load_clamps_cursor_and_filters_banned() {
        let dir = tempdir().unwrap();
        let config = ProxyConfig::new(dir.path().to_path_buf());
        let list = endpoints(3);
        write_list(&config.active_list_path(), &list).unwrap();
        append_line(&config.banned_list_path(), list[1].as_str()).unwrap();
        fs::write(config.cursor_path(), "7").unwrap();

        let pool = ProxyPool::load(config, None).unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.cursor(), 1);
    }

    #[test]
    fn test_ban_appends_and_removes() {
        let dir = tempdir().unwrap();
        let config = ProxyConfig::new(dir.path().to_path_buf());
        let list = endpoints(3);
        write_list(&config.active_list_path(), &list).unwrap();

        let pool = ProxyPool::load(config.clone(), None).unwrap();
        pool.ban(&list[0]).unwrap();

        assert_eq!(pool.len(), 2);
        assert!(pool.should_avoid(&list[0]));
        let banned = read_list(&config.banned_list_path()).unwrap();
        assert_eq!(banned, vec![list[0].clone()]);
        let active = read_list(&config.active_list_path()).unwrap();
        assert_eq!(active, vec![list[1].clone(), list[2].clone()]);
    }

    #[tokio::test]
    async fn test_reload_preserves_known_stats_and_evicts_flagged() {
        let dir = tempdir().unwrap();
        let config = ProxyConfig::new(dir.path().to_path_buf());
        let list = endpoints(4);
        write_list(&config.active_list_path(), &list[..3]).unwrap();

        // Source serves the original three plus one new proxy
        let pool = ProxyPool::load(config.clone(), Some(Box::new(StaticSource(list.clone())))).unwrap();
        pool.record_outcome(&list[0], true);
        pool.record_outcome(&list[0], false);
        pool.record_blocked(&list[1]);

        let count = pool.reload().await.unwrap();

        // list[1] was flagged and degraded: banned, so not re-added
        assert_eq!(count, 3);
        assert!(pool.should_avoid(&list[1]));
        let stats = pool.stats(&list[0]).unwrap();
        assert_eq!((stats.success_count, stats.failure_count), (1, 1));
        assert_eq!(pool.stats(&list[3]).unwrap(), ProxyStats::default());
        assert_eq!(read_list(&config.banned_list_path()).unwrap(), vec![list[1].clone()]);
    }

    #[tokio::test]
    async fn test_reload_failure_keeps_stale_list() {
        let dir = tempdir().unwrap();
        let config = ProxyConfig::new(dir.path().to_path_buf());
        write_list(&config.active_list_path(), &endpoints(2)).unwrap();

        let pool = ProxyPool::load(config, Some(Box::new(FailingSource))).unwrap();
        assert!(pool.reload().await.is_err());
        assert_eq!(pool.len(), 2);
        assert!(pool.next().is_some());
    }

    #[tokio::test]
    async fn test_reload_if_exhausted() {
        let list = endpoints(2);
        let fresh = endpoints(3);
        let dir = tempdir().unwrap();
        let config = ProxyConfig::new(dir.path().to_path_buf());
        write_list(&config.active_list_path(), &list).unwrap();

        let pool = ProxyPool::load(config, Some(Box::new(StaticSource(fresh)))).unwrap();
        assert!(pool.reload_if_exhausted().await.is_none());

        pool.record_outcome(&list[0], false);
        pool.record_outcome(&list[1], false);
        assert_eq!(pool.reload_if_exhausted().await.unwrap().unwrap(), 3);

        // list[0] and list[1] keep their failure history; the new proxy is healthy
        assert!(!pool.is_exhausted());
        assert_eq!(pool.next().unwrap(), endpoints(3)[2]);
    }

    #[tokio::test]
    async fn test_chained_source_falls_through() {
        let chained = ChainedSource::new(vec![
            Box::new(FailingSource),
            Box::new(StaticSource(endpoints(2))),
        ]);
        assert_eq!(chained.fetch().await.unwrap().len(), 2);
    }
}
