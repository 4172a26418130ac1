//! Browser identity generation
//!
//! Every request carries a full browser header set drawn from weighted pools.
//! A session pins the platform family and a session cookie so consecutive
//! requests look like one browser; versions, language and referrer are
//! re-drawn per call. Sessions are reset whenever the proxy rotates.

use rand::distributions::WeightedIndex;
use rand::prelude::*;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Engine {
    Chromium,
    Gecko,
    WebKit,
}

struct BrowserProfile {
    name: &'static str,
    platform: Platform,
    engine: Engine,
    weight: u32,
    /// `{v}` is replaced by the drawn major version
    user_agent: &'static str,
    versions: &'static [u32],
    /// Brand used in `sec-ch-ua` (Chromium only)
    brand: Option<&'static str>,
}

const PROFILES: &[BrowserProfile] = &[
    BrowserProfile {
        name: "chrome-windows",
        platform: Platform::Windows,
        engine: Engine::Chromium,
        weight: 45,
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{v}.0.0.0 Safari/537.36",
        versions: &[122, 123, 124, 125, 126],
        brand: Some("Google Chrome"),
    },
    BrowserProfile {
        name: "edge-windows",
        platform: Platform::Windows,
        engine: Engine::Chromium,
        weight: 12,
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{v}.0.0.0 Safari/537.36 Edg/{v}.0.0.0",
        versions: &[123, 124, 125],
        brand: Some("Microsoft Edge"),
    },
    BrowserProfile {
        name: "firefox-windows",
        platform: Platform::Windows,
        engine: Engine::Gecko,
        weight: 10,
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:{v}.0) Gecko/20100101 Firefox/{v}.0",
        versions: &[124, 125, 126],
        brand: None,
    },
    BrowserProfile {
        name: "chrome-macos",
        platform: Platform::MacOs,
        engine: Engine::Chromium,
        weight: 15,
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{v}.0.0.0 Safari/537.36",
        versions: &[123, 124, 125, 126],
        brand: Some("Google Chrome"),
    },
    BrowserProfile {
        name: "safari-macos",
        platform: Platform::MacOs,
        engine: Engine::WebKit,
        weight: 10,
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{v}.4 Safari/605.1.15",
        versions: &[16, 17],
        brand: None,
    },
    BrowserProfile {
        name: "firefox-linux",
        platform: Platform::Linux,
        engine: Engine::Gecko,
        weight: 8,
        user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:{v}.0) Gecko/20100101 Firefox/{v}.0",
        versions: &[124, 125, 126],
        brand: None,
    },
];

const ACCEPT_LANGUAGES: &[(&str, u32)] = &[
    ("en-US,en;q=0.9", 50),
    ("en-GB,en;q=0.9,en-US;q=0.8", 15),
    ("en-US,en;q=0.9,de;q=0.8", 10),
    ("en-US,en;q=0.9,fr;q=0.8", 8),
    ("en-US,en;q=0.8,ru;q=0.6", 7),
    ("en-US,en;q=0.9,pt-BR;q=0.7", 10),
];

const REFERERS: &[(&str, u32)] = &[
    ("https://warframe.market/", 60),
    ("https://warframe.market/auctions", 15),
    ("https://warframe.market/items", 15),
    ("https://www.google.com/", 10),
];

const ORIGIN: &str = "https://warframe.market";

/// Simulated browsing session; not a credential
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub platform: Platform,
}

impl Session {
    fn random(rng: &mut impl Rng) -> Self {
        let platform = PROFILES[pick_weighted(rng, PROFILES.iter().map(|p| p.weight))].platform;
        Self {
            token: Uuid::new_v4().simple().to_string(),
            platform,
        }
    }
}

/// Produces plausible browser header sets
pub struct IdentityGenerator {
    session: Mutex<Session>,
}

impl Default for IdentityGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityGenerator {
    pub fn new() -> Self {
        Self {
            session: Mutex::new(Session::random(&mut thread_rng())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn session(&self) -> Session {
        self.lock().clone()
    }

    /// Start a new session (new token, possibly a new platform)
    pub fn reset_session(&self) {
        *self.lock() = Session::random(&mut thread_rng());
    }

    /// Fresh header set for one request within the current session
    pub fn headers(&self) -> BTreeMap<String, String> {
        let session = self.session();
        build_headers(&session, &mut thread_rng())
    }
}

fn pick_weighted(rng: &mut impl Rng, weights: impl Iterator<Item = u32>) -> usize {
    match WeightedIndex::new(weights) {
        Ok(dist) => dist.sample(rng),
        Err(_) => 0,
    }
}

fn pick<'a>(rng: &mut impl Rng, pool: &'a [(&'a str, u32)]) -> &'a str {
    pool[pick_weighted(rng, pool.iter().map(|(_, w)| *w))].0
}

fn platform_hint(platform: Platform) -> &'static str {
    match platform {
        Platform::Windows => "\"Windows\"",
        Platform::MacOs => "\"macOS\"",
        Platform::Linux => "\"Linux\"",
    }
}

fn build_headers(session: &Session, rng: &mut impl Rng) -> BTreeMap<String, String> {
    let candidates: Vec<&BrowserProfile> = PROFILES.iter().filter(|p| p.platform == session.platform).collect();
    let profile = candidates[pick_weighted(rng, candidates.iter().map(|p| p.weight))];
    let version = profile.versions.choose(rng).copied().unwrap_or(profile.versions[0]);

    let mut headers = BTreeMap::new();
    let mut set = |name: &str, value: String| {
        headers.insert(name.to_string(), value);
    };

    set("User-Agent", profile.user_agent.replace("{v}", &version.to_string()));
    set("Accept", "application/json, text/plain, */*".to_string());
    set("Accept-Language", pick(rng, ACCEPT_LANGUAGES).to_string());
    set("Accept-Encoding", "gzip, deflate, br".to_string());
    set("Origin", ORIGIN.to_string());
    set("Referer", pick(rng, REFERERS).to_string());
    set("Sec-Fetch-Dest", "empty".to_string());
    set("Sec-Fetch-Mode", "cors".to_string());
    set("Sec-Fetch-Site", "same-site".to_string());
    set("Cookie", format!("JWT={}", session.token));

    if let (Engine::Chromium, Some(brand)) = (profile.engine, profile.brand) {
        set(
            "sec-ch-ua",
            format!(
                "\"{}\";v=\"{}\", \"Chromium\";v=\"{}\", \"Not.A/Brand\";v=\"24\"",
                brand, version, version
            ),
        );
        set("sec-ch-ua-mobile", "?0".to_string());
        set("sec-ch-ua-platform", platform_hint(profile.platform).to_string());
    }

    if profile.engine == Engine::Gecko && rng.gen_bool(0.5) {
        set("DNT", "1".to_string());
    }

    tracing::trace!(profile = profile.name, version = version, "Generated identity");
    headers
}
