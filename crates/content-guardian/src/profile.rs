//! Platform profiles.
//!
//! A profile is the ordered selector set scanned on a given site. Every host
//! gets the generic selectors first; a known platform appends its own. Profiles
//! are plain data, so adding one touches nothing else.

use regex::Regex;
use tracing::debug;

use crate::config::ProfileConfig;
use crate::error::{Error, Result};
use crate::tree::Selector;

/// Site tag attached to hosts whose name mentions news.
pub const NEWS_SITE: &str = "news";

/// Selectors scanned on every host.
pub const GENERIC_SELECTORS: &[&str] = &[
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "p",
    "span",
    "div[role=\"article\"]",
    "article",
    "[data-testid*=\"tweet\"]",
];

/// Selectors identifying the semantic unit (post, card, tweet) around a match.
pub const SEMANTIC_UNIT_SELECTORS: &[&str] = &[
    "[data-testid=\"tweet\"]",
    ".Post",
    "article",
    ".g",
    ".ytd-rich-grid-media",
    ".ytd-compact-video-renderer",
];

/// A built-in platform profile.
#[derive(Debug)]
pub struct BuiltinProfile {
    /// Site tag, as used in `enabledSites`.
    pub site: &'static str,
    /// Host name fragments identifying the platform.
    pub hosts: &'static [&'static str],
    /// Platform selectors appended after the generic ones.
    pub selectors: &'static [&'static str],
}

/// Built-in profiles, checked in order; the first host match wins.
pub const BUILTIN_PROFILES: &[BuiltinProfile] = &[
    BuiltinProfile {
        site: "youtube",
        hosts: &["youtube.com"],
        selectors: &[
            "#video-title",
            ".ytd-video-meta-block",
            ".ytd-rich-grid-media",
            ".ytd-compact-video-renderer",
            "#description",
            "#comments",
            "ytd-comment-renderer",
        ],
    },
    BuiltinProfile {
        site: "reddit",
        hosts: &["reddit.com"],
        selectors: &[
            "[data-testid=\"post-container\"]",
            ".Post",
            "h3._eYtD2XCVieq6emjKBH3m",
            "div[data-click-id=\"text\"]",
            "div[data-testid=\"comment\"]",
            "div[data-test-id=\"comment\"]",
            "a[data-click-id=\"comments\"]",
            "a[data-click-id=\"body\"]",
        ],
    },
    BuiltinProfile {
        site: "twitter",
        hosts: &["twitter.com", "x.com"],
        selectors: &[
            "[data-testid=\"tweet\"]",
            "[data-testid=\"tweetText\"]",
            ".tweet-text",
            "div[data-testid=\"User-Names\"]",
            "div[data-testid=\"conversation\"]",
        ],
    },
    BuiltinProfile {
        site: "google",
        hosts: &["google.com"],
        selectors: &[".g h3", ".LC20lb", ".VwiC3b", ".g a", "span.xQ8gFc"],
    },
    BuiltinProfile {
        site: "facebook",
        hosts: &["facebook.com"],
        selectors: &[
            "[role=\"feed\"] [role=\"article\"]",
            "[data-testid=\"story-instance\"]",
            "div[data-ad-preview=\"message\"]",
        ],
    },
    BuiltinProfile {
        site: "instagram",
        hosts: &["instagram.com"],
        selectors: &["article[role=\"presentation\"]", "div._a9zm", "div._a9zs"],
    },
];

/// The outcome of resolving a host.
#[derive(Debug, Clone)]
pub struct ResolvedProfile {
    /// Names of the profiles that applied, `"generic"` first.
    pub names: Vec<String>,
    /// Site tags for `enabledSites` gating.
    pub site_tags: Vec<String>,
    /// Selectors to scan, most general first.
    pub selectors: Vec<Selector>,
}

#[derive(Debug)]
struct CompiledBuiltin {
    site: &'static str,
    hosts: &'static [&'static str],
    selectors: Vec<Selector>,
}

#[derive(Debug)]
struct CompiledCustom {
    name: String,
    host_pattern: Regex,
    selectors: Vec<Selector>,
}

/// Maps a host name to the selectors to scan.
#[derive(Debug)]
pub struct ProfileResolver {
    generic: Vec<Selector>,
    builtin: Vec<CompiledBuiltin>,
    custom: Vec<CompiledCustom>,
}

impl ProfileResolver {
    /// Resolver with the built-in profiles only.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in selector fails to parse.
    pub fn builtin() -> Result<Self> {
        Self::with_custom(&[])
    }

    /// Resolver with the built-in profiles followed by user profiles.
    ///
    /// # Errors
    ///
    /// Returns an error if a selector fails to parse or a host pattern is not a
    /// valid regex.
    pub fn with_custom(custom: &[ProfileConfig]) -> Result<Self> {
        let generic = Selector::parse_all(GENERIC_SELECTORS)?;
        let builtin = BUILTIN_PROFILES
            .iter()
            .map(|p| {
                Ok(CompiledBuiltin {
                    site: p.site,
                    hosts: p.hosts,
                    selectors: Selector::parse_all(p.selectors)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let custom = custom
            .iter()
            .map(|p| {
                let host_pattern = Regex::new(&p.host_pattern).map_err(|e| {
                    Error::config_validation(format!(
                        "invalid host_pattern for profile '{}': {e}",
                        p.name
                    ))
                })?;
                Ok(CompiledCustom {
                    name: p.name.clone(),
                    host_pattern,
                    selectors: Selector::parse_all(&p.selectors)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            generic,
            builtin,
            custom,
        })
    }

    /// Resolve the selectors and site tags for a host. Unknown hosts get the
    /// generic profile.
    #[must_use]
    pub fn resolve(&self, host: &str) -> ResolvedProfile {
        let host = normalize_host(host);
        let mut resolved = ResolvedProfile {
            names: vec!["generic".to_string()],
            site_tags: Vec::new(),
            selectors: self.generic.clone(),
        };

        if let Some(profile) = self
            .builtin
            .iter()
            .find(|p| p.hosts.iter().any(|h| host.contains(h)))
        {
            resolved.names.push(profile.site.to_string());
            resolved.site_tags.push(profile.site.to_string());
            resolved.selectors.extend(profile.selectors.iter().cloned());
        }

        for profile in self.custom.iter().filter(|p| p.host_pattern.is_match(&host)) {
            resolved.names.push(profile.name.clone());
            resolved.site_tags.push(profile.name.clone());
            resolved.selectors.extend(profile.selectors.iter().cloned());
        }

        if host.contains(NEWS_SITE) {
            resolved.site_tags.push(NEWS_SITE.to_string());
        }

        debug!(
            host = %host,
            profiles = ?resolved.names,
            selectors = resolved.selectors.len(),
            "Resolved platform profile"
        );
        resolved
    }

    /// The semantic-unit selectors used by container resolution.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in selector fails to parse.
    pub fn semantic_units() -> Result<Vec<Selector>> {
        Selector::parse_all(SEMANTIC_UNIT_SELECTORS)
    }
}

/// Lower-case a host name and strip scheme, port, path and trailing dot.
#[must_use]
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let host = host.split_once("://").map_or(host, |(_, rest)| rest);
    let host = host.split(['/', '?', '#']).next().unwrap_or_default();
    let host = host.rsplit_once(':').map_or(host, |(name, port)| {
        if port.chars().all(|c| c.is_ascii_digit()) {
            name
        } else {
            host
        }
    });
    host.trim_end_matches('.').to_ascii_lowercase()
}
