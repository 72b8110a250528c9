//! Ticket-id algebra over version strings.
//!
//! A branched version carries the ticket id between the release part and the
//! `-SNAPSHOT` suffix: `1.2.0-SNAPSHOT` on ticket `NCX-41` becomes
//! `1.2.0-NCX-41-SNAPSHOT`. [`TicketPattern::inject`] and [`strip_ticket`] are
//! the only two ways versions are rewritten.
//!
//! Invariants:
//! - `inject(inject(v, t), t) == inject(v, t)`
//! - `strip_ticket(inject(v, t))` contains no ticket id
//! - `strip_ticket(strip_ticket(v)) == strip_ticket(v)`

use std::sync::LazyLock;

use regex::Regex;

/// Suffix of development versions.
pub const SNAPSHOT_SUFFIX: &str = "-SNAPSHOT";

/// Default ticket-id pattern: uppercase project key, dash, number.
pub const DEFAULT_TICKET_PATTERN: &str = "[A-Z]+-[0-9]+";

static DEFAULT_TICKET_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(DEFAULT_TICKET_PATTERN).expect("default ticket pattern is a valid regex")
});

/// A compiled ticket-id pattern.
///
/// If the pattern has a capture group, group 1 is the ticket id; otherwise
/// the whole match is.
#[derive(Clone, Debug)]
pub struct TicketPattern {
    regex: Regex,
}

impl TicketPattern {
    /// Compile `pattern`.
    ///
    /// # Errors
    /// Returns the regex error for an invalid pattern.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }

    /// The pattern source.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// All ticket ids in `text`, in order of appearance.
    fn matches<'t>(&self, text: &'t str) -> impl Iterator<Item = &'t str> {
        self.regex.captures_iter(text).filter_map(|caps| {
            caps.get(1)
                .or_else(|| caps.get(0))
                .map(|m| m.as_str())
        })
    }

    /// The last ticket id in `text`, if any.
    ///
    /// Branch names like `feature/NCX-41-login` yield `NCX-41`.
    #[must_use]
    pub fn extract(&self, text: &str) -> Option<String> {
        self.matches(text).last().map(ToOwned::to_owned)
    }

    /// Whether `version` already carries `ticket`.
    ///
    /// The ticket counts when the pattern recognises it, or when it appears
    /// as a whole dash-delimited segment (for tickets the pattern would not
    /// match on its own).
    #[must_use]
    pub fn carries(&self, version: &str, ticket: &str) -> bool {
        if ticket.is_empty() {
            return false;
        }
        self.matches(version).any(|found| found == ticket)
            || version.contains(&format!("-{ticket}-"))
            || version.ends_with(&format!("-{ticket}"))
    }

    /// Place `ticket` into `version`.
    ///
    /// - already carries `ticket`: unchanged
    /// - carries another ticket: that one is stripped first
    /// - ends with `-SNAPSHOT`: ticket goes in front of the suffix
    /// - otherwise: `-<ticket>-SNAPSHOT` is appended
    #[must_use]
    pub fn inject(&self, version: &str, ticket: &str) -> String {
        if self.carries(version, ticket) {
            return version.to_owned();
        }
        let base = if self.extract(version).is_some() {
            strip_ticket(version)
        } else {
            version.to_owned()
        };
        base.strip_suffix(SNAPSHOT_SUFFIX).map_or_else(
            || format!("{base}-{ticket}{SNAPSHOT_SUFFIX}"),
            |release| format!("{release}-{ticket}{SNAPSHOT_SUFFIX}"),
        )
    }
}

impl Default for TicketPattern {
    fn default() -> Self {
        Self {
            regex: DEFAULT_TICKET_REGEX.clone(),
        }
    }
}

/// Remove any ticket id from `version`.
///
/// Keeps everything before the first `-`, re-appending `-SNAPSHOT` when the
/// input contained it. Qualifiers other than the ticket are dropped as well.
#[must_use]
pub fn strip_ticket(version: &str) -> String {
    let release = version.split('-').next().unwrap_or(version);
    if version.contains(SNAPSHOT_SUFFIX) {
        format!("{release}{SNAPSHOT_SUFFIX}")
    } else {
        release.to_owned()
    }
}
