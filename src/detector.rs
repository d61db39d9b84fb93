//! SQL-injection pattern detector
//!
//! Pure substring scan against a fixed, ordered rule table. Rules are
//! checked in priority order and the first match wins; callers get a
//! `{tag, severity}` pair or nothing. No I/O, no allocation beyond one
//! lowercased copy of the input.

/// A detection outcome: which rule fired and how dangerous it is (1-10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreatMatch {
    pub tag: &'static str,
    pub severity: u8,
}

struct Rule {
    /// Lowercase needles; any one of them firing matches the rule.
    needles: &'static [&'static str],
    tag: &'static str,
    severity: u8,
}

/// Priority-ordered signature table. Boolean auth bypass and destructive
/// statements outrank exfiltration, which outranks bare comment markers.
const RULES: &[Rule] = &[
    Rule {
        needles: &["' or '1'='1", "\" or \"1\"=\"1", "' or 1=1", "or 1=1--", "or 1=1;"],
        tag: "SQL_INJECTION:AUTH_BYPASS",
        severity: 10,
    },
    Rule {
        needles: &["drop table"],
        tag: "SQL_INJECTION:DROP_TABLE",
        severity: 10,
    },
    Rule {
        needles: &["delete from"],
        tag: "SQL_INJECTION:DELETE_FROM",
        severity: 9,
    },
    Rule {
        needles: &["truncate table"],
        tag: "SQL_INJECTION:TRUNCATE",
        severity: 9,
    },
    Rule {
        needles: &["union select", "union all select"],
        tag: "SQL_INJECTION:UNION_SELECT",
        severity: 9,
    },
    Rule {
        needles: &["--", "/*", "*/", "#"],
        tag: "SQL_INJECTION:COMMENT",
        severity: 8,
    },
];

/// Scan one request-derived string (path+query, header value, form field).
/// Returns the highest-priority matching rule, or `None` for the common
/// benign case. Never panics; empty input is simply a non-match.
pub fn scan(input: &str) -> Option<ThreatMatch> {
    if input.is_empty() {
        return None;
    }
    let haystack = input.to_lowercase();
    for rule in RULES {
        if rule.needles.iter().any(|n| haystack.contains(n)) {
            return Some(ThreatMatch {
                tag: rule.tag,
                severity: rule.severity,
            });
        }
    }
    None
}

/// Scan several strings in order, stopping at the first match.
pub fn scan_all<'a, I>(inputs: I) -> Option<ThreatMatch>
where
    I: IntoIterator<Item = &'a str>,
{
    inputs.into_iter().find_map(scan)
}
