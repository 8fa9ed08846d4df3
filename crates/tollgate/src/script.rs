//! Built-in screening of script bodies.
//!
//! The pattern set is fixed and cannot be changed or disabled by
//! configuration. It is a coarse textual denylist, not a parser.

use std::sync::LazyLock;

use regex_lite::Regex;

/// A dangerous command pattern.
#[derive(Debug)]
pub struct DangerousPattern {
    /// Short name used in logs
    pub name: &'static str,
    regex: Regex,
}

impl DangerousPattern {
    /// Whether the pattern occurs anywhere in `script`.
    pub fn is_match(&self, script: &str) -> bool {
        self.regex.is_match(script)
    }
}

const PATTERNS: &[(&str, &str)] = &[
    ("recursive_delete_root", r"rm\s+-rf\s+/"),
    ("privilege_escalation", r"sudo"),
    ("credential_change", r"passwd"),
    ("remote_shell", r"ssh\s+"),
    ("curl_pipe_shell", r"curl.*\|.*sh"),
    ("raw_device_write", r">/dev/sda"),
    ("disk_copy", r"dd\s+if="),
    ("format_filesystem", r"mkfs"),
];

#[allow(clippy::expect_used)]
static DANGEROUS_PATTERNS: LazyLock<Vec<DangerousPattern>> = LazyLock::new(|| {
    PATTERNS
        .iter()
        .map(|&(name, pattern)| DangerousPattern {
            name,
            // Constant patterns, all compiled by the tests below.
            regex: Regex::new(pattern).expect("dangerous pattern regex"),
        })
        .collect()
});

/// The first dangerous pattern found in `script`, if any.
pub fn find_dangerous_pattern(script: &str) -> Option<&'static DangerousPattern> {
    DANGEROUS_PATTERNS.iter().find(|p| p.is_match(script))
}

/// Names of every built-in pattern, in matching order.
pub fn dangerous_pattern_names() -> impl Iterator<Item = &'static str> {
    PATTERNS.iter().map(|&(name, _)| name)
}
