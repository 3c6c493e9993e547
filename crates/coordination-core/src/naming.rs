//! Naming & Context Resolver: pure mapping from lock tokens (and branch
//! names) to canonical storage keys. Never touches the backend, the clock,
//! or a subprocess — everything it needs is passed in.

use regex::Regex;
use std::sync::OnceLock;

use crate::domain_types::LockToken;
use crate::error::Error;

/// The branch-derived context a token resolves to when auto-detecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchContext {
    /// `issue-42` → issue 42.
    Issue(u64),
    /// `wave-3.2` or `wave-3-2` → wave "3", issue 2.
    WaveWithIssue { wave: String, issue: u64 },
    /// `wave-3` → wave "3", no issue component.
    Wave { wave: String },
    /// Any other non-empty branch name.
    Branch(String),
    /// No branch could be determined.
    Unknown,
}

fn issue_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Anchored at the start only, per spec.md §4.2 / design note 3 — the
    // original matches with `re.match`, which is a prefix match, not a
    // full-string one, so `issue-42-bug` still resolves to issue 42.
    RE.get_or_init(|| Regex::new(r"^issue-(\d+)").expect("valid regex"))
}

fn wave_dot_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^wave-(\d+[a-z]?)\.(\d+)").expect("valid regex"))
}

fn wave_dash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^wave-(\d+[a-z]?)-(\d+)").expect("valid regex"))
}

fn wave_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^wave-(\d+[a-z]?)").expect("valid regex"))
}

/// Parse a branch name into its [`BranchContext`], trying each rule in
/// order and taking the first match — an ordered `(pattern, constructor)`
/// cascade, per design note 5.
#[must_use]
pub fn parse_branch_context(branch: Option<&str>) -> BranchContext {
    let Some(branch) = branch.filter(|b| !b.is_empty()) else {
        return BranchContext::Unknown;
    };

    if let Some(captures) = issue_re().captures(branch) {
        if let Ok(issue) = captures[1].parse() {
            return BranchContext::Issue(issue);
        }
    }
    if let Some(captures) = wave_dot_re().captures(branch) {
        if let Ok(issue) = captures[2].parse() {
            return BranchContext::WaveWithIssue {
                wave: captures[1].to_string(),
                issue,
            };
        }
    }
    if let Some(captures) = wave_dash_re().captures(branch) {
        if let Ok(issue) = captures[2].parse() {
            return BranchContext::WaveWithIssue {
                wave: captures[1].to_string(),
                issue,
            };
        }
    }
    if let Some(captures) = wave_re().captures(branch) {
        return BranchContext::Wave {
            wave: captures[1].to_string(),
        };
    }
    BranchContext::Branch(branch.to_string())
}

/// The resolved storage scope a lock token maps to, before the `<root>:locks:`
/// prefix is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockScope {
    /// `issue:N`
    Issue(u64),
    /// `wave:X.N`
    WaveWithIssue { wave: String, issue: u64 },
    /// `wave:X`
    Wave { wave: String },
    /// `branch:name`
    Branch(String),
    /// `resource:name` — a plain, non-branch-derived token.
    Resource(String),
}

impl LockScope {
    /// Render the scope portion of the key, e.g. `"issue:42"`.
    #[must_use]
    pub fn as_key_segment(&self) -> String {
        match self {
            Self::Issue(n) => format!("issue:{n}"),
            Self::WaveWithIssue { wave, issue } => format!("wave:{wave}.{issue}"),
            Self::Wave { wave } => format!("wave:{wave}"),
            Self::Branch(name) => format!("branch:{name}"),
            Self::Resource(name) => format!("resource:{name}"),
        }
    }

    fn from_branch_context(context: &BranchContext) -> Result<Self, Error> {
        match context {
            BranchContext::Issue(n) => Ok(Self::Issue(*n)),
            BranchContext::WaveWithIssue { wave, issue } => Ok(Self::WaveWithIssue {
                wave: wave.clone(),
                issue: *issue,
            }),
            BranchContext::Wave { wave } => Ok(Self::Wave { wave: wave.clone() }),
            BranchContext::Branch(name) => Ok(Self::Branch(name.clone())),
            BranchContext::Unknown => Err(Error::InvalidArgument(
                "cannot auto-detect a lock scope: no current branch context".into(),
            )),
        }
    }
}

/// Resolve a caller-supplied [`LockToken`] to a fully-qualified storage key
/// under `<namespace>:locks:`.
///
/// - An already-canonical token (contains `:`) is used as the scope segment
///   directly.
/// - The literal token `"work"` resolves via `branch`, the caller's current
///   branch context; an [`BranchContext::Unknown`] branch context is
///   `Error::InvalidArgument` — matching the spec's requirement that
///   auto-detection against an unresolvable branch is a hard error, not a
///   silent fallback.
/// - Anything else is treated as a bare resource name.
///
/// # Errors
/// Returns `Error::InvalidArgument` if `token` is `"work"` and `branch`
/// resolves to [`BranchContext::Unknown`].
pub fn resolve_token(
    namespace: &str,
    token: &LockToken,
    branch: &BranchContext,
) -> Result<String, Error> {
    let scope_segment = if token.is_work_token() {
        LockScope::from_branch_context(branch)?.as_key_segment()
    } else if token.is_canonical() {
        token.as_str().to_string()
    } else {
        LockScope::Resource(token.as_str().to_string()).as_key_segment()
    };
    Ok(format!("{namespace}:locks:{scope_segment}"))
}

/// The storage key for a session record.
#[must_use]
pub fn session_key(namespace: &str, session_id: &str) -> String {
    format!("{namespace}:sessions:{session_id}")
}

/// The storage key for a heartbeat record.
#[must_use]
pub fn heartbeat_key(namespace: &str, session_id: &str) -> String {
    format!("{namespace}:heartbeat:{session_id}")
}

/// The glob pattern matching all lock keys, for `list_locks`.
#[must_use]
pub fn lock_scan_pattern(namespace: &str, pattern: &str) -> String {
    format!("{namespace}:locks:{pattern}")
}
