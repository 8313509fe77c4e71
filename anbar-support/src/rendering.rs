//! Text rendering for diagnostics.
//!
//! Error messages in Anbar name types, walk resolution chains, and
//! suggest near misses. The helpers here keep that output short and
//! readable without pulling a formatting dependency into the engine.

/// Joins a resolution chain with arrows.
///
/// # Examples
/// ```
/// use anbar_support::rendering::render_chain;
///
/// let chain = ["Widget", "RequestId", "Widget"];
/// assert_eq!(render_chain(&chain), "Widget → RequestId → Widget");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    let mut out = String::new();
    for (i, link) in chain.iter().enumerate() {
        if i > 0 {
            out.push_str(" → ");
        }
        out.push_str(link.as_ref());
    }
    out
}

/// One line of a vertically rendered chain.
#[derive(Debug, Clone)]
pub struct ChainEntry {
    /// Display name of the key.
    pub type_name: String,
    /// Lifetime label, e.g. `Singleton`.
    pub scope: String,
}

impl ChainEntry {
    pub fn new(type_name: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            scope: scope.into(),
        }
    }
}

/// Renders a consumer → dependency chain one key per line with its scope.
///
/// ```text
/// [Singleton] ReportService
///             ↓
/// [Scoped]    RequestId
/// ```
pub fn render_scope_chain(entries: &[ChainEntry]) -> String {
    let width = entries.iter().map(|e| e.scope.len()).max().unwrap_or(0);
    let mut out = String::new();

    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            out.push_str(&" ".repeat(width + 3));
            out.push_str("↓\n");
        }
        let label = format!("[{}]", entry.scope);
        out.push_str(&format!("{label:<w$} {}\n", entry.type_name, w = width + 2));
    }

    out
}

/// Strips module paths from a fully qualified type name, keeping generics.
///
/// ```
/// use anbar_support::rendering::shorten_type_name;
///
/// assert_eq!(shorten_type_name("app::http::RequestId"), "RequestId");
/// assert_eq!(
///     shorten_type_name("alloc::sync::Arc<dyn app::log::Logger>"),
///     "Arc<dyn Logger>"
/// );
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut out = String::with_capacity(full_name.len());
    let mut segment_start = 0;

    for (idx, ch) in full_name.char_indices() {
        if matches!(ch, '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&') {
            out.push_str(last_path_segment(&full_name[segment_start..idx]));
            out.push(ch);
            segment_start = idx + ch.len_utf8();
        }
    }
    out.push_str(last_path_segment(&full_name[segment_start..]));
    out
}

fn last_path_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

/// Levenshtein edit distance over chars.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != *cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Picks up to `max_suggestions` names from `available` that look like `requested`.
///
/// Matching is done on shortened, lowercased names. Substring matches rank
/// first, then names within a small edit distance.
pub fn suggest_similar(requested: &str, available: &[&str], max_suggestions: usize) -> Vec<String> {
    let wanted = shorten_type_name(requested).to_lowercase();
    if wanted.is_empty() {
        return Vec::new();
    }
    let tolerance = (wanted.chars().count() / 3).max(1);

    let mut ranked: Vec<(usize, &str)> = available
        .iter()
        .filter_map(|&candidate| {
            let short = shorten_type_name(candidate).to_lowercase();
            if short == wanted {
                return Some((0, candidate));
            }
            if short.contains(&wanted) || wanted.contains(&short) {
                return Some((1, candidate));
            }
            let distance = edit_distance(&short, &wanted);
            (distance <= tolerance).then_some((1 + distance, candidate))
        })
        .collect();

    ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    ranked
        .into_iter()
        .take(max_suggestions)
        .map(|(_, name)| name.to_string())
        .collect()
}
