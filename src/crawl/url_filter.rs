//! URL canonicalization and filtering
//!
//! Pure functions deciding which hrefs become crawl candidates. Canonical
//! form: absolute, scheme in {http, https}, lowercased scheme/host, no
//! fragment, path/query/port preserved exactly.

use url::Url;

/// File suffixes that never lead to a document page.
const DENIED_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".ico", ".pdf", ".doc", ".docx", ".xls",
    ".xlsx", ".ppt", ".pptx", ".zip", ".rar", ".tar", ".gz", ".mp3", ".mp4", ".avi", ".mov",
    ".wmv", ".css", ".js", ".xml", ".rss",
];

/// Resolve `href` against `base` and canonicalize it, or reject.
///
/// Rejects fragment-only navigation, non-HTTP(S) schemes (`mailto:`,
/// `javascript:`, `tel:`, …), empty hosts, and denied file suffixes.
pub fn canonicalize(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let mut url = base.join(href).ok()?;
    accept(&mut url)
}

/// Canonicalize an absolute URL string (seeds, adapter inputs).
pub fn canonicalize_absolute(raw: &str) -> Option<Url> {
    let mut url = Url::parse(raw.trim()).ok()?;
    accept(&mut url)
}

fn accept(url: &mut Url) -> Option<Url> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    // The url crate lowercases scheme and ASCII hosts during parsing; an
    // empty host still parses for some schemes, so check explicitly.
    if url.host_str().map_or(true, str::is_empty) {
        return None;
    }
    url.set_fragment(None);

    if has_denied_extension(url.path()) {
        return None;
    }
    Some(url.clone())
}

fn has_denied_extension(path: &str) -> bool {
    let path = path.to_ascii_lowercase();
    DENIED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Exact lowercased host comparison; no eTLD collapsing, `www.` is distinct.
pub fn same_host(a: &Url, b: &Url) -> bool {
    match (a.host_str(), b.host_str()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}
