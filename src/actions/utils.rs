use reqwest::Url;

const PASS_THROUGH_SCHEMES: &[&str] = &["http", "https", "file", "data", "about", "chrome"];

/// Absolute form of `raw`, or `None` when it is a path to resolve against the current page.
///
/// A local host gets `http://`, anything whose first segment looks like a host name gets `https://`.
pub fn absolute_url(raw: &str) -> Option<String> {
    let raw = raw.trim();

    if raw.starts_with("localhost") || raw.starts_with("127.0.0.1") {
        return Some(format!("http://{}", raw));
    }
    if let Ok(url) = Url::parse(raw) {
        if PASS_THROUGH_SCHEMES.contains(&url.scheme()) {
            return Some(raw.to_string());
        }
    }
    if raw.starts_with('.') || raw.starts_with('/') {
        return None;
    }

    let host = raw.split(['/', '?', '#']).next().unwrap_or_default();
    host.contains('.').then(|| format!("https://{}", raw))
}

/// Resolve a path against `current`
pub fn resolve_relative(current: &str, path: &str) -> Option<String> {
    let base = Url::parse(current).ok()?;
    if base.cannot_be_a_base() {
        return None;
    }
    base.join(path.trim()).ok().map(String::from)
}
