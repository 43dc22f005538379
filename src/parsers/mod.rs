pub mod lcov;

/// Repository-root prefix stripped from LCOV `SF:` paths. Stored with
/// forward slashes and a trailing `/` so stripping never leaves a leading
/// separator behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPrefix(String);

impl RootPrefix {
    /// Returns `None` for an empty prefix.
    pub fn new(prefix: &str) -> Option<Self> {
        let mut prefix = prefix.trim().replace('\\', "/");
        if prefix.is_empty() {
            return None;
        }
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        Some(Self(prefix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Convert backslashes to forward slashes, then strip the root prefix if
/// the path starts with it.
pub fn normalize_path(raw: &str, prefix: Option<&RootPrefix>) -> String {
    let path = raw.replace('\\', "/");
    match prefix.and_then(|p| path.strip_prefix(p.as_str())) {
        Some(rest) => rest.to_string(),
        None => path,
    }
}
