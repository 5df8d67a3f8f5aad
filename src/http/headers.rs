//! Case-insensitive header map.

/// Header map with case-insensitive names.
///
/// Names compare ASCII case-insensitively; the observable casing is
/// whatever the most recent `set` used. Multi-valued headers are stored
/// as repeated entries under the same name.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Set a header, replacing every existing entry with that name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.entries.push((name, value.into()));
    }

    /// Add an entry without touching existing ones with the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value recorded for a name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value recorded for a name, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Remove every entry with the given name.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Copy entries from `other` whose names are absent here.
    ///
    /// Existing entries always win, so caller-supplied headers are never
    /// overwritten by derived ones.
    pub fn merge_missing(&mut self, other: &HeaderMap) {
        let existing = self.entries.len();
        for (name, value) in &other.entries {
            let present = self.entries[..existing]
                .iter()
                .any(|(n, _)| n.eq_ignore_ascii_case(name));
            if !present {
                self.entries.push((name.clone(), value.clone()));
            }
        }
    }

    /// All entries as `(name, value)` pairs with their stored casing.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of entries, counting repeats.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = HeaderMap::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}
