//! Ordered list of recipient names driving the batch export.

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
/// Insertion-ordered name strings. Duplicates are allowed; removal is by
/// value and drops every matching entry.
pub struct NameList {
    entries: Vec<String>,
}

impl NameList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a name from the pending-name buffer. Empty strings are kept;
    /// any UTF-8 text is a valid name.
    pub fn append(&mut self, name: impl Into<String>) {
        self.entries.push(name.into());
    }

    /// Remove every entry equal to `name`. Returns how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|n| n != name);
        before - self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.entries.iter()
    }
}

impl<S: Into<String>> FromIterator<S> for NameList {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().map(Into::into).collect(),
        }
    }
}
