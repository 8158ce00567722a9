//! Gmail labels and their `/`-separated hierarchy.

/// A Gmail label attached to a message.
///
/// Labels replace the one-folder-per-message model: a message carries a set
/// of them, and `/`-separated segments denote a hierarchy (`Work/Projects`
/// is a child of `Work`). System labels arrive from the wire as
/// backslash-prefixed atoms (`\Inbox`, `\Sent`); they always exist remotely
/// and are never created by us.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(String);

/// Namespace prefixes reserved by the server for its own folders.
const RESERVED_PREFIXES: &[&str] = &["[Gmail]", "[Google Mail]"];

impl Label {
    /// Creates a label from its display name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the label text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for backslash-prefixed system labels (`\Inbox`, `\Starred`).
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.0.starts_with('\\')
    }

    /// True when the label collides with a server-reserved folder namespace
    /// and must be remapped before a folder can be created for it.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        RESERVED_PREFIXES
            .iter()
            .any(|p| self.0 == *p || self.0.starts_with(&format!("{p}/")))
    }

    /// Remaps a reserved label to a safe alias the server will accept as a
    /// folder name. Non-reserved labels are returned unchanged.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        if !self.is_reserved() {
            return self.clone();
        }
        let stripped: String = self
            .0
            .chars()
            .filter(|c| *c != '[' && *c != ']')
            .collect();
        Self(format!("label_{stripped}"))
    }

    /// Yields the proper ancestors of this label, parent before child.
    ///
    /// `A/B/C` yields `A`, then `A/B`. The wire protocol creates one folder
    /// level per command, so creation must walk this chain first.
    #[must_use]
    pub fn ancestors(&self) -> Vec<Self> {
        let mut out = Vec::new();
        let mut prefix = String::new();
        let Some((parents, _leaf)) = self.0.rsplit_once('/') else {
            return out;
        };
        for segment in parents.split('/') {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
            out.push(Self(prefix.clone()));
        }
        out
    }

    /// Ancestors followed by the label itself, parent before child.
    #[must_use]
    pub fn hierarchy(&self) -> Vec<Self> {
        let mut chain = self.ancestors();
        chain.push(self.clone());
        chain
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestors_are_parent_first() {
        let label = Label::new("Work/Projects/Alpha");
        let chain: Vec<String> = label.ancestors().iter().map(ToString::to_string).collect();
        assert_eq!(chain, ["Work", "Work/Projects"]);
    }

    #[test]
    fn hierarchy_includes_self_last() {
        let label = Label::new("Work/Projects/Alpha");
        assert_eq!(label.hierarchy().len(), 3);
        assert_eq!(label.hierarchy()[2], label);
    }

    #[test]
    fn top_level_label_has_no_ancestors() {
        assert!(Label::new("Receipts").ancestors().is_empty());
    }

    #[test]
    fn reserved_namespace_is_detected() {
        assert!(Label::new("[Gmail]/Drafts").is_reserved());
        assert!(Label::new("[Google Mail]/Spam").is_reserved());
        assert!(!Label::new("Gmail stuff").is_reserved());
        // Only a real namespace prefix counts, not a substring.
        assert!(!Label::new("x[Gmail]/y").is_reserved());
    }

    #[test]
    fn sanitized_remaps_reserved_only() {
        assert_eq!(
            Label::new("[Gmail]/Drafts").sanitized().as_str(),
            "label_Gmail/Drafts"
        );
        assert_eq!(Label::new("Work").sanitized().as_str(), "Work");
    }

    #[test]
    fn system_labels_are_backslash_atoms() {
        assert!(Label::new("\\Inbox").is_system());
        assert!(!Label::new("Inbox").is_system());
    }
}
