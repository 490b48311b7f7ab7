use std::fmt;

/// Address of one remote document: an ordered list of
/// (collection, document) segment pairs.
///
/// Built by construction starting from a root segment, so a path can never
/// be empty and never ends on a bare collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath {
    segments: Vec<(String, String)>,
}

impl DocPath {
    pub fn new(collection: impl Into<String>, document: impl Into<String>) -> Self {
        Self {
            segments: vec![(collection.into(), document.into())],
        }
    }

    /// Descend one collection/document level.
    pub fn sub(mut self, collection: impl Into<String>, document: impl Into<String>) -> Self {
        self.segments.push((collection.into(), document.into()));
        self
    }

    /// The per-device state document: `users/{user}/devices/{device}`.
    pub fn device(user_id: &str, device_id: &str) -> Self {
        Self::new("users", user_id).sub("devices", device_id)
    }

    pub fn segments(&self) -> &[(String, String)] {
        &self.segments
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (collection, document)) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}/{}", collection, document)?;
        }
        Ok(())
    }
}
