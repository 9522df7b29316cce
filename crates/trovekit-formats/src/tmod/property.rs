//! Container properties

/// Name/value metadata pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Property name
    pub name: String,
    /// Property value
    pub value: String,
}

impl Property {
    /// Create a property
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered property table
///
/// The wire format allows repeated names. Lookups return the last entry with a
/// name and [`set`](Self::set) replaces every existing entry, so the table
/// behaves as a map with last-write-wins semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties(Vec<Property>);

impl Properties {
    /// Empty table with room for `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Append without touching existing entries (wire order is preserved)
    pub fn push(&mut self, property: Property) {
        self.0.push(property);
    }

    /// Last property named `name`
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.0.iter().rev().find(|p| p.name == name)
    }

    /// Value of the last property named `name`
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(|p| p.value.as_str())
    }

    /// Replace every property named `name` with a single new entry at the end
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let property = Property::new(name, value);
        self.remove(&property.name);
        self.0.push(property);
    }

    /// Remove every property named `name`, returning whether any existed
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|p| p.name != name);
        self.0.len() != before
    }

    /// Iterate in stored order
    pub fn iter(&self) -> std::slice::Iter<'_, Property> {
        self.0.iter()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Property>> for Properties {
    fn from(properties: Vec<Property>) -> Self {
        Self(properties)
    }
}

impl<'a> IntoIterator for &'a Properties {
    type Item = &'a Property;
    type IntoIter = std::slice::Iter<'a, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let mut properties = Properties::from(vec![
            Property::new("title", "Old"),
            Property::new("author", "Alice"),
            Property::new("title", "Older duplicate"),
        ]);
        assert_eq!(properties.value("title"), Some("Older duplicate"));

        properties.set("title", "New");
        assert_eq!(properties.len(), 2);
        assert_eq!(properties.value("title"), Some("New"));
        assert_eq!(
            properties.iter().last().map(|p| p.name.as_str()),
            Some("title")
        );
    }

    #[test]
    fn test_remove() {
        let mut properties = Properties::default();
        properties.set("notes", "x");
        assert!(properties.remove("notes"));
        assert!(!properties.remove("notes"));
        assert!(properties.is_empty());
    }
}
