//! The `Header` record and `HeaderList`: an ordered list that
//! preserves both original case and duplicate occurrences, plus a
//! lowercase-name lookup that merges duplicates with `", "`.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub name_lower: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let name_lower = name.to_ascii_lowercase();
        Header {
            name,
            name_lower,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HeaderList {
    ordered: Vec<Header>,
}

impl HeaderList {
    pub fn new() -> Self {
        HeaderList::default()
    }

    pub fn push(&mut self, header: Header) {
        self.ordered.push(header);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.ordered.iter()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn last_mut(&mut self) -> Option<&mut Header> {
        self.ordered.last_mut()
    }

    /// Merged value for a lowercase header name: duplicates joined with
    /// `", "`.
    pub fn get(&self, lower_name: &str) -> Option<String> {
        let mut values = self
            .ordered
            .iter()
            .filter(|h| h.name_lower == lower_name)
            .map(|h| h.value.as_str());
        let first = values.next()?;
        let mut merged = first.to_string();
        for v in values {
            merged.push_str(", ");
            merged.push_str(v);
        }
        Some(merged)
    }

    pub fn count(&self, lower_name: &str) -> usize {
        self.ordered
            .iter()
            .filter(|h| h.name_lower == lower_name)
            .count()
    }

    pub fn contains(&self, lower_name: &str) -> bool {
        self.count(lower_name) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_duplicates_with_comma_space() {
        let mut headers = HeaderList::new();
        headers.push(Header::new("X-Foo", "a"));
        headers.push(Header::new("x-foo", "b"));
        assert_eq!(headers.get("x-foo"), Some("a, b".to_string()));
        assert_eq!(headers.count("x-foo"), 2);
        // Original case of each occurrence is preserved.
        let names: Vec<&str> = headers.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["X-Foo", "x-foo"]);
    }

    #[test]
    fn missing_header_is_none() {
        let headers = HeaderList::new();
        assert_eq!(headers.get("host"), None);
        assert!(!headers.contains("host"));
    }
}
