use serde::{Deserialize, Serialize};

/// Standard paginated list envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page() {
        let json = r#"{"count": 41, "next": "https://api.example.com/api/orders/?page=2", "previous": null, "results": [{"id": 1}, {"id": 2}]}"#;
        let page: Paginated<serde_json::Value> =
            serde_json::from_str(json).expect("Failed to parse page test JSON");
        assert_eq!(page.count, 41);
        assert_eq!(page.results.len(), 2);
        assert!(page.has_more());
    }
}
