use serde::{Deserialize, Serialize};

/// Body of every JSON response: `{data, message?, code?}`.
///
/// On success `data` carries the payload; on failure it is `null` and `code`
/// names the error class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            message: None,
            code: None,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            data: Some(data),
            message: Some(message.into()),
            code: None,
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            data: None,
            message: Some(message.into()),
            code: Some(code.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.code.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = ((total as f64) / (per_page as f64)).ceil() as i64;
        Self {
            items,
            total,
            page,
            per_page,
            total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            total_pages: self.total_pages,
        }
    }
}

/// Normalises `page`/`per_page` query values into `(page, per_page, offset)`.
pub fn page_window(page: Option<i64>, per_page: Option<i64>, default_per_page: i64) -> (i64, i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(default_per_page).clamp(1, 100);
    (page, per_page, (page - 1).saturating_mul(per_page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn huge_page_saturates_instead_of_overflowing() {
        let (page, per_page, offset) = page_window(Some(i64::MAX), Some(100), 20);
        assert_eq!(page, i64::MAX);
        assert_eq!(per_page, 100);
        assert_eq!(offset, i64::MAX);
    }

    #[test]
    fn success_body_omits_optional_fields() {
        let body = serde_json::to_value(ApiResponse::ok(5)).unwrap();
        assert_eq!(body, serde_json::json!({ "data": 5 }));
    }

    #[test]
    fn error_body_has_null_data() {
        let body = serde_json::to_value(ApiResponse::<()>::error("not_found", "missing")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "data": null, "message": "missing", "code": "not_found" })
        );
    }

    #[test]
    fn page_counts_partial_last_page() {
        let page = Page::new(vec![1, 2], 41, 3, 20);
        assert_eq!(page.total_pages, 3);
        assert_eq!(Page::<i32>::new(vec![], 0, 1, 20).total_pages, 0);
    }

    #[test]
    fn page_window_clamps_inputs() {
        assert_eq!(page_window(None, None, 20), (1, 20, 0));
        assert_eq!(page_window(Some(0), Some(500), 20), (1, 100, 0));
        assert_eq!(page_window(Some(3), Some(10), 20), (3, 10, 20));
    }
}
