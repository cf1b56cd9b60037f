//! HTTP handlers for the native JSON API, the S3-compatible API, and
//! health probes.

pub mod auth;
pub mod bucket_handlers;
pub mod file_handlers;
pub mod health_handlers;
pub mod s3_handlers;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_LIMIT: usize = 50;
pub const MAX_PAGE_LIMIT: usize = 100;

/// `?limit=&offset=` for native list endpoints. Values outside the accepted
/// range fall back to the defaults instead of failing the request.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub prefix: Option<String>,
}

impl PageQuery {
    pub fn bounds(&self) -> (usize, usize) {
        let limit = self
            .limit
            .as_deref()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|l| (1..=MAX_PAGE_LIMIT).contains(l))
            .unwrap_or(DEFAULT_PAGE_LIMIT);
        let offset = self
            .offset
            .as_deref()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        (limit, offset)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(limit: Option<&str>, offset: Option<&str>) -> PageQuery {
        PageQuery {
            limit: limit.map(String::from),
            offset: offset.map(String::from),
            prefix: None,
        }
    }

    #[test]
    fn page_bounds_fall_back_on_bad_input() {
        assert_eq!(query(None, None).bounds(), (50, 0));
        assert_eq!(query(Some("10"), Some("20")).bounds(), (10, 20));
        assert_eq!(query(Some("0"), Some("-1")).bounds(), (50, 0));
        assert_eq!(query(Some("101"), Some("x")).bounds(), (50, 0));
        assert_eq!(query(Some("100"), None).bounds(), (100, 0));
    }
}
