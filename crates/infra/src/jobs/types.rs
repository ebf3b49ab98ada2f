//! Store-facing job types: update payloads and paging.

use serde::{Deserialize, Serialize};

use jobflow_core::Job;

/// Default page size when the caller's limit is out of range.
pub const DEFAULT_PAGE_SIZE: u32 = 10;
/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// What a guarded write does to `error_message`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ErrorUpdate {
    #[default]
    Keep,
    Set(String),
    Clear,
}

/// Non-status fields a guarded write may change alongside the status.
///
/// `Keep` / `None` leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobUpdate {
    pub error_message: ErrorUpdate,
    pub retry_count: Option<u32>,
}

impl JobUpdate {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_error(message: impl Into<String>) -> Self {
        Self {
            error_message: ErrorUpdate::Set(message.into()),
            retry_count: None,
        }
    }

    /// Drop any error left over from an earlier attempt.
    pub fn clear_error() -> Self {
        Self {
            error_message: ErrorUpdate::Clear,
            retry_count: None,
        }
    }

    pub fn with_retry_count(retry_count: u32) -> Self {
        Self {
            error_message: ErrorUpdate::Keep,
            retry_count: Some(retry_count),
        }
    }
}

/// Requested page of jobs, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    pub page: i64,
    pub limit: i64,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE as i64,
        }
    }
}

impl ListQuery {
    pub fn new(page: i64, limit: i64) -> Self {
        Self { page, limit }
    }

    /// Clamp to a usable page: `page < 1` becomes 1, a limit outside
    /// `1..=100` becomes the default of 10.
    pub fn normalize(self) -> (u32, u32) {
        let page = if self.page < 1 {
            1
        } else {
            u32::try_from(self.page).unwrap_or(u32::MAX)
        };
        let limit = if (1..=MAX_PAGE_SIZE as i64).contains(&self.limit) {
            self.limit as u32
        } else {
            DEFAULT_PAGE_SIZE
        };
        (page, limit)
    }
}

/// One page of jobs, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalize_clamps_out_of_range_values() {
        assert_eq!(ListQuery::new(0, 0).normalize(), (1, 10));
        assert_eq!(ListQuery::new(-4, 101).normalize(), (1, 10));
        assert_eq!(ListQuery::new(3, 100).normalize(), (3, 100));
        assert_eq!(ListQuery::new(2, 1).normalize(), (2, 1));
    }

    #[test]
    fn default_query_is_first_page() {
        assert_eq!(ListQuery::default().normalize(), (1, DEFAULT_PAGE_SIZE));
    }

    proptest! {
        /// Property: any caller input normalizes into the accepted range.
        #[test]
        fn normalized_query_is_always_in_range(page in any::<i64>(), limit in any::<i64>()) {
            let (page, limit) = ListQuery::new(page, limit).normalize();
            prop_assert!(page >= 1);
            prop_assert!((1..=MAX_PAGE_SIZE).contains(&limit));
        }
    }
}
