//! API client for the school data service.
//!
//! All endpoints are simple GET requests with query parameters and JSON
//! bodies. Rate-limited requests (429) are retried with exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{ApiError, MealQuery, SchoolApi, ScheduleQuery};
use crate::models::{Cell, MealRecord, ScheduleRecord, School};

// ============================================================================
// Constants
// ============================================================================

/// Default base URL of the school data service
pub const DEFAULT_BASE_URL: &str = "https://api.schoolday.app";

/// HTTP request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

type Query = Vec<(&'static str, String)>;

/// API client for the school data service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    initial_backoff: Duration,
}

impl ApiClient {
    /// Create a client for the default service
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(DEFAULT_BASE_URL, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Override the first rate-limit backoff delay
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a GET, retrying while the service answers 429.
    /// Any other status is returned to the caller.
    async fn send(&self, path: &str, query: &Query) -> Result<Response, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let response = self.client.get(&url).query(query).send().await?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }

            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Err(ApiError::RateLimited);
            }
            warn!(
                url = %url,
                retry = retries,
                backoff_ms = backoff.as_millis() as u64,
                "Rate limited, backing off"
            );
            tokio::time::sleep(backoff).await;
            backoff *= 2; // Exponential backoff
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response, path: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse {}: {}", path, e)))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: Query) -> Result<T, ApiError> {
        let response = self.send(path, &query).await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }
        Self::decode(response, path).await
    }

    /// GET a list; a non-success status means nothing was published.
    async fn get_list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Query,
    ) -> Result<Vec<T>, ApiError> {
        let response = self.send(path, &query).await?;
        if !response.status().is_success() {
            debug!(path, status = %response.status(), "No data published");
            return Ok(Vec::new());
        }
        Self::decode(response, path).await
    }
}

fn school_query(
    school_code: &str,
    region_code: &str,
    year: i32,
    month: u32,
    day: Option<u32>,
) -> Query {
    let mut query = vec![
        ("schoolCode", school_code.to_string()),
        ("regionCode", region_code.to_string()),
        ("year", year.to_string()),
        ("month", month.to_string()),
    ];
    if let Some(day) = day {
        query.push(("day", day.to_string()));
    }
    query
}

#[async_trait]
impl SchoolApi for ApiClient {
    async fn fetch_meal(&self, q: &MealQuery) -> Result<Vec<MealRecord>, ApiError> {
        let school = &q.school;
        let mut query =
            school_query(&school.school_id, &school.region_id, q.year, q.month, q.day);
        query.push(("showAllergy", q.show_allergy.to_string()));
        query.push(("showOrigin", q.show_origin.to_string()));
        query.push(("showNutrition", q.show_nutrition.to_string()));
        self.get_list("/api/meal", query).await
    }

    async fn fetch_schedule(&self, q: &ScheduleQuery) -> Result<Vec<ScheduleRecord>, ApiError> {
        let query = school_query(&q.school.school_id, &q.school.region_id, q.year, q.month, q.day);
        self.get_list("/api/schedule", query).await
    }

    async fn fetch_timetable(
        &self,
        school_id: &str,
        grade: u32,
        class_num: u32,
    ) -> Result<Vec<Vec<Cell>>, ApiError> {
        let query = vec![
            ("schoolCode", school_id.to_string()),
            ("grade", grade.to_string()),
            ("classNum", class_num.to_string()),
        ];
        self.get("/api/timetable", query).await
    }

    async fn search_schools(&self, name: &str) -> Result<Vec<School>, ApiError> {
        self.get_list("/api/search", vec![("schoolName", name.to_string())]).await
    }
}
