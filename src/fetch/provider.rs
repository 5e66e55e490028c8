use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::config::ProviderSettings;
use crate::error::{AppError, Context};
use crate::fetch::normalize::{find_value, value_to_f64};
use crate::fetch::FetchResult;

const TOTAL_RESULTS_ALIASES: &[&str] = &["totalResultCount", "totalResults", "resultCount"];
const TOTAL_PAGES_ALIASES: &[&str] = &["totalPages", "pageCount", "pages"];
const CURRENT_PAGE_ALIASES: &[&str] = &["page", "currentPage", "pageIndex"];

/// One page of raw provider records for one stay-date, plus whatever
/// pagination metadata the provider chose to embed.
#[derive(Debug, Clone)]
pub struct PageResult {
    pub records: Vec<Value>,
    pub page: u32,
    pub total_pages: Option<u32>,
    pub total_results: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct AccountStatus {
    pub plan_limit: u32,
    pub used: u32,
    pub remaining: u32,
}

/// Seam between the orchestrator and the metered endpoint, so collection
/// runs can be driven against a scripted source in tests.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// One metered call: all rates the provider returns for `date` on the
    /// given zero-based page.
    async fn fetch_page(&self, date: NaiveDate, page: u32) -> FetchResult<PageResult>;

    /// Plan limit / used / remaining from the provider's free status
    /// endpoint. Does not consume a credit.
    async fn account_status(&self) -> FetchResult<AccountStatus>;
}

/// Live client against the pricing provider endpoint.
pub struct HttpPriceSource {
    client: Client,
    settings: ProviderSettings,
    api_key: String,
}

impl HttpPriceSource {
    pub fn new(settings: ProviderSettings, api_key: String) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to construct pricing HTTP client")?;
        Ok(Self {
            client,
            settings,
            api_key,
        })
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    async fn fetch_page(&self, date: NaiveDate, page: u32) -> FetchResult<PageResult> {
        let check_out = date
            .succ_opt()
            .ok_or_else(|| AppError::message("Stay-date has no following day"))?;

        let response = self
            .client
            .get(&self.settings.base_url)
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("checkin", date.format("%Y-%m-%d").to_string()),
                ("checkout", check_out.format("%Y-%m-%d").to_string()),
                ("adults", self.settings.adults.to_string()),
                ("currency", self.settings.currency.clone()),
                ("page", page.to_string()),
            ])
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                return Err(AppError::message(format!(
                    "Rate request failed for {} page {}: {}",
                    date, page, err
                )))
            }
        };

        match response.status() {
            StatusCode::FORBIDDEN => return Err(AppError::QuotaExhausted),
            StatusCode::NOT_FOUND => return Err(AppError::InvalidCredential),
            status if !status.is_success() => {
                return Err(AppError::message(format!(
                    "Rate request for {} page {} returned status {}",
                    date, page, status
                )))
            }
            _ => {}
        }

        let payload: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to decode rate payload for {}", date))?;

        parse_page_payload(payload, page)
    }

    async fn account_status(&self) -> FetchResult<AccountStatus> {
        let response = self
            .client
            .get(&self.settings.status_url)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .context("Account status request failed")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::InvalidCredential);
        }
        if !response.status().is_success() {
            return Err(AppError::message(format!(
                "Account status request returned status {}",
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .context("Failed to decode account status payload")?;
        parse_account_status(&payload)
    }
}

/// Split a raw payload into records and pagination metadata. The provider
/// returns either a JSON array of hotel records, possibly ending in a
/// metadata sentinel object, or an object with an `error` field.
pub fn parse_page_payload(payload: Value, page: u32) -> FetchResult<PageResult> {
    if let Some(object) = payload.as_object() {
        if let Some(error) = object.get("error") {
            return Err(classify_error_body(error));
        }
        return Err(AppError::message(
            "Rate payload was an object without an error field",
        ));
    }

    let Some(items) = payload.as_array() else {
        return Err(AppError::message("Rate payload was neither array nor object"));
    };

    let mut records: Vec<Value> = items.to_vec();
    let mut total_pages = None;
    let mut total_results = None;
    let mut current_page = page;

    if let Some(sentinel) = records.last().and_then(as_pagination_sentinel) {
        total_results = find_value(&sentinel, TOTAL_RESULTS_ALIASES)
            .and_then(value_to_f64)
            .map(|v| v as u32);
        total_pages = find_value(&sentinel, TOTAL_PAGES_ALIASES)
            .and_then(value_to_f64)
            .map(|v| v as u32);
        if let Some(reported) = find_value(&sentinel, CURRENT_PAGE_ALIASES).and_then(value_to_f64)
        {
            current_page = reported as u32;
        }
        records.pop();
    }

    Ok(PageResult {
        records,
        page: current_page,
        total_pages,
        total_results,
    })
}

/// The sentinel is an object carrying pagination counters and no hotel
/// fields; a record with a name or a price is never treated as one.
fn as_pagination_sentinel(value: &Value) -> Option<serde_json::Map<String, Value>> {
    let object = value.as_object()?;
    let has_counters = find_value(object, TOTAL_RESULTS_ALIASES).is_some()
        || find_value(object, TOTAL_PAGES_ALIASES).is_some();
    if !has_counters {
        return None;
    }
    let looks_like_record = find_value(object, &["name", "hotelName", "propertyName"]).is_some();
    if looks_like_record {
        return None;
    }
    Some(object.clone())
}

fn classify_error_body(error: &Value) -> AppError {
    let text = match error {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let lowered = text.to_lowercase();
    if lowered.contains("quota") || lowered.contains("limit") || lowered.contains("credit") {
        AppError::QuotaExhausted
    } else if lowered.contains("key") || lowered.contains("credential") || lowered.contains("auth")
    {
        AppError::InvalidCredential
    } else {
        AppError::message(format!("Provider error: {}", text))
    }
}

fn parse_account_status(payload: &Value) -> FetchResult<AccountStatus> {
    let object = payload
        .as_object()
        .ok_or_else(|| AppError::message("Account status payload was not an object"))?;

    let read = |aliases: &[&str]| -> FetchResult<u32> {
        find_value(object, aliases)
            .and_then(value_to_f64)
            .map(|v| v as u32)
            .ok_or_else(|| {
                AppError::message(format!("Account status field {:?} missing", aliases[0]))
            })
    };

    let plan_limit = read(&["planLimit", "limit", "quota"])?;
    let used = read(&["used", "usedCredits", "callsUsed"])?;
    let remaining = match find_value(object, &["remaining", "remainingCredits", "creditsLeft"])
        .and_then(value_to_f64)
    {
        Some(value) => value as u32,
        None => plan_limit.saturating_sub(used),
    };

    Ok(AccountStatus {
        plan_limit,
        used,
        remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trailing_sentinel_yields_pagination_metadata() {
        let payload = json!([
            {"name": "Hotel A", "price": 90.0},
            {"name": "Hotel B", "price": 110.0},
            {"totalResultCount": 48, "totalPages": 3, "page": 0}
        ]);

        let page = parse_page_payload(payload, 0).unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.total_results, Some(48));
        assert_eq!(page.total_pages, Some(3));
        assert_eq!(page.page, 0);
    }

    #[test]
    fn payload_without_sentinel_keeps_every_record() {
        let payload = json!([
            {"name": "Hotel A", "price": 90.0},
            {"name": "Hotel B", "price": 110.0}
        ]);

        let page = parse_page_payload(payload, 2).unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.page, 2);
        assert!(page.total_pages.is_none());
    }

    #[test]
    fn a_record_with_counters_and_a_name_is_not_a_sentinel() {
        let payload = json!([
            {"name": "Totals Hotel", "price": 80.0, "totalPages": 9}
        ]);

        let page = parse_page_payload(payload, 0).unwrap();
        assert_eq!(page.records.len(), 1);
        assert!(page.total_pages.is_none());
    }

    #[test]
    fn error_objects_are_classified() {
        let quota = parse_page_payload(json!({"error": "monthly credit limit reached"}), 0);
        assert!(matches!(quota, Err(AppError::QuotaExhausted)));

        let credential = parse_page_payload(json!({"error": "invalid API key"}), 0);
        assert!(matches!(credential, Err(AppError::InvalidCredential)));

        let transient = parse_page_payload(json!({"error": "upstream timeout"}), 0);
        assert!(matches!(transient, Err(AppError::Message(_))));
    }

    #[test]
    fn account_status_fills_remaining_from_limit_and_used() {
        let status = parse_account_status(&json!({"plan_limit": 500, "used": 120})).unwrap();
        assert_eq!(status.plan_limit, 500);
        assert_eq!(status.used, 120);
        assert_eq!(status.remaining, 380);

        let explicit =
            parse_account_status(&json!({"limit": 500, "used": 120, "remaining": 350})).unwrap();
        assert_eq!(explicit.remaining, 350);
    }
}
