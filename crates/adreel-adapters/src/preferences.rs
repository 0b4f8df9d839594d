//! Preference lookups against a PostgREST-style table.

use adreel_core::PreferenceStoreConfig;
use adreel_proto::{CampaignError, PreferenceStore, PreferenceValue, UserPreferences};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::Result;
use crate::http::{build_client, check_status, decode, transport_error, trim_base_url};

const SERVICE: &str = "preferences";

/// Columns describing the row rather than the user.
const BOOKKEEPING_COLUMNS: [&str; 4] = ["id", "user_id", "created_at", "updated_at"];

pub struct PostgrestPreferenceStore {
    client: Client,
    base_url: String,
    table: String,
    api_key: String,
}

impl PostgrestPreferenceStore {
    pub fn new(config: &PreferenceStoreConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: trim_base_url(&config.base_url),
            table: config.table.clone(),
            api_key,
        })
    }

    fn url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }
}

#[async_trait]
impl PreferenceStore for PostgrestPreferenceStore {
    async fn fetch(&self, user_id: &str) -> std::result::Result<Option<UserPreferences>, CampaignError> {
        debug!(user_id, table = %self.table, "Querying preference table");

        let response = self
            .client
            .get(self.url())
            .header("accept", "application/json")
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .query(&[("user_id", format!("eq.{user_id}")), ("limit", "1".to_string())])
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, &e))?;

        // 401/403/404 mean bad credentials or a misnamed table, so they are
        // rejected rather than retried. The orchestrator still falls back to
        // empty preferences.
        let response = check_status(SERVICE, response, |reason| {
            CampaignError::rejected(SERVICE, reason)
        })
        .await?;
        let rows: Vec<Map<String, Value>> =
            decode(response, |reason| CampaignError::rejected(SERVICE, reason)).await?;

        Ok(rows.into_iter().next().map(|row| row_to_preferences(user_id, row)))
    }
}

/// Converts one table row into preferences.
///
/// Nulls are dropped; arrays and objects are kept as their JSON text.
pub(crate) fn row_to_preferences(user_id: &str, row: Map<String, Value>) -> UserPreferences {
    let mut preferences = UserPreferences::empty(user_id);

    for (key, value) in row {
        if BOOKKEEPING_COLUMNS.contains(&key.as_str()) {
            continue;
        }
        let value = match value {
            Value::Null => continue,
            Value::Bool(b) => PreferenceValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => PreferenceValue::Int(i),
                None => PreferenceValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => PreferenceValue::Text(s),
            other @ (Value::Array(_) | Value::Object(_)) => PreferenceValue::Text(other.to_string()),
        };
        preferences.attributes.insert(key, value);
    }

    preferences
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_row_conversion() {
        let prefs = row_to_preferences(
            "u1",
            row(json!({
                "id": 7,
                "user_id": "u1",
                "tone": "playful",
                "age": 29,
                "budget": 12.5,
                "newsletter": true,
                "nickname": null,
                "sports": ["ski", "climb"],
            })),
        );

        assert_eq!(prefs.user_id, "u1");
        assert_eq!(prefs.attributes.len(), 5);
        assert_eq!(prefs.attributes["tone"], PreferenceValue::Text("playful".into()));
        assert_eq!(prefs.attributes["age"], PreferenceValue::Int(29));
        assert_eq!(prefs.attributes["budget"], PreferenceValue::Float(12.5));
        assert_eq!(prefs.attributes["newsletter"], PreferenceValue::Bool(true));
        assert_eq!(
            prefs.attributes["sports"],
            PreferenceValue::Text(r#"["ski","climb"]"#.into())
        );
        assert!(!prefs.attributes.contains_key("id"));
        assert!(!prefs.attributes.contains_key("nickname"));
    }

    #[test]
    fn test_row_with_only_bookkeeping_is_empty() {
        let prefs = row_to_preferences("u1", row(json!({"user_id": "u1", "created_at": "2024-01-01"})));
        assert!(prefs.is_empty());
    }

    #[test]
    fn test_url() {
        let store = PostgrestPreferenceStore::new(
            &PreferenceStoreConfig {
                base_url: "http://db.local/".to_string(),
                ..PreferenceStoreConfig::default()
            },
            "key".to_string(),
        )
        .unwrap();
        assert_eq!(store.url(), "http://db.local/rest/v1/user_preferences");
    }
}
