use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::telemetry::ALL_PAGES;

fn default_range() -> String {
    "hour".to_string()
}

fn default_page() -> String {
    ALL_PAGES.to_string()
}

#[derive(Deserialize)]
pub struct RecordBody {
    #[serde(default)]
    pub page: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Deserialize)]
pub struct StatsQuery {
    #[serde(default = "default_range")]
    pub range: String,
    #[serde(default = "default_page")]
    pub page: String,
}

#[derive(Deserialize)]
pub struct PixelQuery {
    #[serde(default)]
    pub page: String,
}

/// `chainId` may arrive as a number or a string and `abi` as JSON or as the
/// raw JSON text, so both stay loosely typed until the handler reads them.
#[derive(Deserialize)]
pub struct LinkBody {
    #[serde(default)]
    pub contract: String,
    #[serde(rename = "chainId", default)]
    pub chain_id: Value,
    #[serde(rename = "rpcUrl", default)]
    pub rpc_url: String,
    #[serde(default)]
    pub abi: Value,
}

impl LinkBody {
    pub fn chain_id_text(&self) -> String {
        match &self.chain_id {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        }
    }

    pub fn abi_text(&self) -> String {
        match &self.abi {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Deserialize)]
pub struct CallBody {
    pub link: String,
    pub function: String,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_query_defaults() {
        let q: StatsQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.range, "hour");
        assert_eq!(q.page, "all");
    }

    #[test]
    fn record_body_allows_missing_fields() {
        let b: RecordBody = serde_json::from_str("{}").unwrap();
        assert!(b.page.is_empty());
        assert!(b.timestamp.is_none());
    }

    #[test]
    fn link_body_accepts_numeric_chain_and_inline_abi() {
        let b: LinkBody = serde_json::from_str(
            r#"{"contract":"0xabc","chainId":137,"rpcUrl":"https://rpc","abi":[{"type":"function"}]}"#,
        )
        .unwrap();
        assert_eq!(b.chain_id_text(), "137");
        assert_eq!(b.abi_text(), r#"[{"type":"function"}]"#);
    }

    #[test]
    fn link_body_accepts_string_forms() {
        let b: LinkBody =
            serde_json::from_str(r#"{"chainId":"1","abi":"[]"}"#).unwrap();
        assert_eq!(b.chain_id_text(), "1");
        assert_eq!(b.abi_text(), "[]");
        assert!(b.contract.is_empty());
    }
}
