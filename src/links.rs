//! Shareable contract-call links.
//!
//! A developer turns a contract address, chain id, RPC endpoint and ABI into a
//! `/user?...` link. The ABI travels as standard base64 of its JSON text. The
//! reviewing side decodes the link, lists the callable functions and prepares
//! the call payload handed to the wallet for signing.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;
use url::Url;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid contract address: {0}")]
    InvalidContract(String),
    #[error("invalid chain id: {0}")]
    InvalidChainId(String),
    #[error("invalid RPC URL: {0}")]
    InvalidRpcUrl(String),
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("invalid ABI: {0}")]
    InvalidAbi(String),
    #[error("function {0} not found in ABI")]
    UnknownFunction(String),
    #[error("missing value for parameter {0}")]
    MissingParameter(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionLink {
    pub contract: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub abi: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiParam {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiFunction {
    pub name: String,
    pub inputs: Vec<AbiParam>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_mutability: Option<String>,
}

#[derive(Deserialize)]
struct AbiEntry {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    inputs: Vec<AbiParam>,
    #[serde(rename = "stateMutability", default)]
    state_mutability: Option<String>,
}

/// The payload a wallet signs for a single function call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedCall {
    pub chain_id: u64,
    pub rpc_url: String,
    pub contract: String,
    pub function_name: String,
    pub args: Vec<String>,
}

impl TransactionLink {
    pub fn new(contract: &str, chain_id: &str, rpc_url: &str, abi: &str) -> Result<Self, LinkError> {
        let contract = required("contract", contract)?;
        let chain_id = required("chainId", chain_id)?;
        let rpc_url = required("rpcUrl", rpc_url)?;
        let abi = required("abi", abi)?;

        if !is_valid_contract_address(contract) {
            return Err(LinkError::InvalidContract(contract.to_string()));
        }

        let chain_id = match chain_id.parse::<u64>() {
            Ok(id) if id > 0 => id,
            _ => return Err(LinkError::InvalidChainId(chain_id.to_string())),
        };

        let rpc = Url::parse(rpc_url).map_err(|e| LinkError::InvalidRpcUrl(e.to_string()))?;
        if rpc.scheme() != "http" && rpc.scheme() != "https" {
            return Err(LinkError::InvalidRpcUrl(format!(
                "unsupported scheme {}",
                rpc.scheme()
            )));
        }

        Ok(TransactionLink {
            contract: contract.to_string(),
            chain_id,
            rpc_url: rpc_url.to_string(),
            abi: parse_abi(abi)?,
        })
    }

    /// Render the link under `base_url`. The query is fully percent-encoded.
    pub fn encode(&self, base_url: &str) -> Result<String, LinkError> {
        let base = base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{}/user", base))
            .map_err(|e| LinkError::InvalidBaseUrl(e.to_string()))?;

        let abi_json = serde_json::to_string(&self.abi)
            .map_err(|e| LinkError::InvalidAbi(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("contract", &self.contract)
            .append_pair("chainId", &self.chain_id.to_string())
            .append_pair("rpcUrl", &self.rpc_url)
            .append_pair("abi", &STANDARD.encode(abi_json.as_bytes()));

        info!(
            "[links] generated link contract={}, chain_id={}, functions={}",
            self.contract,
            self.chain_id,
            self.functions().len()
        );
        Ok(url.to_string())
    }

    /// Parse a full link or a bare query string.
    pub fn decode(input: &str) -> Result<Self, LinkError> {
        let input = input.trim();
        let pairs: HashMap<String, String> = if input.starts_with("http://") || input.starts_with("https://") {
            let url = Url::parse(input).map_err(|e| LinkError::InvalidBaseUrl(e.to_string()))?;
            url.query_pairs().into_owned().collect()
        } else {
            url::form_urlencoded::parse(input.trim_start_matches('?').as_bytes())
                .into_owned()
                .collect()
        };
        debug!("[links] decoding link with {} query parameters", pairs.len());

        let field = |name: &'static str| pairs.get(name).map(String::as_str).unwrap_or("");

        // Links from generators that skip percent-encoding turn `+` into a space.
        let encoded_abi = required("abi", field("abi"))?.replace(' ', "+");
        let abi_bytes = STANDARD
            .decode(encoded_abi.as_bytes())
            .map_err(|e| LinkError::InvalidAbi(format!("bad base64: {}", e)))?;
        let abi_text = String::from_utf8(abi_bytes)
            .map_err(|e| LinkError::InvalidAbi(format!("not UTF-8: {}", e)))?;

        Self::new(field("contract"), field("chainId"), field("rpcUrl"), &abi_text)
    }

    pub fn functions(&self) -> Vec<AbiFunction> {
        self.abi
            .iter()
            .filter_map(|entry| serde_json::from_value::<AbiEntry>(entry.clone()).ok())
            .filter(|entry| entry.kind == "function" && !entry.name.is_empty())
            .map(|entry| AbiFunction {
                name: entry.name,
                inputs: entry.inputs,
                state_mutability: entry.state_mutability,
            })
            .collect()
    }

    /// Build the call for `function`. Arguments follow the ABI input order.
    /// Unnamed inputs are looked up by their position.
    pub fn prepare_call(
        &self,
        function: &str,
        params: &HashMap<String, String>,
    ) -> Result<PreparedCall, LinkError> {
        let func = self
            .functions()
            .into_iter()
            .find(|f| f.name == function)
            .ok_or_else(|| LinkError::UnknownFunction(function.to_string()))?;

        let mut args = Vec::with_capacity(func.inputs.len());
        for (i, input) in func.inputs.iter().enumerate() {
            let key = if input.name.is_empty() {
                i.to_string()
            } else {
                input.name.clone()
            };
            match params.get(&key) {
                Some(value) => args.push(value.clone()),
                None => {
                    warn!("[links] call to {} is missing parameter {}", function, key);
                    return Err(LinkError::MissingParameter(key));
                }
            }
        }

        Ok(PreparedCall {
            chain_id: self.chain_id,
            rpc_url: self.rpc_url.clone(),
            contract: self.contract.clone(),
            function_name: func.name,
            args,
        })
    }
}

fn required<'a>(name: &'static str, value: &'a str) -> Result<&'a str, LinkError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(LinkError::MissingField(name));
    }
    Ok(value)
}

static CONTRACT_ADDRESS: OnceLock<Regex> = OnceLock::new();

fn contract_address_re() -> &'static Regex {
    CONTRACT_ADDRESS.get_or_init(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("Invalid regex"))
}

fn is_valid_contract_address(address: &str) -> bool {
    contract_address_re().is_match(address)
}

/// Accepts a bare ABI array or a compiler artifact carrying an `abi` array.
fn parse_abi(text: &str) -> Result<Vec<Value>, LinkError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| LinkError::InvalidAbi(e.to_string()))?;
    match value {
        Value::Array(entries) => Ok(entries),
        Value::Object(mut obj) => match obj.remove("abi") {
            Some(Value::Array(entries)) => Ok(entries),
            _ => Err(LinkError::InvalidAbi("expected an array or an object with an abi array".to_string())),
        },
        _ => Err(LinkError::InvalidAbi("expected an array or an object with an abi array".to_string())),
    }
}
