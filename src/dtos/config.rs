use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ConfigEntryRequest {
    pub key: String,
    pub value: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateConfigValueRequest {
    pub value: String,
    pub description: Option<String>,
}
