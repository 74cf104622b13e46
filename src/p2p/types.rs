//! Wire types of the P2P advertisement search endpoint

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /bapi/c2c/v2/friendly/c2c/adv/search`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub asset: String,
    pub fiat: String,
    pub trade_type: String,
    pub page: u32,
    pub rows: u32,
    pub pay_types: Vec<String>,
    pub countries: Vec<String>,
    pub publisher_type: Option<String>,
    pub pro_merchant_ads: bool,
}

/// Search response envelope. `data` is kept loosely typed so that one
/// malformed advertisement does not poison the whole page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Vec<Value>>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub success: Option<bool>,
}

impl SearchResponse {
    pub fn into_offers(self) -> Vec<RawOffer> {
        self.data
            .unwrap_or_default()
            .into_iter()
            .map(RawOffer::from_value)
            .collect()
    }
}

/// One entry of the `data` array, as untrusted as it arrives
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOffer {
    #[serde(default)]
    pub adv: Option<RawAdv>,
    #[serde(default)]
    pub advertiser: Option<RawAdvertiser>,
}

impl RawOffer {
    /// Lenient conversion: anything unrecognisable becomes an empty offer,
    /// which the extractor then drops.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    /// Convenience constructor used by fakes and tests
    pub fn with_price(price: impl Into<Value>, adv_no: impl Into<Value>) -> Self {
        Self {
            adv: Some(RawAdv {
                price: Some(price.into()),
                adv_no: Some(adv_no.into()),
                trade_type: None,
            }),
            advertiser: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAdv {
    /// Usually a decimal string such as `"36.52"`
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub adv_no: Option<Value>,
    #[serde(default)]
    pub trade_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAdvertiser {
    #[serde(default)]
    pub nick_name: Option<String>,
    #[serde(default)]
    pub user_no: Option<String>,
}
