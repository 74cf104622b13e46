//! P2P REST API client
//!
//! Talks to the public advertisement search endpoint
//! (`/bapi/c2c/v2/friendly/c2c/adv/search`). No authentication needed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE},
    Client, StatusCode,
};

use super::types::{RawOffer, SearchRequest, SearchResponse};
use super::PageSource;
use crate::config::{MarketplaceConfig, SearchVariant};
use crate::error::FetchError;
use crate::types::Side;

/// REST client for the P2P advertisement search
pub struct P2pRestClient {
    client: Client,
    url: String,
    asset: String,
    fiat: String,
    pay_types: Vec<String>,
    countries: Vec<String>,
    publisher_type: Option<String>,
    pro_merchant_ads: bool,
}

impl P2pRestClient {
    pub fn new(config: &MarketplaceConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .pool_max_idle_per_host(10)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url: config.url.clone(),
            asset: config.asset.clone(),
            fiat: config.fiat.clone(),
            pay_types: config.pay_types.clone(),
            countries: config.countries.clone(),
            publisher_type: config.publisher_type.clone(),
            pro_merchant_ads: config.pro_merchant_ads,
        })
    }

    /// Request body for one page, with `variant` overriding the configured filters
    pub fn search_request(
        &self,
        side: Side,
        page: u32,
        rows: u32,
        variant: &SearchVariant,
    ) -> SearchRequest {
        SearchRequest {
            asset: self.asset.clone(),
            fiat: self.fiat.clone(),
            trade_type: side.trade_type().to_string(),
            page,
            rows,
            pay_types: variant
                .pay_types
                .clone()
                .unwrap_or_else(|| self.pay_types.clone()),
            countries: self.countries.clone(),
            publisher_type: self.publisher_type.clone(),
            pro_merchant_ads: variant.pro_merchant_ads.unwrap_or(self.pro_merchant_ads),
        }
    }
}

#[async_trait]
impl PageSource for P2pRestClient {
    async fn fetch_page(
        &self,
        side: Side,
        page: u32,
        rows: u32,
        variant: &SearchVariant,
    ) -> Result<Vec<RawOffer>, FetchError> {
        let body = self.search_request(side, page, rows, variant);

        let response = self.client.post(&self.url).json(&body).send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            return Err(FetchError::Http(status.as_u16()));
        }

        let parsed: SearchResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Decode(e.to_string())
            }
        })?;

        if parsed.success == Some(false) {
            tracing::debug!(
                side = %side,
                page,
                variant = %variant.name,
                code = parsed.code.as_deref().unwrap_or(""),
                message = parsed.message.as_deref().unwrap_or(""),
                "Marketplace reported an unsuccessful search"
            );
        }

        Ok(parsed.into_offers())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, Profile};

    fn client() -> P2pRestClient {
        let cfg = AppConfig::from_profile(Profile::Enhanced).unwrap();
        P2pRestClient::new(&cfg.marketplace).unwrap()
    }

    #[test]
    fn test_search_request_follows_side_and_page() {
        let client = client();
        let req = client.search_request(Side::Buy, 7, 20, &SearchVariant::regular());
        assert_eq!(req.trade_type, "BUY");
        assert_eq!(req.page, 7);
        assert_eq!(req.asset, "USDT");
        assert_eq!(req.fiat, "VES");
        assert!(!req.pro_merchant_ads);
        assert!(req.pay_types.is_empty());
    }

    #[test]
    fn test_search_variant_overrides_filters() {
        let mut cfg = AppConfig::from_profile(Profile::Exhaustive).unwrap();
        cfg.marketplace.pay_types = vec!["PAGO_MOVIL".to_string()];
        let client = P2pRestClient::new(&cfg.marketplace).unwrap();

        let regular = client.search_request(Side::Sell, 1, 20, &SearchVariant::regular());
        assert_eq!(regular.pay_types, ["PAGO_MOVIL"]);
        assert!(!regular.pro_merchant_ads);

        let pro = client.search_request(Side::Sell, 1, 20, &SearchVariant::pro_merchant());
        assert!(pro.pro_merchant_ads);
        assert!(pro.pay_types.is_empty());

        let cash = SearchVariant::pay_types("cash", &["CASH"]);
        let req = client.search_request(Side::Sell, 1, 20, &cash);
        assert_eq!(req.pay_types, ["CASH"]);
        assert!(!req.pro_merchant_ads);
    }

    #[tokio::test]
    #[ignore] // hits the live marketplace
    async fn test_live_first_page() {
        let offers = client()
            .fetch_page(Side::Sell, 1, 20, &SearchVariant::regular())
            .await
            .unwrap();
        assert!(offers.len() <= 20);
    }
}
