//! P2P marketplace client
//!
//! - [`PageSource`]: one request for one page of advertisements
//! - [`P2pRestClient`]: the HTTP implementation against the marketplace
//! - [`PageFetcher`]: retry and backoff on top of any source
//! - [`OfferExtractor`]: raw advertisement to validated observation

pub mod extractor;
pub mod fetcher;
pub mod rest;
pub mod types;

pub use extractor::{OfferExtractor, PriceRange};
pub use fetcher::{backoff_delay, PageFetcher};
pub use rest::P2pRestClient;
pub use types::{RawAdv, RawAdvertiser, RawOffer, SearchRequest, SearchResponse};

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::SearchVariant;
use crate::error::FetchError;
use crate::types::Side;

/// A single-shot page request. Implementations do not retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch page `page` (1-based) of `side` with up to `rows` entries,
    /// searching with `variant`'s overrides
    async fn fetch_page(
        &self,
        side: Side,
        page: u32,
        rows: u32,
        variant: &SearchVariant,
    ) -> Result<Vec<RawOffer>, FetchError>;
}

#[async_trait]
impl<T: PageSource + ?Sized> PageSource for Arc<T> {
    async fn fetch_page(
        &self,
        side: Side,
        page: u32,
        rows: u32,
        variant: &SearchVariant,
    ) -> Result<Vec<RawOffer>, FetchError> {
        (**self).fetch_page(side, page, rows, variant).await
    }
}
