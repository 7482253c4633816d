//! HTTP shims implementing the provider capability traits.
//!
//! Each shim owns its own circuit breaker: a ban from one host says nothing
//! about the others.

pub mod google_trends;
pub mod http;
pub mod newsapi;
pub mod yahoo;

pub use google_trends::GoogleTrendsProvider;
pub use http::HttpShim;
pub use newsapi::NewsApiProvider;
pub use yahoo::YahooProvider;

use crate::config::DataConfig;
use crate::data::ProviderError;

fn shim(config: &DataConfig) -> Result<HttpShim, ProviderError> {
    HttpShim::new(&config.http, HttpShim::breaker_from(&config.http))
}

pub fn yahoo(config: &DataConfig) -> Result<YahooProvider, ProviderError> {
    Ok(YahooProvider::new(shim(config)?))
}

pub fn google_trends(config: &DataConfig) -> Result<GoogleTrendsProvider, ProviderError> {
    Ok(GoogleTrendsProvider::new(shim(config)?, &config.trends))
}

pub fn newsapi(config: &DataConfig) -> Result<NewsApiProvider, ProviderError> {
    Ok(NewsApiProvider::new(shim(config)?, &config.news))
}
