//! Per-merchant allocation overrides, read from the store on demand.
//!
//! A merchant's config hash may carry two fields: `pool`, naming the
//! dedicated pool to try before anything else, and `fallback`, a JSON array
//! of tier names replacing the registry's default chain. Both are optional,
//! and an absent or unparseable config degrades to "no overrides" — a
//! merchant with a broken config still gets calls, just through the default
//! chain.

use result::Result;
use store::{Store, StoreKey};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MerchantConfig {
    pub pool: Option<String>,
    pub fallback: Vec<String>,
}

/// Looks up the overrides for one merchant. Only a store transport failure
/// is surfaced; a missing or malformed config is an empty one.
pub async fn lookup(store: &Store, merchant_id: &str) -> Result<MerchantConfig> {
    let key = store.key(StoreKey::MerchantConfig(merchant_id));
    let fields = store.hgetall(&key).await?;
    let mut config = MerchantConfig::default();
    if let Some(pool) = fields.get("pool") {
        if !pool.is_empty() {
            config.pool = Some(pool.clone());
        }
    }
    if let Some(raw) = fields.get("fallback") {
        match serde_json::from_str::<Vec<String>>(raw) {
            Ok(chain) => config.fallback = chain,
            Err(err) => debug!(
                "Merchant {} has an unparseable fallback chain ({}), ignoring it",
                merchant_id, err
            ),
        }
    }
    Ok(config)
}
