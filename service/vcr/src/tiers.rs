//! The tier registry: the process-local, hot-reloadable copy of the tier
//! table and the default fallback chain.
//!
//! Every replica bootstraps the table from the `TIER_CONFIG_JSON`
//! environment blob, publishes it to the store with set-if-absent semantics
//! (so the first replica to ever boot seeds the store, and everybody
//! thereafter inherits the store's copy), and then re-reads the store every
//! thirty seconds. Operators reconfigure tiers by writing the store key
//! directly; replicas converge on the next refresh tick.
//!
//! Pools named `merchant:{id}` are deliberately NOT part of the tier map.
//! They are routed into their own table during normalization, never appear
//! in the default chain, and are always exclusive.

use crate::env;
use result::Result;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use store::{Store, StoreKey};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TierKind {
    Exclusive,
    Shared,
}

impl TierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::Exclusive => "exclusive",
            TierKind::Shared => "shared",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tier {
    pub kind: TierKind,
    pub target: u32,
    pub max_concurrent: u32,
}

/// One immutable snapshot of the tier configuration. Accessors hand out
/// clones of this, so no caller ever holds the registry lock across I/O.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TierTable {
    pub tiers: BTreeMap<String, Tier>,
    /// `merchant:{id}` → dedicated capacity target.
    pub merchant_tiers: BTreeMap<String, u32>,
    pub default_chain: Vec<String>,
}

impl TierTable {
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty() && self.merchant_tiers.is_empty()
    }

    pub fn kind_of(&self, tier: &str) -> Option<TierKind> {
        self.tiers.get(tier).map(|t| t.kind)
    }

    pub fn max_concurrent(&self, tier: &str) -> u32 {
        self.tiers.get(tier).map(|t| t.max_concurrent).unwrap_or(0)
    }
}

////////////////////////////////////////////////////////////////////////////
// Parsing
////////////////////////////////////////////////////////////////////////////

/// The raw shape of one tier entry as operators write it. `kind` stays a
/// free string here because an unrecognized kind must degrade to exclusive
/// rather than fail the whole table.
#[derive(Deserialize)]
struct RawTier {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    target: u32,
    #[serde(default, alias = "maxConcurrent")]
    max_concurrent: u32,
}

#[derive(Deserialize)]
struct RawEnvelope {
    tiers: HashMap<String, RawTier>,
    #[serde(default, alias = "defaultChain")]
    default_chain: Vec<String>,
}

struct Parsed {
    tiers: HashMap<String, RawTier>,
    chain: Vec<String>,
}

/// Parses a tier config blob, accepting three formats in priority order:
///
/// 1. The structured envelope `{"tiers": {..}, "default_chain": [..]}`.
/// 2. A flat map `{name: {kind, target, max_concurrent}}`.
/// 3. An integer map `{name: target}`, implying exclusive tiers.
fn parse(blob: &str) -> Option<Parsed> {
    if let Ok(envelope) = serde_json::from_str::<RawEnvelope>(blob) {
        return Some(Parsed {
            tiers: envelope.tiers,
            chain: envelope.default_chain,
        });
    }
    if let Ok(flat) = serde_json::from_str::<HashMap<String, RawTier>>(blob) {
        return Some(Parsed {
            tiers: flat,
            chain: vec![],
        });
    }
    if let Ok(targets) = serde_json::from_str::<HashMap<String, u32>>(blob) {
        return Some(Parsed {
            tiers: targets
                .into_iter()
                .map(|(name, target)| {
                    (
                        name,
                        RawTier {
                            kind: None,
                            target,
                            max_concurrent: 0,
                        },
                    )
                })
                .collect(),
            chain: vec![],
        });
    }
    None
}

/// Normalizes a parsed config into a [TierTable](TierTable):
///
/// * a missing or unrecognized kind becomes exclusive,
/// * a shared tier with no concurrency ceiling gets one of 5,
/// * `merchant:{id}` entries move into the merchant table,
/// * a default chain that is empty after filtering out unknown names is
///   rebuilt deterministically — exclusive tiers first (lexicographic),
///   then shared (lexicographic).
fn normalize(parsed: Parsed) -> TierTable {
    let mut table = TierTable::default();
    for (name, raw) in parsed.tiers {
        if name.starts_with("merchant:") {
            table.merchant_tiers.insert(name, raw.target);
            continue;
        }
        let kind = match raw.kind.as_deref() {
            Some("shared") => TierKind::Shared,
            _ => TierKind::Exclusive,
        };
        let max_concurrent = match kind {
            TierKind::Shared if raw.max_concurrent == 0 => 5,
            _ => raw.max_concurrent,
        };
        table.tiers.insert(
            name,
            Tier {
                kind,
                target: raw.target,
                max_concurrent,
            },
        );
    }
    table.default_chain = parsed
        .chain
        .into_iter()
        .filter(|name| table.tiers.contains_key(name))
        .collect();
    if table.default_chain.is_empty() {
        // BTreeMap iteration is already lexicographic, so two passes give
        // the deterministic rebuild order.
        for (name, tier) in &table.tiers {
            if tier.kind == TierKind::Exclusive {
                table.default_chain.push(name.clone());
            }
        }
        for (name, tier) in &table.tiers {
            if tier.kind == TierKind::Shared {
                table.default_chain.push(name.clone());
            }
        }
    }
    table
}

/// The table used when no configuration is supplied anywhere. Small enough
/// to be harmless, real enough that a development cluster works.
fn fallback() -> TierTable {
    normalize(Parsed {
        tiers: vec![
            (
                "gold".to_string(),
                RawTier {
                    kind: None,
                    target: 2,
                    max_concurrent: 0,
                },
            ),
            (
                "standard".to_string(),
                RawTier {
                    kind: None,
                    target: 4,
                    max_concurrent: 0,
                },
            ),
            (
                "basic".to_string(),
                RawTier {
                    kind: Some("shared".to_string()),
                    target: 2,
                    max_concurrent: 5,
                },
            ),
        ]
        .into_iter()
        .collect(),
        chain: vec![
            "gold".to_string(),
            "standard".to_string(),
            "basic".to_string(),
        ],
    })
}

/// Renders a table back into the structured envelope format, merchant
/// entries included. This is what gets published to the store.
fn envelope_json(table: &TierTable) -> String {
    let mut tiers = serde_json::Map::new();
    for (name, tier) in &table.tiers {
        tiers.insert(
            name.clone(),
            serde_json::json!({
                "kind": tier.kind.as_str(),
                "target": tier.target,
                "max_concurrent": tier.max_concurrent,
            }),
        );
    }
    for (name, target) in &table.merchant_tiers {
        tiers.insert(
            name.clone(),
            serde_json::json!({
                "kind": "exclusive",
                "target": target,
            }),
        );
    }
    serde_json::json!({
        "tiers": tiers,
        "default_chain": table.default_chain,
    })
    .to_string()
}

////////////////////////////////////////////////////////////////////////////
// The registry itself
////////////////////////////////////////////////////////////////////////////

lazy_static! {
    static ref CACHE: RwLock<TierTable> = RwLock::new(TierTable::default());
}

/// Returns an owned copy of the current tier table. The write lock is only
/// ever held for the duration of a pointer swap, so this never blocks for
/// longer than that.
pub async fn snapshot() -> TierTable {
    CACHE.read().await.clone()
}

async fn install(table: TierTable) {
    *CACHE.write().await = table;
}

/// Startup-time initialization, run once by every replica:
///
/// 1. parse the env blob (falling back to the hard-coded table),
/// 2. publish it to the store with set-if-absent semantics,
/// 3. load whatever the store now holds — the store always wins.
pub async fn bootstrap(store: &Store) -> Result<()> {
    let blob = env::tier_config_json();
    let local = if blob.trim().is_empty() {
        fallback()
    } else {
        match parse(&blob) {
            Some(parsed) => normalize(parsed),
            None => {
                warn!("TIER_CONFIG_JSON did not parse in any accepted format, using the fallback table");
                fallback()
            }
        }
    };
    let local = if local.is_empty() { fallback() } else { local };
    let key = store.key(StoreKey::TierConfig);
    if store.set_nx(&key, &envelope_json(&local)).await? {
        info!("Seeded the store's tier table from this replica's environment");
    } else {
        debug!("The store already holds a tier table; the environment blob is discarded");
    }
    refresh(store).await;
    if snapshot().await.is_empty() {
        // The store read raced or failed; run on the local parse until the
        // refresher catches up.
        install(local).await;
    }
    Ok(())
}

/// One refresh step: re-read the store's tier table and swap it in. On a
/// missing key or a store error the current cache stays — a degraded
/// refresh must never blank out a working table.
pub async fn refresh(store: &Store) {
    let key = store.key(StoreKey::TierConfig);
    match store.get(&key).await {
        Ok(Some(blob)) => match parse(&blob) {
            Some(parsed) => install(normalize(parsed)).await,
            None => warn!("The store's tier table is unparseable, keeping the current table"),
        },
        Ok(None) => debug!("No tier table in the store yet, keeping the current table"),
        Err(err) => warn!("Tier refresh failed, keeping the current table: {}", err),
    }
}

/// The background refresh worker. Runs on every replica, leader or not.
pub async fn refresher(store: Store, token: CancellationToken) {
    let mut tick = tokio::time::interval(env::tier_refresh_interval());
    tick.tick().await; // the first tick fires immediately; bootstrap already loaded
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tick.tick() => refresh(&store).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_format() {
        let table = normalize(
            parse(
                r#"{
                    "tiers": {
                        "gold": {"kind": "exclusive", "target": 1},
                        "basic": {"kind": "shared", "target": 1, "maxConcurrent": 3}
                    },
                    "default_chain": ["gold", "basic"]
                }"#,
            )
            .unwrap(),
        );
        assert_eq!(table.tiers["gold"].kind, TierKind::Exclusive);
        assert_eq!(table.tiers["basic"].kind, TierKind::Shared);
        assert_eq!(table.tiers["basic"].max_concurrent, 3);
        assert_eq!(table.default_chain, vec!["gold", "basic"]);
    }

    #[test]
    fn flat_format() {
        let table = normalize(
            parse(r#"{"gold": {"target": 2}, "basic": {"kind": "shared", "target": 1}}"#).unwrap(),
        );
        assert_eq!(table.tiers["gold"].kind, TierKind::Exclusive);
        assert_eq!(table.tiers["gold"].target, 2);
        // A shared tier with no ceiling configured gets the default of 5.
        assert_eq!(table.tiers["basic"].max_concurrent, 5);
    }

    #[test]
    fn integer_format() {
        let table = normalize(parse(r#"{"gold": 3, "standard": 7}"#).unwrap());
        assert_eq!(table.tiers["gold"].kind, TierKind::Exclusive);
        assert_eq!(table.tiers["gold"].target, 3);
        assert_eq!(table.tiers["standard"].target, 7);
    }

    #[test]
    fn unknown_kind_degrades_to_exclusive() {
        let table =
            normalize(parse(r#"{"weird": {"kind": "priority-weighted", "target": 1}}"#).unwrap());
        assert_eq!(table.tiers["weird"].kind, TierKind::Exclusive);
    }

    #[test]
    fn merchant_entries_are_split_out() {
        let table = normalize(
            parse(r#"{"gold": {"target": 1}, "merchant:acme": {"target": 2}}"#).unwrap(),
        );
        assert!(table.tiers.get("merchant:acme").is_none());
        assert_eq!(table.merchant_tiers["merchant:acme"], 2);
        // And merchant tiers never enter the default chain.
        assert_eq!(table.default_chain, vec!["gold"]);
    }

    #[test]
    fn chain_rebuild_is_deterministic() {
        let table = normalize(
            parse(
                r#"{
                    "zeta": {"target": 1},
                    "alpha": {"target": 1},
                    "pool-b": {"kind": "shared", "target": 1},
                    "pool-a": {"kind": "shared", "target": 1}
                }"#,
            )
            .unwrap(),
        );
        // Exclusive first (lexicographic), then shared (lexicographic).
        assert_eq!(table.default_chain, vec!["alpha", "zeta", "pool-a", "pool-b"]);
    }

    #[test]
    fn chain_with_unknown_names_is_rebuilt() {
        let table = normalize(
            parse(
                r#"{
                    "tiers": {"gold": {"target": 1}},
                    "default_chain": ["silver", "bronze"]
                }"#,
            )
            .unwrap(),
        );
        assert_eq!(table.default_chain, vec!["gold"]);
    }

    #[test]
    fn garbage_does_not_parse() {
        assert!(parse("not even json").is_none());
        assert!(parse(r#"["an", "array"]"#).is_none());
    }

    #[test]
    fn fallback_is_usable() {
        let table = fallback();
        assert!(!table.is_empty());
        assert!(!table.default_chain.is_empty());
    }

    #[test]
    fn envelope_round_trips() {
        let table = normalize(
            parse(r#"{"gold": {"target": 1}, "merchant:acme": {"target": 2}}"#).unwrap(),
        );
        let reparsed = normalize(parse(&envelope_json(&table)).unwrap());
        assert_eq!(table, reparsed);
    }
}
