//! The per-kind pool strategy. Allocator, releaser, drainer, zombie
//! recovery, and the reconciler all need to mutate "the pool a pod belongs
//! to" without caring whether that pool is a plain set, a scored set, or a
//! merchant's dedicated roster. This module is the one place that knows the
//! difference; everybody else dispatches through a [SourcePool](SourcePool).

use crate::tiers::{TierKind, TierTable};
use result::Result;
use store::{PopOutcome, Store, StoreKey};

#[derive(Clone, Debug, PartialEq)]
pub enum SourcePool {
    /// A merchant's dedicated pool. Always exclusive.
    Merchant(String),
    /// An exclusive tier: one pod, one call.
    Exclusive(String),
    /// A shared tier: up to `max_concurrent` calls per pod.
    Shared { tier: String, max_concurrent: u32 },
}

/// The outcome of asking a pool for a pod.
#[derive(Debug, PartialEq)]
pub enum AcquireOutcome {
    /// Capacity on this pod now belongs to the caller.
    Pod(String),
    /// The pool has nothing to give.
    Empty,
    /// The pool has pods, but every one the pop reached was draining.
    AllDraining,
}

impl SourcePool {
    /// Resolves one step of a fallback chain. Steps are either
    /// `merchant:{id}` references or plain tier names; a tier name the
    /// registry does not know is nobody's pool and resolves to None.
    pub fn for_step(step: &str, table: &TierTable) -> Option<SourcePool> {
        if let Some(id) = step.strip_prefix("merchant:") {
            return Some(SourcePool::Merchant(id.to_string()));
        }
        match table.kind_of(step) {
            Some(TierKind::Shared) => Some(SourcePool::Shared {
                tier: step.to_string(),
                max_concurrent: table.max_concurrent(step),
            }),
            Some(TierKind::Exclusive) => Some(SourcePool::Exclusive(step.to_string())),
            None => None,
        }
    }

    /// Parses the `source_pool` field of a call record — `pool:{tier}` or
    /// `merchant:{id}`. A tier that has since left the configuration is
    /// treated as exclusive so that its capacity can still be returned.
    pub fn from_encoded(encoded: &str, table: &TierTable) -> Option<SourcePool> {
        if let Some(id) = encoded.strip_prefix("merchant:") {
            return Some(SourcePool::Merchant(id.to_string()));
        }
        let tier = encoded.strip_prefix("pool:")?;
        Some(match table.kind_of(tier) {
            Some(TierKind::Shared) => SourcePool::Shared {
                tier: tier.to_string(),
                max_concurrent: table.max_concurrent(tier),
            },
            _ => SourcePool::Exclusive(tier.to_string()),
        })
    }

    /// Parses a pod's tier binding — a plain tier name or `merchant:{id}`.
    pub fn from_binding(binding: &str, table: &TierTable) -> SourcePool {
        if let Some(id) = binding.strip_prefix("merchant:") {
            return SourcePool::Merchant(id.to_string());
        }
        match table.kind_of(binding) {
            Some(TierKind::Shared) => SourcePool::Shared {
                tier: binding.to_string(),
                max_concurrent: table.max_concurrent(binding),
            },
            _ => SourcePool::Exclusive(binding.to_string()),
        }
    }

    /// The wire encoding recorded into call records and returned to
    /// clients.
    pub fn encode(&self) -> String {
        match self {
            SourcePool::Merchant(id) => format!("merchant:{}", id),
            SourcePool::Exclusive(tier) => format!("pool:{}", tier),
            SourcePool::Shared { tier, .. } => format!("pool:{}", tier),
        }
    }

    pub fn available_key(&self, store: &Store) -> String {
        match self {
            SourcePool::Merchant(id) => store.key(StoreKey::MerchantAvailable(id)),
            SourcePool::Exclusive(tier) => store.key(StoreKey::PoolAvailable(tier)),
            SourcePool::Shared { tier, .. } => store.key(StoreKey::PoolAvailable(tier)),
        }
    }

    pub fn assigned_key(&self, store: &Store) -> String {
        match self {
            SourcePool::Merchant(id) => store.key(StoreKey::MerchantAssigned(id)),
            SourcePool::Exclusive(tier) => store.key(StoreKey::PoolAssigned(tier)),
            SourcePool::Shared { tier, .. } => store.key(StoreKey::PoolAssigned(tier)),
        }
    }

    /// Asks the pool for one pod's worth of capacity. Exclusive pools pop a
    /// member outright; shared pools take one slot on the least-loaded
    /// member. Both run as a single server-side script.
    pub async fn try_acquire(&self, store: &Store) -> Result<AcquireOutcome> {
        let key = self.available_key(store);
        match self {
            SourcePool::Merchant(_) | SourcePool::Exclusive(_) => {
                Ok(match store.exclusive_pop(&key).await? {
                    PopOutcome::Pod(pod) => AcquireOutcome::Pod(pod),
                    PopOutcome::Empty => AcquireOutcome::Empty,
                    PopOutcome::AllDraining => AcquireOutcome::AllDraining,
                })
            }
            SourcePool::Shared { max_concurrent, .. } => {
                Ok(match store.shared_acquire(&key, *max_concurrent).await? {
                    Some(pod) => AcquireOutcome::Pod(pod),
                    None => AcquireOutcome::Empty,
                })
            }
        }
    }

    /// Makes the pod available again. The shared write is add-if-absent so
    /// an in-flight score survives; set semantics make the exclusive write
    /// naturally idempotent.
    pub async fn add_available(&self, store: &Store, pod: &str) -> Result<()> {
        let key = self.available_key(store);
        match self {
            SourcePool::Merchant(_) | SourcePool::Exclusive(_) => store.sadd(&key, pod).await,
            SourcePool::Shared { .. } => store.zadd_nx(&key, pod, 0.0).await,
        }
    }

    /// Takes the pod out of circulation. Returns whether it was actually
    /// present, which drives the drainer's rollback decision.
    pub async fn remove_available(&self, store: &Store, pod: &str) -> Result<bool> {
        let key = self.available_key(store);
        match self {
            SourcePool::Merchant(_) | SourcePool::Exclusive(_) => store.srem(&key, pod).await,
            SourcePool::Shared { .. } => store.zrem(&key, pod).await,
        }
    }

    /// Returns one call's worth of capacity to the pool and reports the
    /// pod's remaining call count (always 0 for exclusive pools).
    pub async fn release_capacity(&self, store: &Store, pod: &str) -> Result<i64> {
        let key = self.available_key(store);
        match self {
            SourcePool::Merchant(_) | SourcePool::Exclusive(_) => {
                store.sadd(&key, pod).await?;
                Ok(0)
            }
            SourcePool::Shared { .. } => store.shared_release(&key, pod).await,
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, SourcePool::Shared { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiers::{Tier, TierKind, TierTable};

    fn table() -> TierTable {
        let mut table = TierTable::default();
        table.tiers.insert(
            "gold".to_string(),
            Tier {
                kind: TierKind::Exclusive,
                target: 1,
                max_concurrent: 0,
            },
        );
        table.tiers.insert(
            "basic".to_string(),
            Tier {
                kind: TierKind::Shared,
                target: 1,
                max_concurrent: 3,
            },
        );
        table.default_chain = vec!["gold".to_string(), "basic".to_string()];
        table
    }

    #[test]
    fn step_resolution() {
        let t = table();
        assert_eq!(
            SourcePool::for_step("gold", &t),
            Some(SourcePool::Exclusive("gold".to_string()))
        );
        assert_eq!(
            SourcePool::for_step("basic", &t),
            Some(SourcePool::Shared {
                tier: "basic".to_string(),
                max_concurrent: 3
            })
        );
        assert_eq!(
            SourcePool::for_step("merchant:acme", &t),
            Some(SourcePool::Merchant("acme".to_string()))
        );
        assert_eq!(SourcePool::for_step("no-such-tier", &t), None);
    }

    #[test]
    fn encoded_round_trip() {
        let t = table();
        for pool in [
            SourcePool::Exclusive("gold".to_string()),
            SourcePool::Shared {
                tier: "basic".to_string(),
                max_concurrent: 3,
            },
            SourcePool::Merchant("acme".to_string()),
        ] {
            assert_eq!(
                SourcePool::from_encoded(&pool.encode(), &t),
                Some(pool.clone())
            );
        }
    }

    #[test]
    fn vanished_tier_releases_as_exclusive() {
        let t = table();
        assert_eq!(
            SourcePool::from_encoded("pool:silver", &t),
            Some(SourcePool::Exclusive("silver".to_string()))
        );
        assert_eq!(SourcePool::from_encoded("garbage", &t), None);
    }
}
