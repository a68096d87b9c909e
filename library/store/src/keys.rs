/// Every key the router writes into the store, in one place. All variants
/// resolve under the common prefix so that a single `KEYS voice:*` (or a
/// FLUSHDB of a dedicated logical database) captures the entirety of the
/// router's footprint.
pub enum StoreKey<'a> {
    /// Set (exclusive tiers) or sorted set (shared tiers) of pods that may
    /// currently receive new calls.
    PoolAvailable(&'a str),
    /// Set of every pod logically bound to the tier, available or not.
    PoolAssigned(&'a str),
    /// Set of every pod bound to the merchant's dedicated pool.
    MerchantAssigned(&'a str),
    /// Subset of the merchant's pods that may currently receive new calls.
    MerchantAvailable(&'a str),
    /// Hash of per-merchant allocation overrides (`pool`, `fallback`).
    MerchantConfig(&'a str),
    /// Hash of free-form metadata about one pod.
    Pod(&'a str),
    /// String naming the tier (or `merchant:{id}`) the pod is bound to.
    PodTier(&'a str),
    /// TTL'd flag marking a pod as refusing new work.
    Draining(&'a str),
    /// The prefix shared by every draining flag. Handed to server-side
    /// scripts so they can probe arbitrary pods without another round trip.
    DrainingPrefix,
    /// TTL'd hash that is the authoritative record of a call's assignment.
    Call(&'a str),
    /// TTL'd string marking that a pod has at least one active call.
    Lease(&'a str),
    /// The authoritative tier table, once bootstrapped.
    TierConfig,
}

impl StoreKey<'_> {
    pub fn resolve(&self, prefix: &str) -> String {
        match self {
            StoreKey::PoolAvailable(tier) => format!("{}pool:{}:available", prefix, tier),
            StoreKey::PoolAssigned(tier) => format!("{}pool:{}:assigned", prefix, tier),
            StoreKey::MerchantAssigned(id) => format!("{}merchant:{}:assigned", prefix, id),
            StoreKey::MerchantAvailable(id) => format!("{}merchant:{}:pods", prefix, id),
            StoreKey::MerchantConfig(id) => format!("{}merchant:{}:config", prefix, id),
            StoreKey::Pod(name) => format!("{}pod:{}", prefix, name),
            StoreKey::PodTier(name) => format!("{}pod:tier:{}", prefix, name),
            StoreKey::Draining(name) => format!("{}pod:draining:{}", prefix, name),
            StoreKey::DrainingPrefix => format!("{}pod:draining:", prefix),
            StoreKey::Call(call_sid) => format!("{}call:{}", prefix, call_sid),
            StoreKey::Lease(pod) => format!("{}lease:{}", prefix, pod),
            StoreKey::TierConfig => format!("{}tier:config", prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution() {
        let p = "voice:";
        assert_eq!(
            StoreKey::PoolAvailable("gold").resolve(p),
            "voice:pool:gold:available"
        );
        assert_eq!(
            StoreKey::PoolAssigned("basic").resolve(p),
            "voice:pool:basic:assigned"
        );
        assert_eq!(
            StoreKey::MerchantAssigned("m1").resolve(p),
            "voice:merchant:m1:assigned"
        );
        assert_eq!(
            StoreKey::MerchantAvailable("m1").resolve(p),
            "voice:merchant:m1:pods"
        );
        assert_eq!(
            StoreKey::MerchantConfig("m1").resolve(p),
            "voice:merchant:m1:config"
        );
        assert_eq!(StoreKey::Pod("v-0").resolve(p), "voice:pod:v-0");
        assert_eq!(StoreKey::PodTier("v-0").resolve(p), "voice:pod:tier:v-0");
        assert_eq!(
            StoreKey::Draining("v-0").resolve(p),
            "voice:pod:draining:v-0"
        );
        assert_eq!(StoreKey::DrainingPrefix.resolve(p), "voice:pod:draining:");
        assert_eq!(StoreKey::Call("CA123").resolve(p), "voice:call:CA123");
        assert_eq!(StoreKey::Lease("v-0").resolve(p), "voice:lease:v-0");
        assert_eq!(StoreKey::TierConfig.resolve(p), "voice:tier:config");
    }
}
