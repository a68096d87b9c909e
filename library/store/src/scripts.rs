//! The server-side scripts that back every compound mutation the router
//! performs. Each script executes atomically inside the store, which is what
//! the allocator's correctness hangs on. Emulating any of these with a
//! client-side read-modify-write loop reintroduces the races they exist to
//! close, so don't.

use lazy_static::lazy_static;
use redis::Script;

lazy_static! {
    /// Idempotency read-or-lock over a call record hash.
    ///
    /// KEYS[1] = the call record key. ARGV[1] = lock TTL in seconds.
    ///
    /// If the hash already has any fields then those fields are returned
    /// untouched (the caller decides whether it is looking at a completed
    /// record or a racing placeholder). Otherwise a `_lock` placeholder is
    /// written with a short TTL and an empty reply signals "lock acquired".
    pub static ref CALL_LOCK: Script = Script::new(
        r#"
local record = redis.call('HGETALL', KEYS[1])
if #record > 0 then
  return record
end
redis.call('HSET', KEYS[1], '_lock', '1')
redis.call('EXPIRE', KEYS[1], ARGV[1])
return {}
"#,
    );

    /// Pop one non-draining pod from an exclusive pool.
    ///
    /// KEYS[1] = the pool's available set. ARGV[1] = the draining flag
    /// prefix.
    ///
    /// Draining pods are consumed by the pop and NOT returned to the set,
    /// which is what makes the draining flag effective mid-flight. Ten
    /// consecutive draining pops are taken to mean the whole pool is
    /// draining.
    pub static ref EXCLUSIVE_POP: Script = Script::new(
        r#"
for attempt = 1, 10 do
  local pod = redis.call('SPOP', KEYS[1])
  if not pod then
    return {'empty', ''}
  end
  if redis.call('EXISTS', ARGV[1] .. pod) == 0 then
    return {'ok', pod}
  end
end
return {'draining', ''}
"#,
    );

    /// Acquire one slot on the least-loaded eligible pod of a shared pool.
    ///
    /// KEYS[1] = the pool's available sorted set (score = live call count).
    /// ARGV[1] = the draining flag prefix. ARGV[2] = the per-pod ceiling.
    ///
    /// Members are walked in ascending score order, so the first member at
    /// or above the ceiling means every remaining member is too.
    pub static ref SHARED_ACQUIRE: Script = Script::new(
        r#"
local members = redis.call('ZRANGE', KEYS[1], 0, -1, 'WITHSCORES')
for i = 1, #members, 2 do
  local pod = members[i]
  local count = tonumber(members[i + 1])
  if count >= tonumber(ARGV[2]) then
    return {'none', ''}
  end
  if redis.call('EXISTS', ARGV[1] .. pod) == 0 then
    redis.call('ZINCRBY', KEYS[1], 1, pod)
    return {'ok', pod}
  end
end
return {'none', ''}
"#,
    );

    /// Release one slot on a shared pool member, with a floor of zero.
    ///
    /// KEYS[1] = the pool's available sorted set. ARGV[1] = the pod.
    ///
    /// A missing member or a score already at zero both report zero without
    /// mutating anything, so double releases cannot drive a score negative.
    pub static ref SHARED_RELEASE: Script = Script::new(
        r#"
local count = redis.call('ZSCORE', KEYS[1], ARGV[1])
if not count then
  return 0
end
count = tonumber(count)
if count > 0 then
  count = tonumber(redis.call('ZINCRBY', KEYS[1], -1, ARGV[1]))
end
return count
"#,
    );

    /// Check a pod's eligibility for (re)entering an available pool.
    ///
    /// KEYS[1] = the pod's lease key. KEYS[2] = the pod's draining flag.
    ///
    /// Both must be absent at the same instant for the pod to be eligible.
    pub static ref ELIGIBLE: Script = Script::new(
        r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
if redis.call('EXISTS', KEYS[2]) == 1 then
  return 0
end
return 1
"#,
    );
}
