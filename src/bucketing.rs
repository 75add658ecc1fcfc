//! Bucketing implementation.
use crate::context::EvaluationContext;

/// Number of buckets. Rollout weights use the same scale.
pub const TOTAL_BUCKETS: u32 = 100_000;

/// A stable 32-bit hash used to assign contexts to buckets.
///
/// Implementations must be deterministic across calls, processes and machines.
pub trait Bucketer {
    fn hash(&self, input: &[u8]) -> u32;
}

/// 32-bit FNV-1a. The default bucketer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fnv1aBucketer;

impl Bucketer for Fnv1aBucketer {
    fn hash(&self, input: &[u8]) -> u32 {
        const OFFSET: u32 = 0x811c_9dc5;
        const PRIME: u32 = 0x0100_0193;
        let mut h = OFFSET;
        for &b in input {
            h ^= u32::from(b);
            h = h.wrapping_mul(PRIME);
        }
        h
    }
}

/// First four bytes of the MD5 digest, big-endian.
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5Bucketer;

impl Bucketer for Md5Bucketer {
    fn hash(&self, input: &[u8]) -> u32 {
        let digest = md5::compute(input);
        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
    }
}

/// Assign `context` to a bucket in `[0, TOTAL_BUCKETS)` for `flag_key`.
///
/// The bucketing attribute defaults to the context key when `attribute` is empty or `"key"`. An
/// absent or empty attribute always yields bucket 0.
pub fn bucket_value(
    bucketer: &(impl Bucketer + ?Sized),
    context: &EvaluationContext,
    attribute: &str,
    flag_key: &str,
) -> u32 {
    let attribute = if attribute.is_empty() { "key" } else { attribute };

    let Some(value) = context.resolve(attribute).map(|a| a.to_str()) else {
        return 0;
    };
    if value.is_empty() {
        return 0;
    }

    let input = format!("{flag_key}:{value}");
    bucketer.hash(input.as_bytes()) % TOTAL_BUCKETS
}
