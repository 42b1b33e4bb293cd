//! Client-generated nonce ids for idempotency-sensitive requests.

/// Source of client-generated ids. Uniqueness is probabilistic.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> u64;
}

/// Uniformly random 32-bit ids from the thread-local generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn next_id(&self) -> u64 {
        u64::from(rand::random::<u32>())
    }
}

impl<F> IdSource for F
where
    F: Fn() -> u64 + Send + Sync,
{
    fn next_id(&self) -> u64 {
        self()
    }
}
