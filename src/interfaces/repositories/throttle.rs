/// Outcome of a throttle check. `retry_after` is set on denial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleDecision {
    pub allowed: bool,
    pub retry_after: Option<u64>,
}

pub trait RequestThrottle: Send + Sync {
    fn check(&self, key: &str) -> ThrottleDecision;
}
