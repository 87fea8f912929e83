//! Internal helpers shared across modules: id generation.

use rand::Rng;

/// A short random identifier suitable for agent ids, interrupt ids, and
/// tool-use ids minted internally (e.g. a synthesized interrupt the caller
/// didn't name). Not a UUID: just random enough that two ids minted in the
/// same process don't collide.
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    let n: u64 = rng.gen();
    format!("{n:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_id_produces_distinct_values() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 16);
    }
}
