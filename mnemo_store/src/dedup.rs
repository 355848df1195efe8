//! Content hashing re-export. The hash function itself lives in `mnemo_core`
//! since the Step Loop and tool handlers need it too; kept re-exported here so
//! call sites inside the store don't reach across the workspace boundary.

pub use mnemo_core::util::content_hash;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_hash() {
        let h1 = content_hash("episodic", "had coffee");
        let h2 = content_hash("episodic", "had coffee");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64); // SHA-256 hex length
    }

    #[test]
    fn different_inputs_different_hashes() {
        let h1 = content_hash("episodic", "had coffee");
        let h2 = content_hash("semantic", "had coffee");
        assert_ne!(h1, h2);
    }
}
