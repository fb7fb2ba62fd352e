// Misc functions for interface
// random sandbox identity, etc.

use rand::Rng;

/// A fresh 128-bit sandbox UID. Uniqueness keeps concurrent sandboxes'
/// overlay trees disjoint.
pub fn sandbox_uid() -> u128 {
    rand::thread_rng().gen()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uids_do_not_collide() {
        let a = sandbox_uid();
        let b = sandbox_uid();
        assert_ne!(a, b);
    }
}
