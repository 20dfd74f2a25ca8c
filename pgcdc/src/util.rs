//! Small standalone helpers with no other natural home.

use rand::distr::Alphanumeric;
use rand::Rng;

/// A random alphanumeric string of length `n`, lowercased. Used to default
/// the replication slot name so two instances of pgcdc pointed at the same
/// publication without an explicit `replication_slot` don't collide.
pub fn random_string(n: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(n)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}
