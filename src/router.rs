use crate::error::Error;
use rand::rngs::StdRng;
use rand_distr::{Bernoulli, Distribution};

pub trait MigrationRouter: Sync {
    fn route(
        &self,
        my_id: usize,
        generation: usize,
        island_sizes: &[usize],
        rng: &mut StdRng,
    ) -> Option<usize>;
}

// Load balancing overrides topology: an empty or badly outgrown island is
// served first, otherwise the ring predecessor is targeted with the
// configured probability.
pub struct LoadAwareRingRouter {
    migration: Bernoulli,
}

impl LoadAwareRingRouter {
    pub const IMBALANCE_FACTOR: f64 = 2.5;

    pub fn new(migration_probability: f64) -> Result<Self, Error> {
        let migration = Bernoulli::new(migration_probability)
            .map_err(|_| Error::InvalidMigrationProbability)?;
        Ok(Self { migration })
    }
}

impl MigrationRouter for LoadAwareRingRouter {
    fn route(
        &self,
        my_id: usize,
        _generation: usize,
        island_sizes: &[usize],
        rng: &mut StdRng,
    ) -> Option<usize> {
        let num_islands = island_sizes.len();
        if num_islands < 2 || my_id >= num_islands {
            return None;
        }
        let my_size = island_sizes[my_id] as f64;
        for (island, &size) in island_sizes.iter().enumerate() {
            if island != my_id && (size == 0 || my_size > Self::IMBALANCE_FACTOR * size as f64) {
                return Some(island);
            }
        }
        if self.migration.sample(rng) {
            Some(if my_id == 0 { num_islands - 1 } else { my_id - 1 })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0)
    }

    #[test]
    fn empty_island_is_served_first() {
        let router = LoadAwareRingRouter::new(0.0).unwrap();
        assert_eq!(router.route(0, 3, &[5, 0, 5, 5], &mut rng()), Some(1));
        assert_eq!(router.route(2, 3, &[0, 5, 5, 5], &mut rng()), Some(0));
    }

    #[test]
    fn imbalance_beyond_factor_triggers_migration() {
        let router = LoadAwareRingRouter::new(0.0).unwrap();
        // 13 > 2.5 * 5
        assert_eq!(router.route(1, 0, &[5, 13, 5, 13], &mut rng()), Some(0));
        // 12 < 2.5 * 5
        assert_eq!(router.route(1, 0, &[5, 12, 5, 12], &mut rng()), None);
    }

    #[test]
    fn zero_probability_never_routes_when_balanced() {
        let router = LoadAwareRingRouter::new(0.0).unwrap();
        let mut rng = rng();
        for generation in 0..1000 {
            assert_eq!(router.route(1, generation, &[5, 5, 5, 5], &mut rng), None);
        }
    }

    #[test]
    fn certain_probability_targets_ring_predecessor() {
        let router = LoadAwareRingRouter::new(1.0).unwrap();
        assert_eq!(router.route(2, 0, &[5, 5, 5, 5], &mut rng()), Some(1));
        assert_eq!(router.route(0, 0, &[5, 5, 5, 5], &mut rng()), Some(3));
    }

    #[test]
    fn single_island_never_migrates() {
        let router = LoadAwareRingRouter::new(1.0).unwrap();
        assert_eq!(router.route(0, 0, &[10], &mut rng()), None);
    }

    #[test]
    fn rejects_probability_out_of_range() {
        assert!(matches!(
            LoadAwareRingRouter::new(1.5),
            Err(Error::InvalidMigrationProbability)
        ));
    }
}
