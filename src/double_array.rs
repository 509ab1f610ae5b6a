use crate::error::Error;
use crate::meta::{ChromosomeMaker, EvolutionStrategy};
use crate::population::{Individual, PopulationView};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Bernoulli, Distribution, Normal, Uniform};

pub struct UniformVectorMaker {
    dim: usize,
    coord: Uniform<f64>,
}

impl UniformVectorMaker {
    pub fn new(dim: usize, min: f64, max: f64) -> Result<Self, Error> {
        if dim == 0 {
            return Err(Error::ZeroDimension);
        }
        if !min.is_finite() || !max.is_finite() || min >= max {
            return Err(Error::InvalidBounds);
        }
        Ok(Self {
            dim,
            coord: Uniform::new(min, max),
        })
    }
}

impl ChromosomeMaker<Vec<f64>> for UniformVectorMaker {
    fn create(&self, _slot: usize, rng: &mut StdRng) -> Result<Vec<f64>, Error> {
        Ok((0..self.dim).map(|_| self.coord.sample(rng)).collect())
    }
}

pub struct DeBest1Bin {
    weight: f64,
    crossover: Bernoulli,
}

impl DeBest1Bin {
    pub fn new(weight: f64, crossover_prob: f64) -> Result<Self, Error> {
        if !(0.0..=2.0).contains(&weight) {
            return Err(Error::InvalidDifferentialWeight);
        }
        let crossover =
            Bernoulli::new(crossover_prob).map_err(|_| Error::InvalidCrossoverProbability)?;
        Ok(Self { weight, crossover })
    }
}

impl EvolutionStrategy<Vec<f64>> for DeBest1Bin {
    fn propose(
        &self,
        slot: usize,
        current: &Individual<Vec<f64>>,
        view: &PopulationView<Vec<f64>>,
        rng: &mut StdRng,
    ) -> Result<Vec<f64>, Error> {
        let x = &current.chromosome;
        if view.len() < 4 {
            return Err(Error::PopulationTooSmallForDonors);
        }
        let best_slot = view.best_slot().ok_or(Error::NoEvaluatedIndividuals)?;
        let mut donors = [best_slot; 2];
        let mut picked = 0;
        while picked < 2 {
            let donor = rng.gen_range(0..view.len());
            if donor == slot || donor == best_slot || (picked == 1 && donor == donors[0]) {
                continue;
            }
            donors[picked] = donor;
            picked += 1;
        }
        let best = &view.get(best_slot).chromosome;
        let xb = &view.get(donors[0]).chromosome;
        let xc = &view.get(donors[1]).chromosome;
        if best.len() != x.len() || xb.len() != x.len() || xc.len() != x.len() {
            return Err(Error::CandidateEvaluation(
                "donor chromosome dimension mismatch".to_string(),
            ));
        }
        let forced = rng.gen_range(0..x.len());
        let candidate = x
            .iter()
            .enumerate()
            .map(|(coord, &x_coord)| {
                if coord == forced || self.crossover.sample(rng) {
                    best[coord] + self.weight * (xb[coord] - xc[coord])
                } else {
                    x_coord
                }
            })
            .collect();
        Ok(candidate)
    }
}

pub struct RandomDeltaPerturbation {
    scale: f64,
    unit: Normal<f64>,
}

impl RandomDeltaPerturbation {
    const MIN_MAGNITUDE: f64 = 1e-12;

    pub fn new(scale: f64) -> Result<Self, Error> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(Error::InvalidPerturbationScale);
        }
        Ok(Self {
            scale,
            unit: Normal::new(0.0, 1.0).expect("unit normal is well formed"),
        })
    }
}

impl EvolutionStrategy<Vec<f64>> for RandomDeltaPerturbation {
    fn propose(
        &self,
        _slot: usize,
        current: &Individual<Vec<f64>>,
        _view: &PopulationView<Vec<f64>>,
        rng: &mut StdRng,
    ) -> Result<Vec<f64>, Error> {
        let candidate = current
            .chromosome
            .iter()
            .map(|&coord| {
                let magnitude = coord.abs().max(Self::MIN_MAGNITUDE);
                coord + self.scale * magnitude * self.unit.sample(rng)
            })
            .collect();
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::Population;
    use rand::SeedableRng;
    use tangram_finite::FiniteF64;

    fn finite(value: f64) -> FiniteF64 {
        FiniteF64::new(value).unwrap()
    }

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    #[test]
    fn maker_is_reproducible_and_respects_bounds() {
        let maker = UniformVectorMaker::new(5, -2.0, 2.0).unwrap();
        let a = maker.create(0, &mut rng(7)).unwrap();
        let b = maker.create(0, &mut rng(7)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        assert!(a.iter().all(|&coord| (-2.0..2.0).contains(&coord)));
    }

    #[test]
    fn maker_rejects_bad_arguments() {
        assert!(matches!(
            UniformVectorMaker::new(0, -1.0, 1.0),
            Err(Error::ZeroDimension)
        ));
        assert!(matches!(
            UniformVectorMaker::new(3, 1.0, -1.0),
            Err(Error::InvalidBounds)
        ));
    }

    #[test]
    fn identical_donors_reduce_de_to_the_best_individual() {
        let population: Population<Vec<f64>> = Population::new(6, 1).unwrap();
        {
            let mut island = population.island(0);
            island.push(Individual::evaluated(vec![0.5, 0.5], finite(0.5)));
            island.push(Individual::evaluated(vec![0.1, 0.2], finite(0.05)));
            for _ in 0..4 {
                island.push(Individual::evaluated(vec![3.0, 3.0], finite(18.0)));
            }
        }
        let view = PopulationView::capture(&population);
        let strategy = DeBest1Bin::new(0.5, 1.0).unwrap();
        let current = view.get(0).clone();

        let candidate = strategy.propose(0, &current, &view, &mut rng(3)).unwrap();
        // all non-best donors are identical, so the difference vector vanishes
        assert_eq!(candidate, vec![0.1, 0.2]);
    }

    #[test]
    fn de_requires_enough_donors() {
        let population: Population<Vec<f64>> = Population::new(3, 1).unwrap();
        {
            let mut island = population.island(0);
            for coord in 0..3 {
                island.push(Individual::evaluated(
                    vec![coord as f64],
                    finite(coord as f64),
                ));
            }
        }
        let view = PopulationView::capture(&population);
        let strategy = DeBest1Bin::new(0.5, 0.9).unwrap();
        let current = view.get(0).clone();
        assert!(matches!(
            strategy.propose(0, &current, &view, &mut rng(0)),
            Err(Error::PopulationTooSmallForDonors)
        ));
    }

    #[test]
    fn perturbation_moves_every_coordinate_slightly() {
        let population: Population<Vec<f64>> = Population::new(1, 1).unwrap();
        population
            .island(0)
            .push(Individual::evaluated(vec![1.0, -2.0, 0.0], finite(5.0)));
        let view = PopulationView::capture(&population);
        let strategy = RandomDeltaPerturbation::new(0.1).unwrap();
        let current = view.get(0).clone();

        let candidate = strategy.propose(0, &current, &view, &mut rng(11)).unwrap();
        assert_eq!(candidate.len(), 3);
        assert_ne!(candidate, current.chromosome);
        for (old, new) in current.chromosome.iter().zip(&candidate) {
            assert!((old - new).abs() < 1.0);
        }
    }
}
