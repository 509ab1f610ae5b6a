use crate::common_util::hold;
use crate::error::Error;
use crate::meta::Chromosome;
use std::mem;
use std::ops::Range;
use std::sync::{Mutex, MutexGuard};
use tangram_finite::FiniteF64;

#[derive(Debug, Clone)]
pub struct Individual<C> {
    pub chromosome: C,
    pub value: Option<FiniteF64>,
}

impl<C> Individual<C> {
    pub fn new(chromosome: C) -> Self {
        Self {
            chromosome,
            value: None,
        }
    }

    pub fn evaluated(chromosome: C, value: FiniteF64) -> Self {
        Self {
            chromosome,
            value: Some(value),
        }
    }

    pub fn improves_on(&self, other: Option<FiniteF64>) -> bool {
        match (self.value, other) {
            (Some(mine), Some(theirs)) => mine < theirs,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationMessage<C> {
    pub individuals: Vec<Individual<C>>,
    pub source_island: usize,
    pub generation: usize,
}

pub(crate) struct Handoff<C> {
    pub to: usize,
    pub message: MigrationMessage<C>,
}

pub fn partition(population_size: usize, num_islands: usize) -> Vec<Range<usize>> {
    let base = population_size / num_islands;
    let mut ranges = Vec::with_capacity(num_islands);
    for island in 0..num_islands {
        let from = island * base;
        let to = if island + 1 == num_islands {
            population_size
        } else {
            from + base
        };
        ranges.push(from..to);
    }
    ranges
}

pub struct Population<C> {
    islands: Vec<Mutex<Vec<Individual<C>>>>,
    inboxes: Vec<Mutex<Vec<MigrationMessage<C>>>>,
    ranges: Vec<Range<usize>>,
}

impl<C: Chromosome> Population<C> {
    pub fn new(population_size: usize, num_islands: usize) -> Result<Self, Error> {
        if population_size == 0 {
            return Err(Error::ZeroPopulationSize);
        }
        if num_islands == 0 {
            return Err(Error::ZeroNumThreads);
        }
        let ranges = partition(population_size, num_islands);
        Ok(Self {
            islands: ranges
                .iter()
                .map(|range| Mutex::new(Vec::with_capacity(range.len())))
                .collect(),
            inboxes: (0..num_islands).map(|_| Mutex::new(Vec::new())).collect(),
            ranges,
        })
    }

    pub fn num_islands(&self) -> usize {
        self.islands.len()
    }

    pub fn range(&self, island: usize) -> &Range<usize> {
        &self.ranges[island]
    }

    pub fn island(&self, island: usize) -> MutexGuard<'_, Vec<Individual<C>>> {
        hold(&self.islands[island])
    }

    // Only called from inside an ordered-barrier apply step; the sole
    // sanctioned cross-island write.
    pub fn deliver_to(&self, to: usize, message: MigrationMessage<C>) {
        hold(&self.inboxes[to]).push(message);
    }

    pub fn drain_inbox(&self, island: usize) -> Vec<MigrationMessage<C>> {
        mem::take(&mut *hold(&self.inboxes[island]))
    }

    pub fn inbox_len(&self, island: usize) -> usize {
        hold(&self.inboxes[island]).len()
    }

    pub fn total_len(&self) -> usize {
        (0..self.num_islands()).map(|i| self.island(i).len()).sum()
    }
}

pub struct PopulationView<C> {
    individuals: Vec<Individual<C>>,
    bases: Vec<usize>,
}

impl<C: Chromosome> PopulationView<C> {
    pub fn capture(population: &Population<C>) -> Self {
        let mut individuals = Vec::new();
        let mut bases = Vec::with_capacity(population.num_islands());
        for island in 0..population.num_islands() {
            bases.push(individuals.len());
            individuals.extend(population.island(island).iter().cloned());
        }
        Self { individuals, bases }
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    pub fn base_of(&self, island: usize) -> usize {
        self.bases[island]
    }

    pub fn get(&self, slot: usize) -> &Individual<C> {
        &self.individuals[slot]
    }

    pub fn set(&mut self, slot: usize, individual: Individual<C>) {
        self.individuals[slot] = individual;
    }

    pub fn best_slot(&self) -> Option<usize> {
        let mut best: Option<(FiniteF64, usize)> = None;
        for (slot, individual) in self.individuals.iter().enumerate() {
            if let Some(value) = individual.value {
                if best.map_or(true, |(best_value, _)| value < best_value) {
                    best = Some((value, slot));
                }
            }
        }
        best.map(|(_, slot)| slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finite(value: f64) -> FiniteF64 {
        FiniteF64::new(value).unwrap()
    }

    #[test]
    fn partition_splits_evenly_with_remainder_on_last() {
        let ranges = partition(10, 4);
        assert_eq!(ranges, vec![0..2, 2..4, 4..6, 6..10]);

        let ranges = partition(40, 4);
        assert_eq!(ranges, vec![0..10, 10..20, 20..30, 30..40]);

        let ranges = partition(5, 1);
        assert_eq!(ranges, vec![0..5]);
    }

    #[test]
    fn delivery_and_drain_conserve_individuals() {
        let population: Population<Vec<f64>> = Population::new(6, 2).unwrap();
        population.island(0).extend([
            Individual::evaluated(vec![0.0], finite(1.0)),
            Individual::evaluated(vec![1.0], finite(2.0)),
            Individual::evaluated(vec![2.0], finite(3.0)),
        ]);
        population.island(1).extend([
            Individual::evaluated(vec![3.0], finite(4.0)),
            Individual::evaluated(vec![4.0], finite(5.0)),
            Individual::evaluated(vec![5.0], finite(6.0)),
        ]);
        assert_eq!(population.total_len(), 6);

        let emigrant = population.island(0).pop().unwrap();
        population.deliver_to(
            1,
            MigrationMessage {
                individuals: vec![emigrant],
                source_island: 0,
                generation: 0,
            },
        );
        assert_eq!(population.inbox_len(1), 1);

        let messages = population.drain_inbox(1);
        assert_eq!(messages.len(), 1);
        for message in messages {
            population.island(1).extend(message.individuals);
        }
        assert_eq!(population.total_len(), 6);
        assert_eq!(population.inbox_len(1), 0);
    }

    #[test]
    fn view_reports_best_evaluated_slot() {
        let population: Population<Vec<f64>> = Population::new(4, 2).unwrap();
        population.island(0).extend([
            Individual::new(vec![9.0]),
            Individual::evaluated(vec![1.0], finite(5.0)),
        ]);
        population.island(1).extend([
            Individual::evaluated(vec![2.0], finite(3.0)),
            Individual::evaluated(vec![3.0], finite(3.0)),
        ]);

        let view = PopulationView::capture(&population);
        assert_eq!(view.len(), 4);
        assert_eq!(view.base_of(1), 2);
        // ties resolve to the lowest slot
        assert_eq!(view.best_slot(), Some(2));
    }

    #[test]
    fn improvement_ordering_treats_unevaluated_as_worst() {
        let evaluated = Individual::evaluated(vec![0.0], finite(1.0));
        let unevaluated: Individual<Vec<f64>> = Individual::new(vec![0.0]);
        assert!(evaluated.improves_on(None));
        assert!(!evaluated.improves_on(Some(finite(0.5))));
        assert!(evaluated.improves_on(Some(finite(2.0))));
        assert!(!unevaluated.improves_on(Some(finite(2.0))));
        assert!(!unevaluated.improves_on(None));
    }
}
