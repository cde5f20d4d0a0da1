use crate::types::{Category, ParticipantId};
use rand::Rng;
use std::collections::{BTreeMap, HashMap};

/// One category vote per participant; a revote overwrites.
#[derive(Debug, Clone, Default)]
pub struct CategoryVoteTally {
    votes: HashMap<ParticipantId, Category>,
}

impl CategoryVoteTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, participant_id: &ParticipantId, category: Category) {
        self.votes.insert(participant_id.clone(), category);
    }

    pub fn remove(&mut self, participant_id: &ParticipantId) {
        self.votes.remove(participant_id);
    }

    pub fn clear(&mut self) {
        self.votes.clear();
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Vote count per category that received at least one vote
    pub fn counts(&self) -> BTreeMap<Category, u32> {
        let mut counts = BTreeMap::new();
        for category in self.votes.values() {
            *counts.entry(*category).or_insert(0) += 1;
        }
        counts
    }

    /// Plurality winner with a uniform tie-break.
    ///
    /// With no votes every category is in the tied set, so a winner always exists.
    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> Category {
        let counts = self.counts();
        let max = counts.values().copied().max().unwrap_or(0);

        // Iterate in catalog order so a seeded rng gives a reproducible pick
        let tied: Vec<Category> = Category::ALL
            .into_iter()
            .filter(|c| counts.get(c).copied().unwrap_or(0) == max)
            .collect();

        tied[rng.random_range(0..tied.len())]
    }
}
