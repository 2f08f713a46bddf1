use std::collections::{
    BTreeMap,
    HashMap,
};

use crate::events::VoterId;

/// 1-based position of a candidate on the ballot
pub type BallotIndex = usize;

pub type MapLabel = String;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet(BTreeMap<BallotIndex, MapLabel>);

impl CandidateSet {
    /// Numbers the labels 1..=n in the order given
    pub fn from_labels(labels: impl IntoIterator<Item = MapLabel>) -> Self {
        Self(labels.into_iter().enumerate().map(|(i, label)| (i + 1, label)).collect())
    }

    pub fn get(&self, index: BallotIndex) -> Option<&MapLabel> {
        self.0.get(&index)
    }

    pub fn contains(&self, index: BallotIndex) -> bool {
        self.0.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BallotIndex, &MapLabel)> {
        self.0.iter()
    }

    /// One `"n. label"` line per candidate, in ballot order
    pub fn listing(&self) -> String {
        self.0
            .iter()
            .map(|(index, label)| format!("{}. {}", index, label))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Each voter's latest choice. A second vote from the same voter replaces the first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ballot(HashMap<VoterId, BallotIndex>);

impl Ballot {
    /// Returns the voter's previous choice, if they had one
    pub fn cast(&mut self, voter: VoterId, index: BallotIndex) -> Option<BallotIndex> {
        self.0.insert(voter, index)
    }

    pub fn choice_of(&self, voter: &str) -> Option<BallotIndex> {
        self.0.get(voter).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Votes per ballot index, ordered by index
    pub fn counts(&self) -> BTreeMap<BallotIndex, usize> {
        let mut counts = BTreeMap::new();
        for index in self.0.values() {
            *counts.entry(*index).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TallyOutcome {
    Winner { label: MapLabel, votes: usize },
    NoVotes,
    /// The winning index has no candidate behind it
    Unresolved(BallotIndex),
}

/// Picks the index with the most votes. Ties go to the lowest index.
pub fn tally(ballot: &Ballot, candidates: &CandidateSet) -> TallyOutcome {
    let mut leader: Option<(BallotIndex, usize)> = None;
    // counts() is ordered by index, so a strict comparison keeps the lowest index on ties
    for (index, count) in ballot.counts() {
        if leader.map_or(true, |(_, best)| count > best) {
            leader = Some((index, count));
        }
    }

    let Some((index, votes)) = leader else {
        return TallyOutcome::NoVotes;
    };
    match candidates.get(index) {
        Some(label) => TallyOutcome::Winner {
            label: label.clone(),
            votes,
        },
        None => TallyOutcome::Unresolved(index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ballot(votes: &[(&str, BallotIndex)]) -> Ballot {
        let mut ballot = Ballot::default();
        for (voter, index) in votes {
            ballot.cast(voter.to_string(), *index);
        }
        ballot
    }

    fn maps() -> CandidateSet {
        CandidateSet::from_labels(["Fallujah".to_string(), "Narva".to_string()])
    }

    #[test]
    fn majority_wins() {
        let outcome = tally(&ballot(&[("A", 1), ("B", 1), ("C", 2)]), &maps());
        assert_eq!(
            outcome,
            TallyOutcome::Winner {
                label: "Fallujah".into(),
                votes: 2
            }
        );
    }

    #[test]
    fn last_vote_wins_per_voter() {
        let mut ballot = Ballot::default();
        assert_eq!(ballot.cast("A".into(), 1), None);
        assert_eq!(ballot.cast("A".into(), 2), Some(1));
        assert_eq!(ballot.len(), 1);
        assert_eq!(ballot.choice_of("A"), Some(2));
    }

    #[test]
    fn tie_goes_to_lowest_index() {
        let outcome = tally(&ballot(&[("A", 2), ("B", 1)]), &maps());
        assert_eq!(
            outcome,
            TallyOutcome::Winner {
                label: "Fallujah".into(),
                votes: 1
            }
        );
    }

    #[test]
    fn empty_ballot_has_no_winner() {
        assert_eq!(tally(&Ballot::default(), &maps()), TallyOutcome::NoVotes);
    }

    #[test]
    fn unknown_winning_index_is_unresolved() {
        let outcome = tally(&ballot(&[("A", 5), ("B", 5), ("C", 1)]), &maps());
        assert_eq!(outcome, TallyOutcome::Unresolved(5));
    }

    #[test]
    fn listing_is_numbered_from_one() {
        assert_eq!(maps().listing(), "1. Fallujah\n2. Narva");
        assert!(maps().contains(2));
        assert!(!maps().contains(0));
    }
}
