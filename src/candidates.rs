use std::{
    future::Future,
    path::PathBuf,
};

use rand::seq::SliceRandom;

use crate::{
    error::CandidateError,
    tally::{
        CandidateSet,
        MapLabel,
    },
};

/// Supplies the options for one election
pub trait CandidateProvider {
    /// Must return exactly `count` candidates numbered 1..=count, or an error
    fn candidates(
        &self,
        count: usize,
    ) -> impl Future<Output = Result<CandidateSet, CandidateError>> + Send;
}

/// Draws candidates from a map rotation file with one layer per line. The file is re-read for
/// every election.
#[derive(Debug, Clone)]
pub struct RotationFileProvider {
    path: PathBuf,
}

impl RotationFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CandidateProvider for RotationFileProvider {
    async fn candidates(&self, count: usize) -> Result<CandidateSet, CandidateError> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        let rotation = parse_rotation(&contents);
        tracing::debug!(
            "Loaded {} maps from {}",
            rotation.len(),
            self.path.display()
        );
        draw_candidates(&rotation, count, &mut rand::thread_rng())
    }
}

/// Blank lines and `//` or `#` comments are skipped
pub fn parse_rotation(contents: &str) -> Vec<MapLabel> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("//") && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Picks `count` entries from `rotation`, uniformly at random. Entries are distinct unless the
/// rotation is shorter than `count`, in which case every entry is used once and the rest are
/// drawn again with replacement.
pub fn draw_candidates<R: rand::Rng + ?Sized>(
    rotation: &[MapLabel],
    count: usize,
    rng: &mut R,
) -> Result<CandidateSet, CandidateError> {
    if rotation.is_empty() {
        return Err(CandidateError::EmptyRotation);
    }
    let mut labels: Vec<MapLabel> = rotation
        .choose_multiple(rng, count.min(rotation.len()))
        .cloned()
        .collect();
    if labels.len() < count {
        tracing::warn!(
            "Map rotation only has {} entries for {} candidates; some maps will repeat",
            rotation.len(),
            count
        );
        while labels.len() < count {
            if let Some(label) = rotation.choose(rng) {
                labels.push(label.clone());
            }
        }
    }
    Ok(CandidateSet::from_labels(labels))
}
