use serde::{Deserialize, Serialize};

use crate::{side::Side, snapshot::AnalysisSnapshot};

/// Ply-indexed sparse sequence of snapshots.
///
/// Consumers index by ply, so a late snapshot for an earlier ply fills its
/// gap instead of disturbing the ordering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlyTrack {
    entries: Vec<Option<AnalysisSnapshot>>,
}

impl PlyTrack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, snapshot: AnalysisSnapshot) {
        let idx = snapshot.ply as usize;
        if self.entries.len() <= idx {
            self.entries.resize(idx + 1, None);
        }
        self.entries[idx] = Some(snapshot);
    }

    pub fn get(&self, ply: u32) -> Option<&AnalysisSnapshot> {
        self.entries.get(ply as usize).and_then(Option::as_ref)
    }

    pub fn latest(&self) -> Option<&AnalysisSnapshot> {
        self.entries.iter().rev().find_map(Option::as_ref)
    }

    /// Highest ply slot plus one, gaps included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(Option::is_none)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnalysisSnapshot> {
        self.entries.iter().flatten()
    }

    pub fn plies(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_some())
            .map(|(idx, _)| idx as u32)
    }
}

/// Per-side tracks, as the archive extractor produces them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationTracks {
    pub white: PlyTrack,
    pub black: PlyTrack,
}

impl AnnotationTracks {
    pub fn insert(&mut self, snapshot: AnalysisSnapshot) {
        match snapshot.side {
            Side::White => self.white.insert(snapshot),
            Side::Black => self.black.insert(snapshot),
        }
    }

    pub fn for_side(&self, side: Side) -> &PlyTrack {
        match side {
            Side::White => &self.white,
            Side::Black => &self.black,
        }
    }

    pub fn get(&self, ply: u32) -> Option<&AnalysisSnapshot> {
        self.white.get(ply).or_else(|| self.black.get(ply))
    }

    pub fn total(&self) -> usize {
        self.white.iter().count() + self.black.iter().count()
    }
}
