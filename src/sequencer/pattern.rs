// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{fmt, sync::Arc};

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use super::tempo::Tempo;
use super::tracks::{STEPS_PER_BAR, TRACK_COUNT};

/// The raw grid, indexed by `[track][step]`.
pub type Grid = [[bool; STEPS_PER_BAR]; TRACK_COUNT];

/// A full track x step grid of booleans. The shape is fixed by the type, so a
/// pattern always has exactly TRACK_COUNT rows of STEPS_PER_BAR cells.
///
/// Serializes as nested boolean arrays. Deserialization never fails on shape:
/// whatever arrives is normalized with [`Pattern::normalize`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Pattern {
    cells: Grid,
}

impl Pattern {
    /// An all-false pattern.
    pub fn empty() -> Pattern {
        Pattern::default()
    }

    /// Returns whether the given cell is active. Out of range cells are inactive.
    pub fn get(&self, track: usize, step: usize) -> bool {
        self.cells
            .get(track)
            .and_then(|row| row.get(step))
            .copied()
            .unwrap_or(false)
    }

    /// Returns a copy of this pattern with the given cell flipped. Out of range
    /// coordinates return the pattern unchanged.
    pub fn toggled(&self, track: usize, step: usize) -> Pattern {
        let mut pattern = *self;
        if let Some(cell) = pattern.cells.get_mut(track).and_then(|row| row.get_mut(step)) {
            *cell = !*cell;
        }
        pattern
    }

    /// The tracks that are active on the given step.
    pub fn active_tracks(&self, step: usize) -> impl Iterator<Item = usize> + '_ {
        (0..TRACK_COUNT).filter(move |track| self.get(*track, step))
    }

    /// The underlying grid.
    pub fn grid(&self) -> &Grid {
        &self.cells
    }

    /// Returns the number of active cells.
    pub fn active_count(&self) -> usize {
        self.cells.iter().flatten().filter(|cell| **cell).count()
    }

    /// Normalizes an externally supplied grid into a pattern. Over-long rows are
    /// truncated, short rows and missing rows are padded with false, surplus rows
    /// are dropped and cells are coerced to booleans. Anything that is not an
    /// array becomes an empty pattern.
    pub fn normalize(data: &Value) -> Pattern {
        let mut pattern = Pattern::empty();
        let rows = match data.as_array() {
            Some(rows) => rows,
            None => {
                debug!("Pattern data is not an array, using an empty pattern");
                return pattern;
            }
        };

        for (track, row) in rows.iter().take(TRACK_COUNT).enumerate() {
            if let Some(cells) = row.as_array() {
                for (step, cell) in cells.iter().take(STEPS_PER_BAR).enumerate() {
                    pattern.cells[track][step] = truthy(cell);
                }
            }
        }

        pattern
    }

    /// Builds a pattern from nested rows of arbitrary shape.
    pub fn from_rows(rows: &[Vec<bool>]) -> Pattern {
        let mut pattern = Pattern::empty();
        for (track, row) in rows.iter().take(TRACK_COUNT).enumerate() {
            for (step, cell) in row.iter().take(STEPS_PER_BAR).enumerate() {
                pattern.cells[track][step] = *cell;
            }
        }
        pattern
    }

    /// Returns the pattern as nested rows.
    pub fn to_rows(&self) -> Vec<Vec<bool>> {
        self.cells.iter().map(|row| row.to_vec()).collect()
    }
}

/// Coerces a JSON value to a boolean the way a loosely typed client would.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Pattern::normalize(&value))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (track, row) in self.cells.iter().enumerate() {
            if track > 0 {
                writeln!(f)?;
            }
            for (step, cell) in row.iter().enumerate() {
                if step > 0 && step % 4 == 0 {
                    write!(f, " ")?;
                }
                write!(f, "{}", if *cell { 'x' } else { '.' })?;
            }
        }
        Ok(())
    }
}

/// The single shared slot holding the current pattern. The UI writes to it and
/// the engine reads a fresh snapshot from it on every tick, so edits made while
/// playing are heard from the next step on.
#[derive(Clone, Default)]
pub struct PatternStore {
    pattern: Arc<RwLock<Pattern>>,
}

impl PatternStore {
    /// Creates a store holding an empty pattern.
    pub fn new() -> PatternStore {
        PatternStore::default()
    }

    /// Returns a copy of the current pattern.
    pub fn snapshot(&self) -> Pattern {
        *self.pattern.read()
    }

    /// Replaces the current pattern.
    pub fn set(&self, pattern: Pattern) {
        *self.pattern.write() = pattern;
    }

    /// Returns whether the given cell is active.
    pub fn get(&self, track: usize, step: usize) -> bool {
        self.pattern.read().get(track, step)
    }

    /// Flips one cell and returns the new pattern.
    pub fn toggle(&self, track: usize, step: usize) -> Pattern {
        let mut pattern = self.pattern.write();
        *pattern = pattern.toggled(track, step);
        *pattern
    }

    /// Clears every cell and returns the new pattern.
    pub fn reset(&self) -> Pattern {
        let mut pattern = self.pattern.write();
        *pattern = Pattern::empty();
        *pattern
    }

    /// Replaces the pattern with normalized external data. The tempo is brought
    /// into range and handed back with the new pattern.
    pub fn load(&self, data: &Value, bpm: f64) -> (Pattern, Tempo) {
        let pattern = Pattern::normalize(data);
        self.set(pattern);
        (pattern, Tempo::from_f64(bpm))
    }
}

impl fmt::Debug for PatternStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternStore")
            .field("active_cells", &self.pattern.read().active_count())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn assert_shape(pattern: &Pattern) {
        assert_eq!(TRACK_COUNT, pattern.to_rows().len());
        for row in pattern.to_rows() {
            assert_eq!(STEPS_PER_BAR, row.len());
        }
    }

    #[test]
    fn test_double_toggle_restores() {
        let store = PatternStore::new();
        store.toggle(2, 5);
        let original = store.snapshot();

        for track in 0..TRACK_COUNT {
            for step in 0..STEPS_PER_BAR {
                let once = store.toggle(track, step);
                assert_ne!(original.get(track, step), once.get(track, step));
                let twice = store.toggle(track, step);
                assert_eq!(original, twice);
            }
        }
    }

    #[test]
    fn test_toggle_out_of_range() {
        let pattern = Pattern::empty();
        assert_eq!(pattern, pattern.toggled(TRACK_COUNT, 0));
        assert_eq!(pattern, pattern.toggled(0, STEPS_PER_BAR));
        assert!(!pattern.get(99, 99));
    }

    #[test]
    fn test_reset() {
        let store = PatternStore::new();
        store.toggle(0, 0);
        store.toggle(4, 15);

        let pattern = store.reset();
        assert_shape(&pattern);
        assert_eq!(0, pattern.active_count());
        assert_eq!(pattern, store.snapshot());
    }

    #[test]
    fn test_load_pads_missing_rows() {
        let store = PatternStore::new();
        let data = json!([
            [true, false, true],
            vec![false; 20],
            vec![true; 20],
        ]);

        let (pattern, tempo) = store.load(&data, 95.0);
        assert_shape(&pattern);
        assert_eq!(95, tempo.bpm());

        assert!(pattern.get(0, 0));
        assert!(!pattern.get(0, 1));
        assert!(pattern.get(0, 2));
        assert!(!pattern.get(0, 3));
        assert_eq!(0, pattern.grid()[1].iter().filter(|c| **c).count());
        assert_eq!(STEPS_PER_BAR, pattern.grid()[2].iter().filter(|c| **c).count());
        assert_eq!(0, pattern.grid()[3].iter().filter(|c| **c).count());
        assert_eq!(0, pattern.grid()[4].iter().filter(|c| **c).count());
        assert_eq!(pattern, store.snapshot());
    }

    #[test]
    fn test_load_malformed() {
        let store = PatternStore::new();
        let inputs = vec![
            json!(null),
            json!("pattern"),
            json!({"rows": 5}),
            json!([1, "a", null]),
            json!([[1, 0, "yes", "", null, {}, [], 0.5]]),
            json!(vec![vec![true; 3]; 12]),
        ];

        for input in inputs {
            let (pattern, _) = store.load(&input, 120.0);
            assert_shape(&pattern);
        }

        let (pattern, tempo) =
            store.load(&json!([[1, 0, "yes", "", null, {}, [], 0.5]]), f64::NAN);
        assert_eq!(
            vec![true, false, true, false, false, true, true, true],
            pattern.grid()[0][..8].to_vec()
        );
        assert_eq!(120, tempo.bpm());
    }

    #[test]
    fn test_surplus_rows_dropped() {
        let pattern = Pattern::normalize(&json!(vec![vec![true; 16]; 7]));
        assert_shape(&pattern);
        assert_eq!(TRACK_COUNT * STEPS_PER_BAR, pattern.active_count());
    }

    #[test]
    fn test_serde() {
        let pattern = Pattern::empty().toggled(0, 0).toggled(3, 7);
        let json = serde_json::to_value(pattern).unwrap();
        assert_eq!(TRACK_COUNT, json.as_array().unwrap().len());

        let back: Pattern = serde_json::from_value(json).unwrap();
        assert_eq!(pattern, back);

        let short: Pattern = serde_json::from_str("[[true]]").unwrap();
        assert!(short.get(0, 0));
        assert_eq!(1, short.active_count());
    }

    #[test]
    fn test_active_tracks() {
        let pattern = Pattern::empty().toggled(0, 4).toggled(3, 4).toggled(1, 5);
        assert_eq!(vec![0, 3], pattern.active_tracks(4).collect::<Vec<_>>());
        assert!(pattern.active_tracks(0).next().is_none());
    }

    #[test]
    fn test_display() {
        let pattern = Pattern::empty().toggled(0, 0).toggled(0, 4);
        let display = pattern.to_string();
        assert_eq!("x... x... .... ....", display.lines().next().unwrap());
        assert_eq!(TRACK_COUNT, display.lines().count());
    }
}
