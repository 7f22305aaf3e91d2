use chrono::NaiveDateTime;
use rayon::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::error::{ProcessingError, Result};
use crate::grid::{nearest_cell, GridSet};
use crate::models::{
    AssignmentRecord, CellRanking, Measure, MeasureAssignment, RankedStation, ResolvedReading,
    Station, StationObservation, StationRanking,
};
use crate::utils::coordinates::euclidean_distance;
use crate::utils::time::open_ended;

/// Ranks weather stations against grid centroids and resolves one reading per cell.
#[derive(Debug, Clone, Copy, Default)]
pub struct StationAssigner;

impl StationAssigner {
    pub fn new() -> Self {
        Self
    }

    /// Distance ranking of every station from every cell centroid.
    ///
    /// Equal distances are ordered by ascending `station_id`. An empty station
    /// list gives every cell an empty ranking.
    pub fn rank(
        &self,
        measure: Measure,
        stations: &[Station],
        grid: &GridSet,
        computed_at: NaiveDateTime,
    ) -> Result<StationRanking> {
        if grid.is_empty() {
            return Err(ProcessingError::EmptyGrid);
        }

        let cells: Vec<CellRanking> = grid
            .cells()
            .par_iter()
            .map(|cell| {
                let centroid = cell.centroid_lon_lat();
                let mut distances: Vec<(&Station, f64)> = stations
                    .iter()
                    .map(|s| (s, euclidean_distance(centroid, s.location())))
                    .collect();
                distances.sort_by(|a, b| {
                    a.1.total_cmp(&b.1)
                        .then_with(|| a.0.station_id.cmp(&b.0.station_id))
                });

                CellRanking {
                    grid_num: cell.grid_num,
                    stations: distances
                        .into_iter()
                        .enumerate()
                        .map(|(rank, (station, distance))| RankedStation {
                            station_id: station.station_id.clone(),
                            rank: rank as u32,
                            distance,
                        })
                        .collect(),
                }
            })
            .collect();

        debug!(
            measure = %measure,
            stations = stations.len(),
            cells = cells.len(),
            "Ranked stations"
        );

        Ok(StationRanking {
            measure,
            computed_at,
            fingerprint: station_fingerprint(stations),
            cells,
        })
    }

    /// Picks, per cell, the lowest-ranked station that has a reading.
    ///
    /// With a `timestamp`, readings taken after it are ignored and each
    /// station contributes its latest remaining reading.
    pub fn resolve(
        &self,
        ranking: &StationRanking,
        observations: &[StationObservation],
        timestamp: Option<NaiveDateTime>,
    ) -> MeasureAssignment {
        let mut readings: HashMap<&str, &StationObservation> = HashMap::new();
        for obs in observations.iter().filter(|o| {
            o.measure == ranking.measure
                && o.value.is_finite()
                && timestamp.map_or(true, |ts| o.timestamp <= ts)
        }) {
            readings
                .entry(obs.station_id.as_str())
                .and_modify(|kept| {
                    if obs.timestamp >= kept.timestamp {
                        *kept = obs;
                    }
                })
                .or_insert(obs);
        }

        let by_cell: BTreeMap<u32, Option<ResolvedReading>> = ranking
            .cells
            .iter()
            .map(|cell| {
                let resolved = cell.stations.iter().find_map(|ranked| {
                    readings
                        .get(ranked.station_id.as_str())
                        .map(|obs| ResolvedReading {
                            station_id: ranked.station_id.clone(),
                            rank: ranked.rank,
                            value: obs.value,
                            timestamp: obs.timestamp,
                        })
                });
                (cell.grid_num, resolved)
            })
            .collect();

        let timestamp = timestamp.or_else(|| observations.first().map(|o| o.timestamp));

        MeasureAssignment {
            measure: ranking.measure,
            timestamp,
            by_cell,
        }
    }

    /// Cell each station sits nearest to, keyed by `station_id`.
    pub fn home_cells(&self, stations: &[Station], grid: &GridSet) -> BTreeMap<String, u32> {
        stations
            .iter()
            .filter_map(|s| {
                nearest_cell(s.location(), grid.cells()).map(|cell| (s.station_id.clone(), cell.grid_num))
            })
            .collect()
    }

    /// Ranks and resolves in one step.
    pub fn assign(
        &self,
        measure: Measure,
        stations: &[Station],
        observations: &[StationObservation],
        grid: &GridSet,
        timestamp: NaiveDateTime,
    ) -> Result<MeasureAssignment> {
        let ranking = self.rank(measure, stations, grid, timestamp)?;
        Ok(self.resolve(&ranking, observations, Some(timestamp)))
    }
}

/// Order-independent hash of station ids and coordinates.
pub fn station_fingerprint(stations: &[Station]) -> u64 {
    let mut keys: Vec<(&str, u64, u64)> = stations
        .iter()
        .map(|s| (s.station_id.as_str(), s.longitude.to_bits(), s.latitude.to_bits()))
        .collect();
    keys.sort_unstable();

    let mut hasher = DefaultHasher::new();
    keys.hash(&mut hasher);
    hasher.finish()
}

/// Rows for the `assignment-station` table: the winning station per measure for each cell.
pub fn assignment_records(
    assignments: &[MeasureAssignment],
    date_active: NaiveDateTime,
    date_inactive: NaiveDateTime,
) -> Vec<AssignmentRecord> {
    let mut records: BTreeMap<u32, AssignmentRecord> = BTreeMap::new();
    for assignment in assignments {
        for (grid_num, reading) in &assignment.by_cell {
            records
                .entry(*grid_num)
                .or_insert_with(|| AssignmentRecord::new(*grid_num, date_active, date_inactive))
                .set_station(
                    assignment.measure,
                    reading.as_ref().map(|r| r.station_id.clone()),
                );
        }
    }
    records.into_values().collect()
}

/// Validity window of one cached ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentWindow {
    pub measure: Measure,
    pub fingerprint: u64,
    pub date_active: NaiveDateTime,
    pub date_inactive: NaiveDateTime,
}

impl AssignmentWindow {
    /// `date_active` inclusive, `date_inactive` exclusive.
    pub fn is_active_at(&self, timestamp: NaiveDateTime) -> bool {
        self.date_active <= timestamp && timestamp < self.date_inactive
    }
}

#[derive(Debug)]
struct CacheEntry {
    ranking: Arc<StationRanking>,
    window: AssignmentWindow,
}

#[derive(Debug, Default)]
struct CacheState {
    current: HashMap<Measure, CacheEntry>,
    closed: Vec<AssignmentWindow>,
    hits: usize,
    misses: usize,
}

impl CacheState {
    /// Latest end of a closed window for `measure` that still precedes the current window.
    fn closed_until(&self, measure: Measure) -> Option<NaiveDateTime> {
        let start = self.current.get(&measure)?.window.date_active;
        self.closed
            .iter()
            .filter(|w| w.measure == measure && w.date_inactive <= start)
            .map(|w| w.date_inactive)
            .max()
    }
}

/// Reuses a ranking while the station set is unchanged, in whatever order the
/// timestamps arrive. Windows never overlap. Safe to share between batch workers.
#[derive(Debug, Default)]
pub struct AssignmentCache {
    state: Mutex<CacheState>,
}

impl AssignmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ranking(
        &self,
        assigner: &StationAssigner,
        measure: Measure,
        stations: &[Station],
        grid: &GridSet,
        timestamp: NaiveDateTime,
    ) -> Result<Arc<StationRanking>> {
        let fingerprint = station_fingerprint(stations);

        {
            let mut state = self.lock();
            let floor = state.closed_until(measure);
            let reusable = state.current.get_mut(&measure).and_then(|entry| {
                let window = &mut entry.window;
                if window.fingerprint != fingerprint || timestamp >= window.date_inactive {
                    return None;
                }
                // Same station set seen earlier than the window start: widen it,
                // without reaching back into a closed window.
                if timestamp < window.date_active {
                    window.date_active = floor.map_or(timestamp, |f| f.max(timestamp));
                }
                Some(entry.ranking.clone())
            });
            if let Some(ranking) = reusable {
                state.hits += 1;
                return Ok(ranking);
            }
        }

        let ranking = Arc::new(assigner.rank(measure, stations, grid, timestamp)?);

        let mut state = self.lock();
        state.misses += 1;
        let current_start = state.current.get(&measure).map(|e| e.window.date_active);

        match current_start {
            // A different station set before the current window: it only
            // holds until the current window starts.
            Some(start) if timestamp < start => {
                let window = AssignmentWindow {
                    measure,
                    fingerprint,
                    date_active: timestamp,
                    date_inactive: start,
                };
                debug!(
                    measure = %measure,
                    date_active = %window.date_active,
                    date_inactive = %window.date_inactive,
                    "Recorded earlier station assignment window"
                );
                state.closed.push(window);
            }
            _ => {
                let window = AssignmentWindow {
                    measure,
                    fingerprint,
                    date_active: timestamp,
                    date_inactive: open_ended(),
                };
                if let Some(previous) = state.current.insert(
                    measure,
                    CacheEntry {
                        ranking: ranking.clone(),
                        window,
                    },
                ) {
                    let mut closed = previous.window;
                    closed.date_inactive = timestamp;
                    debug!(
                        measure = %measure,
                        date_active = %closed.date_active,
                        date_inactive = %closed.date_inactive,
                        "Closed station assignment window"
                    );
                    state.closed.push(closed);
                }
            }
        }

        Ok(ranking)
    }

    /// Closed windows followed by the current window of each measure.
    pub fn windows(&self) -> Vec<AssignmentWindow> {
        let state = self.lock();
        let mut windows = state.closed.clone();
        let mut current: Vec<AssignmentWindow> =
            state.current.values().map(|e| e.window.clone()).collect();
        current.sort_by_key(|w| w.measure);
        windows.extend(current);
        windows
    }

    /// (hits, misses)
    pub fn stats(&self) -> (usize, usize) {
        let state = self.lock();
        (state.hits, state.misses)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
