use chrono::NaiveDateTime;
use futures::future::try_join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{ProcessingError, Result};
use crate::grid::{GridIndex, GridSet};
use crate::models::{GridObservation, Measure, MeasureAssignment, TaxiSnapshot};
use crate::processors::integrity_checker::{MergeChecker, MergeReport};
use crate::processors::observation_merger::ObservationMerger;
use crate::processors::station_assigner::{AssignmentCache, StationAssigner};
use crate::processors::taxi_aggregator::{AssignmentStrategy, TaxiAggregator, TaxiCounts};
use crate::readers::{SliceSource, WeatherSnapshot};
use crate::utils::constants::{GRID_OBSERVATIONS_TABLE, TAXI_ASSIGNMENT_TABLE};
use crate::utils::progress::ProgressReporter;
use crate::writers::{append_rows, WarehouseWriter};

/// Everything produced for one timestamp.
#[derive(Debug, Clone)]
pub struct SliceResult {
    pub timestamp: NaiveDateTime,
    pub taxis: TaxiCounts,
    pub assignments: Vec<MeasureAssignment>,
    pub rows: Vec<GridObservation>,
    pub report: MergeReport,
}

/// Aggregation, station assignment and merge for a single timestamp.
///
/// Clones share the grid and the assignment cache.
#[derive(Debug, Clone)]
pub struct SlicePipeline {
    aggregator: TaxiAggregator,
    assigner: StationAssigner,
    merger: ObservationMerger,
    cache: Arc<AssignmentCache>,
}

impl SlicePipeline {
    pub fn new(index: GridIndex) -> Self {
        let merger = ObservationMerger::new(index.grid().clone());
        Self {
            aggregator: TaxiAggregator::new(index),
            assigner: StationAssigner::new(),
            merger,
            cache: Arc::new(AssignmentCache::new()),
        }
    }

    pub fn with_strategy(mut self, strategy: AssignmentStrategy) -> Self {
        self.aggregator = self.aggregator.with_strategy(strategy);
        self
    }

    pub fn grid(&self) -> &Arc<GridSet> {
        self.aggregator.index().grid()
    }

    pub fn aggregator(&self) -> &TaxiAggregator {
        &self.aggregator
    }

    pub fn cache(&self) -> &Arc<AssignmentCache> {
        &self.cache
    }

    /// Resolves one measure's readings onto every cell, reusing the cached
    /// ranking when the station set is unchanged.
    pub fn assign_measure(
        &self,
        snapshot: &WeatherSnapshot,
        timestamp: NaiveDateTime,
    ) -> Result<MeasureAssignment> {
        let ranking = self.cache.ranking(
            &self.assigner,
            snapshot.measure,
            &snapshot.stations,
            self.grid(),
            timestamp,
        )?;
        Ok(self
            .assigner
            .resolve(&ranking, &snapshot.observations, Some(timestamp)))
    }

    /// Rows are stamped with the slice `timestamp`, not the snapshot's own.
    pub fn process(
        &self,
        timestamp: NaiveDateTime,
        taxi: &TaxiSnapshot,
        weather: &[WeatherSnapshot],
    ) -> Result<SliceResult> {
        debug!(slice = %timestamp, snapshot = %taxi.timestamp, "Processing slice");

        let taxis = self.aggregator.aggregate_fixes(timestamp, &taxi.fixes);
        let assignments = weather
            .iter()
            .map(|snapshot| self.assign_measure(snapshot, timestamp))
            .collect::<Result<Vec<_>>>()?;

        let rows = self.merger.merge(timestamp, Some(&taxis), &assignments)?;
        let report = MergeChecker::check(timestamp, &rows, self.grid(), Some(&taxis));

        Ok(SliceResult {
            timestamp,
            taxis,
            assignments,
            rows,
            report,
        })
    }

    /// Fetches the taxi snapshot and every weather measure, then processes them
    /// on the blocking pool. Any fetch or parse failure fails the slice.
    pub async fn run(&self, source: &dyn SliceSource, timestamp: NaiveDateTime) -> Result<SliceResult> {
        let taxi = source.taxi_snapshot(timestamp);
        let weather = try_join_all(
            Measure::ALL
                .iter()
                .map(|&measure| source.weather_snapshot(measure, timestamp)),
        );
        let (taxi, weather) = tokio::try_join!(taxi, weather)?;

        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || pipeline.process(timestamp, &taxi, &weather)).await?
    }
}

#[derive(Debug)]
pub struct SliceFailure {
    pub timestamp: NaiveDateTime,
    pub error: ProcessingError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// Ascending by timestamp.
    pub completed: Vec<SliceResult>,
    /// Ascending by timestamp.
    pub failures: Vec<SliceFailure>,
}

impl BatchReport {
    pub fn total_rows(&self) -> usize {
        self.completed.iter().map(|s| s.rows.len()).sum()
    }

    pub fn failed_timestamps(&self) -> Vec<NaiveDateTime> {
        self.failures.iter().map(|f| f.timestamp).collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = &GridObservation> {
        self.completed.iter().flat_map(|s| s.rows.iter())
    }

    pub fn generate_summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("=== Batch Summary ===\n");
        summary.push_str(&format!(
            "Slices: {} completed, {} failed\n",
            self.completed.len(),
            self.failures.len()
        ));
        summary.push_str(&format!("Rows merged: {}\n", self.total_rows()));

        let incomplete = self.completed.iter().filter(|s| !s.report.is_complete()).count();
        if incomplete > 0 {
            summary.push_str(&format!("Incomplete slices: {}\n", incomplete));
        }
        for failure in &self.failures {
            summary.push_str(&format!("  FAILED {}: {}\n", failure.timestamp, failure.error));
        }
        summary
    }
}

/// Runs the slice pipeline over many timestamps with bounded concurrency.
///
/// A failed slice is recorded and skipped; configuration errors abort the run.
pub struct BatchProcessor {
    pipeline: Arc<SlicePipeline>,
    source: Arc<dyn SliceSource>,
    sink: Option<Arc<dyn WarehouseWriter>>,
    max_workers: usize,
    silent: bool,
}

impl BatchProcessor {
    pub fn new(pipeline: Arc<SlicePipeline>, source: Arc<dyn SliceSource>) -> Self {
        Self {
            pipeline,
            source,
            sink: None,
            max_workers: num_cpus::get(),
            silent: true,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn WarehouseWriter>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.silent = !show;
        self
    }

    pub async fn run(&self, timestamps: &[NaiveDateTime]) -> Result<BatchReport> {
        info!(
            slices = timestamps.len(),
            workers = self.max_workers,
            "Starting batch"
        );

        let progress = ProgressReporter::new(timestamps.len() as u64, "Merging slices", self.silent);
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();

        for &timestamp in timestamps {
            let pipeline = self.pipeline.clone();
            let source = self.source.clone();
            let sink = self.sink.clone();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => run_slice(&pipeline, source.as_ref(), sink.as_deref(), timestamp).await,
                    Err(e) => Err(ProcessingError::Config(format!("Worker pool closed: {}", e))),
                };
                (timestamp, result)
            });
        }

        let mut report = BatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            let (timestamp, result) = joined?;
            progress.increment(1);

            match result {
                Ok(slice) => report.completed.push(slice),
                Err(error) if error.is_configuration() => {
                    tasks.abort_all();
                    return Err(error);
                }
                Err(error) => {
                    warn!(timestamp = %timestamp, "Slice failed: {}", error);
                    report.failures.push(SliceFailure { timestamp, error });
                }
            }
        }

        report.completed.sort_by_key(|s| s.timestamp);
        report.failures.sort_by_key(|f| f.timestamp);

        progress.finish_with_message(&format!(
            "{} slices merged, {} failed",
            report.completed.len(),
            report.failures.len()
        ));
        info!(
            completed = report.completed.len(),
            failed = report.failures.len(),
            "Batch finished"
        );

        Ok(report)
    }
}

/// Processes one slice and appends its outputs to `sink`.
pub async fn run_slice(
    pipeline: &SlicePipeline,
    source: &dyn SliceSource,
    sink: Option<&dyn WarehouseWriter>,
    timestamp: NaiveDateTime,
) -> Result<SliceResult> {
    let slice = pipeline.run(source, timestamp).await?;

    if let Some(sink) = sink {
        append_rows(sink, TAXI_ASSIGNMENT_TABLE, &slice.taxis.rows()).await?;
        append_rows(sink, GRID_OBSERVATIONS_TABLE, &slice.rows).await?;
    }

    Ok(slice)
}
