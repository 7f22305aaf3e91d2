use anyhow::{bail, Context};
use chrono::{Duration, NaiveDateTime};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::analyzers::TaxiAdvisor;
use crate::cli::args::{Cli, Commands, SourceKind};
use crate::clients::{DataApiClient, GovDataClient, HttpPredictor};
use crate::config::AppConfig;
use crate::grid::{GridIndex, GridSet, LatticeConfig};
use crate::models::{DataDomain, Measure};
use crate::processors::{
    assignment_records, run_slice, AssignmentStrategy, BatchProcessor, SlicePipeline,
    StationAssigner, TaxiAggregator,
};
use crate::readers::{
    write_lattice_geojson, ApiSliceSource, GridDataLoader, SliceSource, SnapshotStore,
    StoreSliceSource, TaxiParser, WeatherParser,
};
use crate::utils::constants::{
    GRID_OBSERVATIONS_TABLE, STATION_ASSIGNMENT_TABLE, TAXI_ASSIGNMENT_TABLE, TAXI_AVAILABILITY_TABLE,
};
use crate::utils::progress::ProgressReporter;
use crate::utils::time::{now_sgt, open_ended, parse_timestamp, round_down, timestamp_steps};
use crate::writers::{append_rows, write_csv, ParquetWarehouse, WarehouseWriter};

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let quiet = cli.quiet;

    match cli.command {
        Commands::Ingest { timestamp, domains } => {
            let timestamp = resolve_timestamp(timestamp.as_deref(), &config)?;
            let domains = parse_domains(&domains)?;
            let client = GovDataClient::new(&config.api)?;
            let store = SnapshotStore::from_config(&config.store)?;

            println!("Ingesting {} domains at {} into {}", domains.len(), timestamp, store.description());

            let mut failures = 0;
            for domain in &domains {
                let result = async {
                    let value = client.fetch(*domain, timestamp).await?;
                    store.put_snapshot(*domain, timestamp, &value).await
                }
                .await;

                match result {
                    Ok(path) => println!("  {} -> {}", domain, path),
                    Err(e) => {
                        warn!(domain = %domain, "Ingest failed: {}", e);
                        failures += 1;
                    }
                }
            }

            if failures == domains.len() {
                bail!("Every domain failed to ingest");
            }
            println!("Ingest complete ({} failed)", failures);
        }

        Commands::Load {
            domains,
            file,
            latest,
            start,
            end,
        } => {
            let domains = parse_domains(&domains)?;
            let store = SnapshotStore::from_config(&config.store)?;
            let warehouse = ParquetWarehouse::from_config(&config.warehouse)?;

            let mut loaded = 0;
            let mut skipped = 0;
            for domain in domains {
                let paths = match (&file, latest) {
                    (Some(path), _) if path.starts_with(domain.store_prefix()) => vec![path.clone()],
                    (Some(_), _) => continue,
                    (None, true) => store.latest(domain).await?.into_iter().collect(),
                    (None, false) => store.window(domain, start.as_deref(), end.as_deref()).await?,
                };

                let progress = ProgressReporter::new(paths.len() as u64, &format!("Loading {}", domain), quiet);
                for path in &paths {
                    match load_snapshot(&store, &warehouse, domain, path).await {
                        Ok(rows) => {
                            loaded += 1;
                            info!(path = %path, rows, "Loaded snapshot");
                        }
                        Err(e) => {
                            skipped += 1;
                            warn!(path = %path, "Skipping snapshot: {}", e);
                        }
                    }
                    progress.increment(1);
                }
                progress.finish_with_message(&format!("{}: {} files", domain, paths.len()));
            }

            println!("Loaded {} snapshots, skipped {}", loaded, skipped);
        }

        Commands::AssignStations {
            timestamp,
            date_inactive,
            source,
        } => {
            let timestamp = resolve_timestamp(timestamp.as_deref(), &config)?;
            let date_inactive = match date_inactive {
                Some(s) => parse_timestamp(&s)?,
                None => open_ended(),
            };
            let index = load_index(&config, None)?;
            let source = slice_source(&config, source)?;
            let warehouse = ParquetWarehouse::from_config(&config.warehouse)?;
            let assigner = StationAssigner::new();

            let mut assignments = Vec::with_capacity(Measure::ALL.len());
            for measure in Measure::ALL {
                let snapshot = source.weather_snapshot(measure, timestamp).await?;
                let assignment = assigner.assign(
                    measure,
                    &snapshot.stations,
                    &snapshot.observations,
                    index.grid(),
                    timestamp,
                )?;
                let homes = assigner.home_cells(&snapshot.stations, index.grid());
                let occupied: HashSet<u32> = homes.values().copied().collect();
                println!(
                    "{}: {} stations in {} cells, {}/{} cells resolved",
                    measure.display_name(),
                    snapshot.stations.len(),
                    occupied.len(),
                    assignment.resolved_count(),
                    index.grid().len()
                );
                assignments.push(assignment);
            }

            let records = assignment_records(&assignments, timestamp, date_inactive);
            let written = append_rows(&warehouse, STATION_ASSIGNMENT_TABLE, &records).await?;
            println!("Wrote {} station assignments", written);
        }

        Commands::AssignTaxis {
            timestamp,
            strategy,
            source,
        } => {
            let timestamp = resolve_timestamp(timestamp.as_deref(), &config)?;
            let strategy = resolve_strategy(strategy.as_deref(), &config)?;
            let aggregator = TaxiAggregator::new(load_index(&config, None)?).with_strategy(strategy);
            let source = slice_source(&config, source)?;
            let warehouse = ParquetWarehouse::from_config(&config.warehouse)?;

            let snapshot = source.taxi_snapshot(timestamp).await?;
            let counts = aggregator.aggregate_fixes(timestamp, &snapshot.fixes);
            let written = append_rows(&warehouse, TAXI_ASSIGNMENT_TABLE, &counts.rows()).await?;

            println!(
                "{} taxis at {}: {} mapped, {} out of bounds ({} strategy)",
                counts.total_fixes,
                snapshot.timestamp,
                counts.mapped_fixes(),
                counts.out_of_bounds,
                strategy
            );
            println!("Wrote {} cell counts", written);
        }

        Commands::Merge {
            timestamp,
            source,
            output_csv,
        } => {
            let timestamp = resolve_timestamp(timestamp.as_deref(), &config)?;
            let pipeline = build_pipeline(&config)?;
            let source = slice_source(&config, source)?;
            let warehouse = ParquetWarehouse::from_config(&config.warehouse)?;

            let sink: &dyn WarehouseWriter = &warehouse;
            let slice = run_slice(&pipeline, source.as_ref(), Some(sink), timestamp)
                .await
                .with_context(|| format!("Merge failed for {}", timestamp))?;

            println!("\n{}", slice.report.generate_summary());
            if let Some(path) = output_csv {
                let written = write_csv(&slice.rows, &path)?;
                println!("Wrote {} rows to {}", written, path.display());
            }
        }

        Commands::Batch {
            start,
            end,
            step_minutes,
            max_workers,
            source,
            output_csv,
        } => {
            let step = step_minutes.unwrap_or(config.batch.step_minutes);
            let start = parse_timestamp(&start)?;
            let end = parse_timestamp(&end)?;
            let timestamps = timestamp_steps(start, end, step);
            if timestamps.is_empty() {
                bail!("No slices between {} and {}", start, end);
            }

            let warehouse = Arc::new(ParquetWarehouse::from_config(&config.warehouse)?);
            let pipeline = Arc::new(build_pipeline(&config)?);
            let sink: Arc<dyn WarehouseWriter> = warehouse.clone();
            let processor = BatchProcessor::new(pipeline.clone(), slice_source(&config, source)?)
                .with_sink(sink)
                .with_max_workers(max_workers.unwrap_or(config.batch.max_workers))
                .with_progress(!quiet);

            let report = processor.run(&timestamps).await?;
            println!("\n{}", report.generate_summary());

            let (hits, misses) = pipeline.cache().stats();
            info!(hits, misses, "Station ranking reuse");
            if let Some(last) = warehouse.part_files(GRID_OBSERVATIONS_TABLE)?.last() {
                println!("{}", warehouse.file_info(last)?.summary());
            }

            if let Some(path) = output_csv {
                let rows: Vec<_> = report.rows().cloned().collect();
                let written = write_csv(&rows, &path)?;
                println!("Wrote {} rows to {}", written, path.display());
            }
        }

        Commands::CheckGrid { grid } => {
            let index = load_index(&config, grid.as_deref())?;
            let report = index.verify_lattice();
            println!("{}", report.summary());

            if !report.is_consistent() {
                bail!("{} grid cells disagree with the lattice", report.mismatches.len());
            }
        }

        Commands::GenerateGrid {
            output,
            lattice,
            bbox,
        } => {
            let lattice = match lattice {
                Some(name) => {
                    LatticeConfig::preset(&name).with_context(|| format!("Unknown lattice '{}'", name))?
                }
                None => config.grid.lattice()?,
            };
            let bbox = bbox.as_deref().map(parse_bbox).transpose()?;

            let count = write_lattice_geojson(&lattice, bbox, &output)?;
            println!("Wrote {} cells of {} to {}", count, lattice.name, output.display());
        }

        Commands::Predict { longitude, latitude, at } => {
            let now = match at {
                Some(s) => parse_timestamp(&s)?,
                None => now_sgt(),
            };
            let advisor = TaxiAdvisor::new(
                load_index(&config, None)?,
                Arc::new(ParquetWarehouse::from_config(&config.warehouse)?),
                Arc::new(HttpPredictor::new(&config.predictor)?),
            )
            .with_step_minutes(config.batch.step_minutes);

            let advice = advisor.advise(longitude, latitude, now).await?;
            println!("{}", advice.message());
        }
    }

    Ok(())
}

/// `--verbose` lowers the default level to debug; `RUST_LOG` overrides both.
fn init_logging(verbose: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    let result = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))
}

fn resolve_timestamp(input: Option<&str>, config: &AppConfig) -> anyhow::Result<NaiveDateTime> {
    let timestamp = match input {
        Some(s) => parse_timestamp(s)?,
        None => round_down(now_sgt(), config.batch.step_minutes),
    };
    Ok(timestamp)
}

fn resolve_strategy(input: Option<&str>, config: &AppConfig) -> anyhow::Result<AssignmentStrategy> {
    Ok(match input {
        Some(s) => s.parse()?,
        None => config.grid.strategy,
    })
}

fn parse_domains(names: &[String]) -> anyhow::Result<Vec<DataDomain>> {
    if names.is_empty() {
        return Ok(DataDomain::all());
    }
    names
        .iter()
        .map(|n| n.parse::<DataDomain>().map_err(anyhow::Error::from))
        .collect()
}

fn parse_bbox(input: &str) -> anyhow::Result<(f64, f64, f64, f64)> {
    let values = input
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid bounding box '{}'", input))?;

    match values.as_slice() {
        [min_lon, min_lat, max_lon, max_lat] if min_lon < max_lon && min_lat < max_lat => {
            Ok((*min_lon, *min_lat, *max_lon, *max_lat))
        }
        _ => bail!("Bounding box must be min_lon,min_lat,max_lon,max_lat"),
    }
}

fn load_index(config: &AppConfig, grid_override: Option<&Path>) -> anyhow::Result<GridIndex> {
    let lattice = config.grid.lattice()?;
    let grid = match grid_override.or(config.grid.path.as_deref()) {
        Some(path) => GridDataLoader::with_attribute(&config.grid.attribute)
            .load(path)
            .with_context(|| format!("Failed to load grid from {}", path.display()))?,
        None => GridSet::from_lattice(&lattice)?,
    };
    info!(lattice = %lattice.name, cells = grid.len(), "Grid loaded");
    Ok(GridIndex::new(lattice, Arc::new(grid))?)
}

fn build_pipeline(config: &AppConfig) -> anyhow::Result<SlicePipeline> {
    Ok(SlicePipeline::new(load_index(config, None)?).with_strategy(config.grid.strategy))
}

fn slice_source(config: &AppConfig, kind: SourceKind) -> anyhow::Result<Arc<dyn SliceSource>> {
    let store = SnapshotStore::from_config(&config.store)?;
    Ok(match kind {
        SourceKind::Api => {
            let client = Arc::new(GovDataClient::new(&config.api)?);
            Arc::new(ApiSliceSource::new(client).with_archive(store))
        }
        SourceKind::Store => Arc::new(StoreSliceSource::new(
            store,
            Duration::minutes(config.batch.step_minutes),
        )),
    })
}

async fn load_snapshot(
    store: &SnapshotStore,
    warehouse: &ParquetWarehouse,
    domain: DataDomain,
    path: &str,
) -> crate::error::Result<usize> {
    let bytes = store.read_bytes(path).await?;

    match domain {
        DataDomain::TaxiAvailability => {
            let snapshot = TaxiParser::new().parse_bytes(path, &bytes)?;
            append_rows(warehouse, TAXI_AVAILABILITY_TABLE, &snapshot.fixes).await
        }
        DataDomain::Weather(measure) => {
            let snapshot = WeatherParser::new(measure).parse_bytes(path, &bytes)?;
            let items = append_rows(warehouse, &measure.items_table(), &snapshot.observations).await?;
            append_rows(warehouse, &measure.metadata_table(), &snapshot.station_records()).await?;
            Ok(items)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox() {
        assert_eq!(
            parse_bbox("103.6, 1.2, 104.1, 1.5").unwrap(),
            (103.6, 1.2, 104.1, 1.5)
        );
        assert!(parse_bbox("104.1,1.2,103.6,1.5").is_err());
        assert!(parse_bbox("103.6,1.2").is_err());
        assert!(parse_bbox("a,b,c,d").is_err());
    }

    #[test]
    fn test_parse_domains_defaults_to_all() {
        assert_eq!(parse_domains(&[]).unwrap().len(), 4);
        assert_eq!(
            parse_domains(&["taxis".to_string()]).unwrap(),
            vec![DataDomain::TaxiAvailability]
        );
        assert!(parse_domains(&["wind".to_string()]).is_err());
    }
}
