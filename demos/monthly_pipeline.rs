//! End-to-end monthly run: split raw tdump files, drop incomplete trajectories, keep the
//! drying ones, then aggregate them into monthly archetypes.
//!
//! Usage:
//!   cargo run --example monthly_pipeline -- <raw_dir> <work_dir> <year> <month>
//!
//! First-level clusters are cut from the hierarchical tree at the elbow `K` read from the
//! cluster tool's diagnostic table `<work_dir>/DELPCT_P<n>`; without a table the elbow
//! floor is used.
//!
//! Set `RUST_LOG=trajclust=debug` for per-file logging.
use std::env;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trajclust::aggregate::merge::label_members;
use trajclust::aggregate::outer::collect_meta_means;
use trajclust::aggregate::Member;
use trajclust::filters::{
    filter_humidity, filter_incomplete, CompletenessMode, CompletenessParams, HumidityParams,
};
use trajclust::{
    split_tree, AggregateParams, ClusterEngine, MetaAggregator, ProcessedManifest, SplitParams,
    TrajclustError,
};

/// Elbow `K` of one point, from its diagnostic table when the cluster tool wrote one.
fn elbow_k(engine: &ClusterEngine, work: &Utf8Path, point: &str) -> Result<usize, TrajclustError> {
    let table = work.join(format!("DELPCT_{point}"));
    if !table.is_file() {
        let k = engine.params().min_elbow_k;
        warn!(%point, table = %table, k, "no diagnostic table, using the elbow floor");
        return Ok(k);
    }
    let text = std::fs::read_to_string(&table)?;
    Ok(engine.elbow_from_table(&text)?)
}

/// Release-point directories (`P1`, `P2`, ...) of one split year, in numeric order.
fn point_dirs(year_dir: &Utf8Path) -> Result<Vec<(usize, String)>, TrajclustError> {
    let mut points: Vec<(usize, String)> = year_dir
        .read_dir_utf8()?
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .filter_map(|e| {
            let name = e.file_name().to_string();
            name.strip_prefix('P')
                .and_then(|n| n.parse().ok())
                .map(|n| (n, name))
        })
        .collect();
    points.sort();
    Ok(points)
}

fn run(raw: &Utf8Path, work: &Utf8Path, year: i32, month: u32) -> Result<(), TrajclustError> {
    let split_root = work.join("split");
    let manifest_path = work.join("processed.manifest");

    let mut manifest = ProcessedManifest::load(&manifest_path)?;
    let split_params = SplitParams::builder().year_range(year, year).build()?;
    let report = split_tree(raw, &split_root, &split_params, &mut manifest)?;
    manifest.persist(&manifest_path)?;
    info!(%report, "split done");

    let completeness = CompletenessParams::builder()
        .mode(CompletenessMode::Delete)
        .build()?;
    let report = filter_incomplete(&split_root, &completeness)?;
    info!(%report, "completeness done");

    let params = AggregateParams::builder()
        .month_tag(format!("{year}_{month:02}"))
        .build()?;
    let aggregator = MetaAggregator::new(params, ClusterEngine::default());
    let month_root = work.join("aggregate");

    for (point, name) in point_dirs(&split_root.join(year.to_string()))? {
        let humidity = HumidityParams::builder()
            .years(year, year)
            .months([month])
            .point(name.clone())
            .build()?;
        let infile = work.join(format!("INFILE_{name}"));
        let report = match filter_humidity(&split_root, &infile, &humidity) {
            Ok(report) => report,
            Err(TrajclustError::EmptyBatch(reason)) => {
                warn!(point = %name, %reason, "no drying trajectory");
                continue;
            }
            Err(e) => return Err(e),
        };

        let members = report
            .outputs()
            .map(Member::load)
            .collect::<Result<Vec<_>, _>>()?;
        if members.len() < 3 {
            warn!(point = %name, members = members.len(), "too few members to cluster");
            continue;
        }
        let k = elbow_k(aggregator.engine(), work, &name)?.min(members.len());
        let labels = label_members(aggregator.engine(), &members, Some(k))?;
        let written = aggregator.merge_point(&month_root, point, &members, &labels)?;
        info!(point = %name, k, outputs = written.len(), "level A done");
    }

    let metas = aggregator.meta_cluster_month(&month_root)?;
    for meta in &metas {
        info!("{meta}");
    }
    let report = aggregator.synthesize_meta_means(&month_root)?;
    info!(%report, "meta means done");

    let meta_means = collect_meta_means(&month_root)?;
    let csv_path = work.join("archetypes.csv");
    let records = aggregator.cluster_archetypes(&meta_means, &csv_path)?;
    info!(archetypes = records.len(), csv = %csv_path, "outer pass done");
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 5 {
        eprintln!("usage: {} <raw_dir> <work_dir> <year> <month>", args[0]);
        std::process::exit(2);
    }
    let (Ok(year), Ok(month)) = (args[3].parse::<i32>(), args[4].parse::<u32>()) else {
        eprintln!("year and month must be integers");
        std::process::exit(2);
    };

    let raw = Utf8PathBuf::from(&args[1]);
    let work = Utf8PathBuf::from(&args[2]);
    if let Err(e) = run(&raw, &work, year, month) {
        eprintln!("pipeline failed: {e}");
        std::process::exit(1);
    }
}
