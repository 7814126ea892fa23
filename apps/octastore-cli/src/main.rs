use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use clap::{Parser, Subcommand};
use glam::DVec3;
use octastore_common::{CancellationToken, ConsistencyLevel, OctreeNode};
use octastore_morton::MortonCodec;
use octastore_storage::{
    OctreeStorage, StorageBackend, StorageConfig, StorageKind, create_storage,
};
use pollster::block_on;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "octastore-cli", about = "CLI tool for octree storage operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Show the hierarchical keys and server placement of a point
    Encode {
        #[arg(long, allow_hyphen_values = true)]
        x: f64,
        #[arg(long, allow_hyphen_values = true)]
        y: f64,
        #[arg(long, allow_hyphen_values = true)]
        z: f64,
        /// Deepest level to print
        #[arg(short, long, default_value = "10")]
        level: u32,
        /// Number of servers to place regions on
        #[arg(short, long, default_value = "16")]
        servers: u32,
        /// Config file (.json/.yaml); the planet-scale preset otherwise
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Walk through writes, inherited reads, caching and a version conflict
    Demo {
        /// Config file (.json/.yaml); the testing preset otherwise
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Backend to construct
        #[arg(short, long, default_value = "in-memory")]
        backend: StorageKind,
    },
    /// Populate a node grid and query it from several threads
    Bench {
        /// Nodes to write before querying
        #[arg(short, long, default_value = "4096")]
        nodes: usize,
        /// Queries per thread
        #[arg(short, long, default_value = "100000")]
        queries: usize,
        #[arg(short, long, default_value = "4")]
        threads: usize,
        /// Level the grid nodes are written at
        #[arg(short, long, default_value = "6")]
        level: u32,
    },
}

fn load_config(path: Option<PathBuf>, fallback: StorageConfig) -> anyhow::Result<StorageConfig> {
    match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading config");
            Ok(StorageConfig::load(&path)?)
        }
        None => Ok(fallback),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("octastore-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", octastore_common::crate_info());
            println!("morton: {}", octastore_morton::crate_info());
            println!("storage: {}", octastore_storage::crate_info());
            for kind in StorageKind::ALL {
                println!("backend {kind}: implemented={}", kind.is_implemented());
            }
        }
        Commands::Encode {
            x,
            y,
            z,
            level,
            servers,
            config,
        } => {
            anyhow::ensure!(servers > 0, "--servers must be at least 1");
            let config = load_config(config, StorageConfig::earth())?;
            let codec = MortonCodec::new(config.world_bounds, config.replication_factor)?;
            let point = DVec3::new(x, y, z);
            if !config.world_bounds.contains(point) {
                tracing::warn!(%point, "point lies outside the world bounds; clamping");
            }

            println!("Point ({x}, {y}, {z}), {servers} servers");
            for key in codec.hierarchical_keys(point, level) {
                let replica_buckets = key.placement.replica_buckets(servers);
                println!(
                    "  L{:02} code={:#018x} region={} primary={:#018x} server={} replicas={:x?} replica_servers={:?}",
                    key.level,
                    key.morton_code,
                    key.region_key,
                    key.primary_hash(),
                    key.placement.bucket(servers),
                    key.replica_hashes(),
                    replica_buckets,
                );
            }
        }
        Commands::Demo { config, backend } => {
            let config = load_config(config, StorageConfig::for_testing())?;
            let storage = create_storage(backend, config)?;
            run_demo(&storage)?;
        }
        Commands::Bench {
            nodes,
            queries,
            threads,
            level,
        } => {
            anyhow::ensure!(nodes > 0 && threads > 0, "--nodes and --threads must be positive");
            let storage = StorageBackend::for_testing()?;
            run_bench(&storage, nodes, queries, threads, level)?;
        }
    }

    Ok(())
}

fn run_demo(storage: &StorageBackend) -> anyhow::Result<()> {
    let config = storage.config().clone();
    let codec = MortonCodec::new(config.world_bounds, config.replication_factor)?;
    let cancel = CancellationToken::new();
    let consistency = config.default_consistency;
    let child_level = 3u32.min(config.max_level);

    println!("Demo: backend={}, consistency={consistency}", storage.kind());

    let root = OctreeNode::new("root", 0, 0, config.world_bounds)
        .with_material(1)
        .with_homogeneity(0.95);
    println!(
        "Root: material=1, compressible={}",
        root.can_compress(config.homogeneity_threshold)
    );
    let written = block_on(storage.write_node(root, consistency, &cancel))?;
    println!(
        "Write root: success={}, version={}, acks={}",
        written.success, written.new_version, written.acknowledged_replicas
    );

    let inside = config.world_bounds.center();
    let child = codec
        .node_at("child", inside, child_level)
        .with_material(2)
        .with_parent("root");
    let written = block_on(storage.write_node(child.clone(), consistency, &cancel))?;
    println!(
        "Write child at level {child_level}: success={}, version={}",
        written.success, written.new_version
    );

    let outside = config.world_bounds.min + config.world_bounds.size() * 0.05;
    for (label, point) in [("inside child", inside), ("inside child", inside), ("root only", outside)] {
        let result = block_on(storage.query_material(point, config.max_level, consistency, &cancel));
        println!(
            "Query {label}: material={:?}, source={}, latency={:?}",
            result.material_id, result.source, result.latency
        );
    }

    let stale = block_on(storage.write_node(child.with_material(3), consistency, &cancel))?;
    match &stale.error {
        Some(err) => println!("Stale write: {err}"),
        None => println!("Stale write unexpectedly accepted"),
    }

    block_on(storage.clear_cache());
    let result = block_on(storage.query_material(inside, config.max_level, consistency, &cancel));
    println!("Query after clear_cache: source={}", result.source);

    let stats = block_on(storage.statistics());
    println!("Hit rate: {:.2}", stats.cache_hit_rate());
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn run_bench(
    storage: &StorageBackend,
    nodes: usize,
    queries: usize,
    threads: usize,
    level: u32,
) -> anyhow::Result<()> {
    let config = storage.config().clone();
    let level = level.min(config.max_level);
    let codec = MortonCodec::new(config.world_bounds, config.replication_factor)?;
    let cancel = CancellationToken::new();

    let side = (nodes as f64).cbrt().ceil() as usize;
    let step = config.world_bounds.size() / side as f64;
    let points: Vec<DVec3> = (0..nodes)
        .map(|i| {
            let cell = DVec3::new(
                (i % side) as f64,
                ((i / side) % side) as f64,
                (i / (side * side)) as f64,
            );
            config.world_bounds.min + (cell + 0.5) * step
        })
        .collect();

    let start = Instant::now();
    for (i, point) in points.iter().enumerate() {
        let node = codec.node_at(format!("n{i}"), *point, level).with_material(i as u32);
        block_on(storage.write_node(node, ConsistencyLevel::One, &cancel))?;
    }
    println!("Wrote {nodes} nodes at level {level} in {:?}", start.elapsed());

    let found = AtomicU64::new(0);
    let start = Instant::now();
    std::thread::scope(|scope| {
        for t in 0..threads {
            let points = &points;
            let found = &found;
            let cancel = &cancel;
            scope.spawn(move || {
                for q in 0..queries {
                    let point = points[(q * 31 + t * 7) % points.len()];
                    let result =
                        block_on(storage.query_material(point, level, ConsistencyLevel::One, cancel));
                    if result.success {
                        found.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });
    let elapsed = start.elapsed();

    let total = (queries * threads) as f64;
    let stats = block_on(storage.statistics());
    println!(
        "Ran {total} queries on {threads} threads in {elapsed:?}: {:.0} queries/s",
        total / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    println!(
        "Found {}, hit rate {:.2}, average latency {:?}, max latency {:?}",
        found.load(Ordering::Relaxed),
        stats.cache_hit_rate(),
        stats.average_query_latency,
        stats.max_query_latency,
    );
    Ok(())
}
