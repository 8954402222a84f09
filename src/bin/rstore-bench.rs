//! The rstore-bench executable drives a running rstore-server with one of two
//! workloads:
//!
//! `rstore-bench --mode barrier [--addr ADDR] [--workers N]`
//!
//!     Every worker dials a fresh connection and rendezvouses with the others
//!     through the counter barrier, twice. Worker 0 reports the latency of
//!     each round.
//!
//! `rstore-bench --mode setget [--addr ADDR] [--workers N] [--seconds S]`
//!
//!     Every worker hammers a shared key with set/get pairs and reports its
//!     own and the global throughput after each S-second window. Runs until
//!     interrupted.
//!
//! The default `--addr` is a bare `:19503`, which dials a random loopback
//! address per connection so a single machine can open many thousands of
//! connections without exhausting ephemeral ports on 127.0.0.1.

use clap::{arg_enum, crate_version, App, Arg};
use rstore::{Result, StoreClient, StoreError};
use std::process::exit;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

arg_enum! {
    #[allow(non_camel_case_types)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Mode {
        barrier,
        setget
    }
}

const DEFAULT_ADDRESS: &str = ":19503";

// a blocking get is a wait plus a read, so one set/get pair is three requests
const OPS_PER_ITER: f64 = 3.0;

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    addr: String,
    mode: Mode,
    workers: usize,
    window: Duration,
}

impl Opt {
    fn build(addr: &str, mode: &str, workers: &str, seconds: &str) -> Result<Opt> {
        let mode = Mode::from_str(mode).map_err(StoreError::Parsing)?;
        let workers: usize = workers.parse().map_err(|_| {
            StoreError::Parsing(format!("could not parse worker count {}", &workers))
        })?;
        if workers == 0 {
            return Err(StoreError::Parsing(
                "worker count must be at least 1".to_string(),
            ));
        }
        let seconds: u64 = seconds.parse().map_err(|_| {
            StoreError::Parsing(format!("could not parse window seconds {}", &seconds))
        })?;

        Ok(Opt {
            addr: addr.to_string(),
            mode,
            workers,
            window: Duration::from_secs(seconds.max(1)),
        })
    }
}

/// throughput counters shared by every setget worker
struct Totals {
    start: Instant,
    iters: AtomicU64,
}

fn main() {
    // configure a subscriber that will log measurements to STDERR
    subscriber_config();

    let matches = App::new("rstore-bench")
        .version(crate_version!())
        .about("benchmark driver for the rstore server")
        .arg(
            Arg::with_name("addr")
                .long("addr")
                .value_name("IP_ADDR:PORT")
                .help("server address; a bare :PORT dials random loopback addresses")
                .default_value(DEFAULT_ADDRESS),
        )
        .arg(
            Arg::with_name("mode")
                .long("mode")
                .value_name("MODE")
                .help("workload to run, either 'barrier' or 'setget'")
                .default_value("barrier"),
        )
        .arg(
            Arg::with_name("workers")
                .long("workers")
                .value_name("N")
                .help("number of concurrent benchmark workers")
                .default_value("10"),
        )
        .arg(
            Arg::with_name("seconds")
                .long("seconds")
                .value_name("S")
                .help("length of one setget measurement window")
                .default_value("10"),
        )
        .get_matches();

    let opt = match Opt::build(
        matches.value_of("addr").unwrap(),
        matches.value_of("mode").unwrap(),
        matches.value_of("workers").unwrap(),
        matches.value_of("seconds").unwrap(),
    ) {
        Ok(opt) => opt,
        Err(err) => {
            eprintln!("{:?}", err);
            exit(1);
        }
    };

    if let Err(e) = run(opt) {
        eprintln!("{:?}", e);
        exit(1);
    }
}

fn run(opt: Opt) -> Result<()> {
    info!("rstore-bench {}", env!("CARGO_PKG_VERSION"));
    info!(
        "connecting {} worker(s) to {:?} in {} mode",
        opt.workers, opt.addr, opt.mode
    );

    let totals = Arc::new(Totals {
        start: Instant::now(),
        iters: AtomicU64::new(0),
    });

    let handles: Vec<_> = (0..opt.workers)
        .map(|rank| {
            let addr = opt.addr.clone();
            let world_size = opt.workers as u64;
            let window = opt.window;
            let mode = opt.mode;
            let totals = Arc::clone(&totals);
            thread::spawn(move || match mode {
                Mode::barrier => barrier_worker(&addr, rank, world_size),
                Mode::setget => setget_worker(&addr, rank, window, &totals),
            })
        })
        .collect();

    let mut result = Ok(());
    for handle in handles {
        let worker_result = handle
            .join()
            .map_err(|_| StoreError::Internal("benchmark worker panicked".to_string()))?;
        if result.is_ok() {
            result = worker_result;
        }
    }
    result
}

/// two rounds of a fresh-connection barrier across all workers
fn barrier_worker(addr: &str, rank: usize, world_size: u64) -> Result<()> {
    let pid = std::process::id();

    for round in 0..2 {
        let start = Instant::now();

        let mut client = StoreClient::connect(addr)?;
        let key = format!("benchmark/barrier/{}/{}", pid, round);
        client.barrier(key.as_bytes(), world_size)?;

        if rank == 0 {
            info!("[{}] barrier took {:?}", rank, start.elapsed());
        }
    }

    Ok(())
}

/// set/get pairs on one shared key, reporting throughput per window
fn setget_worker(addr: &str, rank: usize, window: Duration, totals: &Totals) -> Result<()> {
    let mut client = StoreClient::connect(addr)?;

    loop {
        let mut iters = 0u64;
        let start = Instant::now();
        while start.elapsed() < window {
            client.set(b"key", b"value")?;
            client.get(b"key")?;
            iters += 1;
            totals.iters.fetch_add(1, Ordering::Relaxed);
        }

        let qps = iters as f64 / start.elapsed().as_secs_f64() * OPS_PER_ITER;
        let global_qps = totals.iters.load(Ordering::Relaxed) as f64
            / totals.start.elapsed().as_secs_f64()
            * OPS_PER_ITER;
        info!("[{}] qps {:.2}, global qps {:.2}", rank, qps, global_qps);
    }
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        // log to stderr instrad of stdout
        .with_writer(std::io::stderr)
        // completes the builder.
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");
}
