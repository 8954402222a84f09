//! this binary starts the rstore server
//! to see the list of options, type: `rstore-server --help`

use clap::{arg_enum, crate_version, App, Arg};
use rstore::thread_pool::{NaiveThreadPool, SharedQueueThreadPool, ThreadPool};
use rstore::{
    ChannelStore, CoarseStore, ConcurrentStore, Result, ShardedStore, Store, StoreError,
    StoreServer,
};
use std::net::SocketAddr;
use std::process::exit;
use std::str::FromStr;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

arg_enum! {
    #[allow(non_camel_case_types)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Backend {
        channel,
        concurrent,
        lock
    }
}

const DEFAULT_ADDRESS: &str = "0.0.0.0:19503";

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    addr: SocketAddr,
    backend: Backend,
    shards: usize,
    accept_workers: usize,
    threads: u32,
}

impl Opt {
    /// validates the command line parameters
    /// returns `Ok<Opt>` if everything is valid
    /// # Errors
    /// returns [`StoreError::Parsing`] if one of the parameters is invalid
    ///
    fn build(
        addr: &str,
        backend: &str,
        shards: &str,
        accept_workers: &str,
        threads: &str,
    ) -> Result<Opt> {
        let addr: SocketAddr = addr.parse().map_err(|_| {
            StoreError::Parsing(format!(
                "could not parse {} into an IP addess and port",
                &addr
            ))
        })?;
        let backend = Backend::from_str(backend).map_err(StoreError::Parsing)?;
        let shards: usize = shards
            .parse()
            .map_err(|_| StoreError::Parsing(format!("could not parse shard count {}", &shards)))?;
        if shards == 0 {
            return Err(StoreError::Parsing(
                "shard count must be at least 1".to_string(),
            ));
        }
        let accept_workers: usize = accept_workers.parse().map_err(|_| {
            StoreError::Parsing(format!(
                "could not parse accept worker count {}",
                &accept_workers
            ))
        })?;
        if accept_workers == 0 {
            return Err(StoreError::Parsing(
                "accept worker count must be at least 1".to_string(),
            ));
        }
        let threads: u32 = threads
            .parse()
            .map_err(|_| StoreError::Parsing(format!("could not parse thread cap {}", &threads)))?;

        Ok(Opt {
            addr,
            backend,
            shards,
            accept_workers,
            threads,
        })
    }
}

fn main() {
    // set up a tracing subscriber to log to STDERR
    subscriber_config();

    // parse command line args
    let matches = App::new("rstore-server")
        .version(crate_version!())
        .about("a rendezvous key-value store for distributed training jobs")
        .arg(
            Arg::with_name("addr")
                .long("addr")
                .value_name("IP_ADDR:PORT")
                .help("sets the IP_ADDR:PORT that the server listens on")
                .default_value(DEFAULT_ADDRESS),
        )
        .arg(
            Arg::with_name("backend")
                .long("backend")
                .value_name("BACKEND_NAME")
                .help("sets the store backend, one of 'channel', 'concurrent' or 'lock'")
                .default_value("channel"),
        )
        .arg(
            Arg::with_name("shards")
                .long("shards")
                .value_name("N")
                .help("number of independent store shards")
                .default_value("1"),
        )
        .arg(
            Arg::with_name("accept-workers")
                .long("accept-workers")
                .value_name("N")
                .help("number of threads accepting connections in parallel")
                .default_value("10"),
        )
        .arg(
            Arg::with_name("threads")
                .long("threads")
                .value_name("N")
                .help("cap on connection handler threads; 0 runs one thread per connection")
                .default_value("0"),
        )
        .get_matches();

    let opt = match Opt::build(
        matches.value_of("addr").unwrap(),
        matches.value_of("backend").unwrap(),
        matches.value_of("shards").unwrap(),
        matches.value_of("accept-workers").unwrap(),
        matches.value_of("threads").unwrap(),
    ) {
        Ok(opt) => opt,
        Err(err) => {
            eprintln!("{:?}", err);
            exit(1);
        }
    };

    // start the server
    if let Err(e) = run(opt) {
        eprintln!("{:?}", e);
        exit(1);
    }
}

fn run(opt: Opt) -> Result<()> {
    info!("rstore-server {}", env!("CARGO_PKG_VERSION"));
    info!("Backend: {} with {} shard(s)", opt.backend, opt.shards);
    info!("Listening on {}", opt.addr);

    match opt.backend {
        Backend::channel => {
            run_with_store((0..opt.shards).map(|_| ChannelStore::new()).collect(), &opt)
        }
        Backend::concurrent => run_with_store(
            (0..opt.shards).map(|_| ConcurrentStore::new()).collect(),
            &opt,
        ),
        Backend::lock => {
            run_with_store((0..opt.shards).map(|_| CoarseStore::new()).collect(), &opt)
        }
    }
}

fn run_with_store<S: Store>(shards: Vec<S>, opt: &Opt) -> Result<()> {
    let store = ShardedStore::new(shards)?;
    if opt.threads > 0 {
        run_with_pool(store, SharedQueueThreadPool::new(opt.threads)?, opt)
    } else {
        run_with_pool(store, NaiveThreadPool::new(0)?, opt)
    }
}

fn run_with_pool<S: Store, P: ThreadPool + Send + Sync + 'static>(
    store: ShardedStore<S>,
    pool: P,
    opt: &Opt,
) -> Result<()> {
    let server = StoreServer::new(store, pool, opt.accept_workers);
    server.run(opt.addr)
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config() {
    let subscriber = FmtSubscriber::builder()
        // all spans/events with a level higher than TRACE (e.g, debug, info, warn, etc.)
        // will be written to stdout.
        .with_max_level(Level::TRACE)
        // log to stderr instrad of stdout
        .with_writer(std::io::stderr)
        // completes the builder.
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");
}
