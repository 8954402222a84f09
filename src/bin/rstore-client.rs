//! The rstore-client executable supports the following command line arguments:
//!
//! `rstore-client set <KEY> <VALUE> [--addr IP-PORT]`
//!
//!     Publish a value under a key, waking any peer waiting on it.
//!
//! `rstore-client get <KEY> [--addr IP-PORT]`
//!
//!     Fetch the value of a key, blocking until some peer has published it.
//!
//! `rstore-client add <KEY> <DELTA> [--addr IP-PORT]`
//!
//!     Add a non-negative delta to a key's counter and print the new value.
//!
//! `rstore-client wait <KEY>... [--addr IP-PORT]`
//!
//!     Block until every listed key has a published value.
//!
//! `--addr` accepts an IP address and port with the format IP:PORT, or a bare
//! `:PORT` which is dialed over a random loopback address. If `--addr` is not
//! specified then connect on 127.0.0.1:19503. Each command prints an error
//! and returns a non-zero exit code on server error.

use clap::{crate_version, App, Arg, ArgMatches, SubCommand};
use rstore::{Result, StoreClient, StoreError};
use std::process::exit;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const DEFAULT_ADDRESS: &str = "127.0.0.1:19503";

/// the request to execute against the server
#[derive(Debug)]
enum Request {
    Set { key: String, value: String },
    Get { key: String },
    Add { key: String, delta: i64 },
    Wait { keys: Vec<String> },
}

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    /// the server's ip:port
    addr: String,
    req: Request,
}

fn main() {
    // configure a subscriber that will log messages to STDERR
    subscriber_config();

    let matches = App::new("rstore-client")
        .version(crate_version!())
        .about("a rendezvous key-value store for distributed training jobs")
        .subcommands(vec![
            SubCommand::with_name("set")
                .about("Publish a value under a key")
                .arg(Arg::with_name("KEY").required(true).index(1))
                .arg(Arg::with_name("VALUE").required(true).index(2)),
            SubCommand::with_name("get")
                .about("Fetch the value of a key, waiting for it to be published")
                .arg(Arg::with_name("KEY").required(true).index(1)),
            SubCommand::with_name("add")
                .about("Add a non-negative delta to a key's counter")
                .arg(Arg::with_name("KEY").required(true).index(1))
                .arg(Arg::with_name("DELTA").required(true).index(2)),
            SubCommand::with_name("wait")
                .about("Block until every listed key has a value")
                .arg(Arg::with_name("KEY").required(true).multiple(true).index(1)),
        ])
        .arg(
            Arg::with_name("addr")
                .long("addr")
                .value_name("IP_ADDR:PORT")
                .help("sets the IP_ADDR:PORT of the server to connect to")
                .default_value(DEFAULT_ADDRESS),
        )
        .get_matches();

    let result = match parse_options(matches) {
        Ok(opt) => run(opt),
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        eprintln!("{:?}", e);
        exit(1);
    }
}

/// runs the specified request against the server at `opt.addr`
fn run(opt: Opt) -> Result<()> {
    let mut client = StoreClient::connect(&opt.addr)?;
    match opt.req {
        Request::Set { key, value } => {
            client.set(key.as_bytes(), value.as_bytes())?;
        }
        Request::Get { key } => {
            let value = client.get(key.as_bytes())?;
            println!("{}", String::from_utf8_lossy(&value));
        }
        Request::Add { key, delta } => {
            let value = client.add(key.as_bytes(), delta)?;
            println!("{}", value);
        }
        Request::Wait { keys } => {
            let keys: Vec<&[u8]> = keys.iter().map(|k| k.as_bytes()).collect();
            client.wait(&keys)?;
        }
    }
    Ok(())
}

/// parses the matches from the command line into an [`Opt`] struct
fn parse_options(matches: ArgMatches) -> Result<Opt> {
    let addr = matches.value_of("addr").unwrap().to_string();
    let req = match matches.subcommand() {
        ("set", Some(args)) => Request::Set {
            key: args.value_of("KEY").map(String::from).unwrap(),
            value: args.value_of("VALUE").map(String::from).unwrap(),
        },
        ("get", Some(args)) => Request::Get {
            key: args.value_of("KEY").map(String::from).unwrap(),
        },
        ("add", Some(args)) => {
            let delta = args.value_of("DELTA").unwrap();
            Request::Add {
                key: args.value_of("KEY").map(String::from).unwrap(),
                delta: delta.parse().map_err(|_| {
                    StoreError::Parsing(format!("could not parse {} into an integer", delta))
                })?,
            }
        }
        ("wait", Some(args)) => Request::Wait {
            keys: args
                .values_of("KEY")
                .unwrap()
                .map(String::from)
                .collect(),
        },
        _ => {
            return Err(StoreError::Parsing(
                "expected one of the subcommands: set, get, add, wait".to_string(),
            ))
        }
    };
    Ok(Opt { addr, req })
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
