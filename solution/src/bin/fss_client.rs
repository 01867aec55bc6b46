use anyhow::{bail, Context, Result};
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use env_logger::{Builder, Env};
use fss_server::h_client::{Connection, Session};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

const RETRY_INTERVAL: Duration = Duration::from_millis(200);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client of the file storage server.
/// Requests run in the order they appear on the command line.
#[derive(Parser, Debug)]
#[command(name = "fss-client", version, about)]
struct Cli {
    /// Socket the server listens on
    #[arg(short = 'f', value_name = "socket")]
    socket: PathBuf,
    /// Name the requests are sent under
    #[arg(short = 'a', value_name = "username")]
    username: String,
    /// Send up to n files found under dir, all of them if n is 0 or missing
    #[arg(short = 'w', value_name = "dir[,n]")]
    write_dir: Vec<String>,
    /// Send the given files
    #[arg(short = 'W', value_name = "file[,file]", value_delimiter = ',')]
    write: Vec<PathBuf>,
    /// Save the files evicted by writes under this directory
    #[arg(short = 'D', value_name = "dir")]
    evicted_dir: Option<PathBuf>,
    /// Read the given files
    #[arg(short = 'r', value_name = "file[,file]", value_delimiter = ',')]
    read: Vec<String>,
    /// Read n files, all of them if n is 0 or missing
    #[arg(short = 'R', value_name = "n", num_args = 0..=1, default_missing_value = "0")]
    read_n: Vec<i64>,
    /// Save the files read under this directory
    #[arg(short = 'd', value_name = "dir")]
    read_dir: Option<PathBuf>,
    /// Pause between requests, in milliseconds
    #[arg(short = 't', value_name = "msec", default_value_t = 0)]
    delay: u64,
    /// Lock the given files
    #[arg(short = 'l', value_name = "file[,file]", value_delimiter = ',')]
    lock: Vec<String>,
    /// Unlock the given files
    #[arg(short = 'u', value_name = "file[,file]", value_delimiter = ',')]
    unlock: Vec<String>,
    /// Remove the given files
    #[arg(short = 'c', value_name = "file[,file]", value_delimiter = ',')]
    remove: Vec<String>,
    /// Print the outcome of every request
    #[arg(short = 'p')]
    verbose: bool,
}

#[derive(Debug)]
enum Step {
    WriteDir(PathBuf, usize),
    Write(PathBuf),
    Read(String),
    ReadN(i64),
    Lock(String),
    Unlock(String),
    Remove(String),
}

/// Steps for the values of `id`, tagged with their position on the command line
fn steps<T, F>(matches: &ArgMatches, id: &str, make: F) -> Result<Vec<(usize, Step)>>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(T) -> Result<Step>,
{
    match (matches.indices_of(id), matches.get_many::<T>(id)) {
        (Some(indices), Some(values)) => indices
            .zip(values)
            .map(|(i, v)| Ok((i, make(v.clone())?)))
            .collect(),
        _ => Ok(Vec::new()),
    }
}

fn write_dir(arg: String) -> Result<Step> {
    let (dir, limit) = match arg.split_once(',') {
        Some((dir, n)) => (
            dir,
            n.parse()
                .with_context(|| format!("-w {}: n must be a non negative number", arg))?,
        ),
        None => (arg.as_str(), 0),
    };
    let dir = PathBuf::from(dir);
    if !dir.is_dir() {
        bail!("-w {}: {} is not a directory", arg, dir.display());
    }
    Ok(Step::WriteDir(dir, limit))
}

fn ordered_steps(matches: &ArgMatches) -> Result<Vec<Step>> {
    let mut all = Vec::new();
    all.extend(steps(matches, "write_dir", write_dir)?);
    all.extend(steps(matches, "write", |p: PathBuf| Ok(Step::Write(p)))?);
    all.extend(steps(matches, "read", |f: String| Ok(Step::Read(f)))?);
    all.extend(steps(matches, "read_n", |n: i64| Ok(Step::ReadN(n)))?);
    all.extend(steps(matches, "lock", |f: String| Ok(Step::Lock(f)))?);
    all.extend(steps(matches, "unlock", |f: String| Ok(Step::Unlock(f)))?);
    all.extend(steps(matches, "remove", |f: String| Ok(Step::Remove(f)))?);
    all.sort_by_key(|(i, _)| *i);
    Ok(all.into_iter().map(|(_, step)| step).collect())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches)?;

    Builder::from_env(Env::default().default_filter_or(if cli.verbose { "debug" } else { "warn" }))
        .format_timestamp_secs()
        .init();

    if cli.evicted_dir.is_some() && cli.write_dir.is_empty() && cli.write.is_empty() {
        bail!("-D needs -w or -W");
    }
    if cli.read_dir.is_some() && cli.read.is_empty() && cli.read_n.is_empty() {
        bail!("-d needs -r or -R");
    }
    let plan = ordered_steps(&matches)?;

    let deadline = Instant::now() + CONNECT_TIMEOUT;
    let conn = Connection::open(&cli.socket, RETRY_INTERVAL, deadline, &cli.username)
        .await
        .with_context(|| format!("cannot connect to {}", cli.socket.display()))?;

    let mut session = Session::new(conn);
    session.evicted_dir = cli.evicted_dir;
    session.read_dir = cli.read_dir;
    session.delay = Duration::from_millis(cli.delay);
    session.verbose = cli.verbose;

    //failures are reported by the session as they happen
    for step in plan {
        let _ = match step {
            Step::WriteDir(dir, limit) => session.write_dir(&dir, limit).await,
            Step::Write(file) => session.write_local(&file).await,
            Step::Read(file) => session.read(&file).await.map(|_| ()),
            Step::ReadN(n) => session.read_n(n).await.map(|_| ()),
            Step::Lock(file) => session.lock(&file).await,
            Step::Unlock(file) => session.unlock(&file).await,
            Step::Remove(file) => session.remove(&file).await.map(|_| ()),
        };
    }

    let failures = session.finish().await.context("cannot close the connection")?;
    if failures > 0 {
        bail!("{} requests failed", failures);
    }
    Ok(())
}
