//! rtless - Remote Log Browsing Engine
//!
//! Command-line front end: browse, search and follow log files locally or on an ssh host.

use anyhow::{anyhow, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use futures::StreamExt;
use rtless::operation::ratio;
use rtless::remote::encoding::{local_name_for, remote_name_for};
use rtless::{
    chunk_for_add_range, EngineConfig, ExecChannel, FileSession, ShellChannel, SystemClock,
};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

fn cli() -> Command {
    let file = || {
        Arg::new("file")
            .help("Path of the log file")
            .required(true)
    };
    let encoding = || {
        Arg::new("encoding")
            .long("encoding")
            .short('e')
            .help("Encoding of the file (iconv name or label), if it differs from the local one")
    };
    let line = |name: &'static str, help: &'static str| {
        Arg::new(name)
            .help(help)
            .required(true)
            .value_parser(value_parser!(u64))
    };

    Command::new("rtless")
        .version(rtless::VERSION)
        .about("Browse, search and follow large log files over a shell channel")
        .long_about(
            "rtless reads log files through composed POSIX shell pipelines, either locally \
             or on a remote host via ssh. Only the requested lines ever cross the channel.",
        )
        .subcommand_required(true)
        .arg(
            Arg::new("ssh")
                .long("ssh")
                .global(true)
                .value_name("DEST")
                .help("Run commands on DEST through the system ssh client"),
        )
        .subcommand(
            Command::new("ls")
                .about("List a directory")
                .arg(Arg::new("dir").help("Directory to list").required(true)),
        )
        .subcommand(Command::new("encodings").about("List supported file encodings"))
        .subcommand(
            Command::new("lines")
                .about("Print a range of lines")
                .arg(file())
                .arg(line("start", "First line (1-based)"))
                .arg(line("end", "Last line (inclusive)"))
                .arg(encoding()),
        )
        .subcommand(
            Command::new("grep")
                .about("Search a file")
                .arg(file())
                .arg(Arg::new("pattern").help("Pattern to search for").required(true))
                .arg(encoding())
                .arg(
                    Arg::new("ignore-case")
                        .long("ignore-case")
                        .short('i')
                        .action(ArgAction::SetTrue)
                        .help("Case-insensitive match"),
                )
                .arg(
                    Arg::new("regex")
                        .long("regex")
                        .short('E')
                        .action(ArgAction::SetTrue)
                        .help("Treat the pattern as an extended regex"),
                )
                .arg(
                    Arg::new("max")
                        .long("max")
                        .short('m')
                        .value_parser(value_parser!(u64))
                        .help("Stop after this many hits"),
                )
                .arg(
                    Arg::new("from")
                        .long("from")
                        .value_parser(value_parser!(u64))
                        .default_value("1")
                        .help("First line to search"),
                ),
        )
        .subcommand(
            Command::new("index")
                .about("Build the line offset index and print its checkpoints")
                .arg(file())
                .arg(
                    Arg::new("interval")
                        .long("interval")
                        .value_parser(value_parser!(u64))
                        .help("Lines between checkpoints"),
                ),
        )
        .subcommand(
            Command::new("follow")
                .about("Print lines as they are appended")
                .arg(file())
                .arg(encoding()),
        )
        .subcommand(
            Command::new("save")
                .about("Save a range of lines to a local file")
                .arg(file())
                .arg(line("start", "First line (1-based)"))
                .arg(line("end", "Last line (inclusive)"))
                .arg(Arg::new("output").help("Local output path").required(true))
                .arg(encoding()),
        )
}

#[cfg(feature = "config")]
fn load_config() -> Result<EngineConfig> {
    EngineConfig::load_default().context("loading configuration")
}

#[cfg(not(feature = "config"))]
fn load_config() -> Result<EngineConfig> {
    Ok(EngineConfig::default())
}

fn required<'a, T: Clone + Send + Sync + 'static>(matches: &'a ArgMatches, id: &str) -> Result<&'a T> {
    matches
        .get_one::<T>(id)
        .ok_or_else(|| anyhow!("missing argument: {id}"))
}

/// `--encoding` as an iconv name; local labels such as `euc-jp` are translated
fn encoding_of(matches: &ArgMatches) -> Option<String> {
    matches
        .get_one::<String>("encoding")
        .map(|name| remote_name_for(name).unwrap_or(name.as_str()).to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (RUST_LOG controls verbosity)
    env_logger::init();

    let matches = cli().get_matches();
    let config = load_config()?;
    config.validate()?;

    let channel: Arc<dyn ExecChannel> = match matches.get_one::<String>("ssh") {
        Some(destination) => Arc::new(
            ShellChannel::over_ssh(destination.as_str()).with_stream_capacity(config.stream_capacity),
        ),
        None => Arc::new(ShellChannel::local().with_stream_capacity(config.stream_capacity)),
    };
    let session = FileSession::new(channel, config);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    match matches.subcommand() {
        Some(("ls", sub)) => list_directory(&session, sub).await,
        Some(("encodings", _)) => list_encodings(&session).await,
        Some(("lines", sub)) => print_lines(&session, sub, &cancel).await,
        Some(("grep", sub)) => grep(&session, sub, &cancel).await,
        Some(("index", sub)) => build_index(&session, sub, &cancel).await,
        Some(("follow", sub)) => follow(&session, sub, &cancel).await,
        Some(("save", sub)) => save(&session, sub, &cancel).await,
        _ => Err(anyhow!("no subcommand given")),
    }
}

async fn list_directory(session: &FileSession, matches: &ArgMatches) -> Result<()> {
    let dir = required::<String>(matches, "dir")?;
    for entry in session.accessor().list_directory(dir).await? {
        let modified = entry
            .last_modified
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let marker = if entry.kind.is_directory() { "/" } else { "" };
        match &entry.link_target {
            Some(target) => println!(
                "{:>12}  {modified}  {}{marker} -> {target}",
                entry.size, entry.name
            ),
            None => println!("{:>12}  {modified}  {}{marker}", entry.size, entry.name),
        }
    }
    Ok(())
}

async fn list_encodings(session: &FileSession) -> Result<()> {
    for name in session.accessor().list_iconv_encodings().await? {
        let label = local_name_for(&name).unwrap_or("-");
        println!("{name}\t{label}");
    }
    Ok(())
}

async fn print_lines(
    session: &FileSession,
    matches: &ArgMatches,
    cancel: &CancellationToken,
) -> Result<()> {
    let path = required::<String>(matches, "file")?;
    let start = *required::<u64>(matches, "start")?;
    let end = *required::<u64>(matches, "end")?;

    session.open(path, encoding_of(matches).as_deref()).await?;
    let mut lines = session.read_lines(start, end, cancel.clone()).await?;
    while let Some(line) = lines.next().await {
        println!("{}", line.content);
    }
    Ok(())
}

async fn grep(session: &FileSession, matches: &ArgMatches, cancel: &CancellationToken) -> Result<()> {
    let path = required::<String>(matches, "file")?;
    let pattern = required::<String>(matches, "pattern")?;

    session.open(path, encoding_of(matches).as_deref()).await?;
    let mut request = session.grep_request(pattern.as_str())?;
    request.ignore_case = matches.get_flag("ignore-case");
    request.use_regex = matches.get_flag("regex");
    request.start_line = *required::<u64>(matches, "from")?;
    if let Some(max) = matches.get_one::<u64>("max") {
        request.max_results = *max;
    }
    let total = session.count_lines().await?;

    let (tx, mut rx) = mpsc::channel(session.config().stream_capacity);
    let operation = Arc::clone(session.grep());
    let cancel = cancel.clone();
    let task = tokio::spawn(async move { operation.run(&request, total, &cancel, &tx).await });

    while let Some(hit) = rx.recv().await {
        println!("{}:{}", hit.line_number, hit.content);
    }
    task.await.context("grep task panicked")??;
    Ok(())
}

async fn build_index(
    session: &FileSession,
    matches: &ArgMatches,
    cancel: &CancellationToken,
) -> Result<()> {
    let path = required::<String>(matches, "file")?;
    let file = session.open(path, None).await?;
    let interval = matches
        .get_one::<u64>("interval")
        .copied()
        .unwrap_or(session.config().index_interval);

    let operation = session.build_map();
    let mut processed = operation.subscribe_processed_bytes();
    let total = file.size;
    let progress = tokio::spawn(async move {
        while processed.changed().await.is_ok() {
            let done = *processed.borrow_and_update();
            eprint!("\rindexing {:5.1}%", ratio(done, total) * 100.0);
        }
    });

    let added = operation.run(&file.path, interval, total, cancel).await;
    progress.abort();
    eprintln!();

    let added = added?;
    for checkpoint in session.index().read().checkpoints() {
        println!("{}\t{}", checkpoint.line_number, checkpoint.bytes);
    }
    log::info!("{added} checkpoints for {}", file.path);
    Ok(())
}

async fn follow(session: &FileSession, matches: &ArgMatches, cancel: &CancellationToken) -> Result<()> {
    let path = required::<String>(matches, "file")?;
    let file = session.open(path, encoding_of(matches).as_deref()).await?;
    let known = session.count_lines().await?;
    session.build_index(cancel).await?;

    let (tx, rx) = mpsc::channel(session.config().stream_capacity);
    let operation = Arc::clone(session.tail_follow());
    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            operation
                .run(&file.path, file.encoding.as_deref(), known, &cancel, &tx)
                .await
        })
    };

    let mut batches = chunk_for_add_range(
        ReceiverStream::new(rx),
        session.config().batch_interval(),
        Arc::new(SystemClock),
    );
    let mut stdout = tokio::io::stdout();
    while let Some(batch) = batches.next().await {
        let mut chunk = String::new();
        for line in batch {
            chunk.push_str(&line.content);
            chunk.push('\n');
        }
        stdout.write_all(chunk.as_bytes()).await?;
        stdout.flush().await?;
    }

    task.await.context("follow task panicked")??;
    Ok(())
}

async fn save(session: &FileSession, matches: &ArgMatches, cancel: &CancellationToken) -> Result<()> {
    let path = required::<String>(matches, "file")?;
    let start = *required::<u64>(matches, "start")?;
    let end = *required::<u64>(matches, "end")?;
    let output = required::<String>(matches, "output")?;

    let file = session.open(path, encoding_of(matches).as_deref()).await?;
    let mut sink = tokio::fs::File::create(output)
        .await
        .with_context(|| format!("creating {output}"))?;

    let operation = session.save_range();
    operation
        .run(&file.path, start, end, file.encoding.as_deref(), &mut sink, cancel)
        .await?;
    eprintln!("saved {} of {} lines to {output}", operation.saved_lines(), operation.total_lines());
    Ok(())
}
