//! logsift - filter a log file or pipe and print the tail of the result.
//!
//! A thin driver over the library's filter manager: keyword and date filters
//! come from flags, and with `--follow` newly visible lines keep printing as
//! the file grows.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use logsift::app::{FilterManager, FilterSpec, Notification};
use logsift::filter::FilterMode;
use logsift::{timestamp, Config};
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let matches = cli().get_matches();

    let config = build_config(&matches)?;
    let follow = config.follow;
    let filters = build_filters(&matches)?;

    let (notification_tx, mut notifications) = mpsc::unbounded_channel();
    let (handle, manager) = FilterManager::spawn_with_filters(config, filters, notification_tx)
        .context("failed to start")?;

    let mut loaded = false;
    let mut last_printed: Option<usize> = None;
    let mut stdout = std::io::stdout().lock();

    loop {
        let notification = tokio::select! {
            notification = notifications.recv() => notification,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(notification) = notification else { break };

        match notification {
            Notification::EndOfInput => {
                loaded = true;
                handle.end().await?;
            }
            Notification::DisplayChanged(snapshot) if loaded => {
                for line in snapshot.rows.iter().filter(|l| l.exists()) {
                    if last_printed.map_or(true, |last| line.no > last) {
                        writeln!(stdout, "{}", line.text())?;
                        last_printed = Some(line.no);
                    }
                }
                stdout.flush()?;
                if !follow {
                    break;
                }
            }
            Notification::Error { message, .. } => log::debug!("{}", message),
            _ => {}
        }
    }

    handle.shutdown();
    manager.await?.context("filter manager failed")?;
    Ok(())
}

fn cli() -> Command {
    Command::new("logsift")
        .version(logsift::VERSION)
        .about("Incrementally filter a log and show the matching tail")
        .arg(
            Arg::new("file")
                .help("Log file to read (standard input when omitted)")
                .index(1),
        )
        .arg(
            Arg::new("follow")
                .short('f')
                .long("follow")
                .help("Keep printing matching lines as the file grows")
                .action(ArgAction::SetTrue),
        )
        .arg(pattern_arg("match", 'm', "Show only lines matching PATTERN"))
        .arg(pattern_arg("focus", 'F', "Highlight lines matching PATTERN, dimming the rest"))
        .arg(pattern_arg("hide", 'H', "Hide lines matching PATTERN"))
        .arg(
            Arg::new("ignore-case")
                .short('i')
                .long("ignore-case")
                .help("Match patterns case-insensitively")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("since")
                .long("since")
                .value_name("TIMESTAMP")
                .help("Hide lines before TIMESTAMP"),
        )
        .arg(
            Arg::new("until")
                .long("until")
                .value_name("TIMESTAMP")
                .help("Hide lines at or after TIMESTAMP"),
        )
        .arg(
            Arg::new("height")
                .short('n')
                .long("height")
                .value_name("N")
                .help("Number of lines to show")
                .value_parser(clap::value_parser!(usize))
                .default_value("40"),
        )
}

fn pattern_arg(name: &'static str, short: char, help: &'static str) -> Arg {
    Arg::new(name)
        .short(short)
        .long(name)
        .value_name("PATTERN")
        .help(help)
        .action(ArgAction::Append)
}

fn build_config(matches: &ArgMatches) -> Result<Config> {
    let config = match matches.get_one::<String>("file") {
        Some(path) => Config::for_file(PathBuf::from(path)),
        None if std::io::stdin().is_terminal() => {
            anyhow::bail!("no input: pass a file or pipe data into standard input")
        }
        None => Config::for_stdin(),
    };

    let height = matches
        .get_one::<usize>("height")
        .copied()
        .unwrap_or(logsift::config::DEFAULT_DISPLAY_HEIGHT);

    Ok(config
        .with_follow(matches.get_flag("follow"))
        .with_display_height(height.max(1))
        .apply_env())
}

/// Keyword filters in command-line order, then the date range
fn build_filters(matches: &ArgMatches) -> Result<Vec<FilterSpec>> {
    let case_sensitive = !matches.get_flag("ignore-case");
    let mut keywords: Vec<(usize, FilterMode, String)> = Vec::new();

    for (flag, mode) in [
        ("match", FilterMode::Match),
        ("focus", FilterMode::Focus),
        ("hide", FilterMode::Hide),
    ] {
        if let (Some(indices), Some(values)) =
            (matches.indices_of(flag), matches.get_many::<String>(flag))
        {
            keywords.extend(indices.zip(values).map(|(i, key)| (i, mode, key.clone())));
        }
    }
    keywords.sort_by_key(|(index, _, _)| *index);

    let mut filters: Vec<FilterSpec> = keywords
        .into_iter()
        .enumerate()
        .map(|(slot, (_, mode, key))| FilterSpec::Keyword {
            key,
            mode,
            case_sensitive,
            color_index: (slot % 7 + 1) as u8,
        })
        .collect();

    let since = parse_time(matches, "since")?;
    let until = parse_time(matches, "until")?;
    if since.is_some() || until.is_some() {
        filters.push(FilterSpec::DateRange {
            start: since,
            end: until,
        });
    }
    Ok(filters)
}

fn parse_time(matches: &ArgMatches, flag: &str) -> Result<Option<chrono::NaiveDateTime>> {
    matches
        .get_one::<String>(flag)
        .map(|value| timestamp::parse_bound(value).with_context(|| format!("invalid --{flag}")))
        .transpose()
}
