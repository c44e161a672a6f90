use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use worn_cli::{Cli, Commands, Config, ReportForm, ShowWhat, render};
use worn_core::{Project, ProjectRef, Scale, TimeInput, timeparse};
use worn_db::Tracker;

/// Load config and open the tracker, ensuring the parent directory exists.
fn open_tracker(config_path: Option<&Path>, yes: bool) -> Result<Tracker> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let tracker = Tracker::open(&config.database_path).context("failed to open database")?;
    Ok(tracker.with_confirm(move |project: &Project, at: DateTime<Local>| {
        yes || prompt_yes_no(&format!(
            "{:?} would be recorded in the future, at {}. Record anyway?",
            project.name,
            at.format("%a %F %T"),
        ))
    }))
}

fn prompt_yes_no(question: &str) -> bool {
    eprint!("{question} [y/N] ");
    let _ = io::stderr().flush();
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim(), "y" | "Y" | "yes")
}

/// Joins the time words and parses them; empty means "not given".
fn parse_time(words: &[String]) -> Result<Option<DateTime<Local>>> {
    if words.is_empty() {
        return Ok(None);
    }
    let at = timeparse::parse(&TimeInput::List(words.to_vec()))
        .context("could not parse the given time")?;
    Ok(Some(at))
}

/// Turns joined CLI words into a resolution target.
///
/// Plain names go through fuzzy matching: an unknown name offers creation
/// (when `create` is set), an ambiguous prefix asks the user to pick. Ids,
/// timestamp ids and "last" pass straight through. `None` means the user
/// declined and nothing should happen.
fn choose_target(
    tracker: &mut Tracker,
    words: &[String],
    yes: bool,
    create: bool,
) -> Result<Option<ProjectRef>> {
    let raw = words.join(" ");
    let target = ProjectRef::parse(&raw);
    let ProjectRef::ByName(name) = &target else {
        return Ok(Some(target));
    };

    let matches = tracker.nearest(name)?;
    match matches.as_slice() {
        [] => {
            if !create {
                bail!("no project matches {name:?}");
            }
            if yes || prompt_yes_no(&format!("No project named {name:?}. Create it?")) {
                Ok(Some(ProjectRef::ByName(name.clone())))
            } else {
                Ok(None)
            }
        }
        [one] => Ok(Some(ProjectRef::ById(one.id))),
        many => {
            if yes {
                return Ok(Some(ProjectRef::ById(many[0].id)));
            }
            eprintln!("{name:?} matches more than one project:");
            for (i, project) in many.iter().enumerate() {
                eprintln!("  {}: {:?}", i + 1, project.name);
            }
            eprint!("Pick one [1-{}] ", many.len());
            let _ = io::stderr().flush();
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            match line.trim().parse::<usize>() {
                Ok(n) if (1..=many.len()).contains(&n) => {
                    Ok(Some(ProjectRef::ById(many[n - 1].id)))
                }
                _ => Ok(None),
            }
        }
    }
}

fn project_names(tracker: &Tracker) -> Result<HashMap<Uuid, String>> {
    Ok(tracker
        .projects()?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect())
}

fn print_last(tracker: &Tracker) -> Result<()> {
    match tracker.last()? {
        Some(status) => print!("{}", render::render_last(&status)),
        None => println!("no projects tracked yet"),
    }
    Ok(())
}

#[expect(
    clippy::too_many_lines,
    reason = "CLI command dispatch is inherently verbose"
)]
fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // try_init avoids a panic if tracing is already initialized in tests
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    match &cli.command {
        Some(Commands::Start { time, project }) => {
            let mut tracker = open_tracker(cli.config.as_deref(), cli.yes)?;
            let at = parse_time(time)?;
            let Some(target) = choose_target(&mut tracker, project, cli.yes, true)? else {
                return Ok(());
            };
            match tracker.start(&target, at)? {
                Some(_) => print_last(&tracker)?,
                None => println!("nothing recorded"),
            }
        }
        Some(Commands::Stop { time, project }) => {
            let mut tracker = open_tracker(cli.config.as_deref(), cli.yes)?;
            let at = parse_time(time)?;
            let Some(target) = choose_target(&mut tracker, project, cli.yes, false)? else {
                return Ok(());
            };
            match tracker.stop(&target, at)? {
                Some(_) => print_last(&tracker)?,
                None => println!("nothing to stop"),
            }
        }
        Some(Commands::Rename { from, to }) => {
            let mut tracker = open_tracker(cli.config.as_deref(), cli.yes)?;
            let words = vec![from.clone()];
            let Some(target) = choose_target(&mut tracker, &words, cli.yes, false)? else {
                return Ok(());
            };
            let renamed = tracker.rename(&target, to)?;
            println!("renamed {} to {:?}", renamed.id, renamed.name);
        }
        Some(Commands::Rm { project }) => {
            let mut tracker = open_tracker(cli.config.as_deref(), cli.yes)?;
            let Some(target) = choose_target(&mut tracker, project, cli.yes, false)? else {
                return Ok(());
            };
            let resolved = tracker.resolve(&target)?;
            let label = resolved
                .project()
                .map_or_else(|| "nothing".to_string(), |p| format!("{:?}", p.name));
            if cli.yes || prompt_yes_no(&format!("Remove {label} and all its history?")) {
                tracker.remove(&target)?;
                println!("removed {label}");
            }
        }
        Some(Commands::Show { what }) => match what {
            ShowWhat::Last => {
                let tracker = open_tracker(cli.config.as_deref(), cli.yes)?;
                print_last(&tracker)?;
            }
            ShowWhat::Projects => {
                let tracker = open_tracker(cli.config.as_deref(), cli.yes)?;
                print!("{}", render::render_projects(&tracker.projects()?));
            }
            ShowWhat::Logs {
                count,
                since,
                version,
                project,
            } => {
                let mut tracker = open_tracker(cli.config.as_deref(), cli.yes)?;
                let since = parse_time(since)?;
                let matching = if project.is_empty() {
                    None
                } else {
                    match choose_target(&mut tracker, project, cli.yes, false)? {
                        Some(target) => Some(target),
                        // Declined the ambiguous-match pick; do nothing.
                        None => return Ok(()),
                    }
                };
                let events = tracker.events(matching.as_ref(), since, *count, *version)?;
                let names = project_names(&tracker)?;
                print!("{}", render::render_log(&events, &names));
            }
            ShowWhat::Versions => {
                let tracker = open_tracker(cli.config.as_deref(), cli.yes)?;
                print!("{}", render::render_versions(&tracker.versions()?));
            }
            ShowWhat::Id { project } => {
                let mut tracker = open_tracker(cli.config.as_deref(), cli.yes)?;
                let fragment = project.join(" ");
                let matches = tracker.nearest(&fragment)?;
                if matches.is_empty() {
                    bail!("no project matches {fragment:?}");
                }
                for project in matches {
                    println!("{}  {:?}", project.id, project.name);
                }
            }
        },
        Some(Commands::Report {
            scale,
            form,
            since,
            all,
            no_header,
            project,
        }) => {
            let mut tracker = open_tracker(cli.config.as_deref(), cli.yes)?;
            let scale: Scale = scale.parse()?;
            let since = parse_time(since)?;
            let matching = if project.is_empty() {
                None
            } else {
                match choose_target(&mut tracker, project, cli.yes, false)? {
                    Some(target) => Some(target),
                    None => return Ok(()),
                }
            };
            let report = tracker.aggregate(matching.as_ref(), since, scale, *all, !no_header)?;
            let rendered = match form {
                ReportForm::Simple => report.render_simple(),
                ReportForm::Csv => report.render_csv(),
                ReportForm::Time => report.render_time(),
            };
            print!("{rendered}");
        }
        Some(Commands::Edit { at, to, reason }) => {
            let mut tracker = open_tracker(cli.config.as_deref(), cli.yes)?;
            let at = timeparse::parse(&TimeInput::Text(at.clone()))
                .context("could not parse the event time")?;
            let to = timeparse::parse(&TimeInput::Text(to.clone()))
                .context("could not parse the target time")?;
            let version = tracker.edit_time(at, to, reason)?;
            println!("previous log retained as version {version}");
        }
        Some(Commands::Gen) => {
            println!("{}", Uuid::new_v4());
        }
        Some(Commands::ExplainDates) => {
            println!("{}", timeparse::FORMAT_HELP);
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
