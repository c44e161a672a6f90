//! Duration aggregation and report rendering.
//!
//! [`aggregate`] folds an ordered event sequence into per-project second
//! totals; [`Report`] renders those totals in three equivalent forms whose
//! total columns always sum to the same grand total.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::str::FromStr;

use chrono::{DateTime, Local};
use thiserror::Error;
use uuid::Uuid;

use crate::project::{LogEvent, State};

pub const MINUTE: i64 = 60;
pub const HOUR: i64 = MINUTE * 60;
pub const DAY: i64 = HOUR * 24;
pub const WEEK: i64 = DAY * 7;

/// The largest time unit shown when rendering a duration.
///
/// All larger units fold into the selected one, so `Hours` can show an
/// hour count above 24.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Weeks,
    Days,
    Hours,
    Minutes,
    Seconds,
}

/// An unrecognized scale string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown scale {value:?}, expected one of w, d, h, m, s")]
pub struct UnknownScale {
    pub value: String,
}

impl FromStr for Scale {
    type Err = UnknownScale;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "w" | "weeks" => Ok(Self::Weeks),
            "d" | "days" => Ok(Self::Days),
            "h" | "hours" => Ok(Self::Hours),
            "m" | "minutes" => Ok(Self::Minutes),
            "s" | "seconds" => Ok(Self::Seconds),
            _ => Err(UnknownScale {
                value: s.to_string(),
            }),
        }
    }
}

impl Scale {
    /// Unit sizes in seconds, largest first, always ending at seconds.
    const fn unit_seconds(self) -> &'static [i64] {
        match self {
            Self::Weeks => &[WEEK, DAY, HOUR, MINUTE, 1],
            Self::Days => &[DAY, HOUR, MINUTE, 1],
            Self::Hours => &[HOUR, MINUTE, 1],
            Self::Minutes => &[MINUTE, 1],
            Self::Seconds => &[1],
        }
    }
}

/// Decomposes a second total into the scale's units, largest first.
///
/// The leading unit is unbounded; the rest are remainders.
pub fn decompose(total_secs: i64, scale: Scale) -> Vec<i64> {
    let mut rem = total_secs.max(0);
    let mut parts = Vec::with_capacity(5);
    for unit in scale.unit_seconds() {
        parts.push(rem / unit);
        rem %= unit;
    }
    parts
}

/// Reconstructs per-project totals (whole seconds) from paired
/// start/stop events.
///
/// Events must already be in log order. A `started` event records (or
/// overwrites) the open start for its project; a `stopped` event with an
/// open start closes the interval; a `stopped` with none contributes
/// nothing. `running_last` names the derived last project when it is
/// still in the `started` state; its open interval is closed against
/// `now` so in-progress work is counted.
pub fn aggregate(
    events: &[LogEvent],
    now: DateTime<Local>,
    running_last: Option<Uuid>,
) -> BTreeMap<Uuid, i64> {
    let mut totals: BTreeMap<Uuid, i64> = BTreeMap::new();
    let mut open: HashMap<Uuid, i64> = HashMap::new();

    for event in events {
        match event.state {
            State::Started => {
                open.insert(event.project, event.id.millis);
                totals.entry(event.project).or_insert(0);
            }
            State::Stopped => {
                if let Some(started) = open.remove(&event.project) {
                    *totals.entry(event.project).or_insert(0) += event.id.millis - started;
                }
            }
        }
    }

    if let Some(project) = running_last {
        if let Some(started) = open.get(&project) {
            *totals.entry(project).or_insert(0) += now.timestamp_millis() - started;
        }
    }

    totals.into_iter().map(|(id, ms)| (id, ms / 1_000)).collect()
}

/// One row of a rendered report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub id: Uuid,
    pub name: String,
    pub total_secs: i64,
    pub running: bool,
}

/// A renderable totals map.
#[derive(Debug, Clone)]
pub struct Report {
    pub entries: Vec<ReportEntry>,
    pub since: Option<DateTime<Local>>,
    pub scale: Scale,
    /// Keep zero-total rows instead of dropping them.
    pub include_all: bool,
    pub show_header: bool,
}

impl Report {
    fn visible(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries
            .iter()
            .filter(|e| e.total_secs != 0 || self.include_all)
    }

    /// The sum over every visible row's total column, identical across
    /// all three render forms.
    pub fn grand_total(&self) -> i64 {
        self.visible().map(|e| e.total_secs).sum()
    }

    fn duration_cells(&self, total_secs: i64) -> String {
        let d = decompose(total_secs, self.scale);
        match self.scale {
            Scale::Weeks => format!(
                "{:02}w {:02}d {:02}h {:02}m {:02}s",
                d[0], d[1], d[2], d[3], d[4]
            ),
            Scale::Days => format!("{:03}d {:02}h {:02}m {:02}s", d[0], d[1], d[2], d[3]),
            Scale::Hours => format!("{:04}h {:02}m {:02}s", d[0], d[1], d[2]),
            Scale::Minutes => format!("{:04}m {:02}s", d[0], d[1]),
            Scale::Seconds => format!("{:>8}s", d[0]),
        }
    }

    /// Human-readable breakdown, one project per line.
    pub fn render_simple(&self) -> String {
        let mut out = String::new();
        if self.show_header {
            match self.since {
                Some(at) => {
                    writeln!(out, "Time spent report since: {}", at.format("%a %F %T")).unwrap();
                }
                None => out.push_str("Time spent report:\n"),
            }
        }
        for entry in self.visible() {
            out.push_str(&self.duration_cells(entry.total_secs));
            if self.scale != Scale::Seconds {
                write!(out, " total {:>8}", entry.total_secs).unwrap();
            }
            write!(out, " id {} project {:?}", entry.id, entry.name).unwrap();
            if entry.running {
                out.push_str(" ...and counting");
            }
            out.push('\n');
        }
        out
    }

    /// Flat tabular form: one column per unit plus total, id, name and
    /// running flag.
    pub fn render_csv(&self) -> String {
        let mut out = String::new();
        if self.show_header {
            out.push_str("Time spent report\n");
        }
        let unit_columns = match self.scale {
            Scale::Weeks => "weeks,days,hours,minutes,seconds,",
            Scale::Days => "days,hours,minutes,seconds,",
            Scale::Hours => "hours,minutes,seconds,",
            Scale::Minutes => "minutes,seconds,",
            Scale::Seconds => "",
        };
        out.push_str(unit_columns);
        out.push_str("total (in seconds),id,project,running");
        if self.since.is_some() {
            out.push_str(",since");
        }
        out.push('\n');

        for entry in self.visible() {
            if self.scale != Scale::Seconds {
                let cells: Vec<String> = decompose(entry.total_secs, self.scale)
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                out.push_str(&cells.join(","));
                out.push(',');
            }
            write!(
                out,
                "{},{},\"{}\",{}",
                entry.total_secs, entry.id, entry.name, entry.running
            )
            .unwrap();
            if let Some(at) = self.since {
                write!(out, ",{}", at.format("%a %F %T")).unwrap();
            }
            out.push('\n');
        }
        out
    }

    /// Compact per-unit-columns form, colon-separated.
    pub fn render_time(&self) -> String {
        let mut out = String::new();
        if self.show_header {
            out.push_str(match self.scale {
                Scale::Weeks => "  w  d  h  m  s\n",
                Scale::Days => "  d  h  m  s\n",
                Scale::Hours => "  h  m  s\n",
                Scale::Minutes => "   m  s\n",
                Scale::Seconds => "       s\n",
            });
        }
        for entry in self.visible() {
            let d = decompose(entry.total_secs, self.scale);
            match self.scale {
                Scale::Weeks | Scale::Days | Scale::Hours => {
                    write!(out, "{:03}", d[0]).unwrap();
                    for part in &d[1..] {
                        write!(out, ":{part:02}").unwrap();
                    }
                }
                Scale::Minutes => write!(out, "{:04}:{:02}", d[0], d[1]).unwrap(),
                Scale::Seconds => write!(out, "{:>8}", d[0]).unwrap(),
            }
            writeln!(out, " {:?}", entry.name).unwrap();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::id::TimestampId;

    fn event(millis: i64, project: Uuid, state: State) -> LogEvent {
        LogEvent {
            id: TimestampId { millis, serial: 0 },
            project,
            state,
        }
    }

    fn at(millis: i64) -> DateTime<Local> {
        Local.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn single_pair_yields_the_delta() {
        let alpha = Uuid::new_v4();
        let events = [
            event(0, alpha, State::Started),
            event(90_000, alpha, State::Stopped),
        ];
        let totals = aggregate(&events, at(1_000_000), None);
        assert_eq!(totals[&alpha], 90);
    }

    #[test]
    fn back_to_back_projects() {
        let alpha = Uuid::new_v4();
        let beta = Uuid::new_v4();
        let events = [
            event(0, alpha, State::Started),
            event(90_000, alpha, State::Stopped),
            event(90_000, beta, State::Started),
            event(150_000, beta, State::Stopped),
        ];
        let totals = aggregate(&events, at(1_000_000), None);
        assert_eq!(totals[&alpha], 90);
        assert_eq!(totals[&beta], 60);

        assert_eq!(decompose(totals[&alpha], Scale::Minutes), vec![1, 30]);
        assert_eq!(decompose(totals[&beta], Scale::Minutes), vec![1, 0]);
    }

    #[test]
    fn dangling_start_of_the_last_project_is_closed_with_now() {
        let alpha = Uuid::new_v4();
        let events = [event(0, alpha, State::Started)];
        let totals = aggregate(&events, at(45_000), Some(alpha));
        assert_eq!(totals[&alpha], 45);
    }

    #[test]
    fn dangling_start_of_a_non_last_project_is_not_counted() {
        let alpha = Uuid::new_v4();
        let events = [event(0, alpha, State::Started)];
        let totals = aggregate(&events, at(45_000), None);
        assert_eq!(totals[&alpha], 0);
    }

    #[test]
    fn dangling_stop_contributes_nothing() {
        let alpha = Uuid::new_v4();
        let events = [event(30_000, alpha, State::Stopped)];
        let totals = aggregate(&events, at(45_000), None);
        assert_eq!(totals.get(&alpha), None);
    }

    #[test]
    fn restart_overwrites_the_open_start() {
        let alpha = Uuid::new_v4();
        let events = [
            event(0, alpha, State::Started),
            event(60_000, alpha, State::Started),
            event(90_000, alpha, State::Stopped),
        ];
        let totals = aggregate(&events, at(1_000_000), None);
        assert_eq!(totals[&alpha], 30);
    }

    #[test]
    fn decompose_folds_larger_units_into_the_scale() {
        // 2 days and 3 hours shown at hour scale.
        let secs = 2 * DAY + 3 * HOUR + 4 * MINUTE + 5;
        assert_eq!(decompose(secs, Scale::Hours), vec![51, 4, 5]);
        assert_eq!(decompose(secs, Scale::Days), vec![2, 3, 4, 5]);
        assert_eq!(decompose(WEEK + 1, Scale::Weeks), vec![1, 0, 0, 0, 1]);
    }

    #[test]
    fn scale_parses_letters_and_names() {
        assert_eq!("w".parse::<Scale>().unwrap(), Scale::Weeks);
        assert_eq!("hours".parse::<Scale>().unwrap(), Scale::Hours);
        assert!("fortnights".parse::<Scale>().is_err());
    }

    fn sample_report(include_all: bool) -> Report {
        Report {
            entries: vec![
                ReportEntry {
                    id: Uuid::new_v4(),
                    name: "alpha".into(),
                    total_secs: 2 * HOUR + 90,
                    running: true,
                },
                ReportEntry {
                    id: Uuid::new_v4(),
                    name: "beta".into(),
                    total_secs: 60,
                    running: false,
                },
                ReportEntry {
                    id: Uuid::new_v4(),
                    name: "untouched".into(),
                    total_secs: 0,
                    running: false,
                },
            ],
            since: None,
            scale: Scale::Hours,
            include_all,
            show_header: true,
        }
    }

    #[test]
    fn zero_rows_hidden_unless_include_all() {
        let report = sample_report(false);
        assert!(!report.render_simple().contains("untouched"));
        let report = sample_report(true);
        assert!(report.render_simple().contains("untouched"));
    }

    #[test]
    fn total_columns_agree_across_forms() {
        let report = sample_report(true);
        let expected = report.grand_total();

        // simple: " total <n>" column
        let simple: i64 = report
            .render_simple()
            .lines()
            .filter_map(|l| l.split(" total ").nth(1))
            .map(|rest| {
                rest.trim()
                    .split(' ')
                    .next()
                    .unwrap()
                    .parse::<i64>()
                    .unwrap()
            })
            .sum();
        assert_eq!(simple, expected);

        // csv: the column right after the per-unit cells
        let csv = report.render_csv();
        let unit_columns = 3; // hours, minutes, seconds
        let csv_total: i64 = csv
            .lines()
            .skip(2) // title + column header
            .map(|l| l.split(',').nth(unit_columns).unwrap().parse::<i64>().unwrap())
            .sum();
        assert_eq!(csv_total, expected);

        // time: recompose the colon cells
        let time_total: i64 = report
            .render_time()
            .lines()
            .skip(1)
            .map(|l| {
                let cells = l.split(' ').next().unwrap();
                cells
                    .split(':')
                    .map(|c| c.parse::<i64>().unwrap())
                    .zip([HOUR, MINUTE, 1])
                    .map(|(v, unit)| v * unit)
                    .sum::<i64>()
            })
            .sum();
        assert_eq!(time_total, expected);
    }

    #[test]
    fn running_entry_is_marked() {
        let report = sample_report(false);
        let simple = report.render_simple();
        let alpha_line = simple.lines().find(|l| l.contains("alpha")).unwrap();
        assert!(alpha_line.ends_with("...and counting"));
        assert!(report.render_csv().contains("\"alpha\",true"));
    }
}
