use std::{borrow::Cow, fs::File, io::stdin, path::PathBuf, process::exit};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use console::style;
use parking_fees::{
    explain::explain,
    lint::lint,
    normalize::normalize,
    pricer::{Pricer, Report},
    raw::RawTariff,
    Fee, ParkingInterval, TariffTable,
};
use tabled::{settings::Style, Table, Tabled};
use tracing::debug;

use crate::{error::Error, telemetry, Result};

#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    /// Log level or filter used when `RUST_LOG` is not set, for example `debug` or
    /// `parking_fees=trace`.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[clap(subcommand)]
    command: Command,
}

impl Cli {
    pub fn run(self) {
        let result = telemetry::init(&self.log_level)
            .map_err(Error::from)
            .and_then(|()| self.command.run());

        if let Err(err) = result {
            eprintln!("{}", style(err).red());
            exit(1);
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Calculate the fee for a parking stay under a tariff table.
    ///
    /// This command shows the fee together with a breakdown per cap window and per segment.
    Calculate(Calculate),
    /// Check a tariff table for rates that never apply and times when no rate applies.
    Lint(Lint),
    /// Describe every rate of a tariff table in words.
    Explain(Explain),
}

impl Command {
    fn run(self) -> Result<()> {
        match self {
            Self::Calculate(args) => args.run(),
            Self::Lint(args) => args.run(),
            Self::Explain(args) => args.run(),
        }
    }
}

#[derive(Debug, Args)]
pub struct TariffArgs {
    /// A path to the tariff table in json format, either a list of rates or an object with a
    /// `rates` field.
    ///
    /// If no path is provided the tariff is read from standard in.
    #[arg(short = 't', long)]
    tariff: Option<PathBuf>,
}

impl TariffArgs {
    fn tariff_name(&self) -> Cow<'_, str> {
        self.tariff.as_ref().map_or("<stdin>".into(), |path| {
            path.file_name()
                .map_or_else(|| path.to_string_lossy(), |name| name.to_string_lossy())
        })
    }

    fn load(&self) -> Result<TariffTable> {
        let raw: RawTariff = if let Some(path) = &self.tariff {
            let file = File::open(path).map_err(|e| Error::file(path.clone(), e))?;
            serde_json::from_reader(&file)
                .map_err(|e| Error::deserialize(path.display(), "tariff", e))?
        } else {
            let mut stdin = stdin().lock();
            serde_json::from_reader(&mut stdin)
                .map_err(|e| Error::deserialize("<stdin>", "tariff", e))?
        };

        let table = normalize(raw.rates())?;
        debug!(rates = table.len(), tariff = %self.tariff_name(), "loaded tariff");

        Ok(table)
    }
}

#[derive(Debug, Parser)]
pub struct Calculate {
    #[command(flatten)]
    args: TariffArgs,
    /// Start of the stay, either RFC 3339 (`2024-06-03T01:00:00Z`) or a local time without
    /// offset (`2024-06-03T10:00`).
    #[arg(short = 's', long)]
    start: String,
    /// End of the stay, in the same formats as `--start`.
    #[arg(short = 'e', long)]
    end: String,
    /// Timezone of the parking spot. Timestamps with an offset are converted to its local time.
    #[arg(short = 'z', long, default_value = "Asia/Tokyo")]
    timezone: Tz,
    /// A date to treat as a holiday, may be repeated.
    #[arg(long = "holiday", value_name = "YYYY-MM-DD")]
    holidays: Vec<NaiveDate>,
    /// Print the full report as json instead of tables.
    #[arg(long)]
    json: bool,
}

impl Calculate {
    fn run(self) -> Result<()> {
        let table = self.args.load()?;
        let interval = self.interval()?;

        let pricer = Pricer::new(&table).with_holidays(self.holidays.iter().copied());
        let report = pricer.build_report(&interval)?;

        if self.json {
            let json = serde_json::to_string_pretty(&report).map_err(Error::Serialize)?;
            println!("{json}");
            return Ok(());
        }

        println!(
            "{} `{}` from {} until {}",
            style("Calculating").green(),
            self.args.tariff_name(),
            interval.start(),
            interval.end()
        );

        print_report(&report);

        Ok(())
    }

    fn interval(&self) -> Result<ParkingInterval> {
        let start = Timestamp::parse(&self.start)?;
        let end = Timestamp::parse(&self.end)?;

        let interval = match (start, end) {
            (Timestamp::Utc(start), Timestamp::Utc(end)) => {
                ParkingInterval::from_utc(start, end, self.timezone)?
            }
            (start, end) => {
                ParkingInterval::new(start.local(self.timezone), end.local(self.timezone))?
            }
        };

        Ok(interval)
    }
}

enum Timestamp {
    Utc(DateTime<Utc>),
    Local(NaiveDateTime),
}

impl Timestamp {
    const LOCAL_FORMATS: [&'static str; 4] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];

    fn parse(value: &str) -> Result<Self> {
        if let Ok(date_time) = DateTime::parse_from_rfc3339(value) {
            return Ok(Self::Utc(date_time.with_timezone(&Utc)));
        }

        Self::LOCAL_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
            .map(Self::Local)
            .ok_or_else(|| Error::Timestamp(value.to_owned()))
    }

    fn local(self, timezone: Tz) -> NaiveDateTime {
        match self {
            Self::Utc(date_time) => date_time.with_timezone(&timezone).naive_local(),
            Self::Local(date_time) => date_time,
        }
    }
}

#[derive(Debug, Tabled)]
struct ChunkRow {
    #[tabled(rename = "Chunk")]
    kind: String,
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "End")]
    end: String,
    #[tabled(rename = "Minutes")]
    minutes: u32,
    #[tabled(rename = "Cap")]
    cap: String,
    #[tabled(rename = "Subtotal")]
    subtotal: String,
    #[tabled(rename = "Fee")]
    fee: String,
}

#[derive(Debug, Tabled)]
struct SegmentRow {
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "End")]
    end: String,
    #[tabled(rename = "Minutes")]
    minutes: u32,
    #[tabled(rename = "Day")]
    day_class: String,
    #[tabled(rename = "Base")]
    base: String,
    #[tabled(rename = "Progressive")]
    progressive: String,
    #[tabled(rename = "Max")]
    max: String,
    #[tabled(rename = "Fee")]
    fee: String,
}

fn rate_ref(index: Option<usize>) -> String {
    index.map_or_else(|| "-".to_owned(), |index| format!("$[{index}]"))
}

fn print_report(report: &Report) {
    if let Some(index) = report.conditional_free {
        println!(
            "{} by the free rate at `$[{index}]`",
            style("Stay is free of charge").green()
        );
    }

    if !report.chunks.is_empty() {
        let rows = report.chunks.iter().map(|chunk| ChunkRow {
            kind: format!("{}{:?}", "  ".repeat(chunk.depth), chunk.kind),
            start: chunk.start.to_string(),
            end: chunk.end.to_string(),
            minutes: chunk.minutes,
            cap: chunk.cap.map_or_else(
                || "-".to_owned(),
                |cap| format!("{} ($[{}])", cap.price, cap.rate_index),
            ),
            subtotal: chunk.subtotal.to_string(),
            fee: chunk.fee.to_string(),
        });

        println!("{}", Table::new(rows).with(Style::modern()));
    }

    if !report.segments.is_empty() {
        let rows = report.segments.iter().map(|segment| SegmentRow {
            start: segment.start.to_string(),
            end: segment.end.to_string(),
            minutes: segment.minutes,
            day_class: segment.day_class.to_string(),
            base: rate_ref(segment.base),
            progressive: rate_ref(segment.progressive),
            max: rate_ref(segment.max),
            fee: segment.fee.to_string(),
        });

        println!("{}", Table::new(rows).with(Style::modern()));
    }

    for cap in &report.applied_caps {
        println!(
            "{:?} cap `$[{}]` lowered {} minutes from {} to {} at {}",
            cap.stage, cap.rate_index, cap.minutes, cap.before, cap.after, cap.start
        );
    }

    for warning in &report.warnings {
        println!("{} {warning}", style("warning:").yellow());
    }

    if !report.stay_caps.is_empty() {
        println!("Subtotal {}", report.subtotal);
    }

    for cap in &report.stay_caps {
        println!("Stay capped at {} by `$[{}]`", cap.price, cap.rate_index);
    }

    match report.fee {
        Fee::Amount(amount) => println!("{} {}", style("Fee:").bold(), style(amount).green()),
        Fee::Undetermined => println!(
            "{} {}",
            style("Fee:").bold(),
            style("undetermined, no rate applies to this stay").red()
        ),
    }
}

#[derive(Debug, Parser)]
pub struct Lint {
    #[command(flatten)]
    args: TariffArgs,
}

impl Lint {
    fn run(self) -> Result<()> {
        let table = self.args.load()?;

        println!("{} `{}`", style("Linting").green(), self.args.tariff_name());

        let warnings = lint(&table);

        if warnings.is_empty() {
            println!("No warnings");
        }

        for warning in warnings {
            println!("{} {warning}", style("warning:").yellow());
        }

        Ok(())
    }
}

#[derive(Debug, Parser)]
pub struct Explain {
    #[command(flatten)]
    args: TariffArgs,
}

#[derive(Debug, Tabled)]
struct ExplainRow {
    #[tabled(rename = "Rate")]
    index: String,
    #[tabled(rename = "Charges")]
    description: String,
    #[tabled(rename = "Applies")]
    restrictions: String,
}

impl Explain {
    fn run(self) -> Result<()> {
        let table = self.args.load()?;

        println!("{} `{}`", style("Explaining").green(), self.args.tariff_name());

        let rows = explain(&table).rates.into_iter().map(|rate| ExplainRow {
            index: format!("$[{}]", rate.index),
            description: rate.description,
            restrictions: if rate.restrictions.is_empty() {
                "always".to_owned()
            } else {
                rate.restrictions.join(", ")
            },
        });

        println!("{}", Table::new(rows).with(Style::modern()));

        Ok(())
    }
}
