use chrono::{DateTime, NaiveDate, TimeZone, Timelike, Utc};

/// A date argument as given on the command line: a calendar day plus an
/// optional hour-of-day (0-23).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateHourArg {
    pub date: NaiveDate,
    pub hour: Option<u32>,
}

/// Parse a `"YYYY-MM-DD"` or `"YYYY-MM-DD H"` argument.
pub fn parse_date_hour(input: &str) -> eyre::Result<DateHourArg> {
    let mut parts = input.split_whitespace();
    let date_part = parts
        .next()
        .ok_or_else(|| eyre::eyre!("Empty date argument"))?;
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|e| eyre::eyre!("Invalid date '{}': {}", date_part, e))?;

    let hour = match parts.next() {
        Some(hour_part) => {
            let hour: u32 = hour_part
                .parse()
                .map_err(|_| eyre::eyre!("Invalid hour '{}': expected 0-23", hour_part))?;
            if hour > 23 {
                return Err(eyre::eyre!("Invalid hour '{}': expected 0-23", hour_part));
            }
            Some(hour)
        }
        None => None,
    };

    if parts.next().is_some() {
        return Err(eyre::eyre!(
            "Invalid date argument '{}': expected \"YYYY-MM-DD\" or \"YYYY-MM-DD H\"",
            input
        ));
    }

    Ok(DateHourArg { date, hour })
}

/// The inclusive UTC hour range a run covers. Both boundaries sit exactly
/// on an hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn start_ts(&self) -> i64 {
        self.start.timestamp()
    }

    pub fn end_ts(&self) -> i64 {
        self.end.timestamp()
    }

    /// Whether a unix timestamp falls inside the window (boundaries included).
    pub fn contains(&self, ts: i64) -> bool {
        self.start_ts() <= ts && ts <= self.end_ts()
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Calendar days touched by the window, oldest first.
    pub fn days(&self) -> DayRange {
        days(self.start.date_naive(), self.end.date_naive())
    }
}

/// Resolve the run window from the CLI arguments. A start date without an
/// hour begins at 00:00; an absent end defaults to the last fully elapsed
/// hour before `now`.
pub fn resolve_window(
    start: &str,
    end: Option<&str>,
    now: DateTime<Utc>,
) -> eyre::Result<Window> {
    let start_arg = parse_date_hour(start)?;
    let start = at_hour(start_arg.date, start_arg.hour.unwrap_or(0));

    let end = match end {
        Some(end) => {
            let end_arg = parse_date_hour(end)?;
            at_hour(end_arg.date, end_arg.hour.unwrap_or(0))
        }
        None => {
            let last_full = now - chrono::Duration::hours(1);
            at_hour(last_full.date_naive(), last_full.hour())
        }
    };

    Ok(Window { start, end })
}

fn at_hour(date: NaiveDate, hour: u32) -> DateTime<Utc> {
    // hour is validated to 0-23 before we get here
    Utc.from_utc_datetime(&date.and_hms_opt(hour, 0, 0).unwrap())
}

/// Iterator over calendar days from `first` through `last`, inclusive.
#[derive(Debug, Clone)]
pub struct DayRange {
    next: Option<NaiveDate>,
    last: NaiveDate,
}

pub fn days(first: NaiveDate, last: NaiveDate) -> DayRange {
    DayRange {
        next: (first <= last).then_some(first),
        last,
    }
}

impl Iterator for DayRange {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let current = self.next?;
        self.next = if current < self.last {
            current.succ_opt()
        } else {
            None
        };
        Some(current)
    }
}
