//! Date, time and duration values
//!
//! Parsing, canonical forms and value keys for `duration` and the
//! `dateTime` family. Years are unbounded `i64` values in astronomical
//! numbering (year 0 is 1 BCE); fractional seconds are kept to 18 digits.

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{Months, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::{ToPrimitive, Zero};
use rust_decimal::Decimal;

use super::builtins::ValidatorKind;

/// Fractional second units per second
pub const FRACTION_SCALE: u64 = 1_000_000_000_000_000_000;
const FRACTION_DIGITS: usize = 18;
const SECONDS_PER_DAY: i128 = 86_400;
const MAX_YEAR_DIGITS: usize = 15;

/// A parsed value of one of the date/time kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateTimeValue {
    /// Year (astronomical numbering)
    pub year: i64,
    /// Month 1-12
    pub month: u8,
    /// Day 1-31
    pub day: u8,
    /// Hour 0-23
    pub hour: u8,
    /// Minute 0-59
    pub minute: u8,
    /// Second 0-59
    pub second: u8,
    /// Fractional second in 1e-18 units
    pub fraction: u64,
    /// Timezone offset in minutes
    pub tz: Option<i16>,
}

/// Whether `year` is a leap year
pub fn is_leap_year(year: i64) -> bool {
    year.rem_euclid(4) == 0 && (year.rem_euclid(100) != 0 || year.rem_euclid(400) == 0)
}

/// Number of days in a month
pub fn days_in_month(year: i64, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Days since 1970-01-01 of a proleptic Gregorian date
pub fn days_from_civil(year: i64, month: u8, day: u8) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = (i64::from(month) + 9) % 12;
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Proleptic Gregorian date of a day count since 1970-01-01
pub fn civil_from_days(days: i64) -> (i64, u8, u8) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

struct Cursor<'a> {
    s: &'a [u8],
    i: usize,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a [u8]) -> Self {
        Self { s, i: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.s.get(self.i).copied()
    }

    fn done(&self) -> bool {
        self.i == self.s.len()
    }

    fn expect(&mut self, b: u8) -> Option<()> {
        if self.peek() == Some(b) {
            self.i += 1;
            Some(())
        } else {
            None
        }
    }

    fn fixed(&mut self, n: usize) -> Option<u32> {
        let digits = self.s.get(self.i..self.i + n)?;
        if !digits.iter().all(u8::is_ascii_digit) {
            return None;
        }
        self.i += n;
        Some(digits.iter().fold(0, |acc, &d| acc * 10 + u32::from(d - b'0')))
    }

    fn year(&mut self) -> Option<i64> {
        let negative = self.expect(b'-').is_some();
        let start = self.i;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.i += 1;
        }
        let digits = &self.s[start..self.i];
        if digits.len() < 4 || digits.len() > MAX_YEAR_DIGITS {
            return None;
        }
        if digits.len() > 4 && digits[0] == b'0' {
            return None;
        }
        let value = digits.iter().fold(0i64, |acc, &d| acc * 10 + i64::from(d - b'0'));
        if negative && value == 0 {
            return None;
        }
        Some(if negative { -value } else { value })
    }

    fn fraction(&mut self) -> Option<u64> {
        if self.expect(b'.').is_none() {
            return Some(0);
        }
        let start = self.i;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.i += 1;
        }
        let digits = &self.s[start..self.i];
        if digits.is_empty() {
            return None;
        }
        let mut value = 0u64;
        for k in 0..FRACTION_DIGITS {
            let d = digits.get(k).map_or(0, |&d| u64::from(d - b'0'));
            value = value * 10 + d;
        }
        Some(value)
    }

    fn timezone(&mut self) -> Option<Option<i16>> {
        match self.peek() {
            None => Some(None),
            Some(b'Z') => {
                self.i += 1;
                Some(Some(0))
            }
            Some(sign @ (b'+' | b'-')) => {
                self.i += 1;
                let hh = self.fixed(2)?;
                self.expect(b':')?;
                let mm = self.fixed(2)?;
                if mm > 59 || hh > 14 || (hh == 14 && mm != 0) {
                    return None;
                }
                let minutes = (hh * 60 + mm) as i16;
                Some(Some(if sign == b'-' { -minutes } else { minutes }))
            }
            Some(_) => None,
        }
    }

    fn time_of_day(&mut self, v: &mut DateTimeValue) -> Option<()> {
        let hour = self.fixed(2)?;
        self.expect(b':')?;
        let minute = self.fixed(2)?;
        self.expect(b':')?;
        let second = self.fixed(2)?;
        let fraction = self.fraction()?;
        if minute > 59 || second > 59 {
            return None;
        }
        if hour > 24 || (hour == 24 && (minute != 0 || second != 0 || fraction != 0)) {
            return None;
        }
        v.hour = hour as u8;
        v.minute = minute as u8;
        v.second = second as u8;
        v.fraction = fraction;
        Some(())
    }
}

/// Parse a date/time lexical form of the given kind
pub fn parse_temporal(kind: ValidatorKind, input: &[u8]) -> Option<DateTimeValue> {
    let mut c = Cursor::new(input);
    let mut v = DateTimeValue {
        year: 1972,
        month: 12,
        day: 31,
        ..Default::default()
    };
    match kind {
        ValidatorKind::DateTime => {
            v.year = c.year()?;
            c.expect(b'-')?;
            v.month = c.fixed(2)? as u8;
            c.expect(b'-')?;
            v.day = c.fixed(2)? as u8;
            c.expect(b'T')?;
            c.time_of_day(&mut v)?;
        }
        ValidatorKind::Time => c.time_of_day(&mut v)?,
        ValidatorKind::Date => {
            v.year = c.year()?;
            c.expect(b'-')?;
            v.month = c.fixed(2)? as u8;
            c.expect(b'-')?;
            v.day = c.fixed(2)? as u8;
        }
        ValidatorKind::GYearMonth => {
            v.year = c.year()?;
            c.expect(b'-')?;
            v.month = c.fixed(2)? as u8;
            v.day = 1;
        }
        ValidatorKind::GYear => {
            v.year = c.year()?;
            v.month = 1;
            v.day = 1;
        }
        ValidatorKind::GMonthDay => {
            c.expect(b'-')?;
            c.expect(b'-')?;
            v.month = c.fixed(2)? as u8;
            c.expect(b'-')?;
            v.day = c.fixed(2)? as u8;
        }
        ValidatorKind::GDay => {
            for _ in 0..3 {
                c.expect(b'-')?;
            }
            v.day = c.fixed(2)? as u8;
        }
        ValidatorKind::GMonth => {
            c.expect(b'-')?;
            c.expect(b'-')?;
            v.month = c.fixed(2)? as u8;
            v.day = 1;
        }
        _ => return None,
    }
    v.tz = c.timezone()?;
    if !c.done() {
        return None;
    }
    if !(1..=12).contains(&v.month) || v.day == 0 || v.day > days_in_month(v.year, v.month) {
        return None;
    }
    Some(v)
}

fn day_seconds(v: &DateTimeValue) -> i128 {
    i128::from(v.hour) * 3600 + i128::from(v.minute) * 60 + i128::from(v.second)
}

/// Seconds since 1970-01-01T00:00:00 of the value's starting instant,
/// adjusted to UTC when a timezone is present
pub fn instant_seconds(kind: ValidatorKind, v: &DateTimeValue) -> i128 {
    let tz = i128::from(v.tz.unwrap_or(0)) * 60;
    if kind == ValidatorKind::Time {
        return (day_seconds(v) - tz).rem_euclid(SECONDS_PER_DAY);
    }
    i128::from(days_from_civil(v.year, v.month, v.day)) * SECONDS_PER_DAY + day_seconds(v) - tz
}

/// Order two values of the same kind (timezone-less values count as UTC)
pub fn compare_temporal(kind: ValidatorKind, a: &DateTimeValue, b: &DateTimeValue) -> Ordering {
    instant_seconds(kind, a)
        .cmp(&instant_seconds(kind, b))
        .then(a.fraction.cmp(&b.fraction))
}

/// Append the value key (timezone flag, instant, fraction)
pub fn write_temporal_key(kind: ValidatorKind, v: &DateTimeValue, out: &mut Vec<u8>) {
    out.push(u8::from(v.tz.is_some()));
    out.extend_from_slice(&instant_seconds(kind, v).to_be_bytes());
    out.extend_from_slice(&v.fraction.to_be_bytes());
}

fn push_padded(out: &mut Vec<u8>, value: u64, width: usize) {
    let s = format!("{:0width$}", value, width = width);
    out.extend_from_slice(s.as_bytes());
}

fn push_year(out: &mut Vec<u8>, year: i64) {
    if year < 0 {
        out.push(b'-');
    }
    push_padded(out, year.unsigned_abs(), 4);
}

fn push_fraction(out: &mut Vec<u8>, fraction: u64) {
    if fraction == 0 {
        return;
    }
    let digits = format!("{:018}", fraction);
    out.push(b'.');
    out.extend_from_slice(digits.trim_end_matches('0').as_bytes());
}

fn push_time(out: &mut Vec<u8>, v: &DateTimeValue) {
    push_padded(out, u64::from(v.hour), 2);
    out.push(b':');
    push_padded(out, u64::from(v.minute), 2);
    out.push(b':');
    push_padded(out, u64::from(v.second), 2);
    push_fraction(out, v.fraction);
}

fn push_tz(out: &mut Vec<u8>, tz: Option<i16>) {
    match tz {
        None => {}
        Some(0) => out.push(b'Z'),
        Some(minutes) => {
            out.push(if minutes < 0 { b'-' } else { b'+' });
            let m = minutes.unsigned_abs();
            push_padded(out, u64::from(m / 60), 2);
            out.push(b':');
            push_padded(out, u64::from(m % 60), 2);
        }
    }
}

/// Normalize a value to its canonical fields
///
/// `24:00:00` rolls over to midnight of the next day; `dateTime` and `time`
/// values with a timezone are moved to UTC.
pub fn normalize_temporal(kind: ValidatorKind, v: &DateTimeValue) -> DateTimeValue {
    let mut out = *v;
    match kind {
        ValidatorKind::DateTime => {
            let rollover = v.hour == 24;
            if v.tz.is_some() || rollover {
                let secs = instant_seconds(kind, v);
                let days = secs.div_euclid(SECONDS_PER_DAY) as i64;
                let rem = secs.rem_euclid(SECONDS_PER_DAY) as u32;
                let (year, month, day) = civil_from_days(days);
                out.year = year;
                out.month = month;
                out.day = day;
                out.hour = (rem / 3600) as u8;
                out.minute = (rem / 60 % 60) as u8;
                out.second = (rem % 60) as u8;
                out.tz = v.tz.map(|_| 0);
            }
        }
        ValidatorKind::Time => {
            let rem = instant_seconds(kind, v) as u32;
            out.hour = (rem / 3600) as u8;
            out.minute = (rem / 60 % 60) as u8;
            out.second = (rem % 60) as u8;
            out.tz = v.tz.map(|_| 0);
        }
        _ => {}
    }
    out
}

/// Append the canonical lexical form of a normalized value
pub fn write_temporal(kind: ValidatorKind, v: &DateTimeValue, out: &mut Vec<u8>) {
    match kind {
        ValidatorKind::DateTime => {
            push_year(out, v.year);
            out.push(b'-');
            push_padded(out, u64::from(v.month), 2);
            out.push(b'-');
            push_padded(out, u64::from(v.day), 2);
            out.push(b'T');
            push_time(out, v);
        }
        ValidatorKind::Time => push_time(out, v),
        ValidatorKind::Date => {
            push_year(out, v.year);
            out.push(b'-');
            push_padded(out, u64::from(v.month), 2);
            out.push(b'-');
            push_padded(out, u64::from(v.day), 2);
        }
        ValidatorKind::GYearMonth => {
            push_year(out, v.year);
            out.push(b'-');
            push_padded(out, u64::from(v.month), 2);
        }
        ValidatorKind::GYear => push_year(out, v.year),
        ValidatorKind::GMonthDay => {
            out.extend_from_slice(b"--");
            push_padded(out, u64::from(v.month), 2);
            out.push(b'-');
            push_padded(out, u64::from(v.day), 2);
        }
        ValidatorKind::GDay => {
            out.extend_from_slice(b"---");
            push_padded(out, u64::from(v.day), 2);
        }
        ValidatorKind::GMonth => {
            out.extend_from_slice(b"--");
            push_padded(out, u64::from(v.month), 2);
        }
        _ => {}
    }
    push_tz(out, v.tz);
}

// =============================================================================
// Duration
// =============================================================================

/// A duration as (months, seconds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DurationValue {
    /// Signed month component
    pub months: i64,
    /// Signed second component
    pub seconds: Decimal,
}

fn take_number<'a>(s: &'a [u8], i: &mut usize, allow_fraction: bool) -> Option<&'a [u8]> {
    let start = *i;
    while matches!(s.get(*i), Some(b'0'..=b'9')) {
        *i += 1;
    }
    if allow_fraction && s.get(*i) == Some(&b'.') {
        *i += 1;
        let frac_start = *i;
        while matches!(s.get(*i), Some(b'0'..=b'9')) {
            *i += 1;
        }
        if *i == frac_start {
            return None;
        }
    }
    if *i == start {
        None
    } else {
        Some(&s[start..*i])
    }
}

fn to_i64(digits: &[u8]) -> Option<i64> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Parse a duration lexical form
pub fn parse_duration(input: &[u8]) -> Option<DurationValue> {
    let (negative, rest) = match input.first() {
        Some(b'-') => (true, &input[1..]),
        _ => (false, input),
    };
    if rest.first() != Some(&b'P') {
        return None;
    }
    let s = &rest[1..];
    let mut i = 0;
    let mut months: i64 = 0;
    let mut seconds = Decimal::ZERO;
    let mut seen_any = false;
    let mut in_time = false;
    // designators must appear in this order
    let mut rank = 0u8;

    while i < s.len() {
        if s[i] == b'T' {
            if in_time {
                return None;
            }
            in_time = true;
            i += 1;
            if i == s.len() {
                return None;
            }
            continue;
        }
        let number = take_number(s, &mut i, in_time)?;
        let designator = *s.get(i)?;
        i += 1;
        let next_rank = match (in_time, designator) {
            (false, b'Y') => 1,
            (false, b'M') => 2,
            (false, b'D') => 3,
            (true, b'H') => 4,
            (true, b'M') => 5,
            (true, b'S') => 6,
            _ => return None,
        };
        if next_rank <= rank {
            return None;
        }
        if next_rank != 6 && number.contains(&b'.') {
            return None;
        }
        rank = next_rank;
        seen_any = true;
        match next_rank {
            1 => months = months.checked_add(to_i64(number)?.checked_mul(12)?)?,
            2 => months = months.checked_add(to_i64(number)?)?,
            3 => seconds = seconds.checked_add(Decimal::from(to_i64(number)?).checked_mul(Decimal::from(86_400))?)?,
            4 => seconds = seconds.checked_add(Decimal::from(to_i64(number)?).checked_mul(Decimal::from(3600))?)?,
            5 => seconds = seconds.checked_add(Decimal::from(to_i64(number)?).checked_mul(Decimal::from(60))?)?,
            _ => seconds = seconds.checked_add(Decimal::from_str(std::str::from_utf8(number).ok()?).ok()?)?,
        }
    }
    if !seen_any {
        return None;
    }
    if negative {
        months = -months;
        seconds = -seconds;
    }
    Some(DurationValue { months, seconds })
}

/// Append the canonical lexical form of a duration
pub fn write_duration(d: &DurationValue, out: &mut Vec<u8>) {
    if d.months == 0 && d.seconds.is_zero() {
        out.extend_from_slice(b"PT0S");
        return;
    }
    if d.months < 0 || d.seconds.is_sign_negative() && !d.seconds.is_zero() {
        out.push(b'-');
    }
    out.push(b'P');
    let months = d.months.unsigned_abs();
    if months / 12 > 0 {
        out.extend_from_slice(format!("{}Y", months / 12).as_bytes());
    }
    if months % 12 > 0 {
        out.extend_from_slice(format!("{}M", months % 12).as_bytes());
    }
    let total = d.seconds.abs();
    let whole = total.trunc();
    let fraction = total - whole;
    let whole = whole.to_u128().unwrap_or(0);
    let days = whole / 86_400;
    let hours = whole % 86_400 / 3600;
    let minutes = whole % 3600 / 60;
    let secs = Decimal::from(whole % 60) + fraction;
    if days > 0 {
        out.extend_from_slice(format!("{}D", days).as_bytes());
    }
    if hours > 0 || minutes > 0 || !secs.is_zero() {
        out.push(b'T');
        if hours > 0 {
            out.extend_from_slice(format!("{}H", hours).as_bytes());
        }
        if minutes > 0 {
            out.extend_from_slice(format!("{}M", minutes).as_bytes());
        }
        if !secs.is_zero() {
            out.extend_from_slice(format!("{}S", secs.normalize()).as_bytes());
        }
    }
}

/// Append the value key of a duration
pub fn write_duration_key(d: &DurationValue, out: &mut Vec<u8>) {
    out.extend_from_slice(&d.months.to_be_bytes());
    out.extend_from_slice(d.seconds.normalize().to_string().as_bytes());
}

fn reference_instants() -> [Option<NaiveDateTime>; 4] {
    [(1696, 9, 1), (1697, 2, 1), (1903, 3, 1), (1903, 7, 1)]
        .map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).and_then(|date| date.and_hms_opt(0, 0, 0)))
}

fn add_duration(start: NaiveDateTime, d: &DurationValue) -> Option<NaiveDateTime> {
    let shifted = if d.months >= 0 {
        start.checked_add_months(Months::new(u32::try_from(d.months).ok()?))?
    } else {
        start.checked_sub_months(Months::new(u32::try_from(d.months.unsigned_abs()).ok()?))?
    };
    let whole = d.seconds.trunc();
    let secs = whole.to_i64()?;
    if secs.unsigned_abs() > 1_000_000_000_000 {
        return None;
    }
    let nanos = ((d.seconds - whole) * Decimal::from(1_000_000_000)).trunc().to_i64()?;
    shifted
        .checked_add_signed(chrono::Duration::seconds(secs))?
        .checked_add_signed(chrono::Duration::nanoseconds(nanos))
}

/// Partial order of durations
///
/// Values compare by adding both to four reference instants; `None` means
/// the order is indeterminate.
pub fn compare_duration(a: &DurationValue, b: &DurationValue) -> Option<Ordering> {
    if a.months == b.months {
        return Some(a.seconds.cmp(&b.seconds));
    }
    let mut result = None;
    for start in reference_instants() {
        let start = start?;
        let ord = add_duration(start, a)?.cmp(&add_duration(start, b)?);
        match result {
            None => result = Some(ord),
            Some(prev) if prev != ord => return None,
            _ => {}
        }
    }
    result
}
