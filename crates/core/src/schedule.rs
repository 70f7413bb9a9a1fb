//! Campaign dates, durations and output naming.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc};
use regex::Regex;

pub const START_DATE_PLACEHOLDER: &str = "[Start Date]";
pub const END_DATE_PLACEHOLDER: &str = "[End Date]";

/// Offset used for filename timestamps (Gulf Standard Time).
const LOCAL_OFFSET_SECS: i32 = 4 * 3600;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateStyle {
    /// `1st December 2025`
    Ordinal,
    /// `1 December 2025`
    DayMonthName,
    /// `01/12/2025`
    SlashPadded,
    /// `1/12/2025`
    Slash,
    /// `01-12-2025`
    Dash,
    /// `2025-12-01`
    Iso,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CampaignDate {
    pub date: NaiveDate,
    pub style: DateStyle,
}

static ORDINAL_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d{1,2})(st|nd|rd|th)?\s+([a-z]+)\s*,?\s+(\d{4})$")
        .expect("ordinal date pattern compiles")
});

static DURATION_WEEKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\d+)\s*(weeks?|wks?|w)?\s*$").expect("duration pattern compiles")
});

impl CampaignDate {
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        if let Some(captures) = ORDINAL_DATE.captures(input) {
            let style =
                if captures.get(2).is_some() { DateStyle::Ordinal } else { DateStyle::DayMonthName };
            let normalized = format!("{} {} {}", &captures[1], &captures[3], &captures[4]);
            let date = NaiveDate::parse_from_str(&normalized, "%d %B %Y").ok()?;
            return Some(Self { date, style });
        }

        if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
            return Some(Self { date, style: DateStyle::Iso });
        }
        if let Ok(date) = NaiveDate::parse_from_str(input, "%d-%m-%Y") {
            return Some(Self { date, style: DateStyle::Dash });
        }
        if let Ok(date) = NaiveDate::parse_from_str(input, "%d/%m/%Y") {
            let padded = input.split('/').all(|part| part.len() >= 2);
            let style = if padded { DateStyle::SlashPadded } else { DateStyle::Slash };
            return Some(Self { date, style });
        }

        None
    }

    /// `None` when the result falls outside the representable calendar.
    pub fn plus_weeks(self, weeks: u32) -> Option<Self> {
        let offset = Duration::try_weeks(i64::from(weeks))?;
        let date = self.date.checked_add_signed(offset)?;
        Some(Self { date, style: self.style })
    }

    pub fn render(&self) -> String {
        match self.style {
            DateStyle::Ordinal => {
                let day = self.date.day();
                format!("{day}{} {}", ordinal_suffix(day), self.date.format("%B %Y"))
            }
            DateStyle::DayMonthName => self.date.format("%-d %B %Y").to_string(),
            DateStyle::SlashPadded => self.date.format("%d/%m/%Y").to_string(),
            DateStyle::Slash => self.date.format("%-d/%-m/%Y").to_string(),
            DateStyle::Dash => self.date.format("%d-%m-%Y").to_string(),
            DateStyle::Iso => self.date.format("%Y-%m-%d").to_string(),
        }
    }
}

fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

/// Number of weeks in a duration label such as `4 Weeks` or `12`.
pub fn parse_duration_weeks(duration: &str) -> Option<u32> {
    DURATION_WEEKS.captures(duration).and_then(|captures| captures[1].parse().ok())
}

/// End date for `start + duration`, rendered in the start date's style.
pub fn end_date(start: &str, duration: &str) -> String {
    match (CampaignDate::parse(start), parse_duration_weeks(duration)) {
        (Some(start), Some(weeks)) => match start.plus_weeks(weeks) {
            Some(end) => end.render(),
            None => END_DATE_PLACEHOLDER.to_string(),
        },
        _ => END_DATE_PLACEHOLDER.to_string(),
    }
}

/// `HHMM` + day + month + two-digit year in local time: always 10 characters.
pub fn timestamp_code(now: DateTime<Utc>) -> String {
    match FixedOffset::east_opt(LOCAL_OFFSET_SECS) {
        Some(offset) => now.with_timezone(&offset).format("%H%M%d%m%y").to_string(),
        None => now.format("%H%M%d%m%y").to_string(),
    }
}

pub fn client_prefix(client_name: Option<&str>) -> String {
    let cleaned: String = client_name
        .unwrap_or_default()
        .trim()
        .chars()
        .filter(|ch| !matches!(ch, '/' | '\\'))
        .map(|ch| if ch.is_whitespace() { '_' } else { ch })
        .collect();
    if cleaned.is_empty() {
        "Client".to_string()
    } else {
        cleaned
    }
}

pub fn proposal_filename(client_name: Option<&str>, now: DateTime<Utc>, extension: &str) -> String {
    format!("{}_{}.{extension}", client_prefix(client_name), timestamp_code(now))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{
        client_prefix, end_date, parse_duration_weeks, proposal_filename, timestamp_code,
        CampaignDate, DateStyle, END_DATE_PLACEHOLDER,
    };

    #[test]
    fn ordinal_dates_keep_their_style() {
        assert_eq!(end_date("1st December 2025", "4 Weeks"), "29th December 2025");
        assert_eq!(end_date("22nd December 2025", "1 week"), "29th December 2025");
        assert_eq!(end_date("3rd March 2025", "3 Weeks"), "24th March 2025");
        assert_eq!(end_date("1st January 2026", "0"), "1st January 2026");
    }

    #[test]
    fn numeric_and_plain_styles_round_trip() {
        assert_eq!(end_date("1 December 2025", "2 Weeks"), "15 December 2025");
        assert_eq!(end_date("01/12/2025", "4 Weeks"), "29/12/2025");
        assert_eq!(end_date("1/12/2025", "5 Weeks"), "5/1/2026");
        assert_eq!(end_date("01-12-2025", "1 Week"), "08-12-2025");
        assert_eq!(end_date("2025-12-01", "2"), "2025-12-15");
    }

    #[test]
    fn ordinal_suffixes_cover_teens() {
        let date = CampaignDate::parse("1st November 2025").and_then(|date| date.plus_weeks(1));
        assert_eq!(date.map(|date| date.render()).as_deref(), Some("8th November 2025"));
        let date = CampaignDate::parse("4th November 2025").and_then(|date| date.plus_weeks(1));
        assert_eq!(date.map(|date| date.render()).as_deref(), Some("11th November 2025"));
        let date = CampaignDate::parse("14th November 2025").and_then(|date| date.plus_weeks(1));
        assert_eq!(date.map(|date| date.render()).as_deref(), Some("21st November 2025"));
    }

    #[test]
    fn unparseable_input_falls_back_to_placeholder() {
        assert_eq!(end_date("next Monday", "4 Weeks"), END_DATE_PLACEHOLDER);
        assert_eq!(end_date("1st December 2025", "a month"), END_DATE_PLACEHOLDER);
        assert_eq!(end_date("", "4 Weeks"), END_DATE_PLACEHOLDER);
        assert_eq!(end_date("1st December 2025", "20000000 Weeks"), END_DATE_PLACEHOLDER);
        assert_eq!(end_date("2025-12-01", "4294967295 Weeks"), END_DATE_PLACEHOLDER);
    }

    #[test]
    fn style_detection() {
        let parsed = CampaignDate::parse("1/12/2025").map(|date| date.style);
        assert_eq!(parsed, Some(DateStyle::Slash));
        let parsed = CampaignDate::parse("01/12/2025").map(|date| date.style);
        assert_eq!(parsed, Some(DateStyle::SlashPadded));
        assert_eq!(parse_duration_weeks("12 wks"), Some(12));
        assert_eq!(parse_duration_weeks("weeks"), None);
    }

    #[test]
    fn filename_uses_fixed_utc_plus_four_offset() {
        let now = Utc.with_ymd_and_hms(2025, 12, 1, 21, 5, 0).single().expect("valid instant");
        assert_eq!(timestamp_code(now), "0105021225");
        assert_eq!(proposal_filename(None, now, "pdf"), "Client_0105021225.pdf");
        assert_eq!(
            proposal_filename(Some("Emaar Properties"), now, "pdf"),
            "Emaar_Properties_0105021225.pdf"
        );
        assert_eq!(client_prefix(Some("   ")), "Client");
    }
}
