// src/protocol/pattern.rs
//! Declarative field layouts and the cursor used to read a matched frame
//!
//! A [`Template`] is an ordered list of [`Segment`]s in wire order. It compiles
//! once into a [`Matcher`]; a successful match hands out a [`MatchCursor`] that
//! yields captured fields strictly left to right.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regex::Regex;

/// Repetition count of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Exact(usize),
    Between(usize, usize),
    AtLeast(usize),
}

impl Width {
    fn quantifier(self) -> String {
        match self {
            Width::Exact(n) => format!("{{{}}}", n),
            Width::Between(min, max) => format!("{{{},{}}}", min, max),
            Width::AtLeast(0) => "*".to_string(),
            Width::AtLeast(1) => "+".to_string(),
            Width::AtLeast(n) => format!("{{{},}}", n),
        }
    }
}

/// The shape of a single run of characters on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Run {
    /// ASCII decimal digits
    Digits(Width),
    /// Decimal digits with an optional leading minus
    Signed(Width),
    /// Hexadecimal digits, either case
    Hex(Width),
    /// Upper-case letters and digits
    Alnum(Width),
    /// A single `0` or `1`
    Flag,
    /// Characters from a bracket expression body such as `0-9F`
    Charset(&'static str, Width),
    /// Fixed-point number, `-?d{int}.d{frac}`
    Decimal { signed: bool, int: Width, frac: Width },
    /// Loose float, `d+.?d*`
    Float,
    /// Anything up to the next comma
    FreeText(Width),
    /// Any characters, commas included
    Any(Width),
    Literal(&'static str),
    Either(Vec<Run>),
    Seq(Vec<Run>),
}

impl Run {
    fn to_regex(&self) -> String {
        match self {
            Run::Digits(w) => format!("[0-9]{}", w.quantifier()),
            Run::Signed(w) => format!("-?[0-9]{}", w.quantifier()),
            Run::Hex(w) => format!("[0-9a-fA-F]{}", w.quantifier()),
            Run::Alnum(w) => format!("[0-9A-Z]{}", w.quantifier()),
            Run::Flag => "[01]".to_string(),
            Run::Charset(set, w) => format!("[{}]{}", set, w.quantifier()),
            Run::Decimal { signed, int, frac } => format!(
                "{}[0-9]{}\\.[0-9]{}",
                if *signed { "-?" } else { "" },
                int.quantifier(),
                frac.quantifier()
            ),
            Run::Float => "[0-9]+\\.?[0-9]*".to_string(),
            Run::FreeText(w) => format!("[^,]{}", w.quantifier()),
            Run::Any(w) => format!(".{}", w.quantifier()),
            Run::Literal(text) => regex::escape(text),
            Run::Either(runs) => {
                let alternatives: Vec<String> = runs.iter().map(Run::to_regex).collect();
                format!("(?:{})", alternatives.join("|"))
            }
            Run::Seq(runs) => runs.iter().map(Run::to_regex).collect(),
        }
    }
}

/// One element of a layout template.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(&'static str),
    /// A run that must be present but is not captured
    Skip(Run),
    /// A captured run
    Field(Run),
    /// A captured run that may be missing entirely
    Maybe(Run),
    /// A run that may be missing and is not captured
    MaybeSkip(Run),
    /// A block that is either entirely present or entirely absent
    Optional(Vec<Segment>),
}

impl Segment {
    fn to_regex(&self) -> String {
        match self {
            Segment::Text(text) => regex::escape(text),
            Segment::Skip(run) => run.to_regex(),
            Segment::Field(run) => format!("({})", run.to_regex()),
            Segment::Maybe(run) => format!("({})?", run.to_regex()),
            Segment::MaybeSkip(run) => format!("(?:{})?", run.to_regex()),
            Segment::Optional(block) => {
                let inner: String = block.iter().map(Segment::to_regex).collect();
                format!("(?:{})?", inner)
            }
        }
    }

    fn group_count(&self) -> usize {
        match self {
            Segment::Field(_) | Segment::Maybe(_) => 1,
            Segment::Optional(block) => block.iter().map(Segment::group_count).sum(),
            _ => 0,
        }
    }
}

/// Builder for a layout, segments appended in wire order.
#[derive(Debug, Clone, Default)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: &'static str) -> Self {
        self.segments.push(Segment::Text(text));
        self
    }

    pub fn skip(mut self, run: Run) -> Self {
        self.segments.push(Segment::Skip(run));
        self
    }

    pub fn field(mut self, run: Run) -> Self {
        self.segments.push(Segment::Field(run));
        self
    }

    pub fn maybe(mut self, run: Run) -> Self {
        self.segments.push(Segment::Maybe(run));
        self
    }

    pub fn maybe_skip(mut self, run: Run) -> Self {
        self.segments.push(Segment::MaybeSkip(run));
        self
    }

    /// Six captured groups: `yyyy MM dd HH mm ss` with no separators.
    pub fn date_time(self) -> Self {
        self.field(Run::Digits(Width::Exact(4)))
            .field(Run::Digits(Width::Exact(2)))
            .field(Run::Digits(Width::Exact(2)))
            .field(Run::Digits(Width::Exact(2)))
            .field(Run::Digits(Width::Exact(2)))
            .field(Run::Digits(Width::Exact(2)))
    }

    pub fn optional(mut self, block: Template) -> Self {
        self.segments.push(Segment::Optional(block.segments));
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn compile(self) -> Result<Matcher, regex::Error> {
        let regex = Regex::new(&render(&self.segments))?;
        let groups = self.segments.iter().map(Segment::group_count).sum();
        Ok(Matcher {
            regex,
            groups,
            segments: self.segments,
        })
    }
}

fn render(segments: &[Segment]) -> String {
    segments.iter().map(Segment::to_regex).collect()
}

/// A compiled, immutable layout.
#[derive(Debug)]
pub struct Matcher {
    regex: Regex,
    groups: usize,
    segments: Vec<Segment>,
}

impl Matcher {
    /// Number of captured groups a match exposes
    pub fn group_count(&self) -> usize {
        self.groups
    }

    /// Match the layout anywhere in the sentence.
    pub fn matches<'s>(&self, sentence: &'s str) -> Option<MatchCursor<'s>> {
        let captures = self.regex.captures(sentence)?;
        let groups = (1..=self.groups)
            .map(|i| captures.get(i).map(|m| m.as_str()))
            .collect();
        Some(MatchCursor::new(groups))
    }

    /// How many leading segments of the layout match the start of the sentence.
    ///
    /// Only meant for diagnostics on a failed match; every prefix is compiled
    /// on demand.
    pub fn matched_prefix(&self, sentence: &str) -> usize {
        (0..=self.segments.len())
            .rev()
            .find(|&len| {
                Regex::new(&format!("^(?:{})", render(&self.segments[..len])))
                    .map(|prefix| prefix.is_match(sentence))
                    .unwrap_or(false)
            })
            .unwrap_or(0)
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

/// Forward-only reader over the groups of one successful match.
#[derive(Debug, Clone)]
pub struct MatchCursor<'s> {
    groups: Vec<Option<&'s str>>,
    position: usize,
}

impl<'s> MatchCursor<'s> {
    fn new(groups: Vec<Option<&'s str>>) -> Self {
        Self { groups, position: 0 }
    }

    /// Groups not yet consumed, present or not
    pub fn remaining(&self) -> usize {
        self.groups.len().saturating_sub(self.position)
    }

    /// Check that the next `count` groups all carry a value.
    ///
    /// If any of them is absent the whole block is skipped, so the read that
    /// follows lands on the first group after the block.
    pub fn has_next(&mut self, count: usize) -> bool {
        let end = self.position + count;
        let present = end <= self.groups.len()
            && self.groups[self.position..end]
                .iter()
                .all(|group| group.is_some_and(|value| !value.is_empty()));
        if !present {
            self.position = end.min(self.groups.len());
        }
        present
    }

    /// Next group as text; empty captures are absent.
    pub fn next(&mut self) -> Option<&'s str> {
        let value = self.groups.get(self.position).copied().flatten();
        self.position = (self.position + 1).min(self.groups.len());
        value.filter(|value| !value.is_empty())
    }

    pub fn next_i64(&mut self) -> Option<i64> {
        self.next_i64_radix(10)
    }

    pub fn next_i64_radix(&mut self, radix: u32) -> Option<i64> {
        self.next().and_then(|value| i64::from_str_radix(value, radix).ok())
    }

    /// Next group as a float. `NaN`, `Inf` and friends read as absent.
    pub fn next_f64(&mut self) -> Option<f64> {
        self.next()
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|value| value.is_finite())
    }

    pub fn next_bool(&mut self) -> Option<bool> {
        match self.next()? {
            "1" => Some(true),
            "0" => Some(false),
            _ => None,
        }
    }

    /// Consume six groups as a UTC date and time.
    pub fn next_date_time(&mut self) -> Option<DateTime<Utc>> {
        let year = self.next_i64();
        let month = self.next_i64();
        let day = self.next_i64();
        let hour = self.next_i64();
        let minute = self.next_i64();
        let second = self.next_i64();

        let date = NaiveDate::from_ymd_opt(
            i32::try_from(year?).ok()?,
            u32::try_from(month?).ok()?,
            u32::try_from(day?).ok()?,
        )?;
        let naive = date.and_hms_opt(
            u32::try_from(hour?).ok()?,
            u32::try_from(minute?).ok()?,
            u32::try_from(second?).ok()?,
        )?;
        Some(Utc.from_utc_datetime(&naive))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_layout() -> Matcher {
        Template::new()
            .text("+ACK:")
            .field(Run::Alnum(Width::Exact(3)))
            .text(",")
            .maybe(Run::Digits(Width::Between(1, 3)))
            .text(",")
            .field(Run::Hex(Width::Exact(4)))
            .optional(Template::new().text("$"))
            .compile()
            .unwrap()
    }

    #[test]
    fn test_render_escapes_literals() {
        let template = Template::new().text("+RESP:").skip(Run::Flag);
        assert_eq!(render(template.segments()), "\\+RESP:[01]");
    }

    #[test]
    fn test_decimal_run_regex() {
        let run = Run::Decimal {
            signed: true,
            int: Width::Between(1, 3),
            frac: Width::Exact(6),
        };
        assert_eq!(run.to_regex(), "-?[0-9]{1,3}\\.[0-9]{6}");
    }

    #[test]
    fn test_optional_terminator() {
        let matcher = counter_layout();
        assert_eq!(matcher.group_count(), 3);

        let mut cursor = matcher.matches("+ACK:HBD,12,00FF$").unwrap();
        assert_eq!(cursor.next(), Some("HBD"));
        assert_eq!(cursor.next_i64(), Some(12));
        assert_eq!(cursor.next_i64_radix(16), Some(255));
        assert_eq!(cursor.remaining(), 0);

        assert!(matcher.matches("+ACK:HBD,12,00FF").is_some());
        assert!(matcher.matches("+ACK:HBD,12,00F").is_none());
    }

    #[test]
    fn test_absent_group_reads_none() {
        let matcher = counter_layout();
        let mut cursor = matcher.matches("+ACK:HBD,,00FF$").unwrap();
        assert_eq!(cursor.next(), Some("HBD"));
        assert_eq!(cursor.next_i64(), None);
        assert_eq!(cursor.next(), Some("00FF"));
        // Reading past the end never panics.
        assert_eq!(cursor.next(), None);
    }

    #[test]
    fn test_has_next_skips_missing_block() {
        let matcher = Template::new()
            .field(Run::Digits(Width::Exact(2)))
            .text(",")
            .optional(Template::new().date_time())
            .text(",")
            .field(Run::Hex(Width::Exact(4)))
            .compile()
            .unwrap();

        let mut cursor = matcher.matches("07,,ABCD").unwrap();
        assert_eq!(cursor.next(), Some("07"));
        assert!(!cursor.has_next(6));
        assert_eq!(cursor.next(), Some("ABCD"));

        let mut cursor = matcher.matches("07,20160111090021,ABCD").unwrap();
        assert_eq!(cursor.next(), Some("07"));
        assert!(cursor.has_next(6));
        let time = cursor.next_date_time().unwrap();
        assert_eq!(time.to_rfc3339(), "2016-01-11T09:00:21+00:00");
        assert_eq!(cursor.next(), Some("ABCD"));
    }

    #[test]
    fn test_non_finite_floats_are_absent() {
        let matcher = Template::new()
            .field(Run::Either(vec![
                Run::Float,
                Run::Literal("Inf"),
                Run::Literal("NaN"),
            ]))
            .compile()
            .unwrap();

        assert_eq!(matcher.matches("NaN").unwrap().next_f64(), None);
        assert_eq!(matcher.matches("Inf").unwrap().next_f64(), None);
        assert_eq!(matcher.matches("12.5").unwrap().next_f64(), Some(12.5));
    }

    #[test]
    fn test_invalid_date_is_absent() {
        let matcher = Template::new().date_time().compile().unwrap();
        let mut cursor = matcher.matches("20161341090021").unwrap();
        assert_eq!(cursor.next_date_time(), None);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn test_matched_prefix() {
        let matcher = counter_layout();
        assert_eq!(matcher.segment_count(), 7);
        assert_eq!(matcher.matched_prefix("+ACK:HBD,1x"), 4);
        assert_eq!(matcher.matched_prefix("+NAK"), 0);
        assert_eq!(matcher.matched_prefix("+ACK:HBD,1,0001$"), 7);
    }
}
