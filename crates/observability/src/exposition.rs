//! Prometheus text exposition parsing and merging
//!
//! Worker snapshots are plain text expositions. Merging sums samples that
//! share a metric name and label set:
//!
//! - counters: summed
//! - histograms: `_bucket`, `_sum` and `_count` summed per label set
//! - gauges: summed (each queue is owned by exactly one worker, so per-queue
//!   gauges only ever have one contributor)
//! - summaries: quantile samples cannot be combined and are dropped, `_sum`
//!   and `_count` are summed

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use thiserror::Error;

/// Content type of the rendered exposition
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Malformed exposition line
#[derive(Debug, Error, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ExpositionError {
    pub line: usize,
    pub message: String,
}

impl ExpositionError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Metric family type from the `# TYPE` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Untyped,
}

impl MetricKind {
    fn parse(s: &str) -> Self {
        match s {
            "counter" => Self::Counter,
            "gauge" => Self::Gauge,
            "histogram" => Self::Histogram,
            "summary" => Self::Summary,
            _ => Self::Untyped,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
            Self::Summary => "summary",
            Self::Untyped => "untyped",
        }
    }

    fn has_suffixed_samples(&self) -> bool {
        matches!(self, Self::Histogram | Self::Summary)
    }
}

type Labels = Vec<(String, String)>;

#[derive(Debug, Clone)]
struct Sample {
    name: String,
    labels: Labels,
    value: f64,
}

#[derive(Debug, Clone)]
struct Family {
    help: Option<String>,
    kind: MetricKind,
    samples: Vec<Sample>,
    index: HashMap<(String, Labels), usize>,
}

impl Family {
    fn new(kind: MetricKind) -> Self {
        Self {
            help: None,
            kind,
            samples: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn add(&mut self, sample: Sample) {
        let key = (sample.name.clone(), sample.labels.clone());
        match self.index.get(&key) {
            Some(&i) => self.samples[i].value += sample.value,
            None => {
                self.index.insert(key, self.samples.len());
                self.samples.push(sample);
            }
        }
    }
}

/// Parsed, mergeable exposition
#[derive(Debug, Clone, Default)]
pub struct Exposition {
    families: BTreeMap<String, Family>,
}

impl Exposition {
    /// Parse a text exposition.
    pub fn parse(text: &str) -> Result<Self, ExpositionError> {
        let mut exposition = Self::default();

        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(comment) = line.strip_prefix('#') {
                exposition.parse_comment(comment.trim_start());
                continue;
            }

            let sample = parse_sample(line).map_err(|m| ExpositionError::new(line_no, m))?;
            exposition.insert_sample(sample);
        }

        Ok(exposition)
    }

    fn parse_comment(&mut self, comment: &str) {
        let mut parts = comment.splitn(3, ' ');
        let (Some(keyword), Some(name)) = (parts.next(), parts.next()) else {
            return;
        };
        let rest = parts.next().unwrap_or("").trim();
        match keyword {
            "HELP" => {
                self.family_mut(name, MetricKind::Untyped).help = Some(rest.to_string());
            }
            "TYPE" => {
                self.family_mut(name, MetricKind::Untyped).kind = MetricKind::parse(rest);
            }
            _ => {}
        }
    }

    fn family_mut(&mut self, name: &str, kind: MetricKind) -> &mut Family {
        self.families
            .entry(name.to_string())
            .or_insert_with(|| Family::new(kind))
    }

    /// Family a sample belongs to: an exact name match, or the base name of
    /// a histogram/summary sample.
    fn family_name_for(&self, sample_name: &str) -> String {
        if self.families.contains_key(sample_name) {
            return sample_name.to_string();
        }
        for suffix in ["_bucket", "_sum", "_count"] {
            if let Some(base) = sample_name.strip_suffix(suffix) {
                if self
                    .families
                    .get(base)
                    .is_some_and(|f| f.kind.has_suffixed_samples())
                {
                    return base.to_string();
                }
            }
        }
        sample_name.to_string()
    }

    fn insert_sample(&mut self, sample: Sample) {
        let family_name = self.family_name_for(&sample.name);
        let family = self.family_mut(&family_name, MetricKind::Untyped);
        if family.kind == MetricKind::Summary && sample.labels.iter().any(|(k, _)| k == "quantile") {
            return;
        }
        family.add(sample);
    }

    /// Fold another exposition into this one.
    pub fn merge(&mut self, other: Exposition) {
        for (name, theirs) in other.families {
            match self.families.get_mut(&name) {
                Some(ours) => {
                    if ours.help.is_none() {
                        ours.help = theirs.help;
                    }
                    if ours.kind == MetricKind::Untyped {
                        ours.kind = theirs.kind;
                    }
                    for sample in theirs.samples {
                        ours.add(sample);
                    }
                }
                None => {
                    self.families.insert(name, theirs);
                }
            }
        }
    }

    /// Whether no family was parsed or merged
    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Value of one sample, labels in any order.
    pub fn value(&self, sample_name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let family = self.families.get(&self.family_name_for(sample_name))?;
        let mut wanted: Labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        wanted.sort();
        family
            .index
            .get(&(sample_name.to_string(), wanted))
            .map(|&i| family.samples[i].value)
    }

    /// Render as text exposition, families sorted by name.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, family) in &self.families {
            if let Some(help) = &family.help {
                let _ = writeln!(out, "# HELP {name} {help}");
            }
            let _ = writeln!(out, "# TYPE {name} {}", family.kind.as_str());
            for sample in &family.samples {
                out.push_str(&sample.name);
                if !sample.labels.is_empty() {
                    out.push('{');
                    for (i, (key, value)) in sample.labels.iter().enumerate() {
                        if i > 0 {
                            out.push(',');
                        }
                        let _ = write!(out, "{key}=\"{}\"", escape_label_value(value));
                    }
                    out.push('}');
                }
                let _ = writeln!(out, " {}", format_value(sample.value));
            }
            out.push('\n');
        }
        out
    }
}

/// Merge every payload into one rendered exposition.
pub fn merge_all<'a>(payloads: impl IntoIterator<Item = &'a str>) -> Result<String, ExpositionError> {
    let mut merged = Exposition::default();
    for payload in payloads {
        merged.merge(Exposition::parse(payload)?);
    }
    Ok(merged.render())
}

fn parse_sample(line: &str) -> Result<Sample, String> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .ok_or_else(|| "sample has no value".to_string())?;
    let name = &line[..name_end];
    if name.is_empty() {
        return Err("sample has no metric name".into());
    }

    let mut rest = &line[name_end..];
    let mut labels = Vec::new();
    if let Some(after_brace) = rest.strip_prefix('{') {
        let (parsed, remaining) = parse_labels(after_brace)?;
        labels = parsed;
        rest = remaining;
    }

    // Value, optionally followed by a timestamp we do not keep
    let value = rest
        .split_whitespace()
        .next()
        .ok_or_else(|| format!("sample '{name}' has no value"))?;
    let value = parse_value(value).ok_or_else(|| format!("invalid value '{value}'"))?;

    labels.sort();
    Ok(Sample {
        name: name.to_string(),
        labels,
        value,
    })
}

/// Parse `key="value",...}`; returns the labels and the text after `}`.
fn parse_labels(input: &str) -> Result<(Labels, &str), String> {
    let mut labels = Vec::new();
    let mut chars = input.char_indices().peekable();

    loop {
        while let Some(&(_, c)) = chars.peek() {
            if c == ',' || c.is_whitespace() {
                chars.next();
            } else {
                break;
            }
        }

        let (start, c) = chars.next().ok_or("unterminated label set")?;
        if c == '}' {
            return Ok((labels, &input[start + 1..]));
        }

        let mut key = String::from(c);
        loop {
            match chars.next() {
                Some((_, '=')) => break,
                Some((_, c)) if !c.is_whitespace() => key.push(c),
                Some(_) => {}
                None => return Err("unterminated label name".into()),
            }
        }

        match chars.next() {
            Some((_, '"')) => {}
            _ => return Err(format!("label '{key}' value is not quoted")),
        }

        let mut value = String::new();
        loop {
            match chars.next() {
                Some((_, '"')) => break,
                Some((_, '\\')) => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, other)) => value.push(other),
                    None => return Err("unterminated escape".into()),
                },
                Some((_, c)) => value.push(c),
                None => return Err(format!("label '{key}' value is unterminated")),
            }
        }

        labels.push((key, value));
    }
}

fn parse_value(s: &str) -> Option<f64> {
    match s {
        "+Inf" | "Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => s.parse().ok(),
    }
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
