//! Build instruments (timing.json, analysis.json)
//!
//! Both instruments are [`BuildObserver`]s. They only read what the pipeline
//! hands them, so a build with instruments produces the same outputs as one
//! without.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::{BuildObserver, OutputEntry, OutputKind};
use crate::asset::AssetMode;

/// Schema identifier for timing.json
pub const TIMING_SCHEMA_ID: &str = "packcfg/timing@1";

/// Schema identifier for analysis.json
pub const ANALYSIS_SCHEMA_ID: &str = "packcfg/analysis@1";

/// Entries listed under "largest" in the human analysis output
const LARGEST_SHOWN: usize = 10;

/// One instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instrument {
    MeasureTiming,
    AnalyzeOutput,
}

impl FromStr for Instrument {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timing" | "measure-timing" => Ok(Instrument::MeasureTiming),
            "analyze" | "analysis" | "analyze-output" => Ok(Instrument::AnalyzeOutput),
            other => Err(format!(
                "unknown instrument '{}' (expected timing or analyze)",
                other
            )),
        }
    }
}

/// Which instruments are active (`instrument` config section)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentSet {
    #[serde(default)]
    pub measure_timing: bool,

    #[serde(default)]
    pub analyze_output: bool,
}

impl InstrumentSet {
    pub fn all() -> Self {
        Self {
            measure_timing: true,
            analyze_output: true,
        }
    }

    pub fn with(mut self, instrument: Instrument) -> Self {
        match instrument {
            Instrument::MeasureTiming => self.measure_timing = true,
            Instrument::AnalyzeOutput => self.analyze_output = true,
        }
        self
    }

    /// Union of two sets.
    pub fn union(self, other: Self) -> Self {
        Self {
            measure_timing: self.measure_timing || other.measure_timing,
            analyze_output: self.analyze_output || other.analyze_output,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.measure_timing && !self.analyze_output
    }
}

/// Timing of one handler chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTiming {
    pub invocations: u64,
    pub total_micros: u64,
    pub max_micros: u64,
}

/// Collects per-chain durations.
#[derive(Debug, Default)]
pub struct SpeedMeasure {
    chains: BTreeMap<String, ChainTiming>,
}

impl SpeedMeasure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, chain: &str, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        let timing = self.chains.entry(chain.to_string()).or_default();
        timing.invocations += 1;
        timing.total_micros = timing.total_micros.saturating_add(micros);
        timing.max_micros = timing.max_micros.max(micros);
    }

    pub fn finish(self) -> TimingReport {
        let total_micros = self
            .chains
            .values()
            .fold(0u64, |acc, t| acc.saturating_add(t.total_micros));
        TimingReport {
            schema_id: TIMING_SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            total_micros,
            chains: self.chains,
        }
    }
}

impl BuildObserver for SpeedMeasure {
    fn timing_enabled(&self) -> bool {
        true
    }

    fn chain_finished(&mut self, chain: &str, elapsed: Duration) {
        self.record(chain, elapsed);
    }
}

/// Per-chain timing report (timing.json)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingReport {
    pub schema_id: String,
    pub created_at: DateTime<Utc>,
    pub total_micros: u64,
    pub chains: BTreeMap<String, ChainTiming>,
}

impl TimingReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Chains sorted by total time, slowest first.
    pub fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Handler chain timing ({:.1} ms total)",
            millis(self.total_micros)
        )];

        let mut chains: Vec<_> = self.chains.iter().collect();
        chains.sort_by(|a, b| b.1.total_micros.cmp(&a.1.total_micros).then(a.0.cmp(b.0)));
        for (name, t) in chains {
            lines.push(format!(
                "  {:<24} {:>6} file(s) {:>10.1} ms  (max {:.1} ms)",
                name,
                t.invocations,
                millis(t.total_micros),
                millis(t.max_micros)
            ));
        }
        lines.join("\n")
    }
}

fn millis(micros: u64) -> f64 {
    micros as f64 / 1000.0
}

/// How a file ended up in the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputClass {
    Transformed,
    Inline,
    Emitted,
}

impl fmt::Display for OutputClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputClass::Transformed => "transformed",
            OutputClass::Inline => "inline",
            OutputClass::Emitted => "emitted",
        })
    }
}

/// One analyzed output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetStat {
    pub chain: String,
    pub class: OutputClass,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

/// Count and bytes per output class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassTotals {
    pub count: u64,
    pub bytes: u64,
}

impl ClassTotals {
    fn add(&mut self, bytes: u64) {
        self.count += 1;
        self.bytes = self.bytes.saturating_add(bytes);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisTotals {
    pub transformed: ClassTotals,
    pub inline: ClassTotals,
    pub emitted: ClassTotals,
}

/// Collects output sizes and classifications.
#[derive(Debug, Default)]
pub struct OutputAnalyzer {
    entries: BTreeMap<String, AssetStat>,
}

impl OutputAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, source: &str, entry: &OutputEntry) {
        let stat = match &entry.output {
            OutputKind::Transformed { size_bytes, .. } => AssetStat {
                chain: entry.chain.clone(),
                class: OutputClass::Transformed,
                size_bytes: *size_bytes,
                output_path: None,
            },
            OutputKind::Asset(decision) => AssetStat {
                chain: entry.chain.clone(),
                class: match decision.mode {
                    AssetMode::Inline => OutputClass::Inline,
                    AssetMode::Emitted => OutputClass::Emitted,
                },
                size_bytes: decision.size_bytes,
                output_path: decision.output_path.clone(),
            },
        };
        self.entries.insert(source.to_string(), stat);
    }

    pub fn finish(self) -> AnalysisReport {
        let mut totals = AnalysisTotals::default();
        for stat in self.entries.values() {
            match stat.class {
                OutputClass::Transformed => totals.transformed.add(stat.size_bytes),
                OutputClass::Inline => totals.inline.add(stat.size_bytes),
                OutputClass::Emitted => totals.emitted.add(stat.size_bytes),
            }
        }
        AnalysisReport {
            schema_id: ANALYSIS_SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            totals,
            entries: self.entries,
        }
    }
}

impl BuildObserver for OutputAnalyzer {
    fn output_recorded(&mut self, source: &str, entry: &OutputEntry) {
        self.record(source, entry);
    }
}

/// Output size report (analysis.json)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub schema_id: String,
    pub created_at: DateTime<Utc>,
    pub totals: AnalysisTotals,
    pub entries: BTreeMap<String, AssetStat>,
}

impl AnalysisReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_human(&self) -> String {
        let t = &self.totals;
        let mut lines = vec![
            "Output analysis".to_string(),
            format!("  transformed: {} file(s), {} bytes", t.transformed.count, t.transformed.bytes),
            format!("  inline:      {} file(s), {} bytes", t.inline.count, t.inline.bytes),
            format!("  emitted:     {} file(s), {} bytes", t.emitted.count, t.emitted.bytes),
        ];

        let mut largest: Vec<_> = self.entries.iter().collect();
        largest.sort_by(|a, b| b.1.size_bytes.cmp(&a.1.size_bytes).then(a.0.cmp(b.0)));
        if !largest.is_empty() {
            lines.push(String::new());
            lines.push("Largest:".to_string());
        }
        for (source, stat) in largest.into_iter().take(LARGEST_SHOWN) {
            lines.push(format!(
                "  {:>10}  {:<11} {}{}",
                stat.size_bytes,
                stat.class,
                source,
                stat.output_path
                    .as_deref()
                    .map(|p| format!(" -> {}", p))
                    .unwrap_or_default()
            ));
        }
        lines.join("\n")
    }
}

/// The active instruments of one build.
#[derive(Debug, Default)]
pub struct Instruments {
    timing: Option<SpeedMeasure>,
    analysis: Option<OutputAnalyzer>,
}

impl Instruments {
    pub fn new(set: InstrumentSet) -> Self {
        Self {
            timing: set.measure_timing.then(SpeedMeasure::new),
            analysis: set.analyze_output.then(OutputAnalyzer::new),
        }
    }

    pub fn finish(self) -> (Option<TimingReport>, Option<AnalysisReport>) {
        (
            self.timing.map(SpeedMeasure::finish),
            self.analysis.map(OutputAnalyzer::finish),
        )
    }
}

impl BuildObserver for Instruments {
    fn timing_enabled(&self) -> bool {
        self.timing.is_some()
    }

    fn chain_finished(&mut self, chain: &str, elapsed: Duration) {
        if let Some(timing) = &mut self.timing {
            timing.record(chain, elapsed);
        }
    }

    fn output_recorded(&mut self, source: &str, entry: &OutputEntry) {
        if let Some(analysis) = &mut self.analysis {
            analysis.record(source, entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetClassifier;

    fn transformed(chain: &str, size: u64) -> OutputEntry {
        OutputEntry {
            rule: 0,
            chain: chain.to_string(),
            output: OutputKind::Transformed {
                size_bytes: size,
                content_hash: "00".into(),
            },
        }
    }

    #[test]
    fn test_instrument_set_parse_and_union() {
        let set = InstrumentSet::default().with("timing".parse().unwrap());
        assert!(set.measure_timing && !set.analyze_output);
        assert_eq!(set.union(InstrumentSet::all()), InstrumentSet::all());
        assert!(InstrumentSet::default().is_empty());
        assert!("flamegraph".parse::<Instrument>().is_err());
    }

    #[test]
    fn test_speed_measure_aggregates() {
        let mut m = SpeedMeasure::new();
        m.record("scripts", Duration::from_micros(300));
        m.record("scripts", Duration::from_micros(500));
        m.record("styles", Duration::from_millis(2));

        let report = m.finish();
        assert_eq!(report.schema_id, TIMING_SCHEMA_ID);
        assert_eq!(report.total_micros, 2800);
        assert_eq!(
            report.chains["scripts"],
            ChainTiming {
                invocations: 2,
                total_micros: 800,
                max_micros: 500
            }
        );

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["total_micros"], 2800);
        assert_eq!(json["chains"]["scripts"]["max_micros"], 500);

        let human = report.to_human();
        let styles_at = human.find("styles").unwrap();
        let scripts_at = human.find("scripts").unwrap();
        assert!(styles_at < scripts_at);
    }

    #[test]
    fn test_analyzer_totals() {
        let images = AssetClassifier::new(10, "img/{hash}{ext}").unwrap();
        let mut a = OutputAnalyzer::new();
        a.record("a.js", &transformed("scripts", 100));
        a.record(
            "small.png",
            &OutputEntry {
                rule: 2,
                chain: "images".into(),
                output: OutputKind::Asset(images.classify("small.png", b"abc")),
            },
        );
        a.record(
            "big.png",
            &OutputEntry {
                rule: 2,
                chain: "images".into(),
                output: OutputKind::Asset(images.classify("big.png", &[0u8; 64])),
            },
        );

        let report = a.finish();
        assert_eq!(report.totals.transformed, ClassTotals { count: 1, bytes: 100 });
        assert_eq!(report.totals.inline, ClassTotals { count: 1, bytes: 3 });
        assert_eq!(report.totals.emitted, ClassTotals { count: 1, bytes: 64 });
        assert_eq!(report.entries["big.png"].class, OutputClass::Emitted);

        let human = report.to_human();
        assert!(human.contains("Largest:"));
        assert!(human.contains("big.png -> img/"));
        assert!(report.to_json().unwrap().contains("\"class\": \"inline\""));
    }

    #[test]
    fn test_disabled_timing_reports_nothing() {
        let mut i = Instruments::new(InstrumentSet {
            measure_timing: false,
            analyze_output: true,
        });
        assert!(!i.timing_enabled());
        i.chain_finished("scripts", Duration::from_millis(1));
        i.output_recorded("a.js", &transformed("scripts", 1));

        let (timing, analysis) = i.finish();
        assert!(timing.is_none());
        assert_eq!(analysis.unwrap().entries.len(), 1);
    }
}
