use crate::ai::TokenUsage;
use crate::extract::model::CriterionRow;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    Unknown,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "pass",
            Verdict::Fail => "fail",
            Verdict::Unknown => "unknown",
        }
    }

    /// Lenient reading of a model-produced verdict; anything unrecognised is `Unknown`.
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        match s.as_str() {
            "pass" | "passed" | "met" | "yes" | "eligible" | "qualified" | "compliant" => {
                Verdict::Pass
            }
            "fail" | "failed" | "not met" | "no" | "not eligible" | "disqualified"
            | "non compliant" | "not compliant" => Verdict::Fail,
            _ => Verdict::Unknown,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict on one criterion, with the criterion text copied from the job's criteria list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckLine {
    pub sl_no: String,
    pub criteria: String,
    pub supporting_document: String,
    pub result: Verdict,
    pub reason: String,
    pub evidence: String,
    pub missing_documents: String,
}

#[derive(Clone, Debug)]
pub struct EvaluationOutcome {
    pub overall_result: Verdict,
    pub lines: Vec<CheckLine>,
    pub usage: TokenUsage,
    pub model: String,
    pub duration_ms: u64,
    pub calls: u64,
    pub parsed: bool,
}

/// Criterion serial as compared between the criteria list and model replies: `"2."`, `"(2)"`
/// and `" 2 "` all read as `"2"`.
pub fn serial_key(sl_no: &str) -> String {
    sl_no
        .trim()
        .trim_end_matches(['.', ')'])
        .trim_start_matches('(')
        .to_ascii_lowercase()
}

/// Overall verdict implied by per-criterion results.
///
/// Only lines naming one of `criteria` count. Any such fail fails; pass needs a `pass` line for
/// every criterion serial.
pub fn derive_overall(lines: &[CheckLine], criteria: &[CriterionRow]) -> Verdict {
    let serials: HashSet<String> = criteria.iter().map(|c| serial_key(&c.sl_no)).collect();
    let mut passed = HashSet::new();
    for line in lines {
        let key = serial_key(&line.sl_no);
        if !serials.contains(&key) {
            continue;
        }
        match line.result {
            Verdict::Fail => return Verdict::Fail,
            Verdict::Pass => {
                passed.insert(key);
            }
            Verdict::Unknown => {}
        }
    }
    if !serials.is_empty() && passed.len() == serials.len() {
        Verdict::Pass
    } else {
        Verdict::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(sl_no: &str, result: Verdict) -> CheckLine {
        CheckLine {
            sl_no: sl_no.to_string(),
            criteria: String::new(),
            supporting_document: String::new(),
            result,
            reason: String::new(),
            evidence: String::new(),
            missing_documents: String::new(),
        }
    }

    fn criteria(serials: &[&str]) -> Vec<CriterionRow> {
        serials
            .iter()
            .map(|s| CriterionRow {
                sl_no: s.to_string(),
                criteria: format!("criterion {s}"),
                supporting_document: String::new(),
            })
            .collect()
    }

    #[test]
    fn test_verdict_parse() {
        assert_eq!(Verdict::parse("PASS"), Verdict::Pass);
        assert_eq!(Verdict::parse("Not-Met"), Verdict::Fail);
        assert_eq!(Verdict::parse("partially"), Verdict::Unknown);
        assert_eq!(Verdict::parse(""), Verdict::Unknown);
    }

    #[test]
    fn test_serial_key() {
        assert_eq!(serial_key(" 2. "), "2");
        assert_eq!(serial_key("(3)"), "3");
        assert_eq!(serial_key("A)"), "a");
    }

    #[test]
    fn test_derive_overall() {
        let two = criteria(&["1", "2."]);
        let pass = Verdict::Pass;
        assert_eq!(derive_overall(&[line("1", pass), line("2", pass)], &two), Verdict::Pass);
        assert_eq!(derive_overall(&[line("1", pass)], &two), Verdict::Unknown);
        assert_eq!(derive_overall(&[line("1", pass), line("2", Verdict::Fail)], &two), Verdict::Fail);
        assert_eq!(derive_overall(&[], &[]), Verdict::Unknown);
    }

    #[test]
    fn test_derive_overall_needs_a_pass_per_criterion() {
        let two = criteria(&["1", "2"]);
        let lines = [
            line("1", Verdict::Pass),
            line("1", Verdict::Pass),
            line("7", Verdict::Pass),
        ];
        assert_eq!(derive_overall(&lines, &two), Verdict::Unknown);
        // unlisted serials are ignored
        assert_eq!(
            derive_overall(&[line("1", Verdict::Pass), line("9", Verdict::Fail)], &two),
            Verdict::Unknown
        );
    }
}
