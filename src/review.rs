//! Post-hoc review of generated artifacts.
//!
//! The generation instructions ask for several structural properties that the
//! pipeline never enforces. This module re-checks the ones that can be read off
//! the text and reports violations as findings. It never mutates state and
//! never retries a stage.
use crate::pipeline::{
    target_reference_count, PipelineState, ReferenceBundle, Stage, CITATION_LIST_MARKER,
};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub stage: Stage,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReviewReport {
    /// Stages whose artifacts were FRESH and therefore checked.
    pub checked: Vec<Stage>,
    pub findings: Vec<Finding>,
}

impl ReviewReport {
    pub fn warnings(&self) -> usize {
        self.findings
            .iter()
            .filter(|finding| finding.severity == Severity::Warning)
            .count()
    }

    fn push(&mut self, stage: Stage, severity: Severity, message: String) {
        self.findings.push(Finding {
            stage,
            severity,
            message,
        });
    }
}

pub fn review(state: &PipelineState) -> ReviewReport {
    let mut report = ReviewReport::default();
    if let Some(structure) = state.text(Stage::Structure) {
        report.checked.push(Stage::Structure);
        check_structure(structure, &mut report);
    }
    if let Some(references) = state.text(Stage::CiteBuild) {
        report.checked.push(Stage::CiteBuild);
        let target = state
            .cite_params()
            .map(|params| target_reference_count(params.word_count));
        check_references(references, target, &mut report);
    }
    if let (Some(draft), Some(final_document)) =
        (state.text(Stage::Draft), state.text(Stage::Finalize))
    {
        report.checked.push(Stage::Finalize);
        check_headings(draft, final_document, &mut report);
    }
    report
}

fn outline_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[\s#*>-]*(\d+(?:\.\d+)*)\.?\s+(.*)$").expect("regex for outline lines")
    })
}

fn word_target() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d[\d,]*)\s*words?\b").expect("regex for word targets")
    })
}

/// Numbered outline entries that carry a word target, keyed by number.
fn outline_targets(structure: &str) -> BTreeMap<String, (String, u64)> {
    let mut targets = BTreeMap::new();
    for line in structure.lines() {
        let Some(caps) = outline_line().captures(line) else {
            continue;
        };
        let number = caps[1].to_string();
        let rest = caps[2].trim();
        let Some(words) = word_target()
            .captures(rest)
            .and_then(|caps| caps[1].replace(',', "").parse::<u64>().ok())
        else {
            continue;
        };
        targets.entry(number).or_insert((rest.to_string(), words));
    }
    targets
}

fn check_structure(structure: &str, report: &mut ReviewReport) {
    let targets = outline_targets(structure);
    for (number, (title, parent_words)) in &targets {
        let prefix = format!("{number}.");
        let children: Vec<u64> = targets
            .iter()
            .filter(|(child, _)| {
                child
                    .strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.contains('.'))
            })
            .map(|(_, (_, words))| *words)
            .collect();
        if children.is_empty() {
            continue;
        }
        let sum: u64 = children.iter().sum();
        if sum != *parent_words {
            report.push(
                Stage::Structure,
                Severity::Warning,
                format!(
                    "section {number} ({title}) targets {parent_words} words but its subsections sum to {sum}"
                ),
            );
        }
    }
}

/// Non-empty lines that are not a list heading.
fn entries(list: &str) -> usize {
    list.lines()
        .map(|line| line.trim().trim_start_matches('#').trim().trim_matches('*').trim())
        .filter(|line| !line.is_empty())
        .filter(|line| {
            !line.eq_ignore_ascii_case("reference list")
                && !line.eq_ignore_ascii_case(CITATION_LIST_MARKER)
                && !line.eq_ignore_ascii_case("references")
        })
        .count()
}

fn check_references(raw: &str, target: Option<u64>, report: &mut ReviewReport) {
    let bundle = ReferenceBundle::split(raw);
    let references = entries(&bundle.reference_list);
    if bundle.citation_list.is_empty() {
        report.push(
            Stage::CiteBuild,
            Severity::Warning,
            format!("no \"{CITATION_LIST_MARKER}\" heading; Finalize will get an empty citation list"),
        );
    } else {
        let citations = entries(&bundle.citation_list);
        if citations != references {
            report.push(
                Stage::CiteBuild,
                Severity::Warning,
                format!("{references} references but {citations} citations"),
            );
        }
    }
    if let Some(target) = target {
        if references as u64 != target {
            report.push(
                Stage::CiteBuild,
                Severity::Info,
                format!("{references} references against a target of {target}"),
            );
        }
    }
}

fn headings(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|line| line.starts_with('#'))
        .collect()
}

fn check_headings(draft: &str, final_document: &str, report: &mut ReviewReport) {
    let final_lines: Vec<&str> = final_document.lines().map(str::trim).collect();
    let mut cursor = 0;
    for heading in headings(draft) {
        match final_lines[cursor..].iter().position(|line| *line == heading) {
            Some(offset) => cursor += offset + 1,
            None => {
                let message = if final_lines.contains(&heading) {
                    format!("heading {heading:?} is out of order in the final document")
                } else {
                    format!("heading {heading:?} is missing from the final document")
                };
                report.push(Stage::Finalize, Severity::Warning, message);
            }
        }
    }
}
