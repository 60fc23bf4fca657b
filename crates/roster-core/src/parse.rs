//! Per-source record parsers.
//!
//! Upstream rosters are uncontrolled free text, so every strategy is a
//! best-effort pattern match. Input that does not match is dropped
//! silently; a strategy never fails, and zero matches is an empty
//! result. A strategy handed an intermediate form it does not read also
//! returns an empty result (the registry rejects such pairings at
//! startup).
//!
//! Casing and whitespace cleanup is left to [`crate::normalize`], except
//! for the grid strategy, which cleans its cells itself because the
//! source renders names in arbitrary case.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{IntermediateData, RawRecord, TablePage};
use crate::normalize::{clean_field, title_case};
use crate::source::ParseStrategy;

impl ParseStrategy {
    /// Run this strategy over extracted data for `county`.
    pub fn parse(&self, county: &str, data: &IntermediateData) -> Vec<RawRecord> {
        let records = match (self, data) {
            (ParseStrategy::LabeledField { label }, IntermediateData::PlainText(text)) => {
                parse_labeled_field(county, label, text)
            }
            (ParseStrategy::GridRows, IntermediateData::TableGrid(pages)) => {
                parse_grid_rows(county, pages)
            }
            (ParseStrategy::CompoundSurname, IntermediateData::PlainText(text)) => {
                parse_compound_surname(county, text)
            }
            (ParseStrategy::DomListing, IntermediateData::DomListing(items)) => {
                parse_dom_listing(county, items)
            }
            (ParseStrategy::UppercasePairs, IntermediateData::PlainText(text)) => {
                parse_uppercase_pairs(county, text)
            }
            _ => {
                tracing::warn!(
                    county,
                    strategy = self.name(),
                    form = %data.form(),
                    "parser received an intermediate form it does not read"
                );
                Vec::new()
            }
        };
        records
            .into_iter()
            .filter(|r| !r.last_name.trim().is_empty() && !r.first_name.trim().is_empty())
            .collect()
    }
}

/// `<label> Last, First` anywhere in the text.
///
/// The captured first name is stripped of any echo of the label: one
/// roster runs records together so tightly that the next record's label
/// word lands in the previous capture (`"JohnName"`).
pub fn parse_labeled_field(county: &str, label: &str, text: &str) -> Vec<RawRecord> {
    let pattern = format!(r"{}\s+([^,]+),\s+(\S+)", regex::escape(label));
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!(county, label, %e, "labeled_field pattern failed to compile");
            return Vec::new();
        }
    };
    let label_word = label.trim().trim_end_matches(':').trim();

    re.captures_iter(text)
        .map(|caps| {
            let last = caps[1].trim();
            let first = strip_label_echo(caps[2].trim(), label.trim(), label_word);
            RawRecord::new(county, last, first, "")
        })
        .collect()
}

/// Drop one trailing copy of the label (`"JohnName:"` or `"JohnName"`).
/// A name that is nothing but the label is left alone.
fn strip_label_echo<'a>(first: &'a str, label: &str, label_word: &str) -> &'a str {
    [label, label_word]
        .into_iter()
        .filter(|echo| !echo.is_empty())
        .find_map(|echo| first.strip_suffix(echo))
        .map(str::trim)
        .filter(|stripped| !stripped.is_empty())
        .unwrap_or(first)
}

/// Table rows of `[last, first, ...]`; extra columns are ignored.
pub fn parse_grid_rows(county: &str, pages: &[TablePage]) -> Vec<RawRecord> {
    let mut out = Vec::new();
    for page in pages {
        for row in &page.rows {
            if row.len() < 2 {
                continue;
            }
            let last = title_case(&clean_field(&row[0]));
            let first = title_case(&clean_field(&row[1]));
            if last.is_empty() || first.is_empty() {
                continue;
            }
            out.push(RawRecord::new(county, last, first, ""));
        }
    }
    out
}

fn compound_surname_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^[ \t]*(?:\d+[.)]?[ \t]+)?([A-Z][A-Z'\-]*(?:[ \t]+[A-Z][A-Z'\-]*)*),[ \t]*([A-Z][A-Z'\-]*)(?:[ \t]+([A-Z][A-Z'\-]*))?\b(?:.*?\b(\d{1,2}/\d{1,2}/\d{2,4})\b)?",
        )
        .expect("compound surname pattern is valid")
    })
}

/// Line-oriented `[NN] LAST WORDS, FIRST [MIDDLE] ... [MM/DD/YYYY]`.
///
/// The leading row number is optional and discarded; the last name may
/// span several upper-case words.
pub fn parse_compound_surname(county: &str, text: &str) -> Vec<RawRecord> {
    compound_surname_re()
        .captures_iter(text)
        .map(|caps| {
            let middle = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            RawRecord::new(county, &caps[1], &caps[2], middle)
        })
        .collect()
}

/// Listing nodes of the form `"Last, First Middle..."`.
pub fn parse_dom_listing(county: &str, items: &[String]) -> Vec<RawRecord> {
    items
        .iter()
        .filter_map(|item| {
            let (last, rest) = item.split_once(',')?;
            let mut tokens = rest.split_whitespace();
            let first = tokens.next()?;
            let middle = tokens.collect::<Vec<_>>().join(" ");
            Some(RawRecord::new(county, last.trim(), first, middle))
        })
        .collect()
}

fn uppercase_pairs_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b([A-Z][A-Z'\-]+),[ \t]*([A-Z][A-Z'\-]+)(?:[ \t]+([A-Z])\b)?")
            .expect("uppercase pairs pattern is valid")
    })
}

/// `LAST, FIRST [M]`, where the trailing token counts as a middle initial
/// only when it is a single letter.
pub fn parse_uppercase_pairs(county: &str, text: &str) -> Vec<RawRecord> {
    uppercase_pairs_re()
        .captures_iter(text)
        .map(|caps| {
            let middle = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            RawRecord::new(county, &caps[1], &caps[2], middle)
        })
        .collect()
}
