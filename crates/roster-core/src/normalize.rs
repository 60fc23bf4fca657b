//! Name normalization and identity assignment.
//!
//! Normalization is idempotent: normalizing an already-normalized record
//! yields the same record. The identity is a natural key derived from
//! county, last name, and first name only; middle name is deliberately
//! excluded, so two people who share county, last, and first name
//! collapse into one stored record.

use std::collections::HashMap;

use crate::models::{NormalizedRecord, RawRecord};

/// Remove line breaks, trim, and collapse interior whitespace runs.
///
/// Line breaks are deleted rather than replaced, matching the way table
/// cells wrap a single word across lines (`"smi\nth"` → `"smith"`).
pub fn clean_field(value: &str) -> String {
    let joined: String = value.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First character upper case, remainder lower case.
pub fn title_case(value: &str) -> String {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    let mut upper = first.to_uppercase();
    let mut out = String::with_capacity(value.len());
    // Keep the original when upper-casing expands (e.g. 'ß'), or a second
    // pass would not reproduce the first.
    match (upper.next(), upper.next()) {
        (Some(u), None) => out.push(u),
        _ => out.push(first),
    }
    for c in chars {
        out.extend(c.to_lowercase());
    }
    out
}

/// Deterministic identity for a `(county, last, first)` triple.
///
/// Case- and whitespace-insensitive: `("Vilas", "Smith", "john")` and
/// `("vilas", " SMITH ", "John")` produce the same key.
pub fn identity(county: &str, last_name: &str, first_name: &str) -> String {
    let key = format!(
        "{}-{}-{}",
        clean_field(county),
        clean_field(last_name),
        clean_field(first_name)
    )
    .to_lowercase();
    key.split_whitespace().collect::<Vec<_>>().join("-")
}

/// Normalize a single record.
pub fn normalize(raw: &RawRecord) -> NormalizedRecord {
    let county = clean_field(&raw.county);
    let last_name = title_case(&clean_field(&raw.last_name));
    let first_name = title_case(&clean_field(&raw.first_name));
    let middle_name = title_case(&clean_field(&raw.middle_name));
    NormalizedRecord {
        id: identity(&county, &last_name, &first_name),
        county,
        last_name,
        first_name,
        middle_name,
    }
}

/// Normalize a parser's output for one upsert batch.
///
/// Records with an empty last or first name are dropped. Records that
/// share an identity collapse to one: the last occurrence's values win,
/// kept at the position where the identity first appeared.
pub fn normalize_batch(raws: impl IntoIterator<Item = RawRecord>) -> Vec<NormalizedRecord> {
    let mut out: Vec<NormalizedRecord> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for raw in raws {
        let record = normalize(&raw);
        if record.last_name.is_empty() || record.first_name.is_empty() {
            continue;
        }
        match positions.get(&record.id) {
            Some(&i) => out[i] = record,
            None => {
                positions.insert(record.id.clone(), out.len());
                out.push(record);
            }
        }
    }

    out
}

impl From<NormalizedRecord> for RawRecord {
    fn from(record: NormalizedRecord) -> Self {
        RawRecord {
            last_name: record.last_name,
            first_name: record.first_name,
            middle_name: record.middle_name,
            county: record.county,
        }
    }
}
