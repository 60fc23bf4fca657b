//! Source definitions and the source registry.
//!
//! A [`Source`] bundles everything the pipeline needs to know about one
//! county roster: how to acquire it, which intermediate form to extract,
//! and which parser strategy reads that form. Sources are plain
//! configuration values, resolved once at startup into a
//! [`SourceRegistry`] and never chosen by inspecting document content.
//!
//! # Built-in sources
//!
//! | County | Acquisition | Form | Strategy |
//! |--------|-------------|------|----------|
//! | Vilas | browser, link selector | plain text | labeled field |
//! | Waukesha | direct | table grid | grid rows |
//! | Barron | direct | plain text | compound surname |
//! | Burnett | browser, listing selector | DOM listing | DOM listing |
//! | Sawyer | direct | plain text | uppercase pairs |

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// How the raw document is obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Acquisition {
    /// Plain HTTP GET of a fixed URL.
    Direct { url: String },
    /// Load `page_url` in a headless browser and query `selector`.
    ///
    /// For [`IntermediateForm::DomListing`] sources the selector names the
    /// listing nodes; for every other form it names the download link.
    Browser { page_url: String, selector: String },
}

impl Acquisition {
    /// The URL the pipeline starts from.
    pub fn entry_url(&self) -> &str {
        match self {
            Acquisition::Direct { url } => url,
            Acquisition::Browser { page_url, .. } => page_url,
        }
    }
}

/// Shape of the extractor output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntermediateForm {
    PlainText,
    TableGrid,
    DomListing,
}

impl std::fmt::Display for IntermediateForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IntermediateForm::PlainText => "plain_text",
            IntermediateForm::TableGrid => "table_grid",
            IntermediateForm::DomListing => "dom_listing",
        };
        f.write_str(name)
    }
}

/// Parser strategy, one variant per upstream format.
///
/// See [`crate::parse`] for the matching rules of each variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ParseStrategy {
    LabeledField {
        #[serde(default = "default_label")]
        label: String,
    },
    GridRows,
    CompoundSurname,
    DomListing,
    UppercasePairs,
}

fn default_label() -> String {
    "Name:".to_string()
}

impl ParseStrategy {
    /// The intermediate form this strategy reads.
    pub fn expected_form(&self) -> IntermediateForm {
        match self {
            ParseStrategy::LabeledField { .. }
            | ParseStrategy::CompoundSurname
            | ParseStrategy::UppercasePairs => IntermediateForm::PlainText,
            ParseStrategy::GridRows => IntermediateForm::TableGrid,
            ParseStrategy::DomListing => IntermediateForm::DomListing,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParseStrategy::LabeledField { .. } => "labeled_field",
            ParseStrategy::GridRows => "grid_rows",
            ParseStrategy::CompoundSurname => "compound_surname",
            ParseStrategy::DomListing => "dom_listing",
            ParseStrategy::UppercasePairs => "uppercase_pairs",
        }
    }
}

/// One county roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub county: String,
    pub acquisition: Acquisition,
    pub form: IntermediateForm,
    pub parser: ParseStrategy,
}

impl Source {
    fn validate(&self) -> Result<()> {
        if self.county.trim().is_empty() {
            bail!("source county must not be empty");
        }
        if self.parser.expected_form() != self.form {
            bail!(
                "source '{}': parser '{}' reads {} but form is {}",
                self.county,
                self.parser.name(),
                self.parser.expected_form(),
                self.form
            );
        }
        if self.form == IntermediateForm::DomListing
            && !matches!(self.acquisition, Acquisition::Browser { .. })
        {
            bail!(
                "source '{}': dom_listing requires browser acquisition",
                self.county
            );
        }
        if let ParseStrategy::LabeledField { label } = &self.parser {
            if label.trim().is_empty() {
                bail!("source '{}': labeled_field label must not be empty", self.county);
            }
        }
        Ok(())
    }
}

/// The configured sources, in declaration order.
///
/// Declaration order is the processing order of a full refresh.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    /// Validate and freeze a source list.
    pub fn new(sources: Vec<Source>) -> Result<Self> {
        for (i, source) in sources.iter().enumerate() {
            source.validate()?;
            if sources[..i]
                .iter()
                .any(|s| s.county.eq_ignore_ascii_case(&source.county))
            {
                bail!("duplicate source county: '{}'", source.county);
            }
        }
        Ok(Self { sources })
    }

    /// Registry holding the five built-in county sources.
    pub fn builtin() -> Self {
        Self {
            sources: builtin_sources(),
        }
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Look up a source by county name, ignoring ASCII case.
    pub fn find(&self, county: &str) -> Option<&Source> {
        let county = county.trim();
        self.sources
            .iter()
            .find(|s| s.county.eq_ignore_ascii_case(county))
    }

    pub fn counties(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.county.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Default source definitions.
pub fn builtin_sources() -> Vec<Source> {
    vec![
        Source {
            county: "Vilas".to_string(),
            acquisition: Acquisition::Browser {
                page_url: "https://www.vilascountysheriff.org/services".to_string(),
                selector: "#comp-j9zy5x1z a.wixui-rich-text__text".to_string(),
            },
            form: IntermediateForm::PlainText,
            parser: ParseStrategy::LabeledField {
                label: default_label(),
            },
        },
        Source {
            county: "Waukesha".to_string(),
            acquisition: Acquisition::Direct {
                url: "https://src.waukeshacounty.gov/page/Internet%20Inmate%20Information.pdf"
                    .to_string(),
            },
            form: IntermediateForm::TableGrid,
            parser: ParseStrategy::GridRows,
        },
        Source {
            county: "Barron".to_string(),
            acquisition: Acquisition::Direct {
                url: "https://www.barroncountywi.gov/sheriff/inmate-roster.pdf".to_string(),
            },
            form: IntermediateForm::PlainText,
            parser: ParseStrategy::CompoundSurname,
        },
        Source {
            county: "Burnett".to_string(),
            acquisition: Acquisition::Browser {
                page_url: "https://www.burnettcounty.com/inmate-roster".to_string(),
                selector: "span[style*=\"text-transform: capitalize\"]".to_string(),
            },
            form: IntermediateForm::DomListing,
            parser: ParseStrategy::DomListing,
        },
        Source {
            county: "Sawyer".to_string(),
            acquisition: Acquisition::Direct {
                url: "https://www.sawyercountygov.org/sheriff/in-custody.pdf".to_string(),
            },
            form: IntermediateForm::PlainText,
            parser: ParseStrategy::UppercasePairs,
        },
    ]
}
