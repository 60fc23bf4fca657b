#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use roster_core::{
    Acquisition, FetchError, IntermediateForm, ParseStrategy, RawDocument, Source, SourceRegistry,
};
use roster_harness::fetch::DocumentFetcher;

/// Single-page PDF whose page content is `stream` (Helvetica as /F1).
pub fn pdf_with_content(stream: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            stream.len(),
            stream
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n");
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

/// A PDF with one line of text per entry, top to bottom.
pub fn text_pdf(lines: &[&str]) -> Vec<u8> {
    let mut stream = String::from("BT /F1 12 Tf 14 TL 72 720 Td");
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            stream.push_str(" T*");
        }
        stream.push_str(&format!(" ({}) Tj", line));
    }
    stream.push_str(" ET");
    pdf_with_content(&stream)
}

/// A DOM-listing source; the fake fetchers ignore the acquisition.
pub fn listing_source(county: &str) -> Source {
    Source {
        county: county.to_string(),
        acquisition: Acquisition::Browser {
            page_url: format!("http://localhost/{}", county.to_lowercase()),
            selector: "li.inmate".to_string(),
        },
        form: IntermediateForm::DomListing,
        parser: ParseStrategy::DomListing,
    }
}

pub fn registry(counties: &[&str]) -> SourceRegistry {
    SourceRegistry::new(counties.iter().map(|c| listing_source(c)).collect()).unwrap()
}

pub fn listing(county: &str, items: &[&str]) -> RawDocument {
    RawDocument::Listing {
        url: format!("http://localhost/{}", county.to_lowercase()),
        items: items.iter().map(|s| s.to_string()).collect(),
    }
}

/// Returns canned documents per county and records every call.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, Result<RawDocument, FetchError>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, county: &str, response: Result<RawDocument, FetchError>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(county.to_string(), response);
        self
    }

    pub fn set(&self, county: &str, response: Result<RawDocument, FetchError>) {
        self.responses
            .lock()
            .unwrap()
            .insert(county.to_string(), response);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentFetcher for ScriptedFetcher {
    async fn fetch(&self, source: &Source) -> Result<RawDocument, FetchError> {
        self.calls.lock().unwrap().push(source.county.clone());
        self.responses
            .lock()
            .unwrap()
            .get(&source.county)
            .cloned()
            .unwrap_or_else(|| {
                Err(FetchError::Network {
                    url: source.acquisition.entry_url().to_string(),
                    message: "no scripted response".to_string(),
                })
            })
    }
}

/// Blocks every fetch until released, so a run can be held open.
pub struct GatedFetcher {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl GatedFetcher {
    pub fn new() -> Self {
        Self {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl DocumentFetcher for GatedFetcher {
    async fn fetch(&self, source: &Source) -> Result<RawDocument, FetchError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(listing(&source.county, &["Doe, John"]))
    }
}
