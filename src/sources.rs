use anyhow::Result;

use roster_core::{Acquisition, SourceRegistry};

use crate::config::Config;

/// Print the configured sources, in refresh order.
pub fn list_sources(config: &Config) -> Result<()> {
    let registry = config.registry()?;
    print!("{}", render_table(&registry));
    Ok(())
}

fn render_table(registry: &SourceRegistry) -> String {
    let mut out = format!(
        "{:<12} {:<10} {:<12} {:<18} URL\n",
        "COUNTY", "FETCH", "FORM", "PARSER"
    );
    for source in registry.sources() {
        let fetch = match source.acquisition {
            Acquisition::Direct { .. } => "direct",
            Acquisition::Browser { .. } => "browser",
        };
        out.push_str(&format!(
            "{:<12} {:<10} {:<12} {:<18} {}\n",
            source.county,
            fetch,
            source.form.to_string(),
            source.parser.name(),
            source.acquisition.entry_url()
        ));
    }
    out
}
