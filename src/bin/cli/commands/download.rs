use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::app::App;
use crate::OutputFormat;

pub fn run(app: &App, dir: Option<&str>, output: Option<PathBuf>, format: &OutputFormat) -> Result<()> {
    let (archive, default_name) = match dir {
        Some(dir) if !dir.is_empty() => {
            let (_, name) = atelier_lib::workspace::path::split_parent(dir);
            (app.engine.download_directory(dir)?, format!("{}.zip", name))
        }
        _ => (app.engine.download_all()?, app.engine.download_name()),
    };

    let output = output.unwrap_or_else(|| PathBuf::from(default_name));
    std::fs::write(&output, &archive)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    match format {
        OutputFormat::Json => {
            let summary = serde_json::json!({
                "output": output.display().to_string(),
                "bytes": archive.len(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Plain => {
            println!("Wrote {} ({} bytes)", output.display(), archive.len());
        }
    }

    Ok(())
}
