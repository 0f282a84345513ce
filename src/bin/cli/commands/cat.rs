use anyhow::Result;

use crate::app::App;
use crate::OutputFormat;

pub fn run(app: &App, file_path: &str, format: &OutputFormat) -> Result<()> {
    let document = app.engine.document(file_path)?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "id": document.id().to_string(),
                "path": document.path(),
                "content": document.text(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            print!("{}", document.text());
        }
    }

    Ok(())
}
