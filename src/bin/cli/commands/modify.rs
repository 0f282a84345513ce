use anyhow::Result;

use atelier_lib::workspace::EntryKind;

use crate::app::App;
use crate::OutputFormat;

fn kind(is_dir: bool) -> EntryKind {
    if is_dir {
        EntryKind::Directory
    } else {
        EntryKind::File
    }
}

pub async fn remove(app: &mut App, entry_path: &str, is_dir: bool, format: &OutputFormat) -> Result<()> {
    let kind = kind(is_dir);
    app.engine.delete(entry_path, kind).await?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({ "deleted": entry_path, "kind": kind });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => println!("Deleted {} {}", kind, entry_path),
    }
    Ok(())
}

pub async fn rename(
    app: &mut App,
    entry_path: &str,
    new_name: &str,
    is_dir: bool,
    format: &OutputFormat,
) -> Result<()> {
    let new_path = app.engine.rename(entry_path, new_name, kind(is_dir)).await?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({ "from": entry_path, "to": new_path });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => println!("Renamed {} -> {}", entry_path, new_path),
    }
    Ok(())
}

pub async fn push(app: &mut App, file_path: &str, content: Vec<u8>, format: &OutputFormat) -> Result<()> {
    let text = String::from_utf8(content)?;
    app.engine.activate(file_path)?;
    app.engine.edit_document(file_path, text)?;
    app.engine.write_active_document().await?;

    let document = app.engine.document(file_path)?;
    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "path": file_path,
                "version": document.buffer().version(),
                "savedAt": document.buffer().last_saved().map(|t| t.to_rfc3339()),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => println!("Saved {}", file_path),
    }
    Ok(())
}
