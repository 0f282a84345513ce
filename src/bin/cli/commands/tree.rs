use anyhow::Result;

use crate::app::App;
use crate::render::terminal;
use crate::OutputFormat;

pub fn run(app: &App, format: &OutputFormat, use_color: bool) -> Result<()> {
    let root = app.engine.tree().root();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(root)?);
        }
        OutputFormat::Plain => {
            for line in terminal::render_tree(root, use_color) {
                println!("{}", line);
            }
        }
    }

    Ok(())
}
