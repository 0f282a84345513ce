use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use bytes::Bytes;

use atelier_lib::archive::NewEntry;
use atelier_lib::workspace::path;

use crate::app::App;
use crate::OutputFormat;

fn file_name(local: &Path) -> Result<String> {
    local
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("'{}' has no file name", local.display()))
}

fn print_entries(entries: &[NewEntry], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let output: Vec<serde_json::Value> = entries
                .iter()
                .map(|e| serde_json::json!({ "name": e.name, "path": e.path }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            for entry in entries {
                println!("Created {}", entry.path);
            }
        }
    }
    Ok(())
}

pub async fn touch(app: &mut App, file_path: &str, content: Option<Vec<u8>>, format: &OutputFormat) -> Result<()> {
    let (dir, name) = path::split_parent(file_path);
    let entry = match content {
        Some(data) => {
            app.engine
                .create_file_with_content(dir, name, Bytes::from(data))
                .await?
        }
        None => app.engine.create_file(dir, name).await?,
    };
    print_entries(std::slice::from_ref(&entry), format)
}

pub async fn mkdir(app: &mut App, dir_path: &str, archive: Option<&Path>, format: &OutputFormat) -> Result<()> {
    let created = match archive {
        Some(local) => {
            let data = std::fs::read(local)
                .with_context(|| format!("Failed to read {}", local.display()))?;
            let root = app
                .engine
                .create_directory_from_archive(dir_path, &file_name(local)?, &data)
                .await?;
            path::join(dir_path, &root.name)
        }
        None => {
            let (parent, name) = path::split_parent(dir_path);
            app.engine.create_directory(parent, name).await?
        }
    };

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({ "path": created });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => println!("Created {}/", created),
    }
    Ok(())
}

fn is_zip(local: &Path) -> bool {
    local
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

pub async fn upload(app: &mut App, dir: &str, files: &[PathBuf], format: &OutputFormat) -> Result<()> {
    let entries = match files {
        [archive] if is_zip(archive) => {
            let data = std::fs::read(archive)
                .with_context(|| format!("Failed to read {}", archive.display()))?;
            app.engine.create_files_from_archive(dir, &data).await?
        }
        _ => {
            let mut loaded = Vec::with_capacity(files.len());
            for local in files {
                let data = std::fs::read(local)
                    .with_context(|| format!("Failed to read {}", local.display()))?;
                loaded.push((file_name(local)?, data));
            }
            app.engine.create_files(dir, loaded).await?
        }
    };
    print_entries(&entries, format)
}

pub async fn upload_dir(app: &mut App, dir: &str, local: &Path, format: &OutputFormat) -> Result<()> {
    if !local.is_dir() {
        bail!("'{}' is not a directory", local.display());
    }
    let archive = app.engine.codec().pack_local_dir(local)?;
    let archive_name = format!("{}.zip", file_name(local)?);
    let root = app
        .engine
        .create_directory_from_archive(dir, &archive_name, &archive)
        .await?;

    let prefix = path::join(dir, &root.name);
    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "path": prefix,
                "files": root.file_paths(&prefix),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!("Created {}/ ({} files)", prefix, root.file_count());
        }
    }
    Ok(())
}
