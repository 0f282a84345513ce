use std::collections::HashSet;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::workspace::path;
use crate::workspace::{Directory, NamingPolicy, Result, WorkspaceError};

/// Compression used for archives written by the codec
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Deflated,
    Stored,
}

/// A file created by an upload, before a document handle exists for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
    pub name: String,
    pub path: String,
    pub content: String,
}

/// Result of unpacking an archive into a directory subtree
#[derive(Debug, Clone)]
pub struct UnpackedDirectory {
    pub root: Directory,
    /// One entry per file, with its full workspace path.
    pub files: Vec<NewEntry>,
    /// The archive re-packed under the normalized names, relative to `root`.
    pub archive: Vec<u8>,
}

/// Raw archive member
struct RawEntry {
    name: String,
    is_dir: bool,
    data: Vec<u8>,
}

/// Packs workspace subtrees into ZIP archives and unpacks uploads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveCodec {
    compression: Compression,
}

impl ArchiveCodec {
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }

    fn options(&self) -> SimpleFileOptions {
        let method = match self.compression {
            Compression::Deflated => CompressionMethod::Deflated,
            Compression::Stored => CompressionMethod::Stored,
        };
        SimpleFileOptions::default().compression_method(method)
    }

    /// Pack `dir` (whose workspace path is `dir_path`) into an archive.
    ///
    /// Entry names are relative to `dir`; `content` is asked for each file by its
    /// full workspace path.
    pub fn pack<F>(&self, dir: &Directory, dir_path: &str, mut content: F) -> Result<Vec<u8>>
    where
        F: FnMut(&str) -> Result<String>,
    {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        self.pack_into(&mut zip, dir, dir_path, "", &mut content)?;
        Ok(zip.finish()?.into_inner())
    }

    fn pack_into<F>(
        &self,
        zip: &mut ZipWriter<Cursor<Vec<u8>>>,
        dir: &Directory,
        dir_path: &str,
        relative: &str,
        content: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&str) -> Result<String>,
    {
        let options = self.options();
        for sub in &dir.dirs {
            let sub_relative = path::join(relative, &sub.name);
            zip.add_directory(format!("{}/", sub_relative), options)?;
            self.pack_into(zip, sub, &path::join(dir_path, &sub.name), &sub_relative, content)?;
        }
        for file in &dir.files {
            let text = content(&path::join(dir_path, file))?;
            zip.start_file(path::join(relative, file), options)?;
            zip.write_all(text.as_bytes())?;
        }
        Ok(())
    }

    /// Pack loose files into a flat archive.
    pub fn pack_flat(&self, files: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = self.options();
        for (name, data) in files {
            path::validate_name(name)?;
            zip.start_file(name.as_str(), options)?;
            zip.write_all(data)?;
        }
        Ok(zip.finish()?.into_inner())
    }

    /// Pack a directory on the local disk, relative to `local_dir`.
    pub fn pack_local_dir(&self, local_dir: &Path) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = self.options();

        for entry in WalkDir::new(local_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
            let entry_path = entry.path();
            let relative = entry_path
                .strip_prefix(local_dir)
                .map_err(|_| std::io::Error::other("Failed to get relative path"))?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if entry_path.is_file() {
                zip.start_file(name.as_str(), options)?;
                let mut data = Vec::new();
                std::fs::File::open(entry_path)?.read_to_end(&mut data)?;
                zip.write_all(&data)?;
            } else if entry_path.is_dir() && !name.is_empty() {
                zip.add_directory(format!("{}/", name), options)?;
            }
        }

        Ok(zip.finish()?.into_inner())
    }

    fn read_entries(archive: &[u8]) -> Result<Vec<RawEntry>> {
        let mut zip = ZipArchive::new(Cursor::new(archive))?;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            let mut data = Vec::new();
            if !file.is_dir() {
                file.read_to_end(&mut data)?;
            }
            entries.push(RawEntry {
                name: file.name().to_string(),
                is_dir: file.is_dir(),
                data,
            });
        }
        Ok(entries)
    }

    /// Unpack a flat archive destined for `target_dir`.
    ///
    /// Any nested entry rejects the whole archive; folders must be uploaded
    /// through `unpack_as_directory`.
    pub fn unpack_flat(&self, archive: &[u8], target_dir: &str, naming: &NamingPolicy) -> Result<Vec<NewEntry>> {
        let entries = Self::read_entries(archive)?;

        if let Some(nested) = entries.iter().find(|e| e.is_dir || path::has_separator(&e.name)) {
            return Err(WorkspaceError::Validation(format!(
                "archive entry '{}' is nested; flat uploads must not contain folders, \
                 create a folder from the archive instead",
                nested.name
            )));
        }

        let mut out: Vec<NewEntry> = Vec::with_capacity(entries.len());
        for entry in entries {
            path::validate_name(&entry.name)?;
            let name = naming.normalize(target_dir, &entry.name);
            if out.iter().any(|e| e.name == name) {
                return Err(WorkspaceError::Validation(format!("duplicate archive entry '{}'", name)));
            }
            out.push(NewEntry {
                path: path::join(target_dir, &name),
                name,
                content: String::from_utf8_lossy(&entry.data).into_owned(),
            });
        }
        Ok(out)
    }

    /// Re-pack a flat archive under the names chosen by `unpack_flat`, keeping the
    /// raw bytes of every entry.
    pub fn repack_flat(&self, archive: &[u8], entries: &[NewEntry]) -> Result<Vec<u8>> {
        let raw = Self::read_entries(archive)?;
        if raw.len() != entries.len() {
            return Err(WorkspaceError::Validation(format!(
                "archive has {} entries, expected {}",
                raw.len(),
                entries.len()
            )));
        }
        let files: Vec<(String, Vec<u8>)> = entries
            .iter()
            .zip(raw)
            .map(|(entry, raw)| (entry.name.clone(), raw.data))
            .collect();
        self.pack_flat(&files)
    }

    /// Unpack an archive into a new directory named after the archive, placed in
    /// `target_dir`. Nested entries become nested directories.
    pub fn unpack_as_directory(
        &self,
        archive: &[u8],
        target_dir: &str,
        archive_name: &str,
        naming: &NamingPolicy,
    ) -> Result<UnpackedDirectory> {
        let root_name = naming.normalize(target_dir, path::strip_extension(archive_name));
        path::validate_name(&root_name)?;
        let root_path = path::join(target_dir, &root_name);

        let mut root = Directory::new(root_name);
        let mut files = Vec::new();
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let mut written_dirs = HashSet::new();
        let options = self.options();

        for entry in Self::read_entries(archive)? {
            let segments = path::segments(&entry.name);
            let (dir_segments, file_name) = if entry.is_dir {
                (segments.as_slice(), None)
            } else {
                match segments.split_last() {
                    Some((last, rest)) => (rest, Some(*last)),
                    None => continue,
                }
            };

            let mut node = &mut root;
            let mut node_path = root_path.clone();
            let mut relative = String::new();
            for segment in dir_segments {
                check_segment(&entry.name, segment)?;
                let name = naming.normalize(&node_path, segment);
                node = descend(node, &name, &entry.name)?;
                node_path = path::join(&node_path, &name);
                relative = path::join(&relative, &name);
                if written_dirs.insert(relative.clone()) {
                    zip.add_directory(format!("{}/", relative), options)?;
                }
            }

            if let Some(raw) = file_name {
                check_segment(&entry.name, raw)?;
                let name = naming.normalize(&node_path, raw);
                if node.has_entry(&name) {
                    return Err(WorkspaceError::Validation(format!(
                        "duplicate archive entry '{}'",
                        entry.name
                    )));
                }
                node.files.push(name.clone());
                zip.start_file(path::join(&relative, &name), options)?;
                zip.write_all(&entry.data)?;
                files.push(NewEntry {
                    path: path::join(&node_path, &name),
                    name,
                    content: String::from_utf8_lossy(&entry.data).into_owned(),
                });
            }
        }

        Ok(UnpackedDirectory {
            root,
            files,
            archive: zip.finish()?.into_inner(),
        })
    }
}

fn check_segment(entry: &str, segment: &str) -> Result<()> {
    if segment.is_empty() || segment == "." || segment == ".." || path::has_separator(segment) {
        return Err(WorkspaceError::Validation(format!(
            "archive entry '{}' has an invalid path",
            entry
        )));
    }
    Ok(())
}

/// Find or create the child directory `name`.
fn descend<'a>(dir: &'a mut Directory, name: &str, entry: &str) -> Result<&'a mut Directory> {
    if dir.has_file(name) {
        return Err(WorkspaceError::Validation(format!(
            "archive entry '{}' uses a file as a folder",
            entry
        )));
    }
    let idx = match dir.dirs.iter().position(|d| d.name == name) {
        Some(idx) => idx,
        None => {
            dir.dirs.push(Directory::new(name));
            dir.dirs.len() - 1
        }
    };
    Ok(&mut dir.dirs[idx])
}
