use std::{
    ffi::OsStr,
    fs,
    io::{self, Cursor, Read, Write},
    path::{Component, Path, PathBuf},
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use zip::{ZipArchive, ZipWriter, write::SimpleFileOptions};

use crate::CodecError;

// Entry bytes are streamed to disk in blocks of this size so the size limit
// is checked before each write.
const BLOCK_SIZE: usize = 1 << 13;

/// Zips every regular file below `src` and returns the archive as base64.
///
/// Entry names are relative to `src` and always use `/` separators, so the
/// archive never contains a nested root directory.
pub fn encode(src: &Path) -> Result<String, CodecError> {
    let mut files = Vec::new();
    collect_files(src, Path::new(""), &mut files)?;
    files.sort();

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for relative in &files {
        writer
            .start_file(entry_name(relative), options)
            .map_err(CodecError::ArchiveWrite)?;
        let mut file = fs::File::open(src.join(relative))?;
        io::copy(&mut file, &mut writer)?;
    }
    let buf = writer
        .finish()
        .map_err(CodecError::ArchiveWrite)?
        .into_inner();

    tracing::debug!(files = files.len(), bytes = buf.len(), "encoded coverage archive");
    Ok(STANDARD.encode(buf))
}

/// Decodes `payload` into `dest` without any size limit.
pub fn decode(payload: &str, dest: &Path) -> Result<DecodeReport, CodecError> {
    Decoder::new(DecodeOptions::default()).decode(payload, dest)
}

fn collect_files(root: &Path, relative: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(root.join(relative))? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = relative.join(entry.file_name());
        if file_type.is_dir() {
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Clone, Debug, Default)]
pub struct DecodeOptions {
    /// Upper bound on the bytes written by one decode call, across all entries.
    pub max_size: Option<u64>,
    /// File names that mark the root of a scenario. When non-empty, at most
    /// one entry may carry one of these names.
    pub entrypoint_markers: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodeReport {
    pub files: Vec<PathBuf>,
    pub bytes_written: u64,
    /// Directory holding the entrypoint marker, if markers were configured
    /// and one was found.
    pub entrypoint: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct Decoder {
    options: DecodeOptions,
}

impl Decoder {
    pub fn new(options: DecodeOptions) -> Self {
        Self { options }
    }

    pub fn with_max_size(max_size: u64) -> Self {
        Self::new(DecodeOptions {
            max_size: Some(max_size),
            ..Default::default()
        })
    }

    /// Decodes a base64 zip payload into `dest`.
    ///
    /// Aborts on the first tainted entry or once the size limit would be
    /// crossed. Files written before the failure are left in place.
    pub fn decode(&self, payload: &str, dest: &Path) -> Result<DecodeReport, CodecError> {
        let raw = STANDARD.decode(payload.trim())?;
        let mut archive = ZipArchive::new(Cursor::new(raw)).map_err(CodecError::InvalidArchive)?;

        let mut report = DecodeReport::default();
        let mut entrypoint: Option<(String, PathBuf)> = None;
        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(CodecError::InvalidArchive)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let target = sanitize_entry_path(dest, &name)?;

            if self.is_entrypoint(&target) {
                if let Some((first, _)) = &entrypoint {
                    return Err(CodecError::AmbiguousEntrypoint {
                        first: first.clone(),
                        second: name,
                    });
                }
                let dir = target.parent().unwrap_or(dest).to_path_buf();
                entrypoint = Some((name.clone(), dir));
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            self.copy_entry(&mut entry, &target, &mut report.bytes_written)?;
            report.files.push(target);
        }

        report.entrypoint = entrypoint.map(|(_, dir)| dir);
        Ok(report)
    }

    fn is_entrypoint(&self, target: &Path) -> bool {
        let Some(base) = target.file_name().and_then(OsStr::to_str) else {
            return false;
        };
        self.options.entrypoint_markers.iter().any(|m| m == base)
    }

    fn copy_entry(
        &self,
        reader: &mut impl Read,
        target: &Path,
        written: &mut u64,
    ) -> Result<(), CodecError> {
        let mut out = fs::File::create(target)?;
        let mut buf = [0u8; BLOCK_SIZE];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            if let Some(max_size) = self.options.max_size
                && *written + n as u64 > max_size
            {
                return Err(CodecError::ContentTooLarge { max_size });
            }
            out.write_all(&buf[..n])?;
            *written += n as u64;
        }
        Ok(())
    }
}

/// Joins `entry` onto `dest` lexically and rejects anything that does not end
/// up strictly below `dest`.
fn sanitize_entry_path(dest: &Path, entry: &str) -> Result<PathBuf, CodecError> {
    let tainted = || CodecError::PathTainted {
        entry: entry.to_string(),
    };

    let mut relative = PathBuf::new();
    for component in Path::new(entry).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !relative.pop() {
                    return Err(tainted());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(tainted()),
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(tainted());
    }
    Ok(dest.join(relative))
}
