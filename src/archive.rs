//! Tar and gzip plumbing shared by the file-tree job kinds.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::globwalk::ExcludeSet;

/// Writer behind a tar builder: plain file or gzip stream.
pub enum ArchiveWriter {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl ArchiveWriter {
    pub fn create(path: &Path, gzip: bool) -> Result<Self> {
        let file = File::create(path)
            .map_err(|e| Error::ArchiveFailed(format!("can't create '{}': {e}", path.display())))?;
        let buf = BufWriter::new(file);
        Ok(if gzip {
            ArchiveWriter::Gzip(GzEncoder::new(buf, Compression::default()))
        } else {
            ArchiveWriter::Plain(buf)
        })
    }

    pub fn finish(self) -> io::Result<()> {
        match self {
            ArchiveWriter::Plain(mut w) => w.flush(),
            ArchiveWriter::Gzip(w) => w.finish().map(|mut b| b.flush())?,
        }
    }
}

impl Write for ArchiveWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ArchiveWriter::Plain(w) => w.write(buf),
            ArchiveWriter::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ArchiveWriter::Plain(w) => w.flush(),
            ArchiveWriter::Gzip(w) => w.flush(),
        }
    }
}

/// Archive member name: the source path without its leading `/`.
pub fn member_name(path: &Path) -> PathBuf {
    path.strip_prefix("/").unwrap_or(path).to_path_buf()
}

/// Build a full tar of `target` into `dst`, skipping excluded paths.
///
/// Symlinks are stored as links, directory entries are kept so empty
/// directories survive, and objects that vanish mid-walk are skipped the
/// same way the dump of a live tree has to.
pub fn create_tar(dst: &Path, target: &Path, gzip: bool, excludes: &ExcludeSet) -> Result<()> {
    let writer = ArchiveWriter::create(dst, gzip)?;
    let mut builder = tar::Builder::new(writer);
    builder.follow_symlinks(false);

    for entry in WalkDir::new(target)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if excludes.is_excluded(path) {
            continue;
        }
        let name = member_name(path);
        let appended = if entry.file_type().is_dir() {
            builder.append_dir(&name, path)
        } else {
            builder.append_path_with_name(path, &name)
        };
        if let Err(e) = appended {
            if e.kind() == io::ErrorKind::NotFound {
                continue;
            }
            return Err(Error::ArchiveFailed(format!(
                "can't add '{}' to '{}': {e}",
                path.display(),
                dst.display()
            )));
        }
    }

    let writer = builder
        .into_inner()
        .map_err(|e| Error::ArchiveFailed(format!("can't finish '{}': {e}", dst.display())))?;
    writer
        .finish()
        .map_err(|e| Error::ArchiveFailed(format!("can't finish '{}': {e}", dst.display())))?;
    Ok(())
}

/// Stream-compress `src` into `dst`.  Used where a dump tool cannot write
/// gzip itself (redis-cli's `--rdb`).
pub fn gzip_file(src: &Path, dst: &Path) -> Result<()> {
    let mut input = File::open(src)
        .map_err(|e| Error::ArchiveFailed(format!("can't open '{}': {e}", src.display())))?;
    let out = File::create(dst)
        .map_err(|e| Error::ArchiveFailed(format!("can't create '{}': {e}", dst.display())))?;
    let mut encoder = GzEncoder::new(BufWriter::new(out), Compression::default());
    io::copy(&mut input, &mut encoder)
        .and_then(|_| encoder.finish().map(|_| ()))
        .map_err(|e| Error::ArchiveFailed(format!("can't gzip '{}': {e}", src.display())))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::fs;

    use super::*;

    fn entry_names(path: &Path, gzip: bool) -> BTreeSet<String> {
        let file = File::open(path).unwrap();
        let mut names = BTreeSet::new();
        if gzip {
            let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
            for entry in archive.entries().unwrap() {
                names.insert(entry.unwrap().path().unwrap().display().to_string());
            }
        } else {
            let mut archive = tar::Archive::new(file);
            for entry in archive.entries().unwrap() {
                names.insert(entry.unwrap().path().unwrap().display().to_string());
            }
        }
        names
    }

    #[test]
    fn tar_contains_files_and_dirs_without_leading_slash() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("site");
        fs::create_dir_all(src.join("css")).unwrap();
        fs::write(src.join("index.html"), b"<html>").unwrap();
        fs::write(src.join("css/site.css"), b"body{}").unwrap();

        let dst = tmp.path().join("out.tar");
        create_tar(&dst, &src, false, &ExcludeSet::default()).unwrap();

        let names = entry_names(&dst, false);
        let prefix = src.strip_prefix("/").unwrap().display().to_string();
        assert!(names.contains(&prefix));
        assert!(names.contains(&format!("{prefix}/index.html")));
        assert!(names.contains(&format!("{prefix}/css/site.css")));
    }

    #[test]
    fn excluded_subtree_is_left_out() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("site");
        fs::create_dir_all(src.join("cache")).unwrap();
        fs::write(src.join("cache/page.html"), b"x").unwrap();
        fs::write(src.join("keep.html"), b"y").unwrap();

        let target = src.display().to_string();
        let excludes = ExcludeSet::expand(&[target], &["cache".into()]);

        let dst = tmp.path().join("out.tar");
        create_tar(&dst, &src, false, &excludes).unwrap();

        let names = entry_names(&dst, false);
        assert!(names.iter().any(|n| n.ends_with("keep.html")));
        assert!(!names.iter().any(|n| n.contains("cache")));
    }

    #[test]
    fn gzip_archive_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("data");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("file.bin"), vec![7u8; 4096]).unwrap();

        let dst = tmp.path().join("out.tar.gz");
        create_tar(&dst, &src, true, &ExcludeSet::default()).unwrap();

        let names = entry_names(&dst, true);
        assert!(names.iter().any(|n| n.ends_with("file.bin")));
    }

    #[test]
    fn gzip_file_decompresses_back() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("dump.rdb");
        let dst = tmp.path().join("dump.rdb.gz");
        fs::write(&src, b"REDIS0011-payload").unwrap();

        gzip_file(&src, &dst).unwrap();

        let mut decoder = flate2::read::GzDecoder::new(File::open(&dst).unwrap());
        let mut content = Vec::new();
        io::Read::read_to_end(&mut decoder, &mut content).unwrap();
        assert_eq!(content, b"REDIS0011-payload");
    }
}
