use base64::Engine;
use log::{info, warn};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const TENDER_FILE_NAME: &str = "tender.pdf";

#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    #[error("uploaded archive is empty")]
    Empty,
    #[error("invalid ZIP signature: the upload is base64-encoded ZIP data, decode it before uploading")]
    Base64Encoded,
    #[error("invalid ZIP signature: expected 'PK' magic bytes, found {found}")]
    BadSignature { found: String },
    #[error("corrupt ZIP archive: {0}")]
    Corrupt(String),
    #[error("tender.pdf not found in archive")]
    MissingTender,
    #[error("scratch directory {0} is missing")]
    MissingScratch(PathBuf),
    #[error("archive io error: {0}")]
    Io(#[from] io::Error),
}

/// Rejects anything that does not start with the ZIP local-header magic.
///
/// The check is done on raw bytes so a base64 text upload gets a precise message instead of a
/// generic "not a zip file".
pub fn validate_zip_bytes(bytes: &[u8]) -> Result<(), ArchiveError> {
    if bytes.is_empty() {
        return Err(ArchiveError::Empty);
    }
    if bytes.starts_with(b"PK") {
        return Ok(());
    }
    if looks_like_base64_zip(bytes) {
        return Err(ArchiveError::Base64Encoded);
    }
    let found = bytes
        .iter()
        .take(4)
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ");
    Err(ArchiveError::BadSignature { found })
}

fn looks_like_base64_zip(bytes: &[u8]) -> bool {
    let text: Vec<u8> = bytes
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let text = match text.iter().position(|b| *b == b',') {
        // data:application/zip;base64,....
        Some(pos) if text.starts_with(b"data:") => text[pos + 1..].to_vec(),
        _ => text,
    };
    // decoding a short prefix is enough to see the magic
    let prefix_len = text.len().min(64) / 4 * 4;
    if prefix_len == 0 {
        return false;
    }
    base64::engine::general_purpose::STANDARD
        .decode(&text[..prefix_len])
        .map(|decoded| decoded.starts_with(b"PK"))
        .unwrap_or(false)
}

/// Dotfiles, `__MACOSX` resource forks and OS thumbnails never count as content.
pub fn is_ignored(rel: &Path) -> bool {
    rel.components().any(|c| {
        let part = c.as_os_str().to_string_lossy();
        part == "__MACOSX"
            || part.eq_ignore_ascii_case("thumbs.db")
            || part.eq_ignore_ascii_case("desktop.ini")
            || (part.starts_with('.') && part != "." && part != "..")
    })
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub skipped: usize,
}

/// Extracts `archive_path` under `dest`, dropping entries that would escape it.
pub fn safe_extract(archive_path: &Path, dest: &Path) -> Result<ExtractSummary, ArchiveError> {
    let file = File::open(archive_path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
    std::fs::create_dir_all(dest)?;

    let mut summary = ExtractSummary::default();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
        let Some(rel) = entry.enclosed_name() else {
            warn!("skipping unsafe archive entry: {}", entry.name());
            summary.skipped += 1;
            continue;
        };
        if is_ignored(&rel) {
            summary.skipped += 1;
            continue;
        }

        let out = dest.join(&rel);
        if entry.is_dir() {
            std::fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut target = File::create(&out)?;
        io::copy(&mut entry, &mut target)?;
        summary.files += 1;
    }
    info!(
        "extracted {} files into {} ({} skipped)",
        summary.files,
        dest.display(),
        summary.skipped
    );
    Ok(summary)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompanyFolder {
    pub name: String,
    pub files: Vec<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct ArchiveLayout {
    pub root: PathBuf,
    pub tender_pdf: PathBuf,
    pub companies: Vec<CompanyFolder>,
}

impl ArchiveLayout {
    pub fn total_files(&self) -> usize {
        self.companies.iter().map(|c| c.files.len()).sum()
    }
}

fn is_tender_file(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().eq_ignore_ascii_case(TENDER_FILE_NAME))
        .unwrap_or(false)
}

fn relative_ignored(base: &Path, path: &Path) -> bool {
    path.strip_prefix(base).map(is_ignored).unwrap_or(true)
}

/// Finds `tender.pdf` (shallowest match, then path order) and the company folders beside it.
pub fn discover_layout(scratch: &Path) -> Result<ArchiveLayout, ArchiveError> {
    if !scratch.is_dir() {
        return Err(ArchiveError::MissingScratch(scratch.to_path_buf()));
    }

    let tender_pdf = WalkDir::new(scratch)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_tender_file(e.path()) && !relative_ignored(scratch, e.path()))
        .min_by(|a, b| a.depth().cmp(&b.depth()).then_with(|| a.path().cmp(b.path())))
        .map(|e| e.path().to_path_buf())
        .ok_or(ArchiveError::MissingTender)?;

    let root = tender_pdf
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| scratch.to_path_buf());

    let mut companies = Vec::new();
    for entry in WalkDir::new(&root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_dir() || relative_ignored(&root, entry.path()) {
            continue;
        }
        let files: Vec<PathBuf> = WalkDir::new(entry.path())
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| !relative_ignored(entry.path(), e.path()) && !is_tender_file(e.path()))
            .map(|e| e.path().to_path_buf())
            .collect();
        companies.push(CompanyFolder {
            name: entry.file_name().to_string_lossy().to_string(),
            files,
        });
    }

    info!(
        "archive layout: tender={} companies={}",
        tender_pdf.display(),
        companies.len()
    );
    Ok(ArchiveLayout {
        root,
        tender_pdf,
        companies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, body) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_validate_rejects_base64_zip() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("a.zip");
        build_zip(&zip_path, &[("tender.pdf", b"%PDF")]);
        let raw = std::fs::read(&zip_path).unwrap();
        assert!(validate_zip_bytes(&raw).is_ok());

        let encoded = base64::engine::general_purpose::STANDARD.encode(&raw);
        let err = validate_zip_bytes(encoded.as_bytes()).unwrap_err();
        assert!(matches!(err, ArchiveError::Base64Encoded));
        assert!(err.to_string().contains("invalid ZIP signature"));
    }

    #[test]
    fn test_validate_rejects_other_bytes() {
        let err = validate_zip_bytes(b"%PDF-1.7 not a zip").unwrap_err();
        assert!(err.to_string().contains("invalid ZIP signature"));
        assert!(matches!(validate_zip_bytes(b""), Err(ArchiveError::Empty)));
    }

    #[test]
    fn test_safe_extract_skips_traversal_and_hidden() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("in.zip");
        build_zip(
            &zip_path,
            &[
                ("bundle/tender.pdf", b"tender"),
                ("bundle/AlphaCo/bid.pdf", b"alpha"),
                ("../escape.pdf", b"evil"),
                ("__MACOSX/bundle/._tender.pdf", b"fork"),
                ("bundle/.DS_Store", b"junk"),
            ],
        );
        let dest = dir.path().join("scratch");
        let summary = safe_extract(&zip_path, &dest).unwrap();
        assert_eq!(summary.files, 2);
        assert_eq!(summary.skipped, 3);
        assert!(dest.join("bundle/tender.pdf").exists());
        assert!(!dir.path().join("escape.pdf").exists());
    }

    #[test]
    fn test_discover_layout_nested_root() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("in.zip");
        build_zip(
            &zip_path,
            &[
                ("bundle/TENDER.PDF", b"tender"),
                ("bundle/AlphaCo/bid.pdf", b"a"),
                ("bundle/AlphaCo/sub/fees.pdf", b"a2"),
                ("bundle/BetaCo/tender.pdf", b"copy"),
                ("bundle/BetaCo/bid.pdf", b"b"),
                ("bundle/.git/config", b"x"),
            ],
        );
        let dest = dir.path().join("scratch");
        safe_extract(&zip_path, &dest).unwrap();
        let layout = discover_layout(&dest).unwrap();
        assert_eq!(layout.tender_pdf, dest.join("bundle/TENDER.PDF"));
        let names: Vec<_> = layout.companies.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["AlphaCo", "BetaCo"]);
        assert_eq!(layout.companies[0].files.len(), 2);
        assert_eq!(layout.companies[1].files, vec![dest.join("bundle/BetaCo/bid.pdf")]);
        assert_eq!(layout.total_files(), 3);
    }

    #[test]
    fn test_discover_layout_without_tender() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("AlphaCo")).unwrap();
        std::fs::write(dir.path().join("AlphaCo/bid.pdf"), b"a").unwrap();
        let err = discover_layout(dir.path()).unwrap_err();
        assert!(matches!(err, ArchiveError::MissingTender));
        assert!(err.to_string().contains("tender.pdf"));
    }
}
