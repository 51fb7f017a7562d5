//! Dataset archive fetch and extraction.
//!
//! Fetches `<root_url>/<dataset>.tar.gz` into `save_at` and unpacks it to
//! `<save_at>/<dataset>/`. Both steps are idempotent: an existing archive
//! skips the network fetch, and an existing target directory skips
//! extraction unless a fresh archive was just downloaded.

use crate::types::{DatasetResult, TagDatasetError};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub downloaded: bool,
    pub extracted: bool,
    pub archive: PathBuf,
    pub target_dir: PathBuf,
}

pub fn fetch_dataset(dataset: &str, root_url: &str, save_at: &Path) -> DatasetResult<FetchOutcome> {
    let archive = save_at.join(format!("{dataset}.tar.gz"));
    let target_dir = save_at.join(dataset);

    let downloaded = if archive.is_file() {
        println!("{} exists; nothing will be downloaded", archive.display());
        false
    } else {
        let url = format!("{root_url}/{dataset}.tar.gz");
        download_to_path(&url, &archive)?;
        true
    };

    let extracted = if target_dir.is_dir() && !downloaded {
        println!("{} exists; nothing will be unpacked", target_dir.display());
        false
    } else {
        extract_archive(&archive, save_at).map_err(|e| {
            eprintln!("Failed to extract {}: {e}", archive.display());
            e
        })?;
        true
    };

    Ok(FetchOutcome {
        downloaded,
        extracted,
        archive,
        target_dir,
    })
}

fn download_to_path(url: &str, dest: &Path) -> DatasetResult<()> {
    let response = ureq::get(url).call().map_err(|e| {
        eprintln!("Failed to download {url}: {e}");
        TagDatasetError::Http {
            url: url.to_string(),
            msg: e.to_string(),
        }
    })?;
    let tmp = dest.with_extension("tmp");
    let mut file = File::create(&tmp).map_err(|e| TagDatasetError::Io {
        path: tmp.clone(),
        source: e,
    })?;
    std::io::copy(&mut response.into_reader(), &mut file).map_err(|e| TagDatasetError::Io {
        path: tmp.clone(),
        source: e,
    })?;
    fs::rename(&tmp, dest).map_err(|e| TagDatasetError::Io {
        path: dest.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

fn extract_archive(archive: &Path, dest: &Path) -> DatasetResult<()> {
    let file = File::open(archive).map_err(|e| TagDatasetError::Io {
        path: archive.to_path_buf(),
        source: e,
    })?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut tarball = tar::Archive::new(decoder);
    tarball.unpack(dest).map_err(|e| TagDatasetError::Io {
        path: dest.to_path_buf(),
        source: e,
    })?;
    Ok(())
}
