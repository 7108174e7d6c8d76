use crate::io::annotation::{AnnotationParser, SwathAnnotation};
use crate::types::{AgriError, AgriResult, Polarization};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Reader for zipped Sentinel-1 SAFE products
pub struct SafeReader {
    zip_path: PathBuf,
    archive: Option<ZipArchive<File>>,
}

impl SafeReader {
    /// Create a new reader for a Sentinel-1 product
    pub fn new<P: AsRef<Path>>(zip_path: P) -> AgriResult<Self> {
        let zip_path = zip_path.as_ref().to_path_buf();

        if !zip_path.exists() {
            return Err(AgriError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {}", zip_path.display()),
            )));
        }

        Ok(Self {
            zip_path,
            archive: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.zip_path
    }

    /// Open the ZIP archive
    fn open_archive(&mut self) -> AgriResult<&mut ZipArchive<File>> {
        let archive = match self.archive.take() {
            Some(archive) => archive,
            None => {
                let file = File::open(&self.zip_path)?;
                ZipArchive::new(file)
                    .map_err(|e| AgriError::InvalidFormat(format!("Failed to open ZIP: {}", e)))?
            }
        };
        Ok(self.archive.insert(archive))
    }

    /// List all files in the archive
    pub fn list_files(&mut self) -> AgriResult<Vec<String>> {
        let archive = self.open_archive()?;
        let mut files = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let file = archive.by_index(i).map_err(|e| {
                AgriError::InvalidFormat(format!("Failed to access file {}: {}", i, e))
            })?;
            files.push(file.name().to_string());
        }

        Ok(files)
    }

    /// Annotation files of one polarization keyed by sub-swath (`IW1`, `IW2`, ...)
    pub fn find_annotation_files(&mut self, pol: Polarization) -> AgriResult<BTreeMap<String, String>> {
        let files = self.list_files()?;
        let pol_tag = format!("-{}-", pol.file_tag());
        let mut annotations = BTreeMap::new();

        for file in files {
            let is_product_annotation = file.contains("annotation/")
                && !file.contains("/calibration/")
                && !file.contains("/rfi/")
                && file.ends_with(".xml");
            if !is_product_annotation {
                continue;
            }

            let file_name = file.rsplit('/').next().unwrap_or(&file).to_lowercase();
            if !file_name.contains(&pol_tag) {
                continue;
            }

            // s1a-iw1-slc-vh-... -> IW1
            if let Some(swath) = file_name.split('-').nth(1) {
                annotations.insert(swath.to_uppercase(), file);
            }
        }

        if annotations.is_empty() {
            return Err(AgriError::InvalidFormat(format!(
                "No annotation files found for polarization {}",
                pol
            )));
        }

        Ok(annotations)
    }

    /// Read a raw archive member as text
    pub fn read_text(&mut self, name: &str) -> AgriResult<String> {
        let archive = self.open_archive()?;
        let mut file = archive
            .by_name(name)
            .map_err(|e| AgriError::InvalidFormat(format!("Failed to read {}: {}", name, e)))?;

        let mut content = String::new();
        file.read_to_string(&mut content)?;
        Ok(content)
    }

    /// Read and parse the annotation of one sub-swath
    pub fn read_annotation(&mut self, swath: &str, pol: Polarization) -> AgriResult<SwathAnnotation> {
        let annotations = self.find_annotation_files(pol)?;
        let annotation_file = annotations
            .get(&swath.to_uppercase())
            .ok_or_else(|| {
                AgriError::InvalidFormat(format!(
                    "No annotation found for swath {} polarization {}",
                    swath, pol
                ))
            })?
            .clone();

        log::debug!("Reading annotation {}", annotation_file);
        let xml_content = self.read_text(&annotation_file)?;
        AnnotationParser::parse_annotation(&xml_content)
    }
}
