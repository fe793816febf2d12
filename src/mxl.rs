//! Compressed MusicXML (.mxl) archives.
//!
//! An .mxl file is a ZIP archive containing:
//!   - META-INF/container.xml: declares the root MusicXML file path
//!   - <rootfile>.xml: the actual MusicXML content (e.g., score.xml)
//!   - (optional) other files: images, sounds, etc.

use std::io::{Cursor, Read};
use zip::ZipArchive;

use crate::error::LoadError;

/// ZIP local-file-header magic; .mxl archives start with it.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Whether `data` looks like an .mxl archive rather than plain XML.
pub fn is_mxl(data: &[u8]) -> bool {
    data.starts_with(ZIP_MAGIC)
}

/// Turn file bytes into MusicXML markup, unpacking .mxl archives.
pub fn read_markup(data: &[u8]) -> Result<String, LoadError> {
    if is_mxl(data) {
        extract_musicxml_from_mxl(data)
    } else {
        Ok(std::str::from_utf8(data)?.to_string())
    }
}

/// Extract the MusicXML content string from .mxl bytes.
pub fn extract_musicxml_from_mxl(data: &[u8]) -> Result<String, LoadError> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;

    let root_file_path = find_root_file(&mut archive)?;
    log::debug!("mxl: reading root file '{root_file_path}'");

    let mut root_file = archive.by_name(&root_file_path)?;
    let mut xml = String::new();
    root_file.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Root MusicXML path from META-INF/container.xml, or the first XML entry
/// outside META-INF when the container is absent.
fn find_root_file(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Result<String, LoadError> {
    let container_xml = match archive.by_name("META-INF/container.xml") {
        Ok(mut container_file) => {
            let mut xml = String::new();
            container_file.read_to_string(&mut xml)?;
            Some(xml)
        }
        Err(_) => None,
    };

    let names: Vec<String> = archive.file_names().map(String::from).collect();

    if let Some(xml) = container_xml {
        let doc = roxmltree::Document::parse(&xml)?;
        if let Some(path) = doc
            .descendants()
            .filter(|n| n.tag_name().name() == "rootfile")
            .find_map(|n| n.attribute("full-path"))
        {
            return Ok(path.to_string());
        }
        log::warn!("mxl: container.xml names no rootfile; scanning entries");
    }

    let fallback = names
        .iter()
        .find(|name| {
            !name.starts_with("META-INF/")
                && (name.ends_with(".xml") || name.ends_with(".musicxml"))
        })
        .cloned();
    fallback.ok_or(LoadError::MissingRootFile(names))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            for (name, body) in entries {
                zip.start_file(*name, SimpleFileOptions::default()).unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn follows_container_rootfile() {
        let data = archive(&[
            (
                "META-INF/container.xml",
                r#"<container><rootfiles><rootfile full-path="music/song.xml"/></rootfiles></container>"#,
            ),
            ("other.xml", "<wrong/>"),
            ("music/song.xml", "<score-partwise/>"),
        ]);
        assert!(is_mxl(&data));
        assert_eq!(read_markup(&data).unwrap(), "<score-partwise/>");
    }

    #[test]
    fn falls_back_to_first_xml_entry() {
        let data = archive(&[("readme.txt", "hi"), ("score.musicxml", "<score-partwise/>")]);
        assert_eq!(extract_musicxml_from_mxl(&data).unwrap(), "<score-partwise/>");
    }

    #[test]
    fn reports_entries_when_nothing_matches() {
        let data = archive(&[("readme.txt", "hi")]);
        match extract_musicxml_from_mxl(&data) {
            Err(LoadError::MissingRootFile(names)) => assert_eq!(names, vec!["readme.txt"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn plain_xml_passes_through() {
        assert!(!is_mxl(b"<score-partwise/>"));
        assert_eq!(read_markup(b"<score-partwise/>").unwrap(), "<score-partwise/>");
        assert!(matches!(read_markup(&[0xff, 0xfe]), Err(LoadError::Utf8(_))));
    }
}
