//! Text extraction for uploaded files, dispatched on the lowercase file
//! extension.
//!
//! | Extensions | Method |
//! |------------|--------|
//! | `.txt .md .markdown .csv .html` | UTF-8, invalid sequences replaced |
//! | `.ipynb` | markdown and code cell sources, joined by blank lines |
//! | `.pdf` | `pdf-extract` |
//! | `.docx .pptx .xlsx` | OOXML parts read with `zip` + `quick-xml` |
//! | `.odt` | `content.xml` text nodes |
//!
//! Extraction never panics on malformed input; failures come back as
//! [`Error::Extraction`].

use std::io::Read;

use brainstore_core::{Error, Result};
use quick_xml::events::Event;

const TEXT_EXTENSIONS: &[&str] = &[".txt", ".md", ".markdown", ".csv", ".html"];
const BINARY_EXTENSIONS: &[&str] = &[".ipynb", ".pdf", ".docx", ".pptx", ".xlsx", ".odt"];

const XLSX_MAX_SHEETS: usize = 100;
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Cap on decompressed bytes read from one ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

/// Whether `extension` (lowercase, with dot) has an extractor.
pub fn is_supported(extension: &str) -> bool {
    TEXT_EXTENSIONS.contains(&extension) || BINARY_EXTENSIONS.contains(&extension)
}

/// Extract plain text from `bytes` according to `extension`.
pub fn extract_text(bytes: &[u8], extension: &str) -> Result<String> {
    match extension {
        ext if TEXT_EXTENSIONS.contains(&ext) => Ok(String::from_utf8_lossy(bytes).into_owned()),
        ".ipynb" => extract_notebook(bytes),
        ".pdf" => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| Error::Extraction(format!("PDF extraction failed: {}", e))),
        ".docx" => extract_docx(bytes),
        ".pptx" => extract_pptx(bytes),
        ".xlsx" => extract_xlsx(bytes),
        ".odt" => extract_odt(bytes),
        other => Err(Error::Extraction(format!("unsupported extension: '{}'", other))),
    }
}

fn ooxml_err(e: impl std::fmt::Display) -> Error {
    Error::Extraction(format!("OOXML extraction failed: {}", e))
}

fn extract_notebook(bytes: &[u8]) -> Result<String> {
    let notebook: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| Error::Extraction(format!("notebook is not valid JSON: {}", e)))?;
    let cells = notebook
        .get("cells")
        .and_then(|c| c.as_array())
        .ok_or_else(|| Error::Extraction("notebook has no cells array".into()))?;

    let mut parts = Vec::new();
    for cell in cells {
        // `source` is either one string or a list of lines
        let text = match cell.get("source") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Array(lines)) => {
                lines.iter().filter_map(|l| l.as_str()).collect::<String>()
            }
            _ => continue,
        };
        if !text.trim().is_empty() {
            parts.push(text);
        }
    }
    Ok(parts.join("\n\n"))
}

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(ooxml_err)
}

fn read_zip_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>> {
    let entry = archive.by_name(name).map_err(ooxml_err)?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(ooxml_err)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ooxml_err(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Archive entries `{prefix}N.xml`, sorted by N.
fn numbered_entries(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Concatenate the text of every `<*:t>` element.
fn collect_t_elements(xml: &[u8]) -> Result<String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => {
                if let Ok(Event::Text(te)) = reader.read_event_into(&mut buf) {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
    collect_t_elements(&xml)
}

fn extract_pptx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let mut out = String::new();
    for name in numbered_entries(&archive, "ppt/slides/slide") {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        let text = collect_t_elements(&xml)?;
        if !out.is_empty() && !text.is_empty() {
            out.push('\n');
        }
        out.push_str(&text);
    }
    Ok(out)
}

fn extract_xlsx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let shared_strings = read_shared_strings(&mut archive)?;
    let mut out = String::new();
    for name in numbered_entries(&archive, "xl/worksheets/sheet")
        .into_iter()
        .take(XLSX_MAX_SHEETS)
    {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        let cells = sheet_cells(&xml, &shared_strings)?;
        if !out.is_empty() && !cells.is_empty() {
            out.push('\n');
        }
        out.push_str(&cells);
    }
    Ok(out)
}

fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>> {
    // A workbook with only numbers has no shared strings part.
    if archive.by_name("xl/sharedStrings.xml").is_err() {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml")?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = true;
                } else if in_si && e.local_name().as_ref() == b"t" {
                    if let Ok(Event::Text(te)) = reader.read_event_into(&mut buf) {
                        strings.push(te.unescape().unwrap_or_default().into_owned());
                    }
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"si" => in_si = false,
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn sheet_cells(xml: &[u8], shared_strings: &[String]) -> Result<String> {
    let mut cells: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_v = false;
    let mut shared = false;
    while cells.len() < XLSX_MAX_CELLS_PER_SHEET {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"c" {
                    shared = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                } else if e.local_name().as_ref() == b"v" {
                    in_v = true;
                }
            }
            Ok(Event::Text(te)) if in_v => {
                let raw = te.unescape().unwrap_or_default();
                let value = raw.trim();
                if shared {
                    if let Some(s) = value.parse::<usize>().ok().and_then(|i| shared_strings.get(i))
                    {
                        cells.push(s.clone());
                    }
                } else if !value.is_empty() {
                    cells.push(value.to_string());
                }
                in_v = false;
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"v" {
                    in_v = false;
                } else if e.local_name().as_ref() == b"c" {
                    shared = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(cells.join(" "))
}

/// ODF text: every text node of `content.xml`, one line per paragraph or
/// heading.
fn extract_odt(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "content.xml")?;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Text(te)) => out.push_str(te.unescape().unwrap_or_default().as_ref()),
            Ok(Event::End(e)) if matches!(e.local_name().as_ref(), b"p" | b"h") => {
                out.push('\n')
            }
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"s" => out.push(' '),
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Extraction(format!("ODT extraction failed: {}", e))),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}
