//! Per-format document interpreters.
use super::{DocumentFormat, ExtractionError};

pub(super) fn label(format: DocumentFormat) -> &'static str {
    match format {
        DocumentFormat::Pdf => "PDF",
        DocumentFormat::Docx => "DOCX",
        DocumentFormat::Doc => "DOC",
        DocumentFormat::Pptx => "PPTX",
        DocumentFormat::Spreadsheet => "spreadsheet",
        DocumentFormat::Csv => "CSV",
        DocumentFormat::Other => "text",
    }
}

pub(super) fn decode(format: DocumentFormat, bytes: &[u8]) -> Result<String, ExtractionError> {
    match format {
        DocumentFormat::Csv => csv_text(bytes),
        DocumentFormat::Pdf => pdf_text(bytes),
        DocumentFormat::Docx => docx_text(bytes),
        DocumentFormat::Pptx => pptx_text(bytes),
        DocumentFormat::Spreadsheet => spreadsheet_text(bytes),
        DocumentFormat::Doc | DocumentFormat::Other => {
            Err(ExtractionError::MissingSupport(label(format)))
        }
    }
}

/// Re-serialize delimited text so ragged quoting comes out uniform.
fn csv_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for record in reader.records() {
        writer.write_record(&record?)?;
    }
    let out = writer
        .into_inner()
        .map_err(|err| ExtractionError::Malformed(err.to_string()))?;
    String::from_utf8(out).map_err(|err| ExtractionError::Malformed(err.to_string()))
}

#[cfg(feature = "documents")]
fn pdf_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|err| ExtractionError::Malformed(format!("invalid PDF: {err}")))?;
    Ok(text.trim().to_string())
}

#[cfg(feature = "documents")]
fn docx_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;
    let xml = read_entry(&mut archive, "word/document.xml")?;
    Ok(ooxml_text(&xml)?.trim().to_string())
}

/// Slide text in slide order, one blank line between slides.
#[cfg(feature = "documents")]
fn pptx_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;
    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse()
                .ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slides.sort();

    let mut parts = Vec::with_capacity(slides.len());
    for (_, name) in slides {
        let xml = read_entry(&mut archive, &name)?;
        let text = ooxml_text(&xml)?;
        if !text.trim().is_empty() {
            parts.push(text.trim().to_string());
        }
    }
    Ok(parts.join("\n\n"))
}

/// First worksheet as CSV.
#[cfg(feature = "documents")]
fn spreadsheet_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    use calamine::Reader;

    let mut workbook = calamine::open_workbook_auto_from_rs(std::io::Cursor::new(bytes))
        .map_err(|err| ExtractionError::Malformed(format!("invalid spreadsheet: {err}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ExtractionError::Malformed("workbook has no sheets".to_string()))?
        .map_err(|err| ExtractionError::Malformed(format!("read first sheet: {err}")))?;

    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for row in range.rows() {
        writer.write_record(row.iter().map(|cell| cell.to_string()))?;
    }
    let out = writer
        .into_inner()
        .map_err(|err| ExtractionError::Malformed(err.to_string()))?;
    String::from_utf8(out).map_err(|err| ExtractionError::Malformed(err.to_string()))
}

#[cfg(feature = "documents")]
fn read_entry<R: std::io::Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<String, ExtractionError> {
    use std::io::Read;

    let mut entry = archive.by_name(name)?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Text runs of a WordprocessingML or DrawingML part. `<w:t>`/`<a:t>` carry
/// the text, `<w:p>`/`<a:p>` end a line.
#[cfg(feature = "documents")]
fn ooxml_text(xml: &str) -> Result<String, ExtractionError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_run_text = false;
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_run_text = true,
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_run_text = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => text.push('\t'),
                b"br" | b"cr" => text.push('\n'),
                _ => {}
            },
            Event::Text(e) if in_run_text => text.push_str(&e.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(text)
}

#[cfg(not(feature = "documents"))]
fn pdf_text(_bytes: &[u8]) -> Result<String, ExtractionError> {
    Err(ExtractionError::MissingSupport(label(DocumentFormat::Pdf)))
}

#[cfg(not(feature = "documents"))]
fn docx_text(_bytes: &[u8]) -> Result<String, ExtractionError> {
    Err(ExtractionError::MissingSupport(label(DocumentFormat::Docx)))
}

#[cfg(not(feature = "documents"))]
fn pptx_text(_bytes: &[u8]) -> Result<String, ExtractionError> {
    Err(ExtractionError::MissingSupport(label(DocumentFormat::Pptx)))
}

#[cfg(not(feature = "documents"))]
fn spreadsheet_text(_bytes: &[u8]) -> Result<String, ExtractionError> {
    Err(ExtractionError::MissingSupport(label(DocumentFormat::Spreadsheet)))
}

#[cfg(all(test, feature = "documents"))]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn package(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, body) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let xml = r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Essay brief</w:t></w:r></w:p>
    <w:p><w:r><w:t xml:space="preserve">Word count: </w:t></w:r><w:r><w:t>1500 &amp; APA</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let bytes = package(&[("word/document.xml", xml)]);
        assert_eq!(
            decode(DocumentFormat::Docx, &bytes).unwrap(),
            "Essay brief\nWord count: 1500 & APA"
        );
    }

    #[test]
    fn pptx_slides_in_numeric_order() {
        let slide = |text: &str| {
            format!(
                r#"<p:sld xmlns:p="p" xmlns:a="a"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{text}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#
            )
        };
        let (one, two, ten) = (slide("First"), slide("Second"), slide("Tenth"));
        let bytes = package(&[
            ("ppt/slides/slide10.xml", ten.as_str()),
            ("ppt/slides/slide2.xml", two.as_str()),
            ("ppt/slides/slide1.xml", one.as_str()),
            ("ppt/slides/_rels/slide1.xml.rels", "<Relationships/>"),
        ]);
        assert_eq!(
            decode(DocumentFormat::Pptx, &bytes).unwrap(),
            "First\n\nSecond\n\nTenth"
        );
    }

    #[test]
    fn docx_without_document_part_is_an_error() {
        let bytes = package(&[("word/styles.xml", "<w:styles/>")]);
        assert!(matches!(
            decode(DocumentFormat::Docx, &bytes),
            Err(ExtractionError::Archive(_))
        ));
    }

    #[test]
    fn xlsx_first_sheet_becomes_csv() {
        let workbook = r#"<?xml version="1.0" encoding="UTF-8"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets>
    <sheet name="Marks" sheetId="1" r:id="rId1"/>
    <sheet name="Notes" sheetId="2" r:id="rId2"/>
  </sheets>
</workbook>"#;
        let rels = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/>
</Relationships>"#;
        let sheet = |rows: &str| {
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{rows}</sheetData></worksheet>"#
            )
        };
        let marks = sheet(concat!(
            r#"<row r="1"><c r="A1" t="inlineStr"><is><t>name</t></is></c><c r="B1" t="inlineStr"><is><t>score</t></is></c></row>"#,
            r#"<row r="2"><c r="A2" t="inlineStr"><is><t>Lovelace, Ada</t></is></c><c r="B2"><v>19</v></c></row>"#,
        ));
        let notes = sheet(r#"<row r="1"><c r="A1" t="inlineStr"><is><t>ignored</t></is></c></row>"#);
        let content_types = r#"<?xml version="1.0" encoding="UTF-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
  <Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
  <Override PartName="/xl/worksheets/sheet2.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
</Types>"#;
        let root_rels = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#;
        let bytes = package(&[
            ("[Content_Types].xml", content_types),
            ("_rels/.rels", root_rels),
            ("xl/workbook.xml", workbook),
            ("xl/_rels/workbook.xml.rels", rels),
            ("xl/worksheets/sheet1.xml", marks.as_str()),
            ("xl/worksheets/sheet2.xml", notes.as_str()),
        ]);
        assert_eq!(
            decode(DocumentFormat::Spreadsheet, &bytes).unwrap(),
            "name,score\n\"Lovelace, Ada\",19\n"
        );
    }

    #[test]
    fn garbage_is_not_a_spreadsheet() {
        assert!(decode(DocumentFormat::Spreadsheet, b"nope").is_err());
    }
}
