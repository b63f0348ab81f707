//! Revised NF-e export: header and items written back out as a flat
//! `<nfe_revisada>` document.

use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::models::record::{Extraction, Record};

/// Serialize an extraction as a revised NF-e document.
///
/// Column names become element names through [`tag_name`]. Items are
/// numbered from 1 in the `id` attribute of each `<produto>`.
pub fn write_revised(
    extraction: &Extraction,
    source_name: &str,
    revised_at: DateTime<Utc>,
) -> crate::Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("nfe_revisada")))?;

    writer
        .create_element("metadata")
        .write_inner_content(|w| {
            w.create_element("data_revisao").write_text_content(BytesText::new(
                &revised_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ))?;
            w.create_element("arquivo_original")
                .write_text_content(BytesText::new(source_name))?;
            Ok(())
        })?;

    writer
        .create_element("cabecalho")
        .write_inner_content(|w| write_fields(w, &extraction.header))?;

    writer.write_event(Event::Start(BytesStart::new("produtos")))?;
    for (index, item) in extraction.items.iter().enumerate() {
        let id = (index + 1).to_string();
        writer
            .create_element("produto")
            .with_attribute(("id", id.as_str()))
            .write_inner_content(|w| write_fields(w, item))?;
    }
    writer.write_event(Event::End(BytesEnd::new("produtos")))?;

    writer.write_event(Event::End(BytesEnd::new("nfe_revisada")))?;

    // The writer only ever receives UTF-8 text.
    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

fn write_fields(writer: &mut Writer<Vec<u8>>, record: &Record) -> std::io::Result<()> {
    for (column, value) in record.iter() {
        writer
            .create_element(tag_name(column))
            .write_text_content(BytesText::new(value))?;
    }
    Ok(())
}

/// Element name for a column label: accents folded, lowercase, runs of
/// anything outside `[a-z0-9_]` collapsed to one underscore.
///
/// `"Número NF"` → `numero_nf`, `"ICMS %"` → `icms`, `"1ª Via"` → `field_1a_via`.
pub fn tag_name(column: &str) -> String {
    let mut name = String::with_capacity(column.len());
    for c in column.chars().map(fold_accent) {
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_lowercase());
        } else if !name.is_empty() && !name.ends_with('_') {
            name.push('_');
        }
    }

    let name = name.trim_end_matches('_');
    match name.chars().next() {
        None => "field_unknown".to_string(),
        Some(first) if first.is_ascii_digit() => format!("field_{name}"),
        Some(_) => name.to_string(),
    }
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'ª' => 'a',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'º' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{Document, Element};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    /// The export carries no namespace, so lookups go by local name.
    fn child<'a>(element: &'a Element, name: &str) -> Option<&'a Element> {
        element.elements().iter().find(|c| c.name() == name)
    }

    fn revised_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_tag_names() {
        assert_eq!(tag_name("Número NF"), "numero_nf");
        assert_eq!(tag_name("Data Emissão"), "data_emissao");
        assert_eq!(tag_name("CNPJ Emitente"), "cnpj_emitente");
        assert_eq!(tag_name("ICMS %"), "icms");
        assert_eq!(tag_name("  __Código__ "), "codigo");
        assert_eq!(tag_name("1ª Via"), "field_1a_via");
        assert_eq!(tag_name("%%"), "field_unknown");
    }

    #[test]
    fn test_document_layout() {
        let extraction = Extraction {
            header: [("Número NF", "4521"), ("Emitente", "Ferro & Aço <Ltda>")]
                .into_iter()
                .collect(),
            items: vec![
                [("Item", "1"), ("NCM", "73181500")].into_iter().collect(),
                [("Item", "2"), ("NCM", "0")].into_iter().collect(),
            ],
        };

        let xml = write_revised(&extraction, "nota.xml", revised_at()).unwrap();

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains("<data_revisao>2026-03-14T09:30:00Z</data_revisao>"));
        assert!(xml.contains("<emitente>Ferro &amp; Aço &lt;Ltda&gt;</emitente>"));
        assert!(xml.contains(r#"<produto id="2">"#));

        let doc = Document::parse(&xml).unwrap();
        let root = doc.root();
        assert_eq!(root.name(), "nfe_revisada");
        assert_eq!(
            child(root, "metadata").and_then(|m| child(m, "arquivo_original")).map(Element::text),
            Some("nota.xml")
        );
        assert_eq!(
            child(root, "cabecalho").and_then(|h| child(h, "emitente")).map(Element::text),
            Some("Ferro & Aço <Ltda>")
        );

        let products = child(root, "produtos").map(Element::elements).unwrap_or_default();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].attr("id"), Some("1"));
        assert_eq!(child(&products[1], "ncm").map(Element::text), Some("0"));
    }

    #[test]
    fn test_empty_extraction() {
        let xml = write_revised(&Extraction::default(), "vazio.xml", revised_at()).unwrap();
        let doc = Document::parse(&xml).unwrap();

        assert!(child(doc.root(), "cabecalho").is_some());
        assert_eq!(child(doc.root(), "produtos").map(|p| p.elements().len()), Some(0));
    }
}
