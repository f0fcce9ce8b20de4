use crate::error::{PaperSliceError, Result};
use crate::style::ElementInfo;
use base64::Engine;
use kuchiki::traits::TendrilSink;
use kuchiki::{NodeData, NodeRef};

/// Parsed markup with the `<body>` located and document styles collected.
pub(crate) struct ParsedDocument {
    pub body: NodeRef,
    pub css: String,
    pub image_sources: Vec<String>,
}

pub(crate) fn parse_document(html: &str) -> Result<ParsedDocument> {
    if html.trim().is_empty() {
        return Err(PaperSliceError::render("document markup is empty"));
    }
    let document = kuchiki::parse_html().one(html);
    let body = document
        .select_first("body")
        .map_err(|_| PaperSliceError::render("document has no <body> element"))?
        .as_node()
        .clone();
    let css = collect_style_blocks(&document);
    let image_sources = collect_image_sources(&document);
    Ok(ParsedDocument {
        body,
        css,
        image_sources,
    })
}

fn collect_style_blocks(document: &NodeRef) -> String {
    let mut out = String::new();
    let Ok(styles) = document.select("style") else {
        return out;
    };
    for style in styles {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&style.as_node().text_contents());
    }
    out
}

fn collect_image_sources(document: &NodeRef) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let Ok(images) = document.select("img") else {
        return out;
    };
    for img in images {
        let attrs = img.attributes.borrow();
        let Some(src) = attrs.get("src").map(str::trim) else {
            continue;
        };
        if src.is_empty() || out.iter().any(|seen| seen == src) {
            continue;
        }
        out.push(src.to_string());
    }
    out
}

pub(crate) fn element_info(node: &NodeRef) -> Option<ElementInfo> {
    let NodeData::Element(el) = node.data() else {
        return None;
    };
    let attrs = el.attributes.borrow();
    let id = attrs
        .get("id")
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    let classes = attrs
        .get("class")
        .map(|raw| raw.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    let names = attrs
        .map
        .keys()
        .map(|name| name.local.as_ref().to_ascii_lowercase())
        .collect();
    Some(ElementInfo {
        tag: el.name.local.as_ref().to_ascii_lowercase(),
        id,
        classes,
        attrs: names,
    })
}

pub(crate) fn attribute(node: &NodeRef, name: &str) -> Option<String> {
    let NodeData::Element(el) = node.data() else {
        return None;
    };
    el.attributes.borrow().get(name).map(str::to_string)
}

/// Parses an HTML dimension attribute such as `width="120"` or `width="50%"`.
pub(crate) fn parse_dimension_attr(raw: &str) -> Option<crate::style::Length> {
    let raw = raw.trim();
    if let Some(pct) = raw.strip_suffix('%') {
        return pct
            .trim()
            .parse::<f32>()
            .ok()
            .map(|value| crate::style::Length::Percent(value / 100.0));
    }
    let number = raw.strip_suffix("px").unwrap_or(raw).trim();
    number
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
        .map(crate::style::Length::Px)
}

pub(crate) fn parse_data_uri_bytes(uri: &str) -> Option<(String, Vec<u8>)> {
    if !uri.starts_with("data:") {
        return None;
    }
    let (header, payload) = uri.split_once(',')?;
    let mime = header
        .trim_start_matches("data:")
        .split(';')
        .next()
        .filter(|v| !v.is_empty())
        .unwrap_or("application/octet-stream")
        .to_ascii_lowercase();
    let data = if header.contains(";base64") {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(compact.as_bytes())
            .ok()?
    } else {
        decode_percent_encoded_bytes(payload)?
    };
    Some((mime, data))
}

fn decode_percent_encoded_bytes(input: &str) -> Option<Vec<u8>> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                if i + 2 >= bytes.len() {
                    return None;
                }
                let hi = hex_nibble(bytes[i + 1])?;
                let lo = hex_nibble(bytes[i + 2])?;
                out.push((hi << 4) | lo);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Some(out)
}

fn hex_nibble(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_markup_is_unavailable() {
        assert!(matches!(
            parse_document("   \n"),
            Err(PaperSliceError::RenderUnavailable(_))
        ));
    }

    #[test]
    fn frameset_document_has_no_body() {
        let html = "<html><head></head><frameset><frame src=\"a.html\"></frameset></html>";
        assert!(matches!(
            parse_document(html),
            Err(PaperSliceError::RenderUnavailable(_))
        ));
    }

    #[test]
    fn collects_styles_and_unique_image_sources() {
        let html = r#"<html><head><style>p { color: red; }</style></head>
            <body><style>.a { height: 4px; }</style>
            <img src="a.png"><img src=" a.png "><img src="b.png"><img></body></html>"#;
        let parsed = parse_document(html).expect("parsed");
        assert!(parsed.css.contains("color: red"));
        assert!(parsed.css.contains(".a"));
        assert_eq!(parsed.image_sources, vec!["a.png", "b.png"]);
    }

    #[test]
    fn element_info_reads_id_classes_and_attributes() {
        let parsed =
            parse_document(r#"<body><div id="x" class="a pdf-block" data-pdf-block></div></body>"#)
                .expect("parsed");
        let div = parsed.body.select_first("div").expect("div");
        let info = element_info(div.as_node()).expect("element");
        assert_eq!(info.tag, "div");
        assert_eq!(info.id.as_deref(), Some("x"));
        assert!(info.has_class("pdf-block"));
        assert!(info.has_attr("data-pdf-block"));
    }

    #[test]
    fn data_uri_decodes_base64_and_percent_forms() {
        let (mime, data) = parse_data_uri_bytes("data:text/plain;base64,aGk=").expect("b64");
        assert_eq!(mime, "text/plain");
        assert_eq!(data, b"hi");
        let (_, data) = parse_data_uri_bytes("data:,a%20b").expect("percent");
        assert_eq!(data, b"a b");
        assert!(parse_data_uri_bytes("data:,bad%2").is_none());
        assert!(parse_data_uri_bytes("https://example.com/a.png").is_none());
    }

    #[test]
    fn dimension_attributes_accept_pixels_and_percent() {
        assert_eq!(parse_dimension_attr("120"), Some(crate::style::Length::Px(120.0)));
        assert_eq!(parse_dimension_attr("50%"), Some(crate::style::Length::Percent(0.5)));
        assert_eq!(parse_dimension_attr("wide"), None);
    }
}
