//! Minimal HTML scanning
//!
//! Download index pages are simple, server-generated listings. Scanning
//! start tags and their attributes is enough to pull out anchors and the
//! build-variant labels next to them, without a full DOM.

/// A start tag with its parsed attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    attrs: Vec<(String, String)>,
    /// Byte offset of the `<`
    pub start: usize,
    /// Byte offset just past the closing `>` of the start tag
    pub end: usize,
}

impl Element {
    /// Attribute value by (case-insensitive) name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_whitespace().any(|c| c == class))
    }
}

/// Iterate start tags named `name` (case-insensitive) in document order
pub fn start_tags<'a>(html: &'a str, name: &'a str) -> impl Iterator<Item = Element> + 'a {
    let mut from = 0;
    std::iter::from_fn(move || loop {
        let rel = html.get(from..)?.find('<')?;
        let start = from + rel;
        let Some(element) = parse_start_tag(html, start) else {
            from = start + 1;
            continue;
        };
        from = element.end;
        if element.name.eq_ignore_ascii_case(name) {
            return Some(element);
        }
    })
}

/// All anchors that carry an `href`
pub fn anchors(html: &str) -> Vec<Element> {
    start_tags(html, "a")
        .filter(|a| a.attr("href").is_some())
        .collect()
}

/// Text of the first `<tag class="class">` starting at or after `from`
pub fn next_text(html: &str, from: usize, tag: &str, class: &str) -> Option<String> {
    let rest = html.get(from..)?;
    let element = start_tags(rest, tag).find(|e| e.has_class(class))?;
    let inner = &rest[element.end..];
    let stop = closing_tag(inner, tag).unwrap_or(inner.len());
    Some(strip_tags(&inner[..stop]))
}

/// Offset of the first `</tag` (case-insensitive) in `html`
fn closing_tag(html: &str, tag: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(rel) = html[from..].find("</") {
        let at = from + rel;
        let name = html.get(at + 2..at + 2 + tag.len());
        if name.is_some_and(|n| n.eq_ignore_ascii_case(tag)) {
            return Some(at);
        }
        from = at + 2;
    }
    None
}

fn parse_start_tag(html: &str, start: usize) -> Option<Element> {
    let bytes = html.as_bytes();
    let mut i = start + 1;

    let name_start = i;
    while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
        i += 1;
    }
    if i == name_start {
        // closing tag, comment, doctype
        return None;
    }
    let name = html[name_start..i].to_ascii_lowercase();
    let mut attrs = Vec::new();

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        match bytes.get(i)? {
            b'>' => {
                return Some(Element {
                    name,
                    attrs,
                    start,
                    end: i + 1,
                })
            }
            b'/' => {
                i += 1;
                continue;
            }
            _ => {}
        }

        let key_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && !matches!(bytes[i], b'=' | b'>' | b'/')
        {
            i += 1;
        }
        let key = html[key_start..i].to_ascii_lowercase();

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes.get(i) != Some(&b'=') {
            attrs.push((key, String::new()));
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let value = match bytes.get(i)? {
            quote @ (b'"' | b'\'') => {
                let value_start = i + 1;
                let len = html[value_start..].find(*quote as char)?;
                i = value_start + len + 1;
                &html[value_start..value_start + len]
            }
            _ => {
                let value_start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                    i += 1;
                }
                &html[value_start..i]
            }
        };
        attrs.push((key, decode_entities(value)));
    }
}

/// Drop tags and collapse whitespace
pub fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;

    for ch in s.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    decode_entities(&out)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchors_with_mixed_quoting() {
        let html = r#"<p><A HREF="one.zip">1</A> <a href='two.zip' ga_cat=download>2</a>
            <a name="x">no href</a></p>"#;
        let found = anchors(html);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].attr("href"), Some("one.zip"));
        assert_eq!(found[1].attr("href"), Some("two.zip"));
        assert_eq!(found[1].attr("GA_CAT"), Some("download"));
    }

    #[test]
    fn entities_in_attributes_are_decoded() {
        let html = r#"<a href="get?a=1&amp;b=2">x</a>"#;
        assert_eq!(anchors(html)[0].attr("href"), Some("get?a=1&b=2"));
    }

    #[test]
    fn comment_contents_are_not_special() {
        let html = "<!-- <a href=\"hidden\"> --></a><a href=\"shown\">";
        // Comment contents are not parsed specially; both hrefs are visible
        let hrefs: Vec<_> = anchors(html)
            .iter()
            .map(|a| a.attr("href").unwrap().to_string())
            .collect();
        assert_eq!(hrefs, vec!["hidden", "shown"]);
    }

    #[test]
    fn next_text_finds_following_label() {
        let html = r#"<a href="a.zip">a</a><span class="size">1 MB</span>
            <span class="build-var"> cycles-x <b>!</b></span>"#;
        let anchor = &anchors(html)[0];
        assert_eq!(
            next_text(html, anchor.end, "span", "build-var").as_deref(),
            Some("cycles-x !")
        );
        assert_eq!(next_text(html, anchor.end, "span", "missing"), None);
    }

    #[test]
    fn closing_tag_match_ignores_case_and_other_tags() {
        let html = "label <b>bold</B> more</SPAN><span>next</span>";
        assert_eq!(closing_tag(html, "span"), Some(22));
        assert_eq!(closing_tag("é</i>", "span"), None);
        assert_eq!(closing_tag("no close", "span"), None);

        let html = r#"<span class="build-var">Cycles <I>X</I></Span> tail"#;
        assert_eq!(next_text(html, 0, "span", "build-var").as_deref(), Some("Cycles X"));
    }

    #[test]
    fn unterminated_tag_is_ignored() {
        assert!(anchors("<a href=\"x.zip\"").is_empty());
    }
}
