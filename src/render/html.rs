//! HTML backend
//!
//! Produces HTML fragments. Math is emitted as escaped LaTeX inside
//! `<span class="inline-math">` / `<span class="display-math">` for
//! client-side typesetting, with equation numbers injected via `\tag*{...}`.

use std::fmt::Write;

use super::{
    html_escape, FloatInfo, HeadingInfo, LinkKind, ListInfo, MathInfo, RenderedEndnoteGroup,
    RenderedItem, Renderer,
};
use crate::config::HtmlOptions;
use crate::core::catalogue::{ListKind, TextFormat};
use crate::features::Footnote;

/// Block roles that map to their own HTML element.
const SEMANTIC_ELEMENTS: &[&str] = &["section", "main", "article", "aside", "blockquote"];

#[derive(Debug, Clone, Default)]
pub struct HtmlRenderer {
    options: HtmlOptions,
}

impl HtmlRenderer {
    pub fn new(options: HtmlOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &HtmlOptions {
        &self.options
    }

    fn wrap(&self, tag: &str, attrs: &[(&str, &str)], content: &str) -> String {
        let mut out = String::with_capacity(content.len() + 32);
        out.push('<');
        out.push_str(tag);
        for (name, value) in attrs {
            let _ = write!(out, " {}=\"{}\"", name, html_escape(value));
        }
        out.push('>');
        out.push_str(content);
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
        out
    }
}

impl Renderer for HtmlRenderer {
    type Output = String;

    fn name(&self) -> &'static str {
        "html"
    }

    fn render_value(&self, text: &str) -> String {
        html_escape(text)
    }

    fn render_nothing(&self) -> String {
        String::new()
    }

    fn is_empty(&self, output: &String) -> bool {
        output.trim().is_empty()
    }

    fn join(&self, parts: Vec<String>) -> String {
        parts.concat()
    }

    fn join_blocks(&self, blocks: Vec<String>) -> String {
        blocks
            .into_iter()
            .filter(|b| !b.is_empty())
            .collect::<Vec<_>>()
            .join(&self.options.block_separator)
    }

    fn render_paragraph(&self, content: String) -> String {
        self.wrap("p", &[], &content)
    }

    fn render_text_format(&self, format: TextFormat, content: String) -> String {
        let tag = match format {
            TextFormat::Emph => "em",
            TextFormat::Italic => "i",
            TextFormat::Bold => "strong",
        };
        self.wrap(tag, &[], &content)
    }

    fn render_heading(&self, heading: &HeadingInfo<'_>, title: String) -> String {
        let mut class = format!("heading-level-{}", heading.level);
        if heading.inline {
            class.push_str(" heading-inline");
        }
        let mut attrs = vec![("class", class.as_str())];
        if let Some(id) = heading.target_id {
            attrs.push(("id", id));
        }
        let content = match heading.number {
            Some(number) => format!(
                "<span class=\"heading-number\">{}</span> {}",
                html_escape(number),
                title
            ),
            None => title,
        };
        self.wrap(self.options.heading_tag(heading.level), &attrs, &content)
    }

    fn render_list(&self, list: &ListInfo, items: Vec<RenderedItem<String>>) -> String {
        let (tag, class) = match list.kind {
            ListKind::Itemize => ("ul", "itemize"),
            ListKind::Enumerate => ("ol", "enumerate"),
        };
        let depth = list.depth.to_string();
        let items: Vec<String> = items
            .into_iter()
            .map(|item| {
                let content = format!(
                    "<span class=\"item-tag\">{}</span> {}",
                    item.tag, item.content
                );
                self.wrap("li", &[], &content)
            })
            .collect();
        let content = format!("\n{}\n", items.join("\n"));
        self.wrap(tag, &[("class", class), ("data-depth", depth.as_str())], &content)
    }

    fn render_link(&self, kind: LinkKind, href: &str, display: String) -> String {
        let class = format!("href-{}", kind.as_str());
        self.wrap("a", &[("href", href), ("class", class.as_str())], &display)
    }

    fn render_math(&self, math: &MathInfo<'_>) -> String {
        if !math.display {
            let latex = math
                .lines
                .iter()
                .map(|l| l.latex.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            return self.wrap(
                "span",
                &[("class", "inline-math")],
                &html_escape(&format!("\\({}\\)", latex)),
            );
        }

        let source = match math.starred_env() {
            Some(env) => format!("\\begin{{{env}}}\n{}\n\\end{{{env}}}", math.tagged_latex()),
            None => format!("\\[ {} \\]", math.tagged_latex()),
        };
        let mut class = "display-math".to_string();
        if let Some(env) = math.env {
            let _ = write!(class, " env-{}", env.replace('*', "-star"));
        }

        // first target id goes on the element, the rest get empty anchors
        let mut ids = math.lines.iter().filter_map(|l| l.target_id.as_deref());
        let first = ids.next();
        let mut out = String::new();
        for id in ids {
            out.push_str(&self.wrap("span", &[("id", id)], ""));
        }
        let mut attrs = vec![("class", class.as_str())];
        if let Some(id) = first {
            attrs.push(("id", id));
        }
        out.push_str(&self.wrap("span", &attrs, &html_escape(&source)));
        out
    }

    fn render_verbatim(&self, text: &str, code: bool, block: bool) -> String {
        let class = if code { "verbatim-code" } else { "verbatim-text" };
        match (block, code) {
            (false, true) => self.wrap("code", &[("class", class)], &html_escape(text)),
            (false, false) => self.wrap("span", &[("class", class)], &html_escape(text)),
            (true, true) => self.wrap(
                "pre",
                &[("class", class)],
                &self.wrap("code", &[], &html_escape(text)),
            ),
            (true, false) => self.wrap("pre", &[("class", class)], &html_escape(text)),
        }
    }

    fn render_float(
        &self,
        float: &FloatInfo<'_>,
        content: String,
        caption: Option<String>,
    ) -> String {
        let mut number = html_escape(float.display);
        if self.options.nbsp_in_figure_numbers {
            if let Some(i) = number.rfind(' ') {
                number.replace_range(i..i + 1, "&nbsp;");
            }
        }
        let mut caption_content = self.wrap("span", &[("class", "float-number")], &number);
        if let Some(caption) = caption {
            caption_content.push_str(": ");
            caption_content.push_str(&caption);
        }
        let figcaption = self.wrap(
            "figcaption",
            &[("class", "float-caption-content")],
            &self.wrap("span", &[], &caption_content),
        );
        let body = self.join_blocks(vec![content, figcaption]);
        let class = format!("float float-{}", float.kind.as_str());
        self.wrap(
            "figure",
            &[("id", float.target_id), ("class", class.as_str())],
            &body,
        )
    }

    fn render_graphics(&self, src: &str, options: Option<&str>) -> String {
        let mut out = format!("<img src=\"{}\" class=\"includegraphics\"", html_escape(src));
        if let Some(options) = options.filter(|o| !o.is_empty()) {
            let _ = write!(out, " data-options=\"{}\"", html_escape(options));
        }
        out.push_str(" />");
        out
    }

    fn render_defterm(&self, term: String, target_id: &str, body: String) -> String {
        let term = self.wrap("dfn", &[("class", "defterm-term")], &term);
        let body = self.wrap("div", &[("class", "defterm-body")], &body);
        self.wrap(
            "div",
            &[("id", target_id), ("class", "defterm")],
            &self.join_blocks(vec![term, body]),
        )
    }

    fn render_semantic_block(&self, role: &str, content: String) -> String {
        if role == "quote" {
            self.wrap("blockquote", &[("class", role)], &content)
        } else if SEMANTIC_ELEMENTS.contains(&role) {
            self.wrap(role, &[], &content)
        } else {
            self.wrap("div", &[("class", role)], &content)
        }
    }

    fn render_footnote_mark(&self, note: &Footnote) -> String {
        let href = format!("#{}", note.target_id());
        self.wrap(
            "a",
            &[("href", href.as_str()), ("class", "href-endnote endnote-mark")],
            &html_escape(&note.marker),
        )
    }

    fn render_footnote_inline(&self, note: &Footnote, body: String) -> String {
        let id = note.target_id();
        let marker = self.wrap("span", &[("class", "footnote-marker")], &html_escape(&note.marker));
        self.wrap(
            "span",
            &[("id", id.as_str()), ("class", "footnote-inline")],
            &format!("{} {}", marker, body),
        )
    }

    fn render_endnotes_list(
        &self,
        category: &str,
        title: Option<(&str, u8)>,
        groups: Vec<RenderedEndnoteGroup<String>>,
    ) -> String {
        let mut blocks = Vec::new();
        if let Some((title, level)) = title {
            blocks.push(self.wrap(
                self.options.heading_tag(level),
                &[("class", "endnotes-title")],
                &html_escape(title),
            ));
        }
        for group in groups {
            if let Some((heading, level)) = group.heading {
                blocks.push(self.wrap(
                    self.options.heading_tag(level),
                    &[("class", "endnotes-category")],
                    &heading,
                ));
            }
            let notes: Vec<String> = group
                .notes
                .into_iter()
                .map(|note| {
                    let marker = self.wrap(
                        "span",
                        &[("class", "endnote-marker")],
                        &html_escape(&note.marker),
                    );
                    self.wrap(
                        "li",
                        &[("id", note.target_id.as_str())],
                        &format!("{} {}", marker, note.body),
                    )
                })
                .collect();
            blocks.push(self.wrap(
                "ol",
                &[("class", "endnotes")],
                &format!("\n{}\n", notes.join("\n")),
            ));
        }
        let class = format!("endnotes endnotes-{}", category);
        self.wrap(
            "div",
            &[("class", class.as_str())],
            &format!("\n{}\n", self.join_blocks(blocks)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalogue::FloatKind;
    use crate::render::MathLine;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wrap_escapes_attributes() {
        let html = HtmlRenderer::default();
        assert_eq!(
            html.render_link(LinkKind::External, "https://x.org/?a=1&b=2", "x".to_string()),
            r#"<a href="https://x.org/?a=1&amp;b=2" class="href-href">x</a>"#
        );
    }

    #[test]
    fn test_inline_heading() {
        let html = HtmlRenderer::default();
        let heading = HeadingInfo {
            level: 4,
            number: None,
            target_id: Some("sec--Aside"),
            inline: true,
        };
        assert_eq!(
            html.render_heading(&heading, "Aside".to_string()),
            r#"<span class="heading-level-4 heading-inline" id="sec--Aside">Aside</span>"#
        );
    }

    #[test]
    fn test_display_math_with_two_numbered_lines() {
        let html = HtmlRenderer::default();
        let math = MathInfo {
            display: true,
            env: Some("align"),
            lines: vec![
                MathLine {
                    latex: "a &= b".to_string(),
                    tag: Some("(1)".to_string()),
                    target_id: Some("equation-1".to_string()),
                },
                MathLine {
                    latex: "c &< d".to_string(),
                    tag: Some("(2)".to_string()),
                    target_id: Some("equation-2".to_string()),
                },
            ],
        };
        let out = html.render_math(&math);
        assert!(out.starts_with(r#"<span id="equation-2"></span><span class="display-math env-align" id="equation-1">"#));
        assert!(out.contains(r"\begin{align*}"));
        assert!(out.contains(r"c &amp;&lt; d \tag*{(2)}"));
    }

    #[test]
    fn test_figure_number_uses_nbsp() {
        let html = HtmlRenderer::default();
        let figure = FloatInfo {
            kind: FloatKind::Figure,
            display: "Figure 2",
            target_id: "figure-2",
        };
        let out = html.render_float(&figure, "<p>x</p>".to_string(), Some("Cap".to_string()));
        assert!(out.starts_with(r#"<figure id="figure-2" class="float float-figure"><p>x</p>"#));
        assert!(out.contains(r#"<span class="float-number">Figure&nbsp;2</span>: Cap"#));
    }

    #[test]
    fn test_table_float_class() {
        let html = HtmlRenderer::default();
        let table = FloatInfo {
            kind: FloatKind::Table,
            display: "Table 1",
            target_id: "table-1",
        };
        let out = html.render_float(&table, "x".to_string(), None);
        assert!(out.starts_with(r#"<figure id="table-1" class="float float-table">x"#));
        assert!(out.contains(r#"<span class="float-number">Table&nbsp;1</span></span>"#));
    }

    #[test]
    fn test_quote_blocks() {
        let html = HtmlRenderer::default();
        assert_eq!(
            html.render_semantic_block("quote", "<p>q</p>".to_string()),
            r#"<blockquote class="quote"><p>q</p></blockquote>"#
        );
        assert_eq!(
            html.render_semantic_block("blockquote", "q".to_string()),
            "<blockquote>q</blockquote>"
        );
    }
}
