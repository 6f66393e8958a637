//! Plain-text backend
//!
//! A readable approximation of the document: headings are underlined, lists
//! are indented with right-aligned tags, emphasis is bracketed with `_` and
//! bold is dropped. Output never contains HTML entities.

use super::{
    FloatInfo, HeadingInfo, LinkKind, ListInfo, MathInfo, RenderedEndnoteGroup, RenderedItem,
    Renderer,
};
use crate::config::TextOptions;
use crate::core::catalogue::TextFormat;
use crate::features::Footnote;

/// Underline characters for heading levels 1-3
const UNDERLINES: [char; 3] = ['=', '-', '~'];

const FLOAT_RULE: char = '·';

#[derive(Debug, Clone, Default)]
pub struct TextRenderer {
    options: TextOptions,
}

impl TextRenderer {
    pub fn new(options: TextOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TextOptions {
        &self.options
    }

    fn underline(&self, title: &str, level: u8) -> String {
        let c = UNDERLINES[(level.clamp(1, 3) - 1) as usize];
        let len = title.lines().map(width).max().unwrap_or(0);
        format!("{}\n{}", title, c.to_string().repeat(len))
    }

    fn rule(&self) -> String {
        FLOAT_RULE.to_string().repeat(self.options.float_rule_width)
    }
}

/// Display width in characters.
fn width(text: &str) -> usize {
    text.chars().count()
}

/// Indent every line but the first by `n` spaces.
fn hang(text: &str, n: usize) -> String {
    let pad = " ".repeat(n);
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
            if !line.is_empty() {
                out.push_str(&pad);
            }
        }
        out.push_str(line);
    }
    out
}

impl Renderer for TextRenderer {
    type Output = String;

    fn name(&self) -> &'static str {
        "text"
    }

    fn render_value(&self, text: &str) -> String {
        text.to_string()
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
        content
    }

    fn render_text_format(&self, format: TextFormat, content: String) -> String {
        match format {
            TextFormat::Emph | TextFormat::Italic => format!("_{}_", content),
            TextFormat::Bold => content,
        }
    }

    fn render_heading(&self, heading: &HeadingInfo<'_>, title: String) -> String {
        let title = match heading.number {
            Some(number) => format!("{} {}", number, title),
            None => title,
        };
        if heading.inline {
            format!("{}:", title)
        } else {
            self.underline(&title, heading.level)
        }
    }

    fn render_list(&self, _list: &ListInfo, items: Vec<RenderedItem<String>>) -> String {
        let tag_width = items.iter().map(|i| width(&i.tag)).max().unwrap_or(0);
        let prefix = (tag_width + 3).max(self.options.list_indent);
        let lines: Vec<String> = items
            .into_iter()
            .map(|item| {
                let pad = " ".repeat(prefix - 1 - width(&item.tag));
                format!("{}{} {}", pad, item.tag, hang(&item.content, prefix))
            })
            .collect();
        lines.join("\n")
    }

    fn render_link(&self, kind: LinkKind, href: &str, display: String) -> String {
        if kind == LinkKind::External && self.options.show_urls && display != href {
            format!("{} <{}>", display, href)
        } else {
            display
        }
    }

    fn render_math(&self, math: &MathInfo<'_>) -> String {
        if !math.display {
            let latex: Vec<&str> = math.lines.iter().map(|l| l.latex.as_str()).collect();
            return format!("\\({}\\)", latex.join(" "));
        }
        math.lines
            .iter()
            .map(|line| match &line.tag {
                Some(tag) => format!("    {}    {}", line.latex, tag),
                None => format!("    {}", line.latex),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn render_verbatim(&self, text: &str, _code: bool, _block: bool) -> String {
        text.to_string()
    }

    fn render_float(
        &self,
        float: &FloatInfo<'_>,
        content: String,
        caption: Option<String>,
    ) -> String {
        let caption = match caption {
            Some(caption) => format!("{}: {}", float.display, caption),
            None => float.display.to_string(),
        };
        [self.rule(), content, caption, self.rule()]
            .into_iter()
            .filter(|b| !b.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn render_graphics(&self, src: &str, _options: Option<&str>) -> String {
        format!("[{}]", src)
    }

    fn render_defterm(&self, term: String, _target_id: &str, body: String) -> String {
        format!("{}:\n{}", term, body)
    }

    fn render_semantic_block(&self, _role: &str, content: String) -> String {
        content
    }

    fn render_footnote_mark(&self, note: &Footnote) -> String {
        format!("[{}]", note.marker)
    }

    fn render_footnote_inline(&self, note: &Footnote, body: String) -> String {
        format!("[{}: {}]", note.marker, body)
    }

    fn render_endnotes_list(
        &self,
        _category: &str,
        title: Option<(&str, u8)>,
        groups: Vec<RenderedEndnoteGroup<String>>,
    ) -> String {
        let mut blocks = Vec::new();
        if let Some((title, level)) = title {
            blocks.push(self.underline(title, level));
        }
        for group in groups {
            if let Some((heading, level)) = group.heading {
                blocks.push(self.underline(&heading, level));
            }
            let marker_width = group
                .notes
                .iter()
                .map(|n| width(&n.marker))
                .max()
                .unwrap_or(0);
            let prefix = marker_width + 3;
            let notes: Vec<String> = group
                .notes
                .into_iter()
                .map(|note| {
                    let pad = " ".repeat(prefix - 3 - width(&note.marker));
                    format!("{}[{}] {}", pad, note.marker, hang(&note.body, prefix))
                })
                .collect();
            blocks.push(notes.join("\n"));
        }
        self.join_blocks(blocks)
    }
}
