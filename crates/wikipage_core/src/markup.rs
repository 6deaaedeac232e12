use std::borrow::Cow;

use anyhow::{Result, bail};
use pulldown_cmark::{Event, Options, Parser, html};
use scraper::{ElementRef, Html, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Markdown,
    Html,
}

impl InputFormat {
    pub fn parse(value: &str) -> Result<Self> {
        if value.eq_ignore_ascii_case("markdown") || value.eq_ignore_ascii_case("md") {
            return Ok(Self::Markdown);
        }
        if value.eq_ignore_ascii_case("html") || value.eq_ignore_ascii_case("storage") {
            return Ok(Self::Html);
        }
        bail!("unsupported input format: {value} (expected markdown|html)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Markdown,
    Storage,
    View,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Result<Self> {
        if value.eq_ignore_ascii_case("markdown") || value.eq_ignore_ascii_case("md") {
            return Ok(Self::Markdown);
        }
        if value.eq_ignore_ascii_case("storage") {
            return Ok(Self::Storage);
        }
        if value.eq_ignore_ascii_case("view") {
            return Ok(Self::View);
        }
        bail!("unsupported output format: {value} (expected markdown|storage|view)")
    }
}

/// Render Markdown as storage markup. Single newlines become `<br />`.
pub fn markdown_to_storage(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);

    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });
    let mut output = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut output, parser);
    output
}

/// Best-effort conversion of storage markup to ATX-heading Markdown.
pub fn storage_to_markdown(storage: &str) -> String {
    let fragment = Html::parse_fragment(&escape_cdata(storage));
    let mut writer = MarkdownWriter::default();
    writer.children(fragment.root_element());
    writer.finish()
}

#[derive(Debug, Clone, Copy)]
enum ListState {
    Unordered,
    Ordered(usize),
}

#[derive(Debug, Default)]
struct MarkdownWriter {
    output: String,
    lists: Vec<ListState>,
    in_pre: bool,
}

impl MarkdownWriter {
    fn children(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.text(text),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.element(child);
                    }
                }
                _ => {}
            }
        }
    }

    fn text(&mut self, text: &str) {
        if self.in_pre {
            self.output.push_str(text);
        } else {
            push_inline_text(&mut self.output, text);
        }
    }

    fn element(&mut self, element: ElementRef<'_>) {
        let name = element.value().name();
        if let Some(level) = heading_level(name) {
            self.start_block();
            self.output.push_str(&"#".repeat(level));
            self.output.push(' ');
            self.children(element);
            self.end_block();
            return;
        }

        match name {
            "p" | "div" | "table" => {
                self.start_block();
                self.children(element);
                self.end_block();
            }
            "br" => self.output.push('\n'),
            "hr" => {
                self.start_block();
                self.output.push_str("---");
                self.end_block();
            }
            "strong" | "b" => self.wrap(element, "**"),
            "em" | "i" => self.wrap(element, "*"),
            "s" | "del" => self.wrap(element, "~~"),
            "code" if !self.in_pre => self.wrap(element, "`"),
            "pre" => self.code_block(element, None),
            "a" => {
                let href = element.value().attr("href").unwrap_or_default().to_string();
                self.output.push('[');
                self.children(element);
                self.output.push_str(&format!("]({href})"));
            }
            "ul" => self.list(element, ListState::Unordered),
            "ol" => self.list(element, ListState::Ordered(0)),
            "li" => {
                self.start_line();
                let depth = self.lists.len().saturating_sub(1);
                self.output.push_str(&"  ".repeat(depth));
                match self.lists.last_mut() {
                    Some(ListState::Ordered(counter)) => {
                        *counter += 1;
                        self.output.push_str(&format!("{counter}. "));
                    }
                    _ => self.output.push_str("- "),
                }
                self.children(element);
            }
            "tr" => {
                self.start_line();
                self.output.push('|');
                self.children(element);
            }
            "td" | "th" => {
                self.output.push(' ');
                self.children(element);
                self.output.push_str(" |");
            }
            // macro parameters are settings, not page text
            "ac:parameter" => {}
            "ac:plain-text-body" => {
                let language = macro_language(element);
                self.code_block(element, language.as_deref());
            }
            _ => self.children(element),
        }
    }

    fn wrap(&mut self, element: ElementRef<'_>, marker: &str) {
        self.output.push_str(marker);
        self.children(element);
        self.output.push_str(marker);
    }

    fn code_block(&mut self, element: ElementRef<'_>, language: Option<&str>) {
        self.start_block();
        self.output.push_str("```");
        self.output.push_str(language.unwrap_or_default());
        self.output.push('\n');
        self.in_pre = true;
        self.children(element);
        self.in_pre = false;
        if !self.output.ends_with('\n') {
            self.output.push('\n');
        }
        self.output.push_str("```");
        self.end_block();
    }

    fn list(&mut self, element: ElementRef<'_>, state: ListState) {
        if self.lists.is_empty() {
            self.start_block();
        }
        self.lists.push(state);
        self.children(element);
        self.lists.pop();
        if self.lists.is_empty() {
            self.end_block();
        }
    }

    fn start_line(&mut self) {
        if !self.output.is_empty() && !self.output.ends_with('\n') {
            self.output.push('\n');
        }
    }

    fn start_block(&mut self) {
        if self.output.is_empty() {
            return;
        }
        while !self.output.ends_with("\n\n") {
            self.output.push('\n');
        }
    }

    fn end_block(&mut self) {
        self.output.push_str("\n\n");
    }

    fn finish(self) -> String {
        let trimmed = self.output.trim();
        let mut result = String::with_capacity(trimmed.len() + 1);
        let mut blank_run = 0usize;
        for line in trimmed.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                blank_run += 1;
                if blank_run > 1 {
                    continue;
                }
            } else {
                blank_run = 0;
            }
            result.push_str(line);
            result.push('\n');
        }
        result
    }
}

/// Language named by the enclosing code macro, if any.
fn macro_language(body: ElementRef<'_>) -> Option<String> {
    let parent = body.parent().and_then(ElementRef::wrap)?;
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .find(|child| {
            child.value().name() == "ac:parameter"
                && child.value().attr("ac:name") == Some("language")
        })
        .map(|parameter| parameter.text().collect::<String>().trim().to_string())
        .filter(|language| !language.is_empty())
}

// The HTML parser only honours CDATA inside SVG and MathML; anywhere else it becomes a
// comment. Code macros keep their body in CDATA, so turn those sections into escaped text.
fn escape_cdata(storage: &str) -> Cow<'_, str> {
    const OPEN: &str = "<![CDATA[";
    const CLOSE: &str = "]]>";

    if !storage.contains(OPEN) {
        return Cow::Borrowed(storage);
    }
    let mut output = String::with_capacity(storage.len());
    let mut rest = storage;
    while let Some(start) = rest.find(OPEN) {
        output.push_str(&rest[..start]);
        let body = &rest[start + OPEN.len()..];
        let end = body.find(CLOSE).unwrap_or(body.len());
        for character in body[..end].chars() {
            match character {
                '&' => output.push_str("&amp;"),
                '<' => output.push_str("&lt;"),
                '>' => output.push_str("&gt;"),
                other => output.push(other),
            }
        }
        rest = body.get(end + CLOSE.len()..).unwrap_or_default();
    }
    output.push_str(rest);
    Cow::Owned(output)
}

fn heading_level(name: &str) -> Option<usize> {
    let level = name.strip_prefix('h')?.parse::<usize>().ok()?;
    (1..=6).contains(&level).then_some(level)
}

fn push_inline_text(output: &mut String, text: &str) {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        if !text.is_empty() && !output.is_empty() && !output.ends_with([' ', '\n']) {
            output.push(' ');
        }
        return;
    }
    if text.starts_with(char::is_whitespace) && !output.is_empty() && !output.ends_with([' ', '\n'])
    {
        output.push(' ');
    }
    output.push_str(&collapsed);
    if text.ends_with(char::is_whitespace) {
        output.push(' ');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_parse_case_insensitively() {
        assert_eq!(InputFormat::parse("HTML").expect("html"), InputFormat::Html);
        assert_eq!(
            InputFormat::parse("md").expect("md"),
            InputFormat::Markdown
        );
        assert_eq!(
            OutputFormat::parse("Storage").expect("storage"),
            OutputFormat::Storage
        );
        assert!(OutputFormat::parse("pdf").is_err());
        assert!(InputFormat::parse("rtf").is_err());
    }

    #[test]
    fn markdown_renders_headings_tables_and_line_breaks() {
        let storage = markdown_to_storage(
            "# Title\n\nline one\nline two\n\n| a | b |\n|---|---|\n| 1 | 2 |\n",
        );
        assert!(storage.contains("<h1>Title</h1>"));
        assert!(storage.contains("line one<br />"));
        assert!(storage.contains("<table>"));
        assert!(storage.contains("<td>2</td>"));
    }

    #[test]
    fn storage_headings_and_paragraphs_become_markdown() {
        let markdown = storage_to_markdown(
            "<h2>Setup</h2><p>Run the <strong>installer</strong> &amp; reboot.</p>",
        );
        assert_eq!(markdown, "## Setup\n\nRun the **installer** & reboot.\n");
    }

    #[test]
    fn storage_lists_keep_numbering_and_nesting() {
        let markdown = storage_to_markdown(
            "<ol><li>first</li><li>second<ul><li>inner</li></ul></li></ol>",
        );
        assert_eq!(markdown, "1. first\n2. second\n  - inner\n");
    }

    #[test]
    fn storage_links_and_code_are_preserved() {
        let markdown = storage_to_markdown(
            "<p>See <a href=\"https://example.com/a?b=1&amp;c=2\">docs</a> and <code>cargo</code>.</p>\
             <pre>fn main() {}\n</pre>",
        );
        assert!(markdown.contains("[docs](https://example.com/a?b=1&c=2)"));
        assert!(markdown.contains("`cargo`"));
        assert!(markdown.contains("```\nfn main() {}\n```"));
    }

    #[test]
    fn storage_tables_become_pipe_rows() {
        let markdown = storage_to_markdown(
            "<table><tbody><tr><th>k</th><th>v</th></tr><tr><td>a</td><td>1</td></tr></tbody></table>",
        );
        assert_eq!(markdown, "| k | v |\n| a | 1 |\n");
    }

    #[test]
    fn numeric_and_named_entities_are_decoded() {
        let markdown = storage_to_markdown("<p>a &#8212; b &#x27;q&#x27; &hellip;</p>");
        assert_eq!(markdown, "a \u{2014} b 'q' \u{2026}\n");
    }

    #[test]
    fn code_macro_body_in_cdata_becomes_a_fenced_block() {
        let markdown = storage_to_markdown(
            "<ac:structured-macro ac:name=\"code\">\
             <ac:parameter ac:name=\"language\">rust</ac:parameter>\
             <ac:plain-text-body><![CDATA[let x = 1;\nif x > 0 && x < 2 {}]]></ac:plain-text-body>\
             </ac:structured-macro>",
        );
        assert_eq!(markdown, "```rust\nlet x = 1;\nif x > 0 && x < 2 {}\n```\n");
    }

    #[test]
    fn comments_are_skipped_even_when_they_contain_angle_brackets() {
        let markdown = storage_to_markdown("<p>keep</p><!-- a > b --><p>next</p>");
        assert_eq!(markdown, "keep\n\nnext\n");
    }

    #[test]
    fn unknown_macros_are_dropped_but_text_survives() {
        let markdown = storage_to_markdown(
            "<ac:structured-macro ac:name=\"info\"><ac:rich-text-body><p>note</p></ac:rich-text-body></ac:structured-macro>",
        );
        assert_eq!(markdown, "note\n");
    }
}
