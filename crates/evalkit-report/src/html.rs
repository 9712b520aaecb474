use crate::content::escape_html;
use crate::svg::render_svg;
use evalkit_core::AppResult;
use evalkit_eval::Figure;

/// One titled block of the report: an HTML body, its figures, and nested
/// sub-sections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportSection {
    pub title: String,
    pub body: String,
    pub figures: Vec<(String, Figure)>,
    pub children: Vec<ReportSection>,
}

impl ReportSection {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
            && self.figures.is_empty()
            && self.children.iter().all(ReportSection::is_empty)
    }
}

fn anchor(number: &[usize]) -> String {
    let parts: Vec<String> = number.iter().map(usize::to_string).collect();
    format!("section-{}", parts.join("-"))
}

fn label(number: &[usize]) -> String {
    let parts: Vec<String> = number.iter().map(usize::to_string).collect();
    parts.join(".")
}

const STYLE: &str = "body{font-family:sans-serif;margin:2em;color:#222}\
nav ul{list-style:none;padding-left:1em}\
table.metrics{border-collapse:collapse;margin:0.5em 0}\
table.metrics td,table.metrics th{border:1px solid #ccc;padding:0.2em 0.6em;text-align:left}\
figure{margin:1em 0}";

/// Renders sections into one HTML document with a numbered table of
/// contents.
pub fn render_html(title: &str, sections: &[ReportSection]) -> AppResult<String> {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str(&format!("<title>{}</title>\n", escape_html(title)));
    out.push_str(&format!("<style>{STYLE}</style>\n</head>\n<body>\n"));
    out.push_str(&format!("<h1>{}</h1>\n", escape_html(title)));

    out.push_str("<nav class=\"toc\">\n");
    push_toc(&mut out, sections, &mut Vec::new());
    out.push_str("</nav>\n");

    let mut number = Vec::new();
    for (idx, section) in sections.iter().enumerate() {
        number.push(idx + 1);
        push_section(&mut out, section, &mut number)?;
        number.pop();
    }
    out.push_str("</body>\n</html>\n");
    Ok(out)
}

fn push_toc(out: &mut String, sections: &[ReportSection], number: &mut Vec<usize>) {
    if sections.is_empty() {
        return;
    }
    out.push_str("<ul>\n");
    for (idx, section) in sections.iter().enumerate() {
        number.push(idx + 1);
        out.push_str(&format!(
            "<li><a href=\"#{}\">{} {}</a>",
            anchor(number),
            label(number),
            escape_html(&section.title)
        ));
        if !section.children.is_empty() {
            out.push('\n');
            push_toc(out, &section.children, number);
        }
        out.push_str("</li>\n");
        number.pop();
    }
    out.push_str("</ul>\n");
}

fn push_section(out: &mut String, section: &ReportSection, number: &mut Vec<usize>) -> AppResult<()> {
    let level = (number.len() + 1).min(6);
    out.push_str(&format!("<section id=\"{}\">\n", anchor(number)));
    out.push_str(&format!(
        "<h{level}>{} {}</h{level}>\n",
        label(number),
        escape_html(&section.title)
    ));
    out.push_str(&section.body);
    for (name, figure) in &section.figures {
        out.push_str(&format!(
            "<figure data-name=\"{}\">\n{}\n<figcaption>{}</figcaption>\n</figure>\n",
            escape_html(name),
            render_svg(figure)?,
            escape_html(&figure.title)
        ));
    }
    for (idx, child) in section.children.iter().enumerate() {
        number.push(idx + 1);
        push_section(out, child, number)?;
        number.pop();
    }
    out.push_str("</section>\n");
    Ok(())
}
