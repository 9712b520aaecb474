use evalkit_core::{AppError, AppResult};
use evalkit_eval::value::lookup;
use evalkit_eval::{Evaluator, MetricValue, Metrics};
use once_cell::unsync::OnceCell;
use regex::Regex;
use std::collections::BTreeMap;
use std::rc::Rc;

const PLACEHOLDER: &str = r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}";
const MISSING_VALUE: &str = "n/a";

/// Produces an HTML fragment. An empty fragment means "nothing to show".
pub trait ContentGenerator {
    fn generate_content(&self) -> AppResult<String>;

    fn equal(&self, other: &dyn ContentGenerator) -> AppResult<bool> {
        Ok(self.generate_content()? == other.generate_content()?)
    }
}

impl<C: ContentGenerator + ?Sized> ContentGenerator for Rc<C> {
    fn generate_content(&self) -> AppResult<String> {
        (**self).generate_content()
    }
}

impl<C: ContentGenerator + ?Sized> ContentGenerator for Box<C> {
    fn generate_content(&self) -> AppResult<String> {
        (**self).generate_content()
    }
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Key(String),
}

/// A text template with `{{ key }}` placeholders. Dotted keys reach into
/// nested results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> AppResult<Self> {
        let re = Regex::new(PLACEHOLDER)
            .map_err(|e| AppError::internal(format!("placeholder pattern error: {e}")))?;
        let mut segments = Vec::new();
        let mut last = 0;
        for caps in re.captures_iter(source) {
            let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            push_text(&mut segments, &source[last..whole.start()])?;
            segments.push(Segment::Key(key.as_str().to_string()));
            last = whole.end();
        }
        push_text(&mut segments, &source[last..])?;
        Ok(Self { segments })
    }

    pub fn keys(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Key(k) => Some(k.as_str()),
                Segment::Text(_) => None,
            })
            .collect()
    }

    pub fn render(&self, metrics: &Metrics) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Key(key) => match lookup(metrics, key) {
                    Some(value) => out.push_str(&escape_html(&value.render())),
                    None => out.push_str(MISSING_VALUE),
                },
            }
        }
        out
    }
}

fn push_text(segments: &mut Vec<Segment>, text: &str) -> AppResult<()> {
    if text.contains("{{") || text.contains("}}") {
        return Err(AppError::validation(format!(
            "malformed template placeholder near '{}'",
            text.chars().take(40).collect::<String>()
        )));
    }
    if !text.is_empty() {
        segments.push(Segment::Text(text.to_string()));
    }
    Ok(())
}

/// Fills a template from an evaluator's metrics.
pub struct TemplateContent {
    template: Template,
    evaluator: Rc<dyn Evaluator>,
}

impl TemplateContent {
    pub fn new(template: Template, evaluator: Rc<dyn Evaluator>) -> Self {
        Self {
            template,
            evaluator,
        }
    }
}

impl ContentGenerator for TemplateContent {
    fn generate_content(&self) -> AppResult<String> {
        let metrics = self.evaluator.evaluate()?;
        if metrics.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("<p>{}</p>\n", self.template.render(&metrics)))
    }
}

/// Two-column table of every metric; nested keys are joined with dots.
pub struct MetricsTableContent {
    evaluator: Rc<dyn Evaluator>,
}

impl MetricsTableContent {
    pub fn new(evaluator: Rc<dyn Evaluator>) -> Self {
        Self { evaluator }
    }
}

impl ContentGenerator for MetricsTableContent {
    fn generate_content(&self) -> AppResult<String> {
        let metrics = self.evaluator.evaluate()?;
        if metrics.is_empty() {
            return Ok(String::new());
        }
        let mut rows = Vec::new();
        flatten_rows(&metrics, "", &mut rows);
        let mut out = String::new();
        out.push_str("<table class=\"metrics\">\n<thead><tr><th>metric</th><th>value</th></tr></thead>\n<tbody>\n");
        for (key, value) in rows {
            out.push_str(&format!(
                "<tr><td>{}</td><td>{}</td></tr>\n",
                escape_html(&key),
                escape_html(&value.render())
            ));
        }
        out.push_str("</tbody>\n</table>\n");
        Ok(out)
    }
}

fn flatten_rows<'a>(metrics: &'a Metrics, base: &str, out: &mut Vec<(String, &'a MetricValue)>) {
    for (key, value) in metrics {
        let path = if base.is_empty() {
            key.clone()
        } else {
            format!("{base}.{key}")
        };
        match value {
            MetricValue::Map(inner) => flatten_rows(inner, &path, out),
            other => out.push((path, other)),
        }
    }
}

pub struct StaticContent(pub String);

impl ContentGenerator for StaticContent {
    fn generate_content(&self) -> AppResult<String> {
        Ok(self.0.clone())
    }
}

pub struct CachedContent<C> {
    inner: C,
    cache: OnceCell<String>,
}

impl<C: ContentGenerator> CachedContent<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            cache: OnceCell::new(),
        }
    }

    pub fn is_computed(&self) -> bool {
        self.cache.get().is_some()
    }
}

impl<C: ContentGenerator> ContentGenerator for CachedContent<C> {
    fn generate_content(&self) -> AppResult<String> {
        self.cache
            .get_or_try_init(|| self.inner.generate_content())
            .cloned()
    }
}

/// Keyed children, each non-empty fragment wrapped in its own titled block.
#[derive(Default)]
pub struct MappingContent {
    children: BTreeMap<String, Box<dyn ContentGenerator>>,
}

impl MappingContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, child: Box<dyn ContentGenerator>) -> Self {
        self.children.insert(key.into(), child);
        self
    }
}

impl ContentGenerator for MappingContent {
    fn generate_content(&self) -> AppResult<String> {
        let mut out = String::new();
        for (key, child) in &self.children {
            let fragment = child.generate_content()?;
            if fragment.is_empty() {
                continue;
            }
            out.push_str(&format!(
                "<div class=\"group\">\n<h4>{}</h4>\n{fragment}</div>\n",
                escape_html(key)
            ));
        }
        Ok(out)
    }
}

#[derive(Default)]
pub struct SequentialContent {
    children: Vec<Box<dyn ContentGenerator>>,
}

impl SequentialContent {
    pub fn new(children: Vec<Box<dyn ContentGenerator>>) -> Self {
        Self { children }
    }
}

impl ContentGenerator for SequentialContent {
    fn generate_content(&self) -> AppResult<String> {
        self.children
            .iter()
            .map(|child| child.generate_content())
            .collect::<AppResult<Vec<_>>>()
            .map(|parts| parts.concat())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalkit_eval::ComputedResult;

    fn metrics() -> Rc<dyn Evaluator> {
        let mut inner = Metrics::new();
        inner.insert("count".into(), MetricValue::Int(4));
        let mut m = Metrics::new();
        m.insert("accuracy".into(), MetricValue::Float(0.75));
        m.insert("note".into(), MetricValue::Text("<b>".into()));
        m.insert("holdout".into(), MetricValue::Map(inner));
        Rc::new(ComputedResult::new(m, Default::default()))
    }

    #[test]
    fn template_fills_placeholders() {
        let template = Template::parse("acc={{ accuracy }} n={{holdout.count}} x={{ nope }} {{note}}").unwrap();
        assert_eq!(template.keys(), vec!["accuracy", "holdout.count", "nope", "note"]);
        let out = TemplateContent::new(template, metrics()).generate_content().unwrap();
        assert_eq!(out, "<p>acc=0.7500 n=4 x=n/a &lt;b&gt;</p>\n");
    }

    #[test]
    fn malformed_placeholder_is_rejected() {
        let err = Template::parse("value {{ accuracy").unwrap_err();
        assert_eq!(err.kind(), evalkit_core::ErrorKind::Validation);
        assert!(Template::parse("{{ has space }}").is_err());
    }

    #[test]
    fn empty_metrics_give_empty_fragment() {
        let empty: Rc<dyn Evaluator> = Rc::new(ComputedResult::empty());
        let template = Template::parse("{{ accuracy }}").unwrap();
        assert_eq!(TemplateContent::new(template, empty.clone()).generate_content().unwrap(), "");
        assert_eq!(MetricsTableContent::new(empty).generate_content().unwrap(), "");
    }

    #[test]
    fn metrics_table_flattens_nested_keys() {
        let out = MetricsTableContent::new(metrics()).generate_content().unwrap();
        assert!(out.contains("<td>holdout.count</td><td>4</td>"));
        assert!(out.contains("<td>accuracy</td><td>0.7500</td>"));
    }

    #[test]
    fn mapping_skips_empty_children() {
        let content = MappingContent::new()
            .with("a", Box::new(StaticContent("<p>a</p>\n".into())))
            .with("b", Box::new(StaticContent(String::new())));
        let out = content.generate_content().unwrap();
        assert!(out.contains("<h4>a</h4>"));
        assert!(!out.contains("<h4>b</h4>"));
    }

    #[test]
    fn sequential_concatenates_and_cached_memoizes() {
        let seq = CachedContent::new(SequentialContent::new(vec![
            Box::new(StaticContent("x".into())),
            Box::new(StaticContent("y".into())),
        ]));
        assert!(!seq.is_computed());
        assert_eq!(seq.generate_content().unwrap(), "xy");
        assert!(seq.is_computed());
        assert!(seq.equal(&StaticContent("xy".into())).unwrap());
    }
}
