pub mod content;
pub mod export;
pub mod html;
pub mod output;
pub mod svg;

pub use content::{
    CachedContent, ContentGenerator, MappingContent, MetricsTableContent, SequentialContent,
    StaticContent, Template, TemplateContent,
};
pub use export::{
    Artifacts, Exporter, FiguresJsonExporter, HtmlReporter, MetricsJsonExporter, SvgExporter,
};
pub use html::{render_html, ReportSection};
pub use output::{AnalysisOutput, MappingOutput, Output};
pub use svg::render_svg;
