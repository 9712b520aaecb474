use crate::html::{render_html, ReportSection};
use crate::svg::render_svg;
use evalkit_core::json::{envelope_with_hash, to_canonical_json_pretty};
use evalkit_core::{AppError, AppResult};
use evalkit_eval::{flatten_figures, ComputedResult};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Everything a run produced, ready to be written out.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    pub title: String,
    pub result: ComputedResult,
    pub sections: Vec<ReportSection>,
}

pub trait Exporter {
    fn name(&self) -> &'static str;

    /// Whether existing files may be replaced.
    fn exist_ok(&self) -> bool;

    /// The files `export` would write for `artifacts`.
    fn targets(&self, artifacts: &Artifacts) -> AppResult<Vec<PathBuf>>;

    /// Checks every target without touching the disk and returns them.
    fn preflight(&self, artifacts: &Artifacts) -> AppResult<Vec<PathBuf>> {
        let targets = self.targets(artifacts)?;
        for target in &targets {
            ensure_writable(target, self.exist_ok())?;
        }
        Ok(targets)
    }

    /// Writes the artifacts and returns the paths written.
    fn export(&self, artifacts: &Artifacts) -> AppResult<Vec<PathBuf>>;
}

fn ensure_writable(path: &Path, exist_ok: bool) -> AppResult<()> {
    if path.is_dir() {
        return Err(AppError::validation(format!(
            "{} is a directory",
            path.display()
        )));
    }
    if path.exists() && !exist_ok {
        return Err(AppError::file_exists(path));
    }
    Ok(())
}

fn write_file(path: &Path, contents: &[u8]) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::io(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
    }
    fs::write(path, contents)
        .map_err(|e| AppError::io(format!("failed to write {}: {e}", path.display())))
}

/// Metrics as canonical JSON wrapped with a determinism hash.
#[derive(Debug, Clone)]
pub struct MetricsJsonExporter {
    pub path: PathBuf,
    pub exist_ok: bool,
}

impl Exporter for MetricsJsonExporter {
    fn name(&self) -> &'static str {
        "metrics_json"
    }

    fn exist_ok(&self) -> bool {
        self.exist_ok
    }

    fn targets(&self, _: &Artifacts) -> AppResult<Vec<PathBuf>> {
        Ok(vec![self.path.clone()])
    }

    fn export(&self, artifacts: &Artifacts) -> AppResult<Vec<PathBuf>> {
        self.preflight(artifacts)?;
        let envelope = envelope_with_hash("metrics", &artifacts.result.metrics)?;
        let text = to_canonical_json_pretty(&envelope)?;
        write_file(&self.path, text.as_bytes())?;
        info!(path = %self.path.display(), metrics = artifacts.result.metrics.len(), "metrics written");
        Ok(vec![self.path.clone()])
    }
}

#[derive(Debug, Clone)]
pub struct FiguresJsonExporter {
    pub path: PathBuf,
    pub exist_ok: bool,
}

impl Exporter for FiguresJsonExporter {
    fn name(&self) -> &'static str {
        "figures_json"
    }

    fn exist_ok(&self) -> bool {
        self.exist_ok
    }

    fn targets(&self, _: &Artifacts) -> AppResult<Vec<PathBuf>> {
        Ok(vec![self.path.clone()])
    }

    fn export(&self, artifacts: &Artifacts) -> AppResult<Vec<PathBuf>> {
        self.preflight(artifacts)?;
        let text = to_canonical_json_pretty(&artifacts.result.figures)?;
        write_file(&self.path, text.as_bytes())?;
        info!(path = %self.path.display(), "figures written");
        Ok(vec![self.path.clone()])
    }
}

/// One SVG file per figure, named by its dotted path.
#[derive(Debug, Clone)]
pub struct SvgExporter {
    pub dir: PathBuf,
    pub exist_ok: bool,
}

pub fn figure_file_name(path: &str) -> String {
    let stem: String = path
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{stem}.svg")
}

impl Exporter for SvgExporter {
    fn name(&self) -> &'static str {
        "svg"
    }

    fn exist_ok(&self) -> bool {
        self.exist_ok
    }

    /// Fails when two figure paths sanitize to the same file name.
    fn targets(&self, artifacts: &Artifacts) -> AppResult<Vec<PathBuf>> {
        let mut seen: BTreeMap<PathBuf, String> = BTreeMap::new();
        let mut targets = Vec::new();
        for (name, _) in flatten_figures(&artifacts.result.figures, ".") {
            let target = self.dir.join(figure_file_name(&name));
            if let Some(first) = seen.get(&target) {
                return Err(AppError::validation(format!(
                    "figures '{first}' and '{name}' both map to {}",
                    target.display()
                )));
            }
            seen.insert(target.clone(), name);
            targets.push(target);
        }
        Ok(targets)
    }

    fn export(&self, artifacts: &Artifacts) -> AppResult<Vec<PathBuf>> {
        let targets = self.preflight(artifacts)?;
        let figures = flatten_figures(&artifacts.result.figures, ".");
        for ((_, figure), target) in figures.iter().zip(&targets) {
            write_file(target, render_svg(figure)?.as_bytes())?;
        }
        info!(dir = %self.dir.display(), figures = targets.len(), "svg figures written");
        Ok(targets)
    }
}

#[derive(Debug, Clone)]
pub struct HtmlReporter {
    pub path: PathBuf,
    pub exist_ok: bool,
    pub title: Option<String>,
}

impl Exporter for HtmlReporter {
    fn name(&self) -> &'static str {
        "html"
    }

    fn exist_ok(&self) -> bool {
        self.exist_ok
    }

    fn targets(&self, _: &Artifacts) -> AppResult<Vec<PathBuf>> {
        Ok(vec![self.path.clone()])
    }

    fn export(&self, artifacts: &Artifacts) -> AppResult<Vec<PathBuf>> {
        self.preflight(artifacts)?;
        let title = self.title.as_deref().unwrap_or(&artifacts.title);
        let html = render_html(title, &artifacts.sections)?;
        write_file(&self.path, html.as_bytes())?;
        info!(path = %self.path.display(), sections = artifacts.sections.len(), "html report written");
        Ok(vec![self.path.clone()])
    }
}
