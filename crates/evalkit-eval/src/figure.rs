use crate::value::float_vec;
use evalkit_core::FloatCmp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Figures = BTreeMap<String, PlotEntry>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FigureKind {
    Scatter,
    Line,
    Bar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    #[serde(with = "float_vec")]
    pub x: Vec<f64>,
    #[serde(with = "float_vec")]
    pub y: Vec<f64>,
}

impl Series {
    pub fn new(name: impl Into<String>, x: Vec<f64>, y: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            x,
            y,
        }
    }

    pub fn equal(&self, other: &Series, cmp: FloatCmp) -> bool {
        self.name == other.name && cmp.eq_slice(&self.x, &other.x) && cmp.eq_slice(&self.y, &other.y)
    }
}

/// Plot data; rendering happens at export time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    pub kind: FigureKind,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub width: u32,
    pub height: u32,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(kind: FigureKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            x_label: String::new(),
            y_label: String::new(),
            width: 640,
            height: 480,
            series: Vec::new(),
        }
    }

    pub fn labels(mut self, x: impl Into<String>, y: impl Into<String>) -> Self {
        self.x_label = x.into();
        self.y_label = y.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_series(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }

    pub fn equal(&self, other: &Figure, cmp: FloatCmp) -> bool {
        self.kind == other.kind
            && self.title == other.title
            && self.x_label == other.x_label
            && self.y_label == other.y_label
            && self.width == other.width
            && self.height == other.height
            && self.series.len() == other.series.len()
            && self
                .series
                .iter()
                .zip(&other.series)
                .all(|(a, b)| a.equal(b, cmp))
    }
}

/// A figure, or the nested figures of a keyed child plotter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlotEntry {
    Figure(Figure),
    Group(Figures),
}

impl PlotEntry {
    pub fn equal(&self, other: &PlotEntry, cmp: FloatCmp) -> bool {
        match (self, other) {
            (PlotEntry::Figure(a), PlotEntry::Figure(b)) => a.equal(b, cmp),
            (PlotEntry::Group(a), PlotEntry::Group(b)) => figures_equal(a, b, cmp),
            _ => false,
        }
    }
}

pub fn figures_equal(a: &Figures, b: &Figures, cmp: FloatCmp) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(key, entry)| b.get(key).is_some_and(|other| entry.equal(other, cmp)))
}

/// Depth-first `(path, figure)` pairs with group keys joined by `sep`.
pub fn flatten_figures<'a>(figures: &'a Figures, sep: &str) -> Vec<(String, &'a Figure)> {
    let mut out = Vec::new();
    flatten_into(figures, "", sep, &mut out);
    out
}

fn flatten_into<'a>(figures: &'a Figures, base: &str, sep: &str, out: &mut Vec<(String, &'a Figure)>) {
    for (key, entry) in figures {
        let path = if base.is_empty() {
            key.clone()
        } else {
            format!("{base}{sep}{key}")
        };
        match entry {
            PlotEntry::Figure(figure) => out.push((path, figure)),
            PlotEntry::Group(inner) => flatten_into(inner, &path, sep, out),
        }
    }
}
