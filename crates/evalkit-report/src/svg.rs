use evalkit_core::{AppError, AppResult};
use evalkit_eval::{Figure, FigureKind, Series};
use plotters::prelude::*;
use std::ops::Range;

fn draw_error<E: std::fmt::Display>(err: E) -> AppError {
    AppError::internal(format!("svg render error: {err}"))
}

fn finite_points(series: &Series) -> Vec<(f64, f64)> {
    series
        .x
        .iter()
        .zip(&series.y)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, *y))
        .collect()
}

fn padded(lo: f64, hi: f64) -> Range<f64> {
    if lo > hi {
        return 0.0..1.0;
    }
    if lo == hi {
        return (lo - 0.5)..(hi + 0.5);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad)..(hi + pad)
}

/// Half the smallest gap between distinct x positions.
fn bar_half_width(figure: &Figure) -> f64 {
    let mut xs: Vec<f64> = figure
        .series
        .iter()
        .flat_map(|s| s.x.iter().copied())
        .filter(|x| x.is_finite())
        .collect();
    xs.sort_by(f64::total_cmp);
    xs.dedup();
    let gap = xs
        .windows(2)
        .map(|w| w[1] - w[0])
        .fold(f64::INFINITY, f64::min);
    if gap.is_finite() {
        gap / 2.0
    } else {
        0.5
    }
}

fn bounds(figure: &Figure) -> (Range<f64>, Range<f64>) {
    let points: Vec<(f64, f64)> = figure.series.iter().flat_map(finite_points).collect();
    let (mut x_lo, mut x_hi, mut y_lo, mut y_hi) = points.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
        |(x_lo, x_hi, y_lo, y_hi), (x, y)| (x_lo.min(*x), x_hi.max(*x), y_lo.min(*y), y_hi.max(*y)),
    );
    if figure.kind == FigureKind::Bar && !points.is_empty() {
        let half = bar_half_width(figure);
        x_lo -= half;
        x_hi += half;
        y_lo = y_lo.min(0.0);
        y_hi = y_hi.max(0.0);
    }
    (padded(x_lo, x_hi), padded(y_lo, y_hi))
}

/// Renders `figure` as a standalone SVG document.
pub fn render_svg(figure: &Figure) -> AppResult<String> {
    let mut buf = String::new();
    {
        let root = SVGBackend::with_string(&mut buf, (figure.width, figure.height))
            .into_drawing_area();
        root.fill(&WHITE).map_err(draw_error)?;
        let (x_range, y_range) = bounds(figure);
        let mut chart = ChartBuilder::on(&root)
            .caption(figure.title.as_str(), ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(x_range, y_range)
            .map_err(draw_error)?;
        chart
            .configure_mesh()
            .x_desc(figure.x_label.as_str())
            .y_desc(figure.y_label.as_str())
            .draw()
            .map_err(draw_error)?;

        let n_series = figure.series.len();
        let slot = bar_half_width(figure) * 2.0 / (n_series as f64 + 1.0);
        for (idx, series) in figure.series.iter().enumerate() {
            let color = Palette99::pick(idx).to_rgba();
            let points = finite_points(series);
            let anno = match figure.kind {
                FigureKind::Scatter => chart.draw_series(
                    points
                        .iter()
                        .map(|p| Circle::new(*p, 3, color.filled())),
                ),
                FigureKind::Line => {
                    chart.draw_series(LineSeries::new(points, color.stroke_width(2)))
                }
                FigureKind::Bar => {
                    let offset = (idx as f64 - (n_series as f64 - 1.0) / 2.0) * slot;
                    chart.draw_series(points.iter().map(|(x, y)| {
                        let left = x + offset - slot / 2.0;
                        Rectangle::new([(left, 0.0), (left + slot, *y)], color.filled())
                    }))
                }
            }
            .map_err(draw_error)?;
            anno.label(series.name.as_str())
                .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
        }
        if n_series > 0 {
            chart
                .configure_series_labels()
                .background_style(&WHITE.mix(0.8))
                .border_style(&BLACK)
                .draw()
                .map_err(draw_error)?;
        }
        root.present().map_err(draw_error)?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_each_figure_kind() {
        for kind in [FigureKind::Scatter, FigureKind::Line, FigureKind::Bar] {
            let figure = Figure::new(kind, "demo")
                .labels("x", "y")
                .with_series(Series::new("a", vec![0.0, 1.0, 2.0], vec![1.0, 3.0, 2.0]))
                .with_series(Series::new("b", vec![0.0, 1.0, 2.0], vec![2.0, f64::NAN, 1.0]));
            let svg = render_svg(&figure).unwrap();
            assert!(svg.starts_with("<svg"));
            assert!(svg.trim_end().ends_with("</svg>"));
        }
    }

    #[test]
    fn empty_figure_still_renders() {
        let svg = render_svg(&Figure::new(FigureKind::Scatter, "empty")).unwrap();
        assert!(svg.starts_with("<svg"));
    }

    #[test]
    fn bar_bounds_include_zero() {
        let figure = Figure::new(FigureKind::Bar, "bars")
            .with_series(Series::new("a", vec![1.0, 2.0], vec![5.0, 6.0]));
        let (x, y) = bounds(&figure);
        assert!(y.start < 0.0 + 1e-9);
        assert!(x.start < 0.5 + 1e-9);
        assert!(x.end > 2.5 - 1e-9);
    }
}
