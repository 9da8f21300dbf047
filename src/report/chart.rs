//! SVG chart rendering.
//!
//! Produces the bar chart (records per group value), the line chart
//! (records per year) and the combined 600x600 export with the bar chart
//! on top and the line chart offset by 300 pixels.

use crate::models::{Bucket, YearBucket};
use crate::view::{DashboardView, Screen};

/// Width of a single chart.
pub const WIDTH: u32 = 600;
/// Height of a single chart.
pub const HEIGHT: u32 = 300;

const MARGIN_TOP: f64 = 20.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_BOTTOM: f64 = 40.0;
const MARGIN_LEFT: f64 = 40.0;
const CHART_WIDTH: f64 = WIDTH as f64 - MARGIN_LEFT - MARGIN_RIGHT;
const CHART_HEIGHT: f64 = HEIGHT as f64 - MARGIN_TOP - MARGIN_BOTTOM;

const BACKGROUND: &str = "#1e293b";
const AXIS_TEXT: &str = "#dddddd";
const GRID: &str = "#475569";
const BAR_FILL: &str = "#3b82f6";
const LINE_STROKE: &str = "#34d399";

const Y_TICKS: usize = 5;

/// Linear count axis from zero to a rounded-up maximum.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CountScale {
    max: f64,
}

impl CountScale {
    fn new(max_count: usize) -> Self {
        let max = if max_count == 0 { 1.0 } else { max_count as f64 };
        Self { max: nice_max(max, 10) }
    }

    fn y(&self, value: f64) -> f64 {
        CHART_HEIGHT - (value / self.max) * CHART_HEIGHT
    }

    fn ticks(&self) -> Vec<f64> {
        let step = tick_step(0.0, self.max, Y_TICKS);
        let last = (self.max / step + 1e-9).floor() as usize;
        (0..=last).map(|i| i as f64 * step).collect()
    }

    fn label(&self, tick: f64) -> String {
        let step = tick_step(0.0, self.max, Y_TICKS);
        if step >= 1.0 {
            format!("{:.0}", tick)
        } else {
            let decimals = (-step.log10().floor()) as usize;
            format!("{:.*}", decimals, tick)
        }
    }
}

/// Step between "nice" ticks (1, 2 or 5 times a power of ten).
fn tick_step(start: f64, stop: f64, count: usize) -> f64 {
    let raw = (stop - start).abs() / count.max(1) as f64;
    if raw <= 0.0 || !raw.is_finite() {
        return 1.0;
    }
    let base = 10f64.powf(raw.log10().floor());
    let error = raw / base;
    let factor = if error >= 50f64.sqrt() {
        10.0
    } else if error >= 10f64.sqrt() {
        5.0
    } else if error >= 2f64.sqrt() {
        2.0
    } else {
        1.0
    };
    factor * base
}

/// Extend `max` up to a multiple of its tick step.
fn nice_max(max: f64, count: usize) -> f64 {
    let mut stop = max;
    let mut previous = None;
    for _ in 0..10 {
        let step = tick_step(0.0, stop, count);
        if previous == Some(step) {
            break;
        }
        stop = (stop / step - 1e-9).ceil() * step;
        previous = Some(step);
    }
    stop
}

/// Evenly spaced bands with inner and outer padding.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BandScale {
    start: f64,
    step: f64,
    bandwidth: f64,
}

impl BandScale {
    fn new(n: usize, range: f64, padding: f64) -> Self {
        let n = n as f64;
        let step = range / (n - padding + 2.0 * padding).max(1.0);
        let start = (range - step * (n - padding)) * 0.5;
        Self {
            start,
            step,
            bandwidth: step * (1.0 - padding),
        }
    }

    fn x(&self, index: usize) -> f64 {
        self.start + self.step * index as f64
    }
}

/// Evenly spaced points with outer padding.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PointScale {
    start: f64,
    step: f64,
}

impl PointScale {
    fn new(n: usize, range: f64, padding: f64) -> Self {
        let n = n as f64;
        let step = range / (n - 1.0 + 2.0 * padding).max(1.0);
        let start = (range - step * (n - 1.0)) * 0.5;
        Self { start, step }
    }

    fn x(&self, index: usize) -> f64 {
        self.start + self.step * index as f64
    }
}

/// Escape text for use in SVG content and attributes.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

fn open_svg(width: u32, height: u32, y: u32, title: &str) -> String {
    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\" y=\"{}\" font-family=\"sans-serif\">\n",
        width, height, y
    ));
    svg.push_str(&format!("  <title>{}</title>\n", escape_xml(title)));
    svg.push_str(&format!(
        "  <rect width=\"{}\" height=\"{}\" fill=\"{}\" rx=\"12\"/>\n",
        width, height, BACKGROUND
    ));
    svg
}

fn grid_and_y_axis(scale: &CountScale) -> String {
    let mut out = String::new();

    for tick in scale.ticks() {
        let y = scale.y(tick);
        out.push_str(&format!(
            "    <line x1=\"0\" x2=\"{:.2}\" y1=\"{:.2}\" y2=\"{:.2}\" stroke=\"{}\" stroke-opacity=\"0.4\"/>\n",
            CHART_WIDTH, y, y, GRID
        ));
        out.push_str(&format!(
            "    <text x=\"-10\" y=\"{:.2}\" dy=\"0.32em\" text-anchor=\"end\" fill=\"{}\" font-size=\"12\">{}</text>\n",
            y,
            AXIS_TEXT,
            scale.label(tick)
        ));
    }

    out.push_str(&format!(
        "    <text transform=\"rotate(-90)\" y=\"{:.2}\" x=\"{:.2}\" dy=\"1em\" text-anchor=\"middle\" fill=\"{}\" font-size=\"12\">Number of Records</text>\n",
        -MARGIN_LEFT,
        -CHART_HEIGHT / 2.0,
        AXIS_TEXT
    ));

    out
}

/// Bar chart of `buckets` in their given order.
fn bar_chart(buckets: &[Bucket], group_field: &str, y_offset: u32) -> String {
    let title = format!("Records by {}", group_field);
    if buckets.is_empty() {
        return placeholder(WIDTH, HEIGHT, y_offset, &title, "No records to display");
    }

    let scale = CountScale::new(buckets.iter().map(|b| b.count).max().unwrap_or(0));
    let bands = BandScale::new(buckets.len(), CHART_WIDTH, 0.2);

    let mut svg = open_svg(WIDTH, HEIGHT, y_offset, &title);
    svg.push_str(&format!(
        "  <g transform=\"translate({}, {})\">\n",
        MARGIN_LEFT, MARGIN_TOP
    ));
    svg.push_str(&grid_and_y_axis(&scale));

    for (i, bucket) in buckets.iter().enumerate() {
        let y = scale.y(bucket.count as f64);
        let label = escape_xml(&bucket.label);
        let hover = if bucket.label == crate::analysis::UNKNOWN_LABEL {
            "Unknown Group".to_string()
        } else {
            label.clone()
        };

        svg.push_str(&format!("    <g transform=\"translate({:.2}, 0)\">\n", bands.x(i)));
        svg.push_str(&format!("      <title>{}: {} records</title>\n", hover, bucket.count));
        svg.push_str(&format!(
            "      <rect x=\"0\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" fill=\"{}\" rx=\"4\"/>\n",
            y,
            bands.bandwidth,
            CHART_HEIGHT - y,
            BAR_FILL
        ));
        svg.push_str(&format!(
            "      <text x=\"{:.2}\" y=\"{:.2}\" font-size=\"12\" fill=\"#ffffff\" text-anchor=\"middle\">{}</text>\n",
            bands.bandwidth / 2.0,
            y - 5.0,
            bucket.count
        ));
        svg.push_str("    </g>\n");
    }

    svg.push_str(&format!(
        "    <g transform=\"translate(0, {})\">\n",
        CHART_HEIGHT
    ));
    for (i, bucket) in buckets.iter().enumerate() {
        svg.push_str(&format!(
            "      <text x=\"{:.2}\" y=\"25\" text-anchor=\"middle\" fill=\"{}\" font-size=\"12\">{}</text>\n",
            bands.x(i) + bands.bandwidth / 2.0,
            AXIS_TEXT,
            escape_xml(&bucket.label)
        ));
    }
    svg.push_str("    </g>\n");

    svg.push_str("  </g>\n</svg>\n");
    svg
}

/// Line chart of `buckets`, sorted by year before drawing.
fn line_chart(buckets: &[YearBucket], y_offset: u32) -> String {
    let title = "Records Over Time";
    if buckets.is_empty() {
        return placeholder(WIDTH, HEIGHT, y_offset, title, "No dated records to display");
    }

    let mut sorted = buckets.to_vec();
    sorted.sort_by(|a, b| a.year.cmp(&b.year));

    let scale = CountScale::new(sorted.iter().map(|b| b.count).max().unwrap_or(0));
    let points_x = PointScale::new(sorted.len(), CHART_WIDTH, 0.5);
    let points: Vec<(f64, f64)> = sorted
        .iter()
        .enumerate()
        .map(|(i, b)| (points_x.x(i), scale.y(b.count as f64)))
        .collect();

    let mut svg = open_svg(WIDTH, HEIGHT, y_offset, title);
    svg.push_str(&format!(
        "  <g transform=\"translate({}, {})\">\n",
        MARGIN_LEFT, MARGIN_TOP
    ));
    svg.push_str(&grid_and_y_axis(&scale));

    svg.push_str(&format!(
        "    <path d=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"3\"/>\n",
        monotone_x_path(&points),
        LINE_STROKE
    ));

    for (bucket, (x, y)) in sorted.iter().zip(points.iter()) {
        svg.push_str("    <g>\n");
        svg.push_str(&format!(
            "      <title>{}: {} records</title>\n",
            escape_xml(&bucket.year),
            bucket.count
        ));
        svg.push_str(&format!(
            "      <circle cx=\"{:.2}\" cy=\"{:.2}\" r=\"6\" fill=\"{}\" stroke=\"#ffffff\" stroke-width=\"2\"/>\n",
            x, y, LINE_STROKE
        ));
        svg.push_str(&format!(
            "      <text x=\"{:.2}\" y=\"{:.2}\" font-size=\"12\" fill=\"#ffffff\" text-anchor=\"middle\">{}</text>\n",
            x,
            y - 15.0,
            bucket.count
        ));
        svg.push_str("    </g>\n");
    }

    svg.push_str(&format!(
        "    <g transform=\"translate(0, {})\">\n",
        CHART_HEIGHT
    ));
    for (bucket, (x, _)) in sorted.iter().zip(points.iter()) {
        svg.push_str(&format!(
            "      <text x=\"{:.2}\" y=\"25\" text-anchor=\"middle\" fill=\"{}\" font-size=\"12\">{}</text>\n",
            x,
            AXIS_TEXT,
            escape_xml(&bucket.year)
        ));
    }
    svg.push_str("    </g>\n");

    svg.push_str("  </g>\n</svg>\n");
    svg
}

/// Path through `points` (ascending x) using a monotone cubic
/// interpolation that never overshoots between data points.
fn monotone_x_path(points: &[(f64, f64)]) -> String {
    match points.len() {
        0 => String::new(),
        1 => format!("M{:.2},{:.2}", points[0].0, points[0].1),
        2 => format!(
            "M{:.2},{:.2}L{:.2},{:.2}",
            points[0].0, points[0].1, points[1].0, points[1].1
        ),
        n => {
            let mut tangents = vec![0.0; n];
            for i in 1..n - 1 {
                tangents[i] = interior_tangent(points[i - 1], points[i], points[i + 1]);
            }
            tangents[0] = end_tangent(points[0], points[1], tangents[1]);
            tangents[n - 1] = end_tangent(points[n - 2], points[n - 1], tangents[n - 2]);

            let mut d = format!("M{:.2},{:.2}", points[0].0, points[0].1);
            for i in 0..n - 1 {
                let (x0, y0) = points[i];
                let (x1, y1) = points[i + 1];
                let dx = (x1 - x0) / 3.0;
                d.push_str(&format!(
                    "C{:.2},{:.2},{:.2},{:.2},{:.2},{:.2}",
                    x0 + dx,
                    y0 + dx * tangents[i],
                    x1 - dx,
                    y1 - dx * tangents[i + 1],
                    x1,
                    y1
                ));
            }
            d
        }
    }
}

fn interior_tangent(p0: (f64, f64), p1: (f64, f64), p2: (f64, f64)) -> f64 {
    let h0 = p1.0 - p0.0;
    let h1 = p2.0 - p1.0;
    let s0 = (p1.1 - p0.1) / h0;
    let s1 = (p2.1 - p1.1) / h1;
    let p = (s0 * h1 + s1 * h0) / (h0 + h1);
    let sign = |v: f64| if v < 0.0 { -1.0 } else { 1.0 };
    let t = (sign(s0) + sign(s1)) * s0.abs().min(s1.abs()).min(0.5 * p.abs());
    if t.is_finite() {
        t
    } else {
        0.0
    }
}

fn end_tangent(p0: (f64, f64), p1: (f64, f64), neighbour: f64) -> f64 {
    let h = p1.0 - p0.0;
    if h == 0.0 {
        neighbour
    } else {
        (3.0 * (p1.1 - p0.1) / h - neighbour) / 2.0
    }
}

/// Panel with a centred explanatory message instead of a chart.
fn placeholder(width: u32, height: u32, y_offset: u32, title: &str, message: &str) -> String {
    let mut svg = open_svg(width, height, y_offset, title);
    svg.push_str(&format!(
        "  <text x=\"{}\" y=\"{}\" text-anchor=\"middle\" fill=\"{}\" font-size=\"16\">{}</text>\n",
        width / 2,
        height / 2,
        AXIS_TEXT,
        escape_xml(message)
    ));
    svg.push_str("</svg>\n");
    svg
}

fn combine(top: &str, bottom: &str) -> String {
    let mut svg = String::new();
    svg.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\">\n",
        WIDTH,
        HEIGHT * 2
    ));
    svg.push_str(top);
    svg.push_str(bottom);
    svg.push_str("</svg>\n");
    svg
}

/// Combined export: bar chart on top, line chart below.
pub fn export_charts(view: &DashboardView) -> String {
    let group_field = view.group_field.as_deref().unwrap_or("group");
    combine(
        &bar_chart(&view.by_field, group_field, 0),
        &line_chart(&view.by_year, HEIGHT),
    )
}

/// Combined export for any screen; non-dashboard screens get placeholders.
pub fn export_screen(screen: &Screen) -> String {
    let (title, message) = match screen {
        Screen::Dashboard(view) => return export_charts(view),
        Screen::Idle => ("No task".to_string(), "No task submitted".to_string()),
        Screen::Waiting {
            task_id, status, ..
        } => (
            format!("Task {}", task_id),
            format!("Task is still {}", status),
        ),
        Screen::Failed { task_id, error } => (
            format!("Task {} failed", task_id),
            format!("No data: {}", error),
        ),
    };

    combine(
        &placeholder(WIDTH, HEIGHT, 0, &title, &message),
        &placeholder(WIDTH, HEIGHT, HEIGHT, &title, "Charts are unavailable for this task"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(label: &str, count: usize) -> Bucket {
        Bucket {
            label: label.to_string(),
            count,
        }
    }

    fn year(year: &str, count: usize) -> YearBucket {
        YearBucket {
            year: year.to_string(),
            count,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_nice_scale() {
        assert!(close(CountScale::new(2).max, 2.0));
        assert!(close(CountScale::new(7).max, 7.0));
        assert!(close(CountScale::new(13).max, 13.0));
        assert!(close(CountScale::new(97).max, 100.0));
        assert!(close(CountScale::new(0).max, 1.0));
    }

    #[test]
    fn test_ticks() {
        let scale = CountScale::new(97);
        let ticks = scale.ticks();
        assert_eq!(ticks.len(), 6);
        assert!(close(ticks[5], 100.0));
        assert_eq!(scale.label(40.0), "40");

        let scale = CountScale::new(1);
        assert_eq!(scale.label(0.2), "0.2");
    }

    #[test]
    fn test_band_scale_layout() {
        let bands = BandScale::new(2, 530.0, 0.2);
        // step = 530 / 2.2, bands centred in range
        assert!((bands.step - 240.909).abs() < 0.01);
        assert!((bands.bandwidth - bands.step * 0.8).abs() < 1e-9);
        let right_edge = bands.x(1) + bands.bandwidth;
        assert!((bands.x(0) - (530.0 - right_edge)).abs() < 1e-9);
    }

    #[test]
    fn test_point_scale_single_point_is_centred() {
        let points = PointScale::new(1, 530.0, 0.5);
        assert!((points.x(0) - 265.0).abs() < 1e-9);
    }

    #[test]
    fn test_monotone_path_shapes() {
        assert_eq!(monotone_x_path(&[]), "");
        assert!(monotone_x_path(&[(0.0, 0.0), (10.0, 5.0)]).contains('L'));

        let path = monotone_x_path(&[(0.0, 10.0), (10.0, 0.0), (20.0, 10.0)]);
        assert!(path.starts_with("M0.00,10.00C"));
        assert_eq!(path.matches('C').count(), 2);
        // Local minimum gets a flat tangent
        assert_eq!(interior_tangent((0.0, 10.0), (10.0, 0.0), (20.0, 10.0)), 0.0);
    }

    #[test]
    fn test_bar_chart_contents() {
        let svg = bar_chart(&[bucket("A", 2), bucket("Unknown", 1)], "location", 0);
        assert!(svg.contains("<title>Records by location</title>"));
        assert_eq!(svg.matches("<rect x=\"0\"").count(), 2);
        assert!(svg.contains("A: 2 records"));
        assert!(svg.contains("Unknown Group: 1 records"));
        assert!(svg.contains("Number of Records"));
    }

    #[test]
    fn test_labels_are_escaped() {
        let svg = bar_chart(&[bucket("R&D <east>", 1)], "team", 0);
        assert!(svg.contains("R&amp;D &lt;east&gt;"));
        assert!(!svg.contains("R&D"));
    }

    #[test]
    fn test_line_chart_sorts_years() {
        let svg = line_chart(&[year("2022", 1), year("2021", 2)], 0);
        let first = svg.find(">2021<").unwrap();
        let second = svg.find(">2022<").unwrap();
        assert!(first < second);
        assert_eq!(svg.matches("<circle").count(), 2);
    }

    #[test]
    fn test_empty_data_renders_placeholders() {
        let bar = bar_chart(&[], "location", 0);
        assert!(bar.contains("No records to display"));
        assert!(!bar.contains("<rect x=\"0\""));

        let line = line_chart(&[], 0);
        assert!(line.contains("No dated records to display"));
        assert!(!line.contains("<path"));
    }

    #[test]
    fn test_export_layout() {
        let view = DashboardView {
            group_field: Some("location".to_string()),
            by_field: vec![bucket("A", 2), bucket("B", 1)],
            by_year: vec![year("2021", 2), year("2022", 1)],
            ..Default::default()
        };
        let svg = export_charts(&view);

        assert!(svg.contains("width=\"600\" height=\"600\""));
        assert!(svg.contains("width=\"600\" height=\"300\" y=\"0\""));
        assert!(svg.contains("width=\"600\" height=\"300\" y=\"300\""));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn test_export_failed_screen() {
        let screen = Screen::Failed {
            task_id: "t-9".to_string(),
            error: "task t-9 failed on the backend".to_string(),
        };
        let svg = export_screen(&screen);
        assert!(svg.contains("Task t-9 failed"));
        assert!(svg.contains("No data: task t-9 failed on the backend"));
        assert!(svg.contains("y=\"300\""));
    }
}
