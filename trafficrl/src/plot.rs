//! Comparison plots: one PNG per metric, one line series per agent.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use plotters::prelude::*;

use crate::metrics::{Metric, MetricHistory};

pub struct AgentSeries {
    pub name: String,
    pub color: RGBColor,
    pub history: MetricHistory,
}

/// `#rrggbb` → color.
pub fn parse_color(hex: &str) -> Option<RGBColor> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }

    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(RGBColor(r, g, b))
}

/// Drop the NaN gaps (intervals where the simulator did not report the
/// metric) and index the rest by step.
fn finite_points(series: &[f64]) -> Vec<(f64, f64)> {
    series
        .iter()
        .enumerate()
        .filter(|(_, y)| y.is_finite())
        .map(|(x, &y)| (x as f64, y))
        .collect()
}

/// Render every metric into `<out_dir>/plots/<metric>.png`. Metrics no run
/// reported are skipped. Returns the written paths.
pub fn render_all(out_dir: &Path, runs: &[AgentSeries]) -> anyhow::Result<Vec<PathBuf>> {
    let dir = out_dir.join("plots");
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut written = Vec::new();
    for metric in Metric::ALL {
        let series = runs
            .iter()
            .map(|run| (run, finite_points(run.history.series(metric))))
            .filter(|(_, points)| !points.is_empty())
            .collect::<Vec<_>>();
        if series.is_empty() {
            continue;
        }

        let x_max = series
            .iter()
            .map(|(_, points)| points.len())
            .max()
            .unwrap_or(1) as f64;
        let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
        for (_, points) in &series {
            for &(_, y) in points {
                y_min = y_min.min(y);
                y_max = y_max.max(y);
            }
        }
        if y_min == y_max {
            y_min -= 1.;
            y_max += 1.;
        }

        let path = dir.join(format!("{}.png", metric.wire_name()));
        let root = BitMapBackend::new(&path, (1280, 720)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(metric.wire_name(), ("sans-serif", 24))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(0f64..x_max, y_min..y_max)?;
        chart
            .configure_mesh()
            .x_desc("step")
            .y_desc(metric.wire_name())
            .draw()?;

        for (run, points) in series {
            let color = run.color;
            chart
                .draw_series(LineSeries::new(points, &color))?
                .label(&run.name)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        }
        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;
        root.present()?;

        written.push(path.clone());
    }

    Ok(written)
}
