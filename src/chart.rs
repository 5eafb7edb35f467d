use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use chrono::{Duration, Local, NaiveDate};
use log::info;
use plotters::prelude::*;

use crate::aggregate::{DailyTable, DateWindow, PartnerTable};
use crate::error::Error;

const CHART_SIZE: (u32, u32) = (1200, 600);

/// One line per partner across the day axis, saved as
/// `spend_by_partner_<timestamp>.svg`.
pub fn render_partner_spend(
    dir: &Path,
    window: &DateWindow,
    days: &[NaiveDate],
    table: &PartnerTable,
) -> Result<PathBuf, Error> {
    let path = dir.join(format!("spend_by_partner_{}.svg", timestamp()));
    {
        let root = SVGBackend::new(&path, CHART_SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(chart_error)?;

        let mut max_spend = 0.0f64;
        for partner in table.partners() {
            for day in days {
                max_spend = max_spend.max(table.spend_on(*day, partner));
            }
        }

        let mut chart = ChartBuilder::on(&root)
            .caption("Spend by Channel", ("sans-serif", 28))
            .margin(12)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(axis_range(days, window), 0f64..padded(max_spend))
            .map_err(chart_error)?;

        chart
            .configure_mesh()
            .x_desc("Date")
            .y_desc("Spend ($)")
            .x_label_formatter(&|day| day.format("%m-%d").to_string())
            .draw()
            .map_err(chart_error)?;

        for (idx, partner) in table.partners().enumerate() {
            let color = Palette99::pick(idx).to_rgba();
            let series: Vec<(NaiveDate, f64)> = days
                .iter()
                .map(|day| (*day, table.spend_on(*day, partner)))
                .collect();

            chart
                .draw_series(LineSeries::new(series, color.stroke_width(2)).point_size(3))
                .map_err(chart_error)?
                .label(partner.to_string())
                .legend(move |(x, y)| {
                    PathElement::new(vec![(x, y), (x + 16, y)], color.stroke_width(2))
                });
        }

        chart
            .configure_series_labels()
            .border_style(BLACK.mix(0.4))
            .background_style(WHITE.mix(0.9))
            .draw()
            .map_err(chart_error)?;

        root.present().map_err(chart_error)?;
    }
    info!("saved {}", path.display());

    Ok(path)
}

/// Installs and spend on the left axis, eCPI on a secondary right axis,
/// saved as `installs_spend_ecpi_<timestamp>.svg`.
pub fn render_daily_overview(
    dir: &Path,
    window: &DateWindow,
    days: &[NaiveDate],
    table: &DailyTable,
) -> Result<PathBuf, Error> {
    let path = dir.join(format!("installs_spend_ecpi_{}.svg", timestamp()));
    {
        let root = SVGBackend::new(&path, CHART_SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(chart_error)?;

        let installs: Vec<(NaiveDate, f64)> = days
            .iter()
            .map(|day| (*day, table.installs_on(*day) as f64))
            .collect();
        let spend: Vec<(NaiveDate, f64)> =
            days.iter().map(|day| (*day, table.cost_on(*day))).collect();
        let ecpi: Vec<(NaiveDate, f64)> =
            days.iter().map(|day| (*day, table.ecpi_on(*day))).collect();

        let left_max = installs
            .iter()
            .chain(spend.iter())
            .fold(0.0f64, |acc, (_, v)| acc.max(*v));
        let right_max = ecpi.iter().fold(0.0f64, |acc, (_, v)| acc.max(*v));

        let x_range = axis_range(days, window);
        let mut chart = ChartBuilder::on(&root)
            .caption("Installs, Spend & eCPI (Global)", ("sans-serif", 28))
            .margin(12)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .right_y_label_area_size(60)
            .build_cartesian_2d(x_range.clone(), 0f64..padded(left_max))
            .map_err(chart_error)?
            .set_secondary_coord(x_range, 0f64..padded(right_max));

        chart
            .configure_mesh()
            .x_desc("Date")
            .y_desc("Installs / Spend ($)")
            .x_label_formatter(&|day| day.format("%m-%d").to_string())
            .draw()
            .map_err(chart_error)?;
        chart
            .configure_secondary_axes()
            .y_desc("eCPI ($)")
            .draw()
            .map_err(chart_error)?;

        chart
            .draw_series(LineSeries::new(installs, BLUE.stroke_width(2)).point_size(3))
            .map_err(chart_error)?
            .label("Installs")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 16, y)], BLUE.stroke_width(2)));
        chart
            .draw_series(LineSeries::new(spend, GREEN.stroke_width(2)).point_size(3))
            .map_err(chart_error)?
            .label("Spend ($)")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 16, y)], GREEN.stroke_width(2)));
        chart
            .draw_secondary_series(LineSeries::new(ecpi, RED.stroke_width(2)).point_size(3))
            .map_err(chart_error)?
            .label("eCPI ($)")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 16, y)], RED.stroke_width(2)));

        chart
            .configure_series_labels()
            .border_style(BLACK.mix(0.4))
            .background_style(WHITE.mix(0.9))
            .draw()
            .map_err(chart_error)?;

        root.present().map_err(chart_error)?;
    }
    info!("saved {}", path.display());

    Ok(path)
}

/// Deletes chart images left behind by earlier runs.
pub fn remove_stale_charts(dir: &Path) -> Result<(), Error> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "svg") {
            fs::remove_file(&path)?;
            info!("deleted stale chart {}", path.display());
        }
    }
    Ok(())
}

fn chart_error<E: std::fmt::Display>(err: E) -> Error {
    Error::Chart(err.to_string())
}

fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Axis range over the charted days, falling back to the query window when
/// no day survived filtering. A degenerate single-day range is widened so
/// the date axis always has nonzero extent.
fn axis_range(days: &[NaiveDate], window: &DateWindow) -> Range<NaiveDate> {
    let (mut start, mut end) = match (days.first(), days.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => (window.start, window.end),
    };
    if start == end {
        start = start - Duration::days(1);
        end = end + Duration::days(1);
    }
    start..end
}

fn padded(max: f64) -> f64 {
    if max > 0.0 {
        max * 1.05
    } else {
        1.0
    }
}
