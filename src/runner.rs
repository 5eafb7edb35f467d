use std::fs;
use std::path::Path;

use chrono::{Local, NaiveDate};
use log::info;

use crate::aggregate::{self, DateWindow};
use crate::chart;
use crate::config::Config;
use crate::error::Error;
use crate::report::{ReportApi, ReportClient, ReportQuery};
use crate::slack::{FileUploader, SlackClient};

pub async fn publish_daily_report(config: Config) -> Result<(), Error> {
    let report = ReportClient::new(&config)?;
    let slack = SlackClient::new(&config)?;

    run_pipeline(&report, &slack, &config, Local::now().date_naive()).await
}

/// Fetches, aggregates, renders, and publishes one day's report.
///
/// Everything runs strictly sequentially: the spend chart is rendered and
/// uploaded before the overview chart, and each upload's three phases
/// complete before the next upload starts.
async fn run_pipeline<R: ReportApi, U: FileUploader>(
    report: &R,
    uploader: &U,
    config: &Config,
    today: NaiveDate,
) -> Result<(), Error> {
    let window = DateWindow::ending_yesterday(config.days, today)?;
    info!("reporting window {}", window.date_period());

    let output_dir = Path::new(&config.output_dir);
    fs::create_dir_all(output_dir)?;
    chart::remove_stale_charts(output_dir)?;

    let daily_rows = report
        .fetch_rows(&ReportQuery::new(&window, "day", "installs,cost,ecpi_all"))
        .await?;
    let partner_rows = report
        .fetch_rows(
            &ReportQuery::new(&window, "day,partner_name", "network_cost")
                .with_ad_spend_mode("network"),
        )
        .await?;

    let daily = aggregate::build_daily_table(&daily_rows, today)?;
    let partners = aggregate::build_partner_table(&partner_rows, today)?;
    let days = aggregate::union_days(&daily, &partners);

    let spend_chart = chart::render_partner_spend(output_dir, &window, &days, &partners)?;
    let overview_chart = chart::render_daily_overview(output_dir, &window, &days, &daily)?;

    let end_label = window.end.format("%b. %d");
    uploader
        .upload_file(
            &spend_chart,
            &format!("*[Paid ads]*: spend by channel up to {end_label}"),
        )
        .await?;
    uploader
        .upload_file(
            &overview_chart,
            &format!("*[Paid ads]*: daily report up to {end_label}"),
        )
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{MockReportApi, ReportRow};
    use crate::slack::MockFileUploader;
    use mockall::Sequence;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn row(value: serde_json::Value) -> ReportRow {
        value.as_object().unwrap().clone()
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn test_config(report_base_url: &str, slack_base_url: &str, output_dir: &str) -> Config {
        Config {
            report_base_url: report_base_url.to_string(),
            report_token: "report-token".to_string(),
            slack_base_url: slack_base_url.to_string(),
            slack_token: "chat-token".to_string(),
            slack_channel: "C042".to_string(),
            days: 7,
            output_dir: output_dir.to_string(),
        }
    }

    #[tokio::test]
    async fn pipeline_fetches_then_uploads_spend_chart_before_overview() {
        let mut seq = Sequence::new();

        let mut report = MockReportApi::new();
        report
            .expect_fetch_rows()
            .withf(|query| query.dimensions == "day" && query.ad_spend_mode.is_none())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(vec![row(
                    json!({"day": "2024-03-06", "installs": 10, "cost": 5.0, "ecpi_all": 0.5}),
                )])
            });
        report
            .expect_fetch_rows()
            .withf(|query| {
                query.dimensions == "day,partner_name"
                    && query.ad_spend_mode.as_deref() == Some("network")
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(vec![row(
                    json!({"day": "2024-03-06", "partner_name": "X", "network_cost": 2.0}),
                )])
            });

        let mut uploader = MockFileUploader::new();
        uploader
            .expect_upload_file()
            .withf(|chart_path, comment| {
                file_name(chart_path).starts_with("spend_by_partner_")
                    && comment == "*[Paid ads]*: spend by channel up to Mar. 07"
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        uploader
            .expect_upload_file()
            .withf(|chart_path, comment| {
                file_name(chart_path).starts_with("installs_spend_ecpi_")
                    && comment == "*[Paid ads]*: daily report up to Mar. 07"
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let dir = TempDir::new().unwrap();
        let config = test_config("http://unused", "http://unused", dir.path().to_str().unwrap());

        run_pipeline(&report, &uploader, &config, date("2024-03-08"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn report_failure_stops_the_run_before_any_upload() {
        let mut report = MockReportApi::new();
        report.expect_fetch_rows().times(1).returning(|_| {
            Err(Error::Coercion {
                field: "installs".to_string(),
                value: "lots".to_string(),
            })
        });

        let mut uploader = MockFileUploader::new();
        uploader.expect_upload_file().times(0);

        let dir = TempDir::new().unwrap();
        let config = test_config("http://unused", "http://unused", dir.path().to_str().unwrap());

        let result = run_pipeline(&report, &uploader, &config, date("2024-03-08")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn end_to_end_run_against_mock_servers_publishes_two_charts() {
        let report_server = MockServer::start().await;
        let slack_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/reports-service/report"))
            .and(query_param("dimensions", "day"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rows": [
                    {"day": "2024-03-05", "installs": 10, "cost": 5.0, "ecpi_all": 0.5},
                    {"day": "2024-03-06", "installs": 20, "cost": 8.0, "ecpi_all": 0.4},
                ]
            })))
            .expect(1)
            .mount(&report_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/reports-service/report"))
            .and(query_param("dimensions", "day,partner_name"))
            .and(query_param("ad_spend_mode", "network"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rows": [
                    {"day": "2024-03-05", "partner_name": "X", "network_cost": 1.5},
                    {"day": "2024-03-05", "partner_name": "X", "network_cost": 2.5},
                    {"day": "2024-03-06", "partner_name": "Y", "network_cost": 4.0},
                ]
            })))
            .expect(1)
            .mount(&report_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/files.getUploadURLExternal"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "upload_url": format!("{}/upload/one-shot", slack_server.uri()),
                "file_id": "F123",
            })))
            .expect(2)
            .mount(&slack_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload/one-shot"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&slack_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/files.completeUploadExternal"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(2)
            .mount(&slack_server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = test_config(
            &report_server.uri(),
            &slack_server.uri(),
            dir.path().to_str().unwrap(),
        );
        let report = ReportClient::new(&config).unwrap();
        let slack = SlackClient::new(&config).unwrap();

        run_pipeline(&report, &slack, &config, date("2024-03-08"))
            .await
            .unwrap();

        let charts: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(charts.len(), 2);
        assert!(charts.iter().all(|name| name.ends_with(".svg")));
    }

    fn file_name(chart_path: &Path) -> &str {
        chart_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
    }
}
