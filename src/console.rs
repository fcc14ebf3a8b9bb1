use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::hours::HoursTotals;
use crate::report::{
    ChartReport, ClientReport, ClientSummary, Navigation, Redirect, TeamReport, UserReport,
};
use crate::summary::{format_rates, ProjectSummary};

/// Consoleにレポートを表示するためのtrait。
pub trait ConsolePresenter {
    /// ユーザー1人のレポートを表示する。
    fn show_user_report(&mut self, report: &UserReport) -> Result<()>;

    fn show_team_report(&mut self, report: &TeamReport) -> Result<()>;

    /// グラフ描画サービスに渡すデータを表示する。
    fn show_charts(&mut self, report: &ChartReport) -> Result<()>;

    fn show_client_report(&mut self, report: &ClientReport) -> Result<()>;

    /// クライアントの口座明細を表示する。
    fn show_client_summary(&mut self, summary: &ClientSummary) -> Result<()>;

    /// エクスポートしたファイルを表示する。
    fn show_exported(&mut self, path: &Path) -> Result<()>;

    /// アクセスできなかったことを表示する。
    fn show_redirect(&mut self, redirect: &Redirect) -> Result<()>;
}

/// レポートをMarkdownのlist形式で表示する。
pub struct ConsoleMarkdownList<'a, W: Write> {
    writer: &'a mut W,
}

impl<'a, W: Write> ConsoleMarkdownList<'a, W> {
    /// 新しい`ConsoleMarkdownList`を返す。
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }

    fn line(&mut self, text: &str) -> Result<()> {
        writeln!(self.writer, "{}", text).with_context(|| format!("Failed to write: {}", text))
    }

    fn warnings(&mut self, warnings: &[String]) -> Result<()> {
        warnings
            .iter()
            .try_for_each(|warning| self.line(&format!("> warning: {}", warning)))
    }

    fn totals(&mut self, totals: &HoursTotals) -> Result<()> {
        self.line(&format!(
            "- worked: {:.2} / loggable: {:.2} / billable: {:.2}",
            totals.worked, totals.loggable, totals.billable
        ))?;
        if let Some(cost) = totals.cost {
            self.line(&format!("- cost: {}", cost))?;
        }
        Ok(())
    }

    fn projects(&mut self, projects: &[ProjectSummary]) -> Result<()> {
        projects.iter().try_for_each(|project| {
            let mut text = format!(
                "- {} ({}): {:.2}",
                project.project, project.name, project.total_hours
            );
            if !project.rates.is_empty() {
                text.push_str(&format!(" [{}]", format_rates(&project.rates)));
            }
            self.line(&text)
        })
    }

    fn navigation(&mut self, navigation: &Navigation) -> Result<()> {
        let link = |period: Option<crate::period::Period>| {
            period.map_or("-".to_string(), |p| format!("{} ~ {}", p.start, p.end))
        };
        self.line(&format!(
            "\n< {} | {} >",
            link(navigation.prev),
            link(navigation.next)
        ))
    }
}

impl<'a, W: Write> ConsolePresenter for ConsoleMarkdownList<'a, W> {
    fn show_user_report(&mut self, report: &UserReport) -> Result<()> {
        self.warnings(&report.warnings)?;
        self.line(&format!("# {}", report.title))?;
        self.totals(&report.hours)?;
        self.line("\n## Projects")?;
        self.projects(&report.by_project)?;
        self.line(&format!("- total: {:.2}", report.total_hours))?;
        self.line("\n## Logs")?;
        report.detail.iter().try_for_each(|row| {
            self.line(&format!(
                "- {} {} {}: {:.2} {}",
                row.date, row.project, row.task_name, row.hours, row.description
            ))
        })?;
        self.navigation(&report.navigation)
    }

    fn show_team_report(&mut self, report: &TeamReport) -> Result<()> {
        self.warnings(&report.warnings)?;
        self.line(&format!("# {}", report.title))?;
        for row in &report.rows {
            self.line(&format!("\n## {} ({})", row.name, row.user))?;
            self.totals(&row.totals)?;
        }
        self.line("\n## Total")?;
        self.totals(&report.total)?;
        self.navigation(&report.navigation)
    }

    fn show_charts(&mut self, report: &ChartReport) -> Result<()> {
        self.warnings(&report.warnings)?;
        report
            .notices
            .iter()
            .try_for_each(|notice| self.line(notice))?;
        for chart in &report.charts {
            self.line(&format!("# {}", chart.name))?;
            self.line(&format!(
                "- size: {}x{} ({}, bars {})",
                chart.width_px, chart.height_px, chart.chart_type, chart.bar_format
            ))?;
            self.line(&format!("- data: s:{}", chart.encoded_series))?;
            self.line(&format!(
                "- axes: {} {}",
                chart.axis_labels.axes, chart.axis_labels.labels
            ))?;
            if let Some(positions) = &chart.axis_labels.positions {
                self.line(&format!("- positions: {}", positions))?;
            }
            self.line(&format!("- colors: {}", chart.color_scheme))?;
        }
        self.navigation(&report.navigation)
    }

    fn show_client_report(&mut self, report: &ClientReport) -> Result<()> {
        self.warnings(&report.warnings)?;
        self.line(&format!("# {}", report.title))?;
        for project in &report.projects {
            self.projects(std::slice::from_ref(&project.project))?;
            project.users.iter().try_for_each(|user| {
                self.line(&format!(
                    "  - {}: {:.2} [{}]",
                    user.user,
                    user.total_hours,
                    format_rates(&user.rates)
                ))
            })?;
        }
        self.line(&format!("- total: {:.2}", report.total_hours))?;
        self.navigation(&report.navigation)
    }

    fn show_client_summary(&mut self, summary: &ClientSummary) -> Result<()> {
        self.warnings(&summary.warnings)?;
        self.line(&format!(
            "# {} ({} ~ {})",
            summary.client, summary.period.start, summary.period.end
        ))?;
        self.line("\n## Hours")?;
        self.projects(&summary.projects)?;
        self.line("\n## Account")?;
        summary.ledger.rows.iter().try_for_each(|row| {
            self.line(&format!(
                "- {} {:?} {}: {} {} (balance {})",
                row.date, row.kind, row.concept, row.amount, summary.currency, row.balance
            ))
        })?;
        self.line(&format!(
            "- in: {} / out: {} / total: {} {}",
            summary.ledger.in_total, summary.ledger.out_total, summary.ledger.total, summary.currency
        ))?;
        self.navigation(&summary.navigation)
    }

    fn show_exported(&mut self, path: &Path) -> Result<()> {
        self.line(&format!("Exported: {}", path.display()))
    }

    fn show_redirect(&mut self, redirect: &Redirect) -> Result<()> {
        self.line(&format!("Access denied, login at {}", redirect.location))
    }
}

/// レポートをJSONで表示する。
pub struct ConsoleJson<'a, W: Write> {
    writer: &'a mut W,
}

impl<'a, W: Write> ConsoleJson<'a, W> {
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }

    fn write<T: Serialize>(&mut self, value: &T) -> Result<()> {
        serde_json::to_writer_pretty(&mut *self.writer, value).context("Failed to write json")?;
        writeln!(self.writer).context("Failed to write newline")
    }
}

impl<'a, W: Write> ConsolePresenter for ConsoleJson<'a, W> {
    fn show_user_report(&mut self, report: &UserReport) -> Result<()> {
        self.write(report)
    }

    fn show_team_report(&mut self, report: &TeamReport) -> Result<()> {
        self.write(report)
    }

    fn show_charts(&mut self, report: &ChartReport) -> Result<()> {
        self.write(report)
    }

    fn show_client_report(&mut self, report: &ClientReport) -> Result<()> {
        self.write(report)
    }

    fn show_client_summary(&mut self, summary: &ClientSummary) -> Result<()> {
        self.write(summary)
    }

    fn show_exported(&mut self, path: &Path) -> Result<()> {
        self.write(&serde_json::json!({ "exported": path }))
    }

    fn show_redirect(&mut self, redirect: &Redirect) -> Result<()> {
        self.write(redirect)
    }
}
