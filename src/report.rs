use std::collections::HashSet;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use log::{info, warn};
use serde::Serialize;

use crate::access::{resolve_scope, Principal, Scope, Target};
use crate::chart::{chart_payload, ChartKind, ChartPayload};
use crate::config::Config;
use crate::datetime;
use crate::error::ReportError;
use crate::hours::{aggregate, aggregate_many, HoursInput, HoursSeries, HoursTotals};
use crate::model::Project;
use crate::period::{Calendar, Direction, NavMode, Period, Shortcut};
use crate::repository::Repository;
use crate::summary::{
    account_summary, client_report, detailed, format_rates, summarize_by_project,
    ClientProjectReport, DetailRow, Ledger, OrderBy, ProjectSummary, RateBook,
};

/// 期間に関するリクエストパラメータ。日付は未検証の文字列のまま受け取る。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PeriodQuery {
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    /// `current_month`などの名前付きの期間。
    pub period: Option<String>,
    pub nav: NavMode,
    pub direction: Option<Direction>,
}

impl PeriodQuery {
    fn is_empty(&self) -> bool {
        self.from_date.is_none() && self.to_date.is_none() && self.period.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPeriod {
    pub period: Period,
    pub mode: NavMode,
    /// 既定値へ置き換えた理由。
    pub warnings: Vec<String>,
}

/// 前後の期間へのリンク。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Navigation {
    pub mode: NavMode,
    pub prev: Option<Period>,
    pub next: Option<Period>,
}

impl Navigation {
    fn around(calendar: &Calendar, period: Period, mode: NavMode) -> Self {
        Self {
            mode,
            prev: calendar.navigate(period, mode, Direction::Previous).ok(),
            next: calendar.navigate(period, mode, Direction::Next).ok(),
        }
    }
}

pub fn parse_date(s: &str, format: &str) -> Result<NaiveDate, ReportError> {
    NaiveDate::parse_from_str(s.trim(), format)
        .map_err(|_| ReportError::UnparsableDate(s.to_string()))
}

fn requested_period(
    query: &PeriodQuery,
    calendar: &Calendar,
    today: NaiveDate,
    date_format: &str,
) -> Result<Option<(Period, NavMode)>, ReportError> {
    if let Some(name) = &query.period {
        let shortcut = Shortcut::from_str(name)
            .map_err(|_| ReportError::UnknownPeriod(name.clone()))?;
        return calendar.shortcut(shortcut, today).map(Some);
    }

    match (&query.from_date, &query.to_date) {
        (None, None) => Ok(None),
        (Some(from), Some(to)) => {
            let start = parse_date(from, date_format)?;
            let end = parse_date(to, date_format)?;
            Ok(Some((Period::new(start, end)?, query.nav)))
        }
        _ => Err(ReportError::MissingDate),
    }
}

/// リクエストパラメータから期間を決める。
///
/// 名前付きの期間、明示的な日付の順に解釈し、どちらもなければ今週とする。
/// 不正な入力はリクエストを中断せず、今週に置き換えて警告を返す。
/// 移動方向が指定されていれば、最後に隣接する期間へ移動する。
///
/// # Arguments
///
/// * `query` - 期間に関するリクエストパラメータ
/// * `calendar` - 期間の境界を計算する`Calendar`
/// * `today` - 今日の日付
/// * `date_format` - 日付入力の書式
pub fn resolve_period(
    query: &PeriodQuery,
    calendar: &Calendar,
    today: NaiveDate,
    date_format: &str,
) -> ResolvedPeriod {
    let mut warnings = Vec::new();
    let (mut period, mode) = match requested_period(query, calendar, today, date_format) {
        Ok(Some(found)) => found,
        Ok(None) => (calendar.week(today), NavMode::Week),
        Err(err) => {
            warn!("{}, falling back to the current week", err);
            warnings.push(err.to_string());
            (calendar.week(today), NavMode::Week)
        }
    };

    if let Some(direction) = query.direction {
        match calendar.navigate(period, mode, direction) {
            Ok(adjacent) => period = adjacent,
            Err(err) => {
                warn!("Cannot navigate {:?}: {}", direction, err);
                warnings.push(err.to_string());
            }
        }
    }

    ResolvedPeriod {
        period,
        mode,
        warnings,
    }
}

/// 期間の説明文。
pub fn describe(period: Period, mode: NavMode) -> String {
    if period.start == period.end {
        return format!("on {}", period.start);
    }
    match mode {
        NavMode::Month => format!("during {}", period.start.format("%B %Y")),
        NavMode::Overtime => format!(
            "during the overtime period [{}, {}]",
            period.start, period.end
        ),
        NavMode::Week | NavMode::Custom => format!("between {} and {}", period.start, period.end),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Odt,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csv" => Ok(ExportFormat::Csv),
            "odt" => Ok(ExportFormat::Odt),
            _ => Err(format!("unknown export format: {}", s)),
        }
    }
}

/// 表形式のデータ。
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }
}

/// エクスポート用のデータ。描画やCSVへの変換は呼び出し側が行う。
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Export {
    pub format: ExportFormat,
    pub file_name: String,
    pub title: String,
    pub period: Period,
    pub table: Table,
    pub total_hours: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub location: String,
}

/// 1リクエストの処理結果。
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "payload", rename_all = "snake_case")]
pub enum Outcome<T> {
    Rendered(T),
    Exported(Export),
    /// アクセス権がないため認証画面へ戻す。
    Redirected(Redirect),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserReportRequest {
    pub user: String,
    pub query: PeriodQuery,
    pub project: Option<String>,
    pub export: Option<ExportFormat>,
    /// エントリー単位でエクスポートするかどうか。
    pub detailed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartRequest {
    pub users: Vec<String>,
    pub kind: ChartKind,
    pub query: PeriodQuery,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientReportRequest {
    pub client: String,
    pub query: PeriodQuery,
    pub export: Option<ExportFormat>,
    pub detailed: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientSummaryRequest {
    /// 会社のslug。クライアント自身のリクエストでは指定しない。
    pub client: Option<String>,
    pub query: PeriodQuery,
    pub order_by: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UserReport {
    pub user: String,
    pub name: String,
    pub title: String,
    pub period: Period,
    pub by_project: Vec<ProjectSummary>,
    pub detail: Vec<DetailRow>,
    pub projects: Vec<String>,
    pub total_hours: f64,
    pub total_hours_detailed: f64,
    pub hours: HoursTotals,
    pub navigation: Navigation,
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HoursRow {
    pub user: String,
    pub name: String,
    pub totals: HoursTotals,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TeamReport {
    pub title: String,
    pub period: Period,
    pub rows: Vec<HoursRow>,
    pub total: HoursTotals,
    pub navigation: Navigation,
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChartReport {
    pub period: Period,
    pub charts: Vec<ChartPayload>,
    pub notices: Vec<String>,
    pub navigation: Navigation,
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClientReport {
    pub client: String,
    pub title: String,
    pub period: Period,
    pub projects: Vec<ClientProjectReport>,
    pub total_hours: f64,
    pub navigation: Navigation,
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClientSummary {
    pub client: String,
    pub currency: String,
    pub period: Period,
    pub order: OrderBy,
    pub projects: Vec<ProjectSummary>,
    pub ledger: Ledger,
    pub navigation: Navigation,
    pub warnings: Vec<String>,
}

fn billable_projects(projects: &[Project]) -> HashSet<String> {
    projects
        .iter()
        .filter(|project| project.billable)
        .map(|project| project.external_id.clone())
        .collect()
}

fn format_hours(value: f64) -> String {
    format!("{:.2}", value)
}

fn file_name(stem: &str, subject: &str, period: Period, format: ExportFormat, detailed: bool) -> String {
    match (format, detailed) {
        (ExportFormat::Csv, false) => format!("{}_{}_{}_{}.csv", stem, subject, period.start, period.end),
        (ExportFormat::Csv, true) => format!("{}_{}_{}_{}_logs.csv", stem, subject, period.start, period.end),
        (ExportFormat::Odt, false) => format!("{}-{}.odt", stem, period.start.format("%Y-%m")),
        (ExportFormat::Odt, true) => format!("{}-{}-logs.odt", stem, period.start.format("%Y-%m")),
    }
}

fn detail_table(rows: &[DetailRow]) -> Table {
    let mut table = Table::new(&["date", "user", "project", "task", "hours", "description"]);
    table.rows = rows
        .iter()
        .map(|row| {
            vec![
                row.date.to_string(),
                row.user.clone(),
                row.project.clone(),
                row.task_name.clone(),
                format_hours(row.hours),
                row.description.clone(),
            ]
        })
        .collect();
    table
}

fn project_table(rows: &[ProjectSummary]) -> Table {
    let mut table = Table::new(&["project", "name", "hours", "rates"]);
    table.rows = rows
        .iter()
        .map(|row| {
            vec![
                row.project.clone(),
                row.name.clone(),
                format_hours(row.total_hours),
                format_rates(&row.rates),
            ]
        })
        .collect();
    table
}

fn client_table(rows: &[ClientProjectReport]) -> Table {
    let mut table = Table::new(&["project", "name", "user", "hours", "rates"]);
    table.rows = rows
        .iter()
        .flat_map(|report| {
            report.users.iter().map(move |user| {
                vec![
                    report.project.project.clone(),
                    report.project.name.clone(),
                    user.user.clone(),
                    format_hours(user.total_hours),
                    format_rates(&user.rates),
                ]
            })
        })
        .collect();
    table
}

/// リクエストごとにアクセス範囲と期間を決め、集計結果を組み立てる。
///
/// # Examples
///
/// ```
/// let service = ReportService::new(&snapshot, calendar, &config);
/// let outcome = service.user_report(&principal, &request)?;
/// ```
pub struct ReportService<'a, R: Repository> {
    repo: &'a R,
    calendar: Calendar,
    date_format: String,
    login_url: String,
}

impl<'a, R: Repository> ReportService<'a, R> {
    /// 新しい`ReportService`を返す。
    ///
    /// # Arguments
    ///
    /// * `repo` - データを取得するためのリポジトリ
    /// * `calendar` - 期間の境界を計算する`Calendar`
    /// * `config` - 日付の書式とリダイレクト先を含む設定
    pub fn new(repo: &'a R, calendar: Calendar, config: &Config) -> Self {
        Self {
            repo,
            calendar,
            date_format: config.date_format.clone(),
            login_url: config.login_url.clone(),
        }
    }

    fn resolve(&self, query: &PeriodQuery) -> ResolvedPeriod {
        let resolved = resolve_period(query, &self.calendar, datetime::today(), &self.date_format);
        info!(
            "Period: {} ~ {} ({:?})",
            resolved.period.start, resolved.period.end, resolved.mode
        );
        resolved
    }

    fn navigation(&self, resolved: &ResolvedPeriod) -> Navigation {
        Navigation::around(&self.calendar, resolved.period, resolved.mode)
    }

    fn redirect<T>(&self, principal: &Principal, next: &str) -> Outcome<T> {
        warn!("{} is not allowed to access {}", principal.username, next);
        Outcome::Redirected(Redirect {
            location: format!("{}?next={}", self.login_url, next),
        })
    }

    fn hours_input(&self, username: &str, period: Period) -> HoursInput {
        HoursInput {
            username: username.to_string(),
            entries: self.repo.time_logs(username, period.start, period.end),
            avg_hours: self.repo.avg_hours(username),
            wages: self.repo.wages(username),
        }
    }

    /// ユーザー1人のレポートを作る。
    ///
    /// 部分的なアクセスでは、自分自身の明細以外のエクスポートは認証画面へ戻す。
    pub fn user_report(
        &self,
        principal: &Principal,
        request: &UserReportRequest,
    ) -> Result<Outcome<UserReport>> {
        let next = format!("/efi/reporte/{}/", request.user);
        let scope = resolve_scope(principal, Target::User(&request.user));
        if scope.is_denied() {
            return Ok(self.redirect(principal, &next));
        }
        if request.export.is_some() && !scope.can_export(principal, &request.user, request.detailed) {
            return Ok(self.redirect(principal, &next));
        }

        let profile = self
            .repo
            .profile(&request.user)
            .ok_or_else(|| anyhow!("Unknown user: {}", request.user))?;
        let resolved = self.resolve(&request.query);
        let period = resolved.period;
        let projects = self.repo.projects();
        let assocs = self.repo.project_assocs();
        let book = RateBook::new(&projects, &assocs);
        let input = self.hours_input(&request.user, period);
        let detail = detailed(&input.entries, period, request.project.as_deref());
        let visibility = principal.visibility();

        if let Some(format) = request.export {
            let (table, total_hours) = if request.detailed {
                (detail_table(&detail), detail.iter().map(|row| row.hours).sum())
            } else {
                let rows = summarize_by_project(&input.entries, &book, period, visibility.is_full());
                (project_table(&rows), rows.iter().map(|row| row.total_hours).sum())
            };
            info!("Exporting report of {} as {:?}", request.user, format);
            return Ok(Outcome::Exported(Export {
                format,
                file_name: file_name("reverse_billing", &request.user, period, format, request.detailed),
                title: profile.display_name(),
                period,
                table,
                total_hours,
            }));
        }

        let by_project = summarize_by_project(&input.entries, &book, period, false);
        let series = aggregate(&input, &billable_projects(&projects), period, visibility);
        let mut names: Vec<String> = by_project.iter().map(|row| row.project.clone()).collect();
        names.sort();

        Ok(Outcome::Rendered(UserReport {
            user: request.user.clone(),
            name: profile.display_name(),
            title: format!("Hours of {} {}", profile.display_name(), describe(period, resolved.mode)),
            period,
            total_hours: by_project.iter().map(|row| row.total_hours).sum(),
            total_hours_detailed: detail.iter().map(|row| row.hours).sum(),
            by_project,
            detail,
            projects: names,
            hours: series.totals,
            navigation: self.navigation(&resolved),
            warnings: resolved.warnings,
        }))
    }

    /// 閲覧できる社内ユーザー全員の作業時間を一覧にする。
    pub fn team_report(&self, principal: &Principal, query: &PeriodQuery) -> Result<Outcome<TeamReport>> {
        let scope = resolve_scope(principal, Target::Team);
        if scope.is_denied() {
            return Ok(self.redirect(principal, "/efi/"));
        }

        let resolved = self.resolve(query);
        let period = resolved.period;
        let visibility = principal.visibility();
        let billable = billable_projects(&self.repo.projects());

        let mut total = HoursSeries::zero(period, visibility);
        let mut rows = Vec::new();
        for profile in self
            .repo
            .profiles()
            .into_iter()
            .filter(|profile| !profile.is_client() && scope.allows(&profile.username))
        {
            let series = aggregate(
                &self.hours_input(&profile.username, period),
                &billable,
                period,
                visibility,
            );
            total.add(&series)?;
            rows.push(HoursRow {
                user: profile.username.clone(),
                name: profile.display_name(),
                totals: series.totals,
            });
        }

        Ok(Outcome::Rendered(TeamReport {
            title: format!("Hours logged {}", describe(period, resolved.mode)),
            period,
            rows,
            total: total.totals,
            navigation: self.navigation(&resolved),
            warnings: resolved.warnings,
        }))
    }

    /// グラフのデータを作る。
    ///
    /// 全権限を持つユーザーは任意のユーザーのグラフを、それ以外は自分自身のグラフのみ見られる。
    pub fn charts(&self, principal: &Principal, request: &ChartRequest) -> Result<Outcome<ChartReport>> {
        let scope = match request.users.as_slice() {
            [only] => resolve_scope(principal, Target::User(only)),
            _ => resolve_scope(principal, Target::Team),
        };
        let permitted = match &scope {
            Scope::Full => true,
            Scope::Partial(_) => request.users == [principal.username.clone()],
            Scope::Denied => false,
        };
        if !permitted {
            return Ok(self.redirect(principal, "/efi/charts/"));
        }

        let resolved = self.resolve(&request.query);
        let period = resolved.period;
        let visibility = principal.visibility();
        let billable = billable_projects(&self.repo.projects());
        let mut warnings = resolved.warnings.clone();
        let mut notices = Vec::new();

        let profiles: Vec<_> = request
            .users
            .iter()
            .filter_map(|user| {
                let profile = self.repo.profile(user);
                if profile.is_none() {
                    warnings.push(format!("unknown user: {}", user));
                }
                profile
            })
            .collect();

        let charts = if profiles.is_empty() {
            notices.push("No user/s selected.".to_string());
            Vec::new()
        } else {
            match request.kind {
                ChartKind::MultiGraph => profiles
                    .iter()
                    .map(|profile| {
                        let series = aggregate(
                            &self.hours_input(&profile.username, period),
                            &billable,
                            period,
                            visibility,
                        );
                        chart_payload(profile.display_name(), &series, 1, visibility)
                    })
                    .collect(),
                ChartKind::SumGraph => {
                    let inputs: Vec<HoursInput> = profiles
                        .iter()
                        .map(|profile| self.hours_input(&profile.username, period))
                        .collect();
                    let series = aggregate_many(&inputs, &billable, period, visibility);
                    let name = profiles
                        .iter()
                        .map(|profile| profile.display_name())
                        .collect::<Vec<_>>()
                        .join(", ");
                    vec![chart_payload(name, &series, profiles.len(), visibility)]
                }
            }
        };

        Ok(Outcome::Rendered(ChartReport {
            period,
            charts,
            notices,
            navigation: self.navigation(&resolved),
            warnings,
        }))
    }

    /// クライアントのレポートをプロジェクト・ユーザーごとに作る。全権限が必要。
    pub fn client_report(
        &self,
        principal: &Principal,
        request: &ClientReportRequest,
    ) -> Result<Outcome<ClientReport>> {
        let next = format!("/efi/reporte_cliente/{}/", request.client);
        if resolve_scope(principal, Target::Client(&request.client)) != Scope::Full {
            return Ok(self.redirect(principal, &next));
        }

        let client = self
            .repo
            .client(&request.client)
            .ok_or_else(|| anyhow!("Unknown client: {}", request.client))?;
        let resolved = self.resolve(&request.query);
        let period = resolved.period;
        let entries = self.repo.client_time_logs(&client.slug, period.start, period.end);
        let projects = self.repo.projects();
        let assocs = self.repo.project_assocs();
        let book = RateBook::new(&projects, &assocs);

        if let Some(format) = request.export {
            let (table, total_hours) = if request.detailed {
                let rows = detailed(&entries, period, None);
                (detail_table(&rows), rows.iter().map(|row| row.hours).sum())
            } else {
                let rows = client_report(&entries, &book, period, true);
                (client_table(&rows), rows.iter().map(|row| row.project.total_hours).sum())
            };
            info!("Exporting report of client {} as {:?}", client.slug, format);
            return Ok(Outcome::Exported(Export {
                format,
                file_name: file_name("billing", &client.slug, period, format, request.detailed),
                title: client.name,
                period,
                table,
                total_hours,
            }));
        }

        let rows = client_report(&entries, &book, period, true);
        Ok(Outcome::Rendered(ClientReport {
            title: format!("Report of {} {}", client.name, describe(period, resolved.mode)),
            client: client.name,
            period,
            total_hours: rows.iter().map(|row| row.project.total_hours).sum(),
            projects: rows,
            navigation: self.navigation(&resolved),
            warnings: resolved.warnings,
        }))
    }

    /// クライアントの口座明細を作る。
    ///
    /// 日付の指定がない場合は、最も古い書類の日付から今日まで(書類がなければ今週)とする。
    pub fn client_summary(
        &self,
        principal: &Principal,
        request: &ClientSummaryRequest,
    ) -> Result<Outcome<ClientSummary>> {
        let slug = match (&principal.company, &request.client) {
            (Some(_), Some(_)) => return Ok(self.redirect(principal, "/clients/summary/")),
            (Some(company), None) => company.clone(),
            (None, Some(slug)) => slug.clone(),
            (None, None) if principal.visibility().is_full() => {
                return Err(anyhow!("A client must be given"))
            }
            (None, None) => return Ok(self.redirect(principal, "/clients/summary/")),
        };
        let next = format!("/efi/administration/client_summary/{}/", slug);
        let scope = resolve_scope(principal, Target::Client(&slug));
        if scope.is_denied() {
            return Ok(self.redirect(principal, &next));
        }

        let client = self
            .repo
            .client(&slug)
            .ok_or_else(|| anyhow!("Unknown client: {}", slug))?;
        let resolved = if request.query.is_empty() {
            self.default_summary_period(&slug, request.query.nav)
        } else {
            self.resolve(&request.query)
        };
        let period = resolved.period;
        let order = OrderBy::parse(request.order_by.as_deref().unwrap_or("date"));

        let projects = self.repo.projects();
        let assocs = self.repo.project_assocs();
        let book = RateBook::new(&projects, &assocs);
        let entries = self.repo.client_time_logs(&slug, period.start, period.end);
        let documents = self.repo.documents(&slug, period.start, period.end);

        Ok(Outcome::Rendered(ClientSummary {
            client: client.name,
            currency: client.currency,
            period,
            order,
            projects: summarize_by_project(&entries, &book, period, scope == Scope::Full),
            ledger: account_summary(&documents, period, order),
            navigation: self.navigation(&resolved),
            warnings: resolved.warnings,
        }))
    }

    fn default_summary_period(&self, slug: &str, nav: NavMode) -> ResolvedPeriod {
        let today = datetime::today();
        let since_first = self
            .repo
            .first_document_date(slug)
            .and_then(|first| Period::new(first, today).ok());
        match since_first {
            Some(period) => ResolvedPeriod {
                period,
                mode: nav,
                warnings: Vec::new(),
            },
            None => ResolvedPeriod {
                period: self.calendar.week(today),
                mode: NavMode::Week,
                warnings: Vec::new(),
            },
        }
    }
}
