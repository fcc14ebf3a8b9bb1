use std::path::{Path, PathBuf};

use anyhow::Result;
use log::info;

use crate::access::Principal;
use crate::chart::ChartKind;
use crate::console::ConsolePresenter;
use crate::export;
use crate::period::{Direction, NavMode};
use crate::report::{
    ChartRequest, ClientReportRequest, ClientSummaryRequest, ExportFormat, Outcome, PeriodQuery,
    ReportService, UserReportRequest,
};
use crate::repository::Repository;

/// 全サブコマンド共通の期間指定。
#[derive(Debug, Default, clap::Args)]
pub struct PeriodArgs {
    #[clap(long = "from", help = "Start date (inclusive), e.g. 2024-01-01")]
    from: Option<String>,

    #[clap(long = "to", help = "End date (inclusive), e.g. 2024-01-31")]
    to: Option<String>,

    #[clap(
        long = "period",
        help = "current_week, previous_week, current_month, last_month or overtime"
    )]
    period: Option<String>,

    #[clap(
        long = "nav",
        default_value = "custom",
        help = "Navigation mode: week, month, overtime or custom",
        parse(try_from_str)
    )]
    nav: NavMode,

    #[clap(long = "prev", help = "Move to the previous period", conflicts_with = "next")]
    prev: bool,

    #[clap(long = "next", help = "Move to the next period")]
    next: bool,
}

impl From<PeriodArgs> for PeriodQuery {
    fn from(args: PeriodArgs) -> Self {
        let direction = match (args.prev, args.next) {
            (true, _) => Some(Direction::Previous),
            (false, true) => Some(Direction::Next),
            (false, false) => None,
        };
        PeriodQuery {
            from_date: args.from,
            to_date: args.to,
            period: args.period,
            nav: args.nav,
            direction,
        }
    }
}

/// `report`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct ReportArgs {
    #[clap(help = "User to report on, defaults to the requesting user")]
    user: Option<String>,

    #[clap(long = "project", help = "Only show logs of this project")]
    project: Option<String>,

    #[clap(long = "export", help = "Export as csv or odt", parse(try_from_str))]
    export: Option<ExportFormat>,

    #[clap(long = "detailed", help = "Export every log instead of project totals")]
    detailed: bool,

    #[clap(long = "out", default_value = ".", help = "Directory to write exports to")]
    out: PathBuf,

    #[clap(flatten)]
    period: PeriodArgs,
}

#[derive(Debug, clap::Args)]
pub struct TeamArgs {
    #[clap(flatten)]
    period: PeriodArgs,
}

/// `chart`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct ChartArgs {
    #[clap(help = "Users to draw")]
    users: Vec<String>,

    #[clap(long = "sum", help = "Draw the sum of all users in a single chart")]
    sum: bool,

    #[clap(flatten)]
    period: PeriodArgs,
}

#[derive(Debug, clap::Args)]
pub struct ClientReportArgs {
    #[clap(help = "Client slug")]
    slug: String,

    #[clap(long = "export", help = "Export as csv or odt", parse(try_from_str))]
    export: Option<ExportFormat>,

    #[clap(long = "detailed", help = "Export every log instead of project totals")]
    detailed: bool,

    #[clap(long = "out", default_value = ".", help = "Directory to write exports to")]
    out: PathBuf,

    #[clap(flatten)]
    period: PeriodArgs,
}

/// `summary`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct SummaryArgs {
    #[clap(help = "Client slug, omitted when requesting as a client")]
    slug: Option<String>,

    #[clap(
        long = "order-by",
        help = "date, concept or amount, prefixed with - for descending order"
    )]
    order_by: Option<String>,

    #[clap(flatten)]
    period: PeriodArgs,
}

/// サブコマンドを表す列挙型。
#[derive(Debug, clap::Subcommand)]
pub enum SubCommands {
    /// Hours of a single user.
    Report(ReportArgs),
    /// Hours of every visible user.
    Team(TeamArgs),
    /// Chart data of one or more users.
    Chart(ChartArgs),
    /// Hours of a client broken down by project and user.
    ClientReport(ClientReportArgs),
    /// Account summary of a client.
    Summary(SummaryArgs),
}

/// 処理結果を表示する。エクスポートは`out`に保存してからパスを表示する。
fn present<T, P, F>(outcome: Outcome<T>, out: &Path, presenter: &mut P, show: F) -> Result<()>
where
    P: ConsolePresenter,
    F: FnOnce(&mut P, &T) -> Result<()>,
{
    match outcome {
        Outcome::Rendered(report) => show(presenter, &report),
        Outcome::Exported(export) => {
            let path = export::save(&export, out)?;
            presenter.show_exported(&path)
        }
        Outcome::Redirected(redirect) => presenter.show_redirect(&redirect),
    }
}

/// サブコマンドを実行し、結果を表示する。
///
/// # Arguments
///
/// * `service` - レポートを組み立てる`ReportService`
/// * `principal` - リクエストを行うユーザー
/// * `command` - 実行するサブコマンド
/// * `presenter` - 結果の表示先
pub fn run<R: Repository, P: ConsolePresenter>(
    service: &ReportService<R>,
    principal: &Principal,
    command: SubCommands,
    presenter: &mut P,
) -> Result<()> {
    match command {
        SubCommands::Report(args) => {
            let request = UserReportRequest {
                user: args.user.unwrap_or_else(|| principal.username.clone()),
                query: args.period.into(),
                project: args.project,
                export: args.export,
                detailed: args.detailed,
            };
            info!("Report of {} requested by {}", request.user, principal.username);
            let outcome = service.user_report(principal, &request)?;
            present(outcome, &args.out, presenter, |p, r| p.show_user_report(r))
        }
        SubCommands::Team(args) => {
            let outcome = service.team_report(principal, &args.period.into())?;
            present(outcome, Path::new("."), presenter, |p, r| p.show_team_report(r))
        }
        SubCommands::Chart(args) => {
            let request = ChartRequest {
                users: args.users,
                kind: if args.sum {
                    ChartKind::SumGraph
                } else {
                    ChartKind::MultiGraph
                },
                query: args.period.into(),
            };
            let outcome = service.charts(principal, &request)?;
            present(outcome, Path::new("."), presenter, |p, r| p.show_charts(r))
        }
        SubCommands::ClientReport(args) => {
            let request = ClientReportRequest {
                client: args.slug,
                query: args.period.into(),
                export: args.export,
                detailed: args.detailed,
            };
            let outcome = service.client_report(principal, &request)?;
            present(outcome, &args.out, presenter, |p, r| p.show_client_report(r))
        }
        SubCommands::Summary(args) => {
            let request = ClientSummaryRequest {
                client: args.slug,
                query: args.period.into(),
                order_by: args.order_by,
            };
            let outcome = service.client_summary(principal, &request)?;
            present(outcome, Path::new("."), presenter, |p, r| p.show_client_summary(r))
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{run, PeriodArgs, SubCommands, TeamArgs};
    use crate::access::Principal;
    use crate::config::Config;
    use crate::console::ConsoleMarkdownList;
    use crate::period::{Calendar, Direction, NavMode};
    use crate::report::{PeriodQuery, ReportService};
    use crate::repository::{Repository, Snapshot};

    #[rstest]
    #[case::none(false, false, None)]
    #[case::prev(true, false, Some(Direction::Previous))]
    #[case::next(false, true, Some(Direction::Next))]
    fn test_period_args_into_query(
        #[case] prev: bool,
        #[case] next: bool,
        #[case] direction: Option<Direction>,
    ) {
        let args = PeriodArgs {
            from: Some("2024-01-01".to_string()),
            to: Some("2024-01-31".to_string()),
            nav: NavMode::Month,
            prev,
            next,
            ..Default::default()
        };

        let query: PeriodQuery = args.into();

        assert_eq!(query.from_date.as_deref(), Some("2024-01-01"));
        assert_eq!(query.nav, NavMode::Month);
        assert_eq!(query.direction, direction);
    }

    fn snapshot() -> Snapshot {
        serde_json::from_str::<Snapshot>(
            r#"{
                "users": [
                    {"username": "alice", "first_name": "Alice"},
                    {"username": "acme-user", "company": "acme"}
                ],
                "time_logs": [
                    {"user": "alice", "date": "2024-01-02", "project": "A", "task_name": "dev", "hours_booked": 2.5}
                ]
            }"#,
        )
        .unwrap()
        .sanitize()
    }

    #[test]
    fn test_run_team() {
        let repo = snapshot();
        let service = ReportService::new(&repo, Calendar::default(), &Config::default());
        let alice = Principal::from_profile(&repo.profile("alice").unwrap());
        let command = SubCommands::Team(TeamArgs {
            period: PeriodArgs {
                from: Some("2024-01-01".to_string()),
                to: Some("2024-01-07".to_string()),
                ..Default::default()
            },
        });
        let mut writer = Vec::new();
        let mut presenter = ConsoleMarkdownList::new(&mut writer);

        run(&service, &alice, command, &mut presenter).unwrap();

        let output = String::from_utf8(writer).unwrap();
        assert!(output.starts_with("# Hours logged between 2024-01-01 and 2024-01-07\n"));
        assert!(output.contains("- worked: 2.50 / loggable: 0.00 / billable: 0.00\n"));
    }

    #[test]
    fn test_run_team_as_client_redirects() {
        let repo = snapshot();
        let service = ReportService::new(&repo, Calendar::default(), &Config::default());
        let client = Principal::from_profile(&repo.profile("acme-user").unwrap());
        let command = SubCommands::Team(TeamArgs {
            period: PeriodArgs::default(),
        });
        let mut writer = Vec::new();
        let mut presenter = ConsoleMarkdownList::new(&mut writer);

        run(&service, &client, command, &mut presenter).unwrap();

        assert_eq!(
            String::from_utf8(writer).unwrap(),
            "Access denied, login at /accounts/login/?next=/efi/\n"
        );
    }
}
