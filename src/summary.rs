use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::NaiveDate;
use log::debug;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::model::{CommercialDocument, DocumentKind, PaymentStatus, Project, ProjectAssoc, TimeLogEntry};
use crate::period::Period;

/// 1つのエントリーに適用された`(クライアント単価, ユーザー単価)`の組。
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RatePair {
    pub client_rate: Option<Decimal>,
    pub user_rate: Option<Decimal>,
}

impl fmt::Display for RatePair {
    /// `クライアント単価/ユーザー単価`。未設定の単価は`-`。
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rate = |r: Option<Decimal>| r.map_or("-".to_string(), |r| r.to_string());
        write!(f, "{}/{}", rate(self.client_rate), rate(self.user_rate))
    }
}

/// 単価の組を`; `区切りで並べる。
pub(crate) fn format_rates(rates: &[RatePair]) -> String {
    rates
        .iter()
        .map(RatePair::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProjectSummary {
    pub project: String,
    pub name: String,
    pub client: String,
    pub total_hours: f64,
    /// 期間内に観測された単価の組。重複なしの降順。
    pub rates: Vec<RatePair>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UserSummary {
    pub user: String,
    pub total_hours: f64,
    pub rates: Vec<RatePair>,
}

/// クライアントレポートの1プロジェクト分。
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClientProjectReport {
    pub project: ProjectSummary,
    pub users: Vec<UserSummary>,
}

/// エントリー単位の明細行。
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetailRow {
    pub date: NaiveDate,
    pub user: String,
    pub project: String,
    pub task_name: String,
    pub hours: f64,
    pub description: String,
}

/// 単価の解決に使う参照データ。
pub struct RateBook<'a> {
    projects: HashMap<&'a str, &'a Project>,
    assocs: &'a [ProjectAssoc],
}

impl<'a> RateBook<'a> {
    pub fn new(projects: &'a [Project], assocs: &'a [ProjectAssoc]) -> Self {
        Self {
            projects: projects
                .iter()
                .map(|project| (project.external_id.as_str(), project))
                .collect(),
            assocs,
        }
    }

    pub fn project(&self, external_id: &str) -> Option<&'a Project> {
        self.projects.get(external_id).copied()
    }

    /// エントリーの日付で有効な割り当ての単価を優先し、なければプロジェクトの既定単価を返す。
    fn rate_for(&self, entry: &TimeLogEntry) -> RatePair {
        let project = self.project(&entry.project);
        let assoc = self
            .assocs
            .iter()
            .filter(|assoc| {
                assoc.member == entry.user && assoc.project == entry.project && assoc.covers(entry.date)
            })
            .max_by_key(|assoc| assoc.from_date);

        RatePair {
            client_rate: assoc
                .and_then(|a| a.client_rate)
                .or_else(|| project.and_then(|p| p.client_rate)),
            user_rate: assoc
                .and_then(|a| a.user_rate)
                .or_else(|| project.and_then(|p| p.user_rate)),
        }
    }
}

#[derive(Default)]
struct Group {
    hours: f64,
    rates: BTreeSet<RatePair>,
}

fn group_by<'e, F>(
    entries: &'e [TimeLogEntry],
    period: Period,
    rates: Option<&RateBook>,
    key: F,
) -> BTreeMap<String, Group>
where
    F: Fn(&'e TimeLogEntry) -> &'e str,
{
    entries
        .iter()
        .filter(|entry| period.contains(entry.date))
        .fold(BTreeMap::new(), |mut acc: BTreeMap<String, Group>, entry| {
            let group = acc.entry(key(entry).to_string()).or_default();
            group.hours += entry.hours_booked;
            if let Some(book) = rates {
                group.rates.insert(book.rate_for(entry));
            }
            acc
        })
}

fn descending(rates: BTreeSet<RatePair>) -> Vec<RatePair> {
    rates.into_iter().rev().collect()
}

fn by_hours(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// プロジェクトごとに作業時間を合計する。
///
/// 結果は合計時間の昇順。`with_rates`が指定された場合、期間内に観測された単価の組を全て返す。
///
/// # Arguments
///
/// * `entries` - 集計対象のエントリー
/// * `book` - プロジェクトと割り当ての参照データ
/// * `period` - 集計期間
/// * `with_rates` - 単価を含めるかどうか
pub fn summarize_by_project(
    entries: &[TimeLogEntry],
    book: &RateBook,
    period: Period,
    with_rates: bool,
) -> Vec<ProjectSummary> {
    let groups = group_by(entries, period, with_rates.then_some(book), |entry| {
        entry.project.as_str()
    });

    let mut summaries: Vec<ProjectSummary> = groups
        .into_iter()
        .map(|(project, group)| {
            let (name, client) = book
                .project(&project)
                .map(|p| (p.name.clone(), p.client.clone()))
                .unwrap_or_else(|| (project.clone(), String::new()));
            ProjectSummary {
                project,
                name,
                client,
                total_hours: group.hours,
                rates: descending(group.rates),
            }
        })
        .collect();
    summaries.sort_by(|a, b| by_hours(a.total_hours, b.total_hours));
    summaries
}

/// ユーザーごとに作業時間を合計する。並び順と単価の扱いは`summarize_by_project`と同じ。
pub fn summarize_by_user(
    entries: &[TimeLogEntry],
    book: &RateBook,
    period: Period,
    with_rates: bool,
) -> Vec<UserSummary> {
    let groups = group_by(entries, period, with_rates.then_some(book), |entry| {
        entry.user.as_str()
    });

    let mut summaries: Vec<UserSummary> = groups
        .into_iter()
        .map(|(user, group)| UserSummary {
            user,
            total_hours: group.hours,
            rates: descending(group.rates),
        })
        .collect();
    summaries.sort_by(|a, b| by_hours(a.total_hours, b.total_hours));
    summaries
}

/// プロジェクトごとの合計と、その内訳となるユーザーごとの合計を返す。
pub fn client_report(
    entries: &[TimeLogEntry],
    book: &RateBook,
    period: Period,
    with_rates: bool,
) -> Vec<ClientProjectReport> {
    summarize_by_project(entries, book, period, with_rates)
        .into_iter()
        .map(|project| {
            let project_entries: Vec<TimeLogEntry> = entries
                .iter()
                .filter(|entry| entry.project == project.project)
                .cloned()
                .collect();
            let users = summarize_by_user(&project_entries, book, period, with_rates);
            ClientProjectReport { project, users }
        })
        .collect()
}

/// 期間内のエントリーを日付順の明細にする。`project`を指定するとそのプロジェクトのみ。
pub fn detailed(entries: &[TimeLogEntry], period: Period, project: Option<&str>) -> Vec<DetailRow> {
    let mut rows: Vec<DetailRow> = entries
        .iter()
        .filter(|entry| period.contains(entry.date))
        .filter(|entry| project.map_or(true, |p| entry.project == p))
        .map(|entry| DetailRow {
            date: entry.date,
            user: entry.user.clone(),
            project: entry.project.clone(),
            task_name: entry.task_name.clone(),
            hours: entry.hours_booked,
            description: entry.description.clone(),
        })
        .collect();
    rows.sort_by_key(|row| row.date);
    rows
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKey {
    Date,
    Concept,
    Amount,
}

/// 書類の並び順。`-`で始まる場合は降順。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct OrderBy {
    pub key: OrderKey,
    pub descending: bool,
}

impl Default for OrderBy {
    fn default() -> Self {
        Self {
            key: OrderKey::Date,
            descending: false,
        }
    }
}

impl OrderBy {
    /// 並び順をパースする。未知のキーは日付の昇順にする。
    pub fn parse(s: &str) -> Self {
        let (descending, key) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let key = match key {
            "date" => OrderKey::Date,
            "concept" => OrderKey::Concept,
            "amount" => OrderKey::Amount,
            _ => {
                debug!("Unknown order key {:?}, ordering by date", s);
                return Self::default();
            }
        };
        Self { key, descending }
    }

    fn compare(&self, a: &CommercialDocument, b: &CommercialDocument) -> Ordering {
        let ordering = match self.key {
            OrderKey::Date => a.date.cmp(&b.date),
            OrderKey::Concept => a.concept.cmp(&b.concept),
            OrderKey::Amount => a.amount.cmp(&b.amount),
        };
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LedgerRow {
    pub date: NaiveDate,
    pub kind: DocumentKind,
    pub concept: String,
    pub amount: Decimal,
    pub status: Option<PaymentStatus>,
    /// この行までの残高。
    pub balance: Decimal,
}

/// クライアントの口座明細。
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Ledger {
    pub rows: Vec<LedgerRow>,
    pub in_total: Decimal,
    pub out_total: Decimal,
    pub total: Decimal,
}

/// 期間内の書類から口座明細を作る。`total = 入金予定の合計 - 支払済みの合計`。
pub fn account_summary(documents: &[CommercialDocument], period: Period, order: OrderBy) -> Ledger {
    let mut documents: Vec<&CommercialDocument> = documents
        .iter()
        .filter(|doc| period.contains(doc.date))
        .collect();
    documents.sort_by(|a, b| order.compare(a, b));

    let mut in_total = Decimal::ZERO;
    let mut out_total = Decimal::ZERO;
    let mut balance = Decimal::ZERO;
    let rows = documents
        .into_iter()
        .map(|doc| {
            match doc.kind {
                DocumentKind::Payment => out_total += doc.amount,
                DocumentKind::Billing | DocumentKind::CreditNote => in_total += doc.amount,
            }
            balance += doc.kind.sign() * doc.amount;
            LedgerRow {
                date: doc.date,
                kind: doc.kind,
                concept: doc.concept.clone(),
                amount: doc.amount,
                status: doc.status,
                balance,
            }
        })
        .collect();

    Ledger {
        rows,
        in_total,
        out_total,
        total: in_total - out_total,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rstest::rstest;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::{
        account_summary, client_report, detailed, format_rates, summarize_by_project,
        summarize_by_user, OrderBy, OrderKey, RateBook, RatePair,
    };
    use crate::model::{
        BillingType, CommercialDocument, DocumentKind, PaymentStatus, Project, ProjectAssoc,
        TimeLogEntry,
    };
    use crate::period::Period;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn period(from: u32, to: u32) -> Period {
        Period::new(day(from), day(to)).unwrap()
    }

    fn entry(user: &str, d: u32, project: &str, hours: f64) -> TimeLogEntry {
        TimeLogEntry {
            user: user.to_string(),
            date: day(d),
            project: project.to_string(),
            task_name: "task".to_string(),
            description: format!("{} on {}", project, d),
            hours_booked: hours,
            dump: None,
        }
    }

    fn project(id: &str, client_rate: Decimal, user_rate: Decimal) -> Project {
        Project {
            external_id: id.to_string(),
            name: format!("Project {}", id),
            client: "acme".to_string(),
            billable: true,
            billing_type: BillingType::Hourly,
            client_rate: Some(client_rate),
            user_rate: Some(user_rate),
        }
    }

    fn document(kind: DocumentKind, d: u32, amount: Decimal, concept: &str) -> CommercialDocument {
        CommercialDocument {
            client: "acme".to_string(),
            kind,
            date: day(d),
            amount,
            concept: concept.to_string(),
            status: (kind == DocumentKind::Payment).then_some(PaymentStatus::Settled),
        }
    }

    #[test]
    fn test_summarize_by_project_ascending_hours() {
        let projects = vec![project("A", dec!(50), dec!(20)), project("B", dec!(40), dec!(15))];
        let book = RateBook::new(&projects, &[]);
        let entries = vec![
            entry("alice", 1, "A", 3.0),
            entry("alice", 2, "A", 2.0),
            entry("alice", 1, "B", 1.0),
        ];

        let summaries = summarize_by_project(&entries, &book, period(1, 2), false);
        let result: Vec<(&str, f64)> = summaries
            .iter()
            .map(|s| (s.project.as_str(), s.total_hours))
            .collect();

        assert_eq!(result, vec![("B", 1.0), ("A", 5.0)]);
        assert!(summaries.iter().all(|s| s.rates.is_empty()));
        assert_eq!(summaries[0].name, "Project B");
    }

    /// 期間の途中で割り当ての単価が変わる場合、全ての単価の組を降順で返す。
    #[test]
    fn test_summarize_by_project_reports_all_rates() {
        let projects = vec![project("A", dec!(50), dec!(20))];
        let assocs = vec![ProjectAssoc {
            member: "alice".to_string(),
            project: "A".to_string(),
            from_date: day(3),
            to_date: Some(day(5)),
            client_rate: Some(dec!(60)),
            user_rate: None,
        }];
        let book = RateBook::new(&projects, &assocs);
        let entries = vec![
            entry("alice", 1, "A", 1.0),
            entry("alice", 3, "A", 1.0),
            entry("alice", 4, "A", 1.0),
            entry("alice", 5, "A", 1.0),
        ];

        let summaries = summarize_by_project(&entries, &book, period(1, 5), true);

        assert_eq!(
            summaries[0].rates,
            vec![
                RatePair {
                    client_rate: Some(dec!(60)),
                    user_rate: Some(dec!(20)),
                },
                RatePair {
                    client_rate: Some(dec!(50)),
                    user_rate: Some(dec!(20)),
                },
            ]
        );
        assert_eq!(summaries[0].total_hours, 4.0);
    }

    #[test]
    fn test_format_rates() {
        let rates = vec![
            RatePair {
                client_rate: Some(dec!(60)),
                user_rate: Some(dec!(20.5)),
            },
            RatePair {
                client_rate: None,
                user_rate: None,
            },
        ];

        assert_eq!(format_rates(&rates), "60/20.5; -/-");
        assert_eq!(format_rates(&[]), "");
    }

    #[test]
    fn test_summarize_by_user() {
        let projects = vec![project("A", dec!(50), dec!(20))];
        let book = RateBook::new(&projects, &[]);
        let entries = vec![
            entry("alice", 1, "A", 4.0),
            entry("bob", 1, "A", 1.0),
            entry("bob", 2, "A", 1.5),
        ];

        let users = summarize_by_user(&entries, &book, period(1, 2), true);
        let result: Vec<(&str, f64)> = users.iter().map(|u| (u.user.as_str(), u.total_hours)).collect();

        assert_eq!(result, vec![("bob", 2.5), ("alice", 4.0)]);
        assert_eq!(users[0].rates.len(), 1);
    }

    #[test]
    fn test_client_report_breaks_down_users() {
        let projects = vec![project("A", dec!(50), dec!(20)), project("B", dec!(40), dec!(15))];
        let book = RateBook::new(&projects, &[]);
        let entries = vec![
            entry("alice", 1, "A", 4.0),
            entry("bob", 1, "A", 1.0),
            entry("bob", 2, "B", 2.0),
        ];

        let report = client_report(&entries, &book, period(1, 2), false);

        assert_eq!(report.len(), 2);
        assert_eq!(report[0].project.project, "B");
        assert_eq!(report[1].project.total_hours, 5.0);
        assert_eq!(report[1].users.len(), 2);
    }

    #[test]
    fn test_detailed_sorted_and_filtered() {
        let entries = vec![
            entry("alice", 3, "A", 1.0),
            entry("alice", 1, "B", 2.0),
            entry("alice", 2, "A", 3.0),
            entry("alice", 9, "A", 3.0),
        ];

        let all = detailed(&entries, period(1, 5), None);
        let only_a = detailed(&entries, period(1, 5), Some("A"));

        assert_eq!(all.iter().map(|r| r.date).collect::<Vec<_>>(), vec![day(1), day(2), day(3)]);
        assert_eq!(only_a.iter().map(|r| r.hours).collect::<Vec<_>>(), vec![3.0, 1.0]);
    }

    #[test]
    fn test_account_summary_total() {
        let documents = vec![
            document(DocumentKind::Billing, 1, dec!(100), "January"),
            document(DocumentKind::Payment, 2, dec!(40), "Transfer"),
            document(DocumentKind::CreditNote, 3, dec!(10), "Discount"),
            // 期間外
            document(DocumentKind::Billing, 20, dec!(500), "Later"),
        ];

        let ledger = account_summary(&documents, period(1, 10), OrderBy::default());

        assert_eq!(ledger.total, dec!(70));
        assert_eq!(ledger.in_total, dec!(110));
        assert_eq!(ledger.out_total, dec!(40));
        assert_eq!(
            ledger.rows.iter().map(|r| r.balance).collect::<Vec<_>>(),
            vec![dec!(100), dec!(60), dec!(70)]
        );
    }

    /// 訂正のためのマイナスの請求も入金予定として扱い、合計と最後の残高が一致する。
    #[test]
    fn test_account_summary_negative_billing() {
        let documents = vec![
            document(DocumentKind::Billing, 1, dec!(100), "January"),
            document(DocumentKind::Billing, 2, dec!(-20), "Correction"),
            document(DocumentKind::Payment, 3, dec!(30), "Transfer"),
        ];

        let ledger = account_summary(&documents, period(1, 10), OrderBy::default());

        assert_eq!(ledger.in_total, dec!(80));
        assert_eq!(ledger.out_total, dec!(30));
        assert_eq!(ledger.total, dec!(50));
        assert_eq!(ledger.rows.last().map(|r| r.balance), Some(ledger.total));
    }

    #[rstest]
    #[case::date("date", OrderKey::Date, false)]
    #[case::concept_desc("-concept", OrderKey::Concept, true)]
    #[case::amount("amount", OrderKey::Amount, false)]
    #[case::bogus("bogus", OrderKey::Date, false)]
    #[case::bogus_desc("-bogus", OrderKey::Date, false)]
    fn test_order_by_parse(#[case] input: &str, #[case] key: OrderKey, #[case] descending: bool) {
        assert_eq!(OrderBy::parse(input), OrderBy { key, descending });
    }

    #[rstest]
    #[case::amount_desc("-amount", vec!["a", "c", "b"])]
    #[case::concept("concept", vec!["a", "b", "c"])]
    #[case::bogus("bogus", vec!["b", "a", "c"])]
    #[case::date("date", vec!["b", "a", "c"])]
    fn test_account_summary_order(#[case] order: &str, #[case] expected: Vec<&str>) {
        let documents = vec![
            document(DocumentKind::Billing, 2, dec!(300), "a"),
            document(DocumentKind::Billing, 1, dec!(100), "b"),
            document(DocumentKind::Billing, 3, dec!(200), "c"),
        ];

        let ledger = account_summary(&documents, period(1, 5), OrderBy::parse(order));

        assert_eq!(
            ledger.rows.iter().map(|r| r.concept.as_str()).collect::<Vec<_>>(),
            expected
        );
    }
}
