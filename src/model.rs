use std::collections::BTreeSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// ユーザーが1日に1プロジェクトへ記録した作業時間。
///
/// 作成後に変更されることはない。同じ日・同じプロジェクト・同じタスクの行が複数あってもよい。
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct TimeLogEntry {
    pub user: String,
    pub date: NaiveDate,
    /// プロジェクトの外部ID。
    pub project: String,
    pub task_name: String,
    #[serde(default)]
    pub description: String,
    pub hours_booked: f64,
    /// このエントリーを作成したインポート(dump)のID。
    #[serde(default)]
    pub dump: Option<u64>,
}

/// ユーザーアカウントごとのプロフィール。
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct UserProfile {
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    /// クライアントアカウントの場合のみ、請求先の会社(slug)を持つ。
    #[serde(default)]
    pub company: Option<String>,
    /// レポートを閲覧できる他ユーザー。
    #[serde(default)]
    pub watches: BTreeSet<String>,
    #[serde(default)]
    pub capabilities: BTreeSet<Capability>,
}

impl UserProfile {
    pub fn is_client(&self) -> bool {
        self.company.is_some()
    }

    /// 表示用の名前。名前が未設定ならユーザー名を返す。
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

/// 権限チェックで扱う権限。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ViewBillable,
    ViewWage,
}

/// 日付から有効になる値の共通インターフェース。
pub trait Dated {
    fn effective_from(&self) -> NaiveDate;
}

/// 時給。後続のレコードが現れるまで有効。
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Wage {
    pub user: String,
    pub date: NaiveDate,
    pub amount_per_hour: Decimal,
}

impl Dated for Wage {
    fn effective_from(&self) -> NaiveDate {
        self.date
    }
}

/// 1日あたりの平均(想定)作業時間。
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AvgHours {
    pub user: String,
    pub date: NaiveDate,
    pub hours: f64,
}

impl Dated for AvgHours {
    fn effective_from(&self) -> NaiveDate {
        self.date
    }
}

/// `date <= day`を満たす最新のレコードを返す。
pub fn effective_on<T: Dated>(records: &[T], day: NaiveDate) -> Option<&T> {
    records
        .iter()
        .filter(|record| record.effective_from() <= day)
        .max_by_key(|record| record.effective_from())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingType {
    Hourly,
    FixedPrice,
}

/// クライアントに属するプロジェクト。
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Project {
    /// インポートデータとの突き合わせに使う外部ID。
    pub external_id: String,
    pub name: String,
    /// クライアントのslug。
    pub client: String,
    #[serde(default)]
    pub billable: bool,
    pub billing_type: BillingType,
    #[serde(default)]
    pub client_rate: Option<Decimal>,
    #[serde(default)]
    pub user_rate: Option<Decimal>,
}

/// ユーザーとプロジェクトの割り当て。`[from_date, to_date)`の間有効。
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ProjectAssoc {
    pub member: String,
    pub project: String,
    pub from_date: NaiveDate,
    #[serde(default)]
    pub to_date: Option<NaiveDate>,
    #[serde(default)]
    pub client_rate: Option<Decimal>,
    #[serde(default)]
    pub user_rate: Option<Decimal>,
}

impl ProjectAssoc {
    pub fn covers(&self, day: NaiveDate) -> bool {
        self.from_date <= day && self.to_date.map_or(true, |to| day < to)
    }
}

/// 請求先の会社。
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Client {
    pub slug: String,
    pub name: String,
    pub currency: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Billing,
    CreditNote,
    Payment,
}

impl DocumentKind {
    /// 口座残高に対する符号。請求とクレジットノートは加算、支払いは減算。
    pub fn sign(self) -> Decimal {
        match self {
            DocumentKind::Billing | DocumentKind::CreditNote => Decimal::ONE,
            DocumentKind::Payment => Decimal::NEGATIVE_ONE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Settled,
}

/// 請求書・クレジットノート・支払いなどの金額付き書類。
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct CommercialDocument {
    pub client: String,
    pub kind: DocumentKind,
    pub date: NaiveDate,
    pub amount: Decimal,
    #[serde(default)]
    pub concept: String,
    #[serde(default)]
    pub status: Option<PaymentStatus>,
}

/// CSVインポート1回分の単位。
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Dump {
    pub id: u64,
    pub date: NaiveDate,
    #[serde(default)]
    pub creator: String,
}
