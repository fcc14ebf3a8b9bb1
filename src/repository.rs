use std::collections::HashSet;

use chrono::NaiveDate;
use log::{info, warn};
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;

use crate::model::{
    AvgHours, Client, CommercialDocument, Dump, Project, ProjectAssoc, TimeLogEntry, UserProfile,
    Wage,
};

/// レポートの集計に必要なデータを取得するためのtrait。
///
/// 期間は両端を含む。
#[cfg_attr(test, automock)]
pub trait Repository {
    fn profile(&self, username: &str) -> Option<UserProfile>;

    fn profiles(&self) -> Vec<UserProfile>;

    /// ユーザーのタイムエントリーを取得する。
    fn time_logs(&self, username: &str, from: NaiveDate, to: NaiveDate) -> Vec<TimeLogEntry>;

    /// クライアントの全プロジェクトに対するタイムエントリーを取得する。
    fn client_time_logs(&self, client: &str, from: NaiveDate, to: NaiveDate) -> Vec<TimeLogEntry>;

    fn avg_hours(&self, username: &str) -> Vec<AvgHours>;

    fn wages(&self, username: &str) -> Vec<Wage>;

    fn projects(&self) -> Vec<Project>;

    fn project_assocs(&self) -> Vec<ProjectAssoc>;

    fn client(&self, slug: &str) -> Option<Client>;

    fn documents(&self, client: &str, from: NaiveDate, to: NaiveDate) -> Vec<CommercialDocument>;

    /// クライアントの最も古い書類の日付。
    fn first_document_date(&self, client: &str) -> Option<NaiveDate>;
}

/// 永続化層から書き出されたデータ一式。
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub users: Vec<UserProfile>,
    #[serde(default)]
    pub time_logs: Vec<TimeLogEntry>,
    #[serde(default)]
    pub wages: Vec<Wage>,
    #[serde(default)]
    pub avg_hours: Vec<AvgHours>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub project_assocs: Vec<ProjectAssoc>,
    #[serde(default)]
    pub clients: Vec<Client>,
    #[serde(default)]
    pub documents: Vec<CommercialDocument>,
    #[serde(default)]
    pub dumps: Vec<Dump>,
}

impl Snapshot {
    /// 不変条件を満たさないデータを取り除く。
    ///
    /// - 作業時間が0以下のエントリーは捨てる
    /// - 存在しないdumpへの参照は外す
    /// - 自分自身の閲覧、クライアントによる閲覧は外す
    pub fn sanitize(mut self) -> Self {
        let before = self.time_logs.len();
        self.time_logs.retain(|entry| entry.hours_booked > 0.0);
        if self.time_logs.len() != before {
            warn!(
                "Dropped {} time log entries without booked hours",
                before - self.time_logs.len()
            );
        }

        let dumps: HashSet<u64> = self.dumps.iter().map(|dump| dump.id).collect();
        self.time_logs
            .iter_mut()
            .filter(|entry| entry.dump.map_or(false, |id| !dumps.contains(&id)))
            .for_each(|entry| {
                warn!(
                    "Time log of {} on {} refers to unknown dump {:?}",
                    entry.user, entry.date, entry.dump
                );
                entry.dump = None;
            });

        for profile in self.users.iter_mut() {
            if profile.is_client() && !profile.watches.is_empty() {
                warn!("Client profile {} cannot watch users", profile.username);
                profile.watches.clear();
            }
            if profile.watches.remove(&profile.username) {
                warn!("Profile {} cannot watch itself", profile.username);
            }
        }

        info!(
            "Snapshot: {} users, {} time logs, {} projects, {} documents",
            self.users.len(),
            self.time_logs.len(),
            self.projects.len(),
            self.documents.len()
        );
        self
    }
}

fn in_range(day: NaiveDate, from: NaiveDate, to: NaiveDate) -> bool {
    from <= day && day <= to
}

impl Repository for Snapshot {
    fn profile(&self, username: &str) -> Option<UserProfile> {
        self.users.iter().find(|u| u.username == username).cloned()
    }

    fn profiles(&self) -> Vec<UserProfile> {
        let mut profiles = self.users.clone();
        profiles.sort_by(|a, b| a.username.cmp(&b.username));
        profiles
    }

    fn time_logs(&self, username: &str, from: NaiveDate, to: NaiveDate) -> Vec<TimeLogEntry> {
        self.time_logs
            .iter()
            .filter(|entry| entry.user == username && in_range(entry.date, from, to))
            .cloned()
            .collect()
    }

    fn client_time_logs(&self, client: &str, from: NaiveDate, to: NaiveDate) -> Vec<TimeLogEntry> {
        let projects: HashSet<&str> = self
            .projects
            .iter()
            .filter(|project| project.client == client)
            .map(|project| project.external_id.as_str())
            .collect();
        self.time_logs
            .iter()
            .filter(|entry| {
                projects.contains(entry.project.as_str()) && in_range(entry.date, from, to)
            })
            .cloned()
            .collect()
    }

    fn avg_hours(&self, username: &str) -> Vec<AvgHours> {
        self.avg_hours
            .iter()
            .filter(|avg| avg.user == username)
            .cloned()
            .collect()
    }

    fn wages(&self, username: &str) -> Vec<Wage> {
        self.wages
            .iter()
            .filter(|wage| wage.user == username)
            .cloned()
            .collect()
    }

    fn projects(&self) -> Vec<Project> {
        self.projects.clone()
    }

    fn project_assocs(&self) -> Vec<ProjectAssoc> {
        self.project_assocs.clone()
    }

    fn client(&self, slug: &str) -> Option<Client> {
        self.clients.iter().find(|c| c.slug == slug).cloned()
    }

    fn documents(&self, client: &str, from: NaiveDate, to: NaiveDate) -> Vec<CommercialDocument> {
        self.documents
            .iter()
            .filter(|doc| doc.client == client && in_range(doc.date, from, to))
            .cloned()
            .collect()
    }

    fn first_document_date(&self, client: &str) -> Option<NaiveDate> {
        self.documents
            .iter()
            .filter(|doc| doc.client == client)
            .map(|doc| doc.date)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{Repository, Snapshot};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn snapshot() -> Snapshot {
        serde_json::from_str(
            r#"{
                "users": [
                    {"username": "bob", "watches": ["bob", "alice"]},
                    {"username": "alice", "capabilities": ["view_billable", "view_wage"]},
                    {"username": "acme-user", "company": "acme", "watches": ["alice"]}
                ],
                "time_logs": [
                    {"user": "alice", "date": "2024-01-02", "project": "A", "task_name": "dev", "hours_booked": 2.5, "dump": 1},
                    {"user": "alice", "date": "2024-01-03", "project": "X", "task_name": "dev", "hours_booked": 1.0, "dump": 7},
                    {"user": "bob", "date": "2024-01-02", "project": "A", "task_name": "dev", "hours_booked": 0}
                ],
                "projects": [
                    {"external_id": "A", "name": "Alpha", "client": "acme", "billable": true, "billing_type": "hourly", "client_rate": "50", "user_rate": 20}
                ],
                "clients": [{"slug": "acme", "name": "ACME", "currency": "USD"}],
                "documents": [
                    {"client": "acme", "kind": "billing", "date": "2024-01-05", "amount": "100.50"},
                    {"client": "acme", "kind": "payment", "date": "2024-01-04", "amount": 40, "status": "settled"}
                ],
                "dumps": [{"id": 1, "date": "2024-01-02"}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_sanitize() {
        let snapshot = snapshot().sanitize();

        assert_eq!(snapshot.time_logs.len(), 2);
        assert_eq!(snapshot.time_logs[1].dump, None);
        assert_eq!(snapshot.time_logs[0].dump, Some(1));
        let bob = snapshot.profile("bob").unwrap();
        assert!(!bob.watches.contains("bob"));
        assert!(bob.watches.contains("alice"));
        assert!(snapshot.profile("acme-user").unwrap().watches.is_empty());
    }

    #[test]
    fn test_queries() {
        let snapshot = snapshot().sanitize();

        assert_eq!(snapshot.time_logs("alice", day(1), day(2)).len(), 1);
        assert_eq!(snapshot.client_time_logs("acme", day(1), day(31)).len(), 1);
        assert_eq!(snapshot.documents("acme", day(5), day(5)).len(), 1);
        assert_eq!(snapshot.first_document_date("acme"), Some(day(4)));
        assert_eq!(snapshot.first_document_date("globex"), None);
        assert_eq!(
            snapshot.profiles().iter().map(|p| p.username.as_str()).collect::<Vec<_>>(),
            vec!["acme-user", "alice", "bob"]
        );
    }
}
