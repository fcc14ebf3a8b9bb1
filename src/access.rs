use std::collections::BTreeSet;

use log::debug;
use serde::Serialize;

use crate::hours::Visibility;
use crate::model::{Capability, UserProfile};

/// リクエストを行ったユーザー。権限と閲覧対象はプロフィールから明示的に受け取る。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
    pub capabilities: BTreeSet<Capability>,
    pub watches: BTreeSet<String>,
    pub company: Option<String>,
}

impl Principal {
    pub fn from_profile(profile: &UserProfile) -> Self {
        Self {
            username: profile.username.clone(),
            capabilities: profile.capabilities.clone(),
            watches: profile.watches.clone(),
            company: profile.company.clone(),
        }
    }

    pub fn visibility(&self) -> Visibility {
        Visibility::from_capabilities(&self.capabilities)
    }

    /// 自分自身と閲覧対象のユーザー。
    fn own_scope(&self) -> BTreeSet<String> {
        let mut users = self.watches.clone();
        users.insert(self.username.clone());
        users
    }
}

/// アクセス対象。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target<'a> {
    /// 社内ユーザー1人のレポート。
    User(&'a str),
    /// 閲覧可能な社内ユーザー全員の一覧。
    Team,
    /// クライアント(会社)のレポート。
    Client(&'a str),
}

/// アクセス範囲の判定結果。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// 全てのユーザー・クライアントを金額込みで閲覧できる。
    Full,
    /// 含まれるユーザー(またはクライアント)の金額を含まないレポートのみ閲覧できる。
    Partial(BTreeSet<String>),
    Denied,
}

impl Scope {
    pub fn is_denied(&self) -> bool {
        *self == Scope::Denied
    }

    pub fn allows(&self, name: &str) -> bool {
        match self {
            Scope::Full => true,
            Scope::Partial(names) => names.contains(name),
            Scope::Denied => false,
        }
    }

    /// エクスポートできるかどうか。
    ///
    /// 部分的なアクセスでは、自分自身の明細(エントリー単位)のエクスポートのみ許可する。
    pub fn can_export(&self, principal: &Principal, target: &str, detailed: bool) -> bool {
        match self {
            Scope::Full => true,
            Scope::Partial(_) => detailed && principal.username == target,
            Scope::Denied => false,
        }
    }
}

/// リクエストしたユーザーのアクセス範囲を判定する。
///
/// `view_billable`と`view_wage`の両方を持つユーザーは全てにアクセスできる。
/// それ以外の社内ユーザーは自分自身と閲覧対象のユーザーのみ、
/// クライアントは自分の会社のレポートのみアクセスできる。
pub fn resolve_scope(principal: &Principal, target: Target) -> Scope {
    if principal.visibility().is_full() {
        return Scope::Full;
    }

    let scope = match (target, &principal.company) {
        (Target::User(_), Some(_)) | (Target::Team, Some(_)) => Scope::Denied,
        (Target::User(user), None) => {
            let users = principal.own_scope();
            if users.contains(user) {
                Scope::Partial(users)
            } else {
                Scope::Denied
            }
        }
        (Target::Team, None) => Scope::Partial(principal.own_scope()),
        (Target::Client(slug), Some(company)) if company == slug => {
            Scope::Partial(BTreeSet::from([company.clone()]))
        }
        (Target::Client(_), _) => Scope::Denied,
    };
    debug!("Scope of {} for {:?}: {:?}", principal.username, target, scope);
    scope
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rstest::rstest;

    use super::{resolve_scope, Principal, Scope, Target};
    use crate::model::Capability;

    fn principal(username: &str, caps: &[Capability], watches: &[&str], company: Option<&str>) -> Principal {
        Principal {
            username: username.to_string(),
            capabilities: caps.iter().copied().collect(),
            watches: watches.iter().map(|w| w.to_string()).collect(),
            company: company.map(str::to_string),
        }
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn admin() -> Principal {
        principal("admin", &[Capability::ViewBillable, Capability::ViewWage], &[], None)
    }

    fn alice() -> Principal {
        principal("alice", &[Capability::ViewBillable], &["bob"], None)
    }

    fn acme() -> Principal {
        principal("acme-user", &[], &[], Some("acme"))
    }

    #[rstest]
    #[case::admin_any_user(admin(), Target::User("carol"), Scope::Full)]
    #[case::admin_client(admin(), Target::Client("acme"), Scope::Full)]
    #[case::self_user(alice(), Target::User("alice"), Scope::Partial(set(&["alice", "bob"])))]
    #[case::watched_user(alice(), Target::User("bob"), Scope::Partial(set(&["alice", "bob"])))]
    #[case::other_user(alice(), Target::User("carol"), Scope::Denied)]
    #[case::team(alice(), Target::Team, Scope::Partial(set(&["alice", "bob"])))]
    #[case::internal_client(alice(), Target::Client("acme"), Scope::Denied)]
    #[case::own_company(acme(), Target::Client("acme"), Scope::Partial(set(&["acme"])))]
    #[case::other_company(acme(), Target::Client("globex"), Scope::Denied)]
    #[case::client_user_report(acme(), Target::User("acme-user"), Scope::Denied)]
    #[case::client_team(acme(), Target::Team, Scope::Denied)]
    fn test_resolve_scope(#[case] who: Principal, #[case] target: Target, #[case] expected: Scope) {
        assert_eq!(resolve_scope(&who, target), expected);
    }

    #[rstest]
    #[case::own_detailed("alice", true, true)]
    #[case::own_summary("alice", false, false)]
    #[case::watched_detailed("bob", true, false)]
    fn test_partial_export(#[case] target: &str, #[case] detailed: bool, #[case] expected: bool) {
        let who = alice();
        let scope = resolve_scope(&who, Target::User(target));

        assert_eq!(scope.can_export(&who, target, detailed), expected);
    }

    #[test]
    fn test_full_export() {
        assert!(Scope::Full.can_export(&admin(), "carol", false));
        assert!(!Scope::Denied.can_export(&admin(), "carol", true));
    }
}
