use serde::{Deserialize, Serialize};

/// Point balance of one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub userid: String,
    pub username: String,
    pub points: i64,
}

impl Account {
    pub(crate) fn new(userid: &str, points: i64) -> Self {
        Self {
            userid: userid.to_owned(),
            username: String::new(),
            points,
        }
    }
}

/// Row of a ranking query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankEntry {
    pub userid: String,
    pub username: String,
    pub points: i64,
}

impl From<Account> for RankEntry {
    fn from(account: Account) -> Self {
        Self {
            userid: account.userid,
            username: account.username,
            points: account.points,
        }
    }
}
