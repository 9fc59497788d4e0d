use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::db::schema::votes;

/// Durable mirror of one ledger entry.
#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = votes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct VoteRow {
    pub item_id: String,
    pub vote_count: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = votes)]
pub struct NewVote<'a> {
    pub item_id: &'a str,
    pub vote_count: i64,
    pub updated_at: DateTime<Utc>,
}
