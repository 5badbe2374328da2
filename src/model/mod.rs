//! Domain records and the SQL that loads and mutates them.
//!
//! Functions here take a plain `&Connection` so they run the same inside
//! [`Database::call`](crate::db::Database::call), a closure transaction, or a
//! long-lived [`Tx`](crate::db::Tx).

pub mod item;
pub mod list;
pub mod note;
pub mod photo;
pub mod project;
pub mod template;
pub mod vocab;

use rusqlite::types::ToSql;
use rusqlite::Connection;

use crate::error::DbError;

/// Current time in milliseconds, as stored in timestamp columns.
pub(crate) fn timestamp() -> i64 {
    i64::try_from(crate::util::now_ms()).unwrap_or(i64::MAX)
}

/// Highest subject id handed out so far. Subject ids never repeat, so
/// anything created afterwards sorts above it.
pub fn last_subject(conn: &Connection) -> Result<i64, DbError> {
    Ok(conn.query_row("SELECT coalesce(max(id), 0) FROM subjects", [], |r| r.get(0))?)
}

/// `?, ?, ?` for an `IN (...)` clause of `n` values.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

pub(crate) fn id_params(ids: &[i64]) -> Vec<&dyn ToSql> {
    ids.iter().map(|id| id as &dyn ToSql).collect()
}

/// Insert `ids` into `order` at their paired positions, lowest position first.
/// Positions beyond the end append.
pub(crate) fn splice_at(order: &mut Vec<i64>, ids: &[i64], idx: &[usize]) {
    let mut pairs: Vec<(usize, i64)> = idx.iter().copied().zip(ids.iter().copied()).collect();
    pairs.sort_by_key(|(pos, _)| *pos);
    for (pos, id) in pairs {
        order.retain(|o| *o != id);
        let at = pos.min(order.len());
        order.insert(at, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splice_reinserts_at_original_positions() {
        let original = vec![1, 2, 3, 4, 5];
        let mut order = vec![1, 3, 5];
        splice_at(&mut order, &[4, 2], &[3, 1]);
        assert_eq!(order, original);
    }

    #[test]
    fn splice_clamps_to_end() {
        let mut order = vec![1, 2];
        splice_at(&mut order, &[9], &[7]);
        assert_eq!(order, vec![1, 2, 9]);
    }

    #[test]
    fn placeholders_match_count() {
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(1), "?");
    }
}
