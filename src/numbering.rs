use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::pg::upsert::excluded;
use uuid::Uuid;

use crate::schema::document_sequences;

pub const DISPATCH_ORDER_PREFIX: &str = "DO";
pub const INSTALLATION_JOB_PREFIX: &str = "IJ";
pub const TICKET_PREFIX: &str = "TKT";

/// Four-character fiscal year code: the last two digits of the calendar year
/// followed by the last two digits of the year the fiscal year rolls into.
/// The roll happens after March.
pub fn fiscal_year_code(date: NaiveDate) -> String {
    let year = date.year();
    let second = if date.month() > 3 { year + 1 } else { year };
    format!("{:02}{:02}", year.rem_euclid(100), second.rem_euclid(100))
}

pub fn format_number(prefix: &str, fiscal_year: &str, sequence: i32) -> String {
    format!("{prefix}/{fiscal_year}/{sequence:05}")
}

/// Allocates the next number for `(organization, prefix, fiscal_year)`.
///
/// The upsert takes a row lock on the counter, so concurrent callers inside
/// their own transactions are serialized and never see the same value.
pub fn generate(
    conn: &mut PgConnection,
    prefix: &str,
    organization_id: Uuid,
    fiscal_year: &str,
) -> QueryResult<String> {
    let now = Utc::now().naive_utc();
    let value: i32 = diesel::insert_into(document_sequences::table)
        .values((
            document_sequences::organization_id.eq(organization_id),
            document_sequences::prefix.eq(prefix),
            document_sequences::fiscal_year.eq(fiscal_year),
            document_sequences::last_value.eq(1),
            document_sequences::updated_at.eq(now),
        ))
        .on_conflict((
            document_sequences::organization_id,
            document_sequences::prefix,
            document_sequences::fiscal_year,
        ))
        .do_update()
        .set((
            document_sequences::last_value.eq(document_sequences::last_value + 1),
            document_sequences::updated_at.eq(excluded(document_sequences::updated_at)),
        ))
        .returning(document_sequences::last_value)
        .get_result(conn)?;

    Ok(format_number(prefix, fiscal_year, value))
}

pub fn next_number(
    conn: &mut PgConnection,
    prefix: &str,
    organization_id: Uuid,
    at: NaiveDateTime,
) -> QueryResult<String> {
    let fiscal_year = fiscal_year_code(at.date());
    generate(conn, prefix, organization_id, &fiscal_year)
}
