use sqlx::PgPool;

use crate::models::Applicant;

/// Membership identifier scheme: `<prefix><zero-padded number>`.
#[derive(Debug, Clone)]
pub struct IdScheme {
    pub prefix: String,
    pub pad: usize,
}

impl IdScheme {
    pub fn new(prefix: impl Into<String>, pad: usize) -> Self {
        Self {
            prefix: prefix.into(),
            pad,
        }
    }

    pub fn format(&self, number: u32) -> String {
        format!("{}{:0width$}", self.prefix, number, width = self.pad)
    }

    /// Parses the numeric suffix of an issued identifier. Identifiers that
    /// don't carry the prefix or whose suffix isn't purely numeric are
    /// skipped by the scan, not treated as errors.
    pub fn parse_suffix(&self, id: &str) -> Option<u32> {
        let suffix = id.strip_prefix(&self.prefix)?;
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        suffix.parse().ok()
    }
}

/// Next free suffix given the identifiers issued so far: `max + 1`, or 1
/// when none exist.
pub fn next_suffix<'a>(scheme: &IdScheme, issued: impl IntoIterator<Item = &'a str>) -> u32 {
    issued
        .into_iter()
        .filter_map(|id| scheme.parse_suffix(id))
        .max()
        .map_or(1, |max| max + 1)
}

/// Proposes the next identifier from the current state of the store.
///
/// The proposal is only tentative: a concurrent approval may win the race,
/// in which case persisting it trips the unique index and the caller
/// re-scans. That retry loop lives in the approval workflow.
pub async fn propose_next(pool: &PgPool, scheme: &IdScheme) -> Result<String, sqlx::Error> {
    let issued = Applicant::issued_membership_ids(pool, &scheme.prefix).await?;
    let next = next_suffix(scheme, issued.iter().map(String::as_str));
    Ok(scheme.format(next))
}
