//! Pure availability rules. Dates are atomic calendar-day tokens, so every
//! check here is set membership over `YYYY-MM-DD` strings.

use std::collections::BTreeSet;

use time::{format_description::FormatItem, macros::format_description, Date};

use crate::posts::repo_types::ServiceType;

const DAY: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Parses and normalizes requested dates, dropping repeats while keeping order.
pub fn normalize_dates(raw: &[String]) -> Result<Vec<String>, String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(raw.len());
    for value in raw {
        let day = Date::parse(value.trim(), DAY)
            .map_err(|_| format!("Invalid booking date: {value}"))?;
        let day = day
            .format(DAY)
            .map_err(|_| format!("Invalid booking date: {value}"))?;
        if seen.insert(day.clone()) {
            out.push(day);
        }
    }
    Ok(out)
}

/// `other` listings take no dates at all.
pub fn check_service_type(service_type: ServiceType, dates: &[String]) -> Result<(), String> {
    if !service_type.allows_dates() && !dates.is_empty() {
        return Err("'other' service type does not allow booking dates".into());
    }
    Ok(())
}

/// Requested dates already present in the unavailable set.
pub fn taken_dates(requested: &[String], unavailable: &[String]) -> Vec<String> {
    let blocked: BTreeSet<&str> = unavailable.iter().map(String::as_str).collect();
    requested
        .iter()
        .filter(|d| blocked.contains(d.as_str()))
        .cloned()
        .collect()
}

/// Set union of the listing's unavailable dates and an approved booking's dates, sorted.
pub fn merge_unavailable(unavailable: &[String], approved: &[String]) -> Vec<String> {
    unavailable
        .iter()
        .chain(approved.iter())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
