// src/metrics.rs

use crate::model::{AnalysisResult, CommandSummary, UserRecord, YearSummary};
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::info;

/// `numerator / denominator`, or 0 when the denominator is 0.
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Occurrences per 1000 touched lines
fn per_thousand(count: u64, loc: u64) -> f64 {
    ratio(count as f64, loc as f64) * 1000.0
}

fn user_metrics(user: &mut UserRecord, tracked: usize) {
    user.average_coverage = ratio(user.commands.len() as f64, tracked as f64);
    let loc = user.loc;
    for usage in &mut user.commands {
        usage.average_frequency = per_thousand(usage.count, loc);
    }
    user.average_frequency = per_thousand(user.total_hits(), loc);
}

/// Derives every metric of `result` from its raw counters.
///
/// Users without any command hit are dropped. Raw counters are left alone,
/// so running this twice gives the same document.
pub fn finalize(mut result: AnalysisResult, commands: &[String]) -> AnalysisResult {
    info!(framework = %result.framework, "Generating metrics");

    result.users.retain(|u| !u.commands.is_empty());
    result.users_count = result.users.len() as u64;
    let users = result.users.len() as f64;

    result
        .users
        .par_iter_mut()
        .for_each(|user| user_metrics(user, commands.len()));

    result.commands = commands
        .iter()
        .map(|command| {
            let (count, frequency_sum) = result
                .users
                .iter()
                .filter_map(|u| u.command(command))
                .fold((0u64, 0.0f64), |(count, freq), usage| {
                    (count + usage.count, freq + usage.average_frequency)
                });
            CommandSummary {
                command: command.clone(),
                count,
                average_usage: ratio(count as f64, users),
                // users without the command still count in the divisor
                average_frequency: ratio(frequency_sum, users),
            }
        })
        .collect();

    result.average_coverage = ratio(result.users.iter().map(|u| u.average_coverage).sum(), users);
    result.average_frequency = ratio(result.users.iter().map(|u| u.average_frequency).sum(), users);
    result.average_loc = ratio(result.users.iter().map(|u| u.loc as f64).sum(), users);

    let mut years: BTreeMap<i32, YearSummary> = BTreeMap::new();
    for user in &result.users {
        for (year, activity) in &user.years.by_year {
            let summary = years.entry(*year).or_default();
            summary.total += activity.total;
            summary.count_users += 1;
        }
    }
    for summary in years.values_mut() {
        summary.average_usage = ratio(summary.total as f64, summary.count_users as f64);
    }
    result.years = years;

    info!(
        framework = %result.framework,
        users = result.users_count,
        "Metrics generated"
    );
    result
}
