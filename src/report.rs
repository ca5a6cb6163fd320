use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{short_day, week_start, Learner, WEEK};
use crate::rollup::RollupResult;
use crate::tier::TierMessages;

fn cell<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn task_mark(done: bool, planned: bool) -> &'static str {
    match (done, planned) {
        (true, true) => "done",
        (true, false) => "extra",
        (false, true) => "missed",
        (false, false) => "-",
    }
}

pub fn build_report(
    learner: &Learner,
    reference_date: NaiveDate,
    rollup: &RollupResult,
    messages: &TierMessages,
) -> String {
    let effort = &rollup.summary.effort;
    let totals = &rollup.summary.totals;
    let mut output = String::new();

    let _ = writeln!(output, "# Weekly Effort Report");
    let _ = writeln!(
        output,
        "Generated for {} ({}), week of {} as of {} ({})",
        learner.full_name,
        learner.email,
        week_start(reference_date),
        reference_date,
        effort.scope
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Effort");
    let _ = writeln!(output, "**{}**", effort.message(messages));
    let _ = writeln!(output);

    let bonus = effort.bonus_lines(&rollup.text_tasks.labels);
    if bonus.is_empty() {
        let _ = writeln!(
            output,
            "Overall {:.0}% ({})",
            effort.overall_pct * 100.0,
            effort.tier
        );
    } else {
        let _ = writeln!(
            output,
            "Overall {:.0}% ({}) (+{})",
            effort.overall_pct * 100.0,
            effort.tier,
            bonus.join(", ")
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Daily Progress");
    let _ = writeln!(
        output,
        "| Day | Date | Math pts | Expected pts | Math mins | Expected mins | Reading % | Expected % |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|---|---|---|");
    for day in &rollup.daily_data {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} | {} | {} | {} |",
            day.day,
            day.date,
            cell(day.actual_math_points),
            cell(day.expected_math_points),
            cell(day.math_time),
            cell(day.expected_math_time),
            cell(day.daily_reading_percent),
            cell(day.expected_daily_reading_percent),
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Weekly Totals");
    let _ = writeln!(
        output,
        "- Math points: {} of {}",
        totals.actual_math_points, totals.expected_math_points
    );
    let _ = writeln!(
        output,
        "- Math minutes: {} of {}",
        totals.actual_math_time, totals.expected_math_time
    );
    let _ = writeln!(
        output,
        "- Reading: {}% of {}%",
        totals.actual_reading_percent, totals.expected_reading_percent
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Custom Tasks");
    let text = &rollup.text_tasks;
    if text.labels.is_empty() {
        let _ = writeln!(output, "No custom tasks are being tracked.");
        return output;
    }

    let header: Vec<&str> = WEEK.iter().map(|day| short_day(*day)).collect();
    let _ = writeln!(output, "| Task | {} |", header.join(" | "));
    let _ = writeln!(output, "|---|{}", "---|".repeat(WEEK.len()));
    for (slug, label) in &text.labels {
        let marks: Vec<&str> = WEEK
            .iter()
            .map(|day| task_mark(text.is_done(slug, *day), text.is_planned(slug, *day)))
            .collect();
        let _ = writeln!(output, "| {} | {} |", label, marks.join(" | "));
    }

    output
}
