//! Reading progress arithmetic.

/// Expected share of the book to read per day, as a whole percentage.
///
/// Returns `None` when either input is missing or the book length is not
/// positive, so "cannot compute" stays distinct from a computed zero.
pub fn daily_expected_percent(rate: Option<f64>, count: Option<f64>) -> Option<i64> {
    let rate = rate.filter(|r| r.is_finite())?;
    let count = count.filter(|c| c.is_finite() && *c > 0.0)?;
    Some((100.0 * rate / count / 7.0).round() as i64)
}

/// Renders the derived percentage for a form field: empty when not computable.
pub fn display_percent(percent: Option<i64>) -> String {
    percent.map(|p| p.to_string()).unwrap_or_default()
}

/// Accumulated percentage and title seen on the most recent day with an entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingCursor {
    pub accumulated: Option<f64>,
    pub title: Option<String>,
}

impl ReadingCursor {
    /// One day's actual reading progress, advancing the cursor when the day has an entry.
    ///
    /// Starting a new book counts its whole accumulated percentage; otherwise the
    /// delta from the previous entry is used and never goes negative.
    pub fn advance(&mut self, accumulated: Option<f64>, title: Option<&str>) -> Option<f64> {
        let accumulated = accumulated?;
        let title = title.map(str::trim).filter(|t| !t.is_empty());

        let new_book = title.is_some() && title != self.title.as_deref();

        let delta = match self.accumulated {
            _ if new_book => accumulated,
            Some(previous) => (accumulated - previous).max(0.0),
            None => accumulated,
        };

        self.accumulated = Some(accumulated);
        if let Some(title) = title {
            self.title = Some(title.to_string());
        }
        Some(delta)
    }
}
