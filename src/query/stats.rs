//! Aggregate session statistics, fetched with a fixed query instead of a
//! model tool call

use deadpool_postgres::Pool;

use crate::error::{CoachError, CoachResult};

const OVERVIEW_SQL: &str = "SELECT COUNT(*) AS total_sessions, \
    COALESCE(AVG(pitch_accuracy), 0) AS avg_pitch, \
    COALESCE(AVG(scale_conformity), 0) AS avg_scale, \
    COALESCE(AVG(timing_stability), 0) AS avg_timing \
    FROM fretcoach.sessions WHERE user_id = $1";

/// A user's averages across all recorded sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionOverview {
    pub total_sessions: i64,
    pub avg_pitch: f64,
    pub avg_scale: f64,
    pub avg_timing: f64,
}

impl SessionOverview {
    /// The metric with the lowest average, as a display label.
    pub fn weakest_area(&self) -> &'static str {
        if self.total_sessions == 0 {
            return "unknown";
        }
        let mut weakest = "pitch accuracy";
        let mut lowest = self.avg_pitch;
        if self.avg_scale < lowest {
            weakest = "scale conformity";
            lowest = self.avg_scale;
        }
        if self.avg_timing < lowest {
            weakest = "timing stability";
        }
        weakest
    }
}

/// Reads aggregate statistics for response enrichment.
#[derive(Clone)]
pub struct StatsReader {
    pool: Pool,
}

impl StatsReader {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn overview(&self, user_id: &str) -> CoachResult<SessionOverview> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| CoachError::Database(format!("connection unavailable: {e}")))?;
        let row = client
            .query_one(OVERVIEW_SQL, &[&user_id])
            .await
            .map_err(|e| CoachError::Database(e.to_string()))?;
        Ok(SessionOverview {
            total_sessions: row.get("total_sessions"),
            avg_pitch: row.get("avg_pitch"),
            avg_scale: row.get("avg_scale"),
            avg_timing: row.get("avg_timing"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weakest_area_picks_lowest_average() {
        let overview = SessionOverview {
            total_sessions: 12,
            avg_pitch: 81.0,
            avg_scale: 64.5,
            avg_timing: 72.0,
        };
        assert_eq!(overview.weakest_area(), "scale conformity");
    }

    #[test]
    fn test_weakest_area_unknown_without_sessions() {
        assert_eq!(SessionOverview::default().weakest_area(), "unknown");
    }
}
