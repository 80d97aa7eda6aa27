//! Ticket analytics
//!
//! Computed on demand from an [`AnalyticsSnapshot`] read out of the store;
//! nothing here is cached between requests.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::TicketStatus;

/// The parts of a ticket analytics needs
#[derive(Debug, Clone, PartialEq)]
pub struct TicketFacts {
    pub id: i64,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    /// Earliest agent-authored message, if any
    pub first_agent_reply_at: Option<DateTime<Utc>>,
}

/// Store contents as of read time
#[derive(Debug, Clone, Default)]
pub struct AnalyticsSnapshot {
    pub tickets: Vec<TicketFacts>,
    pub ratings: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusCount {
    pub status: TicketStatus,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub total: usize,
    pub by_status: Vec<StatusCount>,
    pub last7: Vec<DailyCount>,
    pub avg_csat: Option<f64>,
    #[serde(rename = "avgFRT")]
    pub avg_first_response_minutes: Option<f64>,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl AnalyticsSnapshot {
    pub fn total(&self) -> usize {
        self.tickets.len()
    }

    /// Statuses present in the store, by count descending, ties broken by
    /// status name ascending.
    pub fn by_status(&self) -> Vec<StatusCount> {
        let mut counts: BTreeMap<&'static str, (TicketStatus, usize)> = BTreeMap::new();
        for ticket in &self.tickets {
            counts
                .entry(ticket.status.as_str())
                .or_insert((ticket.status, 0))
                .1 += 1;
        }

        let mut by_status: Vec<StatusCount> = counts
            .into_values()
            .map(|(status, count)| StatusCount { status, count })
            .collect();
        // stable sort keeps the name order from the BTreeMap within equal counts
        by_status.sort_by(|a, b| b.count.cmp(&a.count));
        by_status
    }

    /// One entry per UTC day for the seven days ending `today`, oldest first.
    pub fn last_7_days(&self, today: NaiveDate) -> Vec<DailyCount> {
        (0..7)
            .rev()
            .map(|days_ago| {
                let date = today - Duration::days(days_ago);
                let count = self
                    .tickets
                    .iter()
                    .filter(|t| t.created_at.date_naive() == date)
                    .count();
                DailyCount { date, count }
            })
            .collect()
    }

    /// Mean of every rating, to one decimal place
    pub fn avg_csat(&self) -> Option<f64> {
        if self.ratings.is_empty() {
            return None;
        }
        let sum: i64 = self.ratings.iter().sum();
        Some(round1(sum as f64 / self.ratings.len() as f64))
    }

    /// Mean minutes from ticket creation to the first agent message, to one
    /// decimal place. Tickets without an agent reply, or whose first agent
    /// reply predates the ticket, are left out entirely.
    pub fn avg_first_response_minutes(&self) -> Option<f64> {
        let minutes: Vec<f64> = self
            .tickets
            .iter()
            .filter_map(|t| {
                let elapsed = t.first_agent_reply_at? - t.created_at;
                (elapsed >= Duration::zero()).then(|| elapsed.num_milliseconds() as f64 / 60_000.0)
            })
            .collect();

        if minutes.is_empty() {
            return None;
        }
        Some(round1(minutes.iter().sum::<f64>() / minutes.len() as f64))
    }

    pub fn report(&self, now: DateTime<Utc>) -> AnalyticsReport {
        AnalyticsReport {
            total: self.total(),
            by_status: self.by_status(),
            last7: self.last_7_days(now.date_naive()),
            avg_csat: self.avg_csat(),
            avg_first_response_minutes: self.avg_first_response_minutes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, day, hour, min, 0).unwrap()
    }

    fn ticket(id: i64, status: TicketStatus, created_at: DateTime<Utc>) -> TicketFacts {
        TicketFacts {
            id,
            status,
            created_at,
            first_agent_reply_at: None,
        }
    }

    #[test]
    fn test_empty_store() {
        let snapshot = AnalyticsSnapshot::default();
        let report = snapshot.report(at(10, 12, 0));
        assert_eq!(report.total, 0);
        assert!(report.by_status.is_empty());
        assert_eq!(report.last7.len(), 7);
        assert!(report.last7.iter().all(|d| d.count == 0));
        assert_eq!(report.last7[0].date, NaiveDate::from_ymd_opt(2026, 6, 4).unwrap());
        assert_eq!(report.last7[6].date, NaiveDate::from_ymd_opt(2026, 6, 10).unwrap());
        assert_eq!(report.avg_csat, None);
        assert_eq!(report.avg_first_response_minutes, None);
    }

    #[test]
    fn test_first_response_skips_unanswered_tickets() {
        let mut answered = ticket(1, TicketStatus::Open, at(3, 9, 0));
        answered.first_agent_reply_at = Some(at(3, 9, 30));
        let unanswered = ticket(2, TicketStatus::New, at(3, 10, 0));

        let snapshot = AnalyticsSnapshot {
            tickets: vec![answered, unanswered],
            ratings: vec![],
        };
        assert_eq!(snapshot.avg_first_response_minutes(), Some(30.0));
    }

    #[test]
    fn test_first_response_excludes_negative_elapsed() {
        let mut skewed = ticket(1, TicketStatus::Open, at(3, 9, 0));
        skewed.first_agent_reply_at = Some(at(3, 8, 0));
        let mut fast = ticket(2, TicketStatus::Open, at(3, 9, 0));
        fast.first_agent_reply_at = Some(at(3, 9, 10));
        let mut slow = ticket(3, TicketStatus::Open, at(3, 9, 0));
        slow.first_agent_reply_at = Some(at(3, 9, 15));

        let snapshot = AnalyticsSnapshot {
            tickets: vec![skewed.clone(), fast, slow],
            ratings: vec![],
        };
        assert_eq!(snapshot.avg_first_response_minutes(), Some(12.5));

        let only_skewed = AnalyticsSnapshot {
            tickets: vec![skewed],
            ratings: vec![],
        };
        assert_eq!(only_skewed.avg_first_response_minutes(), None);
    }

    #[test]
    fn test_avg_csat_rounding() {
        let snapshot = AnalyticsSnapshot {
            tickets: vec![],
            ratings: vec![4, 5],
        };
        assert_eq!(snapshot.avg_csat(), Some(4.5));

        let thirds = AnalyticsSnapshot {
            tickets: vec![],
            ratings: vec![5, 4, 4],
        };
        assert_eq!(thirds.avg_csat(), Some(4.3));
    }

    #[test]
    fn test_by_status_order_and_ties() {
        let snapshot = AnalyticsSnapshot {
            tickets: vec![
                ticket(1, TicketStatus::Solved, at(1, 0, 0)),
                ticket(2, TicketStatus::Open, at(1, 0, 0)),
                ticket(3, TicketStatus::Solved, at(1, 0, 0)),
                ticket(4, TicketStatus::New, at(1, 0, 0)),
                ticket(5, TicketStatus::Pending, at(1, 0, 0)),
            ],
            ratings: vec![],
        };
        let statuses: Vec<_> = snapshot
            .by_status()
            .into_iter()
            .map(|s| (s.status, s.count))
            .collect();
        assert_eq!(
            statuses,
            vec![
                (TicketStatus::Solved, 2),
                (TicketStatus::New, 1),
                (TicketStatus::Open, 1),
                (TicketStatus::Pending, 1),
            ]
        );
    }

    #[test]
    fn test_last_7_days_uses_utc_day_boundaries() {
        let snapshot = AnalyticsSnapshot {
            tickets: vec![
                ticket(1, TicketStatus::New, at(10, 0, 0)),
                ticket(2, TicketStatus::New, at(10, 23, 59)),
                ticket(3, TicketStatus::New, at(9, 23, 59)),
                ticket(4, TicketStatus::New, at(4, 0, 0)),
                // outside the window
                ticket(5, TicketStatus::New, at(3, 23, 59)),
            ],
            ratings: vec![],
        };
        let days = snapshot.last_7_days(NaiveDate::from_ymd_opt(2026, 6, 10).unwrap());
        let counts: Vec<_> = days.iter().map(|d| d.count).collect();
        assert_eq!(counts, vec![1, 0, 0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_report_serializes_wire_names() {
        let report = AnalyticsSnapshot::default().report(at(10, 0, 0));
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("byStatus").is_some());
        assert!(json.get("last7").is_some());
        assert!(json.get("avgCsat").is_some());
        assert!(json.get("avgFRT").is_some());
        assert_eq!(json["last7"][0]["date"], "2026-06-04");
    }
}
