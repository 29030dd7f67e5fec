use crate::schema::{badges, platform_settings};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Insertable, Debug)]
#[diesel(table_name = platform_settings)]
pub struct NewPlatformSetting<'a> {
    pub key: &'a str,
    pub value: &'a str,
    pub label: &'a str,
    pub description: &'a str,
    pub tab: &'a str,
}

#[derive(Queryable, Selectable, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = platform_settings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PlatformSettingRow {
    pub key: String,
    pub value: String,
    pub label: String,
    pub description: String,
    pub tab: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SettingsTab {
    pub tab: String,
    pub settings: Vec<PlatformSettingRow>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct SaveSettingsResponse {
    pub updated: Vec<String>,
    pub ignored: Vec<String>,
}

#[derive(Queryable, Selectable, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub total_xp: i32,
    pub is_admin: bool,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: i64,
    pub username: String,
    pub total_xp: i32,
}

#[derive(Queryable, Selectable, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = badges)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BadgeRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub image_url: String,
    pub required_xp: i32,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = badges)]
pub struct NewBadge {
    pub name: String,
    pub description: Option<String>,
    pub image_url: String,
    pub required_xp: i32,
}

#[derive(Queryable, Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SubmissionListItem {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub challenge_id: i64,
    pub challenge_title: String,
    pub status: String,
    pub output: String,
    pub xp_awarded: i32,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct DashboardStats {
    pub users: i64,
    pub labs: i64,
    pub modules: i64,
    pub challenges: i64,
    pub published_challenges: i64,
    pub submissions: i64,
    pub badges: i64,
    pub recent_submissions: Vec<SubmissionListItem>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    // Declaration order is the sort order of the analytics report.
    Hard,
    Medium,
    Easy,
    NoData,
}

impl Difficulty {
    pub fn classify(pass_rate: Option<f64>) -> Self {
        match pass_rate {
            None => Difficulty::NoData,
            Some(rate) if rate < 20.0 => Difficulty::Hard,
            Some(rate) if rate < 60.0 => Difficulty::Medium,
            Some(_) => Difficulty::Easy,
        }
    }
}

/// Percentage of passing submissions rounded to one decimal, `None` without attempts.
pub fn pass_rate(total: i64, passed: i64) -> Option<f64> {
    if total <= 0 {
        return None;
    }
    let rate = passed as f64 * 100.0 / total as f64;
    Some((rate * 10.0).round() / 10.0)
}

pub const STUCK_ATTEMPT_THRESHOLD: i64 = 10;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ChallengeAnalytics {
    pub challenge_id: i64,
    pub title: String,
    pub total_submissions: i64,
    pub passed_submissions: i64,
    pub pass_rate: Option<f64>,
    pub difficulty: Difficulty,
    /// Many attempts and nobody has passed yet.
    pub needs_attention: bool,
}

impl ChallengeAnalytics {
    pub fn new(challenge_id: i64, title: String, total: i64, passed: i64) -> Self {
        let rate = pass_rate(total, passed);
        ChallengeAnalytics {
            challenge_id,
            title,
            total_submissions: total,
            passed_submissions: passed,
            pass_rate: rate,
            difficulty: Difficulty::classify(rate),
            needs_attention: total >= STUCK_ATTEMPT_THRESHOLD && passed == 0,
        }
    }
}

/// Hardest first (lowest pass rate), challenges without data last.
pub fn sort_by_difficulty(report: &mut [ChallengeAnalytics]) {
    report.sort_by(|a, b| {
        a.difficulty.cmp(&b.difficulty).then_with(|| {
            a.pass_rate
                .unwrap_or(0.0)
                .total_cmp(&b.pass_rate.unwrap_or(0.0))
                .then_with(|| a.challenge_id.cmp(&b.challenge_id))
        })
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    #[test]
    fn pass_rate_rounds_to_one_decimal() {
        assert!(approx_eq!(f64, pass_rate(3, 1).unwrap(), 33.3, ulps = 2));
        assert!(approx_eq!(f64, pass_rate(3, 2).unwrap(), 66.7, ulps = 2));
        assert!(approx_eq!(f64, pass_rate(4, 4).unwrap(), 100.0, ulps = 2));
        assert_eq!(pass_rate(0, 0), None);
    }

    #[test]
    fn difficulty_bands() {
        assert_eq!(Difficulty::classify(None), Difficulty::NoData);
        assert_eq!(Difficulty::classify(Some(0.0)), Difficulty::Hard);
        assert_eq!(Difficulty::classify(Some(19.9)), Difficulty::Hard);
        assert_eq!(Difficulty::classify(Some(20.0)), Difficulty::Medium);
        assert_eq!(Difficulty::classify(Some(59.9)), Difficulty::Medium);
        assert_eq!(Difficulty::classify(Some(60.0)), Difficulty::Easy);
    }

    #[test]
    fn attention_needs_ten_attempts_without_a_pass() {
        assert!(ChallengeAnalytics::new(1, "a".into(), 10, 0).needs_attention);
        assert!(!ChallengeAnalytics::new(1, "a".into(), 9, 0).needs_attention);
        assert!(!ChallengeAnalytics::new(1, "a".into(), 12, 1).needs_attention);
    }

    #[test]
    fn report_is_hardest_first_with_no_data_last() {
        let mut report = vec![
            ChallengeAnalytics::new(1, "empty".into(), 0, 0),
            ChallengeAnalytics::new(2, "easy".into(), 10, 9),
            ChallengeAnalytics::new(3, "hard".into(), 10, 1),
            ChallengeAnalytics::new(4, "hardest".into(), 10, 0),
            ChallengeAnalytics::new(5, "medium".into(), 10, 4),
        ];
        sort_by_difficulty(&mut report);
        let order: Vec<i64> = report.iter().map(|r| r.challenge_id).collect();
        assert_eq!(order, vec![4, 3, 5, 2, 1]);
    }
}
