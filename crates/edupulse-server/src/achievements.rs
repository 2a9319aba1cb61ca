//! Achievement catalog and unlock evaluation

use crate::db::queries;
use crate::models::{
    Achievement, AchievementMetric, AchievementUnlockedEvent, PointsAction, UserAchievement,
    UserStats, WsEvent,
};
use crate::state::AppState;
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use tracing::info;

/// (code, name, description, metric, threshold, reward)
const CATALOG: &[(&str, &str, &str, AchievementMetric, i64, i64)] = &[
    (
        "first_submission",
        "First Steps",
        "Submit your first assignment",
        AchievementMetric::Submissions,
        1,
        10,
    ),
    (
        "five_submissions",
        "Steady Worker",
        "Submit five assignments",
        AchievementMetric::Submissions,
        5,
        25,
    ),
    (
        "points_100",
        "Century",
        "Earn 100 points",
        AchievementMetric::LifetimePoints,
        100,
        10,
    ),
    (
        "points_1000",
        "Point Collector",
        "Earn 1000 points",
        AchievementMetric::LifetimePoints,
        1000,
        50,
    ),
    (
        "first_checkpoint",
        "On the Path",
        "Complete your first pathway checkpoint",
        AchievementMetric::CheckpointsCompleted,
        1,
        10,
    ),
    (
        "pathway_finisher",
        "Pathfinder",
        "Complete a learning pathway",
        AchievementMetric::PathwaysCompleted,
        1,
        50,
    ),
    (
        "milestone_master",
        "Milestone Master",
        "Complete ten assignment milestones",
        AchievementMetric::MilestonesCompleted,
        10,
        30,
    ),
    (
        "curious_mind",
        "Curious Mind",
        "Finish five tutoring sessions",
        AchievementMetric::TutoringSessions,
        5,
        20,
    ),
];

/// Built-in achievement definitions, seeded into the database at startup
pub fn builtin_catalog() -> Vec<Achievement> {
    CATALOG
        .iter()
        .map(
            |(code, name, description, metric, threshold, reward)| Achievement {
                code: code.to_string(),
                name: name.to_string(),
                description: description.to_string(),
                metric: *metric,
                threshold: *threshold,
                reward_points: *reward,
            },
        )
        .collect()
}

pub fn metric_value(stats: &UserStats, metric: AchievementMetric) -> i64 {
    match metric {
        AchievementMetric::LifetimePoints => stats.lifetime_points,
        AchievementMetric::Submissions => stats.submissions,
        AchievementMetric::MilestonesCompleted => stats.milestones_completed,
        AchievementMetric::CheckpointsCompleted => stats.checkpoints_completed,
        AchievementMetric::PathwaysCompleted => stats.pathways_completed,
        AchievementMetric::TutoringSessions => stats.tutoring_sessions,
    }
}

/// Achievements whose criterion is met and that are not yet unlocked
pub fn newly_unlocked<'a>(
    catalog: &'a [Achievement],
    stats: &UserStats,
    unlocked: &HashSet<String>,
) -> Vec<&'a Achievement> {
    catalog
        .iter()
        .filter(|a| !unlocked.contains(&a.code))
        .filter(|a| metric_value(stats, a.metric) >= a.threshold)
        .collect()
}

/// Merge the catalog with a user's unlock times into a progress view
pub fn progress_view(
    catalog: &[Achievement],
    stats: &UserStats,
    unlocked_at: &HashMap<String, i64>,
) -> Vec<UserAchievement> {
    catalog
        .iter()
        .map(|a| UserAchievement {
            achievement: a.clone(),
            unlocked_at: unlocked_at.get(&a.code).copied(),
            progress: metric_value(stats, a.metric).min(a.threshold),
        })
        .collect()
}

/// Unlock every achievement the user now qualifies for and credit rewards.
///
/// Rewards can push lifetime points over another threshold, so evaluation
/// repeats until nothing new unlocks.
pub async fn evaluate_and_unlock(state: &AppState, user_id: &str) -> Result<Vec<Achievement>> {
    let catalog = queries::list_achievements(&state.db).await?;
    let mut unlocked: HashSet<String> = queries::get_user_achievement_times(&state.db, user_id)
        .await?
        .into_keys()
        .collect();
    let mut newly = Vec::new();

    loop {
        let stats = queries::get_user_stats(&state.db, user_id).await?;
        let pending: Vec<Achievement> = newly_unlocked(&catalog, &stats, &unlocked)
            .into_iter()
            .cloned()
            .collect();
        if pending.is_empty() {
            break;
        }

        for achievement in pending {
            unlocked.insert(achievement.code.clone());
            if !queries::unlock_achievement(&state.db, user_id, &achievement.code).await? {
                continue;
            }

            if achievement.reward_points > 0 {
                let tx = queries::record_points(
                    &state.db,
                    user_id,
                    PointsAction::AchievementUnlocked,
                    achievement.reward_points,
                    Some(&achievement.code),
                    Some(&achievement.name),
                )
                .await?;
                state.notify_points(&tx);
            }

            info!(user = %user_id, code = %achievement.code, "Achievement unlocked");
            state.notify(WsEvent::AchievementUnlocked(AchievementUnlockedEvent {
                user_id: user_id.to_string(),
                code: achievement.code.clone(),
                name: achievement.name.clone(),
                reward_points: achievement.reward_points,
            }));
            newly.push(achievement);
        }
    }

    Ok(newly)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_codes_are_unique() {
        let catalog = builtin_catalog();
        let codes: HashSet<_> = catalog.iter().map(|a| a.code.as_str()).collect();
        assert_eq!(codes.len(), catalog.len());
        assert!(catalog.iter().all(|a| a.threshold > 0));
    }

    #[test]
    fn test_nothing_unlocked_for_new_user() {
        let catalog = builtin_catalog();
        let unlocked = newly_unlocked(&catalog, &UserStats::default(), &HashSet::new());
        assert!(unlocked.is_empty());
    }

    #[test]
    fn test_first_submission_unlocks() {
        let catalog = builtin_catalog();
        let stats = UserStats {
            submissions: 1,
            lifetime_points: 50,
            ..Default::default()
        };

        let codes: Vec<_> = newly_unlocked(&catalog, &stats, &HashSet::new())
            .into_iter()
            .map(|a| a.code.as_str())
            .collect();
        assert_eq!(codes, vec!["first_submission"]);
    }

    #[test]
    fn test_already_unlocked_is_skipped() {
        let catalog = builtin_catalog();
        let stats = UserStats {
            submissions: 6,
            lifetime_points: 150,
            ..Default::default()
        };
        let unlocked: HashSet<String> = ["first_submission".to_string()].into_iter().collect();

        let codes: Vec<_> = newly_unlocked(&catalog, &stats, &unlocked)
            .into_iter()
            .map(|a| a.code.as_str())
            .collect();
        assert_eq!(codes, vec!["five_submissions", "points_100"]);
    }

    #[test]
    fn test_progress_view_caps_at_threshold() {
        let catalog = builtin_catalog();
        let stats = UserStats {
            lifetime_points: 5000,
            tutoring_sessions: 2,
            ..Default::default()
        };
        let mut times = HashMap::new();
        times.insert("points_100".to_string(), 1_700_000_000);

        let view = progress_view(&catalog, &stats, &times);
        let century = view
            .iter()
            .find(|v| v.achievement.code == "points_100")
            .unwrap();
        assert_eq!(century.progress, 100);
        assert_eq!(century.unlocked_at, Some(1_700_000_000));

        let curious = view
            .iter()
            .find(|v| v.achievement.code == "curious_mind")
            .unwrap();
        assert_eq!(curious.progress, 2);
        assert!(curious.unlocked_at.is_none());
    }
}
