//! Milestone classification.
//!
//! Given a project's milestones in stored order and a point in time, a
//! [`MilestonePlan`] splits them into the current milestone plus three
//! disjoint buckets: outdated, upcoming, and undated. The current milestone
//! never appears in any bucket.
//!
//! A plan is a snapshot. Build a new one after the milestone set changes.

use serde::{Deserialize, Serialize};

use super::ids::{MilestoneId, ProjectId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: MilestoneId,
    pub project_id: ProjectId,
    pub name: String,
    pub expected_at_us: Option<i64>,
}

/// The nearest future milestone, or the first stored one when none is
/// future-dated.
#[must_use]
pub fn current_milestone(milestones: &[Milestone], now_us: i64) -> Option<&Milestone> {
    milestones
        .iter()
        .filter(|m| m.expected_at_us.is_some_and(|at| at > now_us))
        .min_by_key(|m| m.expected_at_us)
        .or_else(|| milestones.first())
}

/// Past-dated milestones other than the current one, latest first.
#[must_use]
pub fn outdated_milestones(milestones: &[Milestone], now_us: i64) -> Vec<&Milestone> {
    let current = current_id(milestones, now_us);
    let mut outdated: Vec<&Milestone> = milestones
        .iter()
        .filter(|m| Some(m.id) != current)
        .filter(|m| m.expected_at_us.is_some_and(|at| at < now_us))
        .collect();
    outdated.sort_by(|a, b| b.expected_at_us.cmp(&a.expected_at_us));
    outdated
}

/// Future-dated milestones other than the current one, soonest first.
#[must_use]
pub fn upcoming_milestones(milestones: &[Milestone], now_us: i64) -> Vec<&Milestone> {
    let current = current_id(milestones, now_us);
    let mut upcoming: Vec<&Milestone> = milestones
        .iter()
        .filter(|m| Some(m.id) != current)
        .filter(|m| m.expected_at_us.is_some_and(|at| at > now_us))
        .collect();
    upcoming.sort_by_key(|m| m.expected_at_us);
    upcoming
}

/// Undated milestones other than the current one, in stored order.
#[must_use]
pub fn no_date_milestones(milestones: &[Milestone], now_us: i64) -> Vec<&Milestone> {
    let current = current_id(milestones, now_us);
    milestones
        .iter()
        .filter(|m| Some(m.id) != current)
        .filter(|m| m.expected_at_us.is_none())
        .collect()
}

fn current_id(milestones: &[Milestone], now_us: i64) -> Option<MilestoneId> {
    current_milestone(milestones, now_us).map(|m| m.id)
}

/// All four milestone views, computed once for a single `now`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestonePlan {
    pub current: Option<Milestone>,
    pub outdated: Vec<Milestone>,
    pub upcoming: Vec<Milestone>,
    pub no_date: Vec<Milestone>,
}

impl MilestonePlan {
    #[must_use]
    pub fn classify(milestones: &[Milestone], now_us: i64) -> Self {
        let Some(current) = current_milestone(milestones, now_us) else {
            return Self::default();
        };

        let mut plan = Self {
            current: Some(current.clone()),
            ..Self::default()
        };
        for milestone in milestones.iter().filter(|m| m.id != current.id) {
            match milestone.expected_at_us {
                None => plan.no_date.push(milestone.clone()),
                Some(at) if at < now_us => plan.outdated.push(milestone.clone()),
                Some(at) if at > now_us => plan.upcoming.push(milestone.clone()),
                Some(_) => {}
            }
        }
        // stable sorts: equal dates keep stored order
        plan.outdated
            .sort_by(|a, b| b.expected_at_us.cmp(&a.expected_at_us));
        plan.upcoming.sort_by_key(|m| m.expected_at_us);
        plan
    }
}
