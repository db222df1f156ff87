// models/workflowmodel.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    Assigned,
    InProgress,
    CheckedIn,
    Completed,
}

impl Milestone {
    pub fn to_str(&self) -> &str {
        match self {
            Milestone::Assigned => "assigned",
            Milestone::InProgress => "in_progress",
            Milestone::CheckedIn => "checked_in",
            Milestone::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct WorkflowStatus {
    pub id: Uuid,
    pub request_id: Uuid,
    pub provider_id: Uuid,
    pub is_assigned: bool,
    pub assigned_at: Option<DateTime<Utc>>,
    pub is_in_progress: bool,
    pub in_progress_at: Option<DateTime<Utc>>,
    pub is_checked_in: bool,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowStatus {
    /// A tracker for a freshly assigned provider, with only the first milestone set.
    pub fn assigned(request_id: Uuid, provider_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            provider_id,
            is_assigned: true,
            assigned_at: Some(now),
            is_in_progress: false,
            in_progress_at: None,
            is_checked_in: false,
            checked_in_at: None,
            is_completed: false,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_set(&self, milestone: Milestone) -> bool {
        match milestone {
            Milestone::Assigned => self.is_assigned,
            Milestone::InProgress => self.is_in_progress,
            Milestone::CheckedIn => self.is_checked_in,
            Milestone::Completed => self.is_completed,
        }
    }

    /// The first milestone in order that has not been reached, or `None` once completed.
    pub fn next_milestone(&self) -> Option<Milestone> {
        [
            Milestone::Assigned,
            Milestone::InProgress,
            Milestone::CheckedIn,
            Milestone::Completed,
        ]
        .into_iter()
        .find(|m| !self.is_set(*m))
    }

    pub fn current_milestone(&self) -> Option<Milestone> {
        [
            Milestone::Completed,
            Milestone::CheckedIn,
            Milestone::InProgress,
            Milestone::Assigned,
        ]
        .into_iter()
        .find(|m| self.is_set(*m))
    }

    /// Sets `target` if it is exactly the next unset milestone. On error nothing changes.
    pub fn advance(&mut self, target: Milestone, now: DateTime<Utc>) -> Result<(), String> {
        match self.next_milestone() {
            Some(next) if next == target => {}
            Some(next) => {
                return Err(format!(
                    "cannot move to {} before {}",
                    target.to_str(),
                    next.to_str()
                ));
            }
            None => return Err("workflow is already completed".to_string()),
        }

        match target {
            Milestone::Assigned => {
                self.is_assigned = true;
                self.assigned_at = Some(now);
            }
            Milestone::InProgress => {
                self.is_in_progress = true;
                self.in_progress_at = Some(now);
            }
            Milestone::CheckedIn => {
                self.is_checked_in = true;
                self.checked_in_at = Some(now);
            }
            Milestone::Completed => {
                self.is_completed = true;
                self.completed_at = Some(now);
            }
        }
        self.updated_at = now;
        Ok(())
    }

    /// No milestone is set while an earlier one is still false.
    pub fn is_monotonic(&self) -> bool {
        let flags = [
            self.is_assigned,
            self.is_in_progress,
            self.is_checked_in,
            self.is_completed,
        ];
        flags.windows(2).all(|w| w[0] || !w[1])
    }
}
