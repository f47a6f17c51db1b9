//! Request and response shapes for the HTTP surface.

use chrono::{DateTime, Utc};
use platen_browser::PoolStats;
use platen_store::{Task, TaskStatus};
use platen_workers::{ServiceHealth, ServiceStats, Submission};
use serde::{Deserialize, Serialize};

/// Body of `POST /generate_pdf`. `url` is optional here so a missing field
/// surfaces as our 400 rather than a deserialization rejection.
#[derive(Debug, Deserialize)]
pub struct GeneratePdfRequest {
    pub url: Option<String>,
}

/// 202 body returned on submission.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub queue_size: usize,
}

impl From<Submission> for SubmitResponse {
    fn from(submission: Submission) -> Self {
        Self {
            task_id: submission.task_id,
            status: submission.status,
            queue_size: submission.queue_size,
        }
    }
}

/// Task as clients see it. Null fields are omitted; `processing_time` is
/// derived from the stored timestamps.
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        let processing_time = task.processing_time();
        Self {
            task_id: task.task_id,
            status: task.status,
            created_at: task.created_at,
            pdf_url: task.pdf_url,
            pdf_file_name: task.pdf_file_name,
            error: task.error,
            completed_at: task.completed_at,
            processing_time,
        }
    }
}

/// Pool summary embedded in the health response.
#[derive(Debug, Serialize)]
pub struct ChromeInstances {
    pub available: usize,
    pub busy: usize,
    pub total: usize,
    pub min: usize,
    pub max: usize,
}

impl From<&PoolStats> for ChromeInstances {
    fn from(pool: &PoolStats) -> Self {
        Self {
            available: pool.available_instances,
            busy: pool.busy_instances,
            total: pool.current_instances,
            min: pool.min_instances,
            max: pool.max_instances,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_tasks: i64,
    pub queue_size: usize,
    pub chrome_instances: ChromeInstances,
}

impl From<ServiceHealth> for HealthResponse {
    fn from(health: ServiceHealth) -> Self {
        Self {
            status: "ok",
            active_tasks: health.active_tasks,
            queue_size: health.queue_size,
            chrome_instances: ChromeInstances::from(&health.pool),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub failed_tasks: i64,
    pub active_tasks: i64,
    pub queue_size: usize,
    pub average_processing_time: f64,
    pub chrome_pool: PoolStats,
}

impl From<ServiceStats> for StatsResponse {
    fn from(stats: ServiceStats) -> Self {
        Self {
            total_tasks: stats.tasks.total,
            completed_tasks: stats.tasks.completed,
            failed_tasks: stats.tasks.failed,
            active_tasks: stats.tasks.active,
            queue_size: stats.queue_size,
            average_processing_time: stats.tasks.average_processing_time,
            chrome_pool: stats.pool,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn task_response_includes_processing_time_when_done() {
        let created = Utc::now();
        let task = Task {
            task_id: "t-1".into(),
            status: TaskStatus::Completed,
            pdf_url: Some("http://localhost/pdf/a.pdf".into()),
            pdf_file_name: Some("a.pdf".into()),
            error: None,
            created_at: created,
            completed_at: Some(created + Duration::seconds(3)),
        };

        let json = serde_json::to_value(TaskResponse::from(task)).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["processing_time"], 3.0);
        assert!(json["pdf_url"].as_str().unwrap().ends_with("/pdf/a.pdf"));
        assert!(json.get("error").is_none());
    }

    #[test]
    fn pending_task_response_omits_artifact_fields() {
        let task = Task {
            task_id: "t-2".into(),
            status: TaskStatus::Queued,
            pdf_url: None,
            pdf_file_name: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        };

        let json = serde_json::to_value(TaskResponse::from(task)).unwrap();
        assert_eq!(json["status"], "queued");
        assert!(json.get("pdf_url").is_none());
        assert!(json.get("completed_at").is_none());
        assert!(json.get("processing_time").is_none());
    }

    #[test]
    fn missing_url_deserializes_as_none() {
        let req: GeneratePdfRequest = serde_json::from_str("{}").unwrap();
        assert!(req.url.is_none());
    }
}
