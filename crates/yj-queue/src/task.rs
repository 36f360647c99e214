//! Task payloads and the envelope they travel in.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use yj_models::{CommentKey, VideoKey};

use crate::error::QueueError;

/// The named queues tasks are routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    Comments,
    Videos,
    Analyze,
}

impl QueueName {
    pub const ALL: [QueueName; 3] = [QueueName::Comments, QueueName::Videos, QueueName::Analyze];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Comments => "comments",
            QueueName::Videos => "videos",
            QueueName::Analyze => "analyze",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "comments" => Ok(QueueName::Comments),
            "videos" => Ok(QueueName::Videos),
            "analyze" => Ok(QueueName::Analyze),
            other => Err(QueueError::UnknownQueue(other.to_string())),
        }
    }
}

/// Name a handler is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskName {
    ImportComments,
    ImportTranscript,
    AnalyzeTranscript,
    AnalyzeComment,
}

impl TaskName {
    pub const ALL: [TaskName; 4] = [
        TaskName::ImportComments,
        TaskName::ImportTranscript,
        TaskName::AnalyzeTranscript,
        TaskName::AnalyzeComment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskName::ImportComments => "import_comments",
            TaskName::ImportTranscript => "import_transcript",
            TaskName::AnalyzeTranscript => "analyze_transcript",
            TaskName::AnalyzeComment => "analyze_comment",
        }
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of background work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Task {
    /// Fetch the comments of a video and store them.
    ImportComments { video_key: VideoKey },
    /// Fetch the transcript of a video and store it.
    ImportTranscript { video_key: VideoKey },
    /// Run sentiment analysis on a stored transcript.
    AnalyzeTranscript { video_key: VideoKey },
    /// Run sentiment analysis on a stored comment.
    AnalyzeComment { comment_key: CommentKey },
}

impl Task {
    pub fn name(&self) -> TaskName {
        match self {
            Task::ImportComments { .. } => TaskName::ImportComments,
            Task::ImportTranscript { .. } => TaskName::ImportTranscript,
            Task::AnalyzeTranscript { .. } => TaskName::AnalyzeTranscript,
            Task::AnalyzeComment { .. } => TaskName::AnalyzeComment,
        }
    }

    /// Key of the entity the task works on.
    pub fn entity_key(&self) -> &str {
        match self {
            Task::ImportComments { video_key }
            | Task::ImportTranscript { video_key }
            | Task::AnalyzeTranscript { video_key } => video_key.as_str(),
            Task::AnalyzeComment { comment_key } => comment_key.as_str(),
        }
    }
}

/// Unique id of one enqueued task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What actually goes on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub id: TaskId,
    pub queue: QueueName,
    #[serde(flatten)]
    pub task: Task,
    /// 1 on first delivery.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl TaskEnvelope {
    pub fn new(queue: QueueName, task: Task) -> Self {
        Self {
            id: TaskId::new(),
            queue,
            task,
            attempt: 1,
            enqueued_at: Utc::now(),
        }
    }

    /// The same task scheduled for its next attempt.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_wire_format() {
        let task = Task::AnalyzeComment {
            comment_key: CommentKey::from("v1_c1"),
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["task"], "analyze_comment");
        assert_eq!(json["comment_key"], "v1_c1");
    }

    #[test]
    fn test_envelope_flattens_task() {
        let envelope = TaskEnvelope::new(
            QueueName::Comments,
            Task::ImportComments {
                video_key: VideoKey::from("v1"),
            },
        );
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""task":"import_comments""#));
        assert!(json.contains(r#""queue":"comments""#));

        let decoded: TaskEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_unknown_task_name_is_rejected() {
        let json = r#"{"id":"x","queue":"analyze","task":"delete_everything","attempt":1,"enqueued_at":"2024-01-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<TaskEnvelope>(json).is_err());
    }

    #[test]
    fn test_task_names_match_wire_tags() {
        for name in TaskName::ALL {
            let json = serde_json::to_value(name).unwrap();
            assert_eq!(json, name.as_str());
        }
    }

    #[test]
    fn test_next_attempt_keeps_identity() {
        let envelope = TaskEnvelope::new(
            QueueName::Videos,
            Task::ImportTranscript {
                video_key: VideoKey::from("v1"),
            },
        );
        let next = envelope.next_attempt();
        assert_eq!(next.id, envelope.id);
        assert_eq!(next.attempt, 2);
    }

    #[test]
    fn test_queue_name_parse() {
        assert_eq!("analyze".parse::<QueueName>().unwrap(), QueueName::Analyze);
        assert!("nope".parse::<QueueName>().is_err());
    }
}
